//! Zero-copy reader over one in-memory DEX image.
//!
//! `DexReader` validates just enough of the header at construction time to
//! make every other access safe: magic, declared section sizes fit the
//! file, the six fixed-size id tables resolve within bounds, and
//! (optionally) the Adler-32 checksum. Those six tables are sliced once and
//! stored; everything keyed by a per-item offset (string data, class data,
//! code items) is still resolved lazily, on demand.

use std::marker::PhantomData;

use plain::Plain;

use crate::dex_err;
use crate::error::DexError;
use crate::Result;

use super::class_accessor::ClassAccessor;
use super::code_item::CodeItemAccessor;
use super::container::{DexContainer, InMemoryDexContainer};
use super::header::{Header, DEX_MAGIC, HEADER_SIZE};
use super::structs::{ClassDef, CodeItem, FieldId, MapItem, MethodId, ProtoId, StringId, TypeId, TypeItem};

pub const NO_INDEX: u32 = 0xFFFF_FFFF;

#[derive(Debug, Default, Clone, Copy)]
pub struct VerifyOptions {
    pub verify_checksum: bool,
}

fn slice_at<'a, T: Plain>(data: &'a [u8], off: usize, count: usize) -> Result<&'a [T]> {
    let byte_len = count
        .checked_mul(std::mem::size_of::<T>())
        .ok_or(DexError::DexIndexError {
            index: count as u32,
            max: data.len(),
            item_ty: "section",
        })?;
    let end = off.checked_add(byte_len).ok_or(DexError::BadOffsetTooLarge {
        offset: off as u32,
        size: data.len(),
        section: "section",
    })?;
    if end > data.len() {
        return dex_err!(BadOffsetTooLarge {
            offset: off as u32,
            size: data.len(),
            section: "section"
        });
    }
    Ok(plain::slice::from_bytes(&data[off..end]).expect("size checked above; alignment guaranteed by repr(C) layout"))
}

/// All section tables are resolved once at construction and stored as plain
/// `&'a` slices, so every accessor below borrows `self` for an ordinary,
/// arbitrarily short lifetime while still handing back data that outlives
/// it.
pub struct DexReader<'a, C: DexContainer<'a> = InMemoryDexContainer<'a>> {
    data: &'a [u8],
    header: &'a Header,
    strings: &'a [StringId],
    types: &'a [TypeId],
    protos: &'a [ProtoId],
    fields: &'a [FieldId],
    methods: &'a [MethodId],
    class_defs: &'a [ClassDef],
    _marker: PhantomData<C>,
}

impl<'a> DexReader<'a, InMemoryDexContainer<'a>> {
    pub fn from_bytes(data: &'a [u8]) -> Result<Self> {
        Self::from_bytes_verified(data, VerifyOptions::default())
    }

    pub fn from_bytes_verified(data: &'a [u8], options: VerifyOptions) -> Result<Self> {
        Self::build(data, options)
    }
}

impl<'a, C: DexContainer<'a>> DexReader<'a, C> {
    /// Builds a reader from a container borrowed for the whole `'a` the
    /// resulting tables will live. Callers working directly off a byte slice
    /// should prefer [`DexReader::from_bytes`], which skips the container
    /// indirection entirely.
    pub fn from_container(container: &'a C, options: VerifyOptions) -> Result<Self> {
        Self::build(container.data(), options)
    }

    fn build(data: &'a [u8], options: VerifyOptions) -> Result<Self> {
        if data.len() < HEADER_SIZE as usize {
            return dex_err!(FileSizeAtLeast {
                actual: data.len(),
                expected: HEADER_SIZE as usize
            });
        }

        let header = Header::from_bytes(&data[..HEADER_SIZE as usize]).map_err(|_| DexError::BadHeaderSize {
            size: data.len() as u32,
            expected: HEADER_SIZE,
        })?;
        if header.get_magic()[0..4] != *DEX_MAGIC {
            return dex_err!(BadFileMagic);
        }
        if (header.file_size as usize) > data.len() {
            return dex_err!(FileSizeAtLeast {
                actual: data.len(),
                expected: header.file_size as usize
            });
        }

        if options.verify_checksum {
            let actual = adler32::adler32(&data[12..header.file_size as usize]).unwrap_or(0);
            if actual != header.checksum {
                return dex_err!(BadChecksum {
                    actual,
                    expected: header.checksum
                });
            }
        }

        let strings = slice_at(data, header.string_ids_off as usize, header.string_ids_size as usize)?;
        let types = slice_at(data, header.type_ids_off as usize, header.type_ids_size as usize)?;
        let protos = slice_at(data, header.proto_ids_off as usize, header.proto_ids_size as usize)?;
        let fields = slice_at(data, header.field_ids_off as usize, header.field_ids_size as usize)?;
        let methods = slice_at(data, header.method_ids_off as usize, header.method_ids_size as usize)?;
        let class_defs = slice_at(data, header.class_defs_off as usize, header.class_defs_size as usize)?;

        Ok(Self {
            data,
            header,
            strings,
            types,
            protos,
            fields,
            methods,
            class_defs,
            _marker: PhantomData,
        })
    }

    #[inline]
    pub fn header(&self) -> &'a Header {
        self.header
    }

    #[inline]
    pub fn file_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn strings(&self) -> &'a [StringId] {
        self.strings
    }

    pub fn types(&self) -> &'a [TypeId] {
        self.types
    }

    pub fn protos(&self) -> &'a [ProtoId] {
        self.protos
    }

    pub fn fields(&self) -> &'a [FieldId] {
        self.fields
    }

    pub fn methods(&self) -> &'a [MethodId] {
        self.methods
    }

    pub fn class_defs(&self) -> &'a [ClassDef] {
        self.class_defs
    }

    /// Decodes string `idx`'s MUTF-8 payload as a borrowed byte slice
    /// (excluding the terminating NUL). Comparisons over strings use this
    /// raw byte form rather than a decoded `&str`, matching the format's own
    /// "strings sorted by byte value" guarantee.
    pub fn get_string_bytes(&self, idx: u32) -> Result<&'a [u8]> {
        let string_id = self.strings.get(idx as usize).ok_or(DexError::DexIndexError {
            index: idx,
            max: self.strings.len(),
            item_ty: "StringId",
        })?;
        let off = string_id.offset();
        if off >= self.data.len() {
            return dex_err!(BadOffsetTooLarge {
                offset: off as u32,
                size: self.data.len(),
                section: "string_data_off"
            });
        }
        let (_utf16_len, consumed) = crate::leb128::decode_leb128::<u32>(self.data, off)?;
        let start = off + consumed;
        let nul = self.data[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or(DexError::BadStringData(off))?;
        Ok(&self.data[start..start + nul])
    }

    pub fn get_string_str(&self, idx: u32) -> Result<String> {
        Ok(crate::utf::mutf8_to_str_lossy(self.get_string_bytes(idx)?))
    }

    pub fn get_type_descriptor_idx(&self, type_idx: u16) -> Result<u32> {
        let type_id = self.types.get(type_idx as usize).ok_or(DexError::DexIndexError {
            index: type_idx as u32,
            max: self.types.len(),
            item_ty: "TypeId",
        })?;
        Ok(type_id.descriptor_idx)
    }

    pub fn get_type_descriptor_bytes(&self, type_idx: u16) -> Result<&'a [u8]> {
        self.get_string_bytes(self.get_type_descriptor_idx(type_idx)?)
    }

    /// Binary search for the exact string `needle` among this image's sorted
    /// string table. Returns `Err` only on a malformed string entry; "not
    /// found" is expressed via `Ok(None)`.
    pub fn find_string_exact(&self, needle: &[u8]) -> Result<Option<u32>> {
        let mut lo = 0usize;
        let mut hi = self.strings.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let candidate = self.get_string_bytes(mid as u32)?;
            match candidate.cmp(needle) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Some(mid as u32)),
            }
        }
        Ok(None)
    }

    fn lower_bound(&self, needle: &[u8]) -> Result<u32> {
        let mut lo = 0usize;
        let mut hi = self.strings.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.get_string_bytes(mid as u32)? < needle {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo as u32)
    }

    /// `[lower, upper)` string-id range of every string with `prefix` as a
    /// byte prefix: `upper_bound` is found by appending `0xFF` (which sorts
    /// after any byte a real prefix continuation could start with).
    pub fn find_string_prefix_range(&self, prefix: &[u8]) -> Result<(u32, u32)> {
        let lower = self.lower_bound(prefix)?;
        let mut upper_needle = prefix.to_vec();
        upper_needle.push(0xFF);
        let upper = self.lower_bound(&upper_needle)?;
        Ok((lower, upper))
    }

    pub fn get_type_list(&self, offset: u32) -> Result<&'a [TypeItem]> {
        if offset == 0 {
            return Ok(&[]);
        }
        let off = offset as usize;
        if off + 4 > self.data.len() {
            return dex_err!(BadOffsetTooLarge {
                offset,
                size: self.data.len(),
                section: "type_list"
            });
        }
        let size = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
        slice_at(self.data, off + 4, size as usize)
    }

    pub fn proto_parameters(&self, proto: &ProtoId) -> Result<&'a [TypeItem]> {
        self.get_type_list(proto.parameters_off)
    }

    pub fn get_class_accessor(&self, class_def: &ClassDef) -> Result<Option<ClassAccessor<'a>>> {
        if class_def.class_data_off == 0 {
            return Ok(None);
        }
        let off = class_def.class_data_off as usize;
        if off >= self.data.len() {
            return dex_err!(BadOffsetTooLarge {
                offset: class_def.class_data_off,
                size: self.data.len(),
                section: "class_data_off"
            });
        }
        Ok(Some(ClassAccessor::from_raw(&self.data[off..])?))
    }

    /// The `map_list` entries, if `map_off` is set: a `u32` entry count
    /// followed by that many `MapItem`s, each naming a section's type, size,
    /// and offset. Only consulted for the bounds sanity check in
    /// [`crate::tables::ImageTables::build`]; this engine has no use for any
    /// section the map_list alone would reveal (method handles, call sites,
    /// hiddenapi data are all out of scope).
    pub fn map_items(&self) -> Result<&'a [MapItem]> {
        if self.header.map_off == 0 {
            return Ok(&[]);
        }
        let off = self.header.map_off as usize;
        if off + 4 > self.data.len() {
            return dex_err!(BadOffsetTooLarge {
                offset: self.header.map_off,
                size: self.data.len(),
                section: "map_list"
            });
        }
        let count = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
        slice_at(self.data, off + 4, count as usize)
    }

    pub fn get_code_item_accessor(&self, code_off: u32) -> Result<Option<CodeItemAccessor<'a>>> {
        if code_off == 0 {
            return Ok(None);
        }
        let off = code_off as usize;
        const CODE_ITEM_SIZE: usize = std::mem::size_of::<CodeItem>();
        if off + CODE_ITEM_SIZE > self.data.len() {
            return dex_err!(BadOffsetTooLarge {
                offset: code_off,
                size: self.data.len(),
                section: "code_item"
            });
        }
        let item: &'a CodeItem = plain::from_bytes(&self.data[off..off + CODE_ITEM_SIZE]).expect("size checked above");
        let insns_off = off + CODE_ITEM_SIZE;
        // 16-bit instructions are 2-byte aligned within the 4-byte-aligned
        // code_item; an odd `tries_size` would have padded this already.
        let insns_bytes_len = item.insns_size as usize * 2;
        if insns_off + insns_bytes_len > self.data.len() {
            return dex_err!(BadOffsetTooLarge {
                offset: code_off,
                size: self.data.len(),
                section: "insns"
            });
        }
        let insns: &'a [u16] = plain::slice::from_bytes(&self.data[insns_off..insns_off + insns_bytes_len]).expect("size checked above");
        Ok(Some(CodeItemAccessor::new(item, insns)))
    }
}
