//! Walks a class-data blob's ULEB128-encoded field/method lists, reconstructing
//! each entry's real index from the running sum of per-entry diffs.

use crate::dex_err;
use crate::leb128::decode_leb128_off;
use crate::Result;

pub trait ClassItemBase: Copy + Clone + Default {
    fn read(&mut self, data: &[u8], pos: &mut usize) -> Result<()>;
    fn next_section(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct Method {
    pub index: u32,
    pub access_flags: u32,
    pub code_offset: u32,
    pub is_virtual: bool,
}

impl Default for Method {
    fn default() -> Self {
        Self {
            index: 0,
            access_flags: 0,
            code_offset: 0,
            is_virtual: false,
        }
    }
}

impl ClassItemBase for Method {
    fn read(&mut self, data: &[u8], pos: &mut usize) -> Result<()> {
        let diff: u32 = decode_leb128_off(data, pos)?;
        let Some(index) = self.index.checked_add(diff) else {
            return dex_err!(BadEncodedIndex {
                index: self.index,
                next_index: diff,
                item_ty: "Method"
            });
        };
        self.index = index;
        self.access_flags = decode_leb128_off(data, pos)?;
        self.code_offset = decode_leb128_off(data, pos)?;
        Ok(())
    }

    fn next_section(&mut self) {
        self.index = 0;
        self.is_virtual = true;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub index: u32,
    pub access_flags: u32,
    pub is_instance: bool,
}

impl Default for Field {
    fn default() -> Self {
        Self {
            index: 0,
            access_flags: 0,
            is_instance: false,
        }
    }
}

impl ClassItemBase for Field {
    fn read(&mut self, data: &[u8], pos: &mut usize) -> Result<()> {
        let diff: u32 = decode_leb128_off(data, pos)?;
        let Some(index) = self.index.checked_add(diff) else {
            return dex_err!(BadEncodedIndex {
                index: self.index,
                next_index: diff,
                item_ty: "Field"
            });
        };
        self.index = index;
        self.access_flags = decode_leb128_off(data, pos)?;
        Ok(())
    }

    fn next_section(&mut self) {
        self.index = 0;
        self.is_instance = true;
    }
}

/// Parses the `class_data_item` header
/// `(static_fields, instance_fields, direct_methods, virtual_methods)` and
/// exposes the four member lists that follow.
pub struct ClassAccessor<'a> {
    class_data: &'a [u8],
    fields_off: usize,

    pub num_static_fields: u32,
    pub num_instance_fields: u32,
    pub num_direct_methods: u32,
    pub num_virtual_methods: u32,
}

impl<'a> ClassAccessor<'a> {
    pub fn from_raw(class_data: &'a [u8]) -> Result<Self> {
        let mut pos = 0;
        let num_static_fields = decode_leb128_off(class_data, &mut pos)?;
        let num_instance_fields = decode_leb128_off(class_data, &mut pos)?;
        let num_direct_methods = decode_leb128_off(class_data, &mut pos)?;
        let num_virtual_methods = decode_leb128_off(class_data, &mut pos)?;
        Ok(Self {
            class_data,
            fields_off: pos,
            num_static_fields,
            num_instance_fields,
            num_direct_methods,
            num_virtual_methods,
        })
    }

    pub fn num_fields(&self) -> usize {
        (self.num_static_fields + self.num_instance_fields) as usize
    }

    pub fn num_methods(&self) -> usize {
        (self.num_direct_methods + self.num_virtual_methods) as usize
    }

    pub fn fields(&self) -> DataIterator<'a, Field> {
        DataIterator::new(
            self.class_data,
            self.fields_off,
            self.num_static_fields as usize,
            self.num_fields(),
        )
    }

    /// Walks past all fields to find the byte offset where the method list
    /// begins; needed because methods come after fields in the blob and we
    /// don't track that offset during construction.
    pub fn methods(&self) -> Result<DataIterator<'a, Method>> {
        let mut field = Field::default();
        let mut offset = self.fields_off;
        for i in 0..self.num_fields() {
            if i == self.num_static_fields as usize {
                field.next_section();
            }
            field.read(self.class_data, &mut offset)?;
        }
        Ok(DataIterator::new(
            self.class_data,
            offset,
            self.num_direct_methods as usize,
            self.num_methods(),
        ))
    }
}

pub struct DataIterator<'a, T: ClassItemBase> {
    class_data: &'a [u8],
    value: T,
    pos: usize,
    off: usize,
    partition_pos: usize,
    end_pos: usize,
}

impl<'a, T: ClassItemBase> DataIterator<'a, T> {
    fn new(class_data: &'a [u8], start_pos: usize, partition_pos: usize, end_pos: usize) -> Self {
        Self {
            class_data,
            value: T::default(),
            pos: 0,
            off: start_pos,
            partition_pos,
            end_pos,
        }
    }
}

impl<'a, T: ClassItemBase> Iterator for DataIterator<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end_pos {
            return None;
        }
        if self.pos == self.partition_pos {
            self.value.next_section();
        }
        match self.value.read(self.class_data, &mut self.off) {
            Ok(()) => {
                self.pos += 1;
                Some(self.value)
            }
            Err(_) => {
                self.pos = self.end_pos;
                None
            }
        }
    }
}
