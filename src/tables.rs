//! Per-image derived tables, built once at construction from a [`DexReader`].
//!
//! Everything here is frozen after [`ImageTables::build`] returns; the only
//! tables that keep changing afterwards are the scan caches in
//! [`crate::scan`].

use std::collections::HashMap;

use log::{debug, warn};

use crate::dex::container::{DexContainer, InMemoryDexContainer};
use crate::dex::reader::{DexReader, NO_INDEX};
use crate::Result;

pub struct ImageTables<'a, C: DexContainer<'a> = InMemoryDexContainer<'a>> {
    pub reader: DexReader<'a, C>,

    /// String ids in ascending byte order (a property of the format itself,
    /// not something this table imposes); cached here so every subsequent
    /// lookup avoids re-decoding MUTF-8.
    pub strings: Vec<&'a [u8]>,

    /// `string_id -> type_id`, `NO_INDEX` when the string is not a type
    /// descriptor.
    pub type_by_string: Vec<u32>,

    /// `type_id -> class_def_index`, `NO_INDEX` when the type has no
    /// `class_def` in this image.
    pub class_def_by_type: Vec<u32>,

    /// `method_id -> code_item offset` (absent when the method is
    /// abstract/native).
    pub method_code_off: HashMap<u32, u32>,

    /// `method_id -> parameters_off`, populated for methods actually walked
    /// out of a `class_data_item` in this image. A `method_id` that only ever
    /// shows up as a call target (never defined here) has no entry, and is
    /// treated as having an empty parameter list rather than whatever its
    /// `proto_idx` happens to describe.
    pub method_params: HashMap<u32, u32>,

    /// `method_id -> owning class_def index`, for quick class lookups from a
    /// scanned method.
    pub method_class_def: HashMap<u32, u32>,

    /// `class_idx -> (name_idx -> field_id)`.
    pub field_by_class_name: HashMap<u16, HashMap<u32, u32>>,

    /// `class_idx -> (name_idx -> [method_id, ...])`, overload-aware.
    pub method_by_class_name: HashMap<u16, HashMap<u32, Vec<u32>>>,

    /// `type_idx -> [field_id, ...]` declaring fields of this type.
    pub declaring: HashMap<u16, Vec<u32>>,
}

impl<'a, C: DexContainer<'a>> ImageTables<'a, C> {
    pub fn build(reader: DexReader<'a, C>) -> Result<Self> {
        let string_ids = reader.strings();
        let mut strings = Vec::with_capacity(string_ids.len());
        for i in 0..string_ids.len() as u32 {
            strings.push(reader.get_string_bytes(i)?);
        }

        let mut type_by_string = vec![NO_INDEX; strings.len()];
        for (type_idx, type_id) in reader.types().iter().enumerate() {
            if let Some(slot) = type_by_string.get_mut(type_id.descriptor_idx as usize) {
                *slot = type_idx as u32;
            }
        }

        let mut class_def_by_type = vec![NO_INDEX; reader.types().len()];
        let mut method_code_off = HashMap::new();
        let mut method_params = HashMap::new();
        let mut method_class_def = HashMap::new();
        let mut field_by_class_name: HashMap<u16, HashMap<u32, u32>> = HashMap::new();
        let mut method_by_class_name: HashMap<u16, HashMap<u32, Vec<u32>>> = HashMap::new();
        let mut declaring: HashMap<u16, Vec<u32>> = HashMap::new();

        let methods = reader.methods();
        let fields = reader.fields();

        for (def_idx, class_def) in reader.class_defs().iter().enumerate() {
            if let Some(slot) = class_def_by_type.get_mut(class_def.class_idx as usize) {
                *slot = def_idx as u32;
            }

            let Some(accessor) = reader.get_class_accessor(class_def)? else {
                continue;
            };

            for field in accessor.fields() {
                if let Some(field_id) = fields.get(field.index as usize) {
                    declaring.entry(field_id.type_idx).or_default().push(field.index);
                    field_by_class_name
                        .entry(field_id.class_idx)
                        .or_default()
                        .insert(field_id.name_idx, field.index);
                }
            }

            for method in accessor.methods()? {
                if method.code_offset != 0 {
                    method_code_off.insert(method.index, method.code_offset);
                }
                method_class_def.insert(method.index, def_idx as u32);
                if let Some(method_id) = methods.get(method.index as usize) {
                    method_by_class_name
                        .entry(method_id.class_idx)
                        .or_default()
                        .entry(method_id.name_idx)
                        .or_default()
                        .push(method.index);
                    if let Some(proto) = reader.protos().get(method_id.proto_idx as usize) {
                        method_params.insert(method.index, proto.parameters_off);
                    }
                }
            }
        }

        for map_item in reader.map_items()? {
            if map_item.off as usize > reader.file_size() {
                warn!(
                    "map_list entry (type {:#06x}) points at offset {} past end of file ({})",
                    map_item.type_,
                    map_item.off,
                    reader.file_size()
                );
            }
        }

        debug!(
            "image loaded: {} strings, {} types, {} methods, {} fields, {} class defs",
            strings.len(),
            reader.types().len(),
            methods.len(),
            fields.len(),
            reader.class_defs().len(),
        );

        Ok(Self {
            reader,
            strings,
            type_by_string,
            class_def_by_type,
            method_code_off,
            method_params,
            method_class_def,
            field_by_class_name,
            method_by_class_name,
            declaring,
        })
    }

    pub fn num_methods(&self) -> u32 {
        self.reader.methods().len() as u32
    }

    pub fn num_fields(&self) -> u32 {
        self.reader.fields().len() as u32
    }

    /// Parameter types of `method_id`, as walked out of this image's
    /// class-data. Empty for a method never defined here (a call target
    /// reached only through a `MethodId`, say), not whatever its `proto_idx`
    /// happens to describe.
    pub fn method_parameters(&self, method_id: u32) -> Result<&'a [crate::dex::structs::TypeItem]> {
        match self.method_params.get(&method_id) {
            Some(&off) => self.reader.get_type_list(off),
            None => Ok(&[]),
        }
    }

    pub fn find_field(&self, class_idx: u16, name_idx: u32) -> Option<u32> {
        self.field_by_class_name.get(&class_idx)?.get(&name_idx).copied()
    }

    pub fn find_methods(&self, class_idx: u16, name_idx: u32) -> &[u32] {
        self.method_by_class_name
            .get(&class_idx)
            .and_then(|by_name| by_name.get(&name_idx))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
