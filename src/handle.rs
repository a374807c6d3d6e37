//! Deduplicates class/field/method entities that recur across several DEX
//! images under one process-global handle, with O(1) reverse lookup from a
//! per-image id back to its handle.

use std::collections::HashMap;

use crate::dex::container::DexContainer;
use crate::dex::reader::NO_INDEX;
use crate::tables::ImageTables;

pub type Handle = u32;

/// Preferred image first, then image 0, then the rest in natural order; each
/// image index appears at most once.
pub fn image_visit_order(preferred: Option<usize>, num_images: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(num_images);
    let mut seen = vec![false; num_images];

    let mut push = |order: &mut Vec<usize>, seen: &mut Vec<bool>, idx: usize| {
        if idx < num_images && !seen[idx] {
            seen[idx] = true;
            order.push(idx);
        }
    };

    if let Some(p) = preferred {
        push(&mut order, &mut seen, p);
    }
    push(&mut order, &mut seen, 0);
    for idx in 1..num_images {
        push(&mut order, &mut seen, idx);
    }
    order
}

#[derive(Default)]
struct HandleSet {
    /// `handle -> per-image local id` (`NO_INDEX` where absent).
    rows: Vec<Vec<u32>>,
    /// `image index -> (local id -> handle)`, the inverse of `rows`.
    reverse: Vec<HashMap<u32, Handle>>,
}

impl HandleSet {
    fn new(num_images: usize) -> Self {
        Self {
            rows: Vec::new(),
            reverse: vec![HashMap::new(); num_images],
        }
    }

    fn lookup(&self, image: usize, local_id: u32) -> Option<Handle> {
        self.reverse.get(image)?.get(&local_id).copied()
    }

    fn row(&self, handle: Handle) -> Option<&[u32]> {
        self.rows.get(handle as usize).map(Vec::as_slice)
    }

    /// Finds the existing handle for any of `found` (image, local_id) pairs,
    /// or allocates a fresh one and records every pair into it.
    fn resolve(&mut self, num_images: usize, found: &[(usize, u32)]) -> Option<Handle> {
        if found.is_empty() {
            return None;
        }
        for &(image, local_id) in found {
            if let Some(h) = self.lookup(image, local_id) {
                return Some(h);
            }
        }
        let handle = self.rows.len() as Handle;
        let mut row = vec![NO_INDEX; num_images];
        for &(image, local_id) in found {
            row[image] = local_id;
            self.reverse[image].insert(local_id, handle);
        }
        self.rows.push(row);
        Some(handle)
    }
}

pub struct HandleTables {
    num_images: usize,
    classes: HandleSet,
    fields: HandleSet,
    methods: HandleSet,
}

impl HandleTables {
    pub fn new(num_images: usize) -> Self {
        Self {
            num_images,
            classes: HandleSet::new(num_images),
            fields: HandleSet::new(num_images),
            methods: HandleSet::new(num_images),
        }
    }

    pub fn class_type_id(&self, handle: Handle, image: usize) -> Option<u32> {
        self.classes.row(handle)?.get(image).copied().filter(|&v| v != NO_INDEX)
    }

    pub fn field_id(&self, handle: Handle, image: usize) -> Option<u32> {
        self.fields.row(handle)?.get(image).copied().filter(|&v| v != NO_INDEX)
    }

    pub fn method_id(&self, handle: Handle, image: usize) -> Option<u32> {
        self.methods.row(handle)?.get(image).copied().filter(|&v| v != NO_INDEX)
    }

    /// Handle this local class `type_id` in `image` already has, if any.
    pub fn handle_of_class(&self, image: usize, type_id: u32) -> Option<Handle> {
        self.classes.lookup(image, type_id)
    }

    pub fn handle_of_field(&self, image: usize, field_id: u32) -> Option<Handle> {
        self.fields.lookup(image, field_id)
    }

    pub fn handle_of_method(&self, image: usize, method_id: u32) -> Option<Handle> {
        self.methods.lookup(image, method_id)
    }

    pub fn create_class_index<'a, C: DexContainer<'a>>(
        &mut self,
        images: &[ImageTables<'a, C>],
        class_descriptor: &[u8],
        preferred_image: Option<usize>,
    ) -> crate::Result<Option<Handle>> {
        let mut found = Vec::new();
        for image in image_visit_order(preferred_image, images.len()) {
            let tables = &images[image];
            let Some(string_id) = tables.reader.find_string_exact(class_descriptor)? else {
                continue;
            };
            let type_id = tables.type_by_string.get(string_id as usize).copied().unwrap_or(NO_INDEX);
            if type_id == NO_INDEX {
                continue;
            }
            if let Some(h) = self.classes.lookup(image, type_id) {
                return Ok(Some(h));
            }
            found.push((image, type_id));
        }
        Ok(self.classes.resolve(self.num_images, &found))
    }

    pub fn create_field_index<'a, C: DexContainer<'a>>(
        &mut self,
        images: &[ImageTables<'a, C>],
        class_descriptor: &[u8],
        field_name: &[u8],
        preferred_image: Option<usize>,
    ) -> crate::Result<Option<Handle>> {
        let mut found = Vec::new();
        for image in image_visit_order(preferred_image, images.len()) {
            let tables = &images[image];
            let Some(class_str) = tables.reader.find_string_exact(class_descriptor)? else {
                continue;
            };
            let class_idx = tables.type_by_string.get(class_str as usize).copied().unwrap_or(NO_INDEX);
            if class_idx == NO_INDEX || class_idx > u16::MAX as u32 {
                continue;
            }
            let Some(name_idx) = tables.reader.find_string_exact(field_name)? else {
                continue;
            };
            let Some(field_id) = tables.find_field(class_idx as u16, name_idx) else {
                continue;
            };
            if let Some(h) = self.fields.lookup(image, field_id) {
                return Ok(Some(h));
            }
            found.push((image, field_id));
        }
        Ok(self.fields.resolve(self.num_images, &found))
    }

    /// Parameter descriptors, when non-empty, must ALL match for a candidate
    /// overload to be accepted. The reference tool's equivalent loop does
    /// not reject on the first mismatch and can end up accepting whichever
    /// candidate it checked last; this implementation does reject on the
    /// first mismatch, fixing that.
    pub fn create_method_index<'a, C: DexContainer<'a>>(
        &mut self,
        images: &[ImageTables<'a, C>],
        class_descriptor: &[u8],
        method_name: &[u8],
        param_descriptors: &[&[u8]],
        preferred_image: Option<usize>,
    ) -> crate::Result<Option<Handle>> {
        let mut found = Vec::new();
        for image in image_visit_order(preferred_image, images.len()) {
            let tables = &images[image];
            let Some(class_str) = tables.reader.find_string_exact(class_descriptor)? else {
                continue;
            };
            let class_idx = tables.type_by_string.get(class_str as usize).copied().unwrap_or(NO_INDEX);
            if class_idx == NO_INDEX || class_idx > u16::MAX as u32 {
                continue;
            }
            let Some(name_idx) = tables.reader.find_string_exact(method_name)? else {
                continue;
            };

            let mut matched_method = None;
            for &method_id in tables.find_methods(class_idx as u16, name_idx) {
                if param_descriptors.is_empty() {
                    matched_method = Some(method_id);
                    break;
                }
                if Self::params_match(tables, method_id, param_descriptors)? {
                    matched_method = Some(method_id);
                    break;
                }
            }

            let Some(method_id) = matched_method else {
                continue;
            };
            if let Some(h) = self.methods.lookup(image, method_id) {
                return Ok(Some(h));
            }
            found.push((image, method_id));
        }
        Ok(self.methods.resolve(self.num_images, &found))
    }

    fn params_match<'a, C: DexContainer<'a>>(
        tables: &ImageTables<'a, C>,
        method_id: u32,
        wanted: &[&[u8]],
    ) -> crate::Result<bool> {
        let Some(method) = tables.reader.methods().get(method_id as usize) else {
            return Ok(false);
        };
        let Some(proto) = tables.reader.protos().get(method.proto_idx as usize) else {
            return Ok(false);
        };
        let params = tables.reader.proto_parameters(proto)?;
        if params.len() != wanted.len() {
            return Ok(false);
        }
        for (type_item, &want) in params.iter().zip(wanted) {
            let descriptor = tables.reader.get_type_descriptor_bytes(type_item.type_idx)?;
            if descriptor != want {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
