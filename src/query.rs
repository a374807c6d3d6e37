//! Filters and the find/decode query surface composed from tables, scan
//! caches, and the handle table.

use crate::dex::container::DexContainer;
use crate::handle::{Handle, HandleTables};
use crate::scan::{ScanCaches, Scanner};
use crate::tables::ImageTables;
use crate::Result;

/// Any field left `None` disables that filter. A method passes only when
/// every enabled filter matches.
#[derive(Default, Clone)]
pub struct MethodFilter<'f> {
    pub declaring_class: Option<u16>,
    pub return_type: Option<u16>,
    pub param_count: Option<u32>,
    pub shorty: Option<&'f [u8]>,
    pub ordered_params: Option<&'f [&'f [u8]]>,
    pub contains_params: Option<&'f [&'f [u8]]>,
}

impl<'f> MethodFilter<'f> {
    pub fn matches<'a, C: DexContainer<'a>>(&self, tables: &ImageTables<'a, C>, method_id: u32) -> Result<bool> {
        let Some(method) = tables.reader.methods().get(method_id as usize) else {
            return Ok(false);
        };
        if let Some(wanted) = self.declaring_class {
            if method.class_idx != wanted {
                return Ok(false);
            }
        }
        let Some(proto) = tables.reader.protos().get(method.proto_idx as usize) else {
            return Ok(false);
        };
        if let Some(wanted) = self.return_type {
            if proto.return_type_idx != wanted {
                return Ok(false);
            }
        }
        if let Some(wanted) = self.shorty {
            if tables.reader.get_string_bytes(proto.shorty_idx)? != wanted {
                return Ok(false);
            }
        }
        let params = tables.method_parameters(method_id)?;
        if let Some(wanted) = self.param_count {
            if params.len() as u32 != wanted {
                return Ok(false);
            }
        }
        if let Some(wanted) = self.ordered_params {
            if params.len() != wanted.len() {
                return Ok(false);
            }
            for (type_item, &w) in params.iter().zip(wanted.iter()) {
                if tables.reader.get_type_descriptor_bytes(type_item.type_idx)? != w {
                    return Ok(false);
                }
            }
        }
        if let Some(wanted) = self.contains_params {
            for &w in wanted {
                let mut found = false;
                for type_item in params {
                    if tables.reader.get_type_descriptor_bytes(type_item.type_idx)? == w {
                        found = true;
                        break;
                    }
                }
                if !found {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// Caller-supplied image order; an empty list means natural order.
pub fn priority_order(priority: &[usize], num_images: usize) -> Vec<usize> {
    if priority.is_empty() {
        (0..num_images).collect()
    } else {
        priority.iter().copied().filter(|&i| i < num_images).collect()
    }
}

pub struct Query;

impl Query {
    pub fn create_full_cache<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        caches: &[ScanCaches],
    ) -> Result<()> {
        for (tables, cache) in images.iter().zip(caches) {
            for method_id in 0..tables.num_methods() {
                Scanner::scan_method(tables, cache, method_id, None)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn find_method_using_string<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        caches: &[ScanCaches],
        handles: &HandleTables,
        needle: &[u8],
        match_prefix: bool,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        let mut out = Vec::new();
        for image in priority_order(priority, images.len()) {
            let tables = &images[image];
            let cache = &caches[image];
            let range = if match_prefix {
                tables.reader.find_string_prefix_range(needle)?
            } else {
                match tables.reader.find_string_exact(needle)? {
                    Some(id) => (id, id + 1),
                    None => continue,
                }
            };

            if find_first {
                if let Some(m) = Self::first_cached_in_range(cache, range) {
                    if let Some(h) = handles.handle_of_method(image, m) {
                        out.push(h);
                        return Ok(out);
                    }
                }
            }

            for method_id in 0..tables.num_methods() {
                if cache.is_scanned(method_id) {
                    continue;
                }
                if !filter.matches(tables, method_id)? {
                    continue;
                }
                Scanner::scan_method(tables, cache, method_id, Some(range))?;
            }

            for string_id in range.0..range.1 {
                for method_id in cache.string_users(string_id) {
                    if let Some(h) = handles.handle_of_method(image, method_id) {
                        out.push(h);
                        if find_first {
                            return Ok(out);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn first_cached_in_range(cache: &ScanCaches, range: (u32, u32)) -> Option<u32> {
        for string_id in range.0..range.1 {
            if let Some(&m) = cache.string_users(string_id).first() {
                return Some(m);
            }
        }
        None
    }

    pub fn find_method_invoking<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        caches: &[ScanCaches],
        handles: &HandleTables,
        caller: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        let mut out = Vec::new();
        for image in priority_order(priority, images.len()) {
            let Some(caller_id) = handles.method_id(caller, image) else {
                continue;
            };
            let tables = &images[image];
            let cache = &caches[image];
            Scanner::scan_method(tables, cache, caller_id, None)?;
            for callee_id in cache.invoking(caller_id) {
                if !filter.matches(tables, callee_id)? {
                    continue;
                }
                if let Some(h) = handles.handle_of_method(image, callee_id) {
                    out.push(h);
                    if find_first {
                        return Ok(out);
                    }
                }
            }
        }
        Ok(out)
    }

    fn find_by_reverse_method_cache<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        caches: &[ScanCaches],
        handles: &HandleTables,
        target: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
        lookup_cache: impl Fn(&ScanCaches, u32) -> Vec<u32>,
    ) -> Result<Vec<Handle>> {
        let mut out = Vec::new();
        for image in priority_order(priority, images.len()) {
            let Some(target_id) = handles.method_id(target, image) else {
                continue;
            };
            let tables = &images[image];
            let cache = &caches[image];

            if find_first {
                if let Some(&m) = lookup_cache(cache, target_id).first() {
                    if let Some(h) = handles.handle_of_method(image, m) {
                        out.push(h);
                        return Ok(out);
                    }
                }
            }

            for method_id in 0..tables.num_methods() {
                if cache.is_scanned(method_id) {
                    continue;
                }
                if !filter.matches(tables, method_id)? {
                    continue;
                }
                Scanner::scan_method(tables, cache, method_id, None)?;
            }

            for method_id in lookup_cache(cache, target_id) {
                if let Some(h) = handles.handle_of_method(image, method_id) {
                    out.push(h);
                    if find_first {
                        return Ok(out);
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn find_method_invoked<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        caches: &[ScanCaches],
        handles: &HandleTables,
        callee: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        Self::find_by_reverse_method_cache(images, caches, handles, callee, filter, priority, find_first, ScanCaches::invoked)
    }

    pub fn find_method_getting_field<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        caches: &[ScanCaches],
        handles: &HandleTables,
        field: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        Self::find_by_reverse_field_cache(images, caches, handles, field, filter, priority, find_first, ScanCaches::field_getters)
    }

    pub fn find_method_setting_field<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        caches: &[ScanCaches],
        handles: &HandleTables,
        field: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        Self::find_by_reverse_field_cache(images, caches, handles, field, filter, priority, find_first, ScanCaches::field_setters)
    }

    #[allow(clippy::too_many_arguments)]
    fn find_by_reverse_field_cache<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        caches: &[ScanCaches],
        handles: &HandleTables,
        field: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
        lookup_cache: impl Fn(&ScanCaches, u32) -> Vec<u32>,
    ) -> Result<Vec<Handle>> {
        let mut out = Vec::new();
        for image in priority_order(priority, images.len()) {
            let Some(field_id) = handles.field_id(field, image) else {
                continue;
            };
            let tables = &images[image];
            let cache = &caches[image];

            if find_first {
                if let Some(&m) = lookup_cache(cache, field_id).first() {
                    if let Some(h) = handles.handle_of_method(image, m) {
                        out.push(h);
                        return Ok(out);
                    }
                }
            }

            for method_id in 0..tables.num_methods() {
                if cache.is_scanned(method_id) {
                    continue;
                }
                if !filter.matches(tables, method_id)? {
                    continue;
                }
                Scanner::scan_method(tables, cache, method_id, None)?;
            }

            for method_id in lookup_cache(cache, field_id) {
                if let Some(h) = handles.handle_of_method(image, method_id) {
                    out.push(h);
                    if find_first {
                        return Ok(out);
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn find_field<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        handles: &HandleTables,
        declaring_type: Handle,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        let mut out = Vec::new();
        for image in priority_order(priority, images.len()) {
            let Some(type_id) = handles.class_type_id(declaring_type, image) else {
                continue;
            };
            if type_id > u16::MAX as u32 {
                continue;
            }
            let tables = &images[image];
            for &field_id in tables.declaring.get(&(type_id as u16)).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(h) = handles.handle_of_field(image, field_id) {
                    out.push(h);
                    if find_first {
                        return Ok(out);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Default, Clone)]
pub struct DecodedClass {
    pub descriptor: String,
}

#[derive(Debug, Default, Clone)]
pub struct DecodedField {
    pub declaring_class: String,
    pub name: String,
    pub field_type: String,
}

#[derive(Debug, Default, Clone)]
pub struct DecodedMethod {
    pub declaring_class: String,
    pub name: String,
    pub shorty: String,
    pub return_type: String,
    pub param_types: Vec<String>,
}

impl Query {
    pub fn decode_class<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        handles: &HandleTables,
        handle: Handle,
    ) -> Result<Option<DecodedClass>> {
        for image in 0..images.len() {
            let Some(type_id) = handles.class_type_id(handle, image) else { continue };
            let tables = &images[image];
            if type_id > u16::MAX as u32 {
                continue;
            }
            let descriptor = tables.reader.get_string_str(
                tables.reader.get_type_descriptor_idx(type_id as u16)?,
            )?;
            return Ok(Some(DecodedClass { descriptor }));
        }
        Ok(None)
    }

    pub fn decode_field<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        handles: &HandleTables,
        handle: Handle,
    ) -> Result<Option<DecodedField>> {
        for image in 0..images.len() {
            let Some(field_id) = handles.field_id(handle, image) else { continue };
            let tables = &images[image];
            let Some(field) = tables.reader.fields().get(field_id as usize) else { continue };
            let declaring_class = tables.reader.get_string_str(tables.reader.get_type_descriptor_idx(field.class_idx)?)?;
            let name = tables.reader.get_string_str(field.name_idx)?;
            let field_type = tables.reader.get_string_str(tables.reader.get_type_descriptor_idx(field.type_idx)?)?;
            return Ok(Some(DecodedField { declaring_class, name, field_type }));
        }
        Ok(None)
    }

    pub fn decode_method<'a, C: DexContainer<'a>>(
        images: &[ImageTables<'a, C>],
        handles: &HandleTables,
        handle: Handle,
    ) -> Result<Option<DecodedMethod>> {
        for image in 0..images.len() {
            let Some(method_id) = handles.method_id(handle, image) else { continue };
            let tables = &images[image];
            let Some(method) = tables.reader.methods().get(method_id as usize) else { continue };
            let Some(proto) = tables.reader.protos().get(method.proto_idx as usize) else { continue };
            let declaring_class = tables.reader.get_string_str(tables.reader.get_type_descriptor_idx(method.class_idx)?)?;
            let name = tables.reader.get_string_str(method.name_idx)?;
            let shorty = tables.reader.get_string_str(proto.shorty_idx)?;
            let return_type = tables.reader.get_string_str(tables.reader.get_type_descriptor_idx(proto.return_type_idx)?)?;
            let mut param_types = Vec::new();
            for type_item in tables.method_parameters(method_id)? {
                param_types.push(tables.reader.get_string_str(tables.reader.get_type_descriptor_idx(type_item.type_idx)?)?);
            }
            return Ok(Some(DecodedMethod { declaring_class, name, shorty, return_type, param_types }));
        }
        Ok(None)
    }
}

