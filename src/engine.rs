//! Public entry point: wires together image tables, scan caches, and the
//! global handle table behind the find/decode operations.

use std::cell::RefCell;

use crate::dex::container::{DexContainer, InMemoryDexContainer};
use crate::dex::reader::{DexReader, VerifyOptions};
use crate::handle::{Handle, HandleTables};
use crate::query::{DecodedClass, DecodedField, DecodedMethod, MethodFilter, Query};
use crate::scan::ScanCaches;
use crate::tables::ImageTables;
use crate::utf::str_to_mutf8;
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct EngineOptions {
    /// Validate each image's Adler-32 checksum at construction time. Off by
    /// default: the engine is never the party responsible for keeping an
    /// image's checksum current (it never mutates DEX bytes).
    pub verify_checksum: bool,
}

impl EngineOptions {
    pub fn verify_checksum(mut self, enable: bool) -> Self {
        self.verify_checksum = enable;
        self
    }
}

/// The multi-DEX cross-reference engine. Everything but the scan caches, the
/// scanned bitmap, and the handle table is immutable after construction.
pub struct Engine<'a, C: DexContainer<'a> = InMemoryDexContainer<'a>> {
    images: Vec<ImageTables<'a, C>>,
    caches: Vec<ScanCaches>,
    handles: RefCell<HandleTables>,
}

impl<'a> Engine<'a, InMemoryDexContainer<'a>> {
    /// Builds an engine directly over borrowed `(pointer, length)` DEX
    /// images, the common case when images arrive as byte slices handed
    /// across an FFI boundary or read from disk by the embedder.
    pub fn from_slices(images: &[&'a [u8]], options: EngineOptions) -> Result<Self> {
        let verify = VerifyOptions {
            verify_checksum: options.verify_checksum,
        };
        let mut tables = Vec::with_capacity(images.len());
        for data in images {
            let reader = DexReader::from_bytes_verified(data, verify)?;
            tables.push(ImageTables::build(reader)?);
        }
        Ok(Self::from_tables(tables))
    }
}

impl<'a, C: DexContainer<'a>> Engine<'a, C> {
    /// Builds an engine over containers owned by the caller and borrowed for
    /// the engine's whole lifetime, e.g. memory-mapped files kept open by
    /// the embedder.
    pub fn from_containers(containers: &'a [C], options: EngineOptions) -> Result<Self> {
        let verify = VerifyOptions {
            verify_checksum: options.verify_checksum,
        };
        let mut tables = Vec::with_capacity(containers.len());
        for container in containers {
            let reader = DexReader::from_container(container, verify)?;
            tables.push(ImageTables::build(reader)?);
        }
        Ok(Self::from_tables(tables))
    }

    fn from_tables(images: Vec<ImageTables<'a, C>>) -> Self {
        let caches = images.iter().map(|t| ScanCaches::new(t.num_methods())).collect();
        let handles = RefCell::new(HandleTables::new(images.len()));
        Self { images, caches, handles }
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    pub fn create_class_index(&self, class_descriptor: &str, preferred_image: Option<usize>) -> Result<Option<Handle>> {
        let descriptor = str_to_mutf8(class_descriptor);
        self.handles
            .borrow_mut()
            .create_class_index(&self.images, &descriptor, preferred_image)
    }

    pub fn create_field_index(
        &self,
        class_descriptor: &str,
        field_name: &str,
        preferred_image: Option<usize>,
    ) -> Result<Option<Handle>> {
        let class = str_to_mutf8(class_descriptor);
        let name = str_to_mutf8(field_name);
        self.handles
            .borrow_mut()
            .create_field_index(&self.images, &class, &name, preferred_image)
    }

    pub fn create_method_index(
        &self,
        class_descriptor: &str,
        method_name: &str,
        param_descriptors: &[&str],
        preferred_image: Option<usize>,
    ) -> Result<Option<Handle>> {
        let class = str_to_mutf8(class_descriptor);
        let name = str_to_mutf8(method_name);
        let params: Vec<Vec<u8>> = param_descriptors.iter().map(|p| str_to_mutf8(p)).collect();
        let param_refs: Vec<&[u8]> = params.iter().map(Vec::as_slice).collect();
        self.handles
            .borrow_mut()
            .create_method_index(&self.images, &class, &name, &param_refs, preferred_image)
    }

    pub fn create_full_cache(&self) -> Result<()> {
        Query::create_full_cache(&self.images, &self.caches)
    }

    pub fn find_method_using_string(
        &self,
        needle: &str,
        match_prefix: bool,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        let needle = str_to_mutf8(needle);
        Query::find_method_using_string(
            &self.images,
            &self.caches,
            &self.handles.borrow(),
            &needle,
            match_prefix,
            filter,
            priority,
            find_first,
        )
    }

    pub fn find_method_invoking(
        &self,
        caller: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        Query::find_method_invoking(&self.images, &self.caches, &self.handles.borrow(), caller, filter, priority, find_first)
    }

    pub fn find_method_invoked(
        &self,
        callee: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        Query::find_method_invoked(&self.images, &self.caches, &self.handles.borrow(), callee, filter, priority, find_first)
    }

    pub fn find_method_getting_field(
        &self,
        field: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        Query::find_method_getting_field(&self.images, &self.caches, &self.handles.borrow(), field, filter, priority, find_first)
    }

    pub fn find_method_setting_field(
        &self,
        field: Handle,
        filter: &MethodFilter,
        priority: &[usize],
        find_first: bool,
    ) -> Result<Vec<Handle>> {
        Query::find_method_setting_field(&self.images, &self.caches, &self.handles.borrow(), field, filter, priority, find_first)
    }

    pub fn find_field(&self, declaring_type: Handle, priority: &[usize], find_first: bool) -> Result<Vec<Handle>> {
        Query::find_field(&self.images, &self.handles.borrow(), declaring_type, priority, find_first)
    }

    pub fn decode_class(&self, handle: Handle) -> Result<Option<DecodedClass>> {
        Query::decode_class(&self.images, &self.handles.borrow(), handle)
    }

    pub fn decode_field(&self, handle: Handle) -> Result<Option<DecodedField>> {
        Query::decode_field(&self.images, &self.handles.borrow(), handle)
    }

    pub fn decode_method(&self, handle: Handle) -> Result<Option<DecodedMethod>> {
        Query::decode_method(&self.images, &self.handles.borrow(), handle)
    }
}
