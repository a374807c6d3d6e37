//! Synthetic DEX image builder used by the integration tests in this
//! directory. No real `.dex` fixtures exist in this crate's test tree, so
//! tests assemble minimal, spec-valid images by hand.
//!
//! Only what the engine under test actually consults is modeled faithfully
//! (string sort order, class_data diff-encoding, code_item layout); anything
//! it never reads (annotations, debug info, static values) is left at zero.

use std::collections::HashMap;

const NO_INDEX_U32: u32 = 0xFFFF_FFFF;
const NO_INDEX_U16: u16 = 0xFFFF;

fn str_to_mutf8(s: &str) -> Vec<u8> {
    // Every descriptor/name used by these fixtures is plain ASCII, so the
    // modified-UTF-8 encoding is just the UTF-8 bytes themselves.
    s.as_bytes().to_vec()
}

fn push_uleb128(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn align4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

#[derive(Clone)]
struct ProtoSpec {
    shorty: u32,
    return_type: u16,
    params: Vec<u16>,
}

struct FieldSpec {
    class_idx: u16,
    type_idx: u16,
    name: u32,
}

struct MethodSpec {
    class_idx: u16,
    proto_idx: u16,
    name: u32,
}

struct ClassSpec {
    class_idx: u16,
    access_flags: u32,
    source_file: Option<u32>,
    static_fields: Vec<(u32, u32)>,
    instance_fields: Vec<(u32, u32)>,
    direct_methods: Vec<(u32, u32, Option<Vec<u16>>)>,
    virtual_methods: Vec<(u32, u32, Option<Vec<u16>>)>,
}

/// One `map_list` entry a test wants emitted verbatim, bypassing the normal
/// section bookkeeping (used to exercise the bounds sanity check).
pub struct RawMapItem {
    pub type_: u16,
    pub size: u32,
    pub off: u32,
}

pub struct DexBuilder {
    string_pool: Vec<Vec<u8>>,
    string_utf16_len: Vec<u32>,
    string_index: HashMap<Vec<u8>, u32>,
    types: Vec<u32>,
    type_index: HashMap<u32, u16>,
    protos: Vec<ProtoSpec>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
    classes: Vec<ClassSpec>,
    map_items: Option<Vec<RawMapItem>>,
}

impl DexBuilder {
    pub fn new() -> Self {
        Self {
            string_pool: Vec::new(),
            string_utf16_len: Vec::new(),
            string_index: HashMap::new(),
            types: Vec::new(),
            type_index: HashMap::new(),
            protos: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            classes: Vec::new(),
            map_items: None,
        }
    }

    fn intern(&mut self, s: &str) -> u32 {
        let bytes = str_to_mutf8(s);
        if let Some(&id) = self.string_index.get(&bytes) {
            return id;
        }
        let id = self.string_pool.len() as u32;
        self.string_utf16_len.push(s.encode_utf16().count() as u32);
        self.string_pool.push(bytes.clone());
        self.string_index.insert(bytes, id);
        id
    }

    /// Interns a string for use as a `const-string` operand. Call this only
    /// after every other builder call that could intern a string (class/
    /// field/method/proto names) has already run, then read back its final
    /// position with [`DexBuilder::final_string_index`] — the position is
    /// only stable once the pool stops growing.
    pub fn intern_string(&mut self, s: &str) -> u32 {
        self.intern(s)
    }

    /// The index `s` will occupy in the sorted `string_ids` table once
    /// `build()` runs, assuming no further strings are interned after this
    /// call.
    pub fn final_string_index(&self, s: &str) -> u16 {
        let target = str_to_mutf8(s);
        self.string_pool.iter().filter(|bytes| **bytes < target).count() as u16
    }

    pub fn intern_type(&mut self, descriptor: &str) -> u16 {
        let name = self.intern(descriptor);
        if let Some(&idx) = self.type_index.get(&name) {
            return idx;
        }
        let idx = self.types.len() as u16;
        self.types.push(name);
        self.type_index.insert(name, idx);
        idx
    }

    pub fn add_proto(&mut self, shorty: &str, return_type: &str, params: &[&str]) -> u16 {
        let shorty = self.intern(shorty);
        let return_type = self.intern_type(return_type);
        let params = params.iter().map(|p| self.intern_type(p)).collect();
        self.protos.push(ProtoSpec { shorty, return_type, params });
        (self.protos.len() - 1) as u16
    }

    pub fn add_field(&mut self, class: &str, field_type: &str, name: &str) -> u32 {
        let class_idx = self.intern_type(class);
        let type_idx = self.intern_type(field_type);
        let name = self.intern(name);
        self.fields.push(FieldSpec { class_idx, type_idx, name });
        (self.fields.len() - 1) as u32
    }

    pub fn add_method(&mut self, class: &str, name: &str, proto: u16) -> u32 {
        let class_idx = self.intern_type(class);
        let name = self.intern(name);
        self.methods.push(MethodSpec { class_idx, proto_idx: proto, name });
        (self.methods.len() - 1) as u32
    }

    pub fn add_class(&mut self, descriptor: &str) -> usize {
        let class_idx = self.intern_type(descriptor);
        self.classes.push(ClassSpec {
            class_idx,
            access_flags: 0x1, // public
            source_file: None,
            static_fields: Vec::new(),
            instance_fields: Vec::new(),
            direct_methods: Vec::new(),
            virtual_methods: Vec::new(),
        });
        self.classes.len() - 1
    }

    pub fn class_add_static_field(&mut self, class: usize, field_id: u32, access_flags: u32) {
        self.classes[class].static_fields.push((field_id, access_flags));
    }

    pub fn class_add_instance_field(&mut self, class: usize, field_id: u32, access_flags: u32) {
        self.classes[class].instance_fields.push((field_id, access_flags));
    }

    pub fn class_add_direct_method(&mut self, class: usize, method_id: u32, access_flags: u32, insns: Option<Vec<u16>>) {
        self.classes[class].direct_methods.push((method_id, access_flags, insns));
    }

    pub fn class_add_virtual_method(&mut self, class: usize, method_id: u32, access_flags: u32, insns: Option<Vec<u16>>) {
        self.classes[class].virtual_methods.push((method_id, access_flags, insns));
    }

    /// Overrides the emitted `map_list` with exactly these entries, instead
    /// of the single-entry list `build()` would otherwise synthesize.
    pub fn set_map_list(&mut self, entries: Vec<RawMapItem>) {
        self.map_items = Some(entries);
    }

    pub fn build(self) -> Vec<u8> {
        let DexBuilder {
            string_pool,
            string_utf16_len,
            types,
            protos,
            fields,
            methods,
            mut classes,
            map_items,
            ..
        } = self;

        // Sort strings by byte value (the format's own invariant, and what
        // `DexReader::find_string_exact`/`find_string_prefix_range` assume)
        // and remap every string reference accordingly.
        let mut order: Vec<u32> = (0..string_pool.len() as u32).collect();
        order.sort_by(|&a, &b| string_pool[a as usize].cmp(&string_pool[b as usize]));
        let mut remap = vec![0u32; string_pool.len()];
        for (new_id, &old_id) in order.iter().enumerate() {
            remap[old_id as usize] = new_id as u32;
        }
        let sorted_strings: Vec<&Vec<u8>> = order.iter().map(|&id| &string_pool[id as usize]).collect();
        let sorted_utf16_len: Vec<u32> = order.iter().map(|&id| string_utf16_len[id as usize]).collect();

        for class in &mut classes {
            class.static_fields.sort_by_key(|&(id, _)| id);
            class.instance_fields.sort_by_key(|&(id, _)| id);
            class.direct_methods.sort_by_key(|&(id, _, _)| id);
            class.virtual_methods.sort_by_key(|&(id, _, _)| id);
        }

        let mut buf = vec![0u8; 0x70];

        // string_data_item section, one per sorted string.
        let mut string_data_off = Vec::with_capacity(sorted_strings.len());
        for (bytes, &utf16_len) in sorted_strings.iter().zip(&sorted_utf16_len) {
            string_data_off.push(buf.len() as u32);
            push_uleb128(&mut buf, utf16_len);
            buf.extend_from_slice(bytes);
            buf.push(0);
        }

        align4(&mut buf);
        let string_ids_off = buf.len() as u32;
        for off in &string_data_off {
            buf.extend_from_slice(&off.to_le_bytes());
        }

        align4(&mut buf);
        let type_ids_off = buf.len() as u32;
        for &name in &types {
            buf.extend_from_slice(&remap[name as usize].to_le_bytes());
        }

        // type_list (proto parameters), one per non-empty proto parameter list.
        let mut proto_params_off = vec![0u32; protos.len()];
        for (i, proto) in protos.iter().enumerate() {
            if proto.params.is_empty() {
                continue;
            }
            align4(&mut buf);
            proto_params_off[i] = buf.len() as u32;
            buf.extend_from_slice(&(proto.params.len() as u32).to_le_bytes());
            for &type_idx in &proto.params {
                buf.extend_from_slice(&type_idx.to_le_bytes());
            }
        }

        align4(&mut buf);
        let proto_ids_off = buf.len() as u32;
        for (i, proto) in protos.iter().enumerate() {
            buf.extend_from_slice(&remap[proto.shorty as usize].to_le_bytes());
            buf.extend_from_slice(&proto.return_type.to_le_bytes());
            buf.extend_from_slice(&0u16.to_le_bytes()); // pad
            buf.extend_from_slice(&proto_params_off[i].to_le_bytes());
        }

        align4(&mut buf);
        let field_ids_off = buf.len() as u32;
        for field in &fields {
            buf.extend_from_slice(&field.class_idx.to_le_bytes());
            buf.extend_from_slice(&field.type_idx.to_le_bytes());
            buf.extend_from_slice(&remap[field.name as usize].to_le_bytes());
        }

        align4(&mut buf);
        let method_ids_off = buf.len() as u32;
        for method in &methods {
            buf.extend_from_slice(&method.class_idx.to_le_bytes());
            buf.extend_from_slice(&method.proto_idx.to_le_bytes());
            buf.extend_from_slice(&remap[method.name as usize].to_le_bytes());
        }

        // code_item per method with a body, emitted before class_data so the
        // data_off each class_data entry records already exists.
        let mut code_off: HashMap<u32, u32> = HashMap::new();
        for class in &classes {
            for (method_id, _, insns) in class.direct_methods.iter().chain(&class.virtual_methods) {
                let Some(insns) = insns else { continue };
                align4(&mut buf);
                code_off.insert(*method_id, buf.len() as u32);
                let registers_size: u16 = 4;
                let ins_size: u16 = 1;
                let outs_size: u16 = 4;
                buf.extend_from_slice(&registers_size.to_le_bytes());
                buf.extend_from_slice(&ins_size.to_le_bytes());
                buf.extend_from_slice(&outs_size.to_le_bytes());
                buf.extend_from_slice(&0u16.to_le_bytes()); // tries_size
                buf.extend_from_slice(&0u32.to_le_bytes()); // debug_info_off
                buf.extend_from_slice(&(insns.len() as u32).to_le_bytes());
                for unit in insns {
                    buf.extend_from_slice(&unit.to_le_bytes());
                }
            }
        }

        // class_data_item blobs, one per class (always emitted, even for an
        // all-empty class, so every class_def gets a non-zero class_data_off).
        let mut class_data_off = Vec::with_capacity(classes.len());
        for class in &classes {
            class_data_off.push(buf.len() as u32);
            push_uleb128(&mut buf, class.static_fields.len() as u32);
            push_uleb128(&mut buf, class.instance_fields.len() as u32);
            push_uleb128(&mut buf, class.direct_methods.len() as u32);
            push_uleb128(&mut buf, class.virtual_methods.len() as u32);

            let mut prev = 0u32;
            for &(id, access) in &class.static_fields {
                push_uleb128(&mut buf, id - prev);
                push_uleb128(&mut buf, access);
                prev = id;
            }
            prev = 0;
            for &(id, access) in &class.instance_fields {
                push_uleb128(&mut buf, id - prev);
                push_uleb128(&mut buf, access);
                prev = id;
            }
            prev = 0;
            for &(id, access, _) in &class.direct_methods {
                push_uleb128(&mut buf, id - prev);
                push_uleb128(&mut buf, access);
                push_uleb128(&mut buf, code_off.get(&id).copied().unwrap_or(0));
                prev = id;
            }
            prev = 0;
            for &(id, access, _) in &class.virtual_methods {
                push_uleb128(&mut buf, id - prev);
                push_uleb128(&mut buf, access);
                push_uleb128(&mut buf, code_off.get(&id).copied().unwrap_or(0));
                prev = id;
            }
        }

        align4(&mut buf);
        let class_defs_off = buf.len() as u32;
        for (i, class) in classes.iter().enumerate() {
            buf.extend_from_slice(&class.class_idx.to_le_bytes());
            buf.extend_from_slice(&0u16.to_le_bytes()); // pad1
            buf.extend_from_slice(&class.access_flags.to_le_bytes());
            buf.extend_from_slice(&NO_INDEX_U16.to_le_bytes()); // superclass_idx, unused by this engine
            buf.extend_from_slice(&0u16.to_le_bytes()); // pad2
            buf.extend_from_slice(&0u32.to_le_bytes()); // interfaces_off
            let source_file = class.source_file.map(|s| remap[s as usize]).unwrap_or(NO_INDEX_U32);
            buf.extend_from_slice(&source_file.to_le_bytes());
            buf.extend_from_slice(&0u32.to_le_bytes()); // annotations_off
            buf.extend_from_slice(&class_data_off[i].to_le_bytes());
            buf.extend_from_slice(&0u32.to_le_bytes()); // static_values_off
        }

        align4(&mut buf);
        let map_off = buf.len() as u32;
        match map_items {
            Some(entries) => {
                buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
                for entry in entries {
                    buf.extend_from_slice(&entry.type_.to_le_bytes());
                    buf.extend_from_slice(&0u16.to_le_bytes());
                    buf.extend_from_slice(&entry.size.to_le_bytes());
                    buf.extend_from_slice(&entry.off.to_le_bytes());
                }
            }
            None => {
                // A single "header item" entry, same as a real dex writer
                // would emit at minimum.
                buf.extend_from_slice(&1u32.to_le_bytes());
                buf.extend_from_slice(&0x0000u16.to_le_bytes()); // TYPE_HEADER_ITEM
                buf.extend_from_slice(&0u16.to_le_bytes());
                buf.extend_from_slice(&1u32.to_le_bytes());
                buf.extend_from_slice(&0u32.to_le_bytes());
            }
        }

        let file_size = buf.len() as u32;

        buf[0..8].copy_from_slice(b"dex\n035\0");
        buf[32..36].copy_from_slice(&file_size.to_le_bytes());
        buf[36..40].copy_from_slice(&0x70u32.to_le_bytes());
        buf[40..44].copy_from_slice(&0x12345678u32.to_le_bytes());
        buf[44..48].copy_from_slice(&0u32.to_le_bytes()); // link_size
        buf[48..52].copy_from_slice(&0u32.to_le_bytes()); // link_off
        buf[52..56].copy_from_slice(&map_off.to_le_bytes());
        buf[56..60].copy_from_slice(&(sorted_strings.len() as u32).to_le_bytes());
        buf[60..64].copy_from_slice(&string_ids_off.to_le_bytes());
        buf[64..68].copy_from_slice(&(types.len() as u32).to_le_bytes());
        buf[68..72].copy_from_slice(&type_ids_off.to_le_bytes());
        buf[72..76].copy_from_slice(&(protos.len() as u32).to_le_bytes());
        buf[76..80].copy_from_slice(&proto_ids_off.to_le_bytes());
        buf[80..84].copy_from_slice(&(fields.len() as u32).to_le_bytes());
        buf[84..88].copy_from_slice(&field_ids_off.to_le_bytes());
        buf[88..92].copy_from_slice(&(methods.len() as u32).to_le_bytes());
        buf[92..96].copy_from_slice(&method_ids_off.to_le_bytes());
        buf[96..100].copy_from_slice(&(classes.len() as u32).to_le_bytes());
        buf[100..104].copy_from_slice(&class_defs_off.to_le_bytes());
        buf[104..108].copy_from_slice(&0u32.to_le_bytes()); // data_size, unused by this engine
        buf[108..112].copy_from_slice(&string_ids_off.to_le_bytes()); // data_off, same rationale

        let checksum = adler32::adler32(&buf[12..file_size as usize]).unwrap_or(0);
        buf[8..12].copy_from_slice(&checksum.to_le_bytes());

        buf
    }
}

pub mod insn {
    //! Hand-assembled Dalvik instruction units for the subset of opcodes the
    //! engine's scanner inspects. Registers and argument encodings outside
    //! what the scanner reads (`units[1]`/`units[2..4]`) are filled with
    //! harmless placeholder nibbles.

    pub fn const_string(dest_reg: u8, string_idx: u16) -> [u16; 2] {
        [0x1a | ((dest_reg as u16) << 8), string_idx]
    }

    pub fn const_string_jumbo(dest_reg: u8, string_idx: u32) -> [u16; 3] {
        [0x1b | ((dest_reg as u16) << 8), (string_idx & 0xFFFF) as u16, (string_idx >> 16) as u16]
    }

    /// `invoke-virtual {regs}, method@idx`; `argc` and the register list are
    /// cosmetic here since the scanner only reads the method index.
    pub fn invoke_virtual(argc: u8, method_idx: u32, regs: u16) -> [u16; 3] {
        [0x6e | ((argc as u16) << 12), method_idx as u16, regs]
    }

    pub fn sget(dest_reg: u8, field_idx: u32) -> [u16; 2] {
        [0x60 | ((dest_reg as u16) << 8), field_idx as u16]
    }

    pub fn sput(src_reg: u8, field_idx: u32) -> [u16; 2] {
        [0x67 | ((src_reg as u16) << 8), field_idx as u16]
    }

    pub fn iget_object(dest_reg: u8, _obj_reg: u8, field_idx: u32) -> [u16; 2] {
        [0x54 | ((dest_reg as u16) << 8), field_idx as u16]
    }

    pub fn iput_object(src_reg: u8, _obj_reg: u8, field_idx: u32) -> [u16; 2] {
        [0x5b | ((src_reg as u16) << 8), field_idx as u16]
    }

    pub fn return_void() -> [u16; 1] {
        [0x0e]
    }

    /// A `packed-switch-payload` pseudo-instruction, only ever reached by
    /// jumping over it; used to exercise the scanner's payload-skipping
    /// logic rather than for its branch targets.
    pub fn packed_switch_payload(first_key: i32, targets: &[i32]) -> Vec<u16> {
        let mut units = vec![0x0100u16, targets.len() as u16];
        let fk = first_key.to_le_bytes();
        units.push(u16::from_le_bytes([fk[0], fk[1]]));
        units.push(u16::from_le_bytes([fk[2], fk[3]]));
        for &t in targets {
            let b = t.to_le_bytes();
            units.push(u16::from_le_bytes([b[0], b[1]]));
            units.push(u16::from_le_bytes([b[2], b[3]]));
        }
        units
    }
}
