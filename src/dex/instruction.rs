//! Dalvik instruction stream decoding: opcode lengths and the three
//! variable-length "payload" pseudo-instructions a scanner must step over.

/// `packed-switch-payload` pseudo-opcode, identified by the raw 16-bit unit
/// at the payload's start (never a real opcode byte).
pub const PACKED_SWITCH_SIGNATURE: u16 = 0x0100;
/// `sparse-switch-payload`.
pub const SPARSE_SWITCH_SIGNATURE: u16 = 0x0200;
/// `fill-array-data-payload`.
pub const ARRAY_DATA_SIGNATURE: u16 = 0x0300;

/// Length, in 16-bit code units, of every fixed-format Dalvik opcode. Entries
/// for opcodes with a variable-length payload (packed-switch, sparse-switch,
/// fill-array-data) hold their *base* `nop`-sized unit (1); the real advance
/// for those is computed by [`payload_len_in_code_units`] from the payload
/// itself, not from this table. Unused/reserved opcode bytes default to 1,
/// same as the reference tool's length table.
#[rustfmt::skip]
pub const OPCODE_LEN: [u8; 256] = build_opcode_len_table();

const fn set(mut table: [u8; 256], lo: usize, hi: usize, len: u8) -> [u8; 256] {
    let mut i = lo;
    while i <= hi {
        table[i] = len;
        i += 1;
    }
    table
}

const fn build_opcode_len_table() -> [u8; 256] {
    let t = [1u8; 256];
    let t = set(t, 0x02, 0x02, 2); // move/from16
    let t = set(t, 0x03, 0x03, 3); // move/16
    let t = set(t, 0x05, 0x05, 2); // move-wide/from16
    let t = set(t, 0x06, 0x06, 3); // move-wide/16
    let t = set(t, 0x08, 0x08, 2); // move-object/from16
    let t = set(t, 0x09, 0x09, 3); // move-object/16
    let t = set(t, 0x13, 0x13, 2); // const/16
    let t = set(t, 0x14, 0x14, 3); // const
    let t = set(t, 0x15, 0x15, 2); // const/high16
    let t = set(t, 0x16, 0x16, 2); // const-wide/16
    let t = set(t, 0x17, 0x17, 3); // const-wide/32
    let t = set(t, 0x18, 0x18, 5); // const-wide
    let t = set(t, 0x19, 0x19, 2); // const-wide/high16
    let t = set(t, 0x1a, 0x1a, 2); // const-string
    let t = set(t, 0x1b, 0x1b, 3); // const-string/jumbo
    let t = set(t, 0x1c, 0x1c, 2); // const-class
    let t = set(t, 0x1f, 0x1f, 2); // check-cast
    let t = set(t, 0x20, 0x20, 2); // instance-of
    let t = set(t, 0x22, 0x22, 2); // new-instance
    let t = set(t, 0x23, 0x23, 2); // new-array
    let t = set(t, 0x24, 0x24, 3); // filled-new-array
    let t = set(t, 0x25, 0x25, 3); // filled-new-array/range
    let t = set(t, 0x26, 0x26, 3); // fill-array-data (base; real length via payload)
    let t = set(t, 0x29, 0x29, 2); // goto/16
    let t = set(t, 0x2a, 0x2a, 3); // goto/32
    let t = set(t, 0x2b, 0x2c, 3); // packed-switch, sparse-switch (base; real length via payload)
    let t = set(t, 0x2d, 0x31, 2); // cmpkind
    let t = set(t, 0x32, 0x37, 2); // if-test
    let t = set(t, 0x38, 0x3d, 2); // if-testz
    let t = set(t, 0x44, 0x51, 2); // arrayop
    let t = set(t, 0x52, 0x5f, 2); // iinstanceop
    let t = set(t, 0x60, 0x6d, 2); // sstaticop
    let t = set(t, 0x6e, 0x72, 3); // invoke-kind
    let t = set(t, 0x74, 0x78, 3); // invoke-kind/range
    let t = set(t, 0x90, 0xaf, 2); // binop
    let t = set(t, 0xd0, 0xd7, 2); // binop/lit16
    let t = set(t, 0xd8, 0xe2, 2); // binop/lit8
    let t = set(t, 0xfa, 0xfb, 4); // invoke-polymorphic[/range]
    let t = set(t, 0xfc, 0xfd, 3); // invoke-custom[/range]
    let t = set(t, 0xfe, 0xff, 2); // const-method-handle, const-method-type
    t
}

#[inline]
pub fn opcode_at(unit: u16) -> u8 {
    (unit & 0xFF) as u8
}

/// Total length, in 16-bit code units, of the switch/array-data payload
/// whose header starts at `units[0]`. `units[1]` is the payload's element
/// count in both switch forms; for `fill-array-data` the element width
/// (bytes) lives in `units[1]` and the element count as a `u32` spans
/// `units[2..4]`.
pub fn payload_len_in_code_units(units: &[u16]) -> u32 {
    let signature = units[0];
    let size = units[1] as u32;
    match signature {
        PACKED_SWITCH_SIGNATURE => 4 + size * 2,
        SPARSE_SWITCH_SIGNATURE => 2 + size * 4,
        ARRAY_DATA_SIGNATURE => {
            let element_count = units[2] as u32 | ((units[3] as u32) << 16);
            4 + (size * element_count + 1) / 2
        }
        _ => 1,
    }
}

pub fn is_payload_signature(unit: u16) -> bool {
    matches!(
        unit,
        PACKED_SWITCH_SIGNATURE | SPARSE_SWITCH_SIGNATURE | ARRAY_DATA_SIGNATURE
    )
}

pub mod opcodes {
    pub const CONST_STRING: u8 = 0x1a;
    pub const CONST_STRING_JUMBO: u8 = 0x1b;

    pub const IGET_FIRST: u8 = 0x52;
    pub const IGET_LAST: u8 = 0x58;
    pub const IPUT_FIRST: u8 = 0x59;
    pub const IPUT_LAST: u8 = 0x5f;
    pub const SGET_FIRST: u8 = 0x60;
    pub const SGET_LAST: u8 = 0x66;
    pub const SPUT_FIRST: u8 = 0x67;
    pub const SPUT_LAST: u8 = 0x6d;

    pub const INVOKE_FIRST: u8 = 0x6e;
    pub const INVOKE_LAST: u8 = 0x72;
    pub const INVOKE_RANGE_FIRST: u8 = 0x74;
    pub const INVOKE_RANGE_LAST: u8 = 0x78;
}
