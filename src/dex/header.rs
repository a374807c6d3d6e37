#[repr(C)]
#[derive(Debug, Clone)]
pub struct Header {
    magic: [u8; 8],

    /// Adler32 checksum of the rest of the file (everything but `magic` and
    /// this field); used to detect file corruption.
    pub checksum: u32,

    /// SHA-1 signature of the rest of the file; used to uniquely identify
    /// files.
    signature: [u8; 20],

    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,

    pub link_size: u32,
    pub link_off: u32,

    pub map_off: u32,

    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,

    pub data_size: u32,
    pub data_off: u32,
}

unsafe impl plain::Plain for Header {}

pub const HEADER_SIZE: u32 = 0x70;
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const DEX_MAGIC: &[u8; 4] = b"dex\n";

impl Header {
    pub fn get_magic(&self) -> &[u8; 8] {
        &self.magic
    }

    pub fn get_signature(&self) -> &[u8; 20] {
        &self.signature
    }

    /// Parses the 3-digit version embedded in the magic (`dex\nXXX\0`).
    pub fn get_version(&self) -> u32 {
        let version_raw = &self.magic[4..7];
        String::from_utf8_lossy(version_raw).parse().unwrap_or(0)
    }
}
