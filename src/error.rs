use std::fmt::Debug;

use thiserror::Error;

#[derive(Error)]
pub enum DexError {
    #[error("Empty or truncated file")]
    TruncatedFile,

    #[error("Bad file magic")]
    BadFileMagic,

    #[error("Unknown dex version: {version}")]
    UnknownDexVersion { version: u32 },

    #[error("Bad file size ({actual}, expected at least {expected})")]
    FileSizeAtLeast { actual: usize, expected: usize },

    #[error("Bad header size: {size}, expected {expected}")]
    BadHeaderSize { size: u32, expected: u32 },

    #[error("Bad checksum: {actual:#08x}, expected {expected:#08x}")]
    BadChecksum { actual: u32, expected: u32 },

    #[error("Offset({offset}) should be within file size {size} for {section}")]
    BadOffsetTooLarge {
        offset: u32,
        size: usize,
        section: &'static str,
    },

    #[error("Index({index}) into {item_ty} should be less than {max}")]
    DexIndexError {
        index: u32,
        max: usize,
        item_ty: &'static str,
    },

    #[error("Bad string data at offset {0}: missing terminating null byte")]
    BadStringData(usize),

    #[error("{0}")]
    Mutf8DecodeError(#[from] std::string::FromUtf16Error),

    #[error("Failed to decode ULEB128 value at offset {offset}")]
    VarIntError { offset: usize },

    #[error("Encoded index {index} plus delta {next_index} overflows while decoding {item_ty}")]
    BadEncodedIndex {
        index: u32,
        next_index: u32,
        item_ty: &'static str,
    },

}

impl Debug for DexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Ergonomic constructor for [`DexError`] variants, mirroring the shape of
/// `anyhow`'s `bail!` but returning a typed `Result<T, DexError>`.
#[macro_export]
macro_rules! dex_err {
    ($name:ident) => {
        Err($crate::error::DexError::$name)
    };
    ($name:ident { $($arg:tt)* }) => {
        Err($crate::error::DexError::$name { $($arg)* })
    };
    ($name:ident, $($arg:tt)*) => {
        Err($crate::error::DexError::$name($($arg)*))
    };
}
