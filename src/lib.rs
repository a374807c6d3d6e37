//! Multi-DEX cross-reference engine: builds string/type/field/method tables
//! over one or more in-memory DEX images and answers structural queries
//! (string usage, caller/callee, field get/set) across all of them as if
//! they were one logical program.
//!
//! Loading the bytes, verifying DEX container/ODEX wrapping formats, and any
//! FFI surface are left to the embedder; this crate only ever borrows
//! `(pointer, length)` views through [`dex::DexContainer`].

pub mod dex;
pub mod engine;
pub mod error;
pub mod handle;
pub mod leb128;
pub mod query;
pub mod scan;
pub mod tables;
pub mod utf;

pub use dex::reader::NO_INDEX;
pub use engine::{Engine, EngineOptions};
pub use error::DexError;
pub use handle::Handle;
pub use query::{DecodedClass, DecodedField, DecodedMethod, MethodFilter};

pub type Result<T> = std::result::Result<T, DexError>;
