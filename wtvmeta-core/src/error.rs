//! Error type shared by the metadata reader.

use thiserror::Error;

use crate::wtv_meta::MetaType;

#[derive(Debug, Error)]
pub enum WtvError {
    #[error("Read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown metadata type {tag} for field {name:?}")]
    UnknownType { tag: u32, name: String },
    #[error("Payload too short for {name:?} ({kind:?}): need {needed} bytes, have {actual}")]
    PayloadTooShort {
        name: String,
        kind: MetaType,
        needed: usize,
        actual: usize,
    },
    #[error("Unterminated wide string in payload")]
    Unterminated,
}

pub type Result<T> = std::result::Result<T, WtvError>;
