//! # WTV Metadata Core
//!
//! Pure Rust reader for the metadata records Windows Media Center embeds
//! in WTV (Windows Recorded TV) files.

// ============================================================================
// Errors
// ============================================================================
pub mod error;

// ============================================================================
// Container Metadata
// ============================================================================
pub mod wtv_meta;

pub use error::{Result, WtvError};
pub use wtv_meta::{
    parse_file, parse_reader, MetaEntry, MetaType, MetaValue, ParseOptions, WtvMetaParser,
    WtvMetadata, METADATA_OFFSET,
};

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
