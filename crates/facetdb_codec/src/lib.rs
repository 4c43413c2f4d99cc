//! # FacetDB Codec
//!
//! The document value model for FacetDB and its two encodings.
//!
//! - **Storage**: documents are encoded as CBOR via `ciborium`. Field maps
//!   are sorted by key, so equal documents produce identical bytes.
//! - **Boundary**: documents cross the remote invocation boundary as JSON
//!   via `serde_json`.
//!
//! ## Value Rules
//!
//! - Map keys are always strings
//! - Integers are `i64`; larger decoded integers are rejected
//! - Floats must be finite
//! - Byte strings are not part of the model
//!
//! ## Usage
//!
//! ```
//! use facetdb_codec::{decode_document, encode_document, Document};
//!
//! let mut doc = Document::new();
//! doc.insert("name", "John");
//! doc.insert("coins", 200i64);
//!
//! let bytes = encode_document(&doc).unwrap();
//! assert_eq!(decode_document(&bytes).unwrap(), doc);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod encoding;
mod error;
mod value;

pub use document::Document;
pub use encoding::{
    decode_document, encode_document, from_cbor, from_json, to_cbor, to_json, to_json_pretty,
};
pub use error::{CodecError, CodecResult};
pub use value::Value;
