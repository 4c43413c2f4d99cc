//! CBOR storage encoding and JSON boundary encoding.

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes any serializable value as CBOR.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a CBOR byte slice.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not valid CBOR for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Encodes a document for storage, rejecting non-finite floats first.
///
/// # Errors
///
/// Returns [`CodecError::NonFiniteFloat`] or [`CodecError::EncodingFailed`].
pub fn encode_document(doc: &Document) -> CodecResult<Vec<u8>> {
    for (field, value) in doc {
        value.ensure_finite().map_err(|e| match e {
            CodecError::NonFiniteFloat { path } if path == "<root>" => {
                CodecError::NonFiniteFloat {
                    path: field.clone(),
                }
            }
            CodecError::NonFiniteFloat { path } => CodecError::NonFiniteFloat {
                path: format!("{field}.{path}"),
            },
            other => other,
        })?;
    }
    to_cbor(doc)
}

/// Decodes a stored document.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not a CBOR map.
pub fn decode_document(bytes: &[u8]) -> CodecResult<Document> {
    let value: Value = from_cbor(bytes)?;
    Document::try_from(value)
}

/// Renders a value as compact JSON.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if the value holds a non-finite float.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> CodecResult<String> {
    serde_json::to_string(value).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Renders a value as indented JSON.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> CodecResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Parses JSON text.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] on malformed input.
pub fn from_json<T: DeserializeOwned>(text: &str) -> CodecResult<T> {
    serde_json::from_str(text).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motorbike() -> Document {
        let mut doc = Document::new();
        doc.insert("model", "Enduro");
        doc.insert("topSpeed", 182.5);
        doc.insert("wheels", Value::Array(vec![Value::Integer(1), Value::Integer(2)]));
        doc.insert("owner", Value::Null);
        doc
    }

    #[test]
    fn document_survives_cbor() {
        let doc = motorbike();
        let bytes = encode_document(&doc).unwrap();
        assert_eq!(decode_document(&bytes).unwrap(), doc);
    }

    #[test]
    fn equal_documents_encode_identically() {
        let mut a = Document::new();
        a.insert("b", 1i64);
        a.insert("a", 2i64);
        let mut b = Document::new();
        b.insert("a", 2i64);
        b.insert("b", 1i64);
        assert_eq!(encode_document(&a).unwrap(), encode_document(&b).unwrap());
    }

    #[test]
    fn non_finite_float_is_rejected_with_field_path() {
        let mut doc = motorbike();
        doc.insert("topSpeed", f64::INFINITY);
        assert_eq!(
            encode_document(&doc).unwrap_err(),
            CodecError::NonFiniteFloat {
                path: "topSpeed".to_string()
            }
        );
    }

    #[test]
    fn non_map_is_not_a_document() {
        let bytes = to_cbor(&Value::Integer(5)).unwrap();
        assert!(matches!(
            decode_document(&bytes),
            Err(CodecError::NotADocument { found: "integer" })
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            decode_document(&[0xFF, 0x00, 0x13]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn json_boundary_shape() {
        let mut doc = Document::new();
        doc.insert("coins", 200i64);
        doc.insert("name", "John");
        assert_eq!(to_json(&doc).unwrap(), r#"{"coins":200,"name":"John"}"#);

        let back: Document = from_json(r#"{"name":"John","coins":200}"#).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn json_integers_stay_integers() {
        let value: Value = from_json("[1, 1.5, null, true]").unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Integer(1),
                Value::Float(1.5),
                Value::Null,
                Value::Bool(true)
            ])
        );
    }

    #[test]
    fn oversized_unsigned_overflows() {
        let err = from_json::<Value>("18446744073709551615").unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }
}
