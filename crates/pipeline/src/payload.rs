//! Splitting raw response bodies into individual items.
//!
//! The transport hands the pipeline the body of a single-partition response as
//! it arrived. Three shapes are accepted:
//!
//! | Body | Items |
//! |------|-------|
//! | empty or whitespace | none |
//! | JSON array | each element |
//! | JSON object with a `Documents` array | each element of `Documents` |
//!
//! The object form is the service's query and change-feed envelope
//! (`{"_rid": …, "Documents": […], "_count": n}`); its other fields are ignored.
//! Items are returned as their exact raw JSON text, so documents pass through
//! the pipeline without being re-serialised.

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::PipelineError;

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "Documents", borrow)]
    documents: Vec<&'a RawValue>,
}

/// Splits `data` into raw item bytes, preserving order.
///
/// # Errors
///
/// [`PipelineError::MalformedPayload`] when `data` is not UTF-8 or is not one of
/// the accepted shapes.
pub fn split_items(partition_id: &str, data: &[u8]) -> crate::Result<Vec<Vec<u8>>> {
    let malformed = |message: String| PipelineError::MalformedPayload {
        partition_id: partition_id.to_string(),
        message,
    };

    let text = std::str::from_utf8(data).map_err(|e| malformed(e.to_string()))?;
    let trimmed = text.trim_start();

    let raw_items: Vec<&RawValue> = match trimmed.as_bytes().first() {
        None => return Ok(Vec::new()),
        Some(b'[') => serde_json::from_str(trimmed).map_err(|e| malformed(e.to_string()))?,
        Some(b'{') => {
            let envelope: Envelope<'_> =
                serde_json::from_str(trimmed).map_err(|e| malformed(e.to_string()))?;
            envelope.documents
        }
        Some(_) => {
            return Err(malformed(
                "expected a JSON array or an object with a `Documents` array".to_string(),
            ))
        }
    };

    Ok(raw_items
        .into_iter()
        .map(|raw| raw.get().as_bytes().to_vec())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_has_no_items() {
        assert!(split_items("0", b"").unwrap().is_empty());
        assert!(split_items("0", b"  \n").unwrap().is_empty());
    }

    #[test]
    fn array_elements_keep_their_exact_text() {
        let items = split_items("0", br#"[{"id":"a", "n": 1}, 2, "three"]"#).unwrap();
        assert_eq!(
            items,
            vec![
                br#"{"id":"a", "n": 1}"#.to_vec(),
                b"2".to_vec(),
                br#""three""#.to_vec(),
            ]
        );
    }

    #[test]
    fn service_envelope_yields_documents() {
        let body = br#"{"_rid":"test-rid","Documents":[{"id":"doc1"},{"id":"doc2"}],"_count":2}"#;
        let items = split_items("0", body).unwrap();
        assert_eq!(items, vec![br#"{"id":"doc1"}"#.to_vec(), br#"{"id":"doc2"}"#.to_vec()]);
    }

    #[test]
    fn envelope_without_documents_is_malformed() {
        let err = split_items("4", br#"{"_rid":"x"}"#).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MalformedPayload { ref partition_id, .. } if partition_id == "4"
        ));
    }

    #[test]
    fn scalars_and_invalid_json_are_malformed() {
        assert!(split_items("0", b"42").is_err());
        assert!(split_items("0", b"[1, 2").is_err());
        assert!(split_items("0", &[0xff, 0xfe]).is_err());
    }
}
