//! Serialization of entry metadata for storage.

use super::error::StoreError;
use super::types::Metadata;

/// Converts metadata to and from the text persisted in the `metadata` column.
pub trait MetadataCodec: Send + Sync {
    /// Short name of the storage format.
    fn name(&self) -> &'static str;

    /// Encode metadata for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented in this format.
    fn encode(&self, metadata: &Metadata) -> Result<String, StoreError>;

    /// Decode stored metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored text is not valid for this format.
    fn decode(&self, text: &str) -> Result<Metadata, StoreError>;
}

/// Stores metadata as a compact JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MetadataCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, metadata: &Metadata) -> Result<String, StoreError> {
        Ok(serde_json::to_string(metadata)?)
    }

    fn decode(&self, text: &str) -> Result<Metadata, StoreError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_metadata(value: serde_json::Value) -> Metadata {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_json_codec_round_trip_nested() {
        let codec = JsonCodec;
        let metadata = as_metadata(json!({
            "a": 1,
            "b": [1, 2, 3],
            "c": {"nested": null, "flag": true, "ratio": 0.5}
        }));

        let text = codec.encode(&metadata).unwrap();
        assert_eq!(codec.decode(&text).unwrap(), metadata);
    }

    #[test]
    fn test_json_codec_empty_object() {
        let codec = JsonCodec;
        let text = codec.encode(&Metadata::new()).unwrap();
        assert_eq!(text, "{}");
        assert!(codec.decode(&text).unwrap().is_empty());
    }

    #[test]
    fn test_json_codec_rejects_non_object() {
        let err = JsonCodec.decode("[1, 2]").unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }

    #[test]
    fn test_json_codec_name() {
        assert_eq!(JsonCodec.name(), "json");
    }
}
