//! Serialization strategy for event payloads.
//!
//! A [`Codec`] is injected into the [`Journal`](crate::journal::Journal) at
//! construction. It is stateless: no process-wide serializer configuration is
//! consulted, so two journals with different codecs can share a backend.

/// Encodes domain events to bytes and decodes them back.
pub trait Codec: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Serialize a value to its stored byte form.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the value cannot be represented.
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, Self::Error>
    where
        T: serde::Serialize;

    /// Deserialize a value from its stored byte form.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the bytes do not describe a `T`.
    fn deserialize<T>(&self, data: &[u8]) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned;
}

/// JSON codec backed by `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    type Error = serde_json::Error;

    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, Self::Error>
    where
        T: serde::Serialize,
    {
        serde_json::to_vec(value)
    }

    fn deserialize<T>(&self, data: &[u8]) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct CrewEntered {
        crew: String,
        seats: u8,
    }

    #[test]
    fn json_codec_roundtrips() {
        let codec = JsonCodec;
        let value = CrewEntered {
            crew: "Leander".to_owned(),
            seats: 8,
        };
        let bytes = codec.serialize(&value).unwrap();
        let decoded: CrewEntered = codec.deserialize(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn json_codec_rejects_invalid_json() {
        let codec = JsonCodec;
        let result: Result<CrewEntered, _> = codec.deserialize(b"not valid json");
        assert!(result.is_err());
    }

    #[test]
    fn json_codec_rejects_wrong_shape() {
        let codec = JsonCodec;
        let result: Result<CrewEntered, _> = codec.deserialize(br#"{"wrong_field":123}"#);
        assert!(result.is_err());
    }
}
