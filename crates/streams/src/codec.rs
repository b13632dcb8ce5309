//! Key and value codecs.
//!
//! Encoding is owned by the collaborators that produce and consume topic
//! data; the engine only sees it through the [`Serializer`] and
//! [`Deserializer`] traits.  The codecs in this module cover the primitive
//! types used by the demo topology: 64-bit integer keys and UTF-8 strings.

use crate::record::RawRecord;
use std::string::FromUtf8Error;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("topic '{topic}': expected {expected} bytes, found {actual}")]
    InvalidLength {
        topic: String,
        expected: usize,
        actual: usize,
    },

    #[error("topic '{topic}': invalid UTF-8: {error}")]
    InvalidUtf8 {
        topic: String,
        #[source]
        error: FromUtf8Error,
    },

    #[error("topic '{topic}': record has no key")]
    MissingKey { topic: String },

    #[error("topic '{topic}': malformed record: {reason}")]
    Malformed { topic: String, reason: String },
}

impl CodecError {
    pub fn malformed(topic: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }
}

pub trait Serializer<T: ?Sized> {
    fn serialize(&self, topic: &str, data: &T) -> Result<Vec<u8>, CodecError>;
}

pub trait Deserializer<T> {
    fn deserialize(&self, topic: &str, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Big-endian 8-byte encoding of `i64`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LongSerde;

impl Serializer<i64> for LongSerde {
    fn serialize(&self, _topic: &str, data: &i64) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_be_bytes().to_vec())
    }
}

impl Deserializer<i64> for LongSerde {
    fn deserialize(&self, topic: &str, bytes: &[u8]) -> Result<i64, CodecError> {
        let bytes: [u8; 8] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            topic: topic.to_string(),
            expected: 8,
            actual: bytes.len(),
        })?;
        Ok(i64::from_be_bytes(bytes))
    }
}

/// UTF-8 strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringSerde;

impl Serializer<str> for StringSerde {
    fn serialize(&self, _topic: &str, data: &str) -> Result<Vec<u8>, CodecError> {
        Ok(data.as_bytes().to_vec())
    }
}

impl Serializer<String> for StringSerde {
    fn serialize(&self, topic: &str, data: &String) -> Result<Vec<u8>, CodecError> {
        <Self as Serializer<str>>::serialize(self, topic, data)
    }
}

impl Deserializer<String> for StringSerde {
    fn deserialize(&self, topic: &str, bytes: &[u8]) -> Result<String, CodecError> {
        String::from_utf8(bytes.to_vec()).map_err(|error| CodecError::InvalidUtf8 {
            topic: topic.to_string(),
            error,
        })
    }
}

/// Builds [`RawRecord`]s for one topic from typed keys and values.
pub struct RecordFactory<KS, VS> {
    topic: String,
    key_serializer: KS,
    value_serializer: VS,
}

impl<KS, VS> RecordFactory<KS, VS> {
    pub fn new(topic: impl Into<String>, key_serializer: KS, value_serializer: VS) -> Self {
        Self {
            topic: topic.into(),
            key_serializer,
            value_serializer,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Create a keyless record.
    pub fn create<V>(&self, value: &V) -> Result<RawRecord, CodecError>
    where
        V: ?Sized,
        VS: Serializer<V>,
    {
        let value = self.value_serializer.serialize(&self.topic, value)?;
        Ok(RawRecord::new(self.topic.clone(), None, value))
    }

    pub fn create_keyed<K, V>(&self, key: &K, value: &V) -> Result<RawRecord, CodecError>
    where
        K: ?Sized,
        V: ?Sized,
        KS: Serializer<K>,
        VS: Serializer<V>,
    {
        let key = self.key_serializer.serialize(&self.topic, key)?;
        let value = self.value_serializer.serialize(&self.topic, value)?;
        Ok(RawRecord::new(self.topic.clone(), Some(key), value))
    }

    /// Create one keyless record per value, preserving order.
    pub fn create_all<'a, V, I>(&self, values: I) -> Result<Vec<RawRecord>, CodecError>
    where
        V: ?Sized + 'a,
        VS: Serializer<V>,
        I: IntoIterator<Item = &'a V>,
    {
        values.into_iter().map(|value| self.create(value)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::{CodecError, Deserializer, LongSerde, RecordFactory, Serializer, StringSerde};

    #[test]
    fn long_is_big_endian() {
        let bytes = LongSerde.serialize("t", &1).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(LongSerde.deserialize("t", &bytes).unwrap(), 1);
        assert_eq!(
            LongSerde
                .deserialize("t", &LongSerde.serialize("t", &-42).unwrap())
                .unwrap(),
            -42
        );
    }

    #[test]
    fn long_rejects_short_input() {
        let err = LongSerde.deserialize("ratings", &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidLength {
                expected: 8,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let err = StringSerde.deserialize("movies", &[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidUtf8 { .. }));
        assert!(err.to_string().contains("movies"));
    }

    #[test]
    fn factory() {
        let factory = RecordFactory::new("raw-ratings", LongSerde, StringSerde);
        let keyless = factory.create("1,9").unwrap();
        assert_eq!(keyless.topic, "raw-ratings");
        assert_eq!(keyless.key, None);
        assert_eq!(keyless.value, b"1,9".to_vec());

        let keyed = factory.create_keyed(&7i64, "9").unwrap();
        assert_eq!(keyed.key, Some(7i64.to_be_bytes().to_vec()));

        let all = factory.create_all(["a", "b"]).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].value, b"b".to_vec());
    }
}
