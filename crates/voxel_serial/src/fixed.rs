//! Fields that always hold one known value (magic numbers, format versions).

use std::fmt::Debug;

use crate::error::DeserializeError;
use crate::io::{ByteRead, ByteWrite};
use crate::serializer::{BinaryFormat, Codec, Deserializer, Endianness, Serializer};

/// Wraps a serializer whose value must always equal `constant`.
///
/// Writing any other value is a programming error and panics. Reading a
/// different value means the input is not in this format and is reported as
/// [`DeserializeError::ConstantMismatch`].
#[derive(Clone, Debug)]
pub struct FixedConstantSerializer<S: Codec> {
    inner: S,
    constant: S::Value,
}

impl<S> FixedConstantSerializer<S>
where
    S: Codec,
    S::Value: PartialEq + Debug,
{
    pub fn new(inner: S, constant: S::Value) -> Self {
        Self { inner, constant }
    }

    pub fn constant(&self) -> &S::Value {
        &self.constant
    }
}

impl<S> BinaryFormat for FixedConstantSerializer<S>
where
    S: Codec,
    S::Value: PartialEq + Debug,
{
    type Value = S::Value;

    fn endianness(&self) -> Endianness {
        self.inner.endianness()
    }

    fn constant_len(&self) -> Option<usize> {
        Some(
            self.inner
                .constant_len()
                .unwrap_or_else(|| self.inner.serialized_len(&self.constant)),
        )
    }
}

impl<S> Serializer for FixedConstantSerializer<S>
where
    S: Codec,
    S::Value: PartialEq + Debug,
{
    fn serialized_len(&self, value: &S::Value) -> usize {
        self.inner.serialized_len(value)
    }

    fn write(&self, value: &S::Value, out: &mut dyn ByteWrite) -> usize {
        assert_eq!(
            value, &self.constant,
            "fixed constant serializer asked to write a different value"
        );
        self.inner.write(value, out)
    }
}

impl<S> Deserializer for FixedConstantSerializer<S>
where
    S: Codec,
    S::Value: PartialEq + Debug,
{
    fn read(&self, input: &mut dyn ByteRead) -> Result<S::Value, DeserializeError> {
        let value = self.inner.read(input)?;
        if value != self.constant {
            return Err(DeserializeError::ConstantMismatch {
                expected: format!("{:?}", self.constant),
                found: format!("{value:?}"),
            });
        }
        Ok(value)
    }
}
