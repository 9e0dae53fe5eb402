//! Serializer and deserializer contracts.

use crate::error::{DeserializeError, SerializeError};
use crate::io::{BufferedArray, ByteRead, ByteWrite, FnWriter, SliceReader, SliceWriter};

/// Byte order of multi-byte fields. Always chosen explicitly, never taken
/// from the platform implicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endianness {
    Big,
    Little,
}

impl Endianness {
    /// Byte order of the compiling target.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Endianness = Endianness::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: Endianness = Endianness::Big;
}

/// Shape shared by a serializer and its paired deserializer.
pub trait BinaryFormat {
    type Value;

    fn endianness(&self) -> Endianness;

    /// Serialized length when it does not depend on the value.
    fn constant_len(&self) -> Option<usize> {
        None
    }
}

/// Turns values into an exact number of bytes.
pub trait Serializer: BinaryFormat {
    /// Exact number of bytes [`write`](Self::write) produces for `value`.
    fn serialized_len(&self, value: &Self::Value) -> usize;

    /// Write `value`, returning the number of bytes written.
    fn write(&self, value: &Self::Value, out: &mut dyn ByteWrite) -> usize;

    /// Write `value` into `buffer` at `*index` and advance the cursor.
    ///
    /// Fails with [`SerializeError::BufferTooSmall`] (leaving the buffer and
    /// cursor untouched) when `index + len > buffer.len()`.
    fn serialize(
        &self,
        value: &Self::Value,
        buffer: &mut [u8],
        index: &mut usize,
    ) -> Result<usize, SerializeError> {
        let len = self.serialized_len(value);
        let end = index.checked_add(len).filter(|&end| end <= buffer.len());
        let Some(end) = end else {
            return Err(SerializeError::BufferTooSmall {
                needed: len,
                offset: *index,
                capacity: buffer.len(),
            });
        };
        let mut writer = SliceWriter::new(&mut buffer[*index..end]);
        let written = self.write(value, &mut writer);
        debug_assert_eq!(written, len, "serializer wrote a different length than it declared");
        *index = end;
        Ok(written)
    }

    /// Write `value` one byte at a time through `write_byte`.
    fn serialize_with<F: FnMut(u8)>(&self, value: &Self::Value, write_byte: F) -> usize
    where
        Self: Sized,
    {
        let mut writer = FnWriter::new(write_byte);
        self.write(value, &mut writer)
    }

    /// Serialize into a freshly allocated, exactly sized vector.
    fn to_vec(&self, value: &Self::Value) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.serialized_len(value));
        self.write(value, &mut bytes);
        bytes
    }
}

/// Reads values back from bytes.
pub trait Deserializer: BinaryFormat {
    /// Read exactly one value from `input`.
    fn read(&self, input: &mut dyn ByteRead) -> Result<Self::Value, DeserializeError>;

    /// Read a value from `buffer` at `*index` and advance the cursor.
    fn deserialize(&self, buffer: &[u8], index: &mut usize) -> Result<Self::Value, DeserializeError> {
        let start = (*index).min(buffer.len());
        let mut reader = SliceReader::new(&buffer[start..]);
        let value = self.read(&mut reader)?;
        *index = start + reader.position();
        Ok(value)
    }

    /// Read one value from a counted stream source.
    fn deserialize_from<R: std::io::Read>(
        &self,
        source: &mut BufferedArray<R>,
    ) -> Result<Self::Value, DeserializeError>
    where
        Self: Sized,
    {
        self.read(source)
    }

    /// Read a value that must span all of `buffer`.
    fn from_bytes(&self, buffer: &[u8]) -> Result<Self::Value, DeserializeError> {
        let mut reader = SliceReader::new(buffer);
        let value = self.read(&mut reader)?;
        match buffer.len() - reader.position() {
            0 => Ok(value),
            extra => Err(DeserializeError::TrailingBytes(extra)),
        }
    }
}

/// A serializer that can also read back what it writes.
pub trait Codec: Serializer + Deserializer {}

impl<T: Serializer + Deserializer> Codec for T {}

impl<S: BinaryFormat + ?Sized> BinaryFormat for &S {
    type Value = S::Value;

    fn endianness(&self) -> Endianness {
        (**self).endianness()
    }

    fn constant_len(&self) -> Option<usize> {
        (**self).constant_len()
    }
}

impl<S: Serializer + ?Sized> Serializer for &S {
    fn serialized_len(&self, value: &S::Value) -> usize {
        (**self).serialized_len(value)
    }

    fn write(&self, value: &S::Value, out: &mut dyn ByteWrite) -> usize {
        (**self).write(value, out)
    }
}

impl<S: Deserializer + ?Sized> Deserializer for &S {
    fn read(&self, input: &mut dyn ByteRead) -> Result<S::Value, DeserializeError> {
        (**self).read(input)
    }
}

impl<S: BinaryFormat + ?Sized> BinaryFormat for std::sync::Arc<S> {
    type Value = S::Value;

    fn endianness(&self) -> Endianness {
        (**self).endianness()
    }

    fn constant_len(&self) -> Option<usize> {
        (**self).constant_len()
    }
}

impl<S: Serializer + ?Sized> Serializer for std::sync::Arc<S> {
    fn serialized_len(&self, value: &S::Value) -> usize {
        (**self).serialized_len(value)
    }

    fn write(&self, value: &S::Value, out: &mut dyn ByteWrite) -> usize {
        (**self).write(value, out)
    }
}

impl<S: Deserializer + ?Sized> Deserializer for std::sync::Arc<S> {
    fn read(&self, input: &mut dyn ByteRead) -> Result<S::Value, DeserializeError> {
        (**self).read(input)
    }
}
