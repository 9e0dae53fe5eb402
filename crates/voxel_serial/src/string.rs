//! Length-prefixed UTF-8 strings.

use crate::error::DeserializeError;
use crate::io::{ByteRead, ByteWrite};
use crate::primitive::Primitive;
use crate::serializer::{BinaryFormat, Deserializer, Endianness, Serializer};

/// Serializes a `String` as a `u32` byte count followed by UTF-8 bytes.
#[derive(Clone, Copy, Debug)]
pub struct StringSerializer {
    endianness: Endianness,
}

impl StringSerializer {
    pub const fn new(endianness: Endianness) -> Self {
        Self { endianness }
    }
}

impl BinaryFormat for StringSerializer {
    type Value = String;

    fn endianness(&self) -> Endianness {
        self.endianness
    }
}

impl Serializer for StringSerializer {
    fn serialized_len(&self, value: &String) -> usize {
        u32::SIZE + value.len()
    }

    fn write(&self, value: &String, out: &mut dyn ByteWrite) -> usize {
        let len = u32::try_from(value.len()).expect("string longer than u32::MAX bytes");
        len.encode(self.endianness, out);
        out.put(value.as_bytes());
        u32::SIZE + value.len()
    }
}

impl Deserializer for StringSerializer {
    fn read(&self, input: &mut dyn ByteRead) -> Result<String, DeserializeError> {
        let len = u32::decode(input, self.endianness)? as usize;
        let bytes = input.read_vec(len)?;
        Ok(String::from_utf8(bytes)?)
    }
}
