//! Fixed-size primitive serializers.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::error::DeserializeError;
use crate::io::{ByteRead, ByteWrite};
use crate::serializer::{BinaryFormat, Deserializer, Endianness, Serializer};

/// A fixed-width scalar with explicit byte-order conversions.
pub trait Primitive: Copy {
    /// Encoded width in bytes.
    const SIZE: usize;

    fn encode(self, endianness: Endianness, out: &mut dyn ByteWrite);

    fn decode(input: &mut dyn ByteRead, endianness: Endianness) -> Result<Self, DeserializeError>;
}

macro_rules! impl_primitive {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn encode(self, endianness: Endianness, out: &mut dyn ByteWrite) {
                    match endianness {
                        Endianness::Big => out.put(&self.to_be_bytes()),
                        Endianness::Little => out.put(&self.to_le_bytes()),
                    }
                }

                #[inline]
                fn decode(input: &mut dyn ByteRead, endianness: Endianness) -> Result<Self, DeserializeError> {
                    let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                    input.read_into(&mut bytes)?;
                    Ok(match endianness {
                        Endianness::Big => <$ty>::from_be_bytes(bytes),
                        Endianness::Little => <$ty>::from_le_bytes(bytes),
                    })
                }
            }
        )+
    };
}

impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

impl Primitive for bool {
    const SIZE: usize = 1;

    fn encode(self, _endianness: Endianness, out: &mut dyn ByteWrite) {
        out.put(&[self as u8]);
    }

    fn decode(input: &mut dyn ByteRead, _endianness: Endianness) -> Result<Self, DeserializeError> {
        let mut byte = [0u8];
        input.read_into(&mut byte)?;
        match byte[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DeserializeError::InvalidBool(other)),
        }
    }
}

/// Serializer for one [`Primitive`] value.
///
/// # Example
/// ```
/// use voxel_serial::{Deserializer, Endianness, PrimitiveSerializer, Serializer};
///
/// let be = PrimitiveSerializer::<u32>::new(Endianness::Big);
/// assert_eq!(be.to_vec(&0x0102_0304), vec![1, 2, 3, 4]);
/// assert_eq!(be.from_bytes(&[1, 2, 3, 4]).unwrap(), 0x0102_0304);
/// ```
#[derive(Debug)]
pub struct PrimitiveSerializer<T> {
    endianness: Endianness,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PrimitiveSerializer<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PrimitiveSerializer<T> {}

impl<T: Primitive> PrimitiveSerializer<T> {
    pub const fn new(endianness: Endianness) -> Self {
        Self {
            endianness,
            _marker: PhantomData,
        }
    }

    pub const fn big_endian() -> Self {
        Self::new(Endianness::Big)
    }

    pub const fn little_endian() -> Self {
        Self::new(Endianness::Little)
    }
}

impl<T: Primitive> BinaryFormat for PrimitiveSerializer<T> {
    type Value = T;

    fn endianness(&self) -> Endianness {
        self.endianness
    }

    fn constant_len(&self) -> Option<usize> {
        Some(T::SIZE)
    }
}

impl<T: Primitive> Serializer for PrimitiveSerializer<T> {
    fn serialized_len(&self, _value: &T) -> usize {
        T::SIZE
    }

    fn write(&self, value: &T, out: &mut dyn ByteWrite) -> usize {
        value.encode(self.endianness, out);
        T::SIZE
    }
}

impl<T: Primitive> Deserializer for PrimitiveSerializer<T> {
    fn read(&self, input: &mut dyn ByteRead) -> Result<T, DeserializeError> {
        T::decode(input, self.endianness)
    }
}

/// Copies plain-old-data values byte for byte in the target's native order.
///
/// The endianness is fixed to [`Endianness::NATIVE`]; use it only for
/// payloads that never leave the machine (scratch files, in-process
/// stores), or compose [`PrimitiveSerializer`]s for portable layouts.
#[derive(Debug)]
pub struct PodSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> PodSerializer<T> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: Pod> Default for PodSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pod> BinaryFormat for PodSerializer<T> {
    type Value = T;

    fn endianness(&self) -> Endianness {
        Endianness::NATIVE
    }

    fn constant_len(&self) -> Option<usize> {
        Some(std::mem::size_of::<T>())
    }
}

impl<T: Pod> Serializer for PodSerializer<T> {
    fn serialized_len(&self, _value: &T) -> usize {
        std::mem::size_of::<T>()
    }

    fn write(&self, value: &T, out: &mut dyn ByteWrite) -> usize {
        let bytes = bytemuck::bytes_of(value);
        out.put(bytes);
        bytes.len()
    }
}

impl<T: Pod> Deserializer for PodSerializer<T> {
    fn read(&self, input: &mut dyn ByteRead) -> Result<T, DeserializeError> {
        let mut value = T::zeroed();
        input.read_into(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }
}
