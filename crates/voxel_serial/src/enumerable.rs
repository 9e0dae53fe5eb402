//! Sequences of values with a count header (or none at all).

use crate::error::DeserializeError;
use crate::io::{ByteRead, ByteWrite};
use crate::primitive::PrimitiveSerializer;
use crate::serializer::{BinaryFormat, Codec, Deserializer, Endianness, Serializer};

/// How an [`EnumerableSerializer`] knows how many elements to read.
#[derive(Clone, Debug)]
pub enum CountFormat<C = PrimitiveSerializer<u32>> {
    /// Count written before the elements with its own serializer.
    Serialized(C),
    /// Always exactly this many elements; nothing is written.
    Fixed(usize),
    /// Nothing is written; the reader divides the remaining input length by
    /// the element length. Requires fixed-size elements.
    Inferred,
}

/// Serializes a `Vec` of elements in iteration order.
///
/// # Example
/// ```
/// use voxel_serial::{Deserializer, EnumerableSerializer, Endianness, PrimitiveSerializer, Serializer};
///
/// let ser = EnumerableSerializer::with_count_prefix(PrimitiveSerializer::<u16>::big_endian());
/// let bytes = ser.to_vec(&vec![1, 2]);
/// assert_eq!(bytes, vec![0, 0, 0, 2, 0, 1, 0, 2]);
/// assert_eq!(ser.from_bytes(&bytes).unwrap(), vec![1, 2]);
/// ```
#[derive(Clone, Debug)]
pub struct EnumerableSerializer<S, C = PrimitiveSerializer<u32>> {
    element: S,
    count: CountFormat<C>,
}

impl<S: Codec> EnumerableSerializer<S> {
    /// Elements prefixed by a `u32` count in the element's endianness.
    pub fn with_count_prefix(element: S) -> Self {
        let count = PrimitiveSerializer::new(element.endianness());
        Self::new(element, CountFormat::Serialized(count))
    }
}

impl<S, C> EnumerableSerializer<S, C>
where
    S: Codec,
    C: Codec<Value = u32>,
{
    /// # Panics
    /// Panics if the count serializer's endianness differs from the
    /// element's, or if `Inferred` is used with variable-size elements.
    pub fn new(element: S, count: CountFormat<C>) -> Self {
        match &count {
            CountFormat::Serialized(counter) => assert_eq!(
                counter.endianness(),
                element.endianness(),
                "count and element serializers must share one endianness"
            ),
            CountFormat::Inferred => assert!(
                matches!(element.constant_len(), Some(len) if len > 0),
                "inferred counts need a non-zero constant element length"
            ),
            CountFormat::Fixed(_) => {}
        }
        Self { element, count }
    }

    pub fn element(&self) -> &S {
        &self.element
    }

    pub fn count_format(&self) -> &CountFormat<C> {
        &self.count
    }

    fn header_len(&self, count: usize) -> usize {
        match &self.count {
            CountFormat::Serialized(counter) => counter.serialized_len(&to_count(count)),
            CountFormat::Fixed(_) | CountFormat::Inferred => 0,
        }
    }
}

fn to_count(len: usize) -> u32 {
    u32::try_from(len).expect("element count exceeds u32::MAX")
}

impl<S, C> BinaryFormat for EnumerableSerializer<S, C>
where
    S: Codec,
    C: Codec<Value = u32>,
{
    type Value = Vec<S::Value>;

    fn endianness(&self) -> Endianness {
        self.element.endianness()
    }

    fn constant_len(&self) -> Option<usize> {
        match &self.count {
            CountFormat::Fixed(n) => self.element.constant_len().map(|len| len * n),
            _ => None,
        }
    }
}

impl<S, C> Serializer for EnumerableSerializer<S, C>
where
    S: Codec,
    C: Codec<Value = u32>,
{
    fn serialized_len(&self, value: &Vec<S::Value>) -> usize {
        let body = match self.element.constant_len() {
            Some(len) => len * value.len(),
            None => value.iter().map(|v| self.element.serialized_len(v)).sum(),
        };
        self.header_len(value.len()) + body
    }

    fn write(&self, value: &Vec<S::Value>, out: &mut dyn ByteWrite) -> usize {
        let mut written = match &self.count {
            CountFormat::Serialized(counter) => counter.write(&to_count(value.len()), out),
            CountFormat::Fixed(n) => {
                assert_eq!(value.len(), *n, "fixed-count enumerable given the wrong number of elements");
                0
            }
            CountFormat::Inferred => 0,
        };
        for element in value {
            written += self.element.write(element, out);
        }
        written
    }
}

impl<S, C> Deserializer for EnumerableSerializer<S, C>
where
    S: Codec,
    C: Codec<Value = u32>,
{
    fn read(&self, input: &mut dyn ByteRead) -> Result<Vec<S::Value>, DeserializeError> {
        let count = match &self.count {
            CountFormat::Serialized(counter) => counter.read(input)? as usize,
            CountFormat::Fixed(n) => *n,
            CountFormat::Inferred => {
                let remaining = input.remaining().ok_or(DeserializeError::UnknownLength)?;
                let element_len = self
                    .element
                    .constant_len()
                    .expect("checked at construction");
                assert_eq!(
                    remaining % element_len,
                    0,
                    "remaining length {remaining} is not a multiple of element length {element_len}"
                );
                remaining / element_len
            }
        };
        if let (Some(element_len), Some(remaining)) = (self.element.constant_len(), input.remaining()) {
            let needed = element_len.saturating_mul(count);
            if needed > remaining {
                return Err(DeserializeError::UnexpectedEnd {
                    needed,
                    available: remaining,
                });
            }
        }
        let mut values = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            values.push(self.element.read(input)?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferedArray, BufferedByteStream};
    use crate::string::StringSerializer;

    #[test]
    fn order_is_preserved() {
        let ser = EnumerableSerializer::with_count_prefix(PrimitiveSerializer::<i32>::little_endian());
        let values: Vec<i32> = (0..50).map(|i| i * i - 300).collect();
        let bytes = ser.to_vec(&values);
        assert_eq!(bytes.len(), ser.serialized_len(&values));
        assert_eq!(ser.from_bytes(&bytes).unwrap(), values);
    }

    #[test]
    fn fixed_count_writes_no_header() {
        let ser: EnumerableSerializer<_> =
            EnumerableSerializer::new(PrimitiveSerializer::<u8>::big_endian(), CountFormat::Fixed(3));
        assert_eq!(ser.constant_len(), Some(3));
        assert_eq!(ser.to_vec(&vec![7, 8, 9]), vec![7, 8, 9]);
        assert_eq!(ser.from_bytes(&[7, 8, 9]).unwrap(), vec![7, 8, 9]);
    }

    #[test]
    #[should_panic(expected = "wrong number of elements")]
    fn fixed_count_mismatch_panics() {
        let ser: EnumerableSerializer<_> =
            EnumerableSerializer::new(PrimitiveSerializer::<u8>::big_endian(), CountFormat::Fixed(3));
        ser.to_vec(&vec![1]);
    }

    #[test]
    fn inferred_count_reads_to_end_of_counted_source() {
        let ser: EnumerableSerializer<_> =
            EnumerableSerializer::new(PrimitiveSerializer::<u16>::big_endian(), CountFormat::Inferred);
        let bytes = ser.to_vec(&vec![10, 20, 30]);
        assert_eq!(bytes.len(), 6);
        let mut source = BufferedArray::from_slice(&bytes);
        assert_eq!(ser.read(&mut source).unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn inferred_count_needs_known_length() {
        let ser: EnumerableSerializer<_> =
            EnumerableSerializer::new(PrimitiveSerializer::<u16>::big_endian(), CountFormat::Inferred);
        let bytes = [0u8, 1, 0, 2];
        let mut stream = BufferedByteStream::new(&bytes[..]);
        assert!(matches!(ser.read(&mut stream), Err(DeserializeError::UnknownLength)));
    }

    #[test]
    #[should_panic(expected = "not a multiple")]
    fn inferred_count_with_ragged_input_panics() {
        let ser: EnumerableSerializer<_> =
            EnumerableSerializer::new(PrimitiveSerializer::<u16>::big_endian(), CountFormat::Inferred);
        let _ = ser.from_bytes(&[0, 1, 2]);
    }

    #[test]
    fn variable_size_elements_round_trip() {
        let ser = EnumerableSerializer::with_count_prefix(StringSerializer::new(Endianness::Big));
        let names = vec!["air".to_string(), String::new(), "bedrock".to_string()];
        let bytes = ser.to_vec(&names);
        assert_eq!(bytes.len(), ser.serialized_len(&names));
        assert_eq!(ser.from_bytes(&bytes).unwrap(), names);
    }

    #[test]
    fn count_larger_than_input_is_unexpected_end() {
        let ser = EnumerableSerializer::with_count_prefix(PrimitiveSerializer::<u32>::big_endian());
        let bytes = [0, 0, 0, 200, 0, 0, 0, 1];
        assert!(matches!(ser.from_bytes(&bytes), Err(DeserializeError::UnexpectedEnd { .. })));
    }
}
