//! Composite serializers built from ordered tuples of sub-serializers.
//!
//! A composite value is decomposed into a tuple, each part is written by its
//! own serializer in declaration order, and the tuple is recomposed on read.
//! The serialized length is the sum of the parts' lengths, and every part
//! must use the same [`Endianness`].
//!
//! # Example
//!
//! ```
//! use voxel_serial::{CompositeSerializer2, Deserializer, PrimitiveSerializer, Serializer};
//!
//! #[derive(Debug, PartialEq)]
//! struct Span { start: u16, len: u8 }
//!
//! let span = CompositeSerializer2::new(
//!     (PrimitiveSerializer::<u16>::big_endian(), PrimitiveSerializer::<u8>::big_endian()),
//!     |(start, len)| Span { start, len },
//!     |span: &Span| (span.start, span.len),
//! );
//!
//! let bytes = span.to_vec(&Span { start: 258, len: 3 });
//! assert_eq!(bytes, vec![1, 2, 3]);
//! assert_eq!(span.from_bytes(&bytes).unwrap(), Span { start: 258, len: 3 });
//! ```

use crate::error::DeserializeError;
use crate::io::{ByteRead, ByteWrite};
use crate::serializer::{BinaryFormat, Codec, Deserializer, Endianness, Serializer};

macro_rules! composite_serializer {
    ($(#[$meta:meta])* $name:ident { $($idx:tt => $part:ident),+ $(,)? }) => {
        $(#[$meta])*
        pub struct $name<T, $($part: Codec),+> {
            parts: ($($part,)+),
            compose: Box<dyn Fn(($($part::Value,)+)) -> T + Send + Sync>,
            decompose: Box<dyn Fn(&T) -> ($($part::Value,)+) + Send + Sync>,
            endianness: Endianness,
            constant_len: Option<usize>,
        }

        impl<T, $($part: Codec),+> $name<T, $($part),+> {
            /// Build a composite from its parts and the tuple conversions.
            ///
            /// # Panics
            /// Panics if the parts disagree on endianness.
            pub fn new<C, D>(parts: ($($part,)+), compose: C, decompose: D) -> Self
            where
                C: Fn(($($part::Value,)+)) -> T + Send + Sync + 'static,
                D: Fn(&T) -> ($($part::Value,)+) + Send + Sync + 'static,
            {
                let endianness = parts.0.endianness();
                $(
                    assert_eq!(
                        parts.$idx.endianness(),
                        endianness,
                        "composite part {} uses a different endianness",
                        $idx
                    );
                )+
                let constant_len = (|| Some(0usize $(+ parts.$idx.constant_len()?)+))();
                Self {
                    parts,
                    compose: Box::new(compose),
                    decompose: Box::new(decompose),
                    endianness,
                    constant_len,
                }
            }

            /// The sub-serializers in declaration order.
            pub fn parts(&self) -> &($($part,)+) {
                &self.parts
            }
        }

        impl<T, $($part: Codec),+> BinaryFormat for $name<T, $($part),+> {
            type Value = T;

            fn endianness(&self) -> Endianness {
                self.endianness
            }

            fn constant_len(&self) -> Option<usize> {
                self.constant_len
            }
        }

        impl<T, $($part: Codec),+> Serializer for $name<T, $($part),+> {
            fn serialized_len(&self, value: &T) -> usize {
                if let Some(len) = self.constant_len {
                    return len;
                }
                let values = (self.decompose)(value);
                0 $(+ self.parts.$idx.serialized_len(&values.$idx))+
            }

            fn write(&self, value: &T, out: &mut dyn ByteWrite) -> usize {
                let values = (self.decompose)(value);
                0 $(+ self.parts.$idx.write(&values.$idx, out))+
            }
        }

        impl<T, $($part: Codec),+> Deserializer for $name<T, $($part),+> {
            fn read(&self, input: &mut dyn ByteRead) -> Result<T, DeserializeError> {
                let values = ($(self.parts.$idx.read(input)?,)+);
                Ok((self.compose)(values))
            }
        }

        impl<T, $($part: Codec + std::fmt::Debug),+> std::fmt::Debug for $name<T, $($part),+> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("parts", &self.parts)
                    .field("endianness", &self.endianness)
                    .field("constant_len", &self.constant_len)
                    .finish()
            }
        }
    };
}

composite_serializer! {
    /// Composite of two sub-serializers.
    CompositeSerializer2 { 0 => S1, 1 => S2 }
}

composite_serializer! {
    /// Composite of three sub-serializers.
    CompositeSerializer3 { 0 => S1, 1 => S2, 2 => S3 }
}

composite_serializer! {
    /// Composite of four sub-serializers.
    CompositeSerializer4 { 0 => S1, 1 => S2, 2 => S3, 3 => S4 }
}

composite_serializer! {
    /// Composite of five sub-serializers.
    CompositeSerializer5 { 0 => S1, 1 => S2, 2 => S3, 3 => S4, 4 => S5 }
}
