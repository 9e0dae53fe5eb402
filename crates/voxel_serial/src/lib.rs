//! Length-exact binary serialization for voxel data.
//!
//! Serializers declare exactly how many bytes a value occupies, write through
//! a [`ByteWrite`] sink and read back through a pull-based [`ByteRead`]
//! source. Building blocks compose: primitives and strings at the leaves,
//! [`CompositeSerializer2`]..[`CompositeSerializer5`] for structs,
//! [`EnumerableSerializer`] for sequences and [`IndexableSerializer`] for
//! any bounded indexable from `voxel_index`.
//!
//! # Example
//!
//! ```
//! use voxel_index::{DenseArray, Index3D, IndexingBounds};
//! use voxel_serial::{BoundsFormat, Deserializer, IndexableSerializer, PrimitiveSerializer, Serializer};
//!
//! let bounds = IndexingBounds::cube(Index3D::new(-4, 0, -4), 4);
//! let densities = DenseArray::from_fn(bounds, |i| i.y() as i16 - 2);
//!
//! let ser = IndexableSerializer::new(PrimitiveSerializer::<i16>::little_endian(), BoundsFormat::Serialized);
//! let bytes = ser.to_vec(&densities);
//! assert_eq!(bytes.len(), 6 * 4 + 64 * 2);
//! assert_eq!(ser.from_bytes(&bytes).unwrap(), densities);
//! ```

pub mod composite;
pub mod enumerable;
pub mod error;
pub mod fixed;
pub mod indexable;
pub mod io;
pub mod primitive;
pub mod serializer;
pub mod string;

pub use crate::composite::{
    CompositeSerializer2, CompositeSerializer3, CompositeSerializer4, CompositeSerializer5,
};
pub use crate::enumerable::{CountFormat, EnumerableSerializer};
pub use crate::error::{DeserializeError, SerializeError};
pub use crate::fixed::FixedConstantSerializer;
pub use crate::indexable::{BoundsFormat, IndexableSerializer};
pub use crate::io::{
    BufferedArray, BufferedByteStream, ByteRead, ByteWrite, FnWriter, SliceReader, SliceWriter,
};
pub use crate::primitive::{PodSerializer, Primitive, PrimitiveSerializer};
pub use crate::serializer::{BinaryFormat, Codec, Deserializer, Endianness, Serializer};
pub use crate::string::StringSerializer;
