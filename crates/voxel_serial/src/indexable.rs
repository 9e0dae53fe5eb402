//! Serializers for bounded indexables.
//!
//! Cells are written in canonical order: dimension 0 outermost, the last
//! dimension varying fastest. The header (if any) describes the bounds so
//! the reader can rebuild an identical array before reading cells.
//!
//! ```text
//! Constant            | cells...
//! SerializedDimensions| dim0 dim1 .. dimN-1 | cells...
//! Serialized          | low0 .. lowN-1 | dim0 .. dimN-1 | cells...
//! InferredCube        | cells...            (side = N-th root of cell count)
//! ```

use voxel_index::{BoundedIndexable, DenseArray, Index, IndexingBounds};

use crate::error::DeserializeError;
use crate::io::{ByteRead, ByteWrite};
use crate::primitive::Primitive;
use crate::serializer::{BinaryFormat, Codec, Deserializer, Endianness, Serializer};

/// How the bounds of a serialized indexable are recovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundsFormat<const N: usize> {
    /// Bounds are known to both sides; only cells are written.
    Constant(IndexingBounds<N>),
    /// Dimensions are written as `i32`s; the lower corner is fixed.
    SerializedDimensions { lower: Index<N> },
    /// Lower corner then dimensions are written as `i32`s.
    Serialized,
    /// Nothing is written; the array is a hypercube whose side is derived
    /// from the remaining input length. Requires fixed-size cells.
    InferredCube { lower: Index<N> },
}

/// Serializes any [`BoundedIndexable`] and reads back a [`DenseArray`].
///
/// # Example
/// ```
/// use voxel_index::{DenseArray, Index2D, IndexingBounds};
/// use voxel_serial::{BoundsFormat, Deserializer, IndexableSerializer, PrimitiveSerializer, Serializer};
///
/// let bounds = IndexingBounds::from_dimensions(Index2D::new(2, 2));
/// let ser = IndexableSerializer::new(PrimitiveSerializer::<u8>::big_endian(), BoundsFormat::Constant(bounds));
///
/// let array = DenseArray::from_vec(bounds, vec![1, 2, 3, 4]);
/// let bytes = ser.to_vec(&array);
/// assert_eq!(bytes, vec![1, 2, 3, 4]);
/// assert_eq!(ser.from_bytes(&bytes).unwrap(), array);
/// ```
#[derive(Clone, Debug)]
pub struct IndexableSerializer<S, const N: usize> {
    cell: S,
    format: BoundsFormat<N>,
}

impl<S: Codec, const N: usize> IndexableSerializer<S, N>
where
    S::Value: Clone,
{
    /// # Panics
    /// Panics if `InferredCube` is used with variable-size cells.
    pub fn new(cell: S, format: BoundsFormat<N>) -> Self {
        if let BoundsFormat::InferredCube { .. } = format {
            assert!(
                matches!(cell.constant_len(), Some(len) if len > 0),
                "inferred bounds need a non-zero constant cell length"
            );
        }
        Self { cell, format }
    }

    pub fn cell(&self) -> &S {
        &self.cell
    }

    pub fn format(&self) -> &BoundsFormat<N> {
        &self.format
    }

    fn header_len(&self) -> usize {
        match self.format {
            BoundsFormat::Constant(_) | BoundsFormat::InferredCube { .. } => 0,
            BoundsFormat::SerializedDimensions { .. } => N * i32::SIZE,
            BoundsFormat::Serialized => 2 * N * i32::SIZE,
        }
    }

    fn check_bounds(&self, bounds: &IndexingBounds<N>) {
        match self.format {
            BoundsFormat::Constant(expected) => assert_eq!(
                *bounds, expected,
                "indexable bounds differ from the serializer's constant bounds"
            ),
            BoundsFormat::SerializedDimensions { lower } | BoundsFormat::InferredCube { lower } => {
                assert_eq!(
                    bounds.lower(),
                    lower,
                    "indexable lower bounds differ from the serializer's fixed lower bounds"
                )
            }
            BoundsFormat::Serialized => {}
        }
        if let BoundsFormat::InferredCube { .. } = self.format {
            let dims = bounds.dimensions();
            assert!(
                (0..N).all(|d| dims.get(d) == dims.get(0)),
                "inferred-cube serializer given non-cubic bounds {dims}"
            );
        }
    }

    /// Exact serialized length of any indexable.
    pub fn indexable_len<A>(&self, indexable: &A) -> usize
    where
        A: BoundedIndexable<N, Value = S::Value>,
    {
        let cells = match self.cell.constant_len() {
            Some(len) => len * indexable.len(),
            None => indexable
                .iter()
                .map(|(_, value)| self.cell.serialized_len(&value))
                .sum(),
        };
        self.header_len() + cells
    }

    /// Write any indexable (dense, constant, offset, tree) in canonical order.
    pub fn write_indexable<A>(&self, indexable: &A, out: &mut dyn ByteWrite) -> usize
    where
        A: BoundedIndexable<N, Value = S::Value>,
    {
        let bounds = indexable.bounds();
        self.check_bounds(&bounds);
        let endianness = self.cell.endianness();
        let mut written = 0;
        if let BoundsFormat::Serialized = self.format {
            for d in 0..N {
                bounds.lower().get(d).encode(endianness, out);
            }
            written += N * i32::SIZE;
        }
        if let BoundsFormat::SerializedDimensions { .. } | BoundsFormat::Serialized = self.format {
            for d in 0..N {
                bounds.dimensions().get(d).encode(endianness, out);
            }
            written += N * i32::SIZE;
        }
        for (_, value) in indexable.iter() {
            written += self.cell.write(&value, out);
        }
        written
    }

    /// Serialize an indexable into a new vector.
    pub fn indexable_to_vec<A>(&self, indexable: &A) -> Vec<u8>
    where
        A: BoundedIndexable<N, Value = S::Value>,
    {
        let mut bytes = Vec::with_capacity(self.indexable_len(indexable));
        self.write_indexable(indexable, &mut bytes);
        bytes
    }

    /// Read cells directly into an existing indexable with matching bounds.
    pub fn read_into<A>(&self, input: &mut dyn ByteRead, target: &mut A) -> Result<(), DeserializeError>
    where
        A: voxel_index::BoundedIndexableMut<N, Value = S::Value>,
    {
        let bounds = self.read_bounds(input)?;
        if bounds != target.bounds() {
            return Err(DeserializeError::InvalidBounds(format!(
                "serialized bounds {}..={} do not match target {}..={}",
                bounds.lower(),
                bounds.upper(),
                target.bounds().lower(),
                target.bounds().upper()
            )));
        }
        for index in bounds.iter() {
            let value = self.cell.read(input)?;
            target
                .try_set(index, value)
                .map_err(|err| DeserializeError::InvalidBounds(err.to_string()))?;
        }
        Ok(())
    }

    fn read_bounds(&self, input: &mut dyn ByteRead) -> Result<IndexingBounds<N>, DeserializeError> {
        let endianness = self.cell.endianness();
        match self.format {
            BoundsFormat::Constant(bounds) => Ok(bounds),
            BoundsFormat::SerializedDimensions { lower } => {
                let dimensions = read_index(input, endianness)?;
                make_bounds(lower, dimensions)
            }
            BoundsFormat::Serialized => {
                let lower = read_index(input, endianness)?;
                let dimensions = read_index(input, endianness)?;
                make_bounds(lower, dimensions)
            }
            BoundsFormat::InferredCube { lower } => {
                let remaining = input.remaining().ok_or(DeserializeError::UnknownLength)?;
                let cell_len = self.cell.constant_len().expect("checked at construction");
                assert_eq!(
                    remaining % cell_len,
                    0,
                    "remaining length {remaining} is not a multiple of cell length {cell_len}"
                );
                let cells = (remaining / cell_len) as u64;
                let side = integer_root(cells, N as u32).ok_or_else(|| {
                    DeserializeError::InvalidBounds(format!("{cells} cells do not form a rank-{N} cube"))
                })?;
                make_bounds(lower, Index::splat(side))
            }
        }
    }
}

fn read_index<const N: usize>(
    input: &mut dyn ByteRead,
    endianness: Endianness,
) -> Result<Index<N>, DeserializeError> {
    let mut coords = [0i32; N];
    for c in coords.iter_mut() {
        *c = i32::decode(input, endianness)?;
    }
    Ok(Index::from_array(coords))
}

fn make_bounds<const N: usize>(
    lower: Index<N>,
    dimensions: Index<N>,
) -> Result<IndexingBounds<N>, DeserializeError> {
    if !dimensions.all_positive() {
        return Err(DeserializeError::InvalidBounds(format!(
            "dimensions {dimensions} are not all positive"
        )));
    }
    if (0..N).any(|d| lower.get(d).checked_add(dimensions.get(d) - 1).is_none()) {
        return Err(DeserializeError::InvalidBounds(format!(
            "bounds at {lower} with dimensions {dimensions} overflow"
        )));
    }
    Ok(IndexingBounds::new(lower, dimensions))
}

/// Exact integer `rank`-th root of `value`, if one exists and fits `i32`.
fn integer_root(value: u64, rank: u32) -> Option<i32> {
    if value == 0 {
        return None;
    }
    let guess = (value as f64).powf(1.0 / rank as f64).round() as u64;
    for side in guess.saturating_sub(1)..=guess + 1 {
        if side > 0 && side.checked_pow(rank) == Some(value) {
            return i32::try_from(side).ok();
        }
    }
    None
}

impl<S: Codec, const N: usize> BinaryFormat for IndexableSerializer<S, N>
where
    S::Value: Clone,
{
    type Value = DenseArray<S::Value, N>;

    fn endianness(&self) -> Endianness {
        self.cell.endianness()
    }

    fn constant_len(&self) -> Option<usize> {
        match self.format {
            BoundsFormat::Constant(bounds) => self.cell.constant_len().map(|len| len * bounds.len()),
            _ => None,
        }
    }
}

impl<S: Codec, const N: usize> Serializer for IndexableSerializer<S, N>
where
    S::Value: Clone,
{
    fn serialized_len(&self, value: &DenseArray<S::Value, N>) -> usize {
        self.indexable_len(value)
    }

    fn write(&self, value: &DenseArray<S::Value, N>, out: &mut dyn ByteWrite) -> usize {
        self.write_indexable(value, out)
    }
}

impl<S: Codec, const N: usize> Deserializer for IndexableSerializer<S, N>
where
    S::Value: Clone,
{
    fn read(&self, input: &mut dyn ByteRead) -> Result<DenseArray<S::Value, N>, DeserializeError> {
        let bounds = self.read_bounds(input)?;
        let len = bounds.checked_len().and_then(|len| usize::try_from(len).ok());
        let Some(len) = len else {
            return Err(DeserializeError::InvalidBounds("cell count overflows".into()));
        };
        if let (Some(cell_len), Some(remaining)) = (self.cell.constant_len(), input.remaining()) {
            let needed = cell_len.saturating_mul(len);
            if needed > remaining {
                return Err(DeserializeError::UnexpectedEnd {
                    needed,
                    available: remaining,
                });
            }
        }
        let mut cells = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            cells.push(self.cell.read(input)?);
        }
        Ok(DenseArray::from_vec(bounds, cells))
    }
}
