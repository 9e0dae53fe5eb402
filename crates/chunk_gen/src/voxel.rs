//! Voxel cells, voxel grids and their binary formats.

use bytemuck::{Pod, Zeroable};
use voxel_index::{Array3D, IndexingBounds};
use voxel_serial::{
    BoundsFormat, CompositeSerializer2, Endianness, IndexableSerializer, PrimitiveSerializer,
};

/// Material identifier.
pub type MaterialId = u16;

/// Reserved material value for empty voxels.
pub const MATERIAL_EMPTY: MaterialId = 0;

/// One cell of a voxel grid.
///
/// `density` is a signed distance-like value: negative is outside the
/// surface, positive inside. Contouring places the surface at zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Voxel {
    pub material: MaterialId,
    pub density: i16,
}

impl Voxel {
    /// Empty space.
    pub const AIR: Voxel = Voxel {
        material: MATERIAL_EMPTY,
        density: i16::MIN,
    };

    pub const fn new(material: MaterialId, density: i16) -> Self {
        Self { material, density }
    }

    /// Fully solid voxel of `material`.
    pub const fn solid(material: MaterialId) -> Self {
        Self {
            material,
            density: i16::MAX,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.material == MATERIAL_EMPTY
    }
}

/// Voxel storage of one chunk, indexed locally from zero.
pub type VoxelGrid = Array3D<Voxel>;

/// A fresh all-air grid covering `bounds`.
pub fn empty_grid(bounds: IndexingBounds<3>) -> VoxelGrid {
    VoxelGrid::new(bounds, Voxel::AIR)
}

/// Serializer for a single voxel: material then density.
pub type VoxelSerializer = CompositeSerializer2<
    Voxel,
    PrimitiveSerializer<MaterialId>,
    PrimitiveSerializer<i16>,
>;

/// Serializer for whole voxel grids of one fixed size.
pub type VoxelGridSerializer = IndexableSerializer<VoxelSerializer, 3>;

pub fn voxel_serializer(endianness: Endianness) -> VoxelSerializer {
    CompositeSerializer2::new(
        (
            PrimitiveSerializer::new(endianness),
            PrimitiveSerializer::new(endianness),
        ),
        |(material, density)| Voxel { material, density },
        |voxel: &Voxel| (voxel.material, voxel.density),
    )
}

/// Grid serializer for chunks with local bounds `bounds`. Only cells are
/// written; both sides agree on the bounds.
pub fn voxel_grid_serializer(bounds: IndexingBounds<3>, endianness: Endianness) -> VoxelGridSerializer {
    IndexableSerializer::new(voxel_serializer(endianness), BoundsFormat::Constant(bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel_index::{BoundedIndexable, BoundedIndexableMut, Index3D};
    use voxel_serial::{BinaryFormat, Deserializer, Serializer};

    #[test]
    fn voxel_layout_is_material_then_density() {
        let ser = voxel_serializer(Endianness::Big);
        assert_eq!(ser.constant_len(), Some(4));
        assert_eq!(ser.to_vec(&Voxel::new(0x0102, -2)), vec![1, 2, 0xff, 0xfe]);

        let little = voxel_serializer(Endianness::Little);
        assert_eq!(little.to_vec(&Voxel::new(0x0102, -2)), vec![2, 1, 0xfe, 0xff]);
    }

    #[test]
    fn grid_round_trips() {
        let bounds = IndexingBounds::cube(Index3D::ZERO, 4);
        let mut grid = empty_grid(bounds);
        grid.set(Index3D::new(1, 2, 3), Voxel::solid(7));
        grid.set(Index3D::new(3, 3, 3), Voxel::new(2, 100));

        let ser = voxel_grid_serializer(bounds, Endianness::Little);
        let bytes = ser.to_vec(&grid);
        assert_eq!(bytes.len(), 64 * 4);
        assert_eq!(ser.from_bytes(&bytes).unwrap(), grid);
    }

    #[test]
    fn air_is_empty() {
        assert!(Voxel::AIR.is_empty());
        assert!(!Voxel::solid(1).is_empty());
        assert_eq!(bytemuck::bytes_of(&Voxel::solid(1)).len(), 4);
        let grid = empty_grid(IndexingBounds::cube(Index3D::ZERO, 2));
        assert!(grid.iter().all(|(_, voxel)| voxel == Voxel::AIR));
    }
}
