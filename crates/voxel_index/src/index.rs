//! Fixed-rank integer coordinates.
//!
//! [`Index`] is the universal coordinate type: chunk keys, voxel positions
//! and array cells are all addressed by an `Index<N>`. The rank is a const
//! generic, so a 2D overhead coordinate and a 3D volumetric coordinate share
//! one implementation.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Immutable N-dimensional integer coordinate.
///
/// Components are addressed by dimension number (`0..N`). For ranks 1–4 the
/// aliases [`Index1D`]..[`Index4D`] also provide named accessors
/// (`x`, `y`, `z`, `w`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index<const N: usize> {
    coords: [i32; N],
}

pub type Index1D = Index<1>;
pub type Index2D = Index<2>;
pub type Index3D = Index<3>;
pub type Index4D = Index<4>;

impl<const N: usize> Index<N> {
    /// The origin.
    pub const ZERO: Self = Self { coords: [0; N] };

    /// All components set to one.
    pub const ONE: Self = Self { coords: [1; N] };

    /// Number of dimensions.
    pub const RANK: usize = N;

    /// Create an index from its components.
    pub const fn from_array(coords: [i32; N]) -> Self {
        Self { coords }
    }

    /// Create an index with every component set to `value`.
    pub const fn splat(value: i32) -> Self {
        Self { coords: [value; N] }
    }

    /// Number of dimensions.
    #[inline]
    pub const fn rank(&self) -> usize {
        N
    }

    /// Component along `dimension`.
    ///
    /// # Panics
    /// Panics if `dimension >= N`.
    #[inline]
    pub fn get(&self, dimension: usize) -> i32 {
        assert!(dimension < N, "dimension {dimension} out of range for rank {N}");
        self.coords[dimension]
    }

    /// Copy of this index with one component replaced.
    #[inline]
    pub fn with(mut self, dimension: usize, value: i32) -> Self {
        assert!(dimension < N, "dimension {dimension} out of range for rank {N}");
        self.coords[dimension] = value;
        self
    }

    /// The components as an array.
    #[inline]
    pub const fn to_array(self) -> [i32; N] {
        self.coords
    }

    /// The components as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[i32] {
        &self.coords
    }

    /// Componentwise minimum.
    pub fn min(self, other: Self) -> Self {
        self.zip_with(other, i32::min)
    }

    /// Componentwise maximum.
    pub fn max(self, other: Self) -> Self {
        self.zip_with(other, i32::max)
    }

    /// Componentwise product, `None` on overflow.
    pub fn mul_components(self, other: Self) -> Option<Self> {
        let mut coords = [0; N];
        for (d, out) in coords.iter_mut().enumerate() {
            *out = self.coords[d].checked_mul(other.coords[d])?;
        }
        Some(Self { coords })
    }

    /// Euclidean division of each component.
    pub fn div_euclid(self, divisor: Self) -> Self {
        self.zip_with(divisor, i32::div_euclid)
    }

    /// Euclidean remainder of each component.
    pub fn rem_euclid(self, divisor: Self) -> Self {
        self.zip_with(divisor, i32::rem_euclid)
    }

    /// Whether every component is strictly positive.
    pub fn all_positive(&self) -> bool {
        self.coords.iter().all(|&c| c > 0)
    }

    /// Product of all components as `u64`, `None` on overflow or if any
    /// component is negative.
    pub fn checked_volume(&self) -> Option<u64> {
        self.coords.iter().try_fold(1u64, |acc, &c| {
            let c = u64::try_from(c).ok()?;
            acc.checked_mul(c)
        })
    }

    /// Select components by dimension number to build a lower (or equal)
    /// rank index. `project([0, 2])` on a 3D index drops Y.
    pub fn project<const M: usize>(&self, dimensions: [usize; M]) -> Index<M> {
        let mut coords = [0; M];
        for (out, &d) in coords.iter_mut().zip(dimensions.iter()) {
            *out = self.get(d);
        }
        Index { coords }
    }

    /// Dimension with the smallest component (lowest dimension number on ties).
    pub fn min_dimension(&self) -> usize {
        let mut best = 0;
        for d in 1..N {
            if self.coords[d] < self.coords[best] {
                best = d;
            }
        }
        best
    }

    fn zip_with(self, other: Self, f: impl Fn(i32, i32) -> i32) -> Self {
        let mut coords = self.coords;
        for (d, c) in coords.iter_mut().enumerate() {
            *c = f(*c, other.coords[d]);
        }
        Self { coords }
    }
}

impl Index<1> {
    pub const fn new(x: i32) -> Self {
        Self { coords: [x] }
    }

    #[inline]
    pub const fn x(&self) -> i32 {
        self.coords[0]
    }
}

impl Index<2> {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { coords: [x, y] }
    }

    #[inline]
    pub const fn x(&self) -> i32 {
        self.coords[0]
    }

    #[inline]
    pub const fn y(&self) -> i32 {
        self.coords[1]
    }
}

impl Index<3> {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { coords: [x, y, z] }
    }

    #[inline]
    pub const fn x(&self) -> i32 {
        self.coords[0]
    }

    #[inline]
    pub const fn y(&self) -> i32 {
        self.coords[1]
    }

    #[inline]
    pub const fn z(&self) -> i32 {
        self.coords[2]
    }

    /// Project onto the horizontal plane by dropping Y: `(x, y, z) -> (x, z)`.
    #[inline]
    pub const fn project_down(&self) -> Index2D {
        Index2D::new(self.coords[0], self.coords[2])
    }
}

impl Index<4> {
    pub const fn new(x: i32, y: i32, z: i32, w: i32) -> Self {
        Self { coords: [x, y, z, w] }
    }

    #[inline]
    pub const fn x(&self) -> i32 {
        self.coords[0]
    }

    #[inline]
    pub const fn y(&self) -> i32 {
        self.coords[1]
    }

    #[inline]
    pub const fn z(&self) -> i32 {
        self.coords[2]
    }

    #[inline]
    pub const fn w(&self) -> i32 {
        self.coords[3]
    }
}

impl Index2D {
    /// Lift an overhead `(x, z)` coordinate back into 3D at height `y`.
    #[inline]
    pub const fn lift(&self, y: i32) -> Index3D {
        Index3D::new(self.coords[0], y, self.coords[1])
    }
}

impl<const N: usize> Default for Index<N> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const N: usize> From<[i32; N]> for Index<N> {
    fn from(coords: [i32; N]) -> Self {
        Self { coords }
    }
}

impl<const N: usize> From<Index<N>> for [i32; N] {
    fn from(index: Index<N>) -> Self {
        index.coords
    }
}

impl<const N: usize> Add for Index<N> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl<const N: usize> AddAssign for Index<N> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<const N: usize> Sub for Index<N> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a - b)
    }
}

impl<const N: usize> SubAssign for Index<N> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<const N: usize> Neg for Index<N> {
    type Output = Self;

    fn neg(self) -> Self {
        self.zip_with(Self::ZERO, |a, _| -a)
    }
}

impl<const N: usize> Mul<i32> for Index<N> {
    type Output = Self;

    fn mul(self, rhs: i32) -> Self {
        self.zip_with(Self::ZERO, |a, _| a * rhs)
    }
}

impl<const N: usize> fmt::Debug for Index<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Index{}D{:?}", N, self.coords)
    }
}

impl<const N: usize> fmt::Display for Index<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (d, c) in self.coords.iter().enumerate() {
            if d > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{c}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_matches_const_parameter() {
        assert_eq!(Index1D::new(1).rank(), 1);
        assert_eq!(Index2D::new(1, 2).rank(), 2);
        assert_eq!(Index3D::new(1, 2, 3).rank(), 3);
        assert_eq!(Index4D::new(1, 2, 3, 4).rank(), 4);
        assert_eq!(Index3D::RANK, 3);
    }

    #[test]
    fn component_access_by_dimension() {
        let index = Index4D::new(4, 5, 6, 7);
        assert_eq!(index.get(0), 4);
        assert_eq!(index.get(3), 7);
        assert_eq!(index.x(), 4);
        assert_eq!(index.w(), 7);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn component_access_past_rank_panics() {
        Index2D::new(1, 2).get(2);
    }

    #[test]
    fn vector_arithmetic() {
        let a = Index3D::new(1, 2, 3);
        let b = Index3D::new(10, 20, 30);
        assert_eq!(a + b, Index3D::new(11, 22, 33));
        assert_eq!(b - a, Index3D::new(9, 18, 27));
        assert_eq!(-a, Index3D::new(-1, -2, -3));
        assert_eq!(a * 2, Index3D::new(2, 4, 6));
    }

    #[test]
    fn project_down_drops_vertical_axis() {
        let index = Index3D::new(3, 99, -4);
        assert_eq!(index.project_down(), Index2D::new(3, -4));
        assert_eq!(index.project([0, 2]), Index2D::new(3, -4));
        assert_eq!(index.project_down().lift(99), index);
    }

    #[test]
    fn euclidean_division_handles_negatives() {
        let size = Index3D::splat(16);
        assert_eq!(Index3D::new(-1, 15, 16).div_euclid(size), Index3D::new(-1, 0, 1));
        assert_eq!(Index3D::new(-1, 15, 16).rem_euclid(size), Index3D::new(15, 15, 0));
    }

    #[test]
    fn checked_volume_detects_overflow_and_negatives() {
        assert_eq!(Index3D::new(2, 3, 4).checked_volume(), Some(24));
        assert_eq!(Index2D::new(-1, 3).checked_volume(), None);
        assert_eq!(Index4D::splat(i32::MAX).checked_volume(), None);
    }

    #[test]
    fn min_dimension_prefers_lowest_on_ties() {
        assert_eq!(Index3D::new(3, 1, 3).min_dimension(), 1);
        assert_eq!(Index2D::new(5, 5).min_dimension(), 0);
        assert_eq!(Index2D::new(5, 2).min_dimension(), 1);
    }

    #[test]
    fn display_lists_components() {
        assert_eq!(Index3D::new(1, -2, 3).to_string(), "(1, -2, 3)");
    }
}
