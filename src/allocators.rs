//! Helper traits for allocator trait bounds.
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar, U1, U2, U3};

/// An allocator for a single spatial dimension.
///
/// Besides the scalar type `T`, the grid and geometry code needs integer cell indices and
/// reduced-precision bounding boxes, so those allocators are included as well.
pub trait DimAllocator<T: Scalar, D: DimName>:
    Allocator<T, D>
    + Allocator<T, D, D>
    + Allocator<T, U1, D>
    // Used for determinants
    + Allocator<(usize, usize), D>
    + Allocator<usize, D>
    + Allocator<i64, D>
    + Allocator<f32, D>
    + Allocator<f64, D>
{
}

impl<T, D> DimAllocator<T, D> for DefaultAllocator
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>
        + Allocator<T, D, D>
        + Allocator<T, U1, D>
        + Allocator<(usize, usize), D>
        + Allocator<usize, D>
        + Allocator<i64, D>
        + Allocator<f32, D>
        + Allocator<f64, D>,
{
}

/// Allocators for a pair of dimensions, such as the reference and spatial dimension of a
/// codimensional cell.
pub trait BiDimAllocator<T: Scalar, D1: DimName, D2: DimName>:
    DimAllocator<T, D1> + DimAllocator<T, D2> + Allocator<T, D1, D2> + Allocator<T, D2, D1>
{
}

impl<T: Scalar, D1: DimName, D2: DimName> BiDimAllocator<T, D1, D2> for DefaultAllocator where
    DefaultAllocator: DimAllocator<T, D1> + DimAllocator<T, D2> + Allocator<T, D1, D2> + Allocator<T, D2, D1>
{
}

/// Allocators for cells of any reference dimension embedded in `D` dimensions.
pub trait EmbeddingAllocator<T: Scalar, D: DimName>:
    BiDimAllocator<T, D, U1> + BiDimAllocator<T, D, U2> + BiDimAllocator<T, D, U3>
{
}

impl<T: Scalar, D: DimName> EmbeddingAllocator<T, D> for DefaultAllocator where
    DefaultAllocator: BiDimAllocator<T, D, U1> + BiDimAllocator<T, D, U2> + BiDimAllocator<T, D, U3>
{
}
