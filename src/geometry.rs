//! Axis-aligned bounding boxes and a spatial index over them.
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, OVector, RealField, Scalar};
use rstar::primitives::GeomWithData;
use rstar::{Point as _, RTree, RTreeObject, AABB};
use std::marker::PhantomData;

#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    min: OVector<T, D>,
    max: OVector<T, D>,
}

impl<T, D> BoundingBox<T, D>
where
    T: Scalar + PartialOrd,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Creates a bounding box from its corners.
    ///
    /// # Panics
    ///
    /// Panics if `min` exceeds `max` in any coordinate.
    pub fn new(min: OVector<T, D>, max: OVector<T, D>) -> Self {
        for i in 0..D::dim() {
            assert!(min[i] <= max[i], "min must not exceed max in any coordinate");
        }
        Self { min, max }
    }

    pub fn min(&self) -> &OVector<T, D> {
        &self.min
    }

    pub fn max(&self) -> &OVector<T, D> {
        &self.max
    }
}

impl<T, D> From<OPoint<T, D>> for BoundingBox<T, D>
where
    T: Scalar + PartialOrd,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn from(point: OPoint<T, D>) -> Self {
        BoundingBox::new(point.coords.clone(), point.coords)
    }
}

impl<T, D> BoundingBox<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Computes the minimal bounding box which encloses both `self` and `other`.
    pub fn enclose(&self, other: &Self) -> Self {
        let min = self.min.zip_map(&other.min, |a, b| a.min(b));
        let max = self.max.zip_map(&other.max, |a, b| a.max(b));
        Self { min, max }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a OPoint<T, D>>) -> Option<Self> {
        let mut points = points.into_iter();
        points.next().map(|first_point| {
            points.fold(BoundingBox::from(first_point.clone()), |bounding_box, point| {
                bounding_box.enclose(&BoundingBox::from(point.clone()))
            })
        })
    }

    pub fn extents(&self) -> OVector<T, D> {
        &self.max - &self.min
    }

    pub fn center(&self) -> OPoint<T, D> {
        OPoint::from((&self.max + &self.min) * T::from_subset(&0.5f64))
    }

    /// Grows the box by `amount` in every direction.
    pub fn grow_uniformly(&self, amount: T) -> Self {
        Self {
            min: self.min.add_scalar(-amount.clone()),
            max: self.max.add_scalar(amount),
        }
    }

    /// Tests whether the point lies in the closed box.
    pub fn contains_point(&self, point: &OPoint<T, D>) -> bool {
        (0..D::dim()).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    /// Tests whether the point lies in the half-open box `[min, max)`.
    ///
    /// Boxes that tile space without overlap assign every point to at most one box under this
    /// test.
    pub fn contains_point_half_open(&self, point: &OPoint<T, D>) -> bool {
        (0..D::dim()).all(|i| point[i] >= self.min[i] && point[i] < self.max[i])
    }

    /// Tests whether the closed boxes intersect.
    pub fn intersects(&self, other: &Self) -> bool {
        (0..D::dim()).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }
}

impl<D> BoundingBox<f64, D>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D> + Allocator<f32, D>,
{
    /// Converts the box to single precision, rounding outward.
    ///
    /// The returned box always contains `self`.
    pub fn to_f32_outward(&self) -> BoundingBox<f32, D> {
        BoundingBox {
            min: self.min.map(f32_at_or_below),
            max: self.max.map(f32_at_or_above),
        }
    }
}

impl<D> BoundingBox<f32, D>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D> + Allocator<f32, D>,
{
    pub fn to_f64(&self) -> BoundingBox<f64, D> {
        BoundingBox {
            min: self.min.map(f64::from),
            max: self.max.map(f64::from),
        }
    }
}

/// The largest `f32` not greater than `x`.
fn f32_at_or_below(x: f64) -> f32 {
    let y = x as f32;
    if f64::from(y) > x {
        next_f32_down(y)
    } else {
        y
    }
}

/// The smallest `f32` not less than `x`.
fn f32_at_or_above(x: f64) -> f32 {
    let y = x as f32;
    if f64::from(y) < x {
        next_f32_up(y)
    } else {
        y
    }
}

fn next_f32_down(y: f32) -> f32 {
    if y.is_nan() || y == f32::NEG_INFINITY {
        y
    } else if y == 0.0 {
        -f32::from_bits(1)
    } else if y > 0.0 {
        f32::from_bits(y.to_bits() - 1)
    } else {
        f32::from_bits(y.to_bits() + 1)
    }
}

fn next_f32_up(y: f32) -> f32 {
    -next_f32_down(-y)
}

/// Largest spatial dimension supported by [`BoxIndex`].
const MAX_INDEX_DIM: usize = 3;

// rstar points must be `Copy`, which `OPoint<f64, D>` is not for generic `D`, so the
// coordinates are stored in a fixed-size array of which only the first `D` entries are used
#[derive(Debug, Clone, Copy, PartialEq)]
struct RTreePoint<D: DimName> {
    coords: [f64; MAX_INDEX_DIM],
    marker: PhantomData<D>,
}

impl<D: DimName> RTreePoint<D> {
    fn from_vector(v: &OVector<f64, D>) -> Self
    where
        DefaultAllocator: Allocator<f64, D>,
    {
        Self::generate(|i| v[i])
    }
}

impl<D: DimName> rstar::Point for RTreePoint<D> {
    type Scalar = f64;
    const DIMENSIONS: usize = D::USIZE;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        let mut coords = [0.0; MAX_INDEX_DIM];
        for (i, x) in coords.iter_mut().take(D::USIZE).enumerate() {
            *x = generator(i);
        }
        Self {
            coords,
            marker: PhantomData,
        }
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        self.coords[index]
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.coords[index]
    }
}

#[derive(Debug, Clone)]
struct RTreeBox<D>(BoundingBox<f64, D>)
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>;

impl<D> RTreeObject for RTreeBox<D>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>,
{
    type Envelope = AABB<RTreePoint<D>>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.0)
    }
}

fn envelope_of<D>(bounding_box: &BoundingBox<f64, D>) -> AABB<RTreePoint<D>>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>,
{
    AABB::from_corners(
        RTreePoint::from_vector(bounding_box.min()),
        RTreePoint::from_vector(bounding_box.max()),
    )
}

/// An R-tree over a collection of bounding boxes, answering which boxes intersect a query box.
#[derive(Debug, Clone)]
pub struct BoxIndex<D>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>,
{
    tree: RTree<GeomWithData<RTreeBox<D>, usize>>,
}

impl<D> BoxIndex<D>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>,
{
    /// Builds the index. Each box is identified by its position in `boxes`.
    ///
    /// # Panics
    ///
    /// Panics if the dimension exceeds three.
    pub fn from_boxes(boxes: impl IntoIterator<Item = BoundingBox<f64, D>>) -> Self {
        assert!(D::USIZE <= MAX_INDEX_DIM, "box index supports at most three dimensions");
        let geometries = boxes
            .into_iter()
            .enumerate()
            .map(|(i, bounding_box)| GeomWithData::new(RTreeBox(bounding_box), i))
            .collect();
        Self {
            tree: RTree::bulk_load(geometries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices of all boxes whose closed extent intersects `query`, in increasing order.
    pub fn intersecting(&self, query: &BoundingBox<f64, D>) -> Vec<usize> {
        let mut indices: Vec<_> = self
            .tree
            .locate_in_envelope_intersecting(&envelope_of(query))
            .map(|geom| geom.data)
            .collect();
        indices.sort_unstable();
        indices
    }
}
