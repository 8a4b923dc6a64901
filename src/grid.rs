//! A single level of a block-structured Cartesian grid.
//!
//! The level is covered by non-overlapping rectangular patches of cells. Every rank knows the
//! boxes and owners of all patches, but only stores data for the patches it owns. Cell data is
//! cell-centred, with a fixed number of components (the depth) and a layer of ghost cells
//! around each patch.
use crate::allocators::DimAllocator;
use crate::comm::Communicator;
use crate::error::Error;
use crate::geometry::{BoundingBox, BoxIndex};
use crate::partition::Partitioner;
use crate::SmallDim;
use log::debug;
use nalgebra::{DefaultAllocator, OPoint, OVector};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// An inclusive box of cell indices. The box is empty if `upper < lower` along any axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellBox<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    lower: OVector<i64, D>,
    upper: OVector<i64, D>,
}

impl<D> CellBox<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    pub fn new(lower: OVector<i64, D>, upper: OVector<i64, D>) -> Self {
        Self { lower, upper }
    }

    pub fn lower(&self) -> &OVector<i64, D> {
        &self.lower
    }

    pub fn upper(&self) -> &OVector<i64, D> {
        &self.upper
    }

    pub fn is_empty(&self) -> bool {
        (0..D::dim()).any(|i| self.upper[i] < self.lower[i])
    }

    /// Number of cells along the given axis.
    pub fn extent(&self, axis: usize) -> usize {
        (self.upper[axis] - self.lower[axis] + 1).max(0) as usize
    }

    pub fn num_cells(&self) -> usize {
        (0..D::dim()).map(|i| self.extent(i)).product()
    }

    pub fn contains(&self, index: &OVector<i64, D>) -> bool {
        (0..D::dim()).all(|i| index[i] >= self.lower[i] && index[i] <= self.upper[i])
    }

    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let intersection = Self {
            lower: self.lower.zip_map(&other.lower, i64::max),
            upper: self.upper.zip_map(&other.upper, i64::min),
        };
        (!intersection.is_empty()).then_some(intersection)
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.intersection(other).is_some()
    }

    /// The box grown by `width` cells in every direction.
    pub fn grow(&self, width: usize) -> Self {
        let width = width as i64;
        Self {
            lower: self.lower.add_scalar(-width),
            upper: self.upper.add_scalar(width),
        }
    }

    /// Position of the cell in the iteration order of the box.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not contained in the box.
    pub fn linear_index(&self, index: &OVector<i64, D>) -> usize {
        assert!(
            self.contains(index),
            "cell {:?} is outside of the box {:?}..={:?}",
            index.as_slice(),
            self.lower.as_slice(),
            self.upper.as_slice()
        );
        let mut linear = 0;
        let mut stride = 1;
        for i in 0..D::dim() {
            linear += (index[i] - self.lower[i]) as usize * stride;
            stride *= self.extent(i);
        }
        linear
    }

    /// Iterates over the cells of the box with the first index varying fastest.
    pub fn iter(&self) -> CellBoxIter<D> {
        CellBoxIter {
            next: (!self.is_empty()).then(|| self.lower.clone()),
            cell_box: self.clone(),
        }
    }
}

pub struct CellBoxIter<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    cell_box: CellBox<D>,
    next: Option<OVector<i64, D>>,
}

impl<D> Iterator for CellBoxIter<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    type Item = OVector<i64, D>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut following = current.clone();
        for axis in 0..D::dim() {
            if following[axis] < self.cell_box.upper[axis] {
                following[axis] += 1;
                self.next = Some(following);
                break;
            }
            following[axis] = self.cell_box.lower[axis];
        }
        Some(current)
    }
}

/// Identifies a cell quantity allocated on a [`PatchLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataIndex(pub usize);

/// Cell-centred data of one patch, including ghost cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CellData<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    depth: usize,
    ghost_width: usize,
    ghost_box: CellBox<D>,
    values: Vec<f64>,
}

impl<D> CellData<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    pub fn zeros(interior: &CellBox<D>, depth: usize, ghost_width: usize) -> Self {
        let ghost_box = interior.grow(ghost_width);
        Self {
            depth,
            ghost_width,
            values: vec![0.0; ghost_box.num_cells() * depth],
            ghost_box,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn ghost_width(&self) -> usize {
        self.ghost_width
    }

    /// The box of cells with storage, including ghost cells.
    pub fn ghost_box(&self) -> &CellBox<D> {
        &self.ghost_box
    }

    fn offset(&self, index: &OVector<i64, D>, component: usize) -> usize {
        assert!(component < self.depth, "component out of bounds");
        self.ghost_box.linear_index(index) * self.depth + component
    }

    /// # Panics
    ///
    /// Panics if the cell is outside of the ghost box or the component exceeds the depth.
    pub fn get(&self, index: &OVector<i64, D>, component: usize) -> f64 {
        self.values[self.offset(index, component)]
    }

    pub fn set(&mut self, index: &OVector<i64, D>, component: usize, value: f64) {
        let offset = self.offset(index, component);
        self.values[offset] = value;
    }

    pub fn add(&mut self, index: &OVector<i64, D>, component: usize, value: f64) {
        let offset = self.offset(index, component);
        self.values[offset] += value;
    }

    pub fn fill(&mut self, value: f64) {
        self.values.iter_mut().for_each(|v| *v = value);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// All components of the cells in `region`, cell by cell.
    fn extract(&self, region: &CellBox<D>) -> Vec<f64> {
        let mut values = Vec::with_capacity(region.num_cells() * self.depth);
        for index in region.iter() {
            let offset = self.offset(&index, 0);
            values.extend_from_slice(&self.values[offset..offset + self.depth]);
        }
        values
    }

    fn combine(&mut self, region: &CellBox<D>, values: &[f64], add: bool) {
        assert_eq!(values.len(), region.num_cells() * self.depth);
        for (index, cell_values) in region.iter().zip(values.chunks_exact(self.depth)) {
            let offset = self.offset(&index, 0);
            for (target, value) in self.values[offset..offset + self.depth].iter_mut().zip(cell_values) {
                if add {
                    *target += value;
                } else {
                    *target = *value;
                }
            }
        }
    }

    /// Sets all ghost cells (cells outside `interior`) to zero.
    fn zero_ghosts(&mut self, interior: &CellBox<D>) -> f64 {
        let mut removed = 0.0;
        for index in self.ghost_box.clone().iter() {
            if !interior.contains(&index) {
                let offset = self.offset(&index, 0);
                for value in &mut self.values[offset..offset + self.depth] {
                    removed += *value;
                    *value = 0.0;
                }
            }
        }
        removed
    }
}

/// Origin and spacing of a uniform Cartesian grid.
///
/// Cell `i` covers `[origin + i * dx, origin + (i + 1) * dx)` componentwise.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    origin: OPoint<f64, D>,
    dx: OVector<f64, D>,
}

impl<D> GridGeometry<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// # Panics
    ///
    /// Panics if the spacing is not positive along every axis.
    pub fn new(origin: OPoint<f64, D>, dx: OVector<f64, D>) -> Self {
        assert!(dx.iter().all(|&h| h > 0.0), "grid spacing must be positive");
        Self { origin, dx }
    }

    pub fn origin(&self) -> &OPoint<f64, D> {
        &self.origin
    }

    pub fn dx(&self) -> &OVector<f64, D> {
        &self.dx
    }

    pub fn min_dx(&self) -> f64 {
        self.dx.min()
    }

    pub fn cell_volume(&self) -> f64 {
        self.dx.product()
    }

    /// Index of the cell containing the point.
    pub fn cell_index(&self, point: &OPoint<f64, D>) -> OVector<i64, D> {
        OVector::<i64, D>::from_fn(|i, _| ((point[i] - self.origin[i]) / self.dx[i]).floor() as i64)
    }

    pub fn cell_center(&self, index: &OVector<i64, D>) -> OPoint<f64, D> {
        OPoint::from(OVector::<f64, D>::from_fn(|i, _| {
            self.origin[i] + (index[i] as f64 + 0.5) * self.dx[i]
        }))
    }

    /// The physical region covered by the cells of the box.
    pub fn box_bounds(&self, cell_box: &CellBox<D>) -> BoundingBox<f64, D> {
        let min = OVector::<f64, D>::from_fn(|i, _| self.origin[i] + cell_box.lower()[i] as f64 * self.dx[i]);
        let max = OVector::<f64, D>::from_fn(|i, _| self.origin[i] + (cell_box.upper()[i] + 1) as f64 * self.dx[i]);
        BoundingBox::new(min, max)
    }
}

/// A patch owned by this rank.
#[derive(Debug, Clone)]
pub struct Patch<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    global_index: usize,
    cell_box: CellBox<D>,
    bounding_box: BoundingBox<f64, D>,
    // Per axis, whether the upper face lies on the upper boundary of the level
    closed_upper: Vec<bool>,
    data: FxHashMap<DataIndex, CellData<D>>,
}

impl<D> Patch<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// Index of the patch among all patches of the level.
    pub fn global_index(&self) -> usize {
        self.global_index
    }

    pub fn cell_box(&self) -> &CellBox<D> {
        &self.cell_box
    }

    /// The physical region covered by the interior cells of the patch.
    pub fn bounding_box(&self) -> &BoundingBox<f64, D> {
        &self.bounding_box
    }

    /// Tests whether a point is attributed to this patch.
    ///
    /// A patch owns the half-open region `[min, max)` of its bounding box, except that the upper
    /// face is included along axes where the patch touches the upper boundary of the level.
    /// Points covered by the patches of a level are attributed to exactly one of them.
    pub fn owns_point(&self, point: &OPoint<f64, D>) -> bool {
        let (min, max) = (self.bounding_box.min(), self.bounding_box.max());
        (0..D::dim()).all(|i| {
            let below_upper = point[i] < max[i] || (self.closed_upper[i] && point[i] == max[i]);
            point[i] >= min[i] && below_upper
        })
    }

    pub fn data(&self, index: DataIndex) -> Option<&CellData<D>> {
        self.data.get(&index)
    }

    pub fn data_mut(&mut self, index: DataIndex) -> Option<&mut CellData<D>> {
        self.data.get_mut(&index)
    }
}

type GhostMessage = Vec<(usize, usize, Vec<f64>)>;

/// One level of patches covering (part of) a uniform Cartesian grid.
pub struct PatchLevel<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    comm: Arc<dyn Communicator>,
    geometry: GridGeometry<D>,
    patch_boxes: Vec<CellBox<D>>,
    owners: Vec<usize>,
    patches: Vec<Patch<D>>,
    local_patch_lookup: FxHashMap<usize, usize>,
    layouts: FxHashMap<DataIndex, (usize, usize)>,
    next_data_index: usize,
}

impl<D> std::fmt::Debug for PatchLevel<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchLevel")
            .field("geometry", &self.geometry)
            .field("num_global_patches", &self.patch_boxes.len())
            .field("num_local_patches", &self.patches.len())
            .field("layouts", &self.layouts)
            .finish()
    }
}

impl<D> PatchLevel<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// Creates a level from the boxes of all patches and their owning ranks.
    ///
    /// Every rank must pass the same boxes and owners. Boxes must be non-empty and pairwise
    /// disjoint.
    pub fn new(
        comm: Arc<dyn Communicator>,
        geometry: GridGeometry<D>,
        patch_boxes: Vec<CellBox<D>>,
        owners: Vec<usize>,
    ) -> Result<Self, Error> {
        if owners.len() != patch_boxes.len() {
            return Err(Error::SizeMismatch {
                what: "patch owners",
                expected: patch_boxes.len(),
                actual: owners.len(),
            });
        }
        if let Some(&owner) = owners.iter().find(|&&owner| owner >= comm.size()) {
            return Err(Error::InvalidParameter {
                name: "owners",
                reason: format!("rank {} does not exist in a world of size {}", owner, comm.size()),
            });
        }
        if patch_boxes.iter().any(CellBox::is_empty) {
            return Err(Error::InvalidParameter {
                name: "patch_boxes",
                reason: "patches must not be empty".to_string(),
            });
        }
        for (i, a) in patch_boxes.iter().enumerate() {
            if patch_boxes[i + 1..].iter().any(|b| a.intersects(b)) {
                return Err(Error::InvalidParameter {
                    name: "patch_boxes",
                    reason: format!("patch {} overlaps another patch", i),
                });
            }
        }

        let domain_upper: Vec<i64> = (0..D::dim())
            .map(|i| patch_boxes.iter().map(|b| b.upper()[i]).max().unwrap_or(0))
            .collect();
        let rank = comm.rank();
        let patches: Vec<_> = patch_boxes
            .iter()
            .zip(&owners)
            .enumerate()
            .filter(|(_, (_, &owner))| owner == rank)
            .map(|(global_index, (cell_box, _))| Patch {
                global_index,
                cell_box: cell_box.clone(),
                bounding_box: geometry.box_bounds(cell_box),
                closed_upper: (0..D::dim()).map(|i| cell_box.upper()[i] == domain_upper[i]).collect(),
                data: FxHashMap::default(),
            })
            .collect();
        let local_patch_lookup = patches
            .iter()
            .enumerate()
            .map(|(local, patch)| (patch.global_index, local))
            .collect();

        Ok(Self {
            comm,
            geometry,
            patch_boxes,
            owners,
            patches,
            local_patch_lookup,
            layouts: FxHashMap::default(),
            next_data_index: 0,
        })
    }

    /// Covers `domain` with patches of at most `patch_size` cells per axis, distributed in
    /// contiguous blocks over the ranks.
    pub fn tile(
        comm: Arc<dyn Communicator>,
        geometry: GridGeometry<D>,
        domain: &CellBox<D>,
        patch_size: &OVector<i64, D>,
    ) -> Result<Self, Error> {
        if patch_size.iter().any(|&n| n <= 0) {
            return Err(Error::InvalidParameter {
                name: "patch_size",
                reason: "patch sizes must be positive".to_string(),
            });
        }
        let num_patches_per_axis = OVector::<i64, D>::from_fn(|i, _| {
            (domain.extent(i) as i64 + patch_size[i] - 1) / patch_size[i]
        });
        let patch_grid = CellBox::new(OVector::<i64, D>::zeros(), num_patches_per_axis.add_scalar(-1));
        let patch_boxes: Vec<_> = patch_grid
            .iter()
            .map(|p| {
                let lower = domain.lower() + p.component_mul(patch_size);
                let upper = (&lower + patch_size.add_scalar(-1)).zip_map(domain.upper(), i64::min);
                CellBox::new(lower, upper)
            })
            .collect();
        let partitioner = Partitioner::uniform(patch_boxes.len(), comm.size());
        let owners = (0..patch_boxes.len()).map(|i| partitioner.owner(i)).collect();
        Self::new(comm, geometry, patch_boxes, owners)
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn geometry(&self) -> &GridGeometry<D> {
        &self.geometry
    }

    /// Boxes of all patches of the level, owned by any rank.
    pub fn global_patch_boxes(&self) -> &[CellBox<D>] {
        &self.patch_boxes
    }

    pub fn patch_owner(&self, global_index: usize) -> usize {
        self.owners[global_index]
    }

    /// The patches owned by this rank, ordered by global index.
    pub fn patches(&self) -> &[Patch<D>] {
        &self.patches
    }

    /// Borrows the geometry and the local patches at the same time.
    pub fn geometry_and_patches_mut(&mut self) -> (&GridGeometry<D>, &mut [Patch<D>]) {
        (&self.geometry, &mut self.patches)
    }

    /// Allocates a quantity with `depth` components and `ghost_width` ghost cells on every
    /// local patch, initialized to zero.
    ///
    /// Data indices are handed out by a counter, so every rank must allocate in the same order.
    pub fn allocate_data(&mut self, depth: usize, ghost_width: usize) -> DataIndex {
        assert!(depth > 0, "depth must be positive");
        let index = DataIndex(self.next_data_index);
        self.next_data_index += 1;
        for patch in &mut self.patches {
            let data = CellData::zeros(&patch.cell_box, depth, ghost_width);
            patch.data.insert(index, data);
        }
        self.layouts.insert(index, (depth, ghost_width));
        index
    }

    pub fn deallocate_data(&mut self, index: DataIndex) -> Result<(), Error> {
        self.layouts
            .remove(&index)
            .ok_or(Error::UnknownDataIndex(index))?;
        for patch in &mut self.patches {
            patch.data.remove(&index);
        }
        Ok(())
    }

    /// Depth and ghost width of the quantity.
    pub fn data_layout(&self, index: DataIndex) -> Result<(usize, usize), Error> {
        self.layouts
            .get(&index)
            .copied()
            .ok_or(Error::UnknownDataIndex(index))
    }

    /// Sets every value, including ghost values, on the local patches.
    pub fn fill_data(&mut self, index: DataIndex, value: f64) -> Result<(), Error> {
        self.data_layout(index)?;
        for patch in &mut self.patches {
            if let Some(data) = patch.data.get_mut(&index) {
                data.fill(value);
            }
        }
        Ok(())
    }

    /// Pairs `(source, destination, region)` of distinct patches such that `region`, the
    /// intersection of the source interior with the ghost box of the destination, is non-empty.
    fn ghost_overlaps(&self, ghost_width: usize) -> Vec<(usize, usize, CellBox<D>)> {
        let mut overlaps = Vec::new();
        for (destination, destination_box) in self.patch_boxes.iter().enumerate() {
            let ghost_box = destination_box.grow(ghost_width);
            for (source, source_box) in self.patch_boxes.iter().enumerate() {
                if source != destination {
                    if let Some(region) = ghost_box.intersection(source_box) {
                        overlaps.push((source, destination, region));
                    }
                }
            }
        }
        overlaps
    }

    fn region(&self, source: usize, destination: usize, ghost_width: usize) -> Option<CellBox<D>> {
        self.patch_boxes[destination]
            .grow(ghost_width)
            .intersection(&self.patch_boxes[source])
    }

    fn local_data(&self, global_index: usize, index: DataIndex) -> &CellData<D> {
        let local = self.local_patch_lookup[&global_index];
        self.patches[local]
            .data
            .get(&index)
            .expect("data is allocated on every local patch")
    }

    fn local_data_mut(&mut self, global_index: usize, index: DataIndex) -> &mut CellData<D> {
        let local = self.local_patch_lookup[&global_index];
        self.patches[local]
            .data
            .get_mut(&index)
            .expect("data is allocated on every local patch")
    }

    /// Sends one (possibly empty) message to every other rank and combines the messages
    /// received in return into the local patches. Each entry names the (source, destination)
    /// patch pair. When accumulating, the region lies in the ghost box of the source patch and
    /// values are added, otherwise it lies in the ghost box of the destination and values are
    /// copied.
    fn exchange(&mut self, index: DataIndex, ghost_width: usize, outgoing: Vec<GhostMessage>, accumulate: bool) {
        let rank = self.comm.rank();
        let tag = self.comm.next_tag();
        for (destination, message) in outgoing.into_iter().enumerate() {
            if destination != rank {
                self.comm.send(destination, tag, message);
            }
        }
        for source_rank in (0..self.comm.size()).filter(|&r| r != rank) {
            let message: GhostMessage = self.comm.receive(source_rank, tag);
            for (source, destination, values) in message {
                let region = if accumulate {
                    self.region(destination, source, ghost_width)
                } else {
                    self.region(source, destination, ghost_width)
                };
                let region = region.expect("ranks agree on the patch layout");
                self.local_data_mut(destination, index)
                    .combine(&region, &values, accumulate);
            }
        }
    }

    /// Copies interior values of neighbouring patches into the ghost cells of the local
    /// patches. Ghost cells not covered by any patch are left untouched. Collective.
    pub fn fill_ghost_data(&mut self, index: DataIndex) -> Result<(), Error> {
        let (_, ghost_width) = self.data_layout(index)?;
        let rank = self.comm.rank();
        let mut outgoing = vec![GhostMessage::new(); self.comm.size()];
        let mut local = Vec::new();
        for (source, destination, region) in self.ghost_overlaps(ghost_width) {
            if self.owners[source] != rank {
                continue;
            }
            let values = self.local_data(source, index).extract(&region);
            if self.owners[destination] == rank {
                local.push((destination, region, values));
            } else {
                outgoing[self.owners[destination]].push((source, destination, values));
            }
        }

        for (destination, region, values) in local {
            self.local_data_mut(destination, index)
                .combine(&region, &values, false);
        }
        self.exchange(index, ghost_width, outgoing, false);
        Ok(())
    }

    /// Adds the values in the ghost cells of the local patches to the interior cells of the
    /// patches that cover them, on any rank, and then zeroes all ghost cells. Values in ghost
    /// cells that are not covered by any patch are discarded. Collective.
    pub fn accumulate_ghost_data(&mut self, index: DataIndex) -> Result<(), Error> {
        let (_, ghost_width) = self.data_layout(index)?;
        let rank = self.comm.rank();
        let mut outgoing = vec![GhostMessage::new(); self.comm.size()];
        let mut local = Vec::new();
        let mut transferred = 0.0;
        for (destination, source, region) in self.ghost_overlaps(ghost_width) {
            // Here the ghost region of `source` overlaps the interior of `destination`
            if self.owners[source] != rank {
                continue;
            }
            let values = self.local_data(source, index).extract(&region);
            transferred += values.iter().sum::<f64>();
            if self.owners[destination] == rank {
                local.push((destination, region, values));
            } else {
                outgoing[self.owners[destination]].push((source, destination, values));
            }
        }

        let mut removed = 0.0;
        for patch in &mut self.patches {
            if let Some(data) = patch.data.get_mut(&index) {
                removed += data.zero_ghosts(&patch.cell_box);
            }
        }
        let dropped = removed - transferred;
        if dropped != 0.0 {
            debug!(
                "rank {}: dropped ghost contributions outside of the patch level (total {:e})",
                rank, dropped
            );
        }

        for (destination, region, values) in local {
            self.local_data_mut(destination, index)
                .combine(&region, &values, true);
        }
        self.exchange(index, ghost_width, outgoing, true);
        Ok(())
    }

    /// Sets component 0 of every local interior cell that intersects one of the boxes to
    /// `value`. Returns the number of tagged local cells.
    pub fn tag_cells(
        &mut self,
        index: DataIndex,
        boxes: &[BoundingBox<f64, D>],
        value: f64,
    ) -> Result<usize, Error> {
        self.data_layout(index)?;
        let box_index = BoxIndex::from_boxes(boxes.iter().cloned());
        let mut num_tagged = 0;
        for patch in &mut self.patches {
            let candidates = box_index.intersecting(&patch.bounding_box);
            if candidates.is_empty() {
                continue;
            }
            let data = patch
                .data
                .get_mut(&index)
                .expect("data is allocated on every local patch");
            for cell in patch.cell_box.iter() {
                let cell_bounds = self
                    .geometry
                    .box_bounds(&CellBox::new(cell.clone(), cell.clone()));
                if candidates.iter().any(|&i| boxes[i].intersects(&cell_bounds)) {
                    data.set(&cell, 0, value);
                    num_tagged += 1;
                }
            }
        }
        Ok(num_tagged)
    }

    /// Adds the interior values of `source` to those of `destination` on the local patches.
    pub fn add_interior_data(&mut self, destination: DataIndex, source: DataIndex) -> Result<(), Error> {
        let (destination_depth, _) = self.data_layout(destination)?;
        let (source_depth, _) = self.data_layout(source)?;
        if destination_depth != source_depth {
            return Err(Error::SizeMismatch {
                what: "grid data depth",
                expected: destination_depth,
                actual: source_depth,
            });
        }
        for patch in &mut self.patches {
            let values = patch
                .data(source)
                .expect("data is allocated on every local patch")
                .extract(&patch.cell_box);
            patch
                .data
                .get_mut(&destination)
                .expect("data is allocated on every local patch")
                .combine(&patch.cell_box, &values, true);
        }
        Ok(())
    }

    /// Sum of the interior values of a component over all patches of all ranks. Collective.
    pub fn interior_sum(&self, index: DataIndex, component: usize) -> Result<f64, Error> {
        self.data_layout(index)?;
        let local_sum: f64 = self
            .patches
            .iter()
            .map(|patch| {
                let data = patch.data(index).expect("data is allocated on every local patch");
                patch
                    .cell_box
                    .iter()
                    .map(|cell| data.get(&cell, component))
                    .sum::<f64>()
            })
            .sum();
        Ok(self.comm.all_reduce_sum(local_sum))
    }
}
