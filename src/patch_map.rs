//! Association of grid patches with the structural cells and points that intersect them.
//!
//! A structural cell can straddle several patches, in which case it appears in the list of
//! each of them. The kernels then attribute every quadrature point (or node) to the single
//! patch whose half-open interior contains its current location, so that every point
//! contributes exactly once.
use crate::allocators::DimAllocator;
use crate::geometry::{BoundingBox, BoxIndex};
use crate::grid::Patch;
use crate::overlap::OverlapMesh;
use crate::SmallDim;
use nalgebra::{DefaultAllocator, OPoint, OVector};

/// For each local patch, the overlap cells whose bounding box intersects the patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchMap {
    patch_cells: Vec<Vec<usize>>,
}

impl PatchMap {
    /// Builds the map from the patches owned by this process.
    ///
    /// `cell_boxes` holds the boxes of all cells of the full mesh and `tolerance` enlarges the
    /// patches before testing, which lets the map stay valid under small displacements.
    pub fn new<D>(
        patches: &[Patch<D>],
        overlap_mesh: &OverlapMesh<D>,
        cell_boxes: &[BoundingBox<f32, D>],
        tolerance: f64,
    ) -> Self
    where
        D: SmallDim,
        DefaultAllocator: DimAllocator<f64, D>,
    {
        let index = BoxIndex::from_boxes(
            overlap_mesh
                .global_cell_indices()
                .iter()
                .map(|&cell| cell_boxes[cell].to_f64()),
        );
        let patch_cells = patches
            .iter()
            .map(|patch| index.intersecting(&patch.bounding_box().grow_uniformly(tolerance)))
            .collect();
        Self { patch_cells }
    }

    pub fn from_patch_cells(patch_cells: Vec<Vec<usize>>) -> Self {
        Self { patch_cells }
    }

    pub fn num_patches(&self) -> usize {
        self.patch_cells.len()
    }

    /// Overlap cells associated with the local patch with the given (local) index.
    pub fn patch_cells(&self, local_patch: usize) -> &[usize] {
        &self.patch_cells[local_patch]
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = &[usize]> {
        self.patch_cells.iter().map(Vec::as_slice)
    }

    /// All cells that appear in any list, without duplicates and in increasing order.
    pub fn cells(&self) -> Vec<usize> {
        let mut cells: Vec<usize> = self.patch_cells.iter().flatten().copied().collect();
        cells.sort_unstable();
        cells.dedup();
        cells
    }
}

/// For each local patch, the overlap nodes located inside the (enlarged) patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodalPatchMap {
    patch_nodes: Vec<Vec<usize>>,
}

impl NodalPatchMap {
    /// Builds the map from the positions of the overlap nodes, stored point by point.
    pub fn new<D>(patches: &[Patch<D>], overlap_positions: &[f64], tolerance: f64) -> Self
    where
        D: SmallDim,
        DefaultAllocator: DimAllocator<f64, D>,
    {
        let d = D::dim();
        let points: Vec<OPoint<f64, D>> = overlap_positions
            .chunks_exact(d)
            .map(|x| OPoint::from(OVector::<f64, D>::from_column_slice(x)))
            .collect();
        let patch_nodes = patches
            .iter()
            .map(|patch| {
                let region = patch.bounding_box().grow_uniformly(tolerance);
                points
                    .iter()
                    .enumerate()
                    .filter(|(_, x)| region.contains_point(x))
                    .map(|(node, _)| node)
                    .collect()
            })
            .collect();
        Self { patch_nodes }
    }

    pub fn num_patches(&self) -> usize {
        self.patch_nodes.len()
    }

    pub fn patch_nodes(&self, local_patch: usize) -> &[usize] {
        &self.patch_nodes[local_patch]
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = &[usize]> {
        self.patch_nodes.iter().map(Vec::as_slice)
    }
}
