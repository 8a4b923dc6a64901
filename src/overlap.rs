//! Process-local copies of the part of a structural mesh that overlaps the grid.
use crate::allocators::DimAllocator;
use crate::comm::Communicator;
use crate::error::Error;
use crate::geometry::{BoundingBox, BoxIndex};
use crate::mesh::{collect_cell_bounding_boxes, DofHandler, Mesh, PartitionedMesh};
use crate::partition::DistributedVector;
use crate::SmallDim;
use log::debug;
use nalgebra::DefaultAllocator;
use std::sync::Arc;

/// The cells of a structural mesh that intersect the grid region owned by this process.
///
/// Cells and vertices are relabeled contiguously; each keeps a reference to its index in the
/// full mesh. Vertex `k` of the overlap mesh is the node `global_node_indices()[k]`, and its
/// entries in an overlap vector with `n` components are `n * k .. n * (k + 1)`.
#[derive(Debug, Clone)]
pub struct OverlapMesh<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    mesh: Mesh<D>,
    global_cells: Vec<usize>,
    global_nodes: Vec<usize>,
}

impl<D> OverlapMesh<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// An overlap mesh without cells.
    pub fn empty() -> Self {
        Self {
            mesh: Mesh::from_vertices_and_cells(Vec::new(), Vec::new()),
            global_cells: Vec::new(),
            global_nodes: Vec::new(),
        }
    }

    pub fn mesh(&self) -> &Mesh<D> {
        &self.mesh
    }

    pub fn num_cells(&self) -> usize {
        self.global_cells.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.global_nodes.len()
    }

    /// Index of each overlap cell in the full mesh.
    pub fn global_cell_indices(&self) -> &[usize] {
        &self.global_cells
    }

    /// Index of each overlap vertex in the full mesh.
    pub fn global_node_indices(&self) -> &[usize] {
        &self.global_nodes
    }

    /// The global DoFs of the overlap nodes, in overlap order.
    pub fn overlap_dofs(&self, dof_handler: &DofHandler) -> Vec<usize> {
        dof_handler.dofs_of_nodes(&self.global_nodes).collect()
    }
}

/// Builds overlap meshes from the replicated table of cell bounding boxes.
///
/// The table holds one reduced-precision box per cell of the full mesh, in the current
/// configuration. It is the only data that is communicated: once it is available, deciding
/// which cells a process needs is a local geometric test.
#[derive(Debug, Clone)]
pub struct OverlapMeshBuilder<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    cell_boxes: Vec<BoundingBox<f32, D>>,
    index: BoxIndex<D>,
}

impl<D> OverlapMeshBuilder<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// Gathers the bounding boxes of all cells in the configuration given by `position`.
    /// Collective.
    pub fn new(
        comm: &Arc<dyn Communicator>,
        mesh: &PartitionedMesh<D>,
        position_dofs: &DofHandler,
        position: &DistributedVector,
    ) -> Self {
        Self::from_cell_bounding_boxes(collect_cell_bounding_boxes(comm, mesh, position_dofs, position))
    }

    pub fn from_cell_bounding_boxes(cell_boxes: Vec<BoundingBox<f32, D>>) -> Self {
        let index = BoxIndex::from_boxes(cell_boxes.iter().map(BoundingBox::to_f64));
        Self { cell_boxes, index }
    }

    /// Bounding boxes of all cells of the full mesh.
    pub fn cell_bounding_boxes(&self) -> &[BoundingBox<f32, D>] {
        &self.cell_boxes
    }

    /// Indices of the cells whose boxes intersect at least one of the regions, in increasing
    /// order.
    pub fn intersecting_cells(&self, regions: &[BoundingBox<f64, D>]) -> Vec<usize> {
        let mut cells: Vec<usize> = regions
            .iter()
            .flat_map(|region| self.index.intersecting(region))
            .collect();
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    /// Builds the overlap mesh of the cells that intersect the given regions, typically the
    /// (slightly enlarged) bounding boxes of the patches owned by this process.
    ///
    /// Fails if the mesh has no cells or contains more than one kind of reference cell.
    pub fn build(&self, mesh: &PartitionedMesh<D>, regions: &[BoundingBox<f64, D>]) -> Result<OverlapMesh<D>, Error> {
        let full_mesh = mesh.mesh();
        if full_mesh.num_cells() == 0 {
            return Err(Error::EmptyMesh);
        }
        let reference_cells = full_mesh.reference_cells();
        if reference_cells.len() > 1 {
            return Err(Error::MixedReferenceCells(reference_cells));
        }
        if self.cell_boxes.len() != full_mesh.num_cells() {
            return Err(Error::SizeMismatch {
                what: "cell bounding box table",
                expected: full_mesh.num_cells(),
                actual: self.cell_boxes.len(),
            });
        }

        let global_cells = self.intersecting_cells(regions);
        let (overlap_mesh, global_nodes) = full_mesh.keep_cells(&global_cells);
        debug!(
            "rank {}: overlap mesh has {} of {} cells and {} of {} nodes",
            mesh.rank(),
            global_cells.len(),
            full_mesh.num_cells(),
            global_nodes.len(),
            full_mesh.num_vertices()
        );
        Ok(OverlapMesh {
            mesh: overlap_mesh,
            global_cells,
            global_nodes,
        })
    }
}
