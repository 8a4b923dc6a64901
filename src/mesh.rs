//! Structural meshes and their distribution over ranks.
use crate::allocators::DimAllocator;
use crate::comm::Communicator;
use crate::element::longest_edge_length;
use crate::error::Error;
use crate::geometry::BoundingBox;
use crate::partition::{DistributedVector, Partitioner};
use crate::scatter::Scatter;
use crate::SmallDim;
use nalgebra::{DefaultAllocator, OPoint, OVector};
use rustc_hash::FxHashMap;
use std::ops::Range;
use std::sync::Arc;

pub mod procedural;

pub use crate::element::ReferenceCell;

/// The vertices of a single cell together with its reference cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellConnectivity {
    kind: ReferenceCell,
    vertices: Vec<usize>,
}

impl CellConnectivity {
    /// # Panics
    ///
    /// Panics if the number of vertices does not match the reference cell.
    pub fn new(kind: ReferenceCell, vertices: Vec<usize>) -> Self {
        assert_eq!(vertices.len(), kind.num_vertices(), "vertex count must match the reference cell");
        Self { kind, vertices }
    }

    pub fn kind(&self) -> ReferenceCell {
        self.kind
    }

    pub fn vertex_indices(&self) -> &[usize] {
        &self.vertices
    }

    pub fn vertex_indices_mut(&mut self) -> &mut [usize] {
        &mut self.vertices
    }
}

/// A mesh of cells in `D` dimensions.
///
/// Cells are usually volumetric, but may also have lower dimension than the space they live
/// in, such as line segments in 2D. A mesh should not mix cells of different dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    vertices: Vec<OPoint<f64, D>>,
    connectivity: Vec<CellConnectivity>,
}

impl<D> Mesh<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// # Panics
    ///
    /// Panics if a cell has a higher dimension than `D`, or refers to a vertex out of bounds.
    pub fn from_vertices_and_cells(vertices: Vec<OPoint<f64, D>>, connectivity: Vec<CellConnectivity>) -> Self {
        for cell in &connectivity {
            assert!(cell.kind.dim() <= D::dim(), "cells must not exceed the spatial dimension");
            assert!(
                cell.vertices.iter().all(|&v| v < vertices.len()),
                "vertex index out of bounds"
            );
        }
        Self { vertices, connectivity }
    }

    /// Creates a mesh, deducing the reference cell of each cell from its number of vertices.
    ///
    /// Cells with two vertices are line segments, all other cells are volumetric.
    pub fn try_from_vertices_and_connectivity(
        vertices: Vec<OPoint<f64, D>>,
        connectivity: Vec<Vec<usize>>,
    ) -> Result<Self, Error> {
        let cells = connectivity
            .into_iter()
            .map(|cell_vertices| {
                let kind = ReferenceCell::from_num_vertices(D::dim(), cell_vertices.len())
                    .or_else(|| ReferenceCell::from_num_vertices(1, cell_vertices.len()));
                let kind = kind.ok_or_else(|| {
                    Error::InvalidParameter {
                        name: "connectivity",
                        reason: format!(
                            "no {}-dimensional reference cell has {} vertices",
                            D::dim(),
                            cell_vertices.len()
                        ),
                    }
                })?;
                if let Some(&v) = cell_vertices.iter().find(|&&v| v >= vertices.len()) {
                    return Err(Error::InvalidParameter {
                        name: "connectivity",
                        reason: format!("vertex index {} out of bounds", v),
                    });
                }
                Ok(CellConnectivity::new(kind, cell_vertices))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            vertices,
            connectivity: cells,
        })
    }

    pub fn vertices(&self) -> &[OPoint<f64, D>] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[CellConnectivity] {
        &self.connectivity
    }

    pub fn num_cells(&self) -> usize {
        self.connectivity.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// The distinct reference cells present in the mesh, in sorted order.
    pub fn reference_cells(&self) -> Vec<ReferenceCell> {
        let mut kinds: Vec<_> = self.connectivity.iter().map(CellConnectivity::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        kinds
    }

    /// The vertices of the given cell.
    pub fn cell_vertices(&self, cell_index: usize) -> impl '_ + Iterator<Item = &OPoint<f64, D>> {
        self.connectivity[cell_index]
            .vertex_indices()
            .iter()
            .map(move |&v| &self.vertices[v])
    }

    pub fn transform_vertices<F>(&mut self, mut transformation: F)
    where
        F: FnMut(&mut OPoint<f64, D>),
    {
        for vertex in &mut self.vertices {
            transformation(vertex);
        }
    }

    pub fn translate(&mut self, translation: &OVector<f64, D>) {
        self.transform_vertices(|v| *v += translation);
    }

    /// Returns a new mesh in which only the given cells are kept, with vertices relabeled in
    /// increasing order of their original index.
    ///
    /// The second return value maps the vertices of the new mesh to the vertices of `self`.
    pub fn keep_cells(&self, cell_indices: &[usize]) -> (Self, Vec<usize>) {
        let mut keep_vertex = vec![false; self.vertices.len()];
        for &cell_index in cell_indices {
            for &v in self.connectivity[cell_index].vertex_indices() {
                keep_vertex[v] = true;
            }
        }

        let kept_vertices: Vec<usize> = keep_vertex
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        let new_label: FxHashMap<usize, usize> = kept_vertices
            .iter()
            .enumerate()
            .map(|(new, &old)| (old, new))
            .collect();

        let connectivity = cell_indices
            .iter()
            .map(|&i| {
                let mut cell = self.connectivity[i].clone();
                for index in cell.vertex_indices_mut() {
                    *index = new_label[&*index];
                }
                cell
            })
            .collect();
        let vertices = kept_vertices
            .iter()
            .map(|&v| self.vertices[v].clone())
            .collect();

        (Self { vertices, connectivity }, kept_vertices)
    }
}

/// A mesh replicated on every rank, with contiguous ownership of cells and nodes.
///
/// Each rank is responsible for computing quantities of the cells and nodes it owns; every
/// rank can still read the full connectivity and reference geometry.
#[derive(Debug, Clone)]
pub struct PartitionedMesh<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    mesh: Mesh<D>,
    rank: usize,
    cell_partitioner: Partitioner,
    node_partitioner: Partitioner,
}

impl<D> PartitionedMesh<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// Distributes cells and nodes uniformly over the ranks of `comm`.
    pub fn new(comm: &dyn Communicator, mesh: Mesh<D>) -> Self {
        let cell_partitioner = Partitioner::uniform(mesh.num_cells(), comm.size());
        let node_partitioner = Partitioner::uniform(mesh.num_vertices(), comm.size());
        Self {
            mesh,
            rank: comm.rank(),
            cell_partitioner,
            node_partitioner,
        }
    }

    /// # Panics
    ///
    /// Panics if the partitioners do not cover the cells and nodes of the mesh.
    pub fn with_partitioners(
        mesh: Mesh<D>,
        rank: usize,
        cell_partitioner: Partitioner,
        node_partitioner: Partitioner,
    ) -> Self {
        assert_eq!(cell_partitioner.global_size(), mesh.num_cells());
        assert_eq!(node_partitioner.global_size(), mesh.num_vertices());
        Self {
            mesh,
            rank,
            cell_partitioner,
            node_partitioner,
        }
    }

    pub fn mesh(&self) -> &Mesh<D> {
        &self.mesh
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn cell_partitioner(&self) -> &Partitioner {
        &self.cell_partitioner
    }

    pub fn node_partitioner(&self) -> &Partitioner {
        &self.node_partitioner
    }

    pub fn locally_owned_cells(&self) -> Range<usize> {
        self.cell_partitioner.owned_range(self.rank)
    }

    pub fn locally_owned_nodes(&self) -> Range<usize> {
        self.node_partitioner.owned_range(self.rank)
    }

    /// Nodes that are either owned or belong to an owned cell, in increasing order.
    pub fn locally_relevant_nodes(&self) -> Vec<usize> {
        let mut nodes: Vec<usize> = self.locally_owned_nodes().collect();
        for cell in self.locally_owned_cells() {
            nodes.extend_from_slice(self.mesh.connectivity()[cell].vertex_indices());
        }
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// The distributed vector of reference vertex coordinates laid out by `dof_handler`.
    ///
    /// # Panics
    ///
    /// Panics if the DoF handler does not have `D` components.
    pub fn reference_positions(&self, dof_handler: &DofHandler) -> DistributedVector {
        assert_eq!(dof_handler.n_components(), D::dim(), "positions need D components");
        let nc = dof_handler.n_components();
        let vertices = self.mesh.vertices();
        DistributedVector::from_global_fn(dof_handler.partitioner().clone(), self.rank, |dof| {
            vertices[dof / nc][dof % nc]
        })
    }
}

/// Node-first numbering of a vector-valued nodal field: `dof = node * n_components + component`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofHandler {
    n_components: usize,
    partitioner: Partitioner,
}

impl DofHandler {
    pub fn new<D>(mesh: &PartitionedMesh<D>, n_components: usize) -> Self
    where
        D: SmallDim,
        DefaultAllocator: DimAllocator<f64, D>,
    {
        assert!(n_components > 0, "number of components must be positive");
        Self {
            n_components,
            partitioner: mesh.node_partitioner().blocked(n_components),
        }
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn n_nodes(&self) -> usize {
        self.n_dofs() / self.n_components
    }

    pub fn n_dofs(&self) -> usize {
        self.partitioner.global_size()
    }

    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    pub fn dof(&self, node: usize, component: usize) -> usize {
        debug_assert!(component < self.n_components);
        node * self.n_components + component
    }

    pub fn node_dofs(&self, node: usize) -> Range<usize> {
        let first = self.dof(node, 0);
        first..first + self.n_components
    }

    /// DoFs of the given nodes, node by node.
    pub fn dofs_of_nodes<'a>(&'a self, nodes: &'a [usize]) -> impl 'a + Iterator<Item = usize> {
        nodes.iter().flat_map(move |&node| self.node_dofs(node))
    }
}

/// Current vertex coordinates of every locally owned cell. Collective.
///
/// Positions of nodes owned by other ranks are made available through a ghost scatter.
fn locally_owned_cell_positions<D>(
    comm: &Arc<dyn Communicator>,
    mesh: &PartitionedMesh<D>,
    position_dofs: &DofHandler,
    position: &DistributedVector,
) -> Vec<Vec<OPoint<f64, D>>>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    assert_eq!(position_dofs.n_components(), D::dim(), "positions need D components");
    let relevant_nodes = mesh.locally_relevant_nodes();
    let relevant_dofs: Vec<usize> = position_dofs.dofs_of_nodes(&relevant_nodes).collect();
    let scatter = Scatter::new(Arc::clone(comm), position_dofs.partitioner().clone(), &relevant_dofs);
    let mut ghosted = vec![0.0; relevant_dofs.len()];
    scatter.global_to_overlap(position, &mut ghosted);

    let d = D::dim();
    let point_of = |node: usize| {
        // relevant_nodes is sorted, so the lookup is a binary search
        let k = relevant_nodes
            .binary_search(&node)
            .expect("nodes of owned cells are locally relevant");
        OPoint::from(OVector::<f64, D>::from_fn(|i, _| ghosted[k * d + i]))
    };

    mesh.locally_owned_cells()
        .map(|cell| {
            mesh.mesh().connectivity()[cell]
                .vertex_indices()
                .iter()
                .map(|&node| point_of(node))
                .collect()
        })
        .collect()
}

/// Computes the reduced-precision bounding boxes of all cells in the current configuration
/// given by `position`, and gathers the global table on every rank. Collective.
///
/// Each rank computes the boxes of the cells it owns. The boxes are rounded outward, so each
/// box contains its cell.
pub fn collect_cell_bounding_boxes<D>(
    comm: &Arc<dyn Communicator>,
    mesh: &PartitionedMesh<D>,
    position_dofs: &DofHandler,
    position: &DistributedVector,
) -> Vec<BoundingBox<f32, D>>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let d = D::dim();
    let owned_boxes: Vec<f32> = locally_owned_cell_positions(comm, mesh, position_dofs, position)
        .iter()
        .flat_map(|points| {
            let bounding_box = BoundingBox::from_points(points)
                .expect("cells have vertices")
                .to_f32_outward();
            bounding_box
                .min()
                .iter()
                .chain(bounding_box.max().iter())
                .copied()
                .collect::<Vec<_>>()
        })
        .collect();

    // Boxes are sent as flat coordinate lists, min corner first
    comm.all_gather(owned_boxes)
        .concat()
        .chunks_exact(2 * d)
        .map(|coords| {
            let min = OVector::<f32, D>::from_fn(|i, _| coords[i]);
            let max = OVector::<f32, D>::from_fn(|i, _| coords[d + i]);
            BoundingBox::new(min, max)
        })
        .collect()
}

/// Computes the longest edge length of all cells in the current configuration and gathers the
/// global table on every rank. Collective.
pub fn collect_cell_lengths<D>(
    comm: &Arc<dyn Communicator>,
    mesh: &PartitionedMesh<D>,
    position_dofs: &DofHandler,
    position: &DistributedVector,
) -> Vec<f64>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let owned_cells = mesh.locally_owned_cells();
    let owned_lengths: Vec<f64> = locally_owned_cell_positions(comm, mesh, position_dofs, position)
        .iter()
        .zip(owned_cells)
        .map(|(points, cell)| longest_edge_length(mesh.mesh().connectivity()[cell].kind(), points))
        .collect();
    comm.all_gather(owned_lengths).concat()
}
