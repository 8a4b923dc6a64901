//! Interaction engines and the three-phase transaction protocol.
//!
//! An engine couples one structural part to one patch level. Every operation is split into
//! `start`, `intermediate` and `finish`:
//!
//! - `start` validates the arguments and starts sending the structural vectors the operation
//!   reads to the overlap partitioning.
//! - `intermediate` waits for those vectors, runs the numerical kernel on the overlap mesh and,
//!   for projections, starts sending the result back to the structural partitioning.
//! - `finish` waits for the result to arrive.
//!
//! A driver with several parts calls `start` for all of them, then `intermediate`, then
//! `finish`, so that the communication of one part is hidden behind the work on the others.
use crate::allocators::DimAllocator;
use crate::comm::Communicator;
use crate::error::Error;
use crate::geometry::BoundingBox;
use crate::grid::{DataIndex, PatchLevel};
use crate::kernel::KernelKind;
use crate::mesh::{DofHandler, PartitionedMesh};
use crate::overlap::{OverlapMesh, OverlapMeshBuilder};
use crate::partition::{DistributedVector, Partitioner};
use crate::scatter::{Scatter, VectorOperation};
use crate::SmallDim;
use log::debug;
use nalgebra::DefaultAllocator;
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub mod elemental;
pub mod nodal;
mod transaction;
pub mod utilities;

pub use elemental::ElementalInteraction;
pub use nodal::NodalInteraction;
pub use transaction::{Operation, Transaction, TransactionState};

use transaction::Payload;

/// State shared by all engines: the overlap mesh and the scatters between the structural
/// partitioning and the overlap partitioning.
pub struct InteractionBase<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    comm: Arc<dyn Communicator>,
    builder: OverlapMeshBuilder<D>,
    overlap_mesh: OverlapMesh<D>,
    node_partitioner: Option<Partitioner>,
    /// Scatters of the overlap nodes, by number of components.
    scatters: FxHashMap<usize, Scatter>,
    eulerian_length: f64,
}

impl<D> std::fmt::Debug for InteractionBase<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut components: Vec<_> = self.scatters.keys().collect();
        components.sort_unstable();
        f.debug_struct("InteractionBase")
            .field("rank", &self.comm.rank())
            .field("overlap_cells", &self.overlap_mesh.num_cells())
            .field("overlap_nodes", &self.overlap_mesh.num_nodes())
            .field("registered_components", &components)
            .field("eulerian_length", &self.eulerian_length)
            .finish()
    }
}

impl<D> InteractionBase<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// An uninitialized base. [`reinit`](Self::reinit) must be called before use.
    pub fn new(comm: Arc<dyn Communicator>) -> Self {
        Self {
            comm,
            builder: OverlapMeshBuilder::from_cell_bounding_boxes(Vec::new()),
            overlap_mesh: OverlapMesh::empty(),
            node_partitioner: None,
            scatters: FxHashMap::default(),
            eulerian_length: f64::MAX,
        }
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn overlap_mesh(&self) -> &OverlapMesh<D> {
        &self.overlap_mesh
    }

    /// The builder holding the replicated cell bounding box table of the last reinit.
    pub fn overlap_mesh_builder(&self) -> &OverlapMeshBuilder<D> {
        &self.builder
    }

    /// The smallest grid spacing of the patch level at the last reinit.
    pub fn eulerian_length(&self) -> f64 {
        self.eulerian_length
    }

    /// Rebuilds the overlap mesh for the given structure configuration and patch level, and
    /// registers the position DoF layout. Previously registered layouts are dropped.
    /// Collective.
    pub fn reinit(
        &mut self,
        mesh: &PartitionedMesh<D>,
        position_dofs: &DofHandler,
        position: &DistributedVector,
        level: &PatchLevel<D>,
    ) -> Result<(), Error> {
        // Errors below depend only on replicated data, so all ranks agree on them before any
        // collective is entered
        if mesh.mesh().num_cells() == 0 {
            return Err(Error::EmptyMesh);
        }
        let reference_cells = mesh.mesh().reference_cells();
        if reference_cells.len() > 1 {
            return Err(Error::MixedReferenceCells(reference_cells));
        }
        if position_dofs.n_components() != D::dim() {
            return Err(Error::SizeMismatch {
                what: "position components",
                expected: D::dim(),
                actual: position_dofs.n_components(),
            });
        }
        check_vector("position vector", position_dofs.partitioner(), position)?;

        let builder = OverlapMeshBuilder::new(&self.comm, mesh, position_dofs, position);
        let regions = patch_regions(level);
        self.overlap_mesh = builder.build(mesh, &regions)?;
        self.builder = builder;
        self.node_partitioner = Some(mesh.node_partitioner().clone());
        self.scatters.clear();
        self.add_dof_handler(position_dofs)?;
        self.eulerian_length = utilities::eulerian_length(level);
        debug!(
            "rank {}: interaction reinitialized with eulerian length {:e}",
            self.comm.rank(),
            self.eulerian_length
        );
        Ok(())
    }

    /// Registers a DoF layout so that vectors with its number of components can be moved to and
    /// from the overlap partitioning. Collective.
    pub fn add_dof_handler(&mut self, dof_handler: &DofHandler) -> Result<(), Error> {
        let node_partitioner = self
            .node_partitioner
            .as_ref()
            .ok_or(Error::UnregisteredDofHandler {
                n_components: dof_handler.n_components(),
            })?;
        let nc = dof_handler.n_components();
        let expected = node_partitioner.blocked(nc);
        if dof_handler.partitioner() != &expected {
            return Err(Error::SizeMismatch {
                what: "DoF handler",
                expected: expected.global_size(),
                actual: dof_handler.n_dofs(),
            });
        }
        if !self.scatters.contains_key(&nc) {
            let overlap_dofs = self.overlap_mesh.overlap_dofs(dof_handler);
            let scatter = Scatter::new(Arc::clone(&self.comm), expected, &overlap_dofs);
            self.scatters.insert(nc, scatter);
        }
        Ok(())
    }

    /// The scatter for vectors with `n_components` components per node.
    pub fn scatter(&self, n_components: usize) -> Result<&Scatter, Error> {
        self.scatters
            .get(&n_components)
            .ok_or(Error::UnregisteredDofHandler { n_components })
    }

    /// Moves the position vector to the overlap partitioning. Collective.
    pub fn overlap_positions(&self, position: &DistributedVector) -> Result<Vec<f64>, Error> {
        let scatter = self.scatter(D::dim())?;
        check_vector("position vector", scatter.partitioner(), position)?;
        let mut overlap_position = vec![0.0; scatter.overlap_size()];
        scatter.global_to_overlap(position, &mut overlap_position);
        Ok(overlap_position)
    }
}

/// The bounding boxes of the local patches, enlarged by one grid cell.
fn patch_regions<D>(level: &PatchLevel<D>) -> Vec<BoundingBox<f64, D>>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let tolerance = patch_tolerance(level);
    level
        .patches()
        .iter()
        .map(|patch| patch.bounding_box().grow_uniformly(tolerance))
        .collect()
}

/// The distance by which patches are enlarged when associating structure with them.
pub(crate) fn patch_tolerance<D>(level: &PatchLevel<D>) -> f64
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    level.geometry().dx().max()
}

fn check_vector(what: &'static str, partitioner: &Partitioner, vector: &DistributedVector) -> Result<(), Error> {
    if vector.partitioner() != partitioner {
        return Err(Error::SizeMismatch {
            what,
            expected: partitioner.global_size(),
            actual: vector.global_size(),
        });
    }
    Ok(())
}

/// Checks that the grid quantity has the given depth and, if a kernel is given, enough ghost
/// cells for it.
fn check_grid_data<D>(
    level: &PatchLevel<D>,
    data_index: DataIndex,
    depth: usize,
    kernel: Option<KernelKind>,
) -> Result<(), Error>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let (actual_depth, ghost_width) = level.data_layout(data_index)?;
    if actual_depth != depth {
        return Err(Error::SizeMismatch {
            what: "grid data depth",
            expected: depth,
            actual: actual_depth,
        });
    }
    if let Some(kernel) = kernel {
        if ghost_width < kernel.min_ghost_width() {
            return Err(Error::InsufficientGhostWidth {
                kernel,
                required: kernel.min_ghost_width(),
                available: ghost_width,
            });
        }
    }
    Ok(())
}

/// An interaction engine coupling a structural part to a patch level.
///
/// Implementors provide the numerical kernels on the overlap mesh; the transaction protocol is
/// provided on top of them.
pub trait Interaction<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn base(&self) -> &InteractionBase<D>;

    fn base_mut(&mut self) -> &mut InteractionBase<D>;

    /// Rebuilds all data that depends on the structure configuration or the patch level.
    /// Collective.
    ///
    /// Must be called whenever the patch level changes or the structure has moved
    /// significantly since the last call.
    fn reinit(
        &mut self,
        mesh: &PartitionedMesh<D>,
        position_dofs: &DofHandler,
        position: &DistributedVector,
        level: &PatchLevel<D>,
    ) -> Result<(), Error>;

    /// Whether the result of a projection is the interpolated field itself, rather than the
    /// right-hand side of an L2 projection that still needs a mass matrix solve.
    fn projection_is_interpolation(&self) -> bool;

    /// The combine operation callers should pass to the projection of this engine.
    fn rhs_scatter_operation(&self) -> VectorOperation {
        VectorOperation::Add
    }

    /// Accumulates the projection of `data_index` into `output`, an overlap vector with
    /// `n_components` components.
    fn project_overlap(
        &self,
        kernel: KernelKind,
        data_index: DataIndex,
        level: &PatchLevel<D>,
        overlap_position: &[f64],
        n_components: usize,
        output: &mut [f64],
    );

    /// Spreads the overlap vector `values` with `n_components` components onto `data_index`.
    fn spread_overlap(
        &self,
        kernel: KernelKind,
        data_index: DataIndex,
        level: &mut PatchLevel<D>,
        overlap_position: &[f64],
        n_components: usize,
        values: &[f64],
    );

    /// Adds the number of structure points in each grid cell to component 0 of `data_index`.
    fn workload_overlap(&self, data_index: DataIndex, level: &mut PatchLevel<D>, overlap_position: &[f64]);

    /// Registers a DoF layout for use in projections and spreading. Collective.
    fn add_dof_handler(&mut self, dof_handler: &DofHandler) -> Result<(), Error> {
        self.base_mut().add_dof_handler(dof_handler)
    }

    /// Returns the error that [`compute_projection_rhs_start`](Self::compute_projection_rhs_start)
    /// would return for these arguments, without communicating.
    fn check_projection_arguments(
        &self,
        kernel: KernelKind,
        data_index: DataIndex,
        level: &PatchLevel<D>,
        dof_handler: &DofHandler,
        position: &DistributedVector,
        output: &DistributedVector,
    ) -> Result<(), Error> {
        let base = self.base();
        let nc = dof_handler.n_components();
        check_grid_data(level, data_index, nc, Some(kernel))?;
        check_vector("position vector", base.scatter(D::dim())?.partitioner(), position)?;
        check_vector("projection output", base.scatter(nc)?.partitioner(), output)
    }

    /// Returns the error that [`compute_spread_start`](Self::compute_spread_start) would return
    /// for these arguments, without communicating.
    fn check_spread_arguments(
        &self,
        kernel: KernelKind,
        data_index: DataIndex,
        level: &PatchLevel<D>,
        dof_handler: &DofHandler,
        position: &DistributedVector,
        field: &DistributedVector,
    ) -> Result<(), Error> {
        let base = self.base();
        let nc = dof_handler.n_components();
        check_grid_data(level, data_index, nc, Some(kernel))?;
        check_vector("position vector", base.scatter(D::dim())?.partitioner(), position)?;
        check_vector("spread field", base.scatter(nc)?.partitioner(), field)
    }

    /// Returns the error that [`add_workload_start`](Self::add_workload_start) would return for
    /// these arguments, without communicating.
    fn check_workload_arguments(
        &self,
        data_index: DataIndex,
        level: &PatchLevel<D>,
        position: &DistributedVector,
    ) -> Result<(), Error> {
        level.data_layout(data_index)?;
        check_vector("position vector", self.base().scatter(D::dim())?.partitioner(), position)
    }

    /// Starts projecting the grid quantity `data_index` onto the structural field laid out by
    /// `dof_handler`, in the configuration given by `position`.
    ///
    /// `output` is zeroed here and receives the result in
    /// [`compute_projection_rhs_finish`](Self::compute_projection_rhs_finish). Overlap
    /// contributions are combined into `output` with `operation`; since each point is handled
    /// by exactly one process while several processes hold a copy of every shared node,
    /// [`VectorOperation::Add`] is required for a correct result.
    fn compute_projection_rhs_start<'a>(
        &'a self,
        kernel: KernelKind,
        data_index: DataIndex,
        level: &PatchLevel<D>,
        dof_handler: &DofHandler,
        position: &DistributedVector,
        output: &'a mut DistributedVector,
        operation: VectorOperation,
    ) -> Result<Transaction<'a, D>, Error> {
        self.check_projection_arguments(kernel, data_index, level, dof_handler, position, output)?;
        let base = self.base();
        let nc = dof_handler.n_components();
        let position_scatter = base.scatter(D::dim())?;

        output.fill(0.0);
        let payload = Payload::Interpolation {
            output,
            operation,
            rhs_request: None,
        };
        let mut transaction = Transaction::new(base, Some(kernel), data_index, nc, payload);
        transaction.position_request = Some(position_scatter.global_to_overlap_start(position));
        transaction.state = TransactionState::Intermediate;
        Ok(transaction)
    }

    /// Computes the projection on the overlap mesh and starts sending it to the owners.
    ///
    /// # Panics
    ///
    /// Panics if the transaction is not a projection of this engine in state
    /// [`TransactionState::Intermediate`].
    fn compute_projection_rhs_intermediate(&self, transaction: &mut Transaction<'_, D>, level: &PatchLevel<D>) {
        let base = self.base();
        transaction.check(base, Operation::Interpolation, TransactionState::Intermediate);
        let overlap_position = finish_position_scatter(base, transaction);
        let nc = transaction.n_components;
        let scatter = base.scatter(nc).expect("layout was checked at start");
        let mut rhs = vec![0.0; scatter.overlap_size()];
        let kernel = transaction.kernel.expect("projections have a kernel");
        self.project_overlap(kernel, transaction.data_index, level, &overlap_position, nc, &mut rhs);
        transaction.overlap_position = overlap_position;

        if let Payload::Interpolation {
            operation, rhs_request, ..
        } = &mut transaction.payload
        {
            *rhs_request = Some(scatter.overlap_to_global_start(&rhs, *operation));
        }
        transaction.overlap_values = rhs;
        transaction.state = TransactionState::Finish;
    }

    /// Waits for the projection to arrive in the output vector given at start.
    ///
    /// # Panics
    ///
    /// Panics if the transaction is not a projection of this engine in state
    /// [`TransactionState::Finish`].
    fn compute_projection_rhs_finish(&self, transaction: Transaction<'_, D>) {
        let base = self.base();
        transaction.check(base, Operation::Interpolation, TransactionState::Finish);
        let scatter = base
            .scatter(transaction.n_components)
            .expect("layout was checked at start");
        if let Payload::Interpolation {
            output, rhs_request, ..
        } = transaction.payload
        {
            let request = rhs_request.expect("intermediate starts the result scatter");
            scatter.overlap_to_global_finish(request, output);
        }
    }

    /// Starts spreading the structural field `field`, laid out by `dof_handler`, onto the grid
    /// quantity `data_index`, in the configuration given by `position`.
    ///
    /// Values are added to the grid data, including ghost cells; the caller is responsible for
    /// accumulating ghost values afterwards.
    fn compute_spread_start<'a>(
        &'a self,
        kernel: KernelKind,
        data_index: DataIndex,
        level: &PatchLevel<D>,
        dof_handler: &DofHandler,
        position: &DistributedVector,
        field: &DistributedVector,
    ) -> Result<Transaction<'a, D>, Error> {
        self.check_spread_arguments(kernel, data_index, level, dof_handler, position, field)?;
        let base = self.base();
        let nc = dof_handler.n_components();
        let position_scatter = base.scatter(D::dim())?;
        let scatter = base.scatter(nc)?;

        let payload = Payload::Spreading {
            field_request: Some(scatter.global_to_overlap_start(field)),
        };
        let mut transaction = Transaction::new(base, Some(kernel), data_index, nc, payload);
        transaction.position_request = Some(position_scatter.global_to_overlap_start(position));
        transaction.state = TransactionState::Intermediate;
        Ok(transaction)
    }

    /// Spreads the field onto the local patches.
    ///
    /// # Panics
    ///
    /// Panics if the transaction is not a spreading of this engine in state
    /// [`TransactionState::Intermediate`].
    fn compute_spread_intermediate(&self, transaction: &mut Transaction<'_, D>, level: &mut PatchLevel<D>) {
        let base = self.base();
        transaction.check(base, Operation::Spreading, TransactionState::Intermediate);
        let nc = transaction.n_components;
        let scatter = base.scatter(nc).expect("layout was checked at start");
        let mut values = vec![0.0; scatter.overlap_size()];
        if let Payload::Spreading { field_request } = &mut transaction.payload {
            let request = field_request.take().expect("start begins the field scatter");
            scatter.global_to_overlap_finish(request, &mut values);
        }
        let overlap_position = finish_position_scatter(base, transaction);
        let kernel = transaction.kernel.expect("spreading has a kernel");
        self.spread_overlap(kernel, transaction.data_index, level, &overlap_position, nc, &values);
        transaction.overlap_position = overlap_position;
        transaction.overlap_values = values;
        transaction.state = TransactionState::Finish;
    }

    /// Completes the spreading. Spreading has no structural result, so nothing is awaited.
    ///
    /// # Panics
    ///
    /// Panics if the transaction is not a spreading of this engine in state
    /// [`TransactionState::Finish`].
    fn compute_spread_finish(&self, transaction: Transaction<'_, D>) {
        transaction.check(self.base(), Operation::Spreading, TransactionState::Finish);
    }

    /// Starts counting the structure points in each grid cell into component 0 of
    /// `data_index`.
    fn add_workload_start<'a>(
        &'a self,
        data_index: DataIndex,
        level: &PatchLevel<D>,
        position: &DistributedVector,
    ) -> Result<Transaction<'a, D>, Error> {
        self.check_workload_arguments(data_index, level, position)?;
        let base = self.base();
        let position_scatter = base.scatter(D::dim())?;
        let mut transaction = Transaction::new(base, None, data_index, 1, Payload::Workload);
        transaction.position_request = Some(position_scatter.global_to_overlap_start(position));
        transaction.state = TransactionState::Intermediate;
        Ok(transaction)
    }

    /// Adds the point counts of the local patches.
    ///
    /// # Panics
    ///
    /// Panics if the transaction is not a workload transaction of this engine in state
    /// [`TransactionState::Intermediate`].
    fn add_workload_intermediate(&self, transaction: &mut Transaction<'_, D>, level: &mut PatchLevel<D>) {
        let base = self.base();
        transaction.check(base, Operation::Workload, TransactionState::Intermediate);
        let overlap_position = finish_position_scatter(base, transaction);
        self.workload_overlap(transaction.data_index, level, &overlap_position);
        transaction.overlap_position = overlap_position;
        transaction.state = TransactionState::Finish;
    }

    /// # Panics
    ///
    /// Panics if the transaction is not a workload transaction of this engine in state
    /// [`TransactionState::Finish`].
    fn add_workload_finish(&self, transaction: Transaction<'_, D>) {
        transaction.check(self.base(), Operation::Workload, TransactionState::Finish);
    }
}

fn finish_position_scatter<D>(base: &InteractionBase<D>, transaction: &mut Transaction<'_, D>) -> Vec<f64>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let scatter = base.scatter(D::dim()).expect("position layout is always registered");
    let request = transaction
        .position_request
        .take()
        .expect("start begins the position scatter");
    let mut overlap_position = vec![0.0; scatter.overlap_size()];
    scatter.global_to_overlap_finish(request, &mut overlap_position);
    overlap_position
}
