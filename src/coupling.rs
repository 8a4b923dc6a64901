//! Coupling of several structural parts to a patch level.
//!
//! [`ImmersedCoupling`] drives the interaction engines of all parts through the transaction
//! protocol phase by phase, so that the communication of each part overlaps with the
//! computation of the others.
use crate::allocators::{DimAllocator, EmbeddingAllocator};
use crate::comm::Communicator;
use crate::config::InteractionParameters;
use crate::grid::{DataIndex, PatchLevel};
use crate::interaction::Interaction;
use crate::kernel::KernelKind;
use crate::mesh::{collect_cell_bounding_boxes, DofHandler, PartitionedMesh, ReferenceCell};
use crate::partition::DistributedVector;
use crate::SmallDim;
use eyre::{eyre, WrapErr};
use log::debug;
use nalgebra::DefaultAllocator;
use std::sync::Arc;

/// A structural part: a distributed mesh together with its current configuration.
#[derive(Debug, Clone)]
pub struct Part<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    mesh: PartitionedMesh<D>,
    dof_handler: DofHandler,
    position: DistributedVector,
}

impl<D> Part<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// A part in its reference configuration.
    pub fn new(mesh: PartitionedMesh<D>) -> Self {
        let dof_handler = DofHandler::new(&mesh, D::dim());
        let position = mesh.reference_positions(&dof_handler);
        Self {
            mesh,
            dof_handler,
            position,
        }
    }

    pub fn mesh(&self) -> &PartitionedMesh<D> {
        &self.mesh
    }

    /// The vector-valued DoF layout of positions, velocities and forces.
    pub fn dof_handler(&self) -> &DofHandler {
        &self.dof_handler
    }

    pub fn position(&self) -> &DistributedVector {
        &self.position
    }

    /// Replaces the current configuration.
    pub fn set_position(&mut self, position: DistributedVector) -> eyre::Result<()> {
        if position.partitioner() != self.dof_handler.partitioner() {
            return Err(eyre!("position vector does not match the DoF layout of the part"));
        }
        self.position = position;
        Ok(())
    }
}

/// Couples structural parts to a patch level, with one interaction engine per part.
///
/// Parts may consist of volumetric cells or of lower-dimensional cells, such as line segments
/// immersed in a 2D grid.
pub struct ImmersedCoupling<D>
where
    D: SmallDim,
    DefaultAllocator: EmbeddingAllocator<f64, D>,
{
    comm: Arc<dyn Communicator>,
    kernel: KernelKind,
    parts: Vec<Part<D>>,
    interactions: Vec<Box<dyn Interaction<D>>>,
}

impl<D> ImmersedCoupling<D>
where
    D: SmallDim,
    DefaultAllocator: EmbeddingAllocator<f64, D>,
{
    /// Creates one engine per part. [`reinit_interactions`](Self::reinit_interactions) must be
    /// called before the first interaction.
    pub fn new(comm: Arc<dyn Communicator>, parameters: &InteractionParameters, parts: Vec<Part<D>>) -> eyre::Result<Self> {
        let kernel = parameters
            .kernel_kind()
            .wrap_err("invalid interaction parameters")?;
        let interactions = parts
            .iter()
            .map(|part| {
                let reference_dim = part
                    .mesh
                    .mesh()
                    .reference_cells()
                    .first()
                    .map_or(D::dim(), ReferenceCell::dim);
                parameters.create_interaction_for_dim(Arc::clone(&comm), reference_dim)
            })
            .collect::<Result<Vec<_>, _>>()
            .wrap_err("invalid interaction parameters")?;
        Ok(Self {
            comm,
            kernel,
            parts,
            interactions,
        })
    }

    pub fn kernel(&self) -> KernelKind {
        self.kernel
    }

    pub fn parts(&self) -> &[Part<D>] {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut [Part<D>] {
        &mut self.parts
    }

    pub fn interaction(&self, part_index: usize) -> &dyn Interaction<D> {
        self.interactions[part_index].as_ref()
    }

    /// Rebuilds the engines of all parts for their current configurations. Collective.
    pub fn reinit_interactions(&mut self, level: &PatchLevel<D>) -> eyre::Result<()> {
        for (part_index, (part, interaction)) in self.parts.iter().zip(&mut self.interactions).enumerate() {
            interaction
                .reinit(&part.mesh, &part.dof_handler, &part.position, level)
                .wrap_err_with(|| format!("failed to reinitialize the interaction of part {}", part_index))?;
        }
        debug!("rank {}: reinitialized {} interactions", self.comm.rank(), self.interactions.len());
        Ok(())
    }

    /// Computes, for every part, the right-hand side of the projection of the velocity field
    /// `u_index` onto the part. Collective.
    ///
    /// Ghost values of `u_index` are filled first. Turning a right-hand side into nodal
    /// velocities requires a mass matrix solve, unless the engine's projection is an
    /// interpolation.
    pub fn interpolate_velocity_rhs(
        &self,
        u_index: DataIndex,
        level: &mut PatchLevel<D>,
    ) -> eyre::Result<Vec<DistributedVector>> {
        let mut rhs_vectors: Vec<_> = self
            .parts
            .iter()
            .map(|part| DistributedVector::zeros(part.dof_handler.partitioner().clone(), self.comm.rank()))
            .collect();
        let checks = self.parts.iter().zip(&self.interactions).zip(&rhs_vectors);
        for (part_index, ((part, interaction), rhs)) in checks.enumerate() {
            interaction
                .check_projection_arguments(self.kernel, u_index, level, &part.dof_handler, &part.position, rhs)
                .wrap_err_with(|| format!("failed to start the velocity projection of part {}", part_index))?;
        }

        level
            .fill_ghost_data(u_index)
            .wrap_err("failed to fill velocity ghost cells")?;
        let level: &PatchLevel<D> = level;

        let mut transactions = Vec::with_capacity(self.parts.len());
        for (part_index, ((part, interaction), rhs)) in self
            .parts
            .iter()
            .zip(&self.interactions)
            .zip(rhs_vectors.iter_mut())
            .enumerate()
        {
            let transaction = interaction
                .compute_projection_rhs_start(
                    self.kernel,
                    u_index,
                    level,
                    &part.dof_handler,
                    &part.position,
                    rhs,
                    interaction.rhs_scatter_operation(),
                )
                .wrap_err_with(|| format!("failed to start the velocity projection of part {}", part_index))?;
            transactions.push(transaction);
        }
        for (interaction, transaction) in self.interactions.iter().zip(&mut transactions) {
            interaction.compute_projection_rhs_intermediate(transaction, level);
        }
        for (interaction, transaction) in self.interactions.iter().zip(transactions) {
            interaction.compute_projection_rhs_finish(transaction);
        }
        Ok(rhs_vectors)
    }

    /// Spreads the force of every part onto `f_index`, adding to its current interior values.
    /// Collective.
    ///
    /// Forces are spread into a zeroed scratch quantity whose ghost values are accumulated into
    /// their owning cells before the result is added to `f_index`. Forces spread outside of
    /// every patch are dropped.
    pub fn spread_force(
        &self,
        f_index: DataIndex,
        level: &mut PatchLevel<D>,
        forces: &[DistributedVector],
    ) -> eyre::Result<()> {
        if forces.len() != self.parts.len() {
            return Err(eyre!(
                "expected one force vector per part ({}), got {}",
                self.parts.len(),
                forces.len()
            ));
        }
        // The scratch quantity shares the layout of f_index
        let checks = self.parts.iter().zip(&self.interactions).zip(forces);
        for (part_index, ((part, interaction), force)) in checks.enumerate() {
            interaction
                .check_spread_arguments(self.kernel, f_index, level, &part.dof_handler, &part.position, force)
                .wrap_err_with(|| format!("failed to start the force spreading of part {}", part_index))?;
        }
        let (depth, ghost_width) = level.data_layout(f_index)?;
        let scratch_index = level.allocate_data(depth, ghost_width);

        let mut transactions = Vec::with_capacity(self.parts.len());
        for (part_index, ((part, interaction), force)) in self
            .parts
            .iter()
            .zip(&self.interactions)
            .zip(forces)
            .enumerate()
        {
            let transaction = interaction
                .compute_spread_start(
                    self.kernel,
                    scratch_index,
                    level,
                    &part.dof_handler,
                    &part.position,
                    force,
                )
                .wrap_err_with(|| format!("failed to start the force spreading of part {}", part_index))?;
            transactions.push(transaction);
        }
        for (interaction, transaction) in self.interactions.iter().zip(&mut transactions) {
            interaction.compute_spread_intermediate(transaction, level);
        }
        for (interaction, transaction) in self.interactions.iter().zip(transactions) {
            interaction.compute_spread_finish(transaction);
        }

        level.accumulate_ghost_data(scratch_index)?;
        level.add_interior_data(f_index, scratch_index)?;
        level.deallocate_data(scratch_index)?;
        Ok(())
    }

    /// Adds the number of structure points of all parts in each grid cell to component 0 of
    /// `workload_index`. Collective.
    pub fn compute_lagrangian_workload(&self, workload_index: DataIndex, level: &mut PatchLevel<D>) -> eyre::Result<()> {
        for (part_index, (part, interaction)) in self.parts.iter().zip(&self.interactions).enumerate() {
            interaction
                .check_workload_arguments(workload_index, level, &part.position)
                .wrap_err_with(|| format!("failed to start the workload estimate of part {}", part_index))?;
        }
        let mut transactions = Vec::with_capacity(self.parts.len());
        for (part_index, (part, interaction)) in self.parts.iter().zip(&self.interactions).enumerate() {
            let transaction = interaction
                .add_workload_start(workload_index, level, &part.position)
                .wrap_err_with(|| format!("failed to start the workload estimate of part {}", part_index))?;
            transactions.push(transaction);
        }
        for (interaction, transaction) in self.interactions.iter().zip(&mut transactions) {
            interaction.add_workload_intermediate(transaction, level);
        }
        for (interaction, transaction) in self.interactions.iter().zip(transactions) {
            interaction.add_workload_finish(transaction);
        }
        Ok(())
    }

    /// Sets component 0 of `tag_index` to `tag_value` in every local cell that intersects the
    /// bounding box of a structural cell in its current configuration, so that the grid can be
    /// refined around the structure. Returns the number of tagged local cells. Collective.
    pub fn apply_gradient_detector(
        &self,
        tag_index: DataIndex,
        level: &mut PatchLevel<D>,
        tag_value: f64,
    ) -> eyre::Result<usize> {
        let mut num_tagged = 0;
        for part in &self.parts {
            let boxes: Vec<_> = collect_cell_bounding_boxes(&self.comm, &part.mesh, &part.dof_handler, &part.position)
                .iter()
                .map(|bounding_box| bounding_box.to_f64())
                .collect();
            num_tagged += level.tag_cells(tag_index, &boxes, tag_value)?;
        }
        Ok(num_tagged)
    }
}
