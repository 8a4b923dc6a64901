//! The nodal interaction engine: mesh nodes as immersed marker points.
use crate::allocators::DimAllocator;
use crate::comm::Communicator;
use crate::error::Error;
use crate::grid::{DataIndex, PatchLevel};
use crate::interaction::utilities::{compute_nodal_interpolation, compute_nodal_spread, count_nodes};
use crate::interaction::{patch_tolerance, Interaction, InteractionBase};
use crate::kernel::KernelKind;
use crate::mesh::{DofHandler, PartitionedMesh};
use crate::partition::DistributedVector;
use crate::patch_map::NodalPatchMap;
use crate::SmallDim;
use log::trace;
use nalgebra::DefaultAllocator;
use std::sync::Arc;

/// Couples the nodes of a structural mesh to the grid.
///
/// Projection interpolates the grid field at each node, so its result is the nodal field
/// itself. Spreading adds each nodal value with unit weight, and the workload is the number of
/// nodes per grid cell.
#[derive(Debug)]
pub struct NodalInteraction<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    base: InteractionBase<D>,
    patch_map: NodalPatchMap,
}

impl<D> NodalInteraction<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// Creates an engine that must be reinitialized before use.
    pub fn new(comm: Arc<dyn Communicator>) -> Self {
        Self {
            base: InteractionBase::new(comm),
            patch_map: NodalPatchMap::default(),
        }
    }

    pub fn patch_map(&self) -> &NodalPatchMap {
        &self.patch_map
    }
}

impl<D> Interaction<D> for NodalInteraction<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn base(&self) -> &InteractionBase<D> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut InteractionBase<D> {
        &mut self.base
    }

    fn reinit(
        &mut self,
        mesh: &PartitionedMesh<D>,
        position_dofs: &DofHandler,
        position: &DistributedVector,
        level: &PatchLevel<D>,
    ) -> Result<(), Error> {
        self.base.reinit(mesh, position_dofs, position, level)?;
        let overlap_positions = self.base.overlap_positions(position)?;
        self.patch_map = NodalPatchMap::new(level.patches(), &overlap_positions, patch_tolerance(level));
        trace!(
            "rank {}: nodal patch map node counts {:?}",
            self.base.comm().rank(),
            self.patch_map.iter().map(<[usize]>::len).collect::<Vec<_>>()
        );
        Ok(())
    }

    fn projection_is_interpolation(&self) -> bool {
        true
    }

    fn project_overlap(
        &self,
        kernel: KernelKind,
        data_index: DataIndex,
        level: &PatchLevel<D>,
        overlap_position: &[f64],
        n_components: usize,
        output: &mut [f64],
    ) {
        compute_nodal_interpolation(
            kernel,
            data_index,
            level,
            &self.patch_map,
            overlap_position,
            n_components,
            output,
        );
    }

    fn spread_overlap(
        &self,
        kernel: KernelKind,
        data_index: DataIndex,
        level: &mut PatchLevel<D>,
        overlap_position: &[f64],
        n_components: usize,
        values: &[f64],
    ) {
        compute_nodal_spread(
            kernel,
            data_index,
            level,
            &self.patch_map,
            overlap_position,
            n_components,
            values,
        );
    }

    fn workload_overlap(&self, data_index: DataIndex, level: &mut PatchLevel<D>, overlap_position: &[f64]) {
        count_nodes(data_index, level, &self.patch_map, overlap_position);
    }
}
