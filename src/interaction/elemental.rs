//! The elemental interaction engine: quadrature on finite element cells.
use crate::allocators::BiDimAllocator;
use crate::comm::Communicator;
use crate::element::{PositionMapping, ReferenceMapping};
use crate::error::Error;
use crate::grid::{DataIndex, PatchLevel};
use crate::interaction::utilities::{compute_projection_rhs, compute_spread, count_quadrature_points};
use crate::interaction::{patch_tolerance, Interaction, InteractionBase};
use crate::kernel::KernelKind;
use crate::mesh::{collect_cell_lengths, DofHandler, PartitionedMesh};
use crate::partition::DistributedVector;
use crate::patch_map::PatchMap;
use crate::quadrature::{family_for_reference_cells, DensityKind, QuadratureFamily, QuadratureTable};
use crate::SmallDim;
use itertools::Itertools;
use log::{debug, trace};
use nalgebra::DefaultAllocator;
use std::sync::Arc;

/// Couples the cells of a structural mesh to the grid through quadrature.
///
/// Each overlap cell is integrated with a rule chosen from a [`QuadratureFamily`] by comparing
/// the grid spacing with the cell's longest edge, so that roughly `point_density` quadrature
/// points fall into every grid cell along each direction.
///
/// The cells of the mesh have reference dimension `R`. It equals `D` for volumetric meshes,
/// while e.g. `ElementalInteraction<U2, U1>` couples a mesh of line segments to a 2D grid.
#[derive(Debug)]
pub struct ElementalInteraction<D, R = D>
where
    D: SmallDim,
    R: SmallDim,
    DefaultAllocator: BiDimAllocator<f64, D, R>,
{
    base: InteractionBase<D>,
    min_points_1d: usize,
    point_density: f64,
    density_kind: DensityKind,
    family: Option<Box<dyn QuadratureFamily<R>>>,
    quadrature_table: QuadratureTable<R>,
    patch_map: PatchMap,
}

impl<D, R> ElementalInteraction<D, R>
where
    D: SmallDim,
    R: SmallDim,
    DefaultAllocator: BiDimAllocator<f64, D, R>,
{
    /// Creates an engine that must be reinitialized before use.
    pub fn new(
        comm: Arc<dyn Communicator>,
        min_points_1d: usize,
        point_density: f64,
        density_kind: DensityKind,
    ) -> Self {
        Self {
            base: InteractionBase::new(comm),
            min_points_1d,
            point_density,
            density_kind,
            family: None,
            quadrature_table: QuadratureTable::empty(),
            patch_map: PatchMap::default(),
        }
    }

    pub fn quadrature_family(&self) -> Option<&dyn QuadratureFamily<R>> {
        self.family.as_deref()
    }

    /// Quadrature rules of the overlap cells.
    pub fn quadrature_table(&self) -> &QuadratureTable<R> {
        &self.quadrature_table
    }

    pub fn patch_map(&self) -> &PatchMap {
        &self.patch_map
    }
}

impl<D, R> Interaction<D> for ElementalInteraction<D, R>
where
    D: SmallDim,
    R: SmallDim,
    DefaultAllocator: BiDimAllocator<f64, D, R>,
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
        let family = family_for_reference_cells::<R>(
            &mesh.mesh().reference_cells(),
            self.min_points_1d,
            self.point_density,
            self.density_kind,
        )?;
        self.base.reinit(mesh, position_dofs, position, level)?;
        let cell_lengths = collect_cell_lengths(self.base.comm(), mesh, position_dofs, position);

        let eulerian_length = self.base.eulerian_length();
        let overlap_mesh = self.base.overlap_mesh();
        let indices: Vec<u8> = overlap_mesh
            .global_cell_indices()
            .iter()
            .map(|&cell| family.get_index(eulerian_length, cell_lengths[cell]))
            .collect();
        if log::log_enabled!(log::Level::Debug) {
            let histogram = indices.iter().counts();
            let histogram: Vec<_> = histogram.into_iter().sorted().collect();
            debug!(
                "rank {}: quadrature family indices (index, count): {:?}",
                self.base.comm().rank(),
                histogram
            );
        }
        self.quadrature_table = QuadratureTable::from_family_indices(family.as_ref(), &indices);
        self.family = Some(family);

        self.patch_map = PatchMap::new(
            level.patches(),
            overlap_mesh,
            self.base.overlap_mesh_builder().cell_bounding_boxes(),
            patch_tolerance(level),
        );
        trace!(
            "rank {}: patch map cell counts {:?}",
            self.base.comm().rank(),
            self.patch_map.iter().map(<[usize]>::len).collect::<Vec<_>>()
        );
        Ok(())
    }

    fn projection_is_interpolation(&self) -> bool {
        false
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
        let mesh = self.base.overlap_mesh().mesh();
        compute_projection_rhs(
            kernel,
            data_index,
            level,
            &self.patch_map,
            &PositionMapping::new(mesh, overlap_position),
            &ReferenceMapping::new(mesh),
            &self.quadrature_table,
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
        let mesh = self.base.overlap_mesh().mesh();
        compute_spread(
            kernel,
            data_index,
            level,
            &self.patch_map,
            &PositionMapping::new(mesh, overlap_position),
            &ReferenceMapping::new(mesh),
            &self.quadrature_table,
            n_components,
            values,
        );
    }

    fn workload_overlap(&self, data_index: DataIndex, level: &mut PatchLevel<D>, overlap_position: &[f64]) {
        let mesh = self.base.overlap_mesh().mesh();
        count_quadrature_points(
            data_index,
            level,
            &self.patch_map,
            &PositionMapping::new(mesh, overlap_position),
            &ReferenceMapping::new(mesh),
            &self.quadrature_table,
        );
    }
}
