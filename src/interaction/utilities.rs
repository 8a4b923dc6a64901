//! The numerical kernels of the interaction engines.
//!
//! All functions operate on overlap data: cells, nodes and vectors are numbered as in the
//! overlap mesh, and vectors with `n` components store the entries of node `k` at
//! `n * k .. n * (k + 1)`. Each patch only handles the points it owns (see
//! [`Patch::owns_point`]), so every point is processed by exactly one patch.
use crate::allocators::{BiDimAllocator, DimAllocator};
use crate::element::{CellMapping, LinearElement, MAX_NODES};
use crate::grid::{CellBox, DataIndex, GridGeometry, Patch, PatchLevel};
use crate::kernel::{interpolate, spread, KernelKind};
use crate::patch_map::{NodalPatchMap, PatchMap};
use crate::quadrature::{Quadrature, QuadratureTable};
use crate::SmallDim;
use itertools::izip;
use nalgebra::{DefaultAllocator, OPoint, OVector};

/// Calls `f(patch, point, basis values, JxW)` for every quadrature point of every cell in the
/// patch map that lies inside its patch. The basis values are those of the nodes of the cell,
/// and `JxW` is the quadrature weight scaled by the volume change of the reference mapping.
///
/// Quadrature rules live on reference cells of dimension `R`, which may be smaller than `D`.
fn for_each_quadrature_point<D, R, P>(
    patches: &mut [P],
    patch_of: impl Fn(&P) -> &Patch<D>,
    patch_map: &PatchMap,
    deformed: &dyn CellMapping<D>,
    reference: &dyn CellMapping<D>,
    quadrature_table: &QuadratureTable<R>,
    mut f: impl FnMut(&mut P, usize, &OPoint<f64, D>, &[f64], f64),
) where
    D: SmallDim,
    R: SmallDim,
    DefaultAllocator: BiDimAllocator<f64, D, R>,
{
    assert_eq!(patch_map.num_patches(), patches.len(), "patch map does not match the patch level");
    let mut deformed_vertices = Vec::with_capacity(MAX_NODES);
    let mut reference_vertices = Vec::with_capacity(MAX_NODES);
    let mut basis = [0.0; MAX_NODES];
    for (patch, cells) in patches.iter_mut().zip(patch_map.iter()) {
        for &cell in cells {
            let kind = deformed.reference_cell(cell);
            deformed.populate_cell_vertices(&mut deformed_vertices, cell);
            reference.populate_cell_vertices(&mut reference_vertices, cell);
            let deformed_element = LinearElement::<D, R>::new(kind, &deformed_vertices);
            let reference_element = LinearElement::<D, R>::new(kind, &reference_vertices);
            let basis = &mut basis[..kind.num_vertices()];

            let rule = quadrature_table.quadrature(cell);
            for (w, xi) in izip!(rule.weights(), rule.points()) {
                let x = deformed_element.map_reference_coords(xi);
                if !patch_of(patch).owns_point(&x) {
                    continue;
                }
                let jxw = w * reference_element.volume_element(xi);
                deformed_element.populate_basis(basis, xi);
                f(patch, cell, &x, basis, jxw);
            }
        }
    }
}

/// The cell containing `x`, clamped to the interior of the patch.
fn containing_cell<D>(geometry: &GridGeometry<D>, cell_box: &CellBox<D>, x: &OPoint<f64, D>) -> OVector<i64, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    // The patch test and the cell index can disagree by one due to rounding at the upper face
    geometry
        .cell_index(x)
        .zip_zip_map(cell_box.lower(), cell_box.upper(), |i, lower, upper| i.clamp(lower, upper))
}

/// Adds, to component 0 of `data_index`, the number of quadrature points inside each grid cell.
pub fn count_quadrature_points<D, R>(
    data_index: DataIndex,
    level: &mut PatchLevel<D>,
    patch_map: &PatchMap,
    deformed: &dyn CellMapping<D>,
    reference: &dyn CellMapping<D>,
    quadrature_table: &QuadratureTable<R>,
) where
    D: SmallDim,
    R: SmallDim,
    DefaultAllocator: BiDimAllocator<f64, D, R>,
{
    let (geometry, patches) = level.geometry_and_patches_mut();
    for_each_quadrature_point(
        patches,
        |patch: &Patch<D>| patch,
        patch_map,
        deformed,
        reference,
        quadrature_table,
        |patch, _, x, _, _| {
            let cell = containing_cell(geometry, patch.cell_box(), x);
            patch
                .data_mut(data_index)
                .expect("workload data is allocated")
                .add(&cell, 0, 1.0);
        },
    );
}

/// Accumulates the right-hand side `∫ φ_a u dX` of the L2 projection of the grid field
/// `data_index` onto the finite element space into `rhs`.
///
/// The grid field is interpolated with `kernel` at the quadrature points in the deformed
/// configuration, while the integral is taken in the reference configuration.
pub fn compute_projection_rhs<D, R>(
    kernel: KernelKind,
    data_index: DataIndex,
    level: &PatchLevel<D>,
    patch_map: &PatchMap,
    deformed: &dyn CellMapping<D>,
    reference: &dyn CellMapping<D>,
    quadrature_table: &QuadratureTable<R>,
    n_components: usize,
    rhs: &mut [f64],
) where
    D: SmallDim,
    R: SmallDim,
    DefaultAllocator: BiDimAllocator<f64, D, R>,
{
    let geometry = level.geometry();
    let mut patches: Vec<&Patch<D>> = level.patches().iter().collect();
    let mut values = vec![0.0; n_components];
    for_each_quadrature_point(
        &mut patches,
        |patch: &&Patch<D>| *patch,
        patch_map,
        deformed,
        reference,
        quadrature_table,
        |patch, cell, x, basis, jxw| {
            let data = patch.data(data_index).expect("projected data is allocated");
            interpolate(kernel, geometry, data, x, &mut values);
            for (&node, &phi) in deformed.cell_nodes(cell).iter().zip(basis) {
                for (c, &value) in values.iter().enumerate() {
                    rhs[n_components * node + c] += phi * value * jxw;
                }
            }
        },
    );
}

/// Spreads the finite element field `field` onto the grid field `data_index`.
///
/// The value at each quadrature point, scaled by its reference `JxW`, is spread with `kernel`,
/// so the grid integral of the spread density equals the reference integral of the field.
pub fn compute_spread<D, R>(
    kernel: KernelKind,
    data_index: DataIndex,
    level: &mut PatchLevel<D>,
    patch_map: &PatchMap,
    deformed: &dyn CellMapping<D>,
    reference: &dyn CellMapping<D>,
    quadrature_table: &QuadratureTable<R>,
    n_components: usize,
    field: &[f64],
) where
    D: SmallDim,
    R: SmallDim,
    DefaultAllocator: BiDimAllocator<f64, D, R>,
{
    let (geometry, patches) = level.geometry_and_patches_mut();
    let mut values = vec![0.0; n_components];
    for_each_quadrature_point(
        patches,
        |patch: &Patch<D>| patch,
        patch_map,
        deformed,
        reference,
        quadrature_table,
        |patch, cell, x, basis, jxw| {
            values.iter_mut().for_each(|v| *v = 0.0);
            for (&node, &phi) in deformed.cell_nodes(cell).iter().zip(basis) {
                for (c, value) in values.iter_mut().enumerate() {
                    *value += phi * field[n_components * node + c];
                }
            }
            values.iter_mut().for_each(|v| *v *= jxw);
            let data = patch.data_mut(data_index).expect("spread data is allocated");
            spread(kernel, geometry, data, x, &values);
        },
    );
}

fn node_position<D>(positions: &[f64], node: usize) -> OPoint<f64, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let d = D::dim();
    OPoint::from(OVector::<f64, D>::from_column_slice(&positions[d * node..d * (node + 1)]))
}

/// Adds, to component 0 of `data_index`, the number of nodes inside each grid cell.
pub fn count_nodes<D>(data_index: DataIndex, level: &mut PatchLevel<D>, patch_map: &NodalPatchMap, positions: &[f64])
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let (geometry, patches) = level.geometry_and_patches_mut();
    for (patch, nodes) in patches.iter_mut().zip(patch_map.iter()) {
        for &node in nodes {
            let x = node_position(positions, node);
            if patch.owns_point(&x) {
                let cell = containing_cell(geometry, patch.cell_box(), &x);
                patch
                    .data_mut(data_index)
                    .expect("workload data is allocated")
                    .add(&cell, 0, 1.0);
            }
        }
    }
}

/// Interpolates the grid field `data_index` at the nodes and writes the result into `values`.
///
/// Nodes that are not located in any local patch are left untouched.
pub fn compute_nodal_interpolation<D>(
    kernel: KernelKind,
    data_index: DataIndex,
    level: &PatchLevel<D>,
    patch_map: &NodalPatchMap,
    positions: &[f64],
    n_components: usize,
    values: &mut [f64],
) where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let geometry = level.geometry();
    for (patch, nodes) in level.patches().iter().zip(patch_map.iter()) {
        let data = patch.data(data_index).expect("projected data is allocated");
        for &node in nodes {
            let x = node_position(positions, node);
            if patch.owns_point(&x) {
                let node_values = &mut values[n_components * node..n_components * (node + 1)];
                interpolate(kernel, geometry, data, &x, node_values);
            }
        }
    }
}

/// Spreads the nodal values `values` onto the grid field `data_index`, with unit weight per node.
pub fn compute_nodal_spread<D>(
    kernel: KernelKind,
    data_index: DataIndex,
    level: &mut PatchLevel<D>,
    patch_map: &NodalPatchMap,
    positions: &[f64],
    n_components: usize,
    values: &[f64],
) where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let (geometry, patches) = level.geometry_and_patches_mut();
    for (patch, nodes) in patches.iter_mut().zip(patch_map.iter()) {
        for &node in nodes {
            let x = node_position(positions, node);
            if patch.owns_point(&x) {
                let node_values = &values[n_components * node..n_components * (node + 1)];
                let data = patch.data_mut(data_index).expect("spread data is allocated");
                spread(kernel, geometry, data, &x, node_values);
            }
        }
    }
}

/// The smallest grid spacing of the patches of all processes. Collective.
///
/// A process without patches contributes `f64::MAX`, which leaves the minimum unaffected.
pub fn eulerian_length<D>(level: &PatchLevel<D>) -> f64
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let local = if level.patches().is_empty() {
        f64::MAX
    } else {
        level.geometry().min_dx()
    };
    level.comm().all_reduce_min(local)
}
