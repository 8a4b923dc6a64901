//! Families of quadrature rules indexed by resolution.
//!
//! A family maps the ratio between the local grid spacing and the local element size to an
//! index, and each index to a quadrature rule. Larger indices are finer rules. The index is
//! non-decreasing as the grid spacing decreases, so finer grids never receive fewer points.
use crate::allocators::DimAllocator;
use crate::element::ReferenceCell;
use crate::error::Error;
use crate::quadrature::{gauss, Quadrature, QuadraturePair};
use crate::SmallDim;
use log::warn;
use nalgebra::DefaultAllocator;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::marker::PhantomData;

/// Largest number of points per direction of simplex rules in two dimensions.
pub const MAX_SIMPLEX_POINTS_1D_2D: usize = 16;
/// Largest number of points per direction of simplex rules in three dimensions.
pub const MAX_SIMPLEX_POINTS_1D_3D: usize = 10;

/// How the point spacing of a simplex rule is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DensityKind {
    /// The side length of a cube whose volume is the cell volume per point.
    #[default]
    Average,
    /// The smallest distance between two points of the rule. Selects coarser rules.
    Minimum,
}

pub trait QuadratureFamily<D>: Debug + Send + Sync
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// The reference cell the rules are defined on.
    fn reference_cell(&self) -> ReferenceCell;

    /// Index of the rule to use for a cell with size `lagrangian_length` on a grid with spacing
    /// `eulerian_length`.
    ///
    /// # Panics
    ///
    /// Panics if either length is not positive.
    fn get_index(&self, eulerian_length: f64, lagrangian_length: f64) -> u8;

    /// The rule with the given index.
    fn quadrature(&self, index: u8) -> QuadraturePair<D>;
}

fn check_lengths(eulerian_length: f64, lagrangian_length: f64) {
    assert!(
        eulerian_length > 0.0 && lagrangian_length > 0.0,
        "lengths must be positive (eulerian: {}, lagrangian: {})",
        eulerian_length,
        lagrangian_length
    );
}

fn check_parameters(min_points_1d: usize, point_density: f64) -> Result<(), Error> {
    if min_points_1d == 0 {
        return Err(Error::InvalidParameter {
            name: "min_points_1d",
            reason: "must be positive".to_string(),
        });
    }
    if !(point_density.is_finite() && point_density > 0.0) {
        return Err(Error::InvalidParameter {
            name: "point_density",
            reason: format!("must be positive and finite, got {}", point_density),
        });
    }
    Ok(())
}

/// Tensor product Gauss rules on hypercubes.
///
/// Rule `i` has `min_points_1d + i` points per direction. A cell receives enough points per
/// direction for `point_density` points per grid cell along the cell's length.
#[derive(Debug, Clone)]
pub struct GaussFamily<D> {
    cell: ReferenceCell,
    min_points_1d: usize,
    point_density: f64,
    marker: PhantomData<D>,
}

impl<D> GaussFamily<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    pub fn new(cell: ReferenceCell, min_points_1d: usize, point_density: f64) -> Result<Self, Error> {
        check_parameters(min_points_1d, point_density)?;
        if cell.is_simplex() || cell.dim() != D::dim() {
            return Err(Error::InvalidParameter {
                name: "cell",
                reason: format!("Gauss families are defined for {}-dimensional hypercubes, not {:?}", D::dim(), cell),
            });
        }
        Ok(Self {
            cell,
            min_points_1d,
            point_density,
            marker: PhantomData,
        })
    }
}

impl<D> QuadratureFamily<D> for GaussFamily<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn reference_cell(&self) -> ReferenceCell {
        self.cell
    }

    fn get_index(&self, eulerian_length: f64, lagrangian_length: f64) -> u8 {
        check_lengths(eulerian_length, lagrangian_length);
        let needed = (self.point_density * lagrangian_length / eulerian_length).ceil();
        let extra = (needed - self.min_points_1d as f64).max(0.0);
        if extra > f64::from(u8::MAX) {
            warn!(
                "Gauss rule index {} exceeds the largest index {}, the cell is under-resolved \
                 (eulerian length {}, lagrangian length {})",
                extra,
                u8::MAX,
                eulerian_length,
                lagrangian_length
            );
        }
        extra.min(f64::from(u8::MAX)) as u8
    }

    fn quadrature(&self, index: u8) -> QuadraturePair<D> {
        gauss(self.cell, self.min_points_1d + usize::from(index))
    }
}

/// Collapsed Gauss rules on simplices, selected by their point spacing.
///
/// Rule `i` has `min_points_1d + i` points per direction, up to a fixed maximum. The spacing of
/// each rule is normalized by the diameter of the reference cell, so that multiplying it by the
/// cell length estimates the physical distance between points. A cell receives the coarsest
/// rule whose estimated spacing does not exceed `eulerian_length / point_density`.
#[derive(Debug, Clone)]
pub struct SimplexFamily<D> {
    cell: ReferenceCell,
    min_points_1d: usize,
    point_density: f64,
    density_kind: DensityKind,
    spacings: Vec<f64>,
    marker: PhantomData<D>,
}

impl<D> SimplexFamily<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    pub fn new(
        cell: ReferenceCell,
        min_points_1d: usize,
        point_density: f64,
        density_kind: DensityKind,
    ) -> Result<Self, Error> {
        check_parameters(min_points_1d, point_density)?;
        if !cell.is_simplex() || cell.dim() != D::dim() {
            return Err(Error::InvalidParameter {
                name: "cell",
                reason: format!("simplex families are defined for {}-dimensional simplices, not {:?}", D::dim(), cell),
            });
        }
        let max_points_1d = match D::dim() {
            2 => MAX_SIMPLEX_POINTS_1D_2D,
            _ => MAX_SIMPLEX_POINTS_1D_3D,
        };
        if min_points_1d > max_points_1d {
            return Err(Error::InvalidParameter {
                name: "min_points_1d",
                reason: format!("simplex rules have at most {} points per direction", max_points_1d),
            });
        }

        let diameter = cell.diameter();
        let dim = D::dim() as f64;
        let mut spacings = Vec::with_capacity(max_points_1d - min_points_1d + 1);
        for n in min_points_1d..=max_points_1d {
            let rule: QuadraturePair<D> = gauss(cell, n);
            let spacing = match density_kind {
                DensityKind::Average => (cell.measure() / rule.num_points() as f64).powf(1.0 / dim) / diameter,
                DensityKind::Minimum => {
                    let spacing = minimum_point_distance(rule.points()) / diameter;
                    // Keep the sequence non-increasing, so that selection is monotone
                    spacings.last().map_or(spacing, |&previous: &f64| previous.min(spacing))
                }
            };
            spacings.push(spacing);
        }

        Ok(Self {
            cell,
            min_points_1d,
            point_density,
            density_kind,
            spacings,
            marker: PhantomData,
        })
    }

    pub fn density_kind(&self) -> DensityKind {
        self.density_kind
    }

    pub fn num_rules(&self) -> usize {
        self.spacings.len()
    }

    /// Normalized point spacing of each rule.
    pub fn spacings(&self) -> &[f64] {
        &self.spacings
    }
}

fn minimum_point_distance<D>(points: &[nalgebra::OPoint<f64, D>]) -> f64
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let mut min_distance_squared = f64::INFINITY;
    for (i, p) in points.iter().enumerate() {
        for q in &points[i + 1..] {
            min_distance_squared = min_distance_squared.min((p - q).norm_squared());
        }
    }
    min_distance_squared.sqrt()
}

impl<D> QuadratureFamily<D> for SimplexFamily<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn reference_cell(&self) -> ReferenceCell {
        self.cell
    }

    fn get_index(&self, eulerian_length: f64, lagrangian_length: f64) -> u8 {
        check_lengths(eulerian_length, lagrangian_length);
        let target_spacing = eulerian_length / self.point_density;
        let index = self
            .spacings
            .iter()
            .position(|&spacing| spacing * lagrangian_length <= target_spacing)
            .unwrap_or(self.spacings.len() - 1);
        index as u8
    }

    /// # Panics
    ///
    /// Panics if the index exceeds the finest rule of the family.
    fn quadrature(&self, index: u8) -> QuadraturePair<D> {
        let index = usize::from(index);
        assert!(index < self.num_rules(), "simplex family has no rule with index {}", index);
        gauss(self.cell, self.min_points_1d + index)
    }
}

/// Selects the quadrature family for a mesh with the given reference cells.
///
/// Returns an error unless exactly one reference cell of dimension `D` is given. `D` is the
/// reference dimension, which is smaller than the spatial dimension for codimensional meshes.
pub fn family_for_reference_cells<D>(
    reference_cells: &[ReferenceCell],
    min_points_1d: usize,
    point_density: f64,
    density_kind: DensityKind,
) -> Result<Box<dyn QuadratureFamily<D>>, Error>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    match reference_cells {
        [] => Err(Error::EmptyMesh),
        [cell] if cell.dim() != D::dim() => Err(Error::CellDimensionMismatch {
            cell: *cell,
            expected: D::dim(),
        }),
        [cell] if cell.is_simplex() => Ok(Box::new(SimplexFamily::new(
            *cell,
            min_points_1d,
            point_density,
            density_kind,
        )?)),
        [cell] => Ok(Box::new(GaussFamily::new(*cell, min_points_1d, point_density)?)),
        _ => Err(Error::MixedReferenceCells(reference_cells.to_vec())),
    }
}
