//! Quadrature rules on reference cells and per-cell quadrature tables.
use crate::allocators::DimAllocator;
use crate::element::ReferenceCell;
use crate::SmallDim;
use fenris_quadrature::simplex::{tetrahedron_collapsed_gauss, triangle_collapsed_gauss};
use fenris_quadrature::tensor::{hexahedron_gauss, quadrilateral_gauss};
use fenris_quadrature::univariate;
use fenris_quadrature::Rule;
use itertools::izip;
use nalgebra::{DefaultAllocator, OPoint, OVector};

pub mod family;

pub use family::{family_for_reference_cells, DensityKind, GaussFamily, QuadratureFamily, SimplexFamily};

/// Quadrature weights and points.
pub type QuadraturePair<D> = (Vec<f64>, Vec<OPoint<f64, D>>);

/// A quadrature rule consisting of weights and points.
pub trait Quadrature<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn weights(&self) -> &[f64];
    fn points(&self) -> &[OPoint<f64, D>];

    fn num_points(&self) -> usize {
        self.weights().len()
    }

    /// Approximates the integral of the given function using this quadrature rule.
    fn integrate(&self, f: impl Fn(&OPoint<f64, D>) -> f64) -> f64 {
        izip!(self.weights(), self.points())
            .map(|(w, p)| w * f(p))
            .sum()
    }
}

impl<D> Quadrature<D> for QuadraturePair<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn weights(&self) -> &[f64] {
        &self.0
    }

    fn points(&self) -> &[OPoint<f64, D>] {
        &self.1
    }
}

fn convert_rule<D, const N: usize>((weights, points): Rule<N>) -> QuadraturePair<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    assert_eq!(N, D::dim(), "rule dimension must match the reference dimension");
    let points = points
        .into_iter()
        .map(|p| OPoint::from(OVector::<f64, D>::from_fn(|i, _| p[i])))
        .collect();
    (weights, points)
}

/// A Gauss-type rule with `points_per_dim` points along each reference direction.
///
/// Segments and hypercubes use tensor product Gauss rules, simplices use collapsed Gauss rules.
///
/// # Panics
///
/// Panics if the reference cell does not have dimension `D`, or if zero points are requested.
pub fn gauss<D>(cell: ReferenceCell, points_per_dim: usize) -> QuadraturePair<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    match cell {
        ReferenceCell::Segment => convert_rule(univariate::gauss(points_per_dim)),
        ReferenceCell::Quadrilateral => convert_rule(quadrilateral_gauss(points_per_dim)),
        ReferenceCell::Triangle => convert_rule(triangle_collapsed_gauss(points_per_dim)),
        ReferenceCell::Hexahedron => convert_rule(hexahedron_gauss(points_per_dim)),
        ReferenceCell::Tetrahedron => convert_rule(tetrahedron_collapsed_gauss(points_per_dim)),
    }
}

/// Associates each cell with one of a small number of distinct quadrature rules.
///
/// Cells only store an index into the deduplicated list of rules.
#[derive(Debug, Clone)]
pub struct QuadratureTable<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    rules: Vec<QuadraturePair<D>>,
    rule_family_indices: Vec<u8>,
    cell_to_rule: Vec<usize>,
}

impl<D> QuadratureTable<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// Creates the table for cells whose rules are given by indices into a quadrature family.
    pub fn from_family_indices(family: &dyn QuadratureFamily<D>, cell_family_indices: &[u8]) -> Self {
        let mut rule_family_indices = cell_family_indices.to_vec();
        rule_family_indices.sort_unstable();
        rule_family_indices.dedup();

        let cell_to_rule = cell_family_indices
            .iter()
            .map(|index| {
                rule_family_indices
                    .binary_search(index)
                    .expect("every index is in the deduplicated list")
            })
            .collect();
        let rules = rule_family_indices
            .iter()
            .map(|&index| family.quadrature(index))
            .collect();

        Self {
            rules,
            rule_family_indices,
            cell_to_rule,
        }
    }

    /// A table without cells.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            rule_family_indices: Vec::new(),
            cell_to_rule: Vec::new(),
        }
    }

    /// A table in which every cell uses the same rule.
    pub fn uniform(rule: QuadraturePair<D>, num_cells: usize) -> Self {
        Self {
            rules: vec![rule],
            rule_family_indices: vec![0],
            cell_to_rule: vec![0; num_cells],
        }
    }

    pub fn num_cells(&self) -> usize {
        self.cell_to_rule.len()
    }

    /// The distinct rules of the table.
    pub fn rules(&self) -> &[QuadraturePair<D>] {
        &self.rules
    }

    /// Index of the rule of the cell in [`rules`](Self::rules).
    pub fn rule_index(&self, cell_index: usize) -> usize {
        self.cell_to_rule[cell_index]
    }

    /// Index of the rule of the cell in the quadrature family the table was created from.
    pub fn family_index(&self, cell_index: usize) -> u8 {
        self.rule_family_indices[self.rule_index(cell_index)]
    }

    pub fn quadrature(&self, cell_index: usize) -> &QuadraturePair<D> {
        &self.rules[self.rule_index(cell_index)]
    }

    pub fn num_points(&self, cell_index: usize) -> usize {
        self.quadrature(cell_index).num_points()
    }

    pub fn total_num_points(&self) -> usize {
        (0..self.num_cells()).map(|cell| self.num_points(cell)).sum()
    }
}
