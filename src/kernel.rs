//! Regularized delta kernels connecting structure points to grid cells.
//!
//! A kernel is a tensor product of one-dimensional functions `phi(r)`, where `r` is the distance
//! between a point and a cell centre measured in units of the grid spacing. The discrete
//! weights of every supported kernel sum to one along each axis, so interpolation reproduces
//! constants and spreading conserves the spread total.
use crate::allocators::DimAllocator;
use crate::error::Error;
use crate::grid::{CellData, GridGeometry};
use crate::SmallDim;
use nalgebra::{DefaultAllocator, OPoint, OVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The widest stencil of any kernel, in cells per axis.
pub const MAX_STENCIL_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelKind {
    #[serde(rename = "PIECEWISE_LINEAR")]
    PiecewiseLinear,
    #[serde(rename = "BSPLINE_3")]
    BSpline3,
    #[serde(rename = "BSPLINE_4")]
    BSpline4,
    /// The four-point kernel of Peskin.
    #[serde(rename = "IB_4")]
    Ib4,
}

impl KernelKind {
    pub const ALL: [KernelKind; 4] = [Self::PiecewiseLinear, Self::BSpline3, Self::BSpline4, Self::Ib4];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PiecewiseLinear => "PIECEWISE_LINEAR",
            Self::BSpline3 => "BSPLINE_3",
            Self::BSpline4 => "BSPLINE_4",
            Self::Ib4 => "IB_4",
        }
    }

    /// Number of cells per axis in the support of the kernel.
    pub fn stencil_width(&self) -> usize {
        match self {
            Self::PiecewiseLinear => 2,
            Self::BSpline3 => 3,
            Self::BSpline4 | Self::Ib4 => 4,
        }
    }

    /// The number of ghost cells a patch needs so that the stencil of every point inside the
    /// patch stays within the ghost box.
    pub fn min_ghost_width(&self) -> usize {
        self.stencil_width() / 2 + 1
    }

    /// Evaluates the one-dimensional kernel function.
    pub fn evaluate(&self, r: f64) -> f64 {
        let r = r.abs();
        match self {
            Self::PiecewiseLinear => (1.0 - r).max(0.0),
            Self::BSpline3 => {
                if r < 0.5 {
                    0.75 - r * r
                } else if r < 1.5 {
                    0.5 * (1.5 - r).powi(2)
                } else {
                    0.0
                }
            }
            Self::BSpline4 => {
                if r < 1.0 {
                    2.0 / 3.0 - r * r + 0.5 * r.powi(3)
                } else if r < 2.0 {
                    (2.0 - r).powi(3) / 6.0
                } else {
                    0.0
                }
            }
            Self::Ib4 => {
                if r < 1.0 {
                    0.125 * (3.0 - 2.0 * r + (1.0 + 4.0 * r - 4.0 * r * r).sqrt())
                } else if r < 2.0 {
                    0.125 * (5.0 - 2.0 * r - (-7.0 + 12.0 * r - 4.0 * r * r).max(0.0).sqrt())
                } else {
                    0.0
                }
            }
        }
    }

    /// Computes the cells and weights the kernel associates with a point.
    pub fn stencil<D>(&self, geometry: &GridGeometry<D>, point: &OPoint<f64, D>) -> Stencil<D>
    where
        D: SmallDim,
        DefaultAllocator: DimAllocator<f64, D>,
    {
        let width = self.stencil_width();
        let mut weights = [[0.0; MAX_STENCIL_WIDTH]; 3];
        let mut start = OVector::<i64, D>::zeros();
        for axis in 0..D::dim() {
            // Position in cell units relative to the centre of cell 0
            let s = (point[axis] - geometry.origin()[axis]) / geometry.dx()[axis] - 0.5;
            let first = (s - 0.5 * width as f64).ceil() as i64;
            start[axis] = first;
            for (k, weight) in weights[axis].iter_mut().take(width).enumerate() {
                *weight = self.evaluate(s - (first + k as i64) as f64);
            }
        }
        Stencil { start, width, weights }
    }
}

impl Display for KernelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for KernelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::UnknownKernel(s.to_string()))
    }
}

/// The cells and tensor product weights of a kernel evaluated at one point.
#[derive(Debug, Clone)]
pub struct Stencil<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    start: OVector<i64, D>,
    width: usize,
    weights: [[f64; MAX_STENCIL_WIDTH]; 3],
}

impl<D> Stencil<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// The cell with the smallest index along every axis.
    pub fn start(&self) -> &OVector<i64, D> {
        &self.start
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Calls `f` with every cell of the stencil and its weight.
    pub fn for_each(&self, mut f: impl FnMut(&OVector<i64, D>, f64)) {
        let num_cells = self.width.pow(D::dim() as u32);
        let mut cell = self.start.clone();
        for linear in 0..num_cells {
            let mut remainder = linear;
            let mut weight = 1.0;
            for axis in 0..D::dim() {
                let k = remainder % self.width;
                remainder /= self.width;
                cell[axis] = self.start[axis] + k as i64;
                weight *= self.weights[axis][k];
            }
            f(&cell, weight);
        }
    }
}

/// Interpolates all components of `data` at `point` into `values`.
///
/// The stencil must be contained in the ghost box of `data`.
pub fn interpolate<D>(
    kernel: KernelKind,
    geometry: &GridGeometry<D>,
    data: &CellData<D>,
    point: &OPoint<f64, D>,
    values: &mut [f64],
) where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    assert_eq!(values.len(), data.depth());
    values.iter_mut().for_each(|v| *v = 0.0);
    kernel.stencil(geometry, point).for_each(|cell, weight| {
        for (c, value) in values.iter_mut().enumerate() {
            *value += weight * data.get(cell, c);
        }
    });
}

/// Adds `values`, distributed by the kernel weights and divided by the cell volume, to the
/// cells around `point`.
///
/// Spreading a point value `F` therefore adds a grid density whose integral is `F`.
pub fn spread<D>(
    kernel: KernelKind,
    geometry: &GridGeometry<D>,
    data: &mut CellData<D>,
    point: &OPoint<f64, D>,
    values: &[f64],
) where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    assert_eq!(values.len(), data.depth());
    let inv_volume = 1.0 / geometry.cell_volume();
    kernel.stencil(geometry, point).for_each(|cell, weight| {
        for (c, value) in values.iter().enumerate() {
            data.add(cell, c, weight * inv_volume * value);
        }
    });
}
