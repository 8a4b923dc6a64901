//! Parameters of the interaction engines.
use crate::allocators::{BiDimAllocator, EmbeddingAllocator};
use crate::comm::Communicator;
use crate::error::Error;
use crate::interaction::{ElementalInteraction, Interaction, NodalInteraction};
use crate::kernel::KernelKind;
use crate::quadrature::DensityKind;
use crate::SmallDim;
use nalgebra::{DefaultAllocator, U1, U2, U3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Polynomial degree of the structural finite element space.
pub const ELEMENT_DEGREE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Quadrature on finite element cells.
    #[default]
    Elemental,
    /// Mesh nodes as marker points.
    Nodal,
}

/// Parameters of the interaction between structural parts and the grid.
///
/// Missing fields take their default values when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionParameters {
    pub engine: EngineKind,
    /// Name of the interpolation kernel, e.g. `"BSPLINE_3"`.
    pub kernel: String,
    /// Target number of quadrature points per grid cell along each direction.
    pub point_density: f64,
    /// Smallest number of quadrature points per direction. Defaults to the element degree plus
    /// one.
    pub min_points_1d: Option<usize>,
    pub density_kind: DensityKind,
}

impl Default for InteractionParameters {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            kernel: KernelKind::BSpline3.name().to_string(),
            point_density: 2.0,
            min_points_1d: None,
            density_kind: DensityKind::default(),
        }
    }
}

impl InteractionParameters {
    pub fn kernel_kind(&self) -> Result<KernelKind, Error> {
        self.kernel.parse()
    }

    pub fn min_points_1d(&self) -> usize {
        self.min_points_1d.unwrap_or(ELEMENT_DEGREE + 1)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.kernel_kind()?;
        if !(self.point_density.is_finite() && self.point_density > 0.0) {
            return Err(Error::InvalidParameter {
                name: "point_density",
                reason: format!("must be positive and finite, got {}", self.point_density),
            });
        }
        if self.min_points_1d() == 0 {
            return Err(Error::InvalidParameter {
                name: "min_points_1d",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Creates an engine of the configured kind for meshes with cells of reference dimension
    /// `R`. It must be reinitialized before use.
    pub fn create_interaction<D, R>(&self, comm: Arc<dyn Communicator>) -> Result<Box<dyn Interaction<D>>, Error>
    where
        D: SmallDim,
        R: SmallDim,
        DefaultAllocator: BiDimAllocator<f64, D, R>,
    {
        self.validate()?;
        Ok(match self.engine {
            EngineKind::Elemental => Box::new(ElementalInteraction::<D, R>::new(
                comm,
                self.min_points_1d(),
                self.point_density,
                self.density_kind,
            )),
            EngineKind::Nodal => Box::new(NodalInteraction::new(comm)),
        })
    }

    /// Like [`create_interaction`](Self::create_interaction), with the reference dimension
    /// given at runtime.
    pub fn create_interaction_for_dim<D>(
        &self,
        comm: Arc<dyn Communicator>,
        reference_dim: usize,
    ) -> Result<Box<dyn Interaction<D>>, Error>
    where
        D: SmallDim,
        DefaultAllocator: EmbeddingAllocator<f64, D>,
    {
        match reference_dim {
            1 if D::dim() >= 1 => self.create_interaction::<D, U1>(comm),
            2 if D::dim() >= 2 => self.create_interaction::<D, U2>(comm),
            3 if D::dim() >= 3 => self.create_interaction::<D, U3>(comm),
            _ => Err(Error::InvalidParameter {
                name: "reference_dim",
                reason: format!(
                    "cells of dimension {} cannot be embedded in {} dimensions",
                    reference_dim,
                    D::dim()
                ),
            }),
        }
    }
}
