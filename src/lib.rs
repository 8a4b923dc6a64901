//! Interaction between immersed finite element structures and block-structured Cartesian grids.
//!
//! The central abstraction is the *interaction transaction*: projection of grid data onto a
//! structural field, spreading of structural data onto the grid, and workload estimation are
//! all carried out in three phases (start, intermediate, finish), so that a driver that owns
//! several structural parts can overlap the communication of one part with the computation of
//! the others.
//!
//! Each process holds an *overlap mesh*, the subset of the structural mesh that intersects the
//! grid patches owned by the process, together with a [`Scatter`](scatter::Scatter) that moves
//! vector data between the distributed structural partitioning and the overlap partitioning.
use nalgebra::{DimMin, DimName};

pub mod allocators;
pub mod comm;
pub mod config;
pub mod coupling;
pub mod element;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod interaction;
pub mod kernel;
pub mod mesh;
pub mod overlap;
pub mod partition;
pub mod patch_map;
pub mod quadrature;
pub mod scatter;

pub use error::Error;

pub extern crate nalgebra;

/// A small, fixed-size dimension.
///
/// Used as a trait alias for various traits frequently needed by generic routines.
pub trait SmallDim: DimName + DimMin<Self, Output = Self> {}

impl<D> SmallDim for D where D: DimName + DimMin<Self, Output = Self> {}
