//! Library-wide error type.
//!
//! Errors returned from this crate are configuration errors: they are detected eagerly when an
//! interaction is (re)initialized or when a transaction is started, and indicate a setup
//! problem on the caller's side. Violations of the transaction protocol are programming errors
//! and panic instead.
use crate::grid::DataIndex;
use crate::kernel::KernelKind;
use crate::mesh::ReferenceCell;
use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The structural mesh has no cells.
    EmptyMesh,
    /// The structural mesh mixes several reference cell kinds, which is not supported.
    MixedReferenceCells(Vec<ReferenceCell>),
    /// The reference cells of the mesh do not have the reference dimension of the interaction.
    CellDimensionMismatch { cell: ReferenceCell, expected: usize },
    /// A kernel name could not be resolved.
    UnknownKernel(String),
    /// The grid data does not have enough ghost cells for the support of the kernel.
    InsufficientGhostWidth {
        kernel: KernelKind,
        required: usize,
        available: usize,
    },
    /// A vector, table or grid quantity does not have the expected size.
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The data index is not allocated on the patch level.
    UnknownDataIndex(DataIndex),
    /// No DoF layout with the given number of components was registered with the interaction.
    UnregisteredDofHandler { n_components: usize },
    /// A parameter is outside of its valid range.
    InvalidParameter { name: &'static str, reason: String },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMesh => write!(f, "The structural mesh has no cells"),
            Self::MixedReferenceCells(cells) => {
                write!(f, "Meshes with mixed reference cells are not supported (found {:?})", cells)
            }
            Self::CellDimensionMismatch { cell, expected } => write!(
                f,
                "Cells of kind {:?} have dimension {}, but the interaction expects dimension {}",
                cell,
                cell.dim(),
                expected
            ),
            Self::UnknownKernel(name) => write!(f, "Unknown interaction kernel \"{}\"", name),
            Self::InsufficientGhostWidth {
                kernel,
                required,
                available,
            } => write!(
                f,
                "Kernel {} requires a ghost width of at least {}, but the data has {}",
                kernel, required, available
            ),
            Self::SizeMismatch { what, expected, actual } => {
                write!(f, "Size mismatch for {}: expected {}, got {}", what, expected, actual)
            }
            Self::UnknownDataIndex(index) => write!(f, "Data index {} is not allocated", index.0),
            Self::UnregisteredDofHandler { n_components } => write!(
                f,
                "No DoF handler with {} components has been registered with the interaction",
                n_components
            ),
            Self::InvalidParameter { name, reason } => write!(f, "Invalid parameter {}: {}", name, reason),
        }
    }
}

impl std::error::Error for Error {}
