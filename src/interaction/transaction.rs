use crate::allocators::DimAllocator;
use crate::grid::DataIndex;
use crate::interaction::InteractionBase;
use crate::kernel::KernelKind;
use crate::partition::DistributedVector;
use crate::scatter::{ScatterRequest, VectorOperation};
use crate::SmallDim;
use nalgebra::DefaultAllocator;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

/// The kind of operation a [`Transaction`] carries out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Projection of grid data onto a structural field.
    Interpolation,
    /// Spreading of a structural field onto the grid.
    Spreading,
    /// Counting of structure points per grid cell.
    Workload,
}

/// The phase a [`Transaction`] expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransactionState {
    Start,
    Intermediate,
    Finish,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

pub(crate) enum Payload<'a> {
    Interpolation {
        output: &'a mut DistributedVector,
        operation: VectorOperation,
        rhs_request: Option<ScatterRequest>,
    },
    Spreading {
        field_request: Option<ScatterRequest>,
    },
    Workload,
}

impl<'a> Payload<'a> {
    fn operation(&self) -> Operation {
        match self {
            Payload::Interpolation { .. } => Operation::Interpolation,
            Payload::Spreading { .. } => Operation::Spreading,
            Payload::Workload => Operation::Workload,
        }
    }
}

/// The working state of one interaction operation in flight.
///
/// A transaction is returned by one of the `*_start` methods of an
/// [`Interaction`](crate::interaction::Interaction), must be passed exactly once to the matching
/// `*_intermediate` method and is finally consumed by the matching `*_finish` method. Passing it
/// to a method of another operation, of another engine or out of order panics.
///
/// The transaction borrows the engine that created it, so the engine cannot be reinitialized
/// while the transaction is alive.
pub struct Transaction<'a, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    pub(crate) base: &'a InteractionBase<D>,
    pub(crate) state: TransactionState,
    pub(crate) kernel: Option<KernelKind>,
    pub(crate) data_index: DataIndex,
    pub(crate) n_components: usize,
    pub(crate) position_request: Option<ScatterRequest>,
    pub(crate) overlap_position: Vec<f64>,
    pub(crate) overlap_values: Vec<f64>,
    pub(crate) payload: Payload<'a>,
}

impl<'a, D> Debug for Transaction<'a, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let combine = match &self.payload {
            Payload::Interpolation { operation, .. } => Some(*operation),
            _ => None,
        };
        f.debug_struct("Transaction")
            .field("operation", &self.operation())
            .field("state", &self.state)
            .field("kernel", &self.kernel)
            .field("data_index", &self.data_index)
            .field("n_components", &self.n_components)
            .field("combine", &combine)
            .finish()
    }
}

impl<'a, D> Transaction<'a, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    pub(crate) fn new(
        base: &'a InteractionBase<D>,
        kernel: Option<KernelKind>,
        data_index: DataIndex,
        n_components: usize,
        payload: Payload<'a>,
    ) -> Self {
        Self {
            base,
            state: TransactionState::Start,
            kernel,
            data_index,
            n_components,
            position_request: None,
            overlap_position: Vec::new(),
            overlap_values: Vec::new(),
            payload,
        }
    }

    pub fn operation(&self) -> Operation {
        self.payload.operation()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn data_index(&self) -> DataIndex {
        self.data_index
    }

    pub fn kernel(&self) -> Option<KernelKind> {
        self.kernel
    }

    /// Positions of the overlap nodes. Empty until the intermediate phase has run.
    pub fn overlap_position(&self) -> &[f64] {
        &self.overlap_position
    }

    /// The overlap vector the kernel produced (projections) or consumed (spreading). Empty
    /// until the intermediate phase has run, and always empty for workload transactions.
    pub fn overlap_values(&self) -> &[f64] {
        &self.overlap_values
    }

    /// The combine operation used to send the result back to the structural partitioning.
    ///
    /// Only projections have a structural result.
    pub fn combine_operation(&self) -> Option<VectorOperation> {
        match &self.payload {
            Payload::Interpolation { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    /// Panics unless the transaction was created by `base`, is of the given kind and is in the
    /// given state.
    pub(crate) fn check(&self, base: &InteractionBase<D>, operation: Operation, state: TransactionState) {
        assert!(
            std::ptr::eq(self.base, base),
            "{} transaction was created by another interaction",
            self.operation()
        );
        assert!(
            self.operation() == operation && self.state == state,
            "transaction protocol violated: expected a {} transaction in state {}, but got a {} transaction in state {}",
            operation,
            state,
            self.operation(),
            self.state
        );
    }
}
