//! Communication between the processes of an MPI job.
use crate::comm::{Communicator, Message, Tag};
use log::debug;
use mpi::environment::Universe;
use mpi::request::{Request, StaticScope};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Threading;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// The MPI standard guarantees that tags up to this value are valid.
const MAX_MPI_TAG: u64 = 32767;

struct PendingSend {
    request: Request<'static, [u8], StaticScope>,
    buffer: *mut [u8],
}

/// # Safety
///
/// `buffer` must have been leaked from a box, and no request may still borrow it.
unsafe fn free_buffer(buffer: *mut [u8]) {
    drop(Box::from_raw(buffer))
}

/// A communicator over `MPI_COMM_WORLD`.
///
/// Messages are encoded with `bincode` and sent with non-blocking sends, so that sends never
/// block as the [`Communicator`] contract requires. Send buffers are released once MPI reports
/// their completion.
pub struct MpiCommunicator {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    tag_counter: AtomicU64,
    pending: Mutex<Vec<PendingSend>>,
    // Finalizes MPI when dropped, so it must be dropped last
    _universe: Universe,
}

// SAFETY: MPI is initialized with `Threading::Multiple`, so the communicator handle may be used
// from several threads. Pending requests are only accessed behind the mutex.
unsafe impl Send for MpiCommunicator {}
unsafe impl Sync for MpiCommunicator {}

impl MpiCommunicator {
    /// Initializes MPI. Returns `None` if MPI has already been initialized or does not support
    /// multithreaded use.
    pub fn initialize() -> Option<Self> {
        let (universe, threading) = mpi::initialize_with_threading(Threading::Multiple)?;
        if threading != Threading::Multiple {
            debug!("MPI provides threading level {:?} only", threading);
            return None;
        }
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Some(Self {
            world,
            rank,
            size,
            tag_counter: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
            _universe: universe,
        })
    }

    fn mpi_tag(tag: Tag) -> i32 {
        // Tags are reused after wrapping around. Messages with equal tags are still matched in
        // the order they were sent.
        (tag % (MAX_MPI_TAG + 1)) as i32
    }

    /// Frees the buffers of completed sends.
    fn release_completed(pending: &mut Vec<PendingSend>) {
        let mut in_flight = Vec::with_capacity(pending.len());
        for PendingSend { request, buffer } in pending.drain(..) {
            match request.test() {
                // SAFETY: the send has completed
                Ok(_) => unsafe { free_buffer(buffer) },
                Err(request) => in_flight.push(PendingSend { request, buffer }),
            }
        }
        *pending = in_flight;
    }
}

impl Communicator for MpiCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn next_tag(&self) -> Tag {
        self.tag_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn send_message(&self, destination: usize, tag: Tag, message: Message) {
        let buffer: &'static mut [u8] = Box::leak(message.to_bytes().into_boxed_slice());
        let buffer_ptr: *mut [u8] = buffer;
        // SAFETY: the leaked buffer is not touched again until the request has completed
        let buffer: &'static [u8] = unsafe { &*buffer_ptr };
        let request = self
            .world
            .process_at_rank(destination as i32)
            .immediate_send_with_tag(StaticScope, buffer, Self::mpi_tag(tag));
        let mut pending = self.pending.lock();
        pending.push(PendingSend {
            request,
            buffer: buffer_ptr,
        });
        Self::release_completed(&mut pending);
    }

    fn receive_message(&self, source: usize, tag: Tag) -> Message {
        let (bytes, _) = self
            .world
            .process_at_rank(source as i32)
            .receive_vec_with_tag::<u8>(Self::mpi_tag(tag));
        Message::from_bytes(bytes)
    }
}

impl Drop for MpiCommunicator {
    fn drop(&mut self) {
        for PendingSend { request, buffer } in self.pending.get_mut().drain(..) {
            request.wait();
            // SAFETY: the send has completed
            unsafe { free_buffer(buffer) };
        }
    }
}

impl std::fmt::Debug for MpiCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpiCommunicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}
