//! Message passing between the processes (ranks) of an SPMD run.
//!
//! All ranks execute the same sequence of collective operations. Point-to-point messages are
//! matched by `(source, destination, tag)` and delivered in the order they were sent. Sends are
//! buffered and never block, receives block until a matching message arrives. There is no
//! timeout: a receive that is never matched stalls the rank.
//!
//! [`LocalWorld`] runs an SPMD program on one thread per rank inside the current process and
//! is used both for serial runs and for multi-rank tests. With the `mpi-support` feature,
//! [`MpiCommunicator`] connects the processes of an MPI job instead.
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "mpi-support")]
mod mpi_backend;

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiCommunicator;

/// Identifies a communication round. See [`Communicator::next_tag`].
pub type Tag = u64;

/// Data that can be sent between ranks.
///
/// Serialization is only used by communicators that cross process boundaries.
pub trait MessageData: Serialize + DeserializeOwned + Send + 'static {}

impl<M> MessageData for M where M: Serialize + DeserializeOwned + Send + 'static {}

/// A message in transit.
///
/// Messages between the threads of a [`LocalWorld`] are moved as they are, while messages
/// between processes travel in encoded form.
pub struct Message {
    payload: Payload,
    #[cfg(feature = "mpi-support")]
    encode: fn(&(dyn Any + Send + 'static)) -> Vec<u8>,
}

enum Payload {
    Value(Box<dyn Any + Send>),
    #[cfg(feature = "mpi-support")]
    Encoded(Vec<u8>),
}

#[cfg(feature = "mpi-support")]
fn encode_value<M: MessageData>(value: &(dyn Any + Send + 'static)) -> Vec<u8> {
    let value = value
        .downcast_ref::<M>()
        .expect("encoder is created together with the value");
    bincode::serialize(value).expect("in-memory serialization does not fail")
}

#[cfg(feature = "mpi-support")]
fn encode_nothing(_: &(dyn Any + Send + 'static)) -> Vec<u8> {
    unreachable!("encoded messages are never encoded again")
}

impl Message {
    pub fn new<M: MessageData>(value: M) -> Self {
        Self {
            payload: Payload::Value(Box::new(value)),
            #[cfg(feature = "mpi-support")]
            encode: encode_value::<M>,
        }
    }

    /// Extracts the value, or returns the message if it does not hold a value of type `M`.
    pub fn into_value<M: MessageData>(self) -> Result<M, Self> {
        match self.payload {
            Payload::Value(value) => match value.downcast::<M>() {
                Ok(value) => Ok(*value),
                Err(value) => Err(Self {
                    payload: Payload::Value(value),
                    ..self
                }),
            },
            #[cfg(feature = "mpi-support")]
            Payload::Encoded(bytes) => bincode::deserialize(&bytes).map_err(|_| Self::from_bytes(bytes)),
        }
    }

    /// A message received in encoded form.
    #[cfg(feature = "mpi-support")]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            payload: Payload::Encoded(bytes),
            encode: encode_nothing,
        }
    }

    /// The encoded form of the message.
    #[cfg(feature = "mpi-support")]
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.payload {
            Payload::Value(value) => (self.encode)(value.as_ref()),
            Payload::Encoded(bytes) => bytes.clone(),
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message").finish_non_exhaustive()
    }
}

/// A communicator connecting the ranks of an SPMD run.
///
/// Typed point-to-point messaging and the collectives are provided as inherent methods on
/// `dyn Communicator`, so that communicators can be shared as `Arc<dyn Communicator>`.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Returns a fresh tag.
    ///
    /// Tags are generated by a per-rank counter. Since every rank performs the same sequence of
    /// communication rounds, the counters advance in lockstep and a round that obtains its tag
    /// from this method is matched with the same round on the other ranks.
    fn next_tag(&self) -> Tag;

    /// Sends a type-erased message. Never blocks.
    fn send_message(&self, destination: usize, tag: Tag, message: Message);

    /// Receives a type-erased message, blocking until one is available.
    fn receive_message(&self, source: usize, tag: Tag) -> Message;
}

impl dyn Communicator + '_ {
    /// Sends `message` to `destination`.
    pub fn send<M: MessageData>(&self, destination: usize, tag: Tag, message: M) {
        assert!(destination < self.size(), "destination rank out of bounds");
        self.send_message(destination, tag, Message::new(message));
    }

    /// Receives a message of type `M` from `source`.
    ///
    /// # Panics
    ///
    /// Panics if the matching message does not have type `M`.
    pub fn receive<M: MessageData>(&self, source: usize, tag: Tag) -> M {
        assert!(source < self.size(), "source rank out of bounds");
        match self.receive_message(source, tag).into_value::<M>() {
            Ok(message) => message,
            Err(_) => panic!(
                "Message from rank {} with tag {} does not have the expected type {}",
                source,
                tag,
                std::any::type_name::<M>()
            ),
        }
    }

    /// Gathers one value from every rank, ordered by rank.
    pub fn all_gather<M: MessageData + Clone>(&self, value: M) -> Vec<M> {
        let tag = self.next_tag();
        let rank = self.rank();
        for destination in (0..self.size()).filter(|&r| r != rank) {
            self.send(destination, tag, value.clone());
        }
        (0..self.size())
            .map(|source| {
                if source == rank {
                    value.clone()
                } else {
                    self.receive(source, tag)
                }
            })
            .collect()
    }

    pub fn all_reduce_sum(&self, value: f64) -> f64 {
        self.all_gather(value).into_iter().sum()
    }

    pub fn all_reduce_min(&self, value: f64) -> f64 {
        self.all_gather(value).into_iter().fold(f64::INFINITY, f64::min)
    }

    pub fn all_reduce_max(&self, value: f64) -> f64 {
        self.all_gather(value)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn all_reduce_sum_usize(&self, value: usize) -> usize {
        self.all_gather(value).into_iter().sum()
    }

    /// Blocks until every rank has entered the barrier.
    pub fn barrier(&self) {
        self.all_gather(());
    }
}

type MailboxKey = (usize, usize, Tag);

#[derive(Default)]
struct MailboxState {
    queues: FxHashMap<MailboxKey, VecDeque<Message>>,
    aborted: bool,
}

#[derive(Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
    delivered: Condvar,
}

/// One rank of a [`LocalWorld`].
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    tag_counter: AtomicU64,
    mailbox: Arc<Mailbox>,
}

impl LocalCommunicator {
    /// A communicator for a run with a single rank.
    pub fn serial() -> Self {
        Self {
            rank: 0,
            size: 1,
            tag_counter: AtomicU64::new(0),
            mailbox: Arc::new(Mailbox::default()),
        }
    }
}

impl std::fmt::Debug for LocalCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCommunicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator for LocalCommunicator {
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
        let mut state = self.mailbox.state.lock();
        state
            .queues
            .entry((self.rank, destination, tag))
            .or_default()
            .push_back(message);
        self.mailbox.delivered.notify_all();
    }

    fn receive_message(&self, source: usize, tag: Tag) -> Message {
        let key = (source, self.rank, tag);
        let mut state = self.mailbox.state.lock();
        loop {
            if let Some(message) = state.queues.get_mut(&key).and_then(VecDeque::pop_front) {
                if state.queues.get(&key).map_or(false, VecDeque::is_empty) {
                    state.queues.remove(&key);
                }
                return message;
            }
            if state.aborted {
                panic!("Rank {} cannot receive from rank {}: another rank panicked", self.rank, source);
            }
            self.mailbox.delivered.wait(&mut state);
        }
    }
}

/// Wakes up blocked ranks when a rank unwinds, so that a panic on one rank does not leave
/// the others waiting forever.
struct AbortOnPanic(Arc<Mailbox>);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.state.lock().aborted = true;
            self.0.delivered.notify_all();
        }
    }
}

/// A set of ranks running as threads of the current process.
pub struct LocalWorld;

impl LocalWorld {
    /// Runs `program` on `num_ranks` ranks and returns the results ordered by rank.
    ///
    /// # Panics
    ///
    /// Panics if `num_ranks` is zero, or propagates the panic of any rank.
    pub fn run<R, F>(num_ranks: usize, program: F) -> Vec<R>
    where
        R: Send,
        F: Fn(Arc<dyn Communicator>) -> R + Sync,
    {
        assert!(num_ranks > 0, "a world needs at least one rank");
        let mailbox = Arc::new(Mailbox::default());
        let program = &program;
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..num_ranks)
                .map(|rank| {
                    let mailbox = Arc::clone(&mailbox);
                    scope.spawn(move || {
                        let _guard = AbortOnPanic(Arc::clone(&mailbox));
                        let comm = LocalCommunicator {
                            rank,
                            size: num_ranks,
                            tag_counter: AtomicU64::new(0),
                            mailbox,
                        };
                        program(Arc::new(comm))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }
}

/// A shared communicator for a serial run.
pub fn serial_communicator() -> Arc<dyn Communicator> {
    Arc::new(LocalCommunicator::serial())
}
