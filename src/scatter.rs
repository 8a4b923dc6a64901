//! Movement of vector data between a distributed partitioning and a process-local overlap
//! partitioning.
//!
//! An *overlap vector* is a plain local vector whose entry `k` corresponds to the global index
//! `overlap_indices[k]` chosen when the [`Scatter`] was built. Entries of the overlap vector may
//! be owned by any rank, and the same global index may appear in the overlap vectors of
//! several ranks.
use crate::comm::{Communicator, Tag};
use crate::partition::{DistributedVector, Partitioner};
use log::debug;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// How values arriving at their owner are combined with the values already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOperation {
    /// Contributions are added to the current value.
    Add,
    /// Contributions overwrite the current value.
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    GlobalToOverlap,
    OverlapToGlobal(VectorOperation),
}

/// A pending scatter started by [`Scatter::global_to_overlap_start`] or
/// [`Scatter::overlap_to_global_start`].
///
/// Must be passed to the matching `finish` method of the scatter that created it.
#[derive(Debug)]
#[must_use = "a started scatter must be finished"]
pub struct ScatterRequest {
    tag: Tag,
    direction: Direction,
    local_values: Vec<f64>,
}

/// Communication schedule between a distributed vector and an overlap vector.
///
/// Building a scatter is collective. Both directions are split into `start` and `finish`, so
/// that unrelated work can be done while messages are in transit. Every `start` draws a new tag
/// from the communicator, so several scatters (or several rounds of the same scatter) can be
/// in flight at the same time.
pub struct Scatter {
    comm: Arc<dyn Communicator>,
    partitioner: Partitioner,
    overlap_size: usize,
    /// (overlap index, local offset) pairs for overlap entries owned by this rank.
    local_pairs: Vec<(usize, usize)>,
    /// For every other rank, the overlap entries this rank needs from it.
    receives: Vec<(usize, Vec<usize>)>,
    /// For every other rank, the local offsets of the owned entries it needs.
    sends: Vec<(usize, Vec<usize>)>,
}

impl std::fmt::Debug for Scatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scatter")
            .field("rank", &self.comm.rank())
            .field("overlap_size", &self.overlap_size)
            .field("num_local", &self.local_pairs.len())
            .field("receives", &self.receives.len())
            .field("sends", &self.sends.len())
            .finish()
    }
}

impl Scatter {
    /// Builds the schedule for the overlap vector whose entries correspond to the given global
    /// indices. Collective.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds for the partitioner, or if the partitioner does not
    /// match the size of the communicator.
    pub fn new(comm: Arc<dyn Communicator>, partitioner: Partitioner, overlap_indices: &[usize]) -> Self {
        assert_eq!(
            partitioner.num_ranks(),
            comm.size(),
            "partitioner must have one range per rank"
        );
        let rank = comm.rank();
        let own_range = partitioner.owned_range(rank);

        let mut local_pairs = Vec::new();
        let mut requests: FxHashMap<usize, (Vec<usize>, Vec<usize>)> = FxHashMap::default();
        for (overlap_index, &global_index) in overlap_indices.iter().enumerate() {
            let owner = partitioner.owner(global_index);
            if owner == rank {
                local_pairs.push((overlap_index, global_index - own_range.start));
            } else {
                let (overlap_entries, global_entries) = requests.entry(owner).or_default();
                overlap_entries.push(overlap_index);
                global_entries.push(global_index);
            }
        }

        // Every rank tells every other rank which of its entries it needs, so that all ranks
        // know whom to send to without any further negotiation
        let tag = comm.next_tag();
        let mut receives = Vec::new();
        for destination in (0..comm.size()).filter(|&r| r != rank) {
            let (overlap_entries, global_entries) = requests.remove(&destination).unwrap_or_default();
            comm.send(destination, tag, global_entries);
            if !overlap_entries.is_empty() {
                receives.push((destination, overlap_entries));
            }
        }

        let mut sends = Vec::new();
        for source in (0..comm.size()).filter(|&r| r != rank) {
            let requested: Vec<usize> = comm.receive(source, tag);
            if !requested.is_empty() {
                let offsets = requested
                    .into_iter()
                    .map(|global_index| {
                        assert!(own_range.contains(&global_index), "request for an index not owned by this rank");
                        global_index - own_range.start
                    })
                    .collect();
                sends.push((source, offsets));
            }
        }

        debug!(
            "rank {}: scatter with {} overlap entries ({} local, {} remote ranks, {} requesting ranks)",
            rank,
            overlap_indices.len(),
            local_pairs.len(),
            receives.len(),
            sends.len()
        );

        Self {
            comm,
            partitioner,
            overlap_size: overlap_indices.len(),
            local_pairs,
            receives,
            sends,
        }
    }

    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    /// Length of the overlap vectors this scatter operates on.
    pub fn overlap_size(&self) -> usize {
        self.overlap_size
    }

    fn check_global(&self, global: &DistributedVector) {
        assert_eq!(
            global.partitioner(),
            &self.partitioner,
            "vector partitioning does not match the scatter"
        );
        assert_eq!(global.rank(), self.comm.rank(), "vector belongs to another rank");
    }

    /// Starts copying the overlap entries out of the distributed vector.
    pub fn global_to_overlap_start(&self, global: &DistributedVector) -> ScatterRequest {
        self.check_global(global);
        let tag = self.comm.next_tag();
        let owned = global.local_values();
        for (destination, offsets) in &self.sends {
            let values: Vec<f64> = offsets.iter().map(|&offset| owned[offset]).collect();
            self.comm.send(*destination, tag, values);
        }
        ScatterRequest {
            tag,
            direction: Direction::GlobalToOverlap,
            local_values: self
                .local_pairs
                .iter()
                .map(|&(_, offset)| owned[offset])
                .collect(),
        }
    }

    /// Completes the copy. Every entry of `overlap` is overwritten. Blocks until the values
    /// from all other ranks have arrived.
    pub fn global_to_overlap_finish(&self, request: ScatterRequest, overlap: &mut [f64]) {
        assert_eq!(
            request.direction,
            Direction::GlobalToOverlap,
            "request was started in the other direction"
        );
        assert_eq!(overlap.len(), self.overlap_size, "overlap vector has the wrong length");
        for (&(overlap_index, _), &value) in self.local_pairs.iter().zip(&request.local_values) {
            overlap[overlap_index] = value;
        }
        for (source, overlap_entries) in &self.receives {
            let values: Vec<f64> = self.comm.receive(*source, request.tag);
            assert_eq!(values.len(), overlap_entries.len());
            for (&overlap_index, value) in overlap_entries.iter().zip(values) {
                overlap[overlap_index] = value;
            }
        }
    }

    /// Starts sending the overlap entries back to their owners.
    pub fn overlap_to_global_start(&self, overlap: &[f64], operation: VectorOperation) -> ScatterRequest {
        assert_eq!(overlap.len(), self.overlap_size, "overlap vector has the wrong length");
        let tag = self.comm.next_tag();
        for (destination, overlap_entries) in &self.receives {
            let values: Vec<f64> = overlap_entries.iter().map(|&k| overlap[k]).collect();
            self.comm.send(*destination, tag, values);
        }
        ScatterRequest {
            tag,
            direction: Direction::OverlapToGlobal(operation),
            local_values: self.local_pairs.iter().map(|&(k, _)| overlap[k]).collect(),
        }
    }

    /// Completes the reduction into `global`, combining with the operation given at start.
    ///
    /// Local contributions are applied first, then those of other ranks in increasing rank
    /// order. Blocks until the values from all other ranks have arrived.
    pub fn overlap_to_global_finish(&self, request: ScatterRequest, global: &mut DistributedVector) {
        let operation = match request.direction {
            Direction::OverlapToGlobal(operation) => operation,
            Direction::GlobalToOverlap => panic!("request was started in the other direction"),
        };
        self.check_global(global);
        let owned = global.local_values_mut();
        let combine = |target: &mut f64, value: f64| match operation {
            VectorOperation::Add => *target += value,
            VectorOperation::Insert => *target = value,
        };
        for (&(_, offset), &value) in self.local_pairs.iter().zip(&request.local_values) {
            combine(&mut owned[offset], value);
        }
        for (source, offsets) in &self.sends {
            let values: Vec<f64> = self.comm.receive(*source, request.tag);
            assert_eq!(values.len(), offsets.len());
            for (&offset, value) in offsets.iter().zip(values) {
                combine(&mut owned[offset], value);
            }
        }
    }

    /// Blocking convenience for `global_to_overlap_start` followed by `global_to_overlap_finish`.
    pub fn global_to_overlap(&self, global: &DistributedVector, overlap: &mut [f64]) {
        let request = self.global_to_overlap_start(global);
        self.global_to_overlap_finish(request, overlap);
    }
}
