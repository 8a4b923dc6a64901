//! Contiguous partitioning of global index spaces and distributed vectors.
use crate::comm::Communicator;
use std::ops::Range;

/// Assigns a contiguous range of a global index space to each rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitioner {
    offsets: Vec<usize>,
}

impl Partitioner {
    /// Splits `global_size` indices as evenly as possible among `num_ranks` ranks, with the
    /// lower ranks receiving the remainder.
    ///
    /// # Panics
    ///
    /// Panics if `num_ranks` is zero.
    pub fn uniform(global_size: usize, num_ranks: usize) -> Self {
        assert!(num_ranks > 0, "number of ranks must be positive");
        let base = global_size / num_ranks;
        let remainder = global_size % num_ranks;
        Self::from_local_sizes((0..num_ranks).map(|rank| base + usize::from(rank < remainder)))
    }

    pub fn from_local_sizes(local_sizes: impl IntoIterator<Item = usize>) -> Self {
        let mut offsets = vec![0];
        for size in local_sizes {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + size);
        }
        Self { offsets }
    }

    pub fn num_ranks(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn global_size(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    pub fn owned_range(&self, rank: usize) -> Range<usize> {
        self.offsets[rank]..self.offsets[rank + 1]
    }

    pub fn local_size(&self, rank: usize) -> usize {
        self.owned_range(rank).len()
    }

    /// The rank that owns the global index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    pub fn owner(&self, global_index: usize) -> usize {
        assert!(global_index < self.global_size(), "global index out of bounds");
        // Ranks with empty ranges share their offset with the next rank, so the owner is the
        // last rank whose offset does not exceed the index
        self.offsets.partition_point(|&offset| offset <= global_index) - 1
    }

    /// Maps each index of a uniform per-entity partitioning to `block_size` consecutive indices.
    pub fn blocked(&self, block_size: usize) -> Self {
        Self {
            offsets: self.offsets.iter().map(|&offset| offset * block_size).collect(),
        }
    }
}

/// The locally owned part of a globally indexed vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedVector {
    partitioner: Partitioner,
    rank: usize,
    values: Vec<f64>,
}

impl DistributedVector {
    pub fn zeros(partitioner: Partitioner, rank: usize) -> Self {
        let values = vec![0.0; partitioner.local_size(rank)];
        Self {
            partitioner,
            rank,
            values,
        }
    }

    /// Creates the vector whose entry with global index `i` is `f(i)`.
    pub fn from_global_fn(partitioner: Partitioner, rank: usize, f: impl FnMut(usize) -> f64) -> Self {
        let values = partitioner.owned_range(rank).map(f).collect();
        Self {
            partitioner,
            rank,
            values,
        }
    }

    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn global_size(&self) -> usize {
        self.partitioner.global_size()
    }

    pub fn owned_range(&self) -> Range<usize> {
        self.partitioner.owned_range(self.rank)
    }

    pub fn is_owned(&self, global_index: usize) -> bool {
        self.owned_range().contains(&global_index)
    }

    pub fn local_values(&self) -> &[f64] {
        &self.values
    }

    pub fn local_values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    fn local_offset(&self, global_index: usize) -> usize {
        let range = self.owned_range();
        assert!(
            range.contains(&global_index),
            "global index {} is not owned by rank {} (owned range {:?})",
            global_index,
            self.rank,
            range
        );
        global_index - range.start
    }

    /// # Panics
    ///
    /// Panics if the index is not locally owned.
    pub fn get(&self, global_index: usize) -> f64 {
        self.values[self.local_offset(global_index)]
    }

    /// # Panics
    ///
    /// Panics if the index is not locally owned.
    pub fn set(&mut self, global_index: usize, value: f64) {
        let offset = self.local_offset(global_index);
        self.values[offset] = value;
    }

    pub fn fill(&mut self, value: f64) {
        self.values.iter_mut().for_each(|v| *v = value);
    }

    /// Sum of all entries over all ranks. Collective.
    pub fn sum(&self, comm: &dyn Communicator) -> f64 {
        comm.all_reduce_sum(self.values.iter().sum())
    }

    /// Gathers the full vector on every rank. Collective.
    pub fn to_global_vec(&self, comm: &dyn Communicator) -> Vec<f64> {
        comm.all_gather(self.values.clone()).concat()
    }
}
