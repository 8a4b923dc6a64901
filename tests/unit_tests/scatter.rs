use fenris_immersed::comm::{serial_communicator, LocalWorld};
use fenris_immersed::partition::{DistributedVector, Partitioner};
use fenris_immersed::scatter::{Scatter, VectorOperation};

#[test]
fn serial_round_trip_is_exact() {
    let comm = serial_communicator();
    let partitioner = Partitioner::uniform(7, 1);
    let global = DistributedVector::from_global_fn(partitioner.clone(), 0, |i| 0.1 * i as f64 + 1.0 / 3.0);
    let scatter = Scatter::new(comm, partitioner.clone(), &[6, 2, 4]);
    assert_eq!(scatter.overlap_size(), 3);

    let mut overlap = vec![0.0; 3];
    scatter.global_to_overlap(&global, &mut overlap);
    assert_eq!(overlap, vec![global.get(6), global.get(2), global.get(4)]);

    let mut result = global.clone();
    let request = scatter.overlap_to_global_start(&overlap, VectorOperation::Insert);
    scatter.overlap_to_global_finish(request, &mut result);
    assert_eq!(result.local_values(), global.local_values());
}

#[test]
fn shared_entries_are_added_by_every_rank() {
    let results = LocalWorld::run(3, |comm| {
        let partitioner = Partitioner::uniform(6, comm.size());
        let rank = comm.rank();
        // Every rank touches entry 0, and the entries of its right neighbor
        let next = (rank + 1) % comm.size();
        let mut overlap_indices = vec![0];
        overlap_indices.extend(partitioner.owned_range(next));
        let scatter = Scatter::new(comm.clone(), partitioner.clone(), &overlap_indices);

        let overlap = vec![1.0; overlap_indices.len()];
        let mut global = DistributedVector::zeros(partitioner, rank);
        let request = scatter.overlap_to_global_start(&overlap, VectorOperation::Add);
        scatter.overlap_to_global_finish(request, &mut global);
        global.to_global_vec(comm.as_ref())
    });

    for global in results {
        assert_eq!(global, vec![4.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }
}

#[test]
fn global_values_reach_every_rank() {
    LocalWorld::run(3, |comm| {
        let partitioner = Partitioner::uniform(10, comm.size());
        let global = DistributedVector::from_global_fn(partitioner.clone(), comm.rank(), |i| (i * i) as f64);
        let overlap_indices: Vec<usize> = (0..10).rev().step_by(comm.rank() + 1).collect();
        let scatter = Scatter::new(comm.clone(), partitioner, &overlap_indices);

        let mut overlap = vec![f64::NAN; overlap_indices.len()];
        scatter.global_to_overlap(&global, &mut overlap);
        let expected: Vec<f64> = overlap_indices.iter().map(|&i| (i * i) as f64).collect();
        assert_eq!(overlap, expected);
    });
}

#[test]
fn insert_overwrites_owned_values() {
    LocalWorld::run(2, |comm| {
        let partitioner = Partitioner::uniform(4, comm.size());
        // Rank 0 writes the entries of rank 1 and vice versa
        let overlap_indices: Vec<usize> = partitioner.owned_range(1 - comm.rank()).collect();
        let scatter = Scatter::new(comm.clone(), partitioner.clone(), &overlap_indices);

        let overlap = vec![comm.rank() as f64 + 10.0; overlap_indices.len()];
        let mut global = DistributedVector::from_global_fn(partitioner, comm.rank(), |_| -1.0);
        let request = scatter.overlap_to_global_start(&overlap, VectorOperation::Insert);
        scatter.overlap_to_global_finish(request, &mut global);
        assert_eq!(global.to_global_vec(comm.as_ref()), vec![11.0, 11.0, 10.0, 10.0]);
    });
}

#[test]
fn several_scatters_can_be_in_flight() {
    LocalWorld::run(2, |comm| {
        let rank = comm.rank();
        let partitioner = Partitioner::uniform(4, comm.size());
        let first = Scatter::new(comm.clone(), partitioner.clone(), &[0, 1, 2, 3]);
        let second = Scatter::new(comm.clone(), partitioner.clone(), &[3, 2]);

        let a = DistributedVector::from_global_fn(partitioner.clone(), rank, |i| i as f64);
        let b = DistributedVector::from_global_fn(partitioner, rank, |i| 100.0 + i as f64);
        let request_a = first.global_to_overlap_start(&a);
        let request_b = second.global_to_overlap_start(&b);

        // Finish in the opposite order of starting
        let mut overlap_b = vec![0.0; 2];
        second.global_to_overlap_finish(request_b, &mut overlap_b);
        let mut overlap_a = vec![0.0; 4];
        first.global_to_overlap_finish(request_a, &mut overlap_a);

        assert_eq!(overlap_a, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(overlap_b, vec![103.0, 102.0]);
    });
}

#[test]
fn repeated_scatters_are_bit_identical() {
    for num_ranks in 1..=3 {
        LocalWorld::run(num_ranks, |comm| {
            let rank = comm.rank();
            let partitioner = Partitioner::uniform(11, comm.size());
            let global = DistributedVector::from_global_fn(partitioner.clone(), rank, |i| (i as f64 + 0.1).ln() / 3.0);
            // Overlapping, unordered and repeated indices, different on every rank
            let overlap_indices: Vec<usize> = (0..11).map(|i| (7 * i + 3 * rank) % 11).chain([5, 5]).collect();
            let scatter = Scatter::new(comm.clone(), partitioner, &overlap_indices);

            let mut first = vec![f64::NAN; overlap_indices.len()];
            scatter.global_to_overlap(&global, &mut first);
            let mut second = vec![-1.0; overlap_indices.len()];
            scatter.global_to_overlap(&global, &mut second);

            let bits = |values: &[f64]| values.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
            assert_eq!(bits(&first), bits(&second));
            let expected: Vec<f64> = overlap_indices
                .iter()
                .map(|&i| (i as f64 + 0.1).ln() / 3.0)
                .collect();
            assert_eq!(bits(&first), bits(&expected));
        });
    }
}
