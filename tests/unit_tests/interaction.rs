use crate::{centered_square_mesh, fill_with, partitioned, unit_square_level, H};
use fenris_immersed::comm::{serial_communicator, Communicator, LocalWorld};
use fenris_immersed::element::ReferenceCell;
use fenris_immersed::grid::PatchLevel;
use fenris_immersed::interaction::{ElementalInteraction, Interaction, NodalInteraction, Operation, TransactionState};
use fenris_immersed::kernel::KernelKind;
use fenris_immersed::mesh::procedural::{create_polyline_mesh, create_rectangular_uniform_quad_mesh_2d};
use fenris_immersed::mesh::{CellConnectivity, DofHandler, Mesh, PartitionedMesh};
use fenris_immersed::partition::DistributedVector;
use fenris_immersed::quadrature::{DensityKind, GaussFamily, QuadratureFamily};
use fenris_immersed::scatter::VectorOperation;
use fenris_immersed::Error;
use nalgebra::{Point2, Rotation2, Vector2, U1, U2};
use std::sync::Arc;
use util::{assert_approx_eq, assert_panics_with};

const KERNEL: KernelKind = KernelKind::BSpline3;

/// A structural part on the unit square level, with positions and a scalar field layout.
struct Setup {
    level: PatchLevel<U2>,
    pmesh: PartitionedMesh<U2>,
    position_dofs: DofHandler,
    position: DistributedVector,
    scalar_dofs: DofHandler,
}

impl Setup {
    fn new(comm: &Arc<dyn Communicator>, mesh: Mesh<U2>) -> Self {
        let level = unit_square_level(comm.clone());
        let pmesh = partitioned(comm, mesh);
        let position_dofs = DofHandler::new(&pmesh, 2);
        let position = pmesh.reference_positions(&position_dofs);
        let scalar_dofs = DofHandler::new(&pmesh, 1);
        Self {
            level,
            pmesh,
            position_dofs,
            position,
            scalar_dofs,
        }
    }

    fn reinit(&self, engine: &mut dyn Interaction<U2>) {
        engine
            .reinit(&self.pmesh, &self.position_dofs, &self.position, &self.level)
            .unwrap();
        engine.add_dof_handler(&self.scalar_dofs).unwrap();
    }

    fn elemental(&self, comm: &Arc<dyn Communicator>) -> ElementalInteraction<U2> {
        let mut engine = ElementalInteraction::<U2>::new(comm.clone(), 2, 2.0, DensityKind::Average);
        self.reinit(&mut engine);
        engine
    }

    fn scalar_vector(&self, f: impl FnMut(usize) -> f64) -> DistributedVector {
        DistributedVector::from_global_fn(self.scalar_dofs.partitioner().clone(), self.pmesh.rank(), f)
    }

    /// Runs a full projection of the scalar grid field `f`.
    fn project(
        &mut self,
        engine: &dyn Interaction<U2>,
        f: impl Fn(&Point2<f64>) -> f64,
        operation: VectorOperation,
    ) -> DistributedVector {
        let u = self.level.allocate_data(1, 3);
        fill_with(&mut self.level, u, 0, f);
        let mut output = self.scalar_vector(|_| f64::NAN);
        let mut transaction = engine
            .compute_projection_rhs_start(
                KERNEL,
                u,
                &self.level,
                &self.scalar_dofs,
                &self.position,
                &mut output,
                operation,
            )
            .unwrap();
        assert_eq!(transaction.state(), TransactionState::Intermediate);
        assert_eq!(transaction.operation(), Operation::Interpolation);
        assert_eq!(transaction.combine_operation(), Some(operation));
        assert!(transaction.overlap_values().is_empty());
        engine.compute_projection_rhs_intermediate(&mut transaction, &self.level);
        assert_eq!(transaction.state(), TransactionState::Finish);
        let overlap_mesh = engine.base().overlap_mesh();
        assert_eq!(transaction.overlap_position().len(), 2 * overlap_mesh.num_nodes());
        assert_eq!(transaction.overlap_values().len(), overlap_mesh.num_nodes());
        engine.compute_projection_rhs_finish(transaction);
        self.level.deallocate_data(u).unwrap();
        output
    }

    /// Spreads the scalar field and returns the grid mass after accumulating ghost values.
    fn spread_mass(&mut self, engine: &dyn Interaction<U2>, field: &DistributedVector) -> f64 {
        let f = self.level.allocate_data(1, 3);
        let mut transaction = engine
            .compute_spread_start(KERNEL, f, &self.level, &self.scalar_dofs, &self.position, field)
            .unwrap();
        engine.compute_spread_intermediate(&mut transaction, &mut self.level);
        engine.compute_spread_finish(transaction);
        self.level.accumulate_ghost_data(f).unwrap();
        let mass = self.level.interior_sum(f, 0).unwrap() * H * H;
        self.level.deallocate_data(f).unwrap();
        mass
    }

    fn workload(&mut self, engine: &dyn Interaction<U2>) -> f64 {
        let w = self.level.allocate_data(1, 0);
        let mut transaction = engine.add_workload_start(w, &self.level, &self.position).unwrap();
        engine.add_workload_intermediate(&mut transaction, &mut self.level);
        engine.add_workload_finish(transaction);
        self.level.interior_sum(w, 0).unwrap()
    }
}

#[test]
fn projection_of_constant_onto_single_cell() {
    let comm = serial_communicator();
    let mut setup = Setup::new(&comm, centered_square_mesh(1));
    let engine = setup.elemental(&comm);

    // The longest edge is 0.5, so 2 * 0.5 / H = 32 points per direction are needed
    let family = GaussFamily::<U2>::new(ReferenceCell::Quadrilateral, 2, 2.0).unwrap();
    assert_eq!(family.get_index(H, 0.5), 30);
    assert_eq!(engine.quadrature_table().family_index(0), 30);
    assert_eq!(engine.quadrature_table().num_points(0), 32 * 32);
    assert_eq!(engine.base().eulerian_length(), H);
    assert!(!engine.projection_is_interpolation());
    assert_eq!(engine.rhs_scatter_operation(), VectorOperation::Add);

    // Each basis function integrates to a quarter of the cell area
    let rhs = setup.project(&engine, |_| 5.0, VectorOperation::Add);
    for &value in rhs.local_values() {
        assert_approx_eq!(value, 0.3125, abstol = 1e-12);
    }
}

#[test]
fn projection_onto_rotated_cell() {
    let comm = serial_communicator();
    let mut mesh = centered_square_mesh(1);
    let rotation = Rotation2::new(0.3);
    let center = Point2::new(0.5, 0.5);
    mesh.transform_vertices(|v| *v = center + rotation * (*v - center));
    let mut setup = Setup::new(&comm, mesh);
    let engine = setup.elemental(&comm);

    let rhs = setup.project(&engine, |_| 5.0, VectorOperation::Add);
    for &value in rhs.local_values() {
        assert_approx_eq!(value, 0.3125, abstol = 1e-12);
    }
}

#[test]
fn projection_integrates_over_reference_configuration() {
    let comm = serial_communicator();
    let mut setup = Setup::new(&comm, centered_square_mesh(2));
    // Translate the structure without changing its reference configuration
    let displacement = Vector2::new(0.05, -0.02);
    let nc = setup.position_dofs.n_components();
    setup.position = DistributedVector::from_global_fn(setup.position_dofs.partitioner().clone(), 0, |dof| {
        setup.pmesh.mesh().vertices()[dof / nc][dof % nc] + displacement[dof % nc]
    });
    let engine = setup.elemental(&comm);

    // Linear fields are reproduced exactly by the kernel: the sum is the reference integral of
    // the field evaluated at the displaced points
    let rhs = setup.project(&engine, |p| p.x, VectorOperation::Add);
    assert_approx_eq!(rhs.sum(comm.as_ref()), 0.25 * (0.5 + 0.05), abstol = 1e-12);
}

#[test]
fn projection_and_spreading_conserve_on_several_ranks() {
    let family = GaussFamily::<U2>::new(ReferenceCell::Quadrilateral, 2, 2.0).unwrap();
    let points_per_cell = (2 + usize::from(family.get_index(H, 0.125))).pow(2);

    for num_ranks in [1, 2, 3] {
        LocalWorld::run(num_ranks, |comm| {
            let mut setup = Setup::new(&comm, centered_square_mesh(4));
            let engine = setup.elemental(&comm);

            let rhs = setup.project(&engine, |_| 2.0, VectorOperation::Add);
            assert_approx_eq!(rhs.sum(comm.as_ref()), 2.0 * 0.25, abstol = 1e-12);

            let ones = setup.scalar_vector(|_| 1.0);
            assert_approx_eq!(setup.spread_mass(&engine, &ones), 0.25, abstol = 1e-12);

            // Every quadrature point is counted by exactly one patch
            assert_eq!(setup.workload(&engine), (16 * points_per_cell) as f64);
        });
    }
}

#[test]
fn inserting_overlap_contributions_loses_shared_values() {
    LocalWorld::run(2, |comm| {
        let mut setup = Setup::new(&comm, centered_square_mesh(4));
        let engine = setup.elemental(&comm);
        let rhs = setup.project(&engine, |_| 2.0, VectorOperation::Insert);
        assert!((rhs.sum(comm.as_ref()) - 0.5).abs() > 1e-6);
    });
}

#[test]
fn spreading_is_adjoint_to_projection() {
    let comm = serial_communicator();
    let mut setup = Setup::new(&comm, centered_square_mesh(3).split_into_triangles());
    let nc = setup.position_dofs.n_components();
    setup.position = DistributedVector::from_global_fn(setup.position_dofs.partitioner().clone(), 0, |dof| {
        let x = setup.pmesh.mesh().vertices()[dof / nc];
        // A small shear
        if dof % nc == 0 {
            x.x + 0.1 * (x.y - 0.5)
        } else {
            x.y
        }
    });
    let engine = setup.elemental(&comm);
    assert_eq!(
        engine.quadrature_family().map(|family| family.reference_cell()),
        Some(ReferenceCell::Triangle)
    );

    let u = |p: &Point2<f64>| (4.0 * p.x).sin() * p.y + 1.0;
    let field = setup.scalar_vector(|node| 1.0 + 0.1 * node as f64);
    let rhs = setup.project(&engine, u, VectorOperation::Add);
    let structural: f64 = rhs
        .local_values()
        .iter()
        .zip(field.local_values())
        .map(|(r, f)| r * f)
        .sum();

    let f = setup.level.allocate_data(1, 3);
    let mut transaction = engine
        .compute_spread_start(KERNEL, f, &setup.level, &setup.scalar_dofs, &setup.position, &field)
        .unwrap();
    engine.compute_spread_intermediate(&mut transaction, &mut setup.level);
    engine.compute_spread_finish(transaction);
    setup.level.accumulate_ghost_data(f).unwrap();

    let geometry = setup.level.geometry().clone();
    let mut eulerian = 0.0;
    for patch in setup.level.patches() {
        let data = patch.data(f).unwrap();
        for cell in patch.cell_box().iter() {
            eulerian += data.get(&cell, 0) * u(&geometry.cell_center(&cell)) * geometry.cell_volume();
        }
    }
    assert_approx_eq!(eulerian, structural, abstol = 1e-12);
}

#[test]
fn transactions_must_follow_the_protocol() {
    let comm = serial_communicator();
    let mut setup = Setup::new(&comm, centered_square_mesh(1));
    let engine = setup.elemental(&comm);
    let other = setup.elemental(&comm);
    let u = setup.level.allocate_data(1, 3);
    let mut output = setup.scalar_vector(|_| 0.0);

    let transaction = engine
        .compute_projection_rhs_start(
            KERNEL,
            u,
            &setup.level,
            &setup.scalar_dofs,
            &setup.position,
            &mut output,
            VectorOperation::Add,
        )
        .unwrap();
    assert_panics_with!(
        engine.compute_projection_rhs_finish(transaction),
        "expected a Interpolation transaction in state Finish, but got a Interpolation transaction in state Intermediate"
    );

    let mut transaction = engine.add_workload_start(u, &setup.level, &setup.position).unwrap();
    assert_panics_with!(
        engine.compute_spread_intermediate(&mut transaction, &mut setup.level),
        "expected a Spreading transaction in state Intermediate, but got a Workload transaction"
    );

    let mut transaction = engine.add_workload_start(u, &setup.level, &setup.position).unwrap();
    assert_panics_with!(
        other.add_workload_intermediate(&mut transaction, &mut setup.level),
        "created by another interaction"
    );
}

#[test]
fn invalid_arguments_are_reported_at_start() {
    let comm = serial_communicator();
    let mut setup = Setup::new(&comm, centered_square_mesh(2));

    let mut engine = ElementalInteraction::<U2>::new(comm.clone(), 2, 2.0, DensityKind::Average);
    assert_eq!(
        engine.add_dof_handler(&setup.scalar_dofs),
        Err(Error::UnregisteredDofHandler { n_components: 1 })
    );
    setup.reinit(&mut engine);

    let field = setup.scalar_vector(|_| 1.0);
    let narrow = setup.level.allocate_data(1, 1);
    let result = engine.compute_spread_start(KERNEL, narrow, &setup.level, &setup.scalar_dofs, &setup.position, &field);
    assert_eq!(
        result.err(),
        Some(Error::InsufficientGhostWidth {
            kernel: KERNEL,
            required: 2,
            available: 1,
        })
    );

    let deep = setup.level.allocate_data(2, 3);
    let result = engine.compute_spread_start(KERNEL, deep, &setup.level, &setup.scalar_dofs, &setup.position, &field);
    assert!(matches!(
        result,
        Err(Error::SizeMismatch {
            what: "grid data depth",
            expected: 1,
            actual: 2
        })
    ));

    let vector_dofs = DofHandler::new(&setup.pmesh, 3);
    let vector_field = DistributedVector::zeros(vector_dofs.partitioner().clone(), 0);
    let data = setup.level.allocate_data(3, 3);
    let result = engine.compute_spread_start(KERNEL, data, &setup.level, &vector_dofs, &setup.position, &vector_field);
    assert_eq!(result.err(), Some(Error::UnregisteredDofHandler { n_components: 3 }));

    let result = engine.add_workload_start(data, &setup.level, &field);
    assert!(matches!(result, Err(Error::SizeMismatch { what: "position vector", .. })));
}

#[test]
fn nodal_engine_interpolates_and_spreads_at_nodes() {
    LocalWorld::run(2, |comm| {
        let mut setup = Setup::new(&comm, centered_square_mesh(4));
        let mut engine = NodalInteraction::new(comm.clone());
        setup.reinit(&mut engine);
        assert!(engine.projection_is_interpolation());

        let values = setup.project(&engine, |p| 5.0 + p.x - 2.0 * p.y, VectorOperation::Add);
        let vertices = setup.pmesh.mesh().vertices().to_vec();
        for node in values.owned_range() {
            let x = vertices[node];
            assert_approx_eq!(values.get(node), 5.0 + x.x - 2.0 * x.y, abstol = 1e-12);
        }

        let ones = setup.scalar_vector(|_| 1.0);
        assert_approx_eq!(setup.spread_mass(&engine, &ones), 25.0, abstol = 1e-10);
        assert_eq!(setup.workload(&engine), 25.0);
    });
}

#[test]
fn nodes_on_upper_domain_boundary_are_attributed() {
    // The mesh covers [0.5, 1]^2, so 9 of its nodes lie on the faces x = 1 or y = 1
    let mesh = create_rectangular_uniform_quad_mesh_2d(0.125, 4, 4, &Vector2::new(0.5, 0.5));
    LocalWorld::run(2, |comm| {
        let mut setup = Setup::new(&comm, mesh.clone());
        let mut engine = NodalInteraction::new(comm.clone());
        setup.reinit(&mut engine);

        let values = setup.project(&engine, |_| 5.0, VectorOperation::Add);
        for node in values.owned_range() {
            assert_approx_eq!(values.get(node), 5.0, abstol = 1e-12);
        }
        assert_eq!(setup.workload(&engine), 25.0);
    });
}

/// The closed outline of `[0.25, 0.75]^2`, with perimeter 2.
fn square_outline() -> Mesh<U2> {
    let corners = vec![
        Point2::new(0.25, 0.25),
        Point2::new(0.75, 0.25),
        Point2::new(0.75, 0.75),
        Point2::new(0.25, 0.75),
    ];
    create_polyline_mesh(corners, true)
}

#[test]
fn line_segments_interact_with_a_2d_grid() {
    LocalWorld::run(2, |comm| {
        let mut setup = Setup::new(&comm, square_outline());
        let mut engine = ElementalInteraction::<U2, U1>::new(comm.clone(), 2, 2.0, DensityKind::Average);
        setup.reinit(&mut engine);
        // Segments of length 0.5 need 2 * 0.5 / H = 32 points each
        for cell in 0..engine.quadrature_table().num_cells() {
            assert_eq!(engine.quadrature_table().num_points(cell), 32);
        }

        // Every corner touches two segments, on each of which its basis function integrates to
        // half the segment length
        let rhs = setup.project(&engine, |_| 5.0, VectorOperation::Add);
        for &value in rhs.local_values() {
            assert_approx_eq!(value, 2.5, abstol = 1e-12);
        }

        let ones = setup.scalar_vector(|_| 1.0);
        assert_approx_eq!(setup.spread_mass(&engine, &ones), 2.0, abstol = 1e-10);
        assert_eq!(setup.workload(&engine), 4.0 * 32.0);
    });
}

#[test]
fn reference_dimension_must_match_the_cells() {
    let comm = serial_communicator();
    let setup = Setup::new(&comm, square_outline());
    let mut engine = ElementalInteraction::<U2>::new(comm.clone(), 2, 2.0, DensityKind::Average);
    let result = engine.reinit(&setup.pmesh, &setup.position_dofs, &setup.position, &setup.level);
    assert_eq!(
        result,
        Err(Error::CellDimensionMismatch {
            cell: ReferenceCell::Segment,
            expected: 2
        })
    );
}

#[test]
fn workload_of_separated_cells_stays_in_their_patches() {
    // Two cells of size 0.15 in the patches around (0.125, 0.125) and (0.625, 0.875)
    let square = |x: f64, y: f64| {
        [(0.0, 0.0), (0.15, 0.0), (0.15, 0.15), (0.0, 0.15)]
            .map(|(dx, dy)| Point2::new(x + dx, y + dy))
    };
    let vertices = [square(0.05, 0.05), square(0.55, 0.8)].concat();
    let cells = vec![
        CellConnectivity::new(ReferenceCell::Quadrilateral, vec![0, 1, 2, 3]),
        CellConnectivity::new(ReferenceCell::Quadrilateral, vec![4, 5, 6, 7]),
    ];
    let mesh = Mesh::from_vertices_and_cells(vertices, cells);
    let centers = [Point2::new(0.125, 0.125), Point2::new(0.625, 0.875)];

    // Each cell needs ceil(2 * 0.15 / H) = 10 points per direction
    for (points_per_cell, nodal) in [(100.0, false), (4.0, true)] {
        LocalWorld::run(2, |comm| {
            let mut setup = Setup::new(&comm, mesh.clone());
            let engine: Box<dyn Interaction<U2>> = if nodal {
                let mut engine = NodalInteraction::new(comm.clone());
                setup.reinit(&mut engine);
                Box::new(engine)
            } else {
                Box::new(setup.elemental(&comm))
            };

            let w = setup.level.allocate_data(1, 0);
            let mut transaction = engine.add_workload_start(w, &setup.level, &setup.position).unwrap();
            engine.add_workload_intermediate(&mut transaction, &mut setup.level);
            engine.add_workload_finish(transaction);

            for patch in setup.level.patches() {
                let data = patch.data(w).unwrap();
                let count: f64 = patch.cell_box().iter().map(|cell| data.get(&cell, 0)).sum();
                let expected = if centers.iter().any(|c| patch.bounding_box().contains_point(c)) {
                    points_per_cell
                } else {
                    0.0
                };
                assert_eq!(count, expected);
            }
            assert_eq!(setup.level.interior_sum(w, 0).unwrap(), 2.0 * points_per_cell);
        });
    }
}
