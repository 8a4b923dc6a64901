use fenris_immersed::element::{longest_edge_length, LinearElement, ReferenceCell};
use fenris_immersed::mesh::procedural::create_circle_polyline_2d;
use fenris_immersed::mesh::Mesh;
use matrixcompare::assert_matrix_eq;
use nalgebra::{Matrix2, Matrix3, Point1, Point2, Point3, Rotation2, Vector2, U1, U2};

#[test]
fn jacobian_of_rotated_square() {
    let rotation = Rotation2::new(0.7);
    let vertices: Vec<_> = [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]
        .iter()
        .map(|&[x, y]| Point2::from(rotation * Point2::new(x, y).coords))
        .collect();
    let element = LinearElement::new(ReferenceCell::Quadrilateral, &vertices);

    let jacobian = element.reference_jacobian(&Point2::new(0.3, -0.6));
    assert_matrix_eq!(jacobian, *rotation.matrix(), comp = abs, tol = 1e-14);
    assert_matrix_eq!(
        element.map_reference_coords(&Point2::new(1.0, 1.0)).coords,
        vertices[2].coords,
        comp = abs,
        tol = 1e-14
    );
    assert!((longest_edge_length(ReferenceCell::Quadrilateral, &vertices) - 2.0).abs() < 1e-14);
}

#[test]
fn jacobian_of_affine_simplices() {
    let vertices = [Point2::new(1.0, 1.0), Point2::new(3.0, 1.0), Point2::new(1.0, 5.0)];
    let element = LinearElement::new(ReferenceCell::Triangle, &vertices);
    let expected = Matrix2::new(1.0, 0.0, 0.0, 2.0);
    assert_matrix_eq!(element.reference_jacobian(&Point2::new(-0.5, 0.0)), expected, comp = abs, tol = 1e-14);
    assert!((longest_edge_length(ReferenceCell::Triangle, &vertices) - 20f64.sqrt()).abs() < 1e-14);

    let vertices = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
        Point3::new(0.0, 0.0, 2.0),
    ];
    let element = LinearElement::new(ReferenceCell::Tetrahedron, &vertices);
    assert_matrix_eq!(
        element.reference_jacobian(&Point3::new(-1.0, -1.0, -1.0)),
        Matrix3::identity(),
        comp = abs,
        tol = 1e-14
    );
}

#[test]
fn codimensional_elements_measure_length_and_area() {
    let vertices = [Point2::new(1.0, 1.0), Point2::new(4.0, 5.0)];
    let segment = LinearElement::<U2, U1>::new(ReferenceCell::Segment, &vertices);
    let xi = Point1::new(0.0);
    assert_matrix_eq!(segment.map_reference_coords(&xi).coords, Vector2::new(2.5, 3.0), comp = abs, tol = 1e-14);
    assert_matrix_eq!(segment.reference_jacobian(&xi), Vector2::new(1.5, 2.0), comp = abs, tol = 1e-14);
    // Length 5 over a reference length of 2
    assert!((segment.volume_element(&xi) - 2.5).abs() < 1e-14);

    let vertices = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 2.0),
    ];
    let triangle = LinearElement::<_, U2>::new(ReferenceCell::Triangle, &vertices);
    // Area sqrt(2) over a reference area of 2
    let factor = triangle.volume_element(&Point2::new(-0.5, -0.5));
    assert!((factor - 0.5f64.sqrt()).abs() < 1e-14);

    let vertices = [
        Point2::new(0.0, 0.0),
        Point2::new(2.0, 0.0),
        Point2::new(2.0, 2.0),
        Point2::new(0.0, 2.0),
    ];
    let square = LinearElement::<U2>::new(ReferenceCell::Quadrilateral, &vertices);
    assert!((square.volume_element(&Point2::new(0.2, 0.1)) - 1.0).abs() < 1e-14);
}

#[test]
fn polyline_meshes_consist_of_segments() {
    let circle = create_circle_polyline_2d(&Point2::new(0.5, 0.5), 0.25, 16);
    assert_eq!(circle.num_cells(), 16);
    assert_eq!(circle.num_vertices(), 16);
    assert_eq!(circle.reference_cells(), vec![ReferenceCell::Segment]);
    assert_eq!(circle.connectivity()[15].vertex_indices(), &[15, 0]);

    let mesh = Mesh::try_from_vertices_and_connectivity(
        vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(1.0, 1.0)],
        vec![vec![0, 1], vec![1, 2]],
    )
    .unwrap();
    assert_eq!(mesh.reference_cells(), vec![ReferenceCell::Segment]);
}

#[test]
fn basis_is_a_partition_of_unity() {
    for cell in [
        ReferenceCell::Segment,
        ReferenceCell::Quadrilateral,
        ReferenceCell::Triangle,
        ReferenceCell::Hexahedron,
        ReferenceCell::Tetrahedron,
    ] {
        let xi = [-0.4, -0.3, -0.2];
        let mut basis = vec![0.0; cell.num_vertices()];
        cell.populate_basis(&mut basis, &xi[..cell.dim()]);
        assert!((basis.iter().sum::<f64>() - 1.0).abs() < 1e-14, "{:?}", cell);
    }
}
