use fenris_immersed::element::ReferenceCell;
use fenris_immersed::quadrature::{
    family_for_reference_cells, gauss, DensityKind, GaussFamily, Quadrature, QuadratureFamily, QuadratureTable,
    SimplexFamily,
};
use fenris_immersed::Error;
use nalgebra::{U1, U2, U3};
use proptest::prelude::*;

#[test]
fn gauss_family_index_follows_point_density() {
    let family = GaussFamily::<U2>::new(ReferenceCell::Quadrilateral, 2, 2.0).unwrap();
    // 2 * 1.0 / 0.125 = 16 points per direction are needed
    assert_eq!(family.get_index(0.125, 1.0), 14);
    // Coarse grids get the coarsest rule
    assert_eq!(family.get_index(1.0, 0.1), 0);
    assert_eq!(family.get_index(1.0, 1.0), 0);
    // Indices are capped by the table entry type
    assert_eq!(family.get_index(1e-6, 1.0), u8::MAX);

    let rule = family.quadrature(3);
    assert_eq!(rule.num_points(), 25);
    assert!((rule.weights().iter().sum::<f64>() - 4.0).abs() < 1e-12);
}

#[test]
fn simplex_family_selects_finest_rule_on_fine_grids() {
    for kind in [DensityKind::Average, DensityKind::Minimum] {
        let family = SimplexFamily::<U2>::new(ReferenceCell::Triangle, 2, 2.0, kind).unwrap();
        let finest = (family.num_rules() - 1) as u8;
        assert_eq!(family.get_index(1e-6, 1.0), finest);
        assert_eq!(family.get_index(10.0, 1.0), 0);
        assert!(family.spacings().windows(2).all(|w| w[1] <= w[0]));

        let rule = family.quadrature(finest);
        assert!((rule.weights().iter().sum::<f64>() - ReferenceCell::Triangle.measure()).abs() < 1e-12);
    }

    let family = SimplexFamily::<U3>::new(ReferenceCell::Tetrahedron, 2, 2.0, DensityKind::Average).unwrap();
    assert_eq!(family.num_rules(), 9);
}

#[test]
fn family_selection_requires_single_reference_cell() {
    let family = family_for_reference_cells::<U2>(&[ReferenceCell::Quadrilateral], 2, 2.0, DensityKind::Average)
        .unwrap();
    assert_eq!(family.reference_cell(), ReferenceCell::Quadrilateral);
    let family =
        family_for_reference_cells::<U3>(&[ReferenceCell::Tetrahedron], 2, 2.0, DensityKind::Minimum).unwrap();
    assert_eq!(family.reference_cell(), ReferenceCell::Tetrahedron);

    assert_eq!(
        family_for_reference_cells::<U2>(&[], 2, 2.0, DensityKind::Average).unwrap_err(),
        Error::EmptyMesh
    );
    assert_eq!(
        family_for_reference_cells::<U2>(&[ReferenceCell::Segment], 2, 2.0, DensityKind::Average).unwrap_err(),
        Error::CellDimensionMismatch {
            cell: ReferenceCell::Segment,
            expected: 2
        }
    );
    let family = family_for_reference_cells::<U1>(&[ReferenceCell::Segment], 2, 2.0, DensityKind::Average).unwrap();
    assert_eq!(family.reference_cell(), ReferenceCell::Segment);
    // 2 * 0.5 / 0.125 = 8 points are needed
    assert_eq!(family.get_index(0.125, 0.5), 6);
    assert_eq!(family.quadrature(6).num_points(), 8);

    let mixed = [ReferenceCell::Quadrilateral, ReferenceCell::Triangle];
    assert_eq!(
        family_for_reference_cells::<U2>(&mixed, 2, 2.0, DensityKind::Average).unwrap_err(),
        Error::MixedReferenceCells(mixed.to_vec())
    );
}

#[test]
fn invalid_family_parameters_are_rejected() {
    assert!(matches!(
        GaussFamily::<U2>::new(ReferenceCell::Quadrilateral, 0, 2.0),
        Err(Error::InvalidParameter { name: "min_points_1d", .. })
    ));
    assert!(matches!(
        GaussFamily::<U2>::new(ReferenceCell::Quadrilateral, 2, -1.0),
        Err(Error::InvalidParameter { name: "point_density", .. })
    ));
    assert!(matches!(
        GaussFamily::<U2>::new(ReferenceCell::Triangle, 2, 2.0),
        Err(Error::InvalidParameter { name: "cell", .. })
    ));
    assert!(matches!(
        SimplexFamily::<U2>::new(ReferenceCell::Triangle, 17, 2.0, DensityKind::Average),
        Err(Error::InvalidParameter { name: "min_points_1d", .. })
    ));
}

#[test]
fn quadrature_table_deduplicates_rules() {
    let family = GaussFamily::<U2>::new(ReferenceCell::Quadrilateral, 2, 2.0).unwrap();
    let table = QuadratureTable::from_family_indices(&family, &[3, 0, 3, 1]);
    assert_eq!(table.num_cells(), 4);
    assert_eq!(table.rules().len(), 3);
    assert_eq!(table.family_index(0), 3);
    assert_eq!(table.family_index(3), 1);
    assert_eq!(table.rule_index(0), table.rule_index(2));
    assert_eq!(table.num_points(0), 25);
    assert_eq!(table.total_num_points(), 25 + 4 + 25 + 9);
}

#[test]
fn gauss_rules_integrate_polynomials_on_reference_cells() {
    // x^2 y^2 over [-1, 1]^2
    let rule = gauss::<U2>(ReferenceCell::Quadrilateral, 2);
    assert!((rule.integrate(|p| p.x * p.x * p.y * p.y) - 4.0 / 9.0).abs() < 1e-12);
    // x over the reference triangle with vertices (-1, -1), (1, -1), (-1, 1)
    let rule = gauss::<U2>(ReferenceCell::Triangle, 2);
    assert!((rule.integrate(|p| p.x) + 2.0 / 3.0).abs() < 1e-12);
    // x^4 over [-1, 1]
    let rule = gauss::<U1>(ReferenceCell::Segment, 3);
    assert_eq!(rule.num_points(), 3);
    assert!((rule.integrate(|p| p.x.powi(4)) - 2.0 / 5.0).abs() < 1e-12);
}

proptest! {
    #[test]
    fn gauss_index_is_monotone_in_grid_spacing(
        lagrangian_length in 0.01..10.0f64,
        h1 in 1e-3..10.0f64,
        h2 in 1e-3..10.0f64,
        min_points_1d in 1..5usize,
        point_density in 0.5..4.0f64,
    ) {
        let family = GaussFamily::<U2>::new(ReferenceCell::Quadrilateral, min_points_1d, point_density).unwrap();
        let (coarse, fine) = if h1 >= h2 { (h1, h2) } else { (h2, h1) };
        prop_assert!(family.get_index(coarse, lagrangian_length) <= family.get_index(fine, lagrangian_length));
    }

    #[test]
    fn simplex_index_is_monotone_in_grid_spacing(
        lagrangian_length in 0.01..10.0f64,
        h1 in 1e-3..10.0f64,
        h2 in 1e-3..10.0f64,
        minimum in any::<bool>(),
    ) {
        let kind = if minimum { DensityKind::Minimum } else { DensityKind::Average };
        let family = SimplexFamily::<U2>::new(ReferenceCell::Triangle, 2, 2.0, kind).unwrap();
        let (coarse, fine) = if h1 >= h2 { (h1, h2) } else { (h2, h1) };
        prop_assert!(family.get_index(coarse, lagrangian_length) <= family.get_index(fine, lagrangian_length));
    }
}
