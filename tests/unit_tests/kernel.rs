use fenris_immersed::grid::{CellBox, CellData, GridGeometry};
use fenris_immersed::kernel::{interpolate, spread, KernelKind};
use fenris_immersed::Error;
use nalgebra::{Point2, Vector2, U2};
use proptest::prelude::*;
use util::assert_approx_eq;

fn geometry() -> GridGeometry<U2> {
    GridGeometry::new(Point2::new(-0.5, 0.25), Vector2::new(0.125, 0.0625))
}

/// Data on the cells `0..16 x 0..16` with a ghost layer wide enough for any kernel.
fn data_with(depth: usize, f: impl Fn(&Point2<f64>, usize) -> f64) -> CellData<U2> {
    let interior = CellBox::new(Vector2::zeros(), Vector2::repeat(15));
    let mut data = CellData::zeros(&interior, depth, 3);
    for cell in data.ghost_box().clone().iter() {
        for c in 0..depth {
            data.set(&cell, c, f(&geometry().cell_center(&cell), c));
        }
    }
    data
}

#[test]
fn kernel_names_parse() {
    for kernel in KernelKind::ALL {
        assert_eq!(kernel.name().parse::<KernelKind>(), Ok(kernel));
        assert_eq!(kernel.to_string(), kernel.name());
        let json = serde_json::to_string(&kernel).unwrap();
        assert_eq!(json, format!("\"{}\"", kernel.name()));
    }
    assert_eq!(
        "bspline_3".parse::<KernelKind>(),
        Err(Error::UnknownKernel("bspline_3".to_string()))
    );
}

#[test]
fn ghost_widths_cover_stencils() {
    assert_eq!(KernelKind::PiecewiseLinear.min_ghost_width(), 2);
    assert_eq!(KernelKind::BSpline3.min_ghost_width(), 2);
    assert_eq!(KernelKind::BSpline4.min_ghost_width(), 3);
    assert_eq!(KernelKind::Ib4.min_ghost_width(), 3);

    // A point in the corner cell of the interior must have its stencil inside the ghost box
    let interior = CellBox::new(Vector2::zeros(), Vector2::repeat(15));
    let corners = [Point2::new(-0.5 + 1e-9, 0.25 + 1e-9), Point2::new(1.5 - 1e-9, 1.25 - 1e-9)];
    for kernel in KernelKind::ALL {
        let ghost_box = interior.grow(kernel.min_ghost_width());
        for corner in &corners {
            kernel
                .stencil(&geometry(), corner)
                .for_each(|cell, _| assert!(ghost_box.contains(cell), "{} leaves the ghost box", kernel));
        }
    }
}

#[test]
fn kernel_functions_vanish_outside_support() {
    for kernel in KernelKind::ALL {
        let half_width = 0.5 * kernel.stencil_width() as f64;
        assert_eq!(kernel.evaluate(half_width), 0.0);
        assert_eq!(kernel.evaluate(-half_width - 0.1), 0.0);
        assert!(kernel.evaluate(0.0) > 0.0);
        assert_eq!(kernel.evaluate(0.3), kernel.evaluate(-0.3));
    }
}

proptest! {
    #[test]
    fn interpolation_reproduces_linear_functions(x in 0.0..1.0f64, y in 0.5..1.0f64) {
        let data = data_with(2, |p, c| if c == 0 { 3.0 } else { 2.0 * p.x - p.y });
        let point = Point2::new(x, y);
        for kernel in KernelKind::ALL {
            let mut values = [0.0; 2];
            interpolate(kernel, &geometry(), &data, &point, &mut values);
            prop_assert!((values[0] - 3.0).abs() < 1e-12);
            prop_assert!((values[1] - (2.0 * x - y)).abs() < 1e-12);
        }
    }

    #[test]
    fn spreading_conserves_integral(x in 0.0..1.0f64, y in 0.5..1.0f64, f in -10.0..10.0f64) {
        for kernel in KernelKind::ALL {
            let mut data = data_with(1, |_, _| 0.0);
            spread(kernel, &geometry(), &mut data, &Point2::new(x, y), &[f]);
            let integral = data.values().iter().sum::<f64>() * geometry().cell_volume();
            prop_assert!((integral - f).abs() < 1e-10 * (1.0 + f.abs()));
        }
    }
}

#[test]
fn spreading_is_adjoint_to_interpolation() {
    let point = Point2::new(0.3141, 0.777);
    let u = data_with(1, |p, _| (3.0 * p.x).sin() + p.y * p.y);
    for kernel in KernelKind::ALL {
        let mut interpolated = [0.0];
        interpolate(kernel, &geometry(), &u, &point, &mut interpolated);

        let mut spread_data = data_with(1, |_, _| 0.0);
        spread(kernel, &geometry(), &mut spread_data, &point, &[1.0]);
        let inner_product: f64 = spread_data
            .values()
            .iter()
            .zip(u.values())
            .map(|(s, u)| s * u)
            .sum::<f64>()
            * geometry().cell_volume();
        assert_approx_eq!(inner_product, interpolated[0], abstol = 1e-12);
    }
}
