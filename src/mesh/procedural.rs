//! Simple structured meshes.
use crate::element::ReferenceCell;
use crate::mesh::{CellConnectivity, Mesh};
use crate::allocators::DimAllocator;
use crate::SmallDim;
use nalgebra::{DefaultAllocator, OPoint, Point2, Point3, Vector2, Vector3, U2, U3};

/// Generates an axis-aligned rectangular uniform quadrilateral mesh with its lower left corner
/// at `bottom_left`.
pub fn create_rectangular_uniform_quad_mesh_2d(
    cell_size: f64,
    num_cells_x: usize,
    num_cells_y: usize,
    bottom_left: &Vector2<f64>,
) -> Mesh<U2> {
    let num_vertices_x = num_cells_x + 1;
    let to_global_vertex_index = |i: usize, j: usize| num_vertices_x * j + i;

    let mut vertices = Vec::new();
    for j in 0..=num_cells_y {
        for i in 0..=num_cells_x {
            let v = bottom_left + Vector2::new(i as f64, j as f64) * cell_size;
            vertices.push(Point2::from(v));
        }
    }

    let mut cells = Vec::new();
    for j in 0..num_cells_y {
        for i in 0..num_cells_x {
            cells.push(CellConnectivity::new(
                ReferenceCell::Quadrilateral,
                vec![
                    to_global_vertex_index(i, j),
                    to_global_vertex_index(i + 1, j),
                    to_global_vertex_index(i + 1, j + 1),
                    to_global_vertex_index(i, j + 1),
                ],
            ));
        }
    }

    Mesh::from_vertices_and_cells(vertices, cells)
}

/// Generates an axis-aligned box of uniform hexahedra with its lowest corner at `origin`.
pub fn create_rectangular_uniform_hex_mesh(
    cell_size: f64,
    num_cells_x: usize,
    num_cells_y: usize,
    num_cells_z: usize,
    origin: &Vector3<f64>,
) -> Mesh<U3> {
    let num_vertices_x = num_cells_x + 1;
    let num_vertices_y = num_cells_y + 1;
    let idx = |i: usize, j: usize, k: usize| (num_vertices_x * num_vertices_y) * k + num_vertices_x * j + i;

    let mut vertices = Vec::new();
    for k in 0..=num_cells_z {
        for j in 0..=num_cells_y {
            for i in 0..=num_cells_x {
                let v = origin + Vector3::new(i as f64, j as f64, k as f64) * cell_size;
                vertices.push(Point3::from(v));
            }
        }
    }

    let mut cells = Vec::new();
    for k in 0..num_cells_z {
        for j in 0..num_cells_y {
            for i in 0..num_cells_x {
                cells.push(CellConnectivity::new(
                    ReferenceCell::Hexahedron,
                    vec![
                        idx(i, j, k),
                        idx(i + 1, j, k),
                        idx(i + 1, j + 1, k),
                        idx(i, j + 1, k),
                        idx(i, j, k + 1),
                        idx(i + 1, j, k + 1),
                        idx(i + 1, j + 1, k + 1),
                        idx(i, j + 1, k + 1),
                    ],
                ));
            }
        }
    }

    Mesh::from_vertices_and_cells(vertices, cells)
}

/// Connects consecutive vertices by line segments. A closed polyline also connects the last
/// vertex to the first.
///
/// # Panics
///
/// Panics if fewer than two vertices are given, or fewer than three for a closed polyline.
pub fn create_polyline_mesh<D>(vertices: Vec<OPoint<f64, D>>, closed: bool) -> Mesh<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let n = vertices.len();
    assert!(n >= 2 && (!closed || n >= 3), "too few vertices for a polyline");
    let num_cells = if closed { n } else { n - 1 };
    let cells = (0..num_cells)
        .map(|i| CellConnectivity::new(ReferenceCell::Segment, vec![i, (i + 1) % n]))
        .collect();
    Mesh::from_vertices_and_cells(vertices, cells)
}

/// Generates a closed polyline with `num_segments` segments inscribed in the circle with the
/// given center and radius.
pub fn create_circle_polyline_2d(center: &Point2<f64>, radius: f64, num_segments: usize) -> Mesh<U2> {
    let vertices = (0..num_segments)
        .map(|i| {
            let theta = 2.0 * std::f64::consts::PI * i as f64 / num_segments as f64;
            center + Vector2::new(theta.cos(), theta.sin()) * radius
        })
        .collect();
    create_polyline_mesh(vertices, true)
}

impl Mesh<U2> {
    /// Splits every quadrilateral along its diagonal from the first to the third vertex.
    /// Triangles are kept as they are.
    pub fn split_into_triangles(self) -> Mesh<U2> {
        let cells = self
            .connectivity()
            .iter()
            .flat_map(|cell| {
                let c = cell.vertex_indices();
                match cell.kind() {
                    ReferenceCell::Quadrilateral => vec![
                        CellConnectivity::new(ReferenceCell::Triangle, vec![c[0], c[1], c[2]]),
                        CellConnectivity::new(ReferenceCell::Triangle, vec![c[0], c[2], c[3]]),
                    ],
                    _ => vec![cell.clone()],
                }
            })
            .collect();
        Mesh::from_vertices_and_cells(self.vertices().to_vec(), cells)
    }
}
