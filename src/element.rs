//! Linear Lagrange elements and mappings from reference cells to physical space.
use crate::allocators::{BiDimAllocator, DimAllocator};
use crate::mesh::Mesh;
use crate::SmallDim;
use nalgebra::{DefaultAllocator, OMatrix, OPoint, OVector};
use std::marker::PhantomData;

/// Maximum number of nodes of any supported element.
pub const MAX_NODES: usize = 8;

/// The reference cell of a structural cell.
///
/// Reference domains are `[-1, 1]^d` for segments and hypercubes, and the simplex with
/// vertices `(-1, ..., -1)` and `-1 + 2 e_i` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceCell {
    Segment,
    Quadrilateral,
    Triangle,
    Hexahedron,
    Tetrahedron,
}

const SEGMENT_VERTICES: [[f64; 3]; 2] = [[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
const QUADRILATERAL_VERTICES: [[f64; 3]; 4] = [[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]];
const TRIANGLE_VERTICES: [[f64; 3]; 3] = [[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [-1.0, 1.0, 0.0]];
const HEXAHEDRON_VERTICES: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];
const TETRAHEDRON_VERTICES: [[f64; 3]; 4] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
];

const SEGMENT_EDGES: [[usize; 2]; 1] = [[0, 1]];
const QUADRILATERAL_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];
const TRIANGLE_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
const HEXAHEDRON_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];
const TETRAHEDRON_EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

impl ReferenceCell {
    /// The reference cell of the given dimension with the given number of vertices, if any.
    pub fn from_num_vertices(dim: usize, num_vertices: usize) -> Option<Self> {
        match (dim, num_vertices) {
            (1, 2) => Some(Self::Segment),
            (2, 4) => Some(Self::Quadrilateral),
            (2, 3) => Some(Self::Triangle),
            (3, 8) => Some(Self::Hexahedron),
            (3, 4) => Some(Self::Tetrahedron),
            _ => None,
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            Self::Segment => 1,
            Self::Quadrilateral | Self::Triangle => 2,
            Self::Hexahedron | Self::Tetrahedron => 3,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.reference_vertices().len()
    }

    pub fn is_simplex(&self) -> bool {
        matches!(self, Self::Triangle | Self::Tetrahedron)
    }

    /// Length, area or volume of the reference cell.
    pub fn measure(&self) -> f64 {
        match self {
            Self::Segment => 2.0,
            Self::Quadrilateral => 4.0,
            Self::Triangle => 2.0,
            Self::Hexahedron => 8.0,
            Self::Tetrahedron => 4.0 / 3.0,
        }
    }

    /// Largest distance between two points of the reference cell.
    pub fn diameter(&self) -> f64 {
        match self {
            Self::Segment => 2.0,
            Self::Quadrilateral | Self::Triangle | Self::Tetrahedron => 2.0 * 2.0f64.sqrt(),
            Self::Hexahedron => 2.0 * 3.0f64.sqrt(),
        }
    }

    /// Reference vertex coordinates, padded with zeros to three components.
    pub fn reference_vertices(&self) -> &'static [[f64; 3]] {
        match self {
            Self::Segment => &SEGMENT_VERTICES,
            Self::Quadrilateral => &QUADRILATERAL_VERTICES,
            Self::Triangle => &TRIANGLE_VERTICES,
            Self::Hexahedron => &HEXAHEDRON_VERTICES,
            Self::Tetrahedron => &TETRAHEDRON_VERTICES,
        }
    }

    pub fn edges(&self) -> &'static [[usize; 2]] {
        match self {
            Self::Segment => &SEGMENT_EDGES,
            Self::Quadrilateral => &QUADRILATERAL_EDGES,
            Self::Triangle => &TRIANGLE_EDGES,
            Self::Hexahedron => &HEXAHEDRON_EDGES,
            Self::Tetrahedron => &TETRAHEDRON_EDGES,
        }
    }

    /// Evaluates the linear Lagrange basis functions at the reference point `xi`.
    ///
    /// # Panics
    ///
    /// Panics if `basis` does not have one entry per vertex.
    pub fn populate_basis(&self, basis: &mut [f64], xi: &[f64]) {
        assert_eq!(basis.len(), self.num_vertices());
        let dim = self.dim();
        if self.is_simplex() {
            // Barycentric coordinates of the reference simplex
            let mut first = 1.0;
            for i in 0..dim {
                let lambda = 0.5 * (1.0 + xi[i]);
                basis[i + 1] = lambda;
                first -= lambda;
            }
            basis[0] = first;
        } else {
            for (phi, vertex) in basis.iter_mut().zip(self.reference_vertices()) {
                *phi = (0..dim).map(|i| 0.5 * (1.0 + xi[i] * vertex[i])).product();
            }
        }
    }

    /// Evaluates the gradient of basis function `node` with respect to reference coordinates.
    pub fn populate_basis_gradient(&self, gradient: &mut [f64], node: usize, xi: &[f64]) {
        let dim = self.dim();
        assert_eq!(gradient.len(), dim);
        if self.is_simplex() {
            for (j, g) in gradient.iter_mut().enumerate() {
                *g = match node {
                    0 => -0.5,
                    n if n == j + 1 => 0.5,
                    _ => 0.0,
                };
            }
        } else {
            let vertex = &self.reference_vertices()[node];
            for (j, g) in gradient.iter_mut().enumerate() {
                *g = 0.5 * vertex[j]
                    * (0..dim)
                        .filter(|&i| i != j)
                        .map(|i| 0.5 * (1.0 + xi[i] * vertex[i]))
                        .product::<f64>();
            }
        }
    }
}

/// A linear Lagrange element: a reference cell of dimension `R` together with the physical
/// positions of its vertices in `D` dimensions.
///
/// `R` is smaller than `D` for codimensional cells, such as line segments in 2D.
#[derive(Debug, Clone, Copy)]
pub struct LinearElement<'a, D, R = D>
where
    D: SmallDim,
    R: SmallDim,
    DefaultAllocator: BiDimAllocator<f64, D, R>,
{
    kind: ReferenceCell,
    vertices: &'a [OPoint<f64, D>],
    marker: PhantomData<R>,
}

impl<'a, D, R> LinearElement<'a, D, R>
where
    D: SmallDim,
    R: SmallDim,
    DefaultAllocator: BiDimAllocator<f64, D, R>,
{
    /// # Panics
    ///
    /// Panics if the reference cell does not have dimension `R`, if `R` exceeds `D` or if the
    /// number of vertices does not match the reference cell.
    pub fn new(kind: ReferenceCell, vertices: &'a [OPoint<f64, D>]) -> Self {
        assert_eq!(kind.dim(), R::dim(), "reference cell must have the reference dimension");
        assert!(R::dim() <= D::dim(), "reference dimension must not exceed the spatial dimension");
        assert_eq!(vertices.len(), kind.num_vertices(), "vertex count must match the reference cell");
        Self {
            kind,
            vertices,
            marker: PhantomData,
        }
    }

    pub fn kind(&self) -> ReferenceCell {
        self.kind
    }

    pub fn num_nodes(&self) -> usize {
        self.vertices.len()
    }

    pub fn populate_basis(&self, basis: &mut [f64], xi: &OPoint<f64, R>) {
        self.kind.populate_basis(basis, xi.coords.as_slice());
    }

    pub fn map_reference_coords(&self, xi: &OPoint<f64, R>) -> OPoint<f64, D> {
        let mut buffer = [0.0; MAX_NODES];
        let basis = &mut buffer[..self.num_nodes()];
        self.populate_basis(basis, xi);
        let mut x = OVector::<f64, D>::zeros();
        for (phi, vertex) in basis.iter().zip(self.vertices) {
            x += &vertex.coords * *phi;
        }
        OPoint::from(x)
    }

    /// The Jacobian `dx/dxi` of the map from reference coordinates to physical coordinates.
    pub fn reference_jacobian(&self, xi: &OPoint<f64, R>) -> OMatrix<f64, D, R> {
        let mut buffer = [0.0; 3];
        let gradient = &mut buffer[..R::dim()];
        let mut jacobian = OMatrix::<f64, D, R>::zeros();
        for (node, vertex) in self.vertices.iter().enumerate() {
            self.kind.populate_basis_gradient(gradient, node, xi.coords.as_slice());
            for i in 0..D::dim() {
                for j in 0..R::dim() {
                    jacobian[(i, j)] += vertex[i] * gradient[j];
                }
            }
        }
        jacobian
    }

    /// The factor by which the map scales length, area or volume at `xi`.
    ///
    /// This is `|det J|` for volumetric cells and `sqrt(det(J^T J))` otherwise.
    pub fn volume_element(&self, xi: &OPoint<f64, R>) -> f64 {
        let jacobian = self.reference_jacobian(xi);
        if R::dim() == D::dim() {
            let square = OMatrix::<f64, R, R>::from_fn(|i, j| jacobian[(i, j)]);
            square.determinant().abs()
        } else {
            (jacobian.transpose() * &jacobian).determinant().max(0.0).sqrt()
        }
    }
}

/// Longest edge of a cell with the given vertex positions.
pub fn longest_edge_length<D>(kind: ReferenceCell, vertices: &[OPoint<f64, D>]) -> f64
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    kind.edges()
        .iter()
        .map(|&[a, b]| (&vertices[a] - &vertices[b]).norm())
        .fold(0.0, f64::max)
}

/// Provides the vertices of each cell of a mesh in some configuration.
pub trait CellMapping<D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn num_cells(&self) -> usize;

    fn reference_cell(&self, cell_index: usize) -> ReferenceCell;

    /// Mesh vertex indices of the cell.
    fn cell_nodes(&self, cell_index: usize) -> &[usize];

    /// Replaces the contents of `vertices` with the vertex positions of the cell.
    fn populate_cell_vertices(&self, vertices: &mut Vec<OPoint<f64, D>>, cell_index: usize);
}

/// Maps cells to their reference configuration, given by the vertices of the mesh.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceMapping<'a, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    mesh: &'a Mesh<D>,
}

impl<'a, D> ReferenceMapping<'a, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    pub fn new(mesh: &'a Mesh<D>) -> Self {
        Self { mesh }
    }
}

impl<'a, D> CellMapping<D> for ReferenceMapping<'a, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn num_cells(&self) -> usize {
        self.mesh.num_cells()
    }

    fn reference_cell(&self, cell_index: usize) -> ReferenceCell {
        self.mesh.connectivity()[cell_index].kind()
    }

    fn cell_nodes(&self, cell_index: usize) -> &[usize] {
        self.mesh.connectivity()[cell_index].vertex_indices()
    }

    fn populate_cell_vertices(&self, vertices: &mut Vec<OPoint<f64, D>>, cell_index: usize) {
        vertices.clear();
        vertices.extend(self.mesh.cell_vertices(cell_index).cloned());
    }
}

/// Maps cells to the configuration given by a nodal position vector.
///
/// The position of node `n` is `positions[D * n .. D * (n + 1)]`.
#[derive(Debug, Clone, Copy)]
pub struct PositionMapping<'a, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    mesh: &'a Mesh<D>,
    positions: &'a [f64],
}

impl<'a, D> PositionMapping<'a, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    /// # Panics
    ///
    /// Panics if `positions` does not have `D` entries per mesh vertex.
    pub fn new(mesh: &'a Mesh<D>, positions: &'a [f64]) -> Self {
        assert_eq!(
            positions.len(),
            mesh.num_vertices() * D::dim(),
            "position vector must have D entries per vertex"
        );
        Self { mesh, positions }
    }

    pub fn node_position(&self, node: usize) -> OPoint<f64, D> {
        let d = D::dim();
        OPoint::from(OVector::<f64, D>::from_fn(|i, _| self.positions[d * node + i]))
    }
}

impl<'a, D> CellMapping<D> for PositionMapping<'a, D>
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    fn num_cells(&self) -> usize {
        self.mesh.num_cells()
    }

    fn reference_cell(&self, cell_index: usize) -> ReferenceCell {
        self.mesh.connectivity()[cell_index].kind()
    }

    fn cell_nodes(&self, cell_index: usize) -> &[usize] {
        self.mesh.connectivity()[cell_index].vertex_indices()
    }

    fn populate_cell_vertices(&self, vertices: &mut Vec<OPoint<f64, D>>, cell_index: usize) {
        vertices.clear();
        let cell = &self.mesh.connectivity()[cell_index];
        vertices.extend(cell.vertex_indices().iter().map(|&node| self.node_position(node)));
    }
}
