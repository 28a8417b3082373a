use std::sync::Arc;

use nalgebra::{
    DVector,
    Point2,
    Vector2,
};
use pstd_util::arena::{
    Arena,
    Id,
};
use smallvec::SmallVec;

use crate::dg::{
    DgError,
    NUM_FACES,
    reference::ReferenceElement,
};

pub type VertexId = Id<Vertex>;
pub type EdgeId = Id<Edge>;
pub type ElementId = Id<Element>;

/// Jacobians smaller than this mark an element as degenerate.
const JACOBIAN_TOLERANCE: f64 = 1e-12;

#[derive(Clone, Debug)]
pub struct Vertex {
    pub position: Point2<f64>,

    /// Incident edges. Only used for lookups.
    edges: SmallVec<[EdgeId; 6]>,
}

impl Vertex {
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub vertices: [VertexId; 2],

    /// Elements that have this edge as one of their faces.
    elements: SmallVec<[ElementId; 2]>,
}

impl Edge {
    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    pub fn is_boundary(&self) -> bool {
        self.elements.len() < 2
    }
}

#[derive(Clone, Debug)]
pub struct Element {
    pub vertices: [VertexId; 3],

    /// Face `i` connects vertex `i` and vertex `(i + 1) % 3`.
    pub faces: [EdgeId; NUM_FACES],

    pub geometry: ElementGeometry,
}

impl Element {
    /// Physical gradient `(∂u/∂x, ∂u/∂y)` of nodal values `u`.
    pub fn gradient(
        &self,
        reference: &ReferenceElement,
        u: &DVector<f64>,
    ) -> (DVector<f64>, DVector<f64>) {
        let ur = &reference.dr * u;
        let us = &reference.ds * u;
        let geometry = &self.geometry;
        let ux = geometry.rx.component_mul(&ur) + geometry.sx.component_mul(&us);
        let uy = geometry.ry.component_mul(&ur) + geometry.sy.component_mul(&us);
        (ux, uy)
    }
}

/// Geometric factors of an affinely mapped triangle.
///
/// Face quantities (`nx`, `ny`, `surface_jacobian`, `face_scale`) hold
/// `3 * nfp` values, ordered face by face as in
/// [`ReferenceElement::face_masks`].
#[derive(Clone, Debug)]
pub struct ElementGeometry {
    pub x: DVector<f64>,
    pub y: DVector<f64>,
    pub rx: DVector<f64>,
    pub sx: DVector<f64>,
    pub ry: DVector<f64>,
    pub sy: DVector<f64>,
    pub jacobian: DVector<f64>,
    pub nx: DVector<f64>,
    pub ny: DVector<f64>,
    pub surface_jacobian: DVector<f64>,
    pub face_scale: DVector<f64>,
    pub dt_scale: f64,
}

impl ElementGeometry {
    pub fn new(reference: &ReferenceElement, vertices: &[Point2<f64>; 3]) -> Result<Self, DgError> {
        let (r, s) = (&reference.r, &reference.s);
        let np = reference.np;

        let map = |c1: f64, c2: f64, c3: f64| {
            DVector::from_fn(np, |k, _| {
                0.5 * (-(r[k] + s[k]) * c1 + (r[k] + 1.0) * c2 + (s[k] + 1.0) * c3)
            })
        };
        let x = map(vertices[0].x, vertices[1].x, vertices[2].x);
        let y = map(vertices[0].y, vertices[1].y, vertices[2].y);

        let xr = &reference.dr * &x;
        let xs = &reference.ds * &x;
        let yr = &reference.dr * &y;
        let ys = &reference.ds * &y;

        let jacobian = xr.component_mul(&ys) - xs.component_mul(&yr);
        if let Some((node, jacobian)) = jacobian
            .iter()
            .enumerate()
            .find(|(_, jacobian)| jacobian.abs() < JACOBIAN_TOLERANCE)
        {
            return Err(DgError::DegenerateElement {
                jacobian: *jacobian,
                node,
            });
        }

        let rx = ys.component_div(&jacobian);
        let sx = -yr.component_div(&jacobian);
        let ry = -xs.component_div(&jacobian);
        let sy = xr.component_div(&jacobian);

        let face_nodes = reference.face_nodes().collect::<Vec<_>>();
        let mut nx = DVector::zeros(face_nodes.len());
        let mut ny = DVector::zeros(face_nodes.len());
        let mut surface_jacobian = DVector::zeros(face_nodes.len());
        let mut face_scale = DVector::zeros(face_nodes.len());

        for (i, (face, k)) in face_nodes.into_iter().enumerate() {
            let (n_x, n_y) = match face {
                0 => (yr[k], -xr[k]),
                1 => (ys[k] - yr[k], -xs[k] + xr[k]),
                _ => (-ys[k], xs[k]),
            };
            let length = n_x.hypot(n_y);
            nx[i] = n_x / length;
            ny[i] = n_y / length;
            surface_jacobian[i] = length;
            face_scale[i] = length / jacobian[k];
        }

        Ok(Self {
            x,
            y,
            rx,
            sx,
            ry,
            sy,
            jacobian,
            nx,
            ny,
            surface_jacobian,
            face_scale,
            dt_scale: dt_scale(vertices),
        })
    }
}

/// Inradius of a triangle (area over semi-perimeter).
///
/// Used as the local length scale for the time step restriction.
pub fn dt_scale(vertices: &[Point2<f64>; 3]) -> f64 {
    let lengths: [f64; 3] =
        std::array::from_fn(|i| (vertices[(i + 1) % 3] - vertices[i]).norm());
    let semi_perimeter = lengths.iter().sum::<f64>() / 2.0;
    let area = (semi_perimeter
        * (semi_perimeter - lengths[0])
        * (semi_perimeter - lengths[1])
        * (semi_perimeter - lengths[2]))
        .sqrt();
    area / semi_perimeter
}

/// Unstructured triangle mesh.
///
/// Vertices, edges and elements live in arenas and reference each other by
/// id. Edges are shared between the (at most two) elements they bound.
#[derive(Clone, Debug)]
pub struct Mesh {
    reference: Arc<ReferenceElement>,
    vertices: Arena<Vertex>,
    edges: Arena<Edge>,
    elements: Arena<Element>,
}

impl Mesh {
    pub fn new(reference: Arc<ReferenceElement>) -> Self {
        Self {
            reference,
            vertices: Default::default(),
            edges: Default::default(),
            elements: Default::default(),
        }
    }

    /// Structured triangulation of the rectangle `[min, max]` with `cells`
    /// squares, each split along its diagonal.
    pub fn square_grid(
        reference: Arc<ReferenceElement>,
        min: Point2<f64>,
        max: Point2<f64>,
        cells: Vector2<usize>,
    ) -> Result<Self, DgError> {
        let mut mesh = Self::new(reference);
        let step = (max - min).component_div(&cells.cast::<f64>());

        let mut ids = Vec::with_capacity((cells.x + 1) * (cells.y + 1));
        for j in 0..=cells.y {
            for i in 0..=cells.x {
                ids.push(mesh.add_vertex(
                    min + Vector2::new(i as f64 * step.x, j as f64 * step.y),
                ));
            }
        }
        let vertex = |i: usize, j: usize| ids[j * (cells.x + 1) + i];

        for j in 0..cells.y {
            for i in 0..cells.x {
                mesh.add_element([vertex(i, j), vertex(i + 1, j), vertex(i + 1, j + 1)])?;
                mesh.add_element([vertex(i, j), vertex(i + 1, j + 1), vertex(i, j + 1)])?;
            }
        }

        tracing::debug!(
            vertices = mesh.vertices.len(),
            edges = mesh.edges.len(),
            elements = mesh.elements.len(),
            "built square grid"
        );

        Ok(mesh)
    }

    pub fn reference(&self) -> &ReferenceElement {
        &self.reference
    }

    pub fn add_vertex(&mut self, position: Point2<f64>) -> VertexId {
        self.vertices.insert(Vertex {
            position,
            edges: SmallVec::new(),
        })
    }

    /// Returns the edge between `a` and `b`, creating it if necessary.
    pub fn add_edge(&mut self, a: VertexId, b: VertexId) -> EdgeId {
        if let Some(edge) = self.find_edge(a, b) {
            return edge;
        }

        let edge = self.edges.insert(Edge {
            vertices: [a, b],
            elements: SmallVec::new(),
        });
        self.vertices[a].edges.push(edge);
        self.vertices[b].edges.push(edge);
        edge
    }

    pub fn find_edge(&self, a: VertexId, b: VertexId) -> Option<EdgeId> {
        self.vertices[a].edges.iter().copied().find(|edge| {
            let [v1, v2] = self.edges[*edge].vertices;
            (v1 == a && v2 == b) || (v1 == b && v2 == a)
        })
    }

    pub fn add_element(&mut self, vertices: [VertexId; 3]) -> Result<ElementId, DgError> {
        let positions = vertices.map(|vertex| self.vertices[vertex].position);
        let geometry = ElementGeometry::new(&self.reference, &positions)?;

        let faces: [EdgeId; NUM_FACES] =
            std::array::from_fn(|face| self.add_edge(vertices[face], vertices[(face + 1) % 3]));

        let element = self.elements.insert(Element {
            vertices,
            faces,
            geometry,
        });
        for edge in faces {
            self.edges[edge].elements.push(element);
        }

        Ok(element)
    }

    /// The element on the other side of `face`, if the face is not on the
    /// boundary.
    pub fn neighbour(&self, element: ElementId, face: usize) -> Option<ElementId> {
        let edge = self.elements[element].faces[face];
        self.edges[edge]
            .elements
            .iter()
            .copied()
            .find(|other| *other != element)
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id]
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements.iter()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Smallest [`dt_scale`] of all elements.
    pub fn min_dt_scale(&self) -> Option<f64> {
        self.elements
            .iter()
            .map(|(_, element)| element.geometry.dt_scale)
            .min_by(f64::total_cmp)
    }
}
