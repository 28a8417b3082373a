//! Nodal discontinuous Galerkin building blocks on triangles.
//!
//! Conventions follow Hesthaven & Warburton, "Nodal Discontinuous Galerkin
//! Methods". Node sets and polynomial values are column vectors, and
//! Vandermonde-type matrices have one row per node.

mod basis;
mod jacobi;
mod lserk;
mod mesh;
mod nodes;
mod reference;

pub use self::{
    basis::{
        dmatrices_2d,
        dmatrix_1d,
        grad_simplex_2d_p,
        grad_vandermonde_1d,
        grad_vandermonde_2d,
        lift_1d,
        lift_2d,
        simplex_2d_p,
        vandermonde_1d,
        vandermonde_2d,
    },
    jacobi::{
        GaussQuadrature,
        grad_jacobi_p,
        jacobi_gl,
        jacobi_gq,
        jacobi_p,
    },
    lserk::Lserk,
    mesh::{
        Edge,
        EdgeId,
        Element,
        ElementGeometry,
        ElementId,
        Mesh,
        Vertex,
        VertexId,
        dt_scale,
    },
    nodes::{
        nodes_2d,
        rs_to_ab,
        warp_factor,
        xy_to_rs,
    },
    reference::ReferenceElement,
};

/// Tolerance used to decide whether a node lies on a face.
pub const NODE_TOLERANCE: f64 = 1e-8;

/// Number of faces of a triangle.
pub const NUM_FACES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum DgError {
    #[error("polynomial order must be at least 1")]
    InvalidOrder,

    #[error("{what} matrix is singular")]
    SingularMatrix { what: &'static str },

    #[error("element has a vanishing jacobian ({jacobian:e} at node {node})")]
    DegenerateElement { jacobian: f64, node: usize },

    #[error("face {face} has {found} nodes, expected {expected}")]
    FaceNodes {
        face: usize,
        found: usize,
        expected: usize,
    },
}
