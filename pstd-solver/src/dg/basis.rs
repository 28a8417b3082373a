use nalgebra::{
    DMatrix,
    DVector,
};

use crate::dg::{
    DgError,
    NODE_TOLERANCE,
    NUM_FACES,
    jacobi::{
        grad_jacobi_p,
        jacobi_p,
    },
    nodes::rs_to_ab,
};

pub fn vandermonde_1d(order: usize, r: &DVector<f64>) -> DMatrix<f64> {
    let mut v = DMatrix::zeros(r.len(), order + 1);
    for j in 0..=order {
        v.set_column(j, &jacobi_p(r, 0.0, 0.0, j));
    }
    v
}

pub fn grad_vandermonde_1d(order: usize, r: &DVector<f64>) -> DMatrix<f64> {
    let mut v = DMatrix::zeros(r.len(), order + 1);
    for j in 0..=order {
        v.set_column(j, &grad_jacobi_p(r, 0.0, 0.0, j));
    }
    v
}

/// Differentiation matrix `Dr = Vr V⁻¹`.
pub fn dmatrix_1d(
    order: usize,
    r: &DVector<f64>,
    v: &DMatrix<f64>,
) -> Result<DMatrix<f64>, DgError> {
    let v_inverse = inverse(v, "vandermonde")?;
    Ok(grad_vandermonde_1d(order, r) * v_inverse)
}

/// Surface integral term `V Vᵀ E` for the two end points of a line element.
pub fn lift_1d(v: &DMatrix<f64>) -> DMatrix<f64> {
    let np = v.nrows();
    let mut e = DMatrix::zeros(np, 2);
    e[(0, 0)] = 1.0;
    e[(np - 1, 1)] = 1.0;
    v * (v.transpose() * e)
}

/// Orthonormal polynomial on the reference triangle, evaluated in collapsed
/// coordinates.
pub fn simplex_2d_p(a: &DVector<f64>, b: &DVector<f64>, i: usize, j: usize) -> DVector<f64> {
    let h1 = jacobi_p(a, 0.0, 0.0, i);
    let h2 = jacobi_p(b, 2.0 * i as f64 + 1.0, 0.0, j);
    DVector::from_fn(a.len(), |k, _| {
        2f64.sqrt() * h1[k] * h2[k] * (1.0 - b[k]).powi(i as i32)
    })
}

/// `(∂/∂r, ∂/∂s)` of [`simplex_2d_p`].
pub fn grad_simplex_2d_p(
    a: &DVector<f64>,
    b: &DVector<f64>,
    i: usize,
    j: usize,
) -> (DVector<f64>, DVector<f64>) {
    let alpha = 2.0 * i as f64 + 1.0;
    let fa = jacobi_p(a, 0.0, 0.0, i);
    let dfa = grad_jacobi_p(a, 0.0, 0.0, i);
    let gb = jacobi_p(b, alpha, 0.0, j);
    let dgb = grad_jacobi_p(b, alpha, 0.0, j);

    let i_f = i as f64;
    let scale = 2f64.powf(i_f + 0.5);
    let mut dr = DVector::zeros(a.len());
    let mut ds = DVector::zeros(a.len());

    for k in 0..a.len() {
        let half_b = 0.5 * (1.0 - b[k]);
        let lowered = if i > 0 { half_b.powi(i as i32 - 1) } else { 1.0 };

        dr[k] = dfa[k] * gb[k] * lowered;

        let mut tmp = dgb[k] * half_b.powi(i as i32);
        if i > 0 {
            tmp -= 0.5 * i_f * gb[k] * lowered;
        }
        ds[k] = dfa[k] * gb[k] * 0.5 * (1.0 + a[k]) * lowered + fa[k] * tmp;

        dr[k] *= scale;
        ds[k] *= scale;
    }

    (dr, ds)
}

pub fn vandermonde_2d(order: usize, r: &DVector<f64>, s: &DVector<f64>) -> DMatrix<f64> {
    let (a, b) = rs_to_ab(r, s);
    let np = (order + 1) * (order + 2) / 2;
    let mut v = DMatrix::zeros(r.len(), np);

    let mut sk = 0;
    for i in 0..=order {
        for j in 0..=(order - i) {
            v.set_column(sk, &simplex_2d_p(&a, &b, i, j));
            sk += 1;
        }
    }

    v
}

pub fn grad_vandermonde_2d(
    order: usize,
    r: &DVector<f64>,
    s: &DVector<f64>,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let (a, b) = rs_to_ab(r, s);
    let np = (order + 1) * (order + 2) / 2;
    let mut vr = DMatrix::zeros(r.len(), np);
    let mut vs = DMatrix::zeros(r.len(), np);

    let mut sk = 0;
    for i in 0..=order {
        for j in 0..=(order - i) {
            let (dr, ds) = grad_simplex_2d_p(&a, &b, i, j);
            vr.set_column(sk, &dr);
            vs.set_column(sk, &ds);
            sk += 1;
        }
    }

    (vr, vs)
}

/// Differentiation matrices `(Dr, Ds)` on the reference triangle.
pub fn dmatrices_2d(
    order: usize,
    r: &DVector<f64>,
    s: &DVector<f64>,
    v: &DMatrix<f64>,
) -> Result<(DMatrix<f64>, DMatrix<f64>), DgError> {
    let v_inverse = inverse(v, "vandermonde")?;
    let (vr, vs) = grad_vandermonde_2d(order, r, s);
    Ok((vr * &v_inverse, vs * v_inverse))
}

/// Indices of the nodes on each face of the reference triangle.
///
/// Face 1 is `s = -1`, face 2 is `r + s = 0` and face 3 is `r = -1`.
pub fn face_masks(r: &DVector<f64>, s: &DVector<f64>) -> [Vec<usize>; NUM_FACES] {
    let select = |predicate: &dyn Fn(usize) -> bool| -> Vec<usize> {
        (0..r.len()).filter(|k| predicate(*k)).collect()
    };
    [
        select(&|k| (s[k] + 1.0).abs() < NODE_TOLERANCE),
        select(&|k| (r[k] + s[k]).abs() < NODE_TOLERANCE),
        select(&|k| (r[k] + 1.0).abs() < NODE_TOLERANCE),
    ]
}

/// Surface integral term for the reference triangle.
///
/// Returns the lift matrix (`Np × 3·Nfp`) together with the face masks used
/// to build it.
pub fn lift_2d(
    order: usize,
    r: &DVector<f64>,
    s: &DVector<f64>,
    v: &DMatrix<f64>,
) -> Result<(DMatrix<f64>, [Vec<usize>; NUM_FACES]), DgError> {
    let np = r.len();
    let nfp = order + 1;
    let masks = face_masks(r, s);

    let mut e = DMatrix::zeros(np, NUM_FACES * nfp);

    for (face, mask) in masks.iter().enumerate() {
        if mask.len() != nfp {
            return Err(DgError::FaceNodes {
                face,
                found: mask.len(),
                expected: nfp,
            });
        }

        // faces 1 and 2 are parametrized by r, face 3 by s
        let face_coordinate = if face < 2 { r } else { s };
        let face_nodes = DVector::from_iterator(nfp, mask.iter().map(|k| face_coordinate[*k]));
        let v_1d = vandermonde_1d(order, &face_nodes);
        let mass_edge = inverse(&(&v_1d * v_1d.transpose()), "edge mass")?;

        for (row, k) in mask.iter().enumerate() {
            for column in 0..nfp {
                e[(*k, face * nfp + column)] = mass_edge[(row, column)];
            }
        }
    }

    Ok((v * (v.transpose() * e), masks))
}

fn inverse(matrix: &DMatrix<f64>, what: &'static str) -> Result<DMatrix<f64>, DgError> {
    matrix
        .clone()
        .try_inverse()
        .ok_or(DgError::SingularMatrix { what })
}
