use std::f64::consts::PI;

use nalgebra::{
    DMatrix,
    DVector,
};

use crate::dg::{
    DgError,
    basis::vandermonde_1d,
    jacobi::{
        jacobi_gl,
        jacobi_p,
    },
};

/// Optimized blending parameters for the warp & blend nodes, indexed by
/// `order - 1`.
const ALPHA_OPTIMIZED: [f64; 15] = [
    0.0000, 0.0000, 1.4152, 0.1001, 0.2751, 0.9800, 1.0999, 1.2832, 1.3648, 1.4773, 1.4959,
    1.5743, 1.5770, 1.6223, 1.6258,
];

/// Warp function mapping equidistant nodes on `[-1, 1]` to Gauss-Lobatto
/// nodes, evaluated at `r`.
pub fn warp_factor(order: usize, r: &DVector<f64>) -> Result<DVector<f64>, DgError> {
    let lgl = jacobi_gl(0.0, 0.0, order);
    let equidistant = DVector::from_fn(order + 1, |i, _| -1.0 + 2.0 * i as f64 / order as f64);
    let v_equidistant = vandermonde_1d(order, &equidistant);

    let mut p = DMatrix::zeros(order + 1, r.len());
    for i in 0..=order {
        p.set_row(i, &jacobi_p(r, 0.0, 0.0, i).transpose());
    }

    let l = v_equidistant
        .transpose()
        .lu()
        .solve(&p)
        .ok_or(DgError::SingularMatrix {
            what: "equidistant vandermonde",
        })?;

    let warp = l.transpose() * (lgl - equidistant);

    Ok(DVector::from_fn(r.len(), |i, _| {
        let zero_filter = if r[i].abs() < 1.0 - 1e-10 { 1.0 } else { 0.0 };
        let scale = 1.0 - (zero_filter * r[i]).powi(2);
        warp[i] / scale + warp[i] * (zero_filter - 1.0)
    }))
}

/// Warp & blend nodes on the equilateral triangle with vertices
/// `(-1, -1/√3)`, `(1, -1/√3)`, `(0, 2/√3)`.
pub fn nodes_2d(order: usize) -> Result<(DVector<f64>, DVector<f64>), DgError> {
    if order == 0 {
        return Err(DgError::InvalidOrder);
    }

    let alpha = ALPHA_OPTIMIZED
        .get(order - 1)
        .copied()
        .unwrap_or(5.0 / 3.0);
    let np = (order + 1) * (order + 2) / 2;
    let n = order as f64;

    let mut l1 = DVector::zeros(np);
    let mut l3 = DVector::zeros(np);
    let mut sk = 0;
    for i in 0..=order {
        for j in 0..=(order - i) {
            l1[sk] = i as f64 / n;
            l3[sk] = j as f64 / n;
            sk += 1;
        }
    }
    let l2 = l1.map(|l1| 1.0 - l1) - &l3;

    let mut x = &l3 - &l2;
    let mut y = (-&l2 - &l3 + 2.0 * &l1) / 3f64.sqrt();

    let blend1 = 4.0 * l2.component_mul(&l3);
    let blend2 = 4.0 * l1.component_mul(&l3);
    let blend3 = 4.0 * l1.component_mul(&l2);

    let warpf1 = warp_factor(order, &(&l3 - &l2))?;
    let warpf2 = warp_factor(order, &(&l1 - &l3))?;
    let warpf3 = warp_factor(order, &(&l2 - &l1))?;

    let warp = |blend: &DVector<f64>, warpf: &DVector<f64>, l: &DVector<f64>| {
        DVector::from_fn(np, |k, _| {
            blend[k] * warpf[k] * (1.0 + (alpha * l[k]).powi(2))
        })
    };
    let warp1 = warp(&blend1, &warpf1, &l1);
    let warp2 = warp(&blend2, &warpf2, &l2);
    let warp3 = warp(&blend3, &warpf3, &l3);

    let (s2, c2) = (2.0 * PI / 3.0).sin_cos();
    let (s4, c4) = (4.0 * PI / 3.0).sin_cos();

    x += &warp1 + c2 * &warp2 + c4 * &warp3;
    y += s2 * &warp2 + s4 * &warp3;

    Ok((x, y))
}

/// Maps equilateral triangle coordinates to the reference triangle
/// `(-1, -1)`, `(1, -1)`, `(-1, 1)`.
pub fn xy_to_rs(x: &DVector<f64>, y: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
    let sqrt3 = 3f64.sqrt();
    let mut r = DVector::zeros(x.len());
    let mut s = DVector::zeros(x.len());

    for k in 0..x.len() {
        let l1 = (sqrt3 * y[k] + 1.0) / 3.0;
        let l2 = (-3.0 * x[k] - sqrt3 * y[k] + 2.0) / 6.0;
        let l3 = (3.0 * x[k] - sqrt3 * y[k] + 2.0) / 6.0;
        r[k] = -l2 + l3 - l1;
        s[k] = -l2 - l3 + l1;
    }

    (r, s)
}

/// Collapsed coordinates of the reference triangle.
pub fn rs_to_ab(r: &DVector<f64>, s: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
    let a = DVector::from_fn(r.len(), |k, _| {
        if s[k] != 1.0 {
            2.0 * (1.0 + r[k]) / (1.0 - s[k]) - 1.0
        }
        else {
            -1.0
        }
    });
    (a, s.clone())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::DVector;

    use crate::dg::nodes::{
        nodes_2d,
        rs_to_ab,
        warp_factor,
        xy_to_rs,
    };

    #[test]
    fn it_computes_the_warp_factor() {
        let r = DVector::from_row_slice(&[-1.0, -0.6, -0.2, 0.2, 0.6, 1.0]);
        let warp = warp_factor(5, &r).unwrap();
        let expected = DVector::from_row_slice(&[
            0.0,
            -0.25789894363978888,
            -0.088782829667338789,
            0.088782829667338789,
            0.25789894363978888,
            0.0,
        ]);
        assert_abs_diff_eq!(warp, expected, epsilon = 1e-9);

        let r = DVector::from_row_slice(&[-0.8, 0.8]);
        let warp = warp_factor(5, &r).unwrap();
        assert_abs_diff_eq!(warp[0], -0.33400745526378611, epsilon = 1e-9);
        assert_abs_diff_eq!(warp[1], 0.33400745526378611, epsilon = 1e-9);
    }

    #[test]
    fn it_places_nodes_inside_the_reference_triangle() {
        for order in 1..=8 {
            let (x, y) = nodes_2d(order).unwrap();
            let (r, s) = xy_to_rs(&x, &y);
            assert_eq!(r.len(), (order + 1) * (order + 2) / 2);

            for k in 0..r.len() {
                assert!(r[k] >= -1.0 - 1e-10);
                assert!(s[k] >= -1.0 - 1e-10);
                assert!(r[k] + s[k] <= 1e-10);
            }

            // the three vertices are always part of the node set
            for (vr, vs) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0)] {
                assert!(
                    (0..r.len())
                        .any(|k| (r[k] - vr).abs() < 1e-10 && (s[k] - vs).abs() < 1e-10)
                );
            }
        }
    }

    #[test]
    fn it_maps_equilateral_vertices() {
        let sqrt3 = 3f64.sqrt();
        let x = DVector::from_row_slice(&[-1.0, 1.0, 0.0]);
        let y = DVector::from_row_slice(&[-1.0 / sqrt3, -1.0 / sqrt3, 2.0 / sqrt3]);
        let (r, s) = xy_to_rs(&x, &y);
        assert_abs_diff_eq!(r, DVector::from_row_slice(&[-1.0, 1.0, -1.0]), epsilon = 1e-12);
        assert_abs_diff_eq!(s, DVector::from_row_slice(&[-1.0, -1.0, 1.0]), epsilon = 1e-12);
    }

    #[test]
    fn it_collapses_coordinates() {
        let r = DVector::from_row_slice(&[-1.0, 0.0, -1.0]);
        let s = DVector::from_row_slice(&[-1.0, -1.0, 1.0]);
        let (a, b) = rs_to_ab(&r, &s);
        assert_eq!(a.as_slice(), &[-1.0, 0.0, -1.0]);
        assert_eq!(b, s);
    }
}
