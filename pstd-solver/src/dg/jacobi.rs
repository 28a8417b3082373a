use std::f64::consts::PI;

use nalgebra::{
    DMatrix,
    DVector,
    SymmetricEigen,
};

/// Gauss quadrature points and weights.
#[derive(Clone, Debug)]
pub struct GaussQuadrature {
    pub points: DVector<f64>,
    pub weights: DVector<f64>,
}

/// Normalized Jacobi polynomial `P_n^(α,β)` evaluated at `x`.
pub fn jacobi_p(x: &DVector<f64>, alpha: f64, beta: f64, n: usize) -> DVector<f64> {
    let ab = alpha + beta;
    let ab1 = ab + 1.0;
    let a1 = alpha + 1.0;
    let b1 = beta + 1.0;

    let gamma0 = 2f64.powf(ab1) / ab1 * gamma(a1) * gamma(b1) / gamma(ab1);
    let p0 = DVector::from_element(x.len(), 1.0 / gamma0.sqrt());
    if n == 0 {
        return p0;
    }

    let gamma1 = a1 * b1 / (ab + 3.0) * gamma0;
    let p1 = x.map(|x| ((ab + 2.0) * x / 2.0 + (alpha - beta) / 2.0) / gamma1.sqrt());
    if n == 1 {
        return p1;
    }

    let mut a_old = 2.0 / (2.0 + ab) * (a1 * b1 / (ab + 3.0)).sqrt();
    let mut previous = p0;
    let mut current = p1;

    for i in 1..n {
        let i = i as f64;
        let h1 = 2.0 * i + ab;
        let a_new = 2.0 / (h1 + 2.0)
            * ((i + 1.0) * (i + ab1) * (i + a1) * (i + b1) / (h1 + 1.0) / (h1 + 3.0)).sqrt();
        let b_new = -(alpha * alpha - beta * beta) / h1 / (h1 + 2.0);

        let next = DVector::from_fn(x.len(), |k, _| {
            (-a_old * previous[k] + (x[k] - b_new) * current[k]) / a_new
        });

        previous = std::mem::replace(&mut current, next);
        a_old = a_new;
    }

    current
}

/// Derivative of [`jacobi_p`].
pub fn grad_jacobi_p(x: &DVector<f64>, alpha: f64, beta: f64, n: usize) -> DVector<f64> {
    if n == 0 {
        DVector::zeros(x.len())
    }
    else {
        let n_f = n as f64;
        jacobi_p(x, alpha + 1.0, beta + 1.0, n - 1) * (n_f * (n_f + alpha + beta + 1.0)).sqrt()
    }
}

/// `n`-th order Gauss-Jacobi quadrature (`n + 1` points).
///
/// Points are the eigenvalues of the symmetric Golub-Welsch matrix, weights
/// follow from the first component of the eigenvectors.
pub fn jacobi_gq(alpha: f64, beta: f64, n: usize) -> GaussQuadrature {
    let ab = alpha + beta;

    if n == 0 {
        return GaussQuadrature {
            points: DVector::from_element(1, -(alpha - beta) / (ab + 2.0)),
            weights: DVector::from_element(1, 2.0),
        };
    }

    let size = n + 1;
    let mut matrix = DMatrix::zeros(size, size);

    for k in 0..size {
        let h1 = 2.0 * k as f64 + ab;
        matrix[(k, k)] = if k == 0 && ab.abs() < 10.0 * f64::EPSILON {
            0.0
        }
        else {
            -(alpha * alpha - beta * beta) / (h1 + 2.0) / h1
        };
    }

    for k in 0..n {
        let i = (k + 1) as f64;
        let h1 = 2.0 * k as f64 + ab;
        let value = 2.0 / (h1 + 2.0)
            * (i * (i + ab) * (i + alpha) * (i + beta) / (h1 + 1.0) / (h1 + 3.0)).sqrt();
        matrix[(k, k + 1)] = value;
        matrix[(k + 1, k)] = value;
    }

    let eigen = SymmetricEigen::new(matrix);

    let mut order = (0..size).collect::<Vec<_>>();
    order.sort_by(|a, b| eigen.eigenvalues[*a].total_cmp(&eigen.eigenvalues[*b]));

    let ab1 = ab + 1.0;
    let scale = 2f64.powf(ab1) / ab1 * gamma(alpha + 1.0) * gamma(beta + 1.0) / gamma(ab1);

    GaussQuadrature {
        points: DVector::from_iterator(size, order.iter().map(|i| eigen.eigenvalues[*i])),
        weights: DVector::from_iterator(
            size,
            order
                .iter()
                .map(|i| eigen.eigenvectors[(0, *i)].powi(2) * scale),
        ),
    }
}

/// `n`-th order Gauss-Lobatto-Jacobi points (`n + 1` points, including both
/// end points).
pub fn jacobi_gl(alpha: f64, beta: f64, n: usize) -> DVector<f64> {
    if n <= 1 {
        return DVector::from_vec(vec![-1.0, 1.0]);
    }

    let interior = jacobi_gq(alpha + 1.0, beta + 1.0, n - 2).points;

    let mut points = DVector::zeros(n + 1);
    points[0] = -1.0;
    points.rows_mut(1, n - 1).copy_from(&interior);
    points[n] = 1.0;
    points
}

/// Gamma function.
///
/// Exact for small positive integers, Lanczos approximation otherwise.
pub(super) fn gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x.fract() == 0.0 && (1.0..=20.0).contains(&x) {
        return (2..x as u64).product::<u64>() as f64;
    }

    if x < 0.5 {
        return PI / ((PI * x).sin() * gamma(1.0 - x));
    }

    let x = x - 1.0;
    let t = x + G + 0.5;
    let sum = COEFFICIENTS[1..]
        .iter()
        .enumerate()
        .fold(COEFFICIENTS[0], |sum, (i, c)| sum + c / (x + i as f64 + 1.0));

    (2.0 * PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * sum
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::DVector;

    use crate::dg::jacobi::{
        gamma,
        grad_jacobi_p,
        jacobi_gl,
        jacobi_gq,
        jacobi_p,
    };

    fn linspace(a: f64, b: f64, n: usize) -> DVector<f64> {
        DVector::from_fn(n, |i, _| a + (b - a) * i as f64 / (n - 1) as f64)
    }

    #[test]
    fn it_evaluates_gamma() {
        assert_eq!(gamma(1.0), 1.0);
        assert_eq!(gamma(5.0), 24.0);
        assert_abs_diff_eq!(gamma(0.5), std::f64::consts::PI.sqrt(), epsilon = 1e-13);
        assert_abs_diff_eq!(gamma(4.5), 11.631_728_396_567_45, epsilon = 1e-11);
    }

    #[test]
    fn it_computes_gauss_jacobi_points() {
        let quadrature = jacobi_gq(0.0, 0.0, 10);
        let points = [
            -0.978228658146057,
            -0.887062599768095,
            -0.730152005574049,
            -0.519096129206812,
            -0.269543155952345,
            0.0,
            0.269543155952345,
            0.519096129206812,
            0.730152005574049,
            0.887062599768095,
            0.978228658146057,
        ];
        let weights = [
            0.055668567116174,
            0.125580369464905,
            0.186290210927734,
            0.233193764591990,
            0.262804544510247,
            0.272925086777900,
            0.262804544510247,
            0.233193764591990,
            0.186290210927734,
            0.125580369464905,
            0.055668567116174,
        ];

        assert_abs_diff_eq!(
            quadrature.points,
            DVector::from_row_slice(&points),
            epsilon = 1e-10
        );
        assert_abs_diff_eq!(
            quadrature.weights,
            DVector::from_row_slice(&weights),
            epsilon = 1e-10
        );
        assert_abs_diff_eq!(quadrature.weights.sum(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn it_computes_the_single_gauss_jacobi_point() {
        let quadrature = jacobi_gq(1.0, 2.0, 0);
        assert_abs_diff_eq!(quadrature.points[0], 0.2, epsilon = 1e-15);
        assert_eq!(quadrature.weights[0], 2.0);
    }

    #[test]
    fn it_computes_gauss_lobatto_points() {
        let points = jacobi_gl(0.0, 0.0, 10);
        let expected = [
            -1.0,
            -0.934001430408059,
            -0.784483473663144,
            -0.565235326996205,
            -0.295758135586939,
            0.0,
            0.295758135586939,
            0.565235326996205,
            0.784483473663144,
            0.934001430408059,
            1.0,
        ];
        assert_abs_diff_eq!(points, DVector::from_row_slice(&expected), epsilon = 1e-10);

        let points = jacobi_gl(0.0, 0.0, 2);
        assert_eq!(points.as_slice(), &[-1.0, 0.0, 1.0]);

        let points = jacobi_gl(0.0, 0.0, 1);
        assert_eq!(points.as_slice(), &[-1.0, 1.0]);
    }

    #[test]
    fn it_evaluates_jacobi_polynomials() {
        let x = linspace(-1.0, 1.0, 10);

        let p0 = jacobi_p(&x, 0.0, 0.0, 0);
        assert_abs_diff_eq!(
            p0,
            DVector::from_element(10, 0.707106781186547),
            epsilon = 1e-12
        );

        let p10 = jacobi_p(&x, 0.0, 0.0, 10);
        let half = [
            3.240370349203935,
            1.003567253751228,
            -0.870728918581012,
            0.746148379111006,
            -0.311787881060553,
        ];
        let expected = DVector::from_iterator(10, half.iter().chain(half.iter().rev()).copied());
        assert_abs_diff_eq!(p10, expected, epsilon = 1e-10);
    }

    #[test]
    fn it_differentiates_jacobi_polynomials() {
        let x = linspace(-1.0, 1.0, 7);
        assert_eq!(grad_jacobi_p(&x, 0.0, 0.0, 0), DVector::zeros(7));

        // P_1 = sqrt(3/2) x
        let expected = DVector::from_element(7, 1.5f64.sqrt());
        assert_abs_diff_eq!(grad_jacobi_p(&x, 0.0, 0.0, 1), expected, epsilon = 1e-12);
    }
}
