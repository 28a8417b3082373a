use nalgebra::DMatrix;

/// Coefficients of the five stage, fourth order low storage Runge-Kutta
/// scheme by Carpenter & Kennedy.
const RK4A: [f64; 5] = [
    0.0,
    -567_301_805_773.0 / 1_357_537_059_087.0,
    -2_404_267_990_393.0 / 2_016_746_695_238.0,
    -3_550_918_686_646.0 / 2_091_501_179_385.0,
    -1_275_806_237_668.0 / 842_570_457_699.0,
];

const RK4B: [f64; 5] = [
    1_432_997_174_477.0 / 9_575_080_441_755.0,
    5_161_836_677_717.0 / 13_612_068_292_357.0,
    1_720_146_321_549.0 / 2_090_206_949_498.0,
    3_134_564_353_537.0 / 4_481_467_310_338.0,
    2_277_821_191_437.0 / 14_882_151_754_819.0,
];

const RK4C: [f64; 5] = [
    0.0,
    1_432_997_174_477.0 / 9_575_080_441_755.0,
    2_526_269_341_429.0 / 6_820_363_962_896.0,
    2_006_345_519_317.0 / 3_224_310_063_776.0,
    2_802_321_613_138.0 / 2_924_317_926_251.0,
];

/// Low storage Runge-Kutta integrator for nodal DG right hand sides.
///
/// Only one residual buffer of the state's shape is kept between stages.
#[derive(Clone, Debug)]
pub struct Lserk {
    residual: DMatrix<f64>,
}

impl Lserk {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            residual: DMatrix::zeros(nrows, ncols),
        }
    }

    /// Advances `state` from `time` to `time + dt`.
    pub fn step<F>(&mut self, time: f64, dt: f64, state: &mut DMatrix<f64>, mut rhs: F)
    where
        F: FnMut(f64, &DMatrix<f64>) -> DMatrix<f64>,
    {
        assert_eq!(state.shape(), self.residual.shape());

        for stage in 0..5 {
            let derivative = rhs(time + RK4C[stage] * dt, state);
            self.residual *= RK4A[stage];
            self.residual += dt * derivative;
            *state += RK4B[stage] * &self.residual;
        }
    }
}
