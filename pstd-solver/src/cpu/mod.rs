mod receiver;

use std::sync::Arc;

use nalgebra::DMatrix;
use num::Complex;
use smallvec::SmallVec;

use crate::{
    config::{
        Axis,
        Side,
    },
    derivative::{
        Lines,
        Stencil,
        transform_length,
        windowed_derivative,
    },
    derived::RK_STAGES,
    domain::{
        Domain,
        DomainId,
        PmlAttenuation,
        Quantity,
        intersect,
    },
    error::KernelError,
    scene::Scene,
    traits::{
        SolverBackend,
        SolverInstance,
    },
    wisdom::Wisdom,
};

/// Defines how the solver iterates over domains in the update passes.
pub trait DomainForEach: Send + Sync + 'static {
    fn for_each<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send + Sync,
        F: Fn(usize, &mut T) + Send + Sync;

    fn try_for_each<T, E, F>(&self, items: &mut [T], f: F) -> Result<(), E>
    where
        T: Send + Sync,
        E: Send,
        F: Fn(usize, &mut T) -> Result<(), E> + Send + Sync;
}

/// Use single-threading
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleThreaded;

impl DomainForEach for SingleThreaded {
    fn for_each<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send + Sync,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        items
            .iter_mut()
            .enumerate()
            .for_each(|(index, item)| f(index, item))
    }

    fn try_for_each<T, E, F>(&self, items: &mut [T], f: F) -> Result<(), E>
    where
        T: Send + Sync,
        E: Send,
        F: Fn(usize, &mut T) -> Result<(), E> + Send + Sync,
    {
        items
            .iter_mut()
            .enumerate()
            .try_for_each(|(index, item)| f(index, item))
    }
}

/// Use multi-threading
#[cfg(feature = "rayon")]
#[derive(Clone, Debug)]
pub struct MultiThreaded {
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

#[cfg(feature = "rayon")]
impl DomainForEach for MultiThreaded {
    fn for_each<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send + Sync,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        use rayon::iter::{
            IndexedParallelIterator as _,
            IntoParallelRefMutIterator as _,
            ParallelIterator as _,
        };

        let mut f = || {
            items
                .par_iter_mut()
                .enumerate()
                .for_each(|(index, item)| f(index, item))
        };

        if let Some(thread_pool) = &self.thread_pool {
            thread_pool.install(f);
        }
        else {
            f();
        }
    }

    fn try_for_each<T, E, F>(&self, items: &mut [T], f: F) -> Result<(), E>
    where
        T: Send + Sync,
        E: Send,
        F: Fn(usize, &mut T) -> Result<(), E> + Send + Sync,
    {
        use rayon::iter::{
            IndexedParallelIterator as _,
            IntoParallelRefMutIterator as _,
            ParallelIterator as _,
        };

        let mut f = || {
            items
                .par_iter_mut()
                .enumerate()
                .try_for_each(|(index, item)| f(index, item))
        };

        if let Some(thread_pool) = &self.thread_pool {
            thread_pool.install(f)
        }
        else {
            f()
        }
    }
}

#[cfg(feature = "rayon")]
impl MultiThreaded {
    /// Use default number of threads (see [`rayon::current_num_threads`])
    pub fn from_default_thread_pool() -> Self {
        Self { thread_pool: None }
    }

    pub fn from_num_threads(num_threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("pstd-worker-{index}"))
            .build()?;
        Ok(Self {
            thread_pool: Some(Arc::new(thread_pool)),
        })
    }
}

#[cfg(feature = "rayon")]
impl PstdCpuBackend<MultiThreaded> {
    pub fn multi_threaded(num_threads: Option<usize>) -> Result<Self, rayon::ThreadPoolBuildError> {
        let threading = if let Some(num_threads) = num_threads {
            MultiThreaded::from_num_threads(num_threads)?
        }
        else {
            MultiThreaded::from_default_thread_pool()
        };

        Ok(Self { threading })
    }

    pub fn num_threads(&self) -> usize {
        self.threading
            .thread_pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, |thread_pool| {
                thread_pool.current_num_threads()
            })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PstdCpuBackend<Threading = SingleThreaded> {
    /// Whether to use single-threading or multi-threading
    pub threading: Threading,
}

impl PstdCpuBackend<SingleThreaded> {
    pub fn single_threaded() -> Self {
        Self {
            threading: SingleThreaded,
        }
    }
}

impl<Threading> SolverBackend for PstdCpuBackend<Threading>
where
    Threading: DomainForEach + Clone,
{
    type Instance = PstdCpuSolverInstance<Threading>;

    fn create_instance(
        &self,
        scene: &Arc<Scene>,
        wisdom: &Arc<Wisdom>,
    ) -> Result<Self::Instance, KernelError> {
        Ok(PstdCpuSolverInstance::new(
            scene.clone(),
            wisdom.clone(),
            self.threading.clone(),
        ))
    }

    fn memory_required(&self, scene: &Scene) -> Option<usize> {
        let values = scene
            .domains()
            .iter()
            .map(|(_, domain)| {
                let (h, w) = domain.shape();
                // p, px, py, the two stage copies and the two velocity
                // divergences are h*w. velocities, their stage copies and the
                // pressure gradients are staggered.
                7 * h * w + 3 * h * (w + 1) + 3 * (h + 1) * w
            })
            .sum::<usize>();
        Some(values * size_of::<f64>())
    }
}

#[derive(Clone, Debug)]
pub struct PstdCpuSolverInstance<Threading = SingleThreaded> {
    scene: Arc<Scene>,
    wisdom: Arc<Wisdom>,
    domain_ids: Vec<DomainId>,
    threading: Threading,
}

impl<Threading> PstdCpuSolverInstance<Threading> {
    fn new(scene: Arc<Scene>, wisdom: Arc<Wisdom>, threading: Threading) -> Self {
        let domain_ids = scene.domains().ids().collect();
        Self {
            scene,
            wisdom,
            domain_ids,
            threading,
        }
    }

    /// Computes the derivative of `quantity` along `axis` for one domain.
    ///
    /// `factors` replaces the derivative factors, e.g. to shift the field by
    /// a fraction of a cell instead.
    fn calculate(
        &self,
        fields: &[DomainFields],
        id: DomainId,
        axis: Axis,
        quantity: Quantity,
        factors: Option<&[Complex<f64>]>,
        dest: &mut DMatrix<f64>,
    ) -> Result<(), KernelError> {
        let scene = &*self.scene;
        let domain = scene.domain(id);
        let window = &scene.derived().window;
        let cross = axis.cross();
        let [lower_side, upper_side] = axis.sides();

        let neighbours = |side: Side| {
            let neighbours = domain.neighbours[side]
                .iter()
                .copied()
                .map(Some)
                .collect::<SmallVec<[Option<DomainId>; 2]>>();
            if neighbours.is_empty() {
                SmallVec::from_elem(None, 1)
            }
            else {
                neighbours
            }
        };
        let lowers = neighbours(lower_side);
        let uppers = neighbours(upper_side);

        let discretization;
        let factors: &[Complex<f64>] = match factors {
            Some(factors) => factors,
            None => {
                discretization = self.wisdom.discretizations.get_discretization(
                    scene.settings().grid_spacing,
                    transform_length(window.length, domain.rect.len(axis)),
                );
                match quantity {
                    Quantity::Pressure => &discretization.pressure_deriv_factors,
                    Quantity::Velocity => &discretization.velocity_deriv_factors,
                }
            }
        };

        let field = |id: DomainId| {
            let fields = &fields[id.index()];
            match (quantity, axis) {
                (Quantity::Pressure, _) => &fields.p,
                (Quantity::Velocity, Axis::X) => &fields.vx,
                (Quantity::Velocity, Axis::Y) => &fields.vy,
            }
        };

        let own_range = domain.rect.range(cross);

        for &lower in &lowers {
            for &upper in &uppers {
                let range = [lower, upper]
                    .into_iter()
                    .flatten()
                    .fold(own_range.clone(), |range, neighbour| {
                        intersect(range, scene.domain(neighbour).rect.range(cross))
                    });
                if range.is_empty() {
                    continue;
                }

                let lines = |id: DomainId| {
                    let start = scene.domain(id).rect.range(cross).start;
                    Lines::along(field(id), axis, (range.start - start) as usize)
                };

                let own = lines(id);
                let (lower_lines, upper_lines) =
                    if quantity == Quantity::Velocity && lower.is_none() && upper.is_none() {
                        let zeros = Lines::Zeros {
                            len: own.line_len(),
                        };
                        (zeros, zeros)
                    }
                    else {
                        (lines(lower.unwrap_or(id)), lines(upper.unwrap_or(id)))
                    };

                let rho = scene.rho_matrices(id, lower, upper);
                let stencil = Stencil {
                    window,
                    quantity,
                    rho: rho.get(quantity),
                    factors,
                };

                windowed_derivative(
                    &self.wisdom,
                    &stencil,
                    (range.end - range.start) as usize,
                    own,
                    lower_lines,
                    upper_lines,
                    dest,
                    axis,
                    (range.start - own_range.start) as usize,
                )?;
            }
        }

        Ok(())
    }

    fn compute_derivatives(
        &self,
        fields: &[DomainFields],
        index: usize,
        derivatives: &mut DomainDerivatives,
    ) -> Result<(), KernelError> {
        let id = self.domain_ids[index];
        let domain = self.scene.domain(id);
        if domain.is_rigid() {
            return Ok(());
        }

        if domain.should_update(Axis::X) {
            self.calculate(fields, id, Axis::X, Quantity::Pressure, None, &mut derivatives.dp_dx)?;
            self.calculate(fields, id, Axis::X, Quantity::Velocity, None, &mut derivatives.dvx_dx)?;
        }
        if domain.should_update(Axis::Y) {
            self.calculate(fields, id, Axis::Y, Quantity::Pressure, None, &mut derivatives.dp_dy)?;
            self.calculate(fields, id, Axis::Y, Quantity::Velocity, None, &mut derivatives.dvy_dy)?;
        }

        Ok(())
    }
}

impl<Threading> SolverInstance for PstdCpuSolverInstance<Threading>
where
    Threading: DomainForEach,
{
    type State = PstdCpuSolverState;

    fn create_state(&self) -> Self::State {
        let fields = self
            .domain_ids
            .iter()
            .map(|id| {
                let mut fields = DomainFields::new(self.scene.domain(*id));
                self.scene
                    .add_speaker_pulses(*id, &mut fields.p, &mut fields.px, &mut fields.py);
                fields
            })
            .collect();

        let derivatives = self
            .domain_ids
            .iter()
            .map(|id| DomainDerivatives::new(self.scene.domain(*id)))
            .collect();

        PstdCpuSolverState {
            fields,
            derivatives,
            frame: 0,
        }
    }

    fn step(&self, state: &mut Self::State) -> Result<(), KernelError> {
        let derived = self.scene.derived();
        let time_step = derived.time_step;
        let sound_speed_squared = derived.sound_speed.powi(2);

        self.threading
            .for_each(&mut state.fields, |_, fields| fields.save_stage());

        for stage in 0..RK_STAGES {
            let alpha = derived.rk_alpha[stage];

            // all derivatives only read the fields of this stage
            let fields = &state.fields;
            self.threading
                .try_for_each(&mut state.derivatives, |index, derivatives| {
                    self.compute_derivatives(fields, index, derivatives)
                })?;

            let derivatives = &state.derivatives;
            self.threading.for_each(&mut state.fields, |index, fields| {
                let domain = self.scene.domain(self.domain_ids[index]);
                if !domain.is_rigid() {
                    let velocity_factor = -time_step * alpha / domain.rho;
                    let pressure_factor = -time_step * alpha * domain.rho * sound_speed_squared;
                    fields.update(&derivatives[index], velocity_factor, pressure_factor);
                }
                fields.sum_pressure();
            });
        }

        let pml = &derived.pml;
        self.threading.for_each(&mut state.fields, |index, fields| {
            if let Some(attenuation) = self.scene.domain(self.domain_ids[index]).attenuation {
                fields.apply_pml(&attenuation, &pml.pressure, &pml.velocity);
            }
        });

        state.frame += 1;
        Ok(())
    }

    fn sample_receivers(&self, state: &Self::State) -> Result<Vec<f64>, KernelError> {
        self.scene
            .receivers()
            .iter()
            .map(|receiver| self.sample_receiver(state, receiver))
            .collect()
    }

    fn frame_data(&self, state: &Self::State, room: usize) -> Vec<f32> {
        let id = self.scene.rooms()[room];
        let p = &state.fields[id.index()].p;
        let mut data = Vec::with_capacity(p.len());
        for row in p.row_iter() {
            data.extend(row.iter().map(|value| *value as f32));
        }
        data
    }
}

#[derive(Clone, Debug)]
pub struct PstdCpuSolverState {
    fields: Vec<DomainFields>,
    derivatives: Vec<DomainDerivatives>,
    frame: usize,
}

impl PstdCpuSolverState {
    /// Number of frames computed so far.
    pub fn frame(&self) -> usize {
        self.frame
    }
}

/// Field arrays of one domain. Rows are `y`, columns are `x`.
#[derive(Clone, Debug)]
pub struct DomainFields {
    pub p: DMatrix<f64>,
    pub px: DMatrix<f64>,
    pub py: DMatrix<f64>,
    pub vx: DMatrix<f64>,
    pub vy: DMatrix<f64>,

    // values at the start of the frame
    px0: DMatrix<f64>,
    py0: DMatrix<f64>,
    vx0: DMatrix<f64>,
    vy0: DMatrix<f64>,
}

impl DomainFields {
    fn new(domain: &Domain) -> Self {
        let (h, w) = domain.shape();
        Self {
            p: DMatrix::zeros(h, w),
            px: DMatrix::zeros(h, w),
            py: DMatrix::zeros(h, w),
            vx: DMatrix::zeros(h, w + 1),
            vy: DMatrix::zeros(h + 1, w),
            px0: DMatrix::zeros(h, w),
            py0: DMatrix::zeros(h, w),
            vx0: DMatrix::zeros(h, w + 1),
            vy0: DMatrix::zeros(h + 1, w),
        }
    }

    fn save_stage(&mut self) {
        self.px0.copy_from(&self.px);
        self.py0.copy_from(&self.py);
        self.vx0.copy_from(&self.vx);
        self.vy0.copy_from(&self.vy);
    }

    fn update(&mut self, derivatives: &DomainDerivatives, velocity_factor: f64, pressure_factor: f64) {
        let stage = |factor: f64| move |value: &mut f64, start: f64, derivative: f64| {
            *value = start + factor * derivative;
        };
        self.vx
            .zip_zip_apply(&self.vx0, &derivatives.dp_dx, stage(velocity_factor));
        self.vy
            .zip_zip_apply(&self.vy0, &derivatives.dp_dy, stage(velocity_factor));
        self.px
            .zip_zip_apply(&self.px0, &derivatives.dvx_dx, stage(pressure_factor));
        self.py
            .zip_zip_apply(&self.py0, &derivatives.dvy_dy, stage(pressure_factor));
    }

    fn sum_pressure(&mut self) {
        self.p.copy_from(&self.px);
        self.p += &self.py;
    }

    fn apply_pml(&mut self, attenuation: &PmlAttenuation, pressure: &[f64], velocity: &[f64]) {
        for axis in [Axis::X, Axis::Y] {
            let Some(ascending) = attenuation.along(axis)
            else {
                continue;
            };

            let (p, v) = match axis {
                Axis::X => (&mut self.px, &mut self.vx),
                Axis::Y => (&mut self.py, &mut self.vy),
            };
            scale_along(p, axis, pressure, ascending);
            scale_along(v, axis, velocity, ascending);
        }
    }
}

/// Multiplies every line across `axis` with the matching factor.
fn scale_along(matrix: &mut DMatrix<f64>, axis: Axis, factors: &[f64], ascending: bool) {
    let n = factors.len();
    let factor = |i: usize| {
        if ascending {
            factors[i]
        }
        else {
            factors[n - 1 - i]
        }
    };

    match axis {
        Axis::X => {
            assert_eq!(matrix.ncols(), n, "pml factors don't match the layer width");
            for (i, mut column) in matrix.column_iter_mut().enumerate() {
                column *= factor(i);
            }
        }
        Axis::Y => {
            assert_eq!(matrix.nrows(), n, "pml factors don't match the layer height");
            for (i, mut row) in matrix.row_iter_mut().enumerate() {
                row *= factor(i);
            }
        }
    }
}

#[derive(Clone, Debug)]
struct DomainDerivatives {
    dp_dx: DMatrix<f64>,
    dp_dy: DMatrix<f64>,
    dvx_dx: DMatrix<f64>,
    dvy_dy: DMatrix<f64>,
}

impl DomainDerivatives {
    fn new(domain: &Domain) -> Self {
        let (h, w) = domain.shape();
        Self {
            dp_dx: DMatrix::zeros(h, w + 1),
            dp_dy: DMatrix::zeros(h + 1, w),
            dvx_dx: DMatrix::zeros(h, w),
            dvy_dy: DMatrix::zeros(h, w),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use nalgebra::{
        Point2,
        Vector2,
    };

    use crate::{
        config::{
            DomainConfig,
            DomainEdges,
            DomainSide,
            SceneConfig,
            Settings,
        },
        cpu::{
            PstdCpuBackend,
            PstdCpuSolverInstance,
            SingleThreaded,
        },
        scene::Scene,
        traits::{
            SolverBackend,
            SolverInstance,
        },
        wisdom::Wisdom,
    };

    fn scene(speakers: Vec<Point2<f64>>, receivers: Vec<Point2<f64>>) -> Arc<Scene> {
        let config = SceneConfig {
            settings: Settings {
                patch_error: 30.0,
                pml_cells: 5,
                grid_spacing: 1.0,
                render_time: 0.1,
                ..Default::default()
            },
            domains: vec![DomainConfig {
                top_left: Point2::origin(),
                size: Vector2::new(20.0, 20.0),
                edges: DomainEdges::default(),
            }],
            speakers,
            receivers,
        };
        Arc::new(Scene::new(&config).unwrap())
    }

    fn instance(scene: &Arc<Scene>) -> PstdCpuSolverInstance<SingleThreaded> {
        PstdCpuBackend::single_threaded()
            .create_instance(scene, &Arc::new(Wisdom::default()))
            .unwrap()
    }

    fn peak(data: &[f32]) -> f32 {
        data.iter().fold(0.0, |peak, value| peak.max(value.abs()))
    }

    fn energy(data: &[f32]) -> f64 {
        data.iter().map(|value| f64::from(*value).powi(2)).sum()
    }

    /// A 40 by 40 cell room with a long stencil window and layers thick
    /// enough for it.
    fn long_run_scene(absorption: f64) -> Arc<Scene> {
        let mut room = DomainConfig {
            top_left: Point2::origin(),
            size: Vector2::new(40.0, 40.0),
            edges: DomainEdges::default(),
        };
        room.set_absorption(DomainSide::ALL, absorption);

        let config = SceneConfig {
            settings: Settings {
                patch_error: 70.0,
                pml_cells: 34,
                grid_spacing: 1.0,
                render_time: 1.0,
                ..Default::default()
            },
            domains: vec![room],
            speakers: vec![Point2::new(20.5, 20.5)],
            receivers: vec![],
        };
        Arc::new(Scene::new(&config).unwrap())
    }

    #[test]
    fn it_estimates_memory_per_domain() {
        let scene = scene(vec![], vec![]);
        let expected = scene
            .domains()
            .iter()
            .map(|(_, domain)| {
                let (h, w) = domain.shape();
                7 * h * w + 3 * h * (w + 1) + 3 * (h + 1) * w
            })
            .sum::<usize>()
            * 8;
        let required = PstdCpuBackend::single_threaded().memory_required(&scene);
        assert_eq!(required, Some(expected));
    }

    #[test]
    fn it_keeps_a_silent_scene_silent() {
        let scene = scene(vec![], vec![]);
        let instance = instance(&scene);
        let mut state = instance.create_state();

        for _ in 0..3 {
            instance.step(&mut state).unwrap();
        }

        assert_eq!(state.frame(), 3);
        assert!(instance.frame_data(&state, 0).iter().all(|value| *value == 0.0));
    }

    #[test]
    fn it_starts_with_the_speaker_pulse() {
        let scene = scene(vec![Point2::new(10.5, 10.5)], vec![]);
        let instance = instance(&scene);
        let state = instance.create_state();

        let data = instance.frame_data(&state, 0);
        assert_eq!(data.len(), 400);
        // the speaker sits exactly on cell (10, 10)
        assert_abs_diff_eq!(data[10 * 20 + 10], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(peak(&data), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn it_spreads_the_pulse() {
        let scene = scene(vec![Point2::new(10.5, 10.5)], vec![]);
        let instance = instance(&scene);
        let mut state = instance.create_state();

        for _ in 0..10 {
            instance.step(&mut state).unwrap();
        }

        let data = instance.frame_data(&state, 0);
        assert!(data.iter().all(|value| value.is_finite()));
        assert!(peak(&data) < 1.0);
        assert!(peak(&data) > 0.0);
        // c * dt is half a cell, so the front has moved about 5 cells
        assert!(data[10 * 20 + 15].abs() > 1e-3);
    }

    #[test]
    fn it_interpolates_receivers_spectrally() {
        let speaker = Point2::new(10.0, 10.0);
        let receiver = Point2::new(12.3, 9.6);
        let scene = scene(vec![speaker], vec![receiver]);
        let instance = instance(&scene);
        let state = instance.create_state();

        let samples = instance.sample_receivers(&state).unwrap();
        let expected = (-scene.derived().band_width * (receiver - speaker).norm_squared()).exp();
        assert_eq!(samples.len(), 1);
        assert_abs_diff_eq!(samples[0], expected, epsilon = 1e-2);
    }

    #[test]
    fn it_samples_the_nearest_cell_without_interpolation() {
        let mut config = SceneConfig::default();
        config.settings = Settings {
            patch_error: 30.0,
            pml_cells: 5,
            grid_spacing: 1.0,
            render_time: 0.1,
            spectral_interpolation: false,
            ..Default::default()
        };
        config.domains[0].size = Vector2::new(20.0, 20.0);
        config.speakers = vec![Point2::new(10.5, 10.5)];
        config.receivers = vec![Point2::new(10.7, 10.4)];
        let scene = Arc::new(Scene::new(&config).unwrap());
        let instance = instance(&scene);
        let state = instance.create_state();

        let samples = instance.sample_receivers(&state).unwrap();
        assert_abs_diff_eq!(samples[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn it_falls_back_to_the_nearest_cell_next_to_thin_layers() {
        // the second room leaves a one cell wide gap along the shared wall,
        // which gets a local layer right next to the receiver
        let room = |y: f64, width: f64| {
            DomainConfig {
                top_left: Point2::new(0.0, y),
                size: Vector2::new(width, 10.0),
                edges: DomainEdges::default(),
            }
        };
        let config = SceneConfig {
            settings: Settings {
                patch_error: 30.0,
                pml_cells: 5,
                grid_spacing: 1.0,
                render_time: 0.1,
                ..Default::default()
            },
            domains: vec![room(0.0, 10.0), room(10.0, 9.0)],
            speakers: vec![Point2::new(9.5, 5.5)],
            receivers: vec![Point2::new(9.8, 5.0)],
        };
        let scene = Arc::new(Scene::new(&config).unwrap());
        let instance = instance(&scene);
        let mut state = instance.create_state();

        let samples = instance.sample_receivers(&state).unwrap();
        assert_eq!(samples.len(), 1);
        assert_abs_diff_eq!(samples[0], 1.0, epsilon = 1e-9);

        instance.step(&mut state).unwrap();
        let samples = instance.sample_receivers(&state).unwrap();
        assert!(samples[0].is_finite());
    }

    #[test]
    fn it_stays_bounded_in_a_rigid_room() {
        let scene = long_run_scene(0.0);
        let instance = instance(&scene);
        let mut state = instance.create_state();
        let initial = energy(&instance.frame_data(&state, 0));
        assert!(initial > 1.0);

        for frame in 1..=1000 {
            instance.step(&mut state).unwrap();
            if frame % 50 == 0 {
                let energy = energy(&instance.frame_data(&state, 0));
                assert!(
                    energy.is_finite() && energy < 2.0 * initial,
                    "energy {energy} at frame {frame}, started at {initial}"
                );
            }
        }
    }

    #[test]
    fn it_loses_energy_through_absorbing_walls() {
        let scene = long_run_scene(0.5);
        let instance = instance(&scene);
        let mut state = instance.create_state();
        let initial = energy(&instance.frame_data(&state, 0));

        for _ in 0..400 {
            instance.step(&mut state).unwrap();
        }

        let energy = energy(&instance.frame_data(&state, 0));
        assert!(energy.is_finite());
        assert!(
            energy < 0.25 * initial,
            "energy {energy} after 400 frames, started at {initial}"
        );
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn it_computes_the_same_with_multiple_threads() {
        let scene = scene(vec![Point2::new(8.0, 12.0)], vec![]);
        let wisdom = Arc::new(Wisdom::default());
        let single = PstdCpuBackend::single_threaded()
            .create_instance(&scene, &wisdom)
            .unwrap();
        let multi = PstdCpuBackend::multi_threaded(Some(2))
            .unwrap()
            .create_instance(&scene, &wisdom)
            .unwrap();

        assert_eq!(PstdCpuBackend::multi_threaded(Some(2)).unwrap().num_threads(), 2);

        let mut single_state = single.create_state();
        let mut multi_state = multi.create_state();
        for _ in 0..4 {
            single.step(&mut single_state).unwrap();
            multi.step(&mut multi_state).unwrap();
        }

        assert_eq!(
            single.frame_data(&single_state, 0),
            multi.frame_data(&multi_state, 0)
        );
    }
}
