//! Entry point for driving simulations.
//!
//! A [`Kernel`] is configured with a [`SceneConfig`] and then runs it on the
//! selected [`Backend`], reporting progress and data through a
//! [`KernelCallback`].

use std::{
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    thread::JoinHandle,
};

use parking_lot::{
    Mutex,
    RwLock,
};
use pstd_util::format_size;

use crate::{
    config::SceneConfig,
    cpu::PstdCpuBackend,
    error::KernelError,
    scene::{
        Scene,
        SimulationMetadata,
    },
    traits::{
        SolverBackend,
        SolverInstance,
    },
    wisdom::Wisdom,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    Mock,
    Cpu,
    Gpu,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Parallelization {
    #[default]
    SingleThreaded,
    /// Uses a rayon thread pool. `None` uses rayon's global pool.
    MultiThreaded { num_threads: Option<usize> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Produces zero frames without solving anything.
    Mock,
    Cpu { parallelization: Parallelization },
    Gpu,
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Mock => BackendKind::Mock,
            Self::Cpu { .. } => BackendKind::Cpu,
            Self::Gpu => BackendKind::Gpu,
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::Cpu {
            parallelization: Default::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum CallbackStatus {
    Starting,
    Running,
    Finished,
    Cancelled,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

/// Receives progress and data of a run.
pub trait KernelCallback {
    fn status(&mut self, status: CallbackStatus, message: &str, frame: Option<usize>);

    /// Pressure of a configured domain, row-major with `width * height`
    /// values.
    fn write_frame(&mut self, frame: usize, domain: usize, data: &[f32]);

    /// Receiver samples, starting at frame `start_sample`.
    fn write_sample(&mut self, start_sample: usize, receiver: usize, data: &[f32]) {
        let _ = (start_sample, receiver, data);
    }

    fn log(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Fatal | LogLevel::Error => tracing::error!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
        }
    }
}

/// Cooperative stop flag, checked once per frame.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SolverStatus {
    #[default]
    Idle,
    Running {
        frame: usize,
    },
    Finished,
    Failed,
    Cancelled {
        frame: usize,
    },
}

#[derive(Debug)]
pub struct Kernel {
    backend: Backend,
    wisdom: Arc<Wisdom>,
    scene: RwLock<Option<Arc<Scene>>>,
    status: RwLock<SolverStatus>,
    run_lock: Mutex<()>,
}

impl Kernel {
    pub fn new(backend: Backend, wisdom: Arc<Wisdom>) -> Self {
        Self {
            backend,
            wisdom,
            scene: RwLock::new(None),
            status: RwLock::new(SolverStatus::Idle),
            run_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn wisdom(&self) -> &Arc<Wisdom> {
        &self.wisdom
    }

    pub fn status(&self) -> SolverStatus {
        *self.status.read()
    }

    /// Validates the configuration and replaces the current scene.
    ///
    /// On error the previous configuration stays in place.
    pub fn configure(&self, config: &SceneConfig) -> Result<(), KernelError> {
        let scene = Scene::new(config)?;
        *self.scene.write() = Some(Arc::new(scene));
        Ok(())
    }

    pub fn scene(&self) -> Result<Arc<Scene>, KernelError> {
        self.scene.read().clone().ok_or(KernelError::NotConfigured)
    }

    pub fn metadata(&self) -> Result<SimulationMetadata, KernelError> {
        Ok(self.scene()?.metadata())
    }

    /// Runs the configured scene to completion, or until `stop` is set.
    pub fn run(
        &self,
        callback: &mut dyn KernelCallback,
        stop: &StopSignal,
    ) -> Result<(), KernelError> {
        let scene = self.scene()?;
        let _guard = self
            .run_lock
            .try_lock()
            .ok_or(KernelError::AlreadyRunning)?;

        tracing::info!(
            backend = %self.backend.kind(),
            frame_count = scene.derived().frame_count,
            "starting run"
        );
        *self.status.write() = SolverStatus::Running { frame: 0 };

        let result = match self.backend {
            Backend::Mock => self.run_mock(&scene, callback, stop),
            Backend::Cpu { parallelization } => {
                match parallelization {
                    Parallelization::SingleThreaded => {
                        self.run_with_backend(
                            &PstdCpuBackend::single_threaded(),
                            &scene,
                            callback,
                            stop,
                        )
                    }
                    #[cfg(feature = "rayon")]
                    Parallelization::MultiThreaded { num_threads } => {
                        match PstdCpuBackend::multi_threaded(num_threads) {
                            Ok(backend) => {
                                tracing::debug!(num_threads = backend.num_threads(), "using thread pool");
                                self.run_with_backend(&backend, &scene, callback, stop)
                            }
                            Err(error) => {
                                Err(KernelError::invalid(format!(
                                    "failed to build thread pool: {error}"
                                )))
                            }
                        }
                    }
                    #[cfg(not(feature = "rayon"))]
                    Parallelization::MultiThreaded { .. } => {
                        tracing::warn!("built without rayon, running single-threaded");
                        self.run_with_backend(
                            &PstdCpuBackend::single_threaded(),
                            &scene,
                            callback,
                            stop,
                        )
                    }
                }
            }
            Backend::Gpu => Err(KernelError::UnsupportedBackend(BackendKind::Gpu)),
        };

        *self.status.write() = match &result {
            Ok(()) => SolverStatus::Finished,
            Err(KernelError::CancelledByCaller { frame }) => SolverStatus::Cancelled { frame: *frame },
            Err(error) => {
                tracing::error!(%error, "run failed");
                callback.status(CallbackStatus::Error, &error.to_string(), None);
                SolverStatus::Failed
            }
        };

        result
    }

    /// Runs the scene with a specific solver backend.
    pub fn run_with_backend<B>(
        &self,
        backend: &B,
        scene: &Arc<Scene>,
        callback: &mut dyn KernelCallback,
        stop: &StopSignal,
    ) -> Result<(), KernelError>
    where
        B: SolverBackend,
    {
        if let Some(memory_required) = backend.memory_required(scene) {
            tracing::info!(memory_required = %format_size(memory_required), "allocating fields");
            callback.log(
                LogLevel::Info,
                &format!("allocating {} for field data", format_size(memory_required)),
            );
        }

        callback.status(CallbackStatus::Starting, "starting simulation", None);

        let instance = backend.create_instance(scene, &self.wisdom)?;
        let state = instance.create_state();

        self.run_frames(scene, callback, stop, &mut SolverFrames { instance, state })
    }

    fn run_mock(
        &self,
        scene: &Scene,
        callback: &mut dyn KernelCallback,
        stop: &StopSignal,
    ) -> Result<(), KernelError> {
        callback.status(CallbackStatus::Starting, "starting mock simulation", None);
        self.run_frames(scene, callback, stop, &mut MockFrames { scene })
    }

    /// Frame loop shared by all backends.
    fn run_frames(
        &self,
        scene: &Scene,
        callback: &mut dyn KernelCallback,
        stop: &StopSignal,
        frames: &mut dyn Frames,
    ) -> Result<(), KernelError> {
        let frame_count = scene.derived().frame_count;
        let save_nth = scene.settings().save_nth;

        for frame in 0..frame_count {
            if stop.is_stopped() {
                tracing::info!(frame, "run cancelled");
                callback.status(CallbackStatus::Cancelled, "simulation cancelled", Some(frame));
                return Err(KernelError::CancelledByCaller { frame });
            }

            frames.advance(frame, callback)?;

            *self.status.write() = SolverStatus::Running { frame };
            callback.status(
                CallbackStatus::Running,
                &format!("frame {} of {frame_count}", frame + 1),
                Some(frame),
            );

            if frame % save_nth == 0 {
                for room in 0..scene.rooms().len() {
                    callback.write_frame(frame, room, &frames.frame_data(room));
                }
            }
        }

        tracing::info!(frame_count, "run finished");
        callback.status(CallbackStatus::Finished, "simulation finished", None);
        Ok(())
    }

    /// Runs the configured scene on a background thread.
    pub fn spawn<C>(self: &Arc<Self>, mut callback: C) -> Result<RunHandle, KernelError>
    where
        C: KernelCallback + Send + 'static,
    {
        self.scene()?;

        let stop = StopSignal::new();
        let join_handle = std::thread::spawn({
            let kernel = self.clone();
            let stop = stop.clone();
            move || kernel.run(&mut callback, &stop)
        });

        Ok(RunHandle { stop, join_handle })
    }
}

/// Source of frames for the frame loop.
trait Frames {
    fn advance(&mut self, frame: usize, callback: &mut dyn KernelCallback) -> Result<(), KernelError>;

    fn frame_data(&self, room: usize) -> Vec<f32>;
}

struct SolverFrames<I: SolverInstance> {
    instance: I,
    state: I::State,
}

impl<I: SolverInstance> Frames for SolverFrames<I> {
    fn advance(&mut self, frame: usize, callback: &mut dyn KernelCallback) -> Result<(), KernelError> {
        self.instance.step(&mut self.state)?;

        let samples = self.instance.sample_receivers(&self.state)?;
        for (receiver, sample) in samples.into_iter().enumerate() {
            callback.write_sample(frame, receiver, &[sample as f32]);
        }

        Ok(())
    }

    fn frame_data(&self, room: usize) -> Vec<f32> {
        self.instance.frame_data(&self.state, room)
    }
}

/// Zero frames.
struct MockFrames<'a> {
    scene: &'a Scene,
}

impl Frames for MockFrames<'_> {
    fn advance(&mut self, _frame: usize, _callback: &mut dyn KernelCallback) -> Result<(), KernelError> {
        Ok(())
    }

    fn frame_data(&self, room: usize) -> Vec<f32> {
        let domain = self.scene.domain(self.scene.rooms()[room]);
        vec![0.0; domain.rect.width() * domain.rect.height()]
    }
}

/// A run on a background thread.
#[derive(Debug)]
pub struct RunHandle {
    stop: StopSignal,
    join_handle: JoinHandle<Result<(), KernelError>>,
}

impl RunHandle {
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Signals the run to stop and waits for it.
    pub fn stop(self) -> Result<(), KernelError> {
        self.stop.stop();
        self.join()
    }

    pub fn join(self) -> Result<(), KernelError> {
        self.join_handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nalgebra::{
        Point2,
        Vector2,
    };

    use crate::{
        config::{
            SceneConfig,
            Settings,
        },
        error::KernelError,
        kernel::{
            Backend,
            BackendKind,
            CallbackStatus,
            Kernel,
            KernelCallback,
            SolverStatus,
            StopSignal,
        },
        wisdom::Wisdom,
    };

    #[derive(Debug, Default)]
    struct Recorder {
        statuses: Vec<(CallbackStatus, Option<usize>)>,
        frames: Vec<(usize, usize, usize)>,
        samples: Vec<(usize, usize)>,
        stop_after: Option<(usize, StopSignal)>,
    }

    impl KernelCallback for Recorder {
        fn status(&mut self, status: CallbackStatus, _message: &str, frame: Option<usize>) {
            self.statuses.push((status, frame));
            if let (CallbackStatus::Running, Some(frame), Some((stop_after, stop))) =
                (status, frame, &self.stop_after)
            {
                if frame == *stop_after {
                    stop.stop();
                }
            }
        }

        fn write_frame(&mut self, frame: usize, domain: usize, data: &[f32]) {
            self.frames.push((frame, domain, data.len()));
        }

        fn write_sample(&mut self, start_sample: usize, receiver: usize, _data: &[f32]) {
            self.samples.push((start_sample, receiver));
        }
    }

    impl Recorder {
        fn running_frames(&self) -> Vec<usize> {
            self.statuses
                .iter()
                .filter(|(status, _)| *status == CallbackStatus::Running)
                .filter_map(|(_, frame)| *frame)
                .collect()
        }
    }

    fn small_config(render_time: f64) -> SceneConfig {
        let mut config = SceneConfig {
            settings: Settings {
                patch_error: 30.0,
                pml_cells: 5,
                grid_spacing: 1.0,
                render_time,
                ..Default::default()
            },
            ..Default::default()
        };
        config.domains[0].size = Vector2::new(20.0, 15.0);
        config.speakers = vec![Point2::new(8.0, 7.0)];
        config.receivers = vec![Point2::new(12.0, 7.0)];
        config
    }

    fn kernel(backend: Backend) -> Kernel {
        Kernel::new(backend, Arc::new(Wisdom::default()))
    }

    #[test]
    fn it_reports_the_frame_count() {
        let kernel = kernel(Backend::Mock);
        kernel.configure(&SceneConfig::default()).unwrap();

        let metadata = kernel.metadata().unwrap();
        let time_step: f64 = 0.5 * 0.2 / 340.0;
        assert_eq!(metadata.frame_count, (1.0 / time_step).ceil() as usize);
        assert_eq!(metadata.domains.len(), 1);
        assert_eq!(metadata.domains[0].width, 50);
        assert_eq!(metadata.domains[0].height, 50);
        assert_eq!(metadata.domains[0].depth, 1);
    }

    #[test]
    fn it_fails_without_configuration() {
        let kernel = kernel(Backend::Mock);
        assert!(matches!(kernel.metadata(), Err(KernelError::NotConfigured)));

        let mut recorder = Recorder::default();
        let result = kernel.run(&mut recorder, &StopSignal::new());
        assert!(matches!(result, Err(KernelError::NotConfigured)));
        assert!(recorder.statuses.is_empty());
    }

    #[test]
    fn it_keeps_the_previous_scene_on_invalid_configuration() {
        let kernel = kernel(Backend::Mock);
        kernel.configure(&small_config(0.01)).unwrap();

        let mut invalid = small_config(0.01);
        invalid.settings.grid_spacing = 0.0;
        assert!(kernel.configure(&invalid).is_err());

        let metadata = kernel.metadata().unwrap();
        assert_eq!(metadata.domains[0].width, 20);
        assert_eq!(metadata.domains[0].height, 15);
    }

    #[test]
    fn it_reports_every_frame_in_order() {
        let kernel = kernel(Backend::Mock);
        let config = small_config(0.02);
        kernel.configure(&config).unwrap();
        let frame_count = kernel.metadata().unwrap().frame_count;

        let mut recorder = Recorder::default();
        kernel.run(&mut recorder, &StopSignal::new()).unwrap();

        assert_eq!(recorder.statuses.first(), Some(&(CallbackStatus::Starting, None)));
        assert_eq!(recorder.statuses.last(), Some(&(CallbackStatus::Finished, None)));
        assert_eq!(recorder.running_frames(), (0..frame_count).collect::<Vec<_>>());
        assert_eq!(
            recorder.frames,
            (0..frame_count).map(|frame| (frame, 0, 300)).collect::<Vec<_>>()
        );
        assert_eq!(kernel.status(), SolverStatus::Finished);
    }

    #[test]
    fn it_saves_every_nth_frame() {
        let kernel = kernel(Backend::Mock);
        let mut config = small_config(0.02);
        config.settings.save_nth = 3;
        kernel.configure(&config).unwrap();
        let frame_count = kernel.metadata().unwrap().frame_count;

        let mut recorder = Recorder::default();
        kernel.run(&mut recorder, &StopSignal::new()).unwrap();

        let saved = recorder
            .frames
            .iter()
            .map(|(frame, _, _)| *frame)
            .collect::<Vec<_>>();
        assert_eq!(saved, (0..frame_count).step_by(3).collect::<Vec<_>>());
    }

    #[test]
    fn it_runs_the_cpu_solver() {
        let kernel = kernel(Backend::default());
        kernel.configure(&small_config(0.01)).unwrap();
        let frame_count = kernel.metadata().unwrap().frame_count;

        let mut recorder = Recorder::default();
        kernel.run(&mut recorder, &StopSignal::new()).unwrap();

        assert_eq!(recorder.running_frames(), (0..frame_count).collect::<Vec<_>>());
        assert_eq!(recorder.frames.len(), frame_count);
        assert_eq!(
            recorder.samples,
            (0..frame_count).map(|frame| (frame, 0)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn it_stops_at_a_frame_boundary() {
        let kernel = kernel(Backend::Mock);
        kernel.configure(&small_config(0.02)).unwrap();

        let stop = StopSignal::new();
        let mut recorder = Recorder {
            stop_after: Some((2, stop.clone())),
            ..Default::default()
        };
        let result = kernel.run(&mut recorder, &stop);

        assert!(matches!(result, Err(KernelError::CancelledByCaller { frame: 3 })));
        assert!(result.unwrap_err().is_cancellation());
        assert_eq!(recorder.running_frames(), vec![0, 1, 2]);
        assert!(recorder.frames.iter().all(|(frame, _, _)| *frame <= 2));
        assert_eq!(recorder.statuses.last(), Some(&(CallbackStatus::Cancelled, Some(3))));
        assert_eq!(kernel.status(), SolverStatus::Cancelled { frame: 3 });
    }

    #[test]
    fn it_rejects_concurrent_runs() {
        struct Reentrant<'a> {
            kernel: &'a Kernel,
            result: Option<Result<(), KernelError>>,
        }

        impl KernelCallback for Reentrant<'_> {
            fn status(&mut self, status: CallbackStatus, _message: &str, _frame: Option<usize>) {
                if status == CallbackStatus::Starting && self.result.is_none() {
                    self.result = Some(
                        self.kernel
                            .run(&mut Recorder::default(), &StopSignal::new()),
                    );
                }
            }

            fn write_frame(&mut self, _frame: usize, _domain: usize, _data: &[f32]) {}
        }

        let kernel = kernel(Backend::Mock);
        kernel.configure(&small_config(0.01)).unwrap();

        let mut callback = Reentrant {
            kernel: &kernel,
            result: None,
        };
        kernel.run(&mut callback, &StopSignal::new()).unwrap();

        assert!(matches!(callback.result, Some(Err(KernelError::AlreadyRunning))));
    }

    #[test]
    fn it_reports_unsupported_backends() {
        let kernel = kernel(Backend::Gpu);
        kernel.configure(&small_config(0.01)).unwrap();

        let mut recorder = Recorder::default();
        let result = kernel.run(&mut recorder, &StopSignal::new());

        assert!(matches!(
            result,
            Err(KernelError::UnsupportedBackend(BackendKind::Gpu))
        ));
        assert_eq!(recorder.statuses, vec![(CallbackStatus::Error, None)]);
        assert_eq!(kernel.status(), SolverStatus::Failed);
    }

    #[test]
    fn it_runs_in_the_background() {
        let kernel = Arc::new(kernel(Backend::Mock));
        kernel.configure(&small_config(0.01)).unwrap();

        let handle = kernel.spawn(Recorder::default()).unwrap();
        handle.join().unwrap();
        assert_eq!(kernel.status(), SolverStatus::Finished);
    }
}
