use std::sync::Arc;

use crate::{
    error::KernelError,
    scene::Scene,
    wisdom::Wisdom,
};

pub trait SolverBackend {
    type Instance: SolverInstance;

    fn create_instance(
        &self,
        scene: &Arc<Scene>,
        wisdom: &Arc<Wisdom>,
    ) -> Result<Self::Instance, KernelError>;

    fn memory_required(&self, scene: &Scene) -> Option<usize> {
        let _ = scene;
        None
    }
}

pub trait SolverInstance {
    type State;

    fn create_state(&self) -> Self::State;

    /// Advances the state by one frame.
    fn step(&self, state: &mut Self::State) -> Result<(), KernelError>;

    /// Pressure at every receiver, in receiver order.
    fn sample_receivers(&self, state: &Self::State) -> Result<Vec<f64>, KernelError>;

    /// Pressure of a configured domain, row-major.
    fn frame_data(&self, state: &Self::State, room: usize) -> Vec<f32>;
}
