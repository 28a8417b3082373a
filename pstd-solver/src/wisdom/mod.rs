//! Process-wide caches of spectral data.
//!
//! Both caches are insert-only and shared between all domains and runs that
//! use the same [`Wisdom`].

mod discretization;
mod plan;

pub use self::{
    discretization::{
        DiscretizationCache,
        GridDiscretization,
        discretize_wave_numbers,
    },
    plan::{
        PlanCache,
        TransformPlanSet,
    },
};

#[derive(Debug, Default)]
pub struct Wisdom {
    pub discretizations: DiscretizationCache,
    pub plans: PlanCache,
}
