#![warn(clippy::todo, unused_qualifications)]

//! Pseudo-spectral time-domain solver for 2D room acoustics.

pub mod config;
pub mod cpu;
pub mod derivative;
pub mod derived;
pub mod dg;
pub mod domain;
pub mod error;
pub mod kernel;
pub mod scene;
pub mod traits;
pub mod wisdom;

pub use crate::{
    config::{
        DomainConfig,
        DomainSide,
        SceneConfig,
        Settings,
    },
    error::KernelError,
    kernel::{
        Backend,
        CallbackStatus,
        Kernel,
        KernelCallback,
        LogLevel,
        Parallelization,
        StopSignal,
    },
    scene::SimulationMetadata,
    wisdom::Wisdom,
};
