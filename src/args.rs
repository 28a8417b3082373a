use std::path::PathBuf;

use clap::{
    Parser,
    Subcommand,
    ValueEnum,
};
use pstd_solver::{
    Backend,
    Parallelization,
};

use crate::files::ConfigFormat;

#[derive(Debug, Parser)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a simulation and write frames and receiver samples.
    Run(RunArgs),

    /// Print domain sizes and frame count of a scene.
    Metadata {
        scene: PathBuf,

        #[clap(short, long, default_value = "toml")]
        format: ConfigFormat,
    },

    DumpDefaultConfig {
        #[clap(short, long)]
        output: Option<PathBuf>,

        #[clap(short, long, default_value = "toml")]
        format: ConfigFormat,
    },
}

#[derive(Clone, Debug, clap::Args)]
pub struct RunArgs {
    /// Scene file (`.toml` or `.json`)
    pub scene: PathBuf,

    /// Directory for frame and receiver data
    #[clap(short, long, default_value = "output")]
    pub output: PathBuf,

    #[clap(short, long, default_value = "cpu")]
    pub backend: BackendArg,

    /// Number of worker threads. Uses all cores if not set.
    #[clap(short = 'j', long)]
    pub threads: Option<usize>,

    #[clap(long)]
    pub single_threaded: bool,
}

impl RunArgs {
    pub fn backend(&self) -> Backend {
        match self.backend {
            BackendArg::Mock => Backend::Mock,
            BackendArg::Gpu => Backend::Gpu,
            BackendArg::Cpu => {
                let parallelization = if self.single_threaded {
                    Parallelization::SingleThreaded
                }
                else {
                    Parallelization::MultiThreaded {
                        num_threads: self.threads,
                    }
                };
                Backend::Cpu { parallelization }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum BackendArg {
    Cpu,
    Mock,
    Gpu,
}
