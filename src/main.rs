#![warn(clippy::todo, unused_qualifications)]

mod args;
mod files;
mod output;

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{
    Error,
    WrapErr,
};
use dotenvy::dotenv;
use pstd_solver::{
    Kernel,
    KernelError,
    SceneConfig,
    StopSignal,
    Wisdom,
};
use tracing_subscriber::EnvFilter;

use crate::{
    args::{
        Args,
        Command,
        RunArgs,
    },
    files::read_scene,
    output::FrameWriter,
};

fn main() -> Result<(), Error> {
    let _ = dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let args = Args::parse();
    match args.command {
        Command::Run(args) => run(args)?,
        Command::Metadata { scene, format } => {
            let config = read_scene(&scene)?;
            let kernel = Kernel::new(Default::default(), Default::default());
            kernel.configure(&config)?;
            println!("{}", format.to_string_pretty(&kernel.metadata()?)?);
        }
        Command::DumpDefaultConfig { output, format } => {
            let config = format.to_string_pretty(&SceneConfig::default())?;
            if let Some(output) = &output {
                std::fs::write(output, &config)
                    .wrap_err_with(|| format!("Could not write config: {}", output.display()))?;
            }
            else {
                println!("{config}");
            }
        }
    }

    Ok(())
}

fn run(args: RunArgs) -> Result<(), Error> {
    let config = read_scene(&args.scene)?;
    let kernel = Kernel::new(args.backend(), Arc::new(Wisdom::default()));
    kernel.configure(&config)?;

    let metadata = kernel.metadata()?;
    tracing::info!(
        scene = %args.scene.display(),
        output = %args.output.display(),
        frame_count = metadata.frame_count,
        domains = metadata.domains.len(),
        "configured scene"
    );

    let stop = StopSignal::new();
    let mut writer = FrameWriter::new(&args.output, &metadata, stop.clone())?;
    let result = kernel.run(&mut writer, &stop);

    // write errors cancel the run
    writer.finish()?;

    match result {
        Err(KernelError::CancelledByCaller { frame }) => {
            tracing::warn!(frame, "simulation was cancelled");
            Ok(())
        }
        result => Ok(result?),
    }
}
