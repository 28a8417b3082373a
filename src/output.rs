use std::{
    fs::File,
    io::{
        BufWriter,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
};

use color_eyre::eyre::{
    Error,
    WrapErr,
};
use pstd_solver::{
    CallbackStatus,
    KernelCallback,
    SimulationMetadata,
    StopSignal,
};

/// Writes raw native-endian `f32` data.
///
/// Every saved frame of a domain goes into `{domain}-{frame:06}.bin`, and
/// receiver samples are appended to `rec-{receiver}.bin`.
#[derive(derive_more::Debug)]
pub struct FrameWriter {
    directory: PathBuf,
    domain_names: Vec<String>,
    #[debug(ignore)]
    receivers: Vec<Option<BufWriter<File>>>,
    stop: StopSignal,
    error: Option<Error>,
    frames_written: usize,
}

impl FrameWriter {
    pub fn new(
        directory: &Path,
        metadata: &SimulationMetadata,
        stop: StopSignal,
    ) -> Result<Self, Error> {
        std::fs::create_dir_all(directory)
            .wrap_err_with(|| format!("Could not create output directory: {}", directory.display()))?;

        Ok(Self {
            directory: directory.to_owned(),
            domain_names: metadata
                .domains
                .iter()
                .map(|domain| domain.name.clone())
                .collect(),
            receivers: vec![],
            stop,
            error: None,
            frames_written: 0,
        })
    }

    pub fn frame_path(&self, frame: usize, domain: usize) -> PathBuf {
        let name = self
            .domain_names
            .get(domain)
            .cloned()
            .unwrap_or_else(|| format!("domain{domain}"));
        self.directory.join(format!("{name}-{frame:06}.bin"))
    }

    pub fn receiver_path(&self, receiver: usize) -> PathBuf {
        self.directory.join(format!("rec-{receiver}.bin"))
    }

    /// Flushes receiver files and returns the first write error.
    pub fn finish(mut self) -> Result<(), Error> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        for file in self.receivers.iter_mut().flatten() {
            file.flush()?;
        }

        tracing::info!(
            frames_written = self.frames_written,
            directory = %self.directory.display(),
            "output written"
        );
        Ok(())
    }

    fn fail(&mut self, error: Error) {
        tracing::error!(%error, "write failed, stopping simulation");
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.stop.stop();
    }

    fn try_write_sample(&mut self, receiver: usize, data: &[f32]) -> Result<(), Error> {
        if self.receivers.len() <= receiver {
            self.receivers.resize_with(receiver + 1, || None);
        }

        if self.receivers[receiver].is_none() {
            let path = self.receiver_path(receiver);
            let file = File::create(&path)
                .wrap_err_with(|| format!("Could not create {}", path.display()))?;
            self.receivers[receiver] = Some(BufWriter::new(file));
        }

        if let Some(file) = &mut self.receivers[receiver] {
            file.write_all(bytemuck::cast_slice(data))?;
        }
        Ok(())
    }
}

impl KernelCallback for FrameWriter {
    fn status(&mut self, status: CallbackStatus, message: &str, frame: Option<usize>) {
        match status {
            CallbackStatus::Running => tracing::debug!(?frame, "{message}"),
            CallbackStatus::Error => tracing::error!(?frame, "{message}"),
            _ => tracing::info!(%status, ?frame, "{message}"),
        }
    }

    fn write_frame(&mut self, frame: usize, domain: usize, data: &[f32]) {
        if self.error.is_some() {
            return;
        }

        let path = self.frame_path(frame, domain);
        match std::fs::write(&path, bytemuck::cast_slice::<f32, u8>(data)) {
            Ok(()) => self.frames_written += 1,
            Err(error) => {
                self.fail(Error::new(error).wrap_err(format!("Could not write {}", path.display())))
            }
        }
    }

    fn write_sample(&mut self, _start_sample: usize, receiver: usize, data: &[f32]) {
        if self.error.is_some() {
            return;
        }

        if let Err(error) = self.try_write_sample(receiver, data) {
            self.fail(error);
        }
    }
}
