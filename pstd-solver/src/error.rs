use crate::{
    dg::DgError,
    kernel::BackendKind,
};

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("kernel is not configured")]
    NotConfigured,

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("degenerate geometry: {reason}")]
    DegenerateGeometry { reason: String },

    #[error("failed to create transform plan (length={fft_length}, batch={batch_size}): {reason}")]
    TransformPlanFailure {
        fft_length: usize,
        batch_size: usize,
        reason: String,
    },

    #[error("run was cancelled by the caller before frame {frame}")]
    CancelledByCaller { frame: usize },

    #[error("a run is already active on this kernel")]
    AlreadyRunning,

    #[error("backend not available: {0}")]
    UnsupportedBackend(BackendKind),
}

impl KernelError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancelledByCaller { .. })
    }
}

impl From<DgError> for KernelError {
    fn from(value: DgError) -> Self {
        Self::DegenerateGeometry {
            reason: value.to_string(),
        }
    }
}
