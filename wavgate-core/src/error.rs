use thiserror::Error;

/// All errors produced by wavgate-core.
#[derive(Debug, Error)]
pub enum WavGateError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to write encoded audio: {0}")]
    EncodeWrite(#[source] std::io::Error),

    #[error("malformed WAV header: {0}")]
    MalformedHeader(String),

    #[error("sample source error: {0}")]
    Source(String),

    #[error("delivery channel closed: {0}")]
    DeliveryClosed(&'static str),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("encoder worker panicked")]
    WorkerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WavGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync + 'static>() {}

    #[test]
    fn errors_cross_the_worker_thread() {
        assert_send_sync::<WavGateError>();
        let err: WavGateError = std::io::Error::other("disk full").into();
        assert!(matches!(err, WavGateError::Io(_)));
        assert_eq!(err.to_string(), "IO error: disk full");
    }
}
