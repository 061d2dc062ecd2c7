use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("worker-threads `{0}` exceeds the available processors")]
    ConcurrencyTooLarge(usize),

    #[error("Server port and metrics port must differ, both are `{0}`")]
    PortClash(u16),

    #[error("`{0}` must be positive")]
    NotPositive(&'static str),

    #[error("Ratio blend weights must be positive and sum to 1.0, got {current} and {prior}")]
    BadBlendWeights { current: f64, prior: f64 },

    #[error("Size guard bands must straddle the ideal size, got {min} and {max}")]
    BadGuardBands { min: f64, max: f64 },

    #[error("An IO error raised")]
    Io(#[from] std::io::Error),
}
