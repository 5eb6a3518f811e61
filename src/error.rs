use std::path::PathBuf;

/// Transport failures while fetching a feed or the alert document.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("invalid feed URL: {0}")]
    InvalidUrl(String),

    #[error("invalid API key header: {0}")]
    InvalidApiKey(String),

    #[error("the server returned an unreadable response")]
    InvalidResponse,

    #[error("request failed with status {0}")]
    HttpStatus(u16),

    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Failures of the location collaborator. Only `Unavailable` is worth retrying.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location access is required to show nearby subway lines. Enable it in Settings.")]
    PermissionDenied,

    #[error("Location services are restricted on this device.")]
    Restricted,

    #[error("We couldn't determine your location.")]
    Unavailable,
}

impl LocationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocationError::Unavailable)
    }
}

/// The bundled station data could not be loaded.
#[derive(thiserror::Error, Debug)]
pub enum StationDataError {
    #[error("missing station resource: {}", .0.display())]
    ResourceMissing(PathBuf),

    #[error("failed to decode station data: {0}")]
    Decode(String),
}

#[derive(thiserror::Error, Debug)]
pub enum AlertError {
    #[error("service alerts are temporarily unavailable: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to decode service alerts: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Terminal failure of one aggregation run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("subway feed unavailable: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Alerts(#[from] AlertError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error("feed task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
