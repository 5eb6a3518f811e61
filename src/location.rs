//! Where the user is. The platform sensor is out of reach here, so a provider
//! is anything that can answer with a single best-known coordinate.

use async_trait::async_trait;

use crate::error::LocationError;
use crate::models::Coordinate;

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_location(&self) -> Result<Coordinate, LocationError>;
}

/// Permission state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authorization {
    /// Not asked yet. A request still goes ahead.
    #[default]
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

impl Authorization {
    pub fn check(self) -> Result<(), LocationError> {
        match self {
            Authorization::Restricted => Err(LocationError::Restricted),
            Authorization::Denied => Err(LocationError::PermissionDenied),
            Authorization::NotDetermined | Authorization::Authorized => Ok(()),
        }
    }
}

/// A fixed position, e.g. one passed on the command line.
#[derive(Debug, Clone)]
pub struct StaticLocation {
    coordinate: Option<Coordinate>,
    authorization: Authorization,
}

impl StaticLocation {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate: Some(coordinate),
            authorization: Authorization::Authorized,
        }
    }

    /// A provider that never gets a fix.
    pub fn unknown() -> Self {
        Self {
            coordinate: None,
            authorization: Authorization::Authorized,
        }
    }

    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }
}

#[async_trait]
impl LocationProvider for StaticLocation {
    async fn request_location(&self) -> Result<Coordinate, LocationError> {
        self.authorization.check()?;
        self.coordinate.ok_or(LocationError::Unavailable)
    }
}
