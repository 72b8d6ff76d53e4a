use async_trait::async_trait;

use crate::error::GeolocationError;
use crate::geo::LngLat;

pub const POSITION_UNAVAILABLE_MESSAGE: &str = "Unable to retrieve your location.";
pub const UNSUPPORTED_MESSAGE: &str = "Geolocation is not supported by your browser.";

/// One-shot device position source.
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<LngLat, GeolocationError>;
}

/// Surfaces a blocking, user-facing message.
pub trait Alerter {
    fn alert(&self, message: &str);
}

/// Geolocator answering with a fixed outcome, e.g. a fix taken from config.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticGeolocator {
    Fix(LngLat),
    Unavailable(String),
    Unsupported,
}

impl StaticGeolocator {
    pub fn from_fix(fix: Option<LngLat>) -> Self {
        match fix {
            Some(at) => StaticGeolocator::Fix(at),
            None => StaticGeolocator::Unsupported,
        }
    }
}

#[async_trait]
impl Geolocator for StaticGeolocator {
    async fn current_position(&self) -> Result<LngLat, GeolocationError> {
        match self {
            StaticGeolocator::Fix(at) => Ok(*at),
            StaticGeolocator::Unavailable(reason) => Err(GeolocationError::Unavailable(reason.clone())),
            StaticGeolocator::Unsupported => Err(GeolocationError::Unsupported),
        }
    }
}

pub struct TracingAlerter;

impl Alerter for TracingAlerter {
    fn alert(&self, message: &str) {
        tracing::warn!(alert = message, "showing alert");
        eprintln!("{message}");
    }
}

pub fn alert_message(err: &GeolocationError) -> &'static str {
    match err {
        GeolocationError::Unsupported => UNSUPPORTED_MESSAGE,
        GeolocationError::Unavailable(_) => POSITION_UNAVAILABLE_MESSAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_geolocator_reports_configured_outcome() {
        let fix = StaticGeolocator::from_fix(Some(LngLat(1.0, 2.0)));
        assert_eq!(fix.current_position().await, Ok(LngLat(1.0, 2.0)));

        let none = StaticGeolocator::from_fix(None);
        let err = none.current_position().await.unwrap_err();
        assert_eq!(alert_message(&err), UNSUPPORTED_MESSAGE);

        let denied = StaticGeolocator::Unavailable("permission denied".to_string());
        let err = denied.current_position().await.unwrap_err();
        assert_eq!(alert_message(&err), POSITION_UNAVAILABLE_MESSAGE);
    }
}
