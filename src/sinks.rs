use crate::model::LocationPoint;

/// Severity of a user-facing status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}

/// One-way notification sink for user-visible status messages. Purely
/// observational; nothing in the pipeline depends on a sink's behavior.
pub trait StatusSink: Send + Sync {
    fn status(&self, level: StatusLevel, message: &str);
}

/// Sink the map widget implements to receive points to draw.
pub trait MarkerSink: Send + Sync {
    /// Called for every admitted live fix.
    fn on_position(&self, point: &LocationPoint);

    /// Called once per route-replay step. Replay points carry no accuracy.
    fn on_route_step(&self, lat: f64, lng: f64);
}

/// Status sink that forwards to the log facade.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status(&self, level: StatusLevel, message: &str) {
        match level {
            StatusLevel::Info => log::info!("{}", message),
            StatusLevel::Warn => log::warn!("{}", message),
            StatusLevel::Error => log::error!("{}", message),
        }
    }
}

/// Marker sink that draws nothing.
pub struct NullMarkerSink;

impl MarkerSink for NullMarkerSink {
    fn on_position(&self, _point: &LocationPoint) {}

    fn on_route_step(&self, _lat: f64, _lng: f64) {}
}
