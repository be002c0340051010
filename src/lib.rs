//! Client-side live location tracking pipeline.
//!
//! Raw device fixes flow through an admission filter into a sync manager
//! that batches them over a persistent duplex channel, buffering offline
//! and reconnecting with a bounded budget when the connection drops:
//!
//! ```text
//! position stream → PositionFilter → SyncManager → ChannelManager → server
//!                        │                ▲              │
//!                   MarkerSink      connectivity    close events
//! ```
//!
//! A [`session::SessionController`] owns the lifecycle: it probes the
//! environment, obtains a session id, opens the channel, starts the watch
//! and tears everything down on stop. The map widget, status display,
//! platform probes, position stream and transport are all trait seams the
//! embedder implements.

pub mod animator;
pub mod api;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod environment;
pub mod error;
pub mod filter;
pub mod geo;
pub mod model;
pub mod position;
pub mod session;
pub mod sinks;
pub mod transport;

pub use animator::{AnimationToken, RouteAnimator};
pub use api::{HttpTrackingApi, TrackingApi};
pub use buffer::SyncManager;
pub use channel::{ChannelManager, ChannelState, ReconnectDecision, ReconnectPolicy};
pub use config::{ModeProfile, TrackingMode};
pub use environment::{check_environment, Environment, PermissionState};
pub use error::{ApiError, Result, TrackerError};
pub use filter::{FilterVerdict, PositionFilter};
pub use model::{LocationBatch, LocationPoint, RawFix, SessionId};
pub use position::{
    PositionError, PositionEvent, PositionSource, SimulatedPositionSource, WatchHandle,
    WatchOptions,
};
pub use session::{SessionConfig, SessionController, SessionPhase};
pub use sinks::{LogStatusSink, MarkerSink, NullMarkerSink, StatusLevel, StatusSink};
pub use transport::{ws_url_for, Dialer, WsDialer};
