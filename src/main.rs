use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use track_relay_rs::{
    Environment, HttpTrackingApi, LocationPoint, MarkerSink, PermissionState, SessionConfig,
    SessionController, SimulatedPositionSource, StatusLevel, StatusSink, TrackingMode, WsDialer,
};

#[derive(Parser, Debug)]
#[command(name = "track_relay")]
#[command(about = "Simulated tracking session against a live tracking server", long_about = None)]
struct Args {
    /// Tracking server base url
    #[arg(long, default_value = "http://localhost:8000")]
    server: String,

    /// Transport mode (walk, bike, car)
    #[arg(long, default_value = "bike")]
    mode: String,

    /// Session duration in seconds
    #[arg(value_name = "SECONDS", default_value = "60")]
    duration: u64,

    /// Seconds between simulated fixes
    #[arg(long, default_value = "1")]
    fix_interval: u64,

    /// CSRF token forwarded to the session endpoints
    #[arg(long)]
    csrf_token: Option<String>,
}

/// The host process stands in for the browser: always capable, always
/// permitted, connectivity assumed up.
struct ProcessEnvironment {
    secure: bool,
}

impl Environment for ProcessEnvironment {
    fn secure_transport(&self) -> bool {
        self.secure
    }

    fn local_development(&self) -> bool {
        !self.secure
    }

    fn location_capability(&self) -> bool {
        true
    }

    fn permission_state(&self) -> PermissionState {
        PermissionState::Granted
    }
}

struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn status(&self, level: StatusLevel, message: &str) {
        let tag = match level {
            StatusLevel::Info => "INFO",
            StatusLevel::Warn => "WARN",
            StatusLevel::Error => "ERROR",
        };
        println!("[{}] [{}] {}", ts_now(), tag, message);
    }
}

struct ConsoleMarker {
    positions: AtomicU64,
}

impl MarkerSink for ConsoleMarker {
    fn on_position(&self, point: &LocationPoint) {
        let n = self.positions.fetch_add(1, Ordering::Relaxed) + 1;
        println!(
            "[{}] fix #{}: {:.6}, {:.6} ({:.1} m)",
            ts_now(),
            n,
            point.lat,
            point.lng,
            point.accuracy
        );
    }

    fn on_route_step(&self, lat: f64, lng: f64) {
        println!("[{}] route: {:.6}, {:.6}", ts_now(), lat, lng);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mode: TrackingMode = args
        .mode
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    println!("[{}] Track Relay Starting", ts_now());
    println!("  Server: {}", args.server);
    println!("  Mode: {}", mode);
    println!("  Duration: {} seconds", args.duration);

    let marker = Arc::new(ConsoleMarker {
        positions: AtomicU64::new(0),
    });
    let source = SimulatedPositionSource {
        fix_interval: Duration::from_secs(args.fix_interval.max(1)),
        ..SimulatedPositionSource::new()
    };

    let mut controller = SessionController::new(
        SessionConfig::new(mode, &args.server),
        Arc::new(ProcessEnvironment {
            secure: args.server.starts_with("https://"),
        }),
        Arc::new(source),
        Arc::new(WsDialer),
        Arc::new(HttpTrackingApi::new(&args.server, args.csrf_token.clone())),
        Arc::new(ConsoleStatus),
        marker.clone(),
    );

    let session_id = controller.start().await?;
    println!("[{}] Session {} active", ts_now(), session_id);

    sleep(Duration::from_secs(args.duration)).await;

    controller.stop().await?;
    println!(
        "[{}] Done: {} fixes drawn",
        ts_now(),
        marker.positions.load(Ordering::Relaxed)
    );

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
