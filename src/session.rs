use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant};

use crate::animator::{AnimationToken, RouteAnimator};
use crate::api::TrackingApi;
use crate::buffer::SyncManager;
use crate::channel::{ChannelManager, ReconnectDecision};
use crate::config::{TrackingMode, ABNORMAL_CLOSE_CODE, FLUSH_CHECK_INTERVAL};
use crate::environment::{check_environment, Environment};
use crate::error::{Result, TrackerError};
use crate::filter::{FilterVerdict, PositionFilter};
use crate::model::{LocationBatch, LocationPoint, RawFix, SessionId};
use crate::position::{PositionEvent, PositionSource, WatchHandle, WatchOptions};
use crate::sinks::{MarkerSink, StatusLevel, StatusSink};
use crate::transport::{ws_url_for, Dialer, WireEvent};

/// Session lifecycle. Only one session may be Active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Static wiring for a controller.
#[derive(Clone)]
pub struct SessionConfig {
    pub mode: TrackingMode,
    /// HTTP base url of the tracking server; the channel url is derived
    /// from it with the matching scheme.
    pub base_url: String,
    pub watch_options: WatchOptions,
}

impl SessionConfig {
    pub fn new(mode: TrackingMode, base_url: &str) -> Self {
        SessionConfig {
            mode,
            base_url: base_url.to_string(),
            watch_options: WatchOptions::default(),
        }
    }
}

enum LoopEvent {
    Connectivity(bool),
    ReconnectDue,
    Stop,
}

/// Orchestrates start/stop across the filter, buffers, channel and watch.
/// All mutable pipeline state lives in the per-session event-loop task;
/// the controller itself only holds the phase machine and the handles
/// needed to tear the session down.
pub struct SessionController {
    config: SessionConfig,
    env: Arc<dyn Environment>,
    source: Arc<dyn PositionSource>,
    dialer: Arc<dyn Dialer>,
    api: Arc<dyn TrackingApi>,
    status: Arc<dyn StatusSink>,
    marker: Arc<dyn MarkerSink>,
    phase: SessionPhase,
    tracking_active: Arc<AtomicBool>,
    animation: AnimationToken,
    last_route_fetch: Option<Instant>,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    session_id: SessionId,
    watch: WatchHandle,
    events_tx: mpsc::Sender<LoopEvent>,
    loop_task: JoinHandle<()>,
}

impl SessionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        env: Arc<dyn Environment>,
        source: Arc<dyn PositionSource>,
        dialer: Arc<dyn Dialer>,
        api: Arc<dyn TrackingApi>,
        status: Arc<dyn StatusSink>,
        marker: Arc<dyn MarkerSink>,
    ) -> Self {
        SessionController {
            config,
            env,
            source,
            dialer,
            api,
            status,
            marker,
            phase: SessionPhase::Idle,
            tracking_active: Arc::new(AtomicBool::new(false)),
            animation: AnimationToken::new(),
            last_route_fetch: None,
            active: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.session_id)
    }

    /// Start a tracking session: probe preconditions, obtain a session id,
    /// open the channel, then begin the continuous position watch. The
    /// watch only starts once the channel is open.
    pub async fn start(&mut self) -> Result<SessionId> {
        if self.phase != SessionPhase::Idle {
            return Err(TrackerError::AlreadyActive);
        }
        self.phase = SessionPhase::Starting;

        if let Err(e) = check_environment(self.env.as_ref()) {
            self.status.status(StatusLevel::Error, &e.to_string());
            self.phase = SessionPhase::Idle;
            return Err(e);
        }

        self.status.status(StatusLevel::Info, "Starting session...");
        let session_id = match self.api.start_session().await {
            Ok(id) => id,
            Err(e) => {
                self.status
                    .status(StatusLevel::Error, &format!("Failed to start session: {}", e));
                self.phase = SessionPhase::Idle;
                return Err(e.into());
            }
        };

        let url = match ws_url_for(&self.config.base_url) {
            Ok(url) => url,
            Err(e) => {
                self.release_session(session_id).await;
                self.phase = SessionPhase::Idle;
                return Err(TrackerError::Transport(e.to_string()));
            }
        };

        let (events_tx, events_rx) = mpsc::channel(256);
        let (wire_tx, wire_rx) = mpsc::channel(64);
        let mut channel =
            ChannelManager::new(self.dialer.clone(), url, self.status.clone(), wire_tx);

        if let Err(e) = channel.connect().await {
            // The start endpoint already issued an id; release it rather
            // than leaving an orphan on the server.
            self.release_session(session_id).await;
            self.phase = SessionPhase::Idle;
            return Err(e);
        }

        self.tracking_active.store(true, Ordering::SeqCst);

        let (pos_tx, pos_rx) = mpsc::channel(256);
        let watch = self.source.watch(self.config.watch_options, pos_tx);

        let session_loop = SessionLoop {
            session_id,
            mode: self.config.mode,
            tracking_active: self.tracking_active.clone(),
            filter: PositionFilter::new(self.config.mode.profile()),
            sync: SyncManager::new(self.env.online(), Instant::now()),
            channel,
            status: self.status.clone(),
            marker: self.marker.clone(),
            events_tx: events_tx.clone(),
            events_rx,
            pos_rx,
            wire_rx,
        };
        let loop_task = tokio::spawn(session_loop.run());

        self.active = Some(ActiveSession {
            session_id,
            watch,
            events_tx,
            loop_task,
        });
        self.phase = SessionPhase::Active;
        self.status
            .status(StatusLevel::Info, "Tracking started, acquiring location...");
        Ok(session_id)
    }

    /// Stop the active session. Idempotent no-op unless Active. New points
    /// are refused immediately; the pending send buffer is flushed while
    /// the channel is still open, then the channel closes with the normal
    /// code and the stop endpoint is notified best-effort.
    pub async fn stop(&mut self) -> Result<()> {
        if self.phase != SessionPhase::Active {
            return Ok(());
        }
        self.phase = SessionPhase::Stopping;
        self.tracking_active.store(false, Ordering::SeqCst);
        // Any in-flight animation halts on its next scheduled step.
        self.animation.bump();

        if let Some(mut active) = self.active.take() {
            active.watch.release();
            let _ = active.events_tx.send(LoopEvent::Stop).await;
            let _ = active.loop_task.await;
            self.release_session(active.session_id).await;
        }

        self.phase = SessionPhase::Idle;
        self.status.status(StatusLevel::Info, "Tracking stopped");
        Ok(())
    }

    /// Feed a device connectivity transition into the active session.
    pub async fn connectivity(&self, online: bool) {
        if let Some(active) = &self.active {
            let _ = active
                .events_tx
                .send(LoopEvent::Connectivity(online))
                .await;
        }
    }

    /// Replay a precomputed path as simulated movement. Visual only; the
    /// replay never reaches the filter or the buffers.
    pub fn play_route(&self, route: Vec<(f64, f64)>) -> JoinHandle<()> {
        let animator = RouteAnimator::new(
            self.animation.clone(),
            self.tracking_active.clone(),
            self.marker.clone(),
        );
        animator.play(route, self.config.mode.profile())
    }

    /// Look up a route between two points and replay it. Lookups are
    /// throttled by the mode's route delay.
    pub async fn preview_route(
        &mut self,
        from: (f64, f64),
        to: (f64, f64),
    ) -> Result<Option<JoinHandle<()>>> {
        let profile = self.config.mode.profile();

        if let Some(last) = self.last_route_fetch {
            if last.elapsed().as_millis() < u128::from(profile.route_delay_ms) {
                return Ok(None);
            }
        }
        self.last_route_fetch = Some(Instant::now());

        let route = self.api.fetch_route(from, to, profile.profile).await?;
        Ok(route.map(|points| self.play_route(points)))
    }

    async fn release_session(&self, session_id: SessionId) {
        if let Err(e) = self.api.stop_session(session_id).await {
            log::warn!(
                "stop notification for session {} failed: {}",
                session_id,
                e
            );
        }
    }
}

/// The per-session event loop. Owns every piece of mutable pipeline state,
/// so mutation ordering is determined solely by event arrival order.
struct SessionLoop {
    session_id: SessionId,
    mode: TrackingMode,
    tracking_active: Arc<AtomicBool>,
    filter: PositionFilter,
    sync: SyncManager,
    channel: ChannelManager,
    status: Arc<dyn StatusSink>,
    marker: Arc<dyn MarkerSink>,
    events_tx: mpsc::Sender<LoopEvent>,
    events_rx: mpsc::Receiver<LoopEvent>,
    pos_rx: mpsc::Receiver<PositionEvent>,
    wire_rx: mpsc::Receiver<WireEvent>,
}

impl SessionLoop {
    async fn run(mut self) {
        let mut flush_tick = interval(FLUSH_CHECK_INTERVAL);
        // The first tick fires immediately; harmless against empty buffers.
        loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(LoopEvent::Connectivity(online)) => self.on_connectivity(online).await,
                    Some(LoopEvent::ReconnectDue) => self.on_reconnect_due().await,
                    Some(LoopEvent::Stop) => {
                        self.shutdown().await;
                        break;
                    }
                    // Controller gone without a stop; nothing left to drive.
                    None => break,
                },
                Some(event) = self.pos_rx.recv() => match event {
                    PositionEvent::Fix(fix) => self.on_fix(fix).await,
                    PositionEvent::Error(e) => {
                        // Transient watch errors keep the session alive.
                        self.status
                            .status(StatusLevel::Error, &format!("GPS tracking failed: {}", e));
                    }
                },
                Some(event) = self.wire_rx.recv() => match event {
                    WireEvent::Error(message) => {
                        self.status
                            .status(StatusLevel::Error, &format!("Channel error: {}", message));
                    }
                    WireEvent::Closed { code, reason } => {
                        self.on_channel_closed(code, &reason).await;
                    }
                },
                _ = flush_tick.tick() => {
                    if self.channel.is_open() {
                        if let Some(points) = self.sync.take_due(Instant::now()) {
                            self.transmit(points).await;
                        }
                    }
                },
            }
        }
    }

    async fn on_fix(&mut self, fix: RawFix) {
        if !self.tracking_active.load(Ordering::SeqCst) {
            return;
        }

        match self.filter.evaluate(&fix) {
            FilterVerdict::RejectAccuracy => {
                self.status.status(
                    StatusLevel::Warn,
                    &format!(
                        "Location accuracy too low ({:.0} m), try moving to a better spot",
                        fix.accuracy
                    ),
                );
            }
            FilterVerdict::RejectDistance => {}
            FilterVerdict::Admit => {
                let point = LocationPoint::from_fix(&fix, self.mode);
                self.marker.on_position(&point);

                // Second, independent gate: only accurate-enough points are
                // network-worthy.
                if self.filter.network_worthy(&fix) {
                    let channel_open = self.channel.is_open();
                    if let Some(points) = self.sync.submit(point, channel_open, Instant::now()) {
                        self.transmit(points).await;
                    }
                } else {
                    log::debug!("low accuracy skipped: {:.1}", fix.accuracy);
                }
            }
        }
    }

    async fn on_connectivity(&mut self, online: bool) {
        self.sync.set_online(online);
        if online {
            self.status
                .status(StatusLevel::Info, "Back online, syncing buffered locations");
            self.flush_offline().await;
        } else {
            self.status
                .status(StatusLevel::Warn, "Offline, buffering locations");
        }
    }

    async fn on_channel_closed(&mut self, code: u16, reason: &str) {
        let message = if reason.is_empty() {
            "Connection closed".to_string()
        } else {
            format!("Connection closed: {}", reason)
        };
        self.status.status(StatusLevel::Warn, &message);

        let active = self.tracking_active.load(Ordering::SeqCst);
        self.handle_close_decision(code, active);
    }

    /// Act on the reconnect budget. Also the path for reconnect attempts
    /// that never opened, which count as abnormal closes.
    fn handle_close_decision(&mut self, code: u16, session_active: bool) {
        match self.channel.on_closed(code, session_active) {
            ReconnectDecision::Retry { attempt, delay } => {
                self.status.status(
                    StatusLevel::Warn,
                    &format!("Reconnecting ({}/{})...", attempt, self.channel.max_attempts()),
                );
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = events.send(LoopEvent::ReconnectDue).await;
                });
            }
            ReconnectDecision::GiveUp => {
                self.status.status(
                    StatusLevel::Error,
                    "Reconnect limit reached, stop and start a new session",
                );
            }
            ReconnectDecision::NormalClose => {}
        }
    }

    async fn on_reconnect_due(&mut self) {
        if !self.tracking_active.load(Ordering::SeqCst) {
            return;
        }
        match self.channel.connect().await {
            Ok(()) => self.flush_offline().await,
            Err(_) => self.handle_close_decision(ABNORMAL_CLOSE_CODE, true),
        }
    }

    /// Offline points take priority over any pending flush timer: they go
    /// out as one batch the moment the channel can carry them.
    async fn flush_offline(&mut self) {
        if !self.channel.is_open() {
            return;
        }
        if let Some(points) = self.sync.take_offline() {
            self.transmit(points).await;
        }
    }

    async fn transmit(&mut self, points: Vec<LocationPoint>) {
        let batch = LocationBatch {
            session_id: self.session_id,
            locations: points,
        };
        if let Err(e) = self.channel.send_batch(&batch).await {
            log::warn!("batch transmission failed: {}", e);
        }
    }

    async fn shutdown(&mut self) {
        if self.channel.is_open() {
            if let Some(points) = self.sync.take_pending(Instant::now()) {
                self.transmit(points).await;
            }
        }
        self.channel.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::result::Result;
    use std::sync::Mutex;

    use crate::error::ApiError;
    use crate::environment::PermissionState;
    use crate::position::SimulatedPositionSource;
    use crate::sinks::NullMarkerSink;
    use crate::transport::{TransportError, WireCommand, WireConn};

    struct SilentSink;

    impl StatusSink for SilentSink {
        fn status(&self, _level: StatusLevel, _message: &str) {}
    }

    struct TestEnv {
        ok: bool,
    }

    impl Environment for TestEnv {
        fn secure_transport(&self) -> bool {
            self.ok
        }

        fn location_capability(&self) -> bool {
            self.ok
        }

        fn permission_state(&self) -> PermissionState {
            PermissionState::Granted
        }
    }

    #[derive(Default)]
    struct TestApi {
        started: Mutex<u64>,
        stopped: Mutex<Vec<SessionId>>,
    }

    impl TrackingApi for TestApi {
        fn start_session(&self) -> BoxFuture<'static, Result<SessionId, ApiError>> {
            let mut next = self.started.lock().unwrap();
            *next += 1;
            let id = *next;
            Box::pin(async move { Ok(id) })
        }

        fn stop_session(&self, session_id: SessionId) -> BoxFuture<'static, Result<(), ApiError>> {
            self.stopped.lock().unwrap().push(session_id);
            Box::pin(async move { Ok(()) })
        }

        fn fetch_route(
            &self,
            _from: (f64, f64),
            _to: (f64, f64),
            _profile: &'static str,
        ) -> BoxFuture<'static, Result<Option<Vec<(f64, f64)>>, ApiError>> {
            Box::pin(async move { Ok(Some(vec![(0.0, 0.0), (1.0, 1.0)])) })
        }
    }

    struct TestDialer {
        accept: bool,
    }

    impl Dialer for TestDialer {
        fn dial(&self, _url: &str) -> BoxFuture<'static, Result<WireConn, TransportError>> {
            let accept = self.accept;
            Box::pin(async move {
                if !accept {
                    return Err(TransportError::Connect("refused".to_string()));
                }
                let (cmd_tx, mut cmd_rx) = mpsc::channel::<WireCommand>(64);
                let (_event_tx, event_rx) = mpsc::channel(8);
                // Keep the connection alive by draining commands.
                tokio::spawn(async move { while cmd_rx.recv().await.is_some() {} });
                Ok(WireConn {
                    outbound: cmd_tx,
                    events: event_rx,
                })
            })
        }
    }

    fn controller(env_ok: bool, dial_ok: bool) -> (SessionController, Arc<TestApi>) {
        let api = Arc::new(TestApi::default());
        let controller = SessionController::new(
            SessionConfig::new(TrackingMode::Walk, "https://tracker.example.com"),
            Arc::new(TestEnv { ok: env_ok }),
            Arc::new(SimulatedPositionSource::new()),
            Arc::new(TestDialer { accept: dial_ok }),
            api.clone(),
            Arc::new(SilentSink),
            Arc::new(NullMarkerSink),
        );
        (controller, api)
    }

    #[tokio::test]
    async fn test_precondition_failure_stays_idle() {
        let (mut controller, api) = controller(false, true);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, TrackerError::InsecureContext));
        assert_eq!(controller.phase(), SessionPhase::Idle);
        // No session was requested at all.
        assert_eq!(*api.started.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_channel_failure_releases_orphaned_session() {
        let (mut controller, api) = controller(true, false);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, TrackerError::Transport(_)));
        assert_eq!(controller.phase(), SessionPhase::Idle);
        // The issued id was released best-effort.
        assert_eq!(*api.stopped.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_start_stop_round_trip() {
        let (mut controller, api) = controller(true, true);

        let id = controller.start().await.unwrap();
        assert_eq!(controller.phase(), SessionPhase::Active);
        assert_eq!(controller.session_id(), Some(id));

        // A second start while active is refused.
        assert!(matches!(
            controller.start().await,
            Err(TrackerError::AlreadyActive)
        ));

        controller.stop().await.unwrap();
        assert_eq!(controller.phase(), SessionPhase::Idle);
        assert_eq!(controller.session_id(), None);
        assert_eq!(*api.stopped.lock().unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (mut controller, api) = controller(true, true);

        controller.stop().await.unwrap();
        assert_eq!(controller.phase(), SessionPhase::Idle);
        assert!(api.stopped.lock().unwrap().is_empty());

        controller.start().await.unwrap();
        controller.stop().await.unwrap();
        controller.stop().await.unwrap();
        assert_eq!(api.stopped.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_preview_is_throttled() {
        let (mut controller, _api) = controller(true, true);
        controller.start().await.unwrap();

        let first = controller
            .preview_route((0.0, 0.0), (1.0, 1.0))
            .await
            .unwrap();
        assert!(first.is_some());

        // Within the walk profile's route delay: throttled.
        let second = controller
            .preview_route((0.0, 0.0), (1.0, 1.0))
            .await
            .unwrap();
        assert!(second.is_none());

        controller.stop().await.unwrap();
    }
}
