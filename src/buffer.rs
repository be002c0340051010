use tokio::time::Instant;

use crate::config::{
    OFFLINE_BUFFER_CAP, OFFLINE_BUFFER_RETAIN, SEND_BUFFER_FLUSH_LEN, SEND_FLUSH_INTERVAL,
};
use crate::model::LocationPoint;

/// Queues network-worthy points and decides when a batch goes out.
///
/// Two buffers, both insertion-ordered with FIFO semantics:
/// - the send buffer holds points awaiting transmission while online,
/// - the offline buffer holds points accumulated while disconnected.
///
/// Every `take_*` call drains its buffer in one step; the caller transmits
/// the returned points as a single batch. The manager never sends anything
/// itself, which keeps all buffer mutation inside the session event loop.
pub struct SyncManager {
    send_buffer: Vec<LocationPoint>,
    offline_buffer: Vec<LocationPoint>,
    last_flush: Instant,
    online: bool,
}

impl SyncManager {
    pub fn new(online: bool, now: Instant) -> Self {
        SyncManager {
            send_buffer: Vec::new(),
            offline_buffer: Vec::new(),
            last_flush: now,
            online,
        }
    }

    /// Device connectivity as last reported by the embedder.
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Queue one point. Returns a batch to transmit when the submission
    /// tripped a flush condition.
    pub fn submit(
        &mut self,
        point: LocationPoint,
        channel_open: bool,
        now: Instant,
    ) -> Option<Vec<LocationPoint>> {
        if self.online && channel_open {
            self.send_buffer.push(point);

            let due = self.send_buffer.len() >= SEND_BUFFER_FLUSH_LEN
                || now.duration_since(self.last_flush) > SEND_FLUSH_INTERVAL;
            if due {
                return self.drain_send(now);
            }
            None
        } else {
            self.push_offline(point);
            None
        }
    }

    /// Timer-driven flush check: drains the send buffer when the interval
    /// elapsed and there is something to send.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<LocationPoint>> {
        if !self.send_buffer.is_empty()
            && now.duration_since(self.last_flush) > SEND_FLUSH_INTERVAL
        {
            return self.drain_send(now);
        }
        None
    }

    /// Drain whatever awaits transmission, regardless of flush conditions.
    /// Used by session stop.
    pub fn take_pending(&mut self, now: Instant) -> Option<Vec<LocationPoint>> {
        if self.send_buffer.is_empty() {
            return None;
        }
        self.drain_send(now)
    }

    /// Drain the offline buffer for the back-online / reconnect flush.
    pub fn take_offline(&mut self) -> Option<Vec<LocationPoint>> {
        if self.offline_buffer.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.offline_buffer))
    }

    pub fn send_len(&self) -> usize {
        self.send_buffer.len()
    }

    pub fn offline_len(&self) -> usize {
        self.offline_buffer.len()
    }

    fn drain_send(&mut self, now: Instant) -> Option<Vec<LocationPoint>> {
        self.last_flush = now;
        Some(std::mem::take(&mut self.send_buffer))
    }

    /// Keep-newest retention: the insertion that would exceed the cap first
    /// truncates the buffer to its newest entries, then appends.
    fn push_offline(&mut self, point: LocationPoint) {
        if self.offline_buffer.len() >= OFFLINE_BUFFER_CAP {
            let keep_from = self.offline_buffer.len() - OFFLINE_BUFFER_RETAIN;
            self.offline_buffer.drain(..keep_from);
            log::warn!(
                "offline buffer overflow, dropped {} oldest points",
                keep_from
            );
        }
        self.offline_buffer.push(point);
    }
}
