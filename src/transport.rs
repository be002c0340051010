use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::config::ABNORMAL_CLOSE_CODE;

/// Errors raised while establishing a duplex connection.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid channel url: {0}")]
    InvalidUrl(String),

    #[error("connect failed: {0}")]
    Connect(String),
}

/// Commands the channel manager issues to a live connection.
#[derive(Debug)]
pub enum WireCommand {
    /// Send one text frame.
    Send(String),
    /// Close with the normal-closure code.
    Close,
}

/// Lifecycle events a live connection reports back.
#[derive(Debug, Clone)]
pub enum WireEvent {
    Error(String),
    Closed { code: u16, reason: String },
}

/// A live duplex connection: commands in, lifecycle events out. The dial
/// resolving `Ok` is the open event.
pub struct WireConn {
    pub outbound: mpsc::Sender<WireCommand>,
    pub events: mpsc::Receiver<WireEvent>,
}

/// Opens duplex connections. The production implementation is [`WsDialer`];
/// tests substitute scripted dialers.
pub trait Dialer: Send + Sync {
    fn dial(&self, url: &str) -> BoxFuture<'static, Result<WireConn, TransportError>>;
}

/// Derive the realtime channel url from the HTTP base url, mirroring the
/// transport security of the page: `https` becomes `wss`, `http` becomes
/// `ws`.
pub fn ws_url_for(base_url: &str) -> Result<String, TransportError> {
    let trimmed = base_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        Ok(format!("wss://{}/ws/tracking/", rest))
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        Ok(format!("ws://{}/ws/tracking/", rest))
    } else {
        Err(TransportError::InvalidUrl(base_url.to_string()))
    }
}

/// WebSocket dialer over tokio-tungstenite.
pub struct WsDialer;

impl Dialer for WsDialer {
    fn dial(&self, url: &str) -> BoxFuture<'static, Result<WireConn, TransportError>> {
        let url = url.to_string();
        Box::pin(async move {
            let (stream, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            let (cmd_tx, cmd_rx) = mpsc::channel::<WireCommand>(64);
            let (event_tx, event_rx) = mpsc::channel::<WireEvent>(16);

            tokio::spawn(drive_socket(stream, cmd_rx, event_tx));

            Ok(WireConn {
                outbound: cmd_tx,
                events: event_rx,
            })
        })
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Pump the socket both ways until either side ends it, translating frames
/// into [`WireEvent`]s for the channel manager.
async fn drive_socket(
    stream: WsStream,
    mut commands: mpsc::Receiver<WireCommand>,
    events: mpsc::Sender<WireEvent>,
) {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(WireCommand::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        log::warn!("channel send failed: {}", e);
                        let _ = events.send(WireEvent::Error(e.to_string())).await;
                        let _ = events
                            .send(WireEvent::Closed {
                                code: ABNORMAL_CLOSE_CODE,
                                reason: e.to_string(),
                            })
                            .await;
                        break;
                    }
                }
                Some(WireCommand::Close) => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    break;
                }
                // Manager dropped the handle; treat like an explicit close.
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Close(close))) => {
                    let (code, reason) = match close {
                        Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                        None => (ABNORMAL_CLOSE_CODE, String::new()),
                    };
                    let _ = events.send(WireEvent::Closed { code, reason }).await;
                    break;
                }
                // Server-to-client payloads carry no contract here; drop them.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(WireEvent::Error(e.to_string())).await;
                    let _ = events
                        .send(WireEvent::Closed {
                            code: ABNORMAL_CLOSE_CODE,
                            reason: e.to_string(),
                        })
                        .await;
                    break;
                }
                None => {
                    let _ = events
                        .send(WireEvent::Closed {
                            code: ABNORMAL_CLOSE_CODE,
                            reason: "connection dropped".to_string(),
                        })
                        .await;
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_mirrors_scheme() {
        assert_eq!(
            ws_url_for("https://tracker.example.com").unwrap(),
            "wss://tracker.example.com/ws/tracking/"
        );
        assert_eq!(
            ws_url_for("http://localhost:8000/").unwrap(),
            "ws://localhost:8000/ws/tracking/"
        );
    }

    #[test]
    fn test_ws_url_rejects_other_schemes() {
        assert!(ws_url_for("ftp://example.com").is_err());
        assert!(ws_url_for("example.com").is_err());
    }
}
