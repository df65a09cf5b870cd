//! Frame transport.
//!
//! Owns the WebSocket connection: a mutex-guarded sink for outbound frames
//! and one background reader that decodes each text frame and hands it to
//! a [`FrameHandler`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::error::WsError;
use super::messages::Request;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connection lifecycle hooks for the host application.
///
/// All methods default to no-ops. They run on the reader task or the
/// caller's task and must not block.
pub trait ConnectionEvents: Send + Sync {
    /// The handshake completed.
    fn on_open(&self) {}

    /// A frame could not be decoded or routed, or the socket failed.
    fn on_error(&self, _error: &WsError) {}

    /// The connection closed.
    fn on_close(&self) {}
}

/// Event hooks that log through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEvents;

impl ConnectionEvents for LogEvents {
    fn on_open(&self) {
        info!("WebSocket connection opened");
    }

    fn on_error(&self, error: &WsError) {
        warn!("WebSocket error: {}", error);
    }

    fn on_close(&self) {
        info!("WebSocket connection closed");
    }
}

/// Consumer of decoded inbound frames.
pub trait FrameHandler: Send + Sync {
    /// Handles one frame. A returned request is sent on the same socket.
    ///
    /// # Errors
    ///
    /// Errors are reported through [`ConnectionEvents::on_error`]; the
    /// connection stays open.
    fn on_frame(&self, frame: Value) -> Result<Option<Request>, WsError>;

    /// Called once when the reader stops on a closed or failed socket.
    fn on_disconnect(&self);
}

/// WebSocket frame transport.
#[derive(Clone)]
pub struct FrameTransport {
    sink: Arc<Mutex<Option<WsSink>>>,
    open: Arc<AtomicBool>,
    events: Arc<dyn ConnectionEvents>,
    reader: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl fmt::Debug for FrameTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameTransport")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl FrameTransport {
    /// Creates a closed transport reporting to `events`.
    #[must_use]
    pub fn new(events: Arc<dyn ConnectionEvents>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(None)),
            open: Arc::new(AtomicBool::new(false)),
            events,
            reader: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Returns true while the connection is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Returns the event hooks.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn ConnectionEvents> {
        &self.events
    }

    /// Opens the connection and starts the reader.
    ///
    /// # Errors
    ///
    /// Returns `WsError::ConnectTimeout` if the handshake does not complete
    /// within `timeout`, or `WsError::Connection` if it fails.
    pub async fn open(
        &self,
        url: &str,
        timeout: Duration,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<(), WsError> {
        if self.is_open() {
            return Err(WsError::Connection("already connected".to_string()));
        }

        let handshake = tokio_tungstenite::connect_async(url);
        let (ws_stream, _) = match tokio::time::timeout(timeout, handshake).await {
            Ok(result) => result.map_err(|e| WsError::Connection(e.to_string()))?,
            Err(_) => return Err(WsError::ConnectTimeout),
        };

        let (sink, source) = ws_stream.split();
        *self.sink.lock().await = Some(sink);
        self.open.store(true, Ordering::SeqCst);
        self.events.on_open();

        let reader = self.spawn_reader(source, handler);
        let previous = self.reader.lock().replace(reader);
        if let Some(previous) = previous {
            previous.abort();
        }

        Ok(())
    }

    fn spawn_reader(&self, mut source: WsSource, handler: Arc<dyn FrameHandler>) -> JoinHandle<()> {
        let transport = self.clone();

        tokio::spawn(async move {
            while let Some(result) = source.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        let frame: Value = match serde_json::from_str(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                transport.events.on_error(&WsError::Decode(e.to_string()));
                                break;
                            }
                        };

                        match handler.on_frame(frame) {
                            Ok(Some(request)) => {
                                if let Err(e) = transport.send(&request).await {
                                    transport.events.on_error(&e);
                                }
                            }
                            Ok(None) => {}
                            Err(e) => transport.events.on_error(&e),
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!("Received close frame: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        transport.events.on_error(&WsError::from(e));
                        break;
                    }
                }
            }

            transport.finish(handler.as_ref()).await;
        })
    }

    async fn finish(&self, handler: &dyn FrameHandler) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = sink.close().await;
        }

        if self.open.swap(false, Ordering::SeqCst) {
            handler.on_disconnect();
            self.events.on_close();
        }
    }

    /// Sends one request frame. Concurrent sends are serialized.
    ///
    /// # Errors
    ///
    /// Returns `WsError::TransportClosed` if the connection is not open.
    pub async fn send(&self, request: &Request) -> Result<(), WsError> {
        let json =
            serde_json::to_string(request).map_err(|e| WsError::Serialization(e.to_string()))?;

        let mut sink_guard = self.sink.lock().await;
        let sink = sink_guard.as_mut().ok_or(WsError::TransportClosed)?;

        debug!("Sending {} (id {:?})", request.method, request.id);
        sink.send(Message::Text(json.into()))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    /// Closes the connection and stops the reader.
    ///
    /// Returns true if the connection was open.
    pub async fn close(&self) -> bool {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }

        let was_open = self.open.swap(false, Ordering::SeqCst);
        if was_open {
            self.events.on_close();
        }
        was_open
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        log: parking_lot::Mutex<Vec<String>>,
    }

    impl Recorder {
        fn entries(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    impl ConnectionEvents for Recorder {
        fn on_open(&self) {
            self.log.lock().push("open".to_string());
        }

        fn on_error(&self, error: &WsError) {
            self.log.lock().push(format!("error: {}", error));
        }

        fn on_close(&self) {
            self.log.lock().push("close".to_string());
        }
    }

    struct Forward {
        frames: mpsc::UnboundedSender<Value>,
        disconnected: AtomicBool,
    }

    impl FrameHandler for Forward {
        fn on_frame(&self, frame: Value) -> Result<Option<Request>, WsError> {
            let _ = self.frames.send(frame);
            Ok(None)
        }

        fn on_disconnect(&self) {
            self.disconnected.store(true, Ordering::SeqCst);
        }
    }

    async fn serve(frames: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
            for frame in frames {
                ws.send(Message::Text(frame.into())).await.expect("send");
            }
            while let Some(Ok(_)) = ws.next().await {}
        });

        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_send_before_open() {
        let transport = FrameTransport::new(Arc::new(LogEvents));
        let err = transport
            .send(&Request::new("ping", Value::Null))
            .await
            .expect_err("closed");
        assert_eq!(err, WsError::TransportClosed);
        assert!(!transport.close().await);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // Accepts TCP but never answers the upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("ws://{}", listener.local_addr().expect("addr"));
        let (frames, _rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Forward {
            frames,
            disconnected: AtomicBool::new(false),
        });

        let transport = FrameTransport::new(Arc::new(LogEvents));
        let err = transport
            .open(&url, Duration::from_millis(100), handler)
            .await
            .expect_err("timeout");
        assert_eq!(err, WsError::ConnectTimeout);
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_reader_forwards_frames_and_closes_on_bad_json() {
        let url = serve(vec![r#"{"ch":"trades","data":{}}"#, "not json"]).await;
        let recorder = Arc::new(Recorder::default());
        let (frames, mut rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Forward {
            frames,
            disconnected: AtomicBool::new(false),
        });

        let transport = FrameTransport::new(recorder.clone());
        transport
            .open(&url, Duration::from_secs(5), handler.clone())
            .await
            .expect("open");

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frame in time")
            .expect("frame");
        assert_eq!(frame, json!({"ch": "trades", "data": {}}));

        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.entries().last().map(String::as_str) != Some("close") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reader closed");

        assert!(!transport.is_open());
        assert!(handler.disconnected.load(Ordering::SeqCst));
        let entries = recorder.entries();
        assert_eq!(entries.first().map(String::as_str), Some("open"));
        assert!(entries.iter().any(|e| e.starts_with("error: decode failed")));
        assert_eq!(entries.last().map(String::as_str), Some("close"));

        let err = transport
            .send(&Request::new("ping", Value::Null))
            .await
            .expect_err("closed");
        assert_eq!(err, WsError::TransportClosed);
    }
}
