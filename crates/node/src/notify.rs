//! Webhook event delivery: retried connect, content-length framed POST,
//! deadline-bounded response poll.
//!
//! Delivery failures never fail the cycle. Every terminal state is pushed
//! to the dashboard status channel and returned as a [`NotificationOutcome`]
//! for the caller to log.

use std::io;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::config::Webhook;
use crate::ports::{Dashboard, CH_STATUS};

/// Moisture percentages bracketing one pump run: the reading that triggered
/// irrigation and the reading that stopped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationRequest {
    pub field_start: i32,
    pub field_end: i32,
}

/// Terminal status of one delivery attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Request sent and at least one response byte received.
    Delivered(String),
    /// Every connection attempt failed; nothing was sent.
    ConnectFailed,
    /// Request sent but the server stayed silent past the deadline.
    NoResponse,
}

/// Wire payload. The webhook expects both values as text, not numbers.
#[derive(Serialize)]
struct EventRecord {
    value1: String,
    value2: String,
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// One dialable endpoint. Production dials TCP; tests substitute in-memory
/// duplex streams to script refused connections and canned responses.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Conn: AsyncRead + AsyncWrite + Unpin;
    async fn dial(&mut self) -> io::Result<Self::Conn>;
}

/// TCP transport with a per-attempt connect timeout.
pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            connect_timeout,
        }
    }
}

impl Transport for TcpTransport {
    type Conn = TcpStream;

    async fn dial(&mut self) -> io::Result<TcpStream> {
        match timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery seam (what the controller depends on)
// ---------------------------------------------------------------------------

/// Lets the controller trigger a delivery without knowing about the wire;
/// tests observe notifications through a fake implementation.
#[allow(async_fn_in_trait)]
pub trait Notify {
    async fn notify(
        &mut self,
        req: NotificationRequest,
        dashboard: &mut dyn Dashboard,
    ) -> NotificationOutcome;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct NotificationClient<T> {
    transport: T,
    host: String,
    path: String,
    connect_attempts: u32,
    response_timeout: Duration,
    poll_interval: Duration,
}

impl<T: Transport> NotificationClient<T> {
    pub fn new(
        transport: T,
        host: String,
        path: String,
        connect_attempts: u32,
        response_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            host,
            path,
            connect_attempts,
            response_timeout,
            poll_interval,
        }
    }

    /// Dial until a connection sticks or the attempts run out.
    /// No backoff between attempts beyond the dial's own latency.
    async fn connect(&mut self) -> Option<T::Conn> {
        for attempt in 1..=self.connect_attempts {
            match self.transport.dial().await {
                Ok(conn) => {
                    debug!(attempt, "webhook connected");
                    return Some(conn);
                }
                Err(e) => warn!(attempt, "webhook connect failed: {e}"),
            }
        }
        None
    }

    async fn exchange(
        &mut self,
        conn: &mut T::Conn,
        req: NotificationRequest,
        dashboard: &mut dyn Dashboard,
    ) -> NotificationOutcome {
        let body = serde_json::to_string(&EventRecord {
            value1: req.field_start.to_string(),
            value2: req.field_end.to_string(),
        })
        .unwrap();

        let head = format!(
            "POST {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Connection: close\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             \r\n",
            self.path,
            self.host,
            body.len()
        );

        for part in [head.as_bytes(), body.as_bytes()] {
            if let Err(e) = conn.write_all(part).await {
                warn!("webhook send failed: {e}");
                dashboard.push_status(CH_STATUS, "No response...");
                return NotificationOutcome::NoResponse;
            }
        }

        // Poll for response data until the deadline. The server may dribble
        // bytes; each chunk is streamed to the status channel as it arrives.
        let deadline = Instant::now() + self.response_timeout;
        let mut received = String::new();
        let mut buf = [0u8; 512];
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let window = self.poll_interval.min(deadline - now);
            match timeout(window, conn.read(&mut buf)).await {
                Ok(Ok(0)) => break, // server closed
                Ok(Ok(n)) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]);
                    dashboard.push_status(CH_STATUS, &chunk);
                    received.push_str(&chunk);
                }
                Ok(Err(e)) => {
                    warn!("webhook read failed: {e}");
                    break;
                }
                Err(_) => {} // poll window elapsed with no data yet
            }
        }

        if received.is_empty() {
            dashboard.push_status(CH_STATUS, "No response...");
            NotificationOutcome::NoResponse
        } else {
            NotificationOutcome::Delivered(received)
        }
    }
}

impl NotificationClient<TcpTransport> {
    /// Client wired from the `[webhook]` config section.
    pub fn from_config(cfg: &Webhook) -> Self {
        Self::new(
            TcpTransport::new(
                &cfg.host,
                cfg.port,
                Duration::from_millis(cfg.connect_timeout_ms),
            ),
            cfg.host.clone(),
            cfg.path.clone(),
            cfg.connect_attempts,
            Duration::from_secs(cfg.response_timeout_sec),
            Duration::from_millis(cfg.poll_interval_ms),
        )
    }
}

impl<T: Transport> Notify for NotificationClient<T> {
    /// Deliver one event record. The connection is torn down on every exit
    /// path, and the dashboard always sees the closing status.
    async fn notify(
        &mut self,
        req: NotificationRequest,
        dashboard: &mut dyn Dashboard,
    ) -> NotificationOutcome {
        let outcome = match self.connect().await {
            Some(mut conn) => {
                let out = self.exchange(&mut conn, req, dashboard).await;
                let _ = conn.shutdown().await;
                out
            }
            None => {
                dashboard.push_status(CH_STATUS, "Failed to connect...");
                NotificationOutcome::ConnectFailed
            }
        };
        dashboard.push_status(CH_STATUS, "closing connection");
        outcome
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::RecordingDashboard;
    use std::collections::VecDeque;
    use tokio::io::DuplexStream;

    const EXPECTED_BODY: &str = r#"{"value1":"20","value2":"40"}"#;

    fn request() -> NotificationRequest {
        NotificationRequest {
            field_start: 20,
            field_end: 40,
        }
    }

    fn test_client(transport: FakeTransport) -> NotificationClient<FakeTransport> {
        NotificationClient::new(
            transport,
            "webhook.test".into(),
            "/hook/t1".into(),
            5,
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
    }

    /// Status texts pushed to the dashboard, in order.
    fn status_texts(dash: &RecordingDashboard) -> Vec<&str> {
        dash.statuses.iter().map(|(_, s)| s.as_str()).collect()
    }

    // -- Fake transport -----------------------------------------------------

    struct FakeTransport {
        dials: u32,
        conns: VecDeque<io::Result<DuplexStream>>,
    }

    impl FakeTransport {
        /// Refuses every dial.
        fn refusing() -> Self {
            Self {
                dials: 0,
                conns: VecDeque::new(),
            }
        }

        fn script(conns: Vec<io::Result<DuplexStream>>) -> Self {
            Self {
                dials: 0,
                conns: conns.into_iter().collect(),
            }
        }
    }

    impl Transport for FakeTransport {
        type Conn = DuplexStream;

        async fn dial(&mut self) -> io::Result<DuplexStream> {
            self.dials += 1;
            self.conns.pop_front().unwrap_or_else(|| {
                Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))
            })
        }
    }

    /// Echo server: swallows the request until the body arrives, replies
    /// with `response`, then closes. Returns the captured request.
    fn echo_server(
        mut conn: DuplexStream,
        response: &'static str,
    ) -> tokio::task::JoinHandle<String> {
        tokio::spawn(async move {
            let mut req = Vec::new();
            let mut buf = [0u8; 256];
            while !String::from_utf8_lossy(&req).contains("\"value2\"") {
                let n = conn.read(&mut buf).await.unwrap();
                assert!(n > 0, "client closed before sending the body");
                req.extend_from_slice(&buf[..n]);
            }
            conn.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8(req).unwrap()
        })
    }

    // -- Connect retry ------------------------------------------------------

    #[tokio::test]
    async fn exhausted_retries_report_connect_failed() {
        let mut client = test_client(FakeTransport::refusing());
        let mut dash = RecordingDashboard::default();

        let outcome = client.notify(request(), &mut dash).await;

        assert_eq!(outcome, NotificationOutcome::ConnectFailed);
        assert_eq!(client.transport.dials, 5);
        assert_eq!(
            status_texts(&dash),
            vec!["Failed to connect...", "closing connection"]
        );
    }

    #[tokio::test]
    async fn dialing_stops_at_first_success() {
        let (client_end, server_end) = tokio::io::duplex(1024);
        let refused = || io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let transport =
            FakeTransport::script(vec![Err(refused()), Err(refused()), Ok(client_end)]);
        let mut client = test_client(transport);
        let mut dash = RecordingDashboard::default();
        let server = echo_server(server_end, "HTTP/1.1 200 OK\r\n\r\n");

        let outcome = client.notify(request(), &mut dash).await;

        assert!(matches!(outcome, NotificationOutcome::Delivered(_)));
        assert_eq!(client.transport.dials, 3);
        server.await.unwrap();
    }

    // -- Successful delivery ------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn delivery_sends_framed_request_and_streams_response() {
        let (client_end, server_end) = tokio::io::duplex(1024);
        let mut client = test_client(FakeTransport::script(vec![Ok(client_end)]));
        let mut dash = RecordingDashboard::default();
        let server = echo_server(server_end, "HTTP/1.1 200 OK\r\n\r\nCongratulations");

        let outcome = client.notify(request(), &mut dash).await;

        let req = server.await.unwrap();
        assert!(req.starts_with("POST /hook/t1 HTTP/1.1\r\n"), "{req}");
        assert!(req.contains("Host: webhook.test\r\n"), "{req}");
        assert!(req.contains("Connection: close\r\n"), "{req}");
        assert!(req.contains("Content-Type: application/json\r\n"), "{req}");
        assert!(
            req.contains(&format!("Content-Length: {}\r\n", EXPECTED_BODY.len())),
            "{req}"
        );
        assert!(req.ends_with(EXPECTED_BODY), "{req}");

        let NotificationOutcome::Delivered(body) = outcome else {
            panic!("expected Delivered, got {outcome:?}");
        };
        assert_eq!(body, "HTTP/1.1 200 OK\r\n\r\nCongratulations");

        // Response bytes stream to the status channel before the closer.
        let statuses = status_texts(&dash);
        assert_eq!(statuses.last(), Some(&"closing connection"));
        let streamed: String = statuses[..statuses.len() - 1].concat();
        assert_eq!(streamed, "HTTP/1.1 200 OK\r\n\r\nCongratulations");
    }

    // -- Silent server ------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out_as_no_response() {
        let (client_end, mut server_end) = tokio::io::duplex(1024);
        let mut client = test_client(FakeTransport::script(vec![Ok(client_end)]));
        let mut dash = RecordingDashboard::default();

        // Swallow the request, then go quiet without closing.
        let server = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let _ = server_end.read(&mut buf).await;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            drop(server_end);
        });

        let start = Instant::now();
        let outcome = client.notify(request(), &mut dash).await;

        assert_eq!(outcome, NotificationOutcome::NoResponse);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(
            status_texts(&dash),
            vec!["No response...", "closing connection"]
        );
        server.abort();
    }

    // -- Dead connection ----------------------------------------------------

    #[tokio::test]
    async fn connection_closed_before_response_is_no_response() {
        let (client_end, server_end) = tokio::io::duplex(1024);
        drop(server_end); // peer hangs up immediately
        let mut client = test_client(FakeTransport::script(vec![Ok(client_end)]));
        let mut dash = RecordingDashboard::default();

        let outcome = client.notify(request(), &mut dash).await;

        assert_eq!(outcome, NotificationOutcome::NoResponse);
        assert_eq!(status_texts(&dash).last(), Some(&"closing connection"));
    }
}
