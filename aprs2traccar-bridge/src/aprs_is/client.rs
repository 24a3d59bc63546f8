use std::sync::Arc;
use std::time::Duration;

use aprs2traccar_common::{parse, passcode, Parsed};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, timeout_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::{Backoff, ConnectionState};
use crate::config::AprsConfig;
use crate::dispatcher::ReportHandler;
use crate::stats::BridgeStats;

const CLIENT_NAME: &str = "aprs2traccar";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const KEEPALIVE_LINE: &[u8] = b"# aprs2traccar keepalive\r\n";
/// APRS-IS servers cap lines at 512 bytes including CRLF
const MAX_LINE_LEN: usize = 512;

/// Connection parameters, resolved from [`AprsConfig`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub callsign: String,
    pub server_address: String,
    pub filter: Option<String>,
    pub connect_timeout: Duration,
    pub login_timeout: Duration,
    pub idle_timeout: Duration,
    pub keepalive_interval: Option<Duration>,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub backoff_reset_after: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &AprsConfig) -> Self {
        Self {
            callsign: config.callsign.trim().to_ascii_uppercase(),
            server_address: config.server_address(),
            filter: config.filter_term(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            login_timeout: Duration::from_secs(config.login_timeout_secs),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            keepalive_interval: config.keepalive_interval_secs.map(Duration::from_secs),
            backoff_min: Duration::from_secs(config.backoff_min_secs),
            backoff_max: Duration::from_secs(config.backoff_max_secs),
            backoff_reset_after: Duration::from_secs(config.backoff_reset_after_secs),
        }
    }
}

/// Why a session with the server ended
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no answer to login within {0:?}")]
    LoginTimeout(Duration),

    #[error("server closed the connection during login")]
    ClosedDuringLogin,

    #[error("no data from server for {0:?}")]
    Idle(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Long-running APRS-IS reader.
///
/// Parsed position reports are handed to the [`ReportHandler`] inline, so a
/// slow handler slows the read loop down.
pub struct AprsIsClient {
    settings: ClientSettings,
    handler: Arc<dyn ReportHandler>,
    stats: Arc<BridgeStats>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown: Notify,
}

impl AprsIsClient {
    pub fn new(settings: ClientSettings, handler: Arc<dyn ReportHandler>, stats: Arc<BridgeStats>) -> Self {
        Self {
            settings,
            handler,
            stats,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            shutdown: Notify::new(),
        }
    }

    /// Get the current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Spawn the connect/stream/reconnect loop. It runs until [`stop`](Self::stop).
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move { client.run().await })
    }

    /// Ask the loop to exit. The socket is closed at the next await point.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// `user CALL pass CODE vers NAME VERSION [filter TERM]`, CRLF terminated
    pub fn login_line(&self) -> String {
        let callsign = &self.settings.callsign;
        let mut line = format!(
            "user {} pass {} vers {} {}",
            callsign,
            passcode(callsign),
            CLIENT_NAME,
            CLIENT_VERSION
        );
        if let Some(filter) = &self.settings.filter {
            line.push_str(" filter ");
            line.push_str(filter);
        }
        line.push_str("\r\n");
        line
    }

    async fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write().await;
        if *state != next {
            debug!("APRS-IS connection {} -> {}", *state, next);
            *state = next;
        }
    }

    async fn run(&self) {
        let mut backoff = Backoff::new(self.settings.backoff_min, self.settings.backoff_max);

        loop {
            let mut streaming_since = None;
            let result = tokio::select! {
                _ = self.shutdown.notified() => break,
                result = self.run_session(&mut streaming_since) => result,
            };

            match result {
                Ok(()) => info!("APRS-IS server {} closed the connection", self.settings.server_address),
                Err(e) => warn!("APRS-IS session ended: {}", e),
            }

            if streaming_since.is_some_and(|since: Instant| since.elapsed() >= self.settings.backoff_reset_after) {
                backoff.reset();
            }

            self.set_state(ConnectionState::Backoff).await;
            self.stats.record_reconnect();
            let delay = backoff.next_delay();
            info!("Reconnecting to APRS-IS in {:.1}s", delay.as_secs_f64());

            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected).await;
        info!("APRS-IS client stopped");
    }

    /// One connection from connect to disconnect. `Ok` means the server
    /// closed the stream.
    async fn run_session(&self, streaming_since: &mut Option<Instant>) -> Result<(), SessionError> {
        let addr = &self.settings.server_address;
        self.set_state(ConnectionState::Connecting).await;
        info!("Connecting to APRS-IS server {}", addr);

        let stream = timeout(self.settings.connect_timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| SessionError::ConnectTimeout(addr.clone()))?
            .map_err(|source| SessionError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let login = self.login_line();
        debug!("Sending login: {}", login.trim_end());
        write_half.write_all(login.as_bytes()).await?;
        self.set_state(ConnectionState::LoggedIn).await;

        // Any line after the login line counts as acknowledgement
        let mut buf = Vec::new();
        let acknowledged = timeout(self.settings.login_timeout, read_full_line(&mut reader, &mut buf))
            .await
            .map_err(|_| SessionError::LoginTimeout(self.settings.login_timeout))??;
        if !acknowledged {
            return Err(SessionError::ClosedDuringLogin);
        }

        self.set_state(ConnectionState::Streaming).await;
        *streaming_since = Some(Instant::now());
        info!("Streaming from {} as {}", addr, self.settings.callsign);
        self.finish_line(&buf).await;
        buf.clear();

        let mut keepalive = self.settings.keepalive_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut last_rx = Instant::now();

        loop {
            // read_chunk keeps partial input in `buf` when the keepalive branch wins
            tokio::select! {
                read = timeout_at(last_rx + self.settings.idle_timeout, read_chunk(&mut reader, &mut buf)) => {
                    match read {
                        Err(_) => return Err(SessionError::Idle(self.settings.idle_timeout)),
                        Ok(Err(e)) => return Err(e.into()),
                        Ok(Ok(Chunk::Eof)) => return Ok(()),
                        Ok(Ok(Chunk::Partial)) => last_rx = Instant::now(),
                        Ok(Ok(Chunk::Line)) => {
                            last_rx = Instant::now();
                            self.finish_line(&buf).await;
                            buf.clear();
                        }
                    }
                }
                _ = next_tick(&mut keepalive) => {
                    trace!("Sending keepalive to {}", addr);
                    write_half.write_all(KEEPALIVE_LINE).await?;
                }
            }
        }
    }

    async fn finish_line(&self, raw: &[u8]) {
        if raw.len() > MAX_LINE_LEN {
            self.stats.record_line();
            self.stats.record_malformed();
            debug!(
                "Skipping line over {} bytes: {}...",
                MAX_LINE_LEN,
                String::from_utf8_lossy(&raw[..raw.len().min(64)])
            );
            return;
        }
        self.handle_line(raw).await;
    }

    async fn handle_line(&self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return;
        }
        self.stats.record_line();

        if let Some(comment) = line.strip_prefix('#') {
            self.stats.record_comment();
            let comment = comment.trim();
            if comment.starts_with("logresp") {
                if comment.contains("unverified") {
                    warn!("APRS-IS login not verified: {}", comment);
                } else {
                    info!("APRS-IS {}", comment);
                }
            } else {
                debug!("APRS-IS comment: {}", comment);
            }
            return;
        }

        match parse(line) {
            Ok(Parsed::Position(report)) => {
                self.stats.record_position();
                trace!("Position from {}: {:.5}, {:.5}", report.source_callsign, report.latitude, report.longitude);
                self.handler.on_report(report).await;
            }
            Ok(Parsed::NotPosition) => {
                self.stats.record_not_position();
                trace!("Ignoring non-position packet: {}", line);
            }
            Err(e) => {
                self.stats.record_malformed();
                debug!("Skipping malformed packet ({}): {}", e, line);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk {
    Eof,
    /// Bytes arrived but the line is not complete yet
    Partial,
    Line,
}

/// Appends the next buffered bytes up to and including `\n` to `buf`.
///
/// Cancel safe: nothing is consumed before `fill_buf` resolves. Bytes past
/// `MAX_LINE_LEN + 1` are dropped so an overlong line only shows up as its length.
async fn read_chunk<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Chunk>
where
    R: AsyncBufRead + Unpin,
{
    let available = reader.fill_buf().await?;
    if available.is_empty() {
        return Ok(Chunk::Eof);
    }
    let (used, chunk) = match available.iter().position(|&b| b == b'\n') {
        Some(end) => (end + 1, Chunk::Line),
        None => (available.len(), Chunk::Partial),
    };
    let room = (MAX_LINE_LEN + 1).saturating_sub(buf.len());
    buf.extend_from_slice(&available[..used.min(room)]);
    reader.consume(used);
    Ok(chunk)
}

/// Reads until a full line is in `buf`; `false` if the stream ended first.
async fn read_full_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_chunk(reader, buf).await? {
            Chunk::Eof => return Ok(false),
            Chunk::Line => return Ok(true),
            Chunk::Partial => {}
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aprs2traccar_common::PositionReport;
    use async_trait::async_trait;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    struct ChannelHandler(mpsc::UnboundedSender<PositionReport>);

    #[async_trait]
    impl ReportHandler for ChannelHandler {
        async fn on_report(&self, report: PositionReport) {
            let _ = self.0.send(report);
        }
    }

    fn settings(addr: SocketAddr) -> ClientSettings {
        ClientSettings {
            callsign: "N0CALL".to_string(),
            server_address: addr.to_string(),
            filter: Some("b/N0CALL".to_string()),
            connect_timeout: Duration::from_secs(1),
            login_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(5),
            keepalive_interval: None,
            backoff_min: Duration::from_millis(20),
            backoff_max: Duration::from_millis(100),
            backoff_reset_after: Duration::from_secs(60),
        }
    }

    fn client_for(
        settings: ClientSettings,
    ) -> (Arc<AprsIsClient>, mpsc::UnboundedReceiver<PositionReport>, Arc<BridgeStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(BridgeStats::new());
        let client = Arc::new(AprsIsClient::new(settings, Arc::new(ChannelHandler(tx)), stats.clone()));
        (client, rx, stats)
    }

    async fn accept_login(listener: &TcpListener) -> (BufReader<TcpStream>, String) {
        let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let mut socket = BufReader::new(socket);
        let mut login = String::new();
        timeout(WAIT, socket.read_line(&mut login)).await.unwrap().unwrap();
        (socket, login)
    }

    async fn wait_for_state(client: &AprsIsClient, expected: ConnectionState) {
        let deadline = Instant::now() + WAIT;
        while client.state().await != expected {
            assert!(Instant::now() < deadline, "never reached {}", expected);
            sleep(Duration::from_millis(5)).await;
        }
    }

    async fn stop_and_join(client: &AprsIsClient, handle: JoinHandle<()>) {
        client.stop();
        timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[test]
    fn test_settings_from_config() {
        let config = AprsConfig {
            callsign: " n0call-10 ".to_string(),
            keepalive_interval_secs: Some(30),
            ..AprsConfig::default()
        };

        let settings = ClientSettings::from_config(&config);
        assert_eq!(settings.callsign, "N0CALL-10");
        assert_eq!(settings.server_address, "rotate.aprs.net:14580");
        assert_eq!(settings.filter.as_deref(), Some("b/N0CALL-10"));
        assert_eq!(settings.keepalive_interval, Some(Duration::from_secs(30)));
        assert_eq!(settings.backoff_min, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_login_line() {
        let addr: SocketAddr = "127.0.0.1:14580".parse().unwrap();
        let (client, _rx, _stats) = client_for(settings(addr));
        assert_eq!(
            client.login_line(),
            format!("user N0CALL pass 13023 vers aprs2traccar {} filter b/N0CALL\r\n", CLIENT_VERSION)
        );

        let mut unfiltered = settings(addr);
        unfiltered.callsign = "N0CALL-9".to_string();
        unfiltered.filter = None;
        let (client, _rx, _stats) = client_for(unfiltered);
        assert_eq!(
            client.login_line(),
            format!("user N0CALL-9 pass 13023 vers aprs2traccar {}\r\n", CLIENT_VERSION)
        );
    }

    #[tokio::test]
    async fn test_streams_positions_to_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (client, mut reports, stats) = client_for(settings(listener.local_addr().unwrap()));
        let handle = client.start();

        let (mut server, login) = accept_login(&listener).await;
        assert!(login.starts_with("user N0CALL pass 13023 vers aprs2traccar "));
        assert!(login.ends_with(" filter b/N0CALL\r\n"));

        server
            .write_all(
                b"# logresp N0CALL verified, server T2TEST\r\n\
                  W1AW>APRS,TCPIP*:>Station status\r\n\
                  W1AW>APRS,TCPIP*:!49XX.50N/07201.75W>\r\n\
                  N0CALL>APRS,TCPIP*:!4903.50N/07201.75W>Test comment\r\n",
            )
            .await
            .unwrap();

        let report = timeout(WAIT, reports.recv()).await.unwrap().unwrap();
        assert_eq!(report.source_callsign, "N0CALL");
        assert!((report.latitude - 49.0583).abs() < 0.0001);
        assert!((report.longitude + 72.0292).abs() < 0.0001);
        assert_eq!(report.comment.as_deref(), Some("Test comment"));
        assert_eq!(client.state().await, ConnectionState::Streaming);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.lines, 4);
        assert_eq!(snapshot.comments, 1);
        assert_eq!(snapshot.not_position, 1);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.positions, 1);

        stop_and_join(&client, handle).await;
    }

    #[tokio::test]
    async fn test_reconnects_after_server_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (client, _rx, stats) = client_for(settings(listener.local_addr().unwrap()));
        let handle = client.start();

        let (mut server, _) = accept_login(&listener).await;
        server.write_all(b"# aprsc 2.1.19\r\n").await.unwrap();
        wait_for_state(&client, ConnectionState::Streaming).await;
        drop(server);

        let (_server, login) = accept_login(&listener).await;
        assert!(login.starts_with("user N0CALL "));
        assert!(stats.snapshot().reconnects >= 1);

        stop_and_join(&client, handle).await;
    }

    #[tokio::test]
    async fn test_login_timeout_enters_backoff() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut settings = settings(listener.local_addr().unwrap());
        settings.login_timeout = Duration::from_millis(100);
        settings.backoff_min = Duration::from_secs(30);
        settings.backoff_max = Duration::from_secs(30);
        let (client, _rx, _stats) = client_for(settings);
        let handle = client.start();

        // Accept and stay silent
        let (_server, _) = accept_login(&listener).await;
        wait_for_state(&client, ConnectionState::Backoff).await;

        // Stop interrupts the backoff wait
        stop_and_join(&client, handle).await;
    }

    #[tokio::test]
    async fn test_idle_connection_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut settings = settings(listener.local_addr().unwrap());
        settings.idle_timeout = Duration::from_millis(200);
        let (client, _rx, _stats) = client_for(settings);
        let handle = client.start();

        let (mut first, _) = accept_login(&listener).await;
        first.write_all(b"# logresp N0CALL verified\r\n").await.unwrap();

        // Silence on the first connection leads to a second login
        let (_second, login) = accept_login(&listener).await;
        assert!(login.starts_with("user N0CALL "));

        stop_and_join(&client, handle).await;
    }

    #[tokio::test]
    async fn test_partial_line_keeps_connection_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut settings = settings(listener.local_addr().unwrap());
        settings.idle_timeout = Duration::from_millis(300);
        let (client, mut reports, stats) = client_for(settings);
        let handle = client.start();

        let (mut server, _) = accept_login(&listener).await;
        server.write_all(b"# logresp N0CALL verified\r\n").await.unwrap();

        // One line trickled out over longer than the idle timeout
        for piece in ["N0CALL>APRS,", "TCPIP*:!4903.50N", "/07201.75W>", "Slow"] {
            server.write_all(piece.as_bytes()).await.unwrap();
            sleep(Duration::from_millis(120)).await;
        }
        server.write_all(b" link\r\n").await.unwrap();

        let report = timeout(WAIT, reports.recv()).await.unwrap().unwrap();
        assert_eq!(report.comment.as_deref(), Some("Slow link"));
        assert_eq!(stats.snapshot().reconnects, 0);

        stop_and_join(&client, handle).await;
    }

    #[tokio::test]
    async fn test_overlong_line_is_malformed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (client, mut reports, stats) = client_for(settings(listener.local_addr().unwrap()));
        let handle = client.start();

        let (mut server, _) = accept_login(&listener).await;
        server.write_all(b"# logresp N0CALL verified\r\n").await.unwrap();

        let mut overlong = b"N0CALL>APRS,TCPIP*:>".to_vec();
        overlong.resize(600, b'x');
        overlong.extend_from_slice(b"\r\n");
        server.write_all(&overlong).await.unwrap();
        server
            .write_all(b"N0CALL>APRS,TCPIP*:!4903.50N/07201.75W>After\r\n")
            .await
            .unwrap();

        let report = timeout(WAIT, reports.recv()).await.unwrap().unwrap();
        assert_eq!(report.comment.as_deref(), Some("After"));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.lines, 3);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.not_position, 0);
        assert_eq!(snapshot.reconnects, 0);

        stop_and_join(&client, handle).await;
    }

    #[tokio::test]
    async fn test_backoff_resets_after_sustained_streaming() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut settings = settings(listener.local_addr().unwrap());
        settings.backoff_min = Duration::from_millis(50);
        settings.backoff_max = Duration::from_secs(5);
        settings.backoff_reset_after = Duration::from_millis(50);
        let (client, _rx, _stats) = client_for(settings);
        let handle = client.start();

        // Four sessions closed during login: waits of 50, 100, 200 and 400 ms
        let mut dropped_at = Instant::now();
        for _ in 0..4 {
            let (server, _) = accept_login(&listener).await;
            drop(server);
            dropped_at = Instant::now();
        }

        let (mut server, _) = accept_login(&listener).await;
        assert!(dropped_at.elapsed() >= Duration::from_millis(350));
        server.write_all(b"# logresp N0CALL verified\r\n").await.unwrap();
        wait_for_state(&client, ConnectionState::Streaming).await;
        sleep(Duration::from_millis(150)).await;
        drop(server);
        let dropped_at = Instant::now();

        // Without the reset this wait would be 800 ms
        let (_server, login) = accept_login(&listener).await;
        assert!(login.starts_with("user N0CALL "));
        assert!(dropped_at.elapsed() < Duration::from_millis(400));

        stop_and_join(&client, handle).await;
    }

    #[tokio::test]
    async fn test_sends_keepalive_comment() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut settings = settings(listener.local_addr().unwrap());
        settings.keepalive_interval = Some(Duration::from_millis(50));
        let (client, _rx, _stats) = client_for(settings);
        let handle = client.start();

        let (mut server, _) = accept_login(&listener).await;
        server.write_all(b"# logresp N0CALL verified\r\n").await.unwrap();

        let mut line = String::new();
        timeout(WAIT, server.read_line(&mut line)).await.unwrap().unwrap();
        assert_eq!(line, "# aprs2traccar keepalive\r\n");

        stop_and_join(&client, handle).await;
    }

    #[tokio::test]
    async fn test_connection_refused_keeps_retrying() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (client, _rx, stats) = client_for(settings(addr));
        let handle = client.start();

        let deadline = Instant::now() + WAIT;
        while stats.snapshot().reconnects < 2 {
            assert!(Instant::now() < deadline);
            sleep(Duration::from_millis(10)).await;
        }

        stop_and_join(&client, handle).await;
    }

    #[tokio::test]
    async fn test_stop_closes_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (client, _rx, _stats) = client_for(settings(listener.local_addr().unwrap()));
        let handle = client.start();

        let (mut server, _) = accept_login(&listener).await;
        server.write_all(b"# logresp N0CALL verified\r\n").await.unwrap();
        wait_for_state(&client, ConnectionState::Streaming).await;

        stop_and_join(&client, handle).await;

        let mut rest = Vec::new();
        let read = timeout(WAIT, server.read_to_end(&mut rest)).await.unwrap().unwrap();
        assert_eq!(read, 0);
    }
}
