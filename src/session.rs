// MIT License

//! The authenticated telnet session with one bridge.
//!
//! A session owns the two halves of the socket behind two independent locks:
//! the read half (plus the accumulating read buffer) behind one, the write
//! half behind the other. Inbound reads block for long stretches while the
//! bridge is idle; the separate locks keep that from ever stalling an
//! outbound command, and vice versa. Only `open` takes both, because it
//! replaces the halves that the two paths use.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::codec::{self, Scan};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::event::BridgeEvent;
use crate::protocol::{self, KEEPALIVE_QUERY, LOGIN_PROMPT, PASSWORD_PROMPT, READY_PROMPT};

const READ_SIZE: usize = 1024;

/// Connection lifecycle state.
///
/// Only `open` moves the state out of Closed. Read/write operations observe
/// the state and decline rather than fail while the session is not Opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Opened,
}

/// Connection parameters, fixed after the first successful open and reused
/// verbatim by every automatic reconnect.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ConnectParams {
    /// Parameters for `host` with the stock integration account.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 23,
            username: "lutron".to_string(),
            password: "integration".to_string(),
        }
    }
}

impl From<&BridgeConfig> for ConnectParams {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

/// Dials the bridge. The seam exists so tests can substitute an in-memory
/// transport for the TCP socket.
#[allow(async_fn_in_trait)]
pub trait Connector: Send + Sync + 'static {
    type Reader: AsyncRead + Unpin + Send + 'static;
    type Writer: AsyncWrite + Unpin + Send + 'static;

    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl std::future::Future<Output = std::io::Result<(Self::Reader, Self::Writer)>> + Send;
}

/// Production connector: a plain TCP stream, split into its halves.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Reader = tokio::net::tcp::OwnedReadHalf;
    type Writer = tokio::net::tcp::OwnedWriteHalf;

    async fn connect(&self, host: &str, port: u16) -> std::io::Result<(Self::Reader, Self::Writer)> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(stream.into_split())
    }
}

/// Everything the read path touches: the reader half and the unconsumed
/// byte tail from previous reads.
struct ReadSide<R> {
    reader: Option<R>,
    buffer: Vec<u8>,
}

/// What one locked read cycle observed, resolved outside the lock.
enum ReadOutcome {
    Event(BridgeEvent),
    Dropped,
    StreamClosed,
}

/// One authenticated connection to a bridge.
pub struct Session<C: Connector = TcpConnector> {
    connector: C,
    read: Mutex<ReadSide<C::Reader>>,
    write: Mutex<Option<C::Writer>>,
    state: RwLock<SessionState>,
    params: RwLock<Option<ConnectParams>>,
}

impl Session<TcpConnector> {
    pub fn new() -> Self {
        Self::with_connector(TcpConnector)
    }
}

impl Default for Session<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> Session<C> {
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            read: Mutex::new(ReadSide {
                reader: None,
                buffer: Vec::new(),
            }),
            write: Mutex::new(None),
            state: RwLock::new(SessionState::Closed),
            params: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Connect and perform the login handshake.
    ///
    /// No-op returning success when the session is already open. On any
    /// connect or handshake failure the state returns to Closed and the
    /// error surfaces; the session itself never retries the handshake.
    pub async fn open(&self, params: ConnectParams) -> Result<()> {
        let mut read = self.read.lock().await;
        let mut write = self.write.lock().await;

        if *self.state.read().await != SessionState::Closed {
            return Ok(());
        }
        *self.state.write().await = SessionState::Opening;

        match self.handshake(&mut read, &mut write, &params).await {
            Ok(()) => {
                *self.params.write().await = Some(params);
                *self.state.write().await = SessionState::Opened;
                Ok(())
            }
            Err(e) => {
                read.reader = None;
                read.buffer.clear();
                *write = None;
                *self.state.write().await = SessionState::Closed;
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        read: &mut ReadSide<C::Reader>,
        write: &mut Option<C::Writer>,
        params: &ConnectParams,
    ) -> Result<()> {
        debug!("Connecting to bridge at {}:{}", params.host, params.port);
        let (reader, mut writer) = self.connector.connect(&params.host, params.port).await?;
        read.reader = Some(reader);
        read.buffer.clear();

        expect_literal(read, LOGIN_PROMPT).await?;
        send_line(&mut writer, &params.username).await?;
        expect_literal(read, PASSWORD_PROMPT).await?;
        send_line(&mut writer, &params.password).await?;
        expect_literal(read, READY_PROMPT).await?;

        *write = Some(writer);
        info!("Logged in to bridge at {}", params.host);
        Ok(())
    }

    /// Read the next event from the stream.
    ///
    /// Returns None, without an error, when the session is not open, when a
    /// matched line was dropped as malformed, or when the stream closed. In
    /// the closed case the state resets and one reconnect attempt with the
    /// stored parameters runs before returning; the caller loop just calls
    /// again either way.
    pub async fn read_event(&self) -> Option<BridgeEvent> {
        let outcome = {
            let mut read = self.read.lock().await;
            if *self.state.read().await != SessionState::Opened {
                return None;
            }
            loop {
                match codec::take_event(&mut read.buffer) {
                    Scan::Event(event) => break ReadOutcome::Event(event),
                    Scan::Dropped => break ReadOutcome::Dropped,
                    Scan::NeedMore => {
                        if !fill(&mut *read).await {
                            break ReadOutcome::StreamClosed;
                        }
                    }
                }
            }
            // read lock released here; the reconnect takes it again
        };

        match outcome {
            ReadOutcome::Event(event) => Some(event),
            ReadOutcome::Dropped => None,
            ReadOutcome::StreamClosed => {
                self.reconnect().await;
                None
            }
        }
    }

    async fn reconnect(&self) {
        *self.state.write().await = SessionState::Closed;
        let params = self.params.read().await.clone();
        let Some(params) = params else {
            return;
        };
        info!("Reconnecting to bridge at {}", params.host);
        if let Err(e) = self.open(params).await {
            warn!("Reconnect failed: {}", e);
        }
    }

    /// Write a command line: `#MODE,INT,ACTION,VALUE[,EXTRA]*`.
    ///
    /// `action` takes a raw code or one of the named
    /// [`Action`](protocol::Action)/[`Button`](protocol::Button) values.
    /// Returns Ok(false), declined, when the session is not open.
    pub async fn write_command(
        &self,
        mode: &str,
        integration_id: u32,
        action: impl Into<u32>,
        value: f64,
        extras: &[Option<String>],
    ) -> Result<bool> {
        let line = protocol::format_command(mode, integration_id, action.into(), value, extras);
        self.send(&line).await
    }

    /// Write a query line: `?MODE,INT,ACTION`. Same declined rule.
    pub async fn query(
        &self,
        mode: &str,
        integration_id: u32,
        action: impl Into<u32>,
    ) -> Result<bool> {
        let line = protocol::format_query(mode, integration_id, action.into());
        self.send(&line).await
    }

    /// Write the fixed keepalive line. Same declined rule.
    pub async fn ping(&self) -> Result<bool> {
        self.send(KEEPALIVE_QUERY).await
    }

    /// Write one complete line under the write lock; the lock is what keeps
    /// concurrent commands from interleaving their bytes on the wire.
    async fn send(&self, line: &str) -> Result<bool> {
        let mut write = self.write.lock().await;
        if *self.state.read().await != SessionState::Opened {
            return Ok(false);
        }
        let Some(writer) = write.as_mut() else {
            return Ok(false);
        };
        writer.write_all(line.as_bytes()).await?;
        Ok(true)
    }
}

/// Pull more bytes into the buffer. False means the stream is gone (EOF or
/// read error); a normal outcome here, mapped to reconnect by the caller.
async fn fill<R: AsyncRead + Unpin>(read: &mut ReadSide<R>) -> bool {
    let Some(reader) = read.reader.as_mut() else {
        return false;
    };
    let mut chunk = [0u8; READ_SIZE];
    match reader.read(&mut chunk).await {
        Ok(0) => {
            debug!("Bridge closed the connection");
            false
        }
        Ok(n) => {
            read.buffer.extend_from_slice(&chunk[..n]);
            true
        }
        Err(e) => {
            debug!("Read failed: {}", e);
            false
        }
    }
}

async fn expect_literal<R: AsyncRead + Unpin>(
    read: &mut ReadSide<R>,
    literal: &[u8],
) -> Result<()> {
    loop {
        if codec::take_literal(&mut read.buffer, literal) {
            return Ok(());
        }
        if !fill(read).await {
            return Err(BridgeError::Handshake {
                prompt: String::from_utf8_lossy(literal).into_owned(),
            });
        }
    }
}

async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, value: &str) -> Result<()> {
    writer.write_all(format!("{}\r\n", value).as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transport for exercising the session without sockets.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    use super::Connector;

    /// Hands out pre-built in-memory streams instead of dialing TCP. Dials
    /// beyond the scripted list are refused.
    pub(crate) struct ScriptedConnector {
        streams: Mutex<VecDeque<DuplexStream>>,
        dials: AtomicUsize,
    }

    impl ScriptedConnector {
        pub(crate) fn new(streams: Vec<DuplexStream>) -> Self {
            Self {
                streams: Mutex::new(streams.into_iter().collect()),
                dials: AtomicUsize::new(0),
            }
        }

        pub(crate) fn dials(&self) -> usize {
            self.dials.load(Ordering::SeqCst)
        }
    }

    impl Connector for ScriptedConnector {
        type Reader = ReadHalf<DuplexStream>;
        type Writer = WriteHalf<DuplexStream>;

        async fn connect(
            &self,
            _host: &str,
            _port: u16,
        ) -> std::io::Result<(Self::Reader, Self::Writer)> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let next = self.streams.lock().expect("scripted streams").pop_front();
            match next {
                Some(stream) => Ok(tokio::io::split(stream)),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "no more scripted connections",
                )),
            }
        }
    }

    /// Drive the bridge side of the login handshake, asserting the
    /// credential lines, then hand the stream back for the test to feed
    /// events through.
    pub(crate) async fn serve_handshake(
        stream: DuplexStream,
        username: &str,
        password: &str,
    ) -> DuplexStream {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read);
        let mut line = String::new();

        write.write_all(b"login: ").await.unwrap();
        lines.read_line(&mut line).await.unwrap();
        assert_eq!(line, format!("{}\r\n", username));

        line.clear();
        write.write_all(b"password: ").await.unwrap();
        lines.read_line(&mut line).await.unwrap();
        assert_eq!(line, format!("{}\r\n", password));

        write.write_all(b"GNET> ").await.unwrap();
        lines.into_inner().unsplit(write)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    use super::testing::{ScriptedConnector, serve_handshake};
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::protocol::{Action, OUTPUT};

    async fn opened_session() -> (Session<ScriptedConnector>, tokio::io::DuplexStream) {
        let (client, server) = duplex(4096);
        let session = Session::with_connector(ScriptedConnector::new(vec![client]));
        let bridge = tokio::spawn(serve_handshake(server, "lutron", "integration"));
        session
            .open(ConnectParams::new("bridge.local"))
            .await
            .unwrap();
        (session, bridge.await.unwrap())
    }

    #[tokio::test]
    async fn test_open_performs_handshake() {
        let (session, _server) = opened_session().await;
        assert_eq!(session.state().await, SessionState::Opened);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let (client, server) = duplex(4096);
        let session = Session::with_connector(ScriptedConnector::new(vec![client]));
        let bridge = tokio::spawn(serve_handshake(server, "lutron", "integration"));
        session.open(ConnectParams::new("host")).await.unwrap();
        let _server = bridge.await.unwrap();

        // Second open performs no socket operations at all
        session.open(ConnectParams::new("host")).await.unwrap();
        assert_eq!(session.connector.dials(), 1);
        assert_eq!(session.state().await, SessionState::Opened);
    }

    #[tokio::test]
    async fn test_open_failure_returns_to_closed() {
        let (client, server) = duplex(64);
        drop(server); // bridge goes away before any prompt
        let session = Session::with_connector(ScriptedConnector::new(vec![client]));

        let err = session.open(ConnectParams::new("host")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Handshake { ref prompt } if prompt == "login: "));
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_read_and_write_decline_when_closed() {
        let session = Session::with_connector(ScriptedConnector::new(vec![]));
        assert_eq!(session.read_event().await, None);
        assert!(!session
            .write_command(OUTPUT, 5, Action::Set, 100.0, &[])
            .await
            .unwrap());
        assert!(!session.query(OUTPUT, 5, Action::Set).await.unwrap());
        assert!(!session.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_read_event_stream_in_order() {
        let (session, mut server) = opened_session().await;
        server
            .write_all(b"~DEVICE,2,3,3\r\n~DEVICE,2,4,3\r\n")
            .await
            .unwrap();

        let first = session.read_event().await.unwrap();
        assert_eq!((first.integration_id, first.action), (2, 3));
        let second = session.read_event().await.unwrap();
        assert_eq!((second.integration_id, second.action), (2, 4));
    }

    #[tokio::test]
    async fn test_malformed_line_dropped_stream_continues() {
        let (session, mut server) = opened_session().await;
        server
            .write_all(b"~OUTPUT,5.5,1,100.0\r\n~OUTPUT,6,1,25.0\r\n")
            .await
            .unwrap();

        assert_eq!(session.read_event().await, None);
        let event = session.read_event().await.unwrap();
        assert_eq!(event.integration_id, 6);
        assert_eq!(session.state().await, SessionState::Opened);
    }

    #[tokio::test]
    async fn test_command_and_query_bytes() {
        let (session, mut server) = opened_session().await;

        assert!(session
            .write_command(OUTPUT, 5, Action::Set, 75.0, &[])
            .await
            .unwrap());
        assert!(session.query(OUTPUT, 5, Action::Set).await.unwrap());
        assert!(session.ping().await.unwrap());

        let expected = b"#OUTPUT,5,1,75.0\r\n?OUTPUT,5,1\r\n?SYSTEM,10\r\n";
        let mut received = vec![0u8; expected.len()];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_writes_do_not_interleave() {
        let (session, mut server) = opened_session().await;
        let session = Arc::new(session);

        let a = {
            let session = session.clone();
            tokio::spawn(async move { session.write_command(OUTPUT, 1, 1u32, 25.0, &[]).await })
        };
        let b = {
            let session = session.clone();
            tokio::spawn(async move { session.write_command(OUTPUT, 2, 1u32, 75.0, &[]).await })
        };
        assert!(a.await.unwrap().unwrap());
        assert!(b.await.unwrap().unwrap());

        let line_a = "#OUTPUT,1,1,25.0\r\n";
        let line_b = "#OUTPUT,2,1,75.0\r\n";
        let mut received = vec![0u8; line_a.len() + line_b.len()];
        server.read_exact(&mut received).await.unwrap();
        let received = String::from_utf8(received).unwrap();

        // Each write lands as one complete, uninterrupted line
        assert!(
            received == format!("{}{}", line_a, line_b)
                || received == format!("{}{}", line_b, line_a),
            "interleaved writes: {:?}",
            received
        );
    }

    #[tokio::test]
    async fn test_reconnects_in_place_with_stored_credentials() {
        let (client1, server1) = duplex(4096);
        let (client2, server2) = duplex(4096);
        let session = Session::with_connector(ScriptedConnector::new(vec![client1, client2]));

        let bridge1 = tokio::spawn(serve_handshake(server1, "lutron", "integration"));
        session.open(ConnectParams::new("host")).await.unwrap();
        let mut server1 = bridge1.await.unwrap();

        server1.write_all(b"~OUTPUT,5,1,100.0\r\n").await.unwrap();
        assert!(session.read_event().await.is_some());

        // The replacement bridge validates that the same credentials come
        // back without the caller re-supplying them.
        let bridge2 = tokio::spawn(serve_handshake(server2, "lutron", "integration"));
        drop(server1);

        assert_eq!(session.read_event().await, None);
        assert_eq!(session.state().await, SessionState::Opened);
        assert_eq!(session.connector.dials(), 2);

        let mut server2 = bridge2.await.unwrap();
        server2.write_all(b"~DEVICE,2,3,3\r\n").await.unwrap();
        let event = session.read_event().await.unwrap();
        assert_eq!(event.mode, "DEVICE");
    }

    #[tokio::test]
    async fn test_failed_reconnect_leaves_session_closed() {
        let (session, server) = opened_session().await;
        drop(server);

        // Stream gone, reconnect refused (no more scripted connections)
        assert_eq!(session.read_event().await, None);
        assert_eq!(session.state().await, SessionState::Closed);

        // Subsequent cycles decline immediately rather than blocking
        assert_eq!(session.read_event().await, None);
        assert!(!session.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_dispatch_end_to_end_single_event() {
        let (session, mut server) = opened_session().await;
        let dispatcher = Dispatcher::new();
        let recorder = Arc::new(crate::dispatch::testing::Recorder::default());
        dispatcher.register(&recorder).await;

        server.write_all(b"~OUTPUT,5,1,100.0\r\n").await.unwrap();
        let event = session.read_event().await.unwrap();
        dispatcher.dispatch(&event).await;

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].mode, "OUTPUT");
        assert_eq!(events[0].integration_id, 5);
        assert_eq!(events[0].action, 1);
        assert_eq!(events[0].value, 100.0);

        // Nothing left over once the line is consumed
        assert!(session.read.lock().await.buffer.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_end_to_end_back_to_back_events() {
        let (session, mut server) = opened_session().await;
        let dispatcher = Dispatcher::new();
        let recorder = Arc::new(crate::dispatch::testing::Recorder::default());
        dispatcher.register(&recorder).await;

        server
            .write_all(b"~DEVICE,2,3,3\r\n~DEVICE,2,4,3\r\n")
            .await
            .unwrap();
        for _ in 0..2 {
            let event = session.read_event().await.unwrap();
            dispatcher.dispatch(&event).await;
        }

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].action, events[0].value), (3, 3.0));
        assert_eq!((events[1].action, events[1].value), (4, 3.0));
        assert!(session.read.lock().await.buffer.is_empty());
    }
}
