//! TCP session to a single projector
//!
//! A `Session` owns one connection, performs the authentication handshake
//! and serializes command execution. The in-flight guard is a fair tokio
//! mutex, so concurrent callers are served in submission order and at most
//! one request is ever outstanding on the wire.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, AuthReply, Challenge, CommandFrame, Response};
use crate::error::{Result, SessionError};

/// Default ADCP TCP port
pub const DEFAULT_ADCP_PORT: u16 = 53595;

/// Factory default ADCP password
pub const DEFAULT_PASSWORD: &str = "Projector";

/// Default connect and command timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection parameters for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Password used when the device sends a nonce; falls back to the factory default
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            connect_timeout: DEFAULT_TIMEOUT,
            command_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Successful outcome of an executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Query payload as sent by the device
    Data(String),
    /// Setter accepted
    Ack,
}

impl Reply {
    pub fn data(&self) -> Option<&str> {
        match self {
            Reply::Data(data) => Some(data),
            Reply::Ack => None,
        }
    }

    pub fn into_data(self) -> Option<String> {
        match self {
            Reply::Data(data) => Some(data),
            Reply::Ack => None,
        }
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub connects: u64,
    pub reconnects: u64,
}

type Stream = BufReader<TcpStream>;

/// One ADCP connection with authentication and a single in-flight slot
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    /// Socket, absent while disconnected; the lock is the in-flight guard
    stream: Mutex<Option<Stream>>,
    authenticated: AtomicBool,
    /// Set once the device rejects the credential
    auth_rejected: AtomicBool,
    /// Set while a frame awaits its reply; still set if that wait was dropped
    interrupted: AtomicBool,
    frames_sent: AtomicU64,
    connects: AtomicU64,
    reconnects: AtomicU64,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            authenticated: AtomicBool::new(false),
            auth_rejected: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            frames_sent: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Whether a socket is open; waits for a command in flight
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Open the connection and authenticate
    ///
    /// Does nothing when already connected.
    pub async fn connect(&self) -> Result<()> {
        let mut stream = self.stream.lock().await;
        if stream.is_some() {
            return Ok(());
        }
        self.open(&mut stream).await
    }

    /// Close the connection; safe to call when already disconnected
    pub async fn disconnect(&self) {
        let mut stream = self.stream.lock().await;
        self.teardown(&mut stream).await;
    }

    /// Run one command and wait for its response
    ///
    /// Connects lazily. A connection that drops mid-request is rebuilt once
    /// and the frame is sent again; a failed rebuild surfaces the original error.
    pub async fn execute(&self, opcode: &str, param: Option<&str>, timeout: Duration) -> Result<Reply> {
        let frame = CommandFrame::new(opcode, param);
        let mut stream = self.stream.lock().await;

        // A canceled caller may have left its reply unread
        if self.interrupted.swap(false, Ordering::SeqCst) {
            self.teardown(&mut stream).await;
        }

        let was_open = stream.is_some();
        if !was_open {
            self.open(&mut stream).await?;
        }

        match self.roundtrip(&mut stream, &frame, timeout).await {
            Err(err) if was_open && err.is_connection_fault() => {
                debug!("ADCP connection to {} dropped ({}), reconnecting", self.config.addr(), err);
                if let Err(reconnect_err) = self.open(&mut stream).await {
                    warn!(
                        "Reconnect to {} failed while sending \"{}\": {}",
                        self.config.addr(),
                        frame,
                        reconnect_err
                    );
                    return Err(err);
                }
                self.reconnects.fetch_add(1, Ordering::Relaxed);
                self.roundtrip(&mut stream, &frame, timeout).await
            }
            result => result,
        }
    }

    /// Execute using the configured command timeout
    pub async fn send(&self, opcode: &str, param: Option<&str>) -> Result<Reply> {
        self.execute(opcode, param, self.config.command_timeout).await
    }

    async fn open(&self, slot: &mut Option<Stream>) -> Result<()> {
        let addr = self.config.addr();
        if self.auth_rejected.load(Ordering::SeqCst) {
            return Err(SessionError::AuthFailed { addr });
        }

        self.teardown(slot).await;

        let result = tokio::time::timeout(self.config.connect_timeout, self.handshake(&addr)).await;
        let stream = match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                if matches!(err, SessionError::AuthFailed { .. }) {
                    self.auth_rejected.store(true, Ordering::SeqCst);
                }
                return Err(err);
            }
            Err(_) => return Err(SessionError::ConnectTimeout { addr }),
        };

        *slot = Some(stream);
        self.authenticated.store(true, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::Relaxed);
        info!("Connected to projector at {}", addr);
        Ok(())
    }

    async fn handshake(&self, addr: &str) -> Result<Stream> {
        let socket = TcpStream::connect(addr).await?;
        let mut stream = BufReader::new(socket);

        let greeting = read_line(&mut stream).await?;
        match Challenge::parse(&greeting)? {
            Challenge::None => {
                debug!("{} reported NOKEY, no authentication needed", addr);
            }
            Challenge::Nonce(nonce) => {
                let password = self
                    .config
                    .password
                    .as_deref()
                    .unwrap_or(DEFAULT_PASSWORD);
                let digest = codec::auth_response(&nonce, password);
                write_line(&mut stream, &format!("{digest}{}", codec::TERMINATOR)).await?;

                let reply = read_line(&mut stream).await?;
                if AuthReply::parse(&reply)? == AuthReply::Rejected {
                    return Err(SessionError::AuthFailed {
                        addr: addr.to_string(),
                    });
                }
                debug!("Authenticated with {}", addr);
            }
        }

        Ok(stream)
    }

    async fn roundtrip(
        &self,
        slot: &mut Option<Stream>,
        frame: &CommandFrame,
        timeout: Duration,
    ) -> Result<Reply> {
        let Some(stream) = slot.as_mut() else {
            return Err(SessionError::Disconnected("not connected".to_string()));
        };

        let exchange = async {
            write_line(stream, &frame.encode()).await?;
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
            trace!("Sent ADCP command: {}", frame);
            read_line(stream).await
        };

        self.interrupted.store(true, Ordering::SeqCst);
        let result = tokio::time::timeout(timeout, exchange).await;
        self.interrupted.store(false, Ordering::SeqCst);

        let line = match result {
            Ok(Ok(line)) => line,
            Ok(Err(err)) => {
                self.teardown(slot).await;
                return Err(err);
            }
            Err(_) => {
                self.teardown(slot).await;
                return Err(SessionError::Timeout(timeout));
            }
        };

        match codec::decode(&line, frame.is_query()) {
            Ok(Response::Data(data)) => {
                trace!("Received ADCP data for \"{}\": {}", frame, data);
                Ok(Reply::Data(data))
            }
            Ok(Response::Ack) => Ok(Reply::Ack),
            Ok(Response::Error(err)) => Err(SessionError::CommandRejected(err)),
            Err(err) => {
                self.teardown(slot).await;
                Err(err.into())
            }
        }
    }

    async fn teardown(&self, slot: &mut Option<Stream>) {
        if let Some(mut stream) = slot.take() {
            let _ = stream.get_mut().shutdown().await;
            debug!("Disconnected from {}", self.config.addr());
        }
        self.authenticated.store(false, Ordering::SeqCst);
    }
}

async fn read_line(stream: &mut Stream) -> Result<String> {
    let mut line = String::new();
    let read = stream.read_line(&mut line).await?;
    if read == 0 {
        return Err(SessionError::Disconnected("connection closed by device".to_string()));
    }
    Ok(line)
}

async fn write_line(stream: &mut Stream, line: &str) -> Result<()> {
    let socket = stream.get_mut();
    socket.write_all(line.as_bytes()).await?;
    socket.flush().await?;
    Ok(())
}
