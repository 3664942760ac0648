//! In-process ADCP projector for tests
//!
//! Speaks the real line protocol over a loopback socket. Setters of the form
//! `<opcode> "<value>"` are remembered and answered by the matching query,
//! `power` maps onto `power_status`. Every received command line is recorded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::codec::{self, CommandFrame};

const NONCE: &str = "4f2d9c0a7be1";

#[derive(Debug, Default)]
struct MockState {
    password: Option<String>,
    values: HashMap<String, String>,
    overrides: HashMap<String, String>,
    received: Vec<String>,
    connections: u32,
    auth_failures: u32,
    drop_next: u32,
    close_after_reply: bool,
    silent: bool,
    delay: Option<Duration>,
    in_flight: u32,
    max_in_flight: u32,
}

/// Loopback projector speaking ADCP
#[derive(Debug)]
pub struct MockProjector {
    port: u16,
    state: Arc<Mutex<MockState>>,
    handle: JoinHandle<()>,
}

impl MockProjector {
    /// Start a projector that does not require authentication
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(None).await
    }

    /// Start a projector that sends a nonce and checks `password`
    pub async fn with_password(password: &str) -> std::io::Result<Self> {
        Self::start_with(Some(password.to_string())).await
    }

    async fn start_with(password: Option<String>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let mut initial = MockState {
            password,
            ..MockState::default()
        };
        initial.values.insert("power_status".to_string(), codec::quote("standby"));
        initial.values.insert("input".to_string(), codec::quote("hdmi1"));
        initial.values.insert("blank".to_string(), codec::quote("off"));
        let state = Arc::new(Mutex::new(initial));

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Ok(Self {
            port,
            state,
            handle,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current value answered for `<opcode> ?`
    pub async fn set_value(&self, opcode: &str, raw: &str) {
        self.state.lock().await.values.insert(opcode.to_string(), raw.to_string());
    }

    pub async fn value(&self, opcode: &str) -> Option<String> {
        self.state.lock().await.values.get(opcode).cloned()
    }

    /// Answer `line` (without terminator) with `response` instead of the default
    pub async fn respond(&self, line: &str, response: &str) {
        self.state
            .lock()
            .await
            .overrides
            .insert(line.to_string(), response.to_string());
    }

    /// Answer `err_cmd` to every command using `opcode`
    pub async fn unsupported(&self, opcode: &str) {
        let mut state = self.state.lock().await;
        state.overrides.insert(format!("{opcode} ?"), "err_cmd".to_string());
        state.overrides.insert(opcode.to_string(), "err_cmd".to_string());
    }

    pub async fn clear_overrides(&self) {
        self.state.lock().await.overrides.clear();
    }

    /// Close the connection instead of answering the next `count` commands
    pub async fn drop_next(&self, count: u32) {
        self.state.lock().await.drop_next = count;
    }

    /// Close the connection after every reply
    pub async fn close_after_reply(&self, enabled: bool) {
        self.state.lock().await.close_after_reply = enabled;
    }

    /// Read commands but never answer them
    pub async fn silent(&self, enabled: bool) {
        self.state.lock().await.silent = enabled;
    }

    /// Wait before answering each command
    pub async fn delay(&self, delay: Option<Duration>) {
        self.state.lock().await.delay = delay;
    }

    /// Command lines received after authentication
    pub async fn received(&self) -> Vec<String> {
        self.state.lock().await.received.clone()
    }

    pub async fn clear_received(&self) {
        self.state.lock().await.received.clear();
    }

    pub async fn connections(&self) -> u32 {
        self.state.lock().await.connections
    }

    pub async fn auth_failures(&self) -> u32 {
        self.state.lock().await.auth_failures
    }

    /// Highest number of commands being answered at the same time
    pub async fn max_in_flight(&self) -> u32 {
        self.state.lock().await.max_in_flight
    }
}

impl Drop for MockProjector {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<Mutex<MockState>>) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);
    let password = {
        let mut state = state.lock().await;
        state.connections += 1;
        state.password.clone()
    };

    match password {
        None => write(&mut stream, codec::NO_KEY).await?,
        Some(password) => {
            write(&mut stream, NONCE).await?;
            let mut line = String::new();
            if stream.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            if line.trim() == codec::auth_response(NONCE, &password) {
                write(&mut stream, "OK").await?;
            } else {
                state.lock().await.auth_failures += 1;
                write(&mut stream, "err_auth").await?;
                return Ok(());
            }
        }
    }

    loop {
        let mut line = String::new();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();

        let (delay, silent, drop) = {
            let mut state = state.lock().await;
            state.received.push(line.clone());
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            let drop = state.drop_next > 0;
            if drop {
                state.drop_next -= 1;
            }
            (state.delay, state.silent, drop)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if drop {
            state.lock().await.in_flight -= 1;
            return Ok(());
        }
        if silent {
            state.lock().await.in_flight -= 1;
            continue;
        }

        let (response, close) = {
            let mut state = state.lock().await;
            state.in_flight -= 1;
            (answer(&mut state, &line), state.close_after_reply)
        };
        write(&mut stream, &response).await?;
        if close {
            return Ok(());
        }
    }
}

fn answer(state: &mut MockState, line: &str) -> String {
    if let Some(response) = state.overrides.get(line) {
        return response.clone();
    }

    let Ok(frame) = CommandFrame::parse(line) else {
        return "err_cmd".to_string();
    };
    if let Some(response) = state.overrides.get(&frame.opcode) {
        return response.clone();
    }

    if frame.is_query() {
        return state
            .values
            .get(&frame.opcode)
            .cloned()
            .unwrap_or_else(|| "err_cmd".to_string());
    }

    match (frame.opcode.as_str(), frame.param) {
        ("key", Some(_)) => "ok".to_string(),
        ("power", Some(param)) => {
            let next = if codec::unquote(&param) == "on" { "on" } else { "standby" };
            state.values.insert("power_status".to_string(), codec::quote(next));
            "ok".to_string()
        }
        (opcode, Some(param)) if param.starts_with('"') => {
            state.values.insert(opcode.to_string(), param);
            "ok".to_string()
        }
        (_, Some(_)) => "ok".to_string(),
        (_, None) => "err_option".to_string(),
    }
}

async fn write(stream: &mut BufReader<TcpStream>, line: &str) -> std::io::Result<()> {
    let socket = stream.get_mut();
    socket.write_all(format!("{line}{}", codec::TERMINATOR).as_bytes()).await?;
    socket.flush().await
}
