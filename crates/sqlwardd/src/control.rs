//! Local control socket of a running `serve`.
//!
//! redb gives the serving process exclusive ownership of the store file, so
//! `execute` and `hook` invocations made while it runs are forwarded here.
//! Framing is NDJSON over a Unix socket: one request per line, one response
//! per line.
//!
//! Shutdown drops open connections. An execution cut off that way keeps its
//! store claim, so the ticket stays blocked instead of running twice.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlward_core::{PublicError, SqlwardConfig};
use sqlward_exec::{ExecutionEngine, HookInvocation, HookKind};
use sqlward_state::StateStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::commands;
use crate::context::{AppContext, is_store_locked};

pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlRequest {
    pub v: u8,
    pub id: String,
    pub command: ControlCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "payload", rename_all = "snake_case")]
pub enum ControlCommand {
    Execute {
        ticket: String,
    },
    Hook {
        /// Hook name as the schema-change tool spells it, e.g. `onStartup`.
        hook: String,
        statement_uuid: String,
        #[serde(default)]
        status: Option<String>,
    },
}

impl ControlCommand {
    pub fn hook(invocation: &HookInvocation) -> Self {
        ControlCommand::Hook {
            hook: invocation.kind.as_str().to_string(),
            statement_uuid: invocation.statement_uuid.clone(),
            status: invocation.status.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ControlError>,
}

impl ControlResponse {
    fn from_result(id: String, result: Result<serde_json::Value, ControlError>) -> Self {
        match result {
            Ok(value) => Self {
                id,
                ok: true,
                result: Some(value),
                error: None,
            },
            Err(error) => Self {
                id,
                ok: false,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Public error shape carried over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlError {
    pub code: String,
    pub message: String,
}

impl ControlError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self {
            code: "invalid_request".into(),
            message: msg.into(),
        }
    }
}

impl From<PublicError> for ControlError {
    fn from(e: PublicError) -> Self {
        Self {
            code: e.code.to_string(),
            message: e.message,
        }
    }
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// What a request is served with.
pub struct ControlState {
    pub engine: ExecutionEngine,
    pub store: StateStore,
}

impl ControlState {
    pub fn from_context(ctx: &AppContext) -> anyhow::Result<Self> {
        Ok(Self {
            engine: ctx.engine()?,
            store: ctx.store.clone(),
        })
    }

    async fn handle(&self, command: ControlCommand) -> Result<serde_json::Value, ControlError> {
        match command {
            ControlCommand::Execute { ticket } => {
                commands::run_execute(&self.engine, &ticket).await
            }
            ControlCommand::Hook {
                hook,
                statement_uuid,
                status,
            } => {
                let kind = HookKind::from_name(&hook).ok_or_else(|| {
                    ControlError::invalid_request(format!("unknown hook {hook}"))
                })?;
                let invocation = HookInvocation {
                    kind,
                    statement_uuid,
                    status,
                };
                commands::run_hook(&self.store, &invocation)
            }
        }
    }
}

pub struct ControlServer {
    path: PathBuf,
    listener: UnixListener,
}

impl ControlServer {
    /// Bind the socket, replacing a stale one left by an earlier process.
    pub fn bind(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating socket directory {}", parent.display()))?;
        }
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("removing stale socket {}", path.display()))?;
        }
        let listener = UnixListener::bind(path)
            .with_context(|| format!("binding control socket {}", path.display()))?;
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                warn!(path = %path.display(), error = %e, "failed to restrict control socket");
            }
        }
        info!(path = %path.display(), "control socket listening");
        Ok(Self {
            path: path.to_path_buf(),
            listener,
        })
    }

    /// Accept connections until `shutdown` flips to true, then drop open
    /// connections and remove the socket file.
    pub async fn run(self, state: ControlState, mut shutdown: watch::Receiver<bool>) {
        let state = Arc::new(state);
        let mut connections = JoinSet::new();
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        connections.spawn(handle_conn(stream, Arc::clone(&state)));
                    }
                    Err(e) => warn!(error = %e, "control accept failed"),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "control connection task failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        connections.shutdown().await;
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "control socket already gone");
        }
        debug!("control socket closed");
    }
}

async fn handle_conn(stream: UnixStream, state: Arc<ControlState>) {
    let (r, mut w) = stream.into_split();
    let mut reader = BufReader::new(r);
    let mut line = String::new();

    while let Ok(n) = reader.read_line(&mut line).await {
        if n == 0 {
            break;
        }
        let response = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(req) if req.v != PROTOCOL_VERSION => ControlResponse::from_result(
                req.id,
                Err(ControlError::invalid_request("unsupported protocol version")),
            ),
            Ok(req) => {
                debug!(id = %req.id, command = ?req.command, "control request");
                let result = state.handle(req.command).await;
                ControlResponse::from_result(req.id, result)
            }
            Err(e) => ControlResponse::from_result(
                String::new(),
                Err(ControlError {
                    code: "decode_error".into(),
                    message: e.to_string(),
                }),
            ),
        };
        match serde_json::to_string(&response) {
            Ok(json) => {
                if w.write_all(json.as_bytes()).await.is_err()
                    || w.write_all(b"\n").await.is_err()
                {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "failed to encode control response"),
        }
        line.clear();
    }
}

/// Client side of the control socket.
#[derive(Debug, Clone)]
pub struct ControlClient {
    path: PathBuf,
}

impl ControlClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Send one command and wait for its response. Transport failures are
    /// the outer error; a served request that failed is the inner one.
    pub async fn call(
        &self,
        command: ControlCommand,
    ) -> anyhow::Result<Result<serde_json::Value, ControlError>> {
        let stream = UnixStream::connect(&self.path).await.with_context(|| {
            format!(
                "store is held by another process and its control socket {} is unreachable",
                self.path.display()
            )
        })?;
        let (r, mut w) = stream.into_split();

        let request = ControlRequest {
            v: PROTOCOL_VERSION,
            id: std::process::id().to_string(),
            command,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        w.write_all(line.as_bytes()).await?;

        let mut reply = String::new();
        BufReader::new(r).read_line(&mut reply).await?;
        if reply.is_empty() {
            anyhow::bail!("control socket closed without a response");
        }
        let response: ControlResponse =
            serde_json::from_str(&reply).context("decoding control response")?;
        if response.ok {
            return Ok(Ok(response.result.unwrap_or(serde_json::Value::Null)));
        }
        Ok(Err(response.error.unwrap_or_else(|| ControlError {
            code: "unknown_error".into(),
            message: "unknown error".into(),
        })))
    }
}

/// Where a one-shot subcommand runs.
pub enum Route {
    /// This process opened the store.
    Local(AppContext),
    /// A running `serve` holds the store.
    Remote(ControlClient),
}

impl Route {
    pub fn open(config: SqlwardConfig) -> anyhow::Result<Self> {
        let socket = config.control.socket_path.clone();
        match AppContext::build(config) {
            Ok(ctx) => Ok(Route::Local(ctx)),
            Err(e) if is_store_locked(&e) => {
                info!(socket = %socket.display(), "store held by a running sqlwardd, forwarding");
                Ok(Route::Remote(ControlClient::new(socket)))
            }
            Err(e) => Err(e),
        }
    }
}
