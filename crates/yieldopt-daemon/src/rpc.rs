//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC 2.0 calls to the command handlers.
//!
//! Requests carry no credentials. Account-scoped methods act for whatever
//! account the request names, so the socket is created readable and
//! writable by its owner only. The daemon is a local development surface,
//! not a multi-user service.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};
use yieldopt_ledger::LedgerError;
use yieldopt_vault::VaultError;

use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// Error code.
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn with_detail(code: i32, message: &str, detail: impl ToString) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: Some(serde_json::json!({"detail": detail.to_string()})),
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::with_detail(-32602, "INVALID_PARAMS", detail)
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::with_detail(-32603, "INTERNAL_ERROR", detail)
    }

    // Vault errors

    /// Unauthorized (-32030).
    pub fn unauthorized(detail: &str) -> Self {
        Self::with_detail(-32030, "UNAUTHORIZED", detail)
    }

    /// Insufficient balance (-32040).
    pub fn insufficient_balance(required: u128, available: u128) -> Self {
        Self {
            code: -32040,
            message: "INSUFFICIENT_BALANCE".to_string(),
            data: Some(serde_json::json!({
                "required": required.to_string(),
                "available": available.to_string(),
            })),
        }
    }

    /// Insufficient shares (-32041).
    pub fn insufficient_shares(requested: u128, held: u128) -> Self {
        Self {
            code: -32041,
            message: "INSUFFICIENT_SHARES".to_string(),
            data: Some(serde_json::json!({
                "requested": requested.to_string(),
                "held": held.to_string(),
            })),
        }
    }

    /// Insufficient stake (-32042).
    pub fn insufficient_stake(requested: u128, available: u128) -> Self {
        Self {
            code: -32042,
            message: "INSUFFICIENT_STAKE".to_string(),
            data: Some(serde_json::json!({
                "requested": requested.to_string(),
                "available": available.to_string(),
            })),
        }
    }

    /// Insufficient liquidity at the staking venue (-32043).
    pub fn insufficient_liquidity(required: u128, available: u128) -> Self {
        Self {
            code: -32043,
            message: "INSUFFICIENT_LIQUIDITY".to_string(),
            data: Some(serde_json::json!({
                "required": required.to_string(),
                "available": available.to_string(),
            })),
        }
    }

    /// Transfer failed (-32044).
    pub fn transfer_failed(stage: &str, unrecoverable: bool, detail: &str) -> Self {
        Self {
            code: -32044,
            message: "TRANSFER_FAILED".to_string(),
            data: Some(serde_json::json!({
                "stage": stage,
                "unrecoverable": unrecoverable,
                "detail": detail,
            })),
        }
    }

    /// Invalid amount (-32050).
    pub fn invalid_amount(detail: &str) -> Self {
        Self::with_detail(-32050, "INVALID_AMOUNT", detail)
    }

    /// Feature disabled by configuration (-32060).
    pub fn disabled(feature: &str) -> Self {
        Self::with_detail(-32060, "DISABLED", feature)
    }
}

impl From<VaultError> for RpcError {
    fn from(err: VaultError) -> Self {
        match &err {
            VaultError::InvalidAmount(detail) => Self::invalid_amount(detail),
            VaultError::InsufficientShares { held, requested } => {
                Self::insufficient_shares(*requested, *held)
            }
            VaultError::InsufficientStake {
                available,
                requested,
            } => Self::insufficient_stake(*requested, *available),
            VaultError::InsufficientLiquidity {
                available,
                required,
            } => Self::insufficient_liquidity(*required, *available),
            VaultError::TransferFailed { stage, source } => Self::transfer_failed(
                &stage.to_string(),
                err.is_unrecoverable(),
                &source.to_string(),
            ),
            VaultError::Unauthorized(detail) => Self::unauthorized(detail),
            VaultError::Ledger(source) => Self::from(source.clone()),
            VaultError::Reentrant
            | VaultError::LockPoisoned
            | VaultError::InvariantViolation(_)
            | VaultError::Math(_) => Self::internal_error(&err.to_string()),
        }
    }
}

impl From<LedgerError> for RpcError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                available,
                required,
                ..
            } => Self::insufficient_balance(required, available),
            LedgerError::Unauthorized { .. } => Self::unauthorized(&err.to_string()),
            other => Self::internal_error(&other.to_string()),
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = bind_owner_only(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Bind `path` and restrict it to the owning user.
fn bind_owner_only(path: &Path) -> std::io::Result<UnixListener> {
    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let response = handle_line(&state, &line).await;
        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Parse and answer one request line.
pub async fn handle_line(state: &Arc<DaemonState>, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) if request.jsonrpc == "2.0" => dispatch_request(state, request).await,
        Ok(request) => RpcResponse::error(request.id, RpcError::invalid_request()),
        Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
    }
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Vault commands
        "deposit" => commands::vault::deposit(state, params).await,
        "withdraw" => commands::vault::withdraw(state, params).await,
        "compound" => commands::vault::compound(state, params).await,
        "preview_deposit" => commands::vault::preview_deposit(state, params).await,
        "preview_withdraw" => commands::vault::preview_withdraw(state, params).await,
        "exchange_rate" => commands::vault::exchange_rate(state).await,
        "pending_rewards" => commands::vault::pending_rewards(state, params).await,
        "get_vault_state" => commands::vault::get_vault_state(state).await,

        // Ledger commands
        "get_balances" => commands::ledger::get_balances(state, params).await,
        "approve" => commands::ledger::approve(state, params).await,
        "faucet" => commands::ledger::faucet(state, params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
