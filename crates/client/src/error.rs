use std::time::Duration;

use protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the client engine.
///
/// Connection-scoped variants end one connection attempt and feed the
/// reconnect policy; none of them stop the runtime.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("{1} timed out after {0:?}")]
    Timeout(Duration, &'static str),

    #[error("server closed the connection during the handshake")]
    HandshakeClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("could not serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("client runtime has shut down")]
    RuntimeClosed,
}
