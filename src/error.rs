// MIT License

/// All errors that can occur in the caseta-lip-bridge library.
///
/// Stream loss during normal operation is not represented here: the session
/// recovers from it internally and callers only observe an empty read cycle.
/// Errors surface from the initial connect/handshake and from writes on a
/// socket that dies mid-command.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by bridge")]
    ConnectionClosed,

    #[error("Stream ended while waiting for {prompt:?} prompt")]
    Handshake { prompt: String },

    #[error("Invalid integration report: {0}")]
    Report(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
