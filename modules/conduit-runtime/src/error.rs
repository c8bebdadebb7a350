use conduit_wire::CodecError;
use thiserror::Error;

/// Failures establishing or using a control channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Control endpoint unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("Control endpoint rejected submission (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Control channel could not be established: {0}")]
    Establish(String),

    #[error("Control channel is closed")]
    Closed,
}

/// Failures of a send or route call.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Control channel unavailable: {0}")]
    ChannelUnavailable(#[from] ChannelError),

    #[error("Runtime has been disposed")]
    Disposed,
}

pub type Result<T> = std::result::Result<T, DispatchError>;
