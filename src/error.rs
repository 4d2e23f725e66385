use thiserror::Error;

/// Fatal failures of the modem pipeline.
///
/// Non-fatal conditions (decoder non-convergence, invalid UTF-8 in the
/// recovered payload) never surface here; they show up as elevated bit error
/// rates or replacement characters instead.
#[derive(Debug, Error)]
pub enum ModemError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The payload needs more frames than the protocol allows.
    #[error("message too long for protocol: requires {required} frames, max is {max}")]
    ProtocolOverflow { required: usize, max: usize },

    /// LDPC generator construction produced a matrix of the wrong shape.
    #[error("generator matrix construction failed: shape ({rows}, {cols}), expected ({k}, {n})")]
    MatrixShape {
        rows: usize,
        cols: usize,
        k: usize,
        n: usize,
    },

    /// The 32-bit sync pattern was not found in the demodulated stream.
    #[error("frame sync sequence not found, decoding failed")]
    FrameSyncLost,
}

pub type Result<T> = std::result::Result<T, ModemError>;
