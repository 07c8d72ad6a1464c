//! Errors produced while decoding protocol frames.

use thiserror::Error;

/// Frame codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// First line is not a known command
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Header line without a `:` separator
    #[error("malformed header line '{0}'")]
    MalformedHeader(String),

    /// Unsupported backslash escape in a header
    #[error("invalid header escape in '{0}'")]
    InvalidEscape(String),

    /// `content-length` is not a number or exceeds the frame
    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),

    /// Frame ended before the blank line closing the header block
    #[error("frame truncated before end of headers")]
    Truncated,

    /// Body is not terminated by NUL
    #[error("frame body is not NUL-terminated")]
    MissingNul,

    /// Required header is absent
    #[error("{command} frame is missing the '{header}' header")]
    MissingHeader {
        command: &'static str,
        header: &'static str,
    },

    /// Header value could not be interpreted
    #[error("invalid '{header}' header value '{value}'")]
    InvalidHeader { header: &'static str, value: String },
}
