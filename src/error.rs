use thiserror::Error;

use crate::message::AlertDescription;

/// Errors surfaced by the DTLS engine.
///
/// Corrupt, undecryptable or replayed records never show up here: those are
/// dropped silently and the session continues. An error from the engine means
/// the session itself is over.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Receive queue full")]
    ReceiveQueueFull,

    #[error("Transmit queue full")]
    TransmitQueueFull,

    #[error("Timeout: {0}")]
    Timeout(&'static str),

    #[error("Incomplete parse")]
    ParseIncomplete,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Too many records in datagram")]
    TooManyRecords,

    #[error("Payload of {len} bytes exceeds the {max} byte record limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("Unknown PSK identity")]
    UnknownPskIdentity,

    #[error("Renegotiation attempted")]
    RenegotiationAttempt,

    #[error("Peer alert: {0:?}")]
    PeerAlert(AlertDescription),
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => Error::ParseIncomplete,
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                Error::ParseError(format!("{:?} at {} bytes left", e.code, e.input.len()))
            }
        }
    }
}
