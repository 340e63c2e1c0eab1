use arrayvec::ArrayVec;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};
use std::fmt;

mod alert;
mod client_hello;
mod client_key_exchange;
mod finished;
mod handshake;
mod hello_verify;
mod id;
mod random;
mod record;
mod server_hello;
mod server_key_exchange;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use client_hello::ClientHello;
pub use client_key_exchange::ClientKeyExchange;
pub use finished::Finished;
pub use handshake::{Body, Handshake, Header, MessageType};
pub use hello_verify::HelloVerifyRequest;
pub use id::{Cookie, SessionId};
pub use random::Random;
pub use record::DTLSRecord;
pub use server_hello::ServerHello;
pub use server_key_exchange::{ServerDhParams, ServerKeyExchange};

/// Record-layer content types (RFC 5246 6.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::Unknown(0)
    }
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, value) = be_u8(input)?;
        Ok((input, ContentType::from_u8(value)))
    }
}

/// TLS/DTLS protocol versions as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    DTLS1_0,
    DTLS1_2,
    Unknown(u16),
}

#[allow(non_upper_case_globals)]
impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0xfeff => ProtocolVersion::DTLS1_0,
            0xfefd => ProtocolVersion::DTLS1_2,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::DTLS1_0 => 0xfeff,
            ProtocolVersion::DTLS1_2 => 0xfefd,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, value) = be_u16(input)?;
        Ok((input, ProtocolVersion::from_u16(value)))
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        ProtocolVersion::Unknown(0)
    }
}

/// Epoch and sequence number of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sequence {
    pub epoch: u16,
    pub sequence_number: u64,
}

impl Sequence {
    pub fn new(epoch: u16) -> Self {
        Sequence {
            epoch,
            sequence_number: 0,
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[epoch: {}, sequence_number: {}]",
            self.epoch, self.sequence_number
        )
    }
}

impl PartialOrd for Sequence {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Sequence {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then(self.sequence_number.cmp(&other.sequence_number))
    }
}

/// The PSK cipher suites this engine can negotiate (RFC 4279, RFC 5487).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum PskCipherSuite {
    /// TLS_DHE_PSK_WITH_AES_128_CBC_SHA256
    DHE_PSK_AES128_CBC_SHA256,
    /// TLS_PSK_WITH_AES_128_CBC_SHA256
    PSK_AES128_CBC_SHA256,
    Unknown(u16),
}

/// Bounded list of cipher suites kept from a ClientHello.
pub type CipherSuiteVec = ArrayVec<PskCipherSuite, { PskCipherSuite::supported().len() }>;

impl PskCipherSuite {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x00b2 => PskCipherSuite::DHE_PSK_AES128_CBC_SHA256,
            0x00ae => PskCipherSuite::PSK_AES128_CBC_SHA256,
            _ => PskCipherSuite::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            PskCipherSuite::DHE_PSK_AES128_CBC_SHA256 => 0x00b2,
            PskCipherSuite::PSK_AES128_CBC_SHA256 => 0x00ae,
            PskCipherSuite::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], PskCipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, PskCipherSuite::from_u16(value)))
    }

    pub fn key_exchange_algorithm(&self) -> KeyExchangeAlgorithm {
        match self {
            PskCipherSuite::DHE_PSK_AES128_CBC_SHA256 => KeyExchangeAlgorithm::DhePsk,
            PskCipherSuite::PSK_AES128_CBC_SHA256 => KeyExchangeAlgorithm::Psk,
            PskCipherSuite::Unknown(_) => KeyExchangeAlgorithm::Unknown,
        }
    }

    /// Length of the Finished verify_data for this suite (RFC 5246 7.4.9).
    pub fn verify_data_length(&self) -> usize {
        12
    }

    pub const fn supported() -> &'static [PskCipherSuite] {
        &[
            PskCipherSuite::DHE_PSK_AES128_CBC_SHA256,
            PskCipherSuite::PSK_AES128_CBC_SHA256,
        ]
    }

    pub fn is_supported(&self) -> bool {
        Self::supported().contains(self)
    }
}

/// Key exchange family of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeAlgorithm {
    DhePsk,
    Psk,
    Unknown,
}

/// Compression methods. Only Null is ever negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Null,
    Unknown(u8),
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => CompressionMethod::Null,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CompressionMethod::Null => 0,
            CompressionMethod::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CompressionMethod> {
        let (input, value) = be_u8(input)?;
        Ok((input, CompressionMethod::from_u8(value)))
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, CompressionMethod::Null)
    }
}

/// Bounded list of compression methods kept from a ClientHello.
pub type CompressionMethodVec = ArrayVec<CompressionMethod, 1>;

pub(crate) fn length_value_failure(input: &[u8]) -> Err<Error<&[u8]>> {
    Err::Failure(Error::new(input, ErrorKind::LengthValue))
}
