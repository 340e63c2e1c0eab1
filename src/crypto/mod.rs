use crate::message::{ContentType, ProtocolVersion, Sequence};

mod cbc;
mod context;
mod dh;
mod keys;
mod prf;

pub use cbc::{CbcAes128Sha256, CBC_EXPLICIT_IV_LEN, CBC_MAC_LEN, CBC_MAX_OVERHEAD};
pub use context::CryptoContext;
pub use dh::{ffdhe2048, DhDomainParams, DhKeyExchange};
pub use keys::{master_secret, premaster_secret, KeyBlock};
pub use prf::{key_expansion, prf_tls12};

/// Size of the hello randoms feeding the key schedule.
pub const RANDOM_LEN: usize = 32;

/// Master secret size (RFC 5246 8.1).
pub const MASTER_SECRET_LEN: usize = 48;

/// Finished verify_data size for the supported suites (RFC 5246 7.4.9).
pub const VERIFY_DATA_LEN: usize = 12;

/// The pseudo-header MACed together with each record's plaintext
/// (RFC 5246 6.2.3.1): 64-bit seq_num (epoch || sequence), then type,
/// version and plaintext length.
#[derive(Debug, Clone, Copy)]
pub struct MacHeader([u8; 13]);

impl MacHeader {
    pub fn new(content_type: ContentType, sequence: Sequence, length: u16) -> Self {
        let mut bytes = [0; 13];
        bytes[..2].copy_from_slice(&sequence.epoch.to_be_bytes());
        bytes[2..8].copy_from_slice(&sequence.sequence_number.to_be_bytes()[2..]);
        bytes[8] = content_type.as_u8();
        bytes[9..11].copy_from_slice(&ProtocolVersion::DTLS1_2.as_u16().to_be_bytes());
        bytes[11..13].copy_from_slice(&length.to_be_bytes());
        MacHeader(bytes)
    }
}

impl AsRef<[u8]> for MacHeader {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
