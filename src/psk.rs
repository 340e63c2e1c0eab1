use zeroize::Zeroize;

/// Largest PSK the engine supports. RFC 4279 5.3 requires support for keys
/// up to 64 bytes.
pub const MAX_PSK_KEY_LEN: usize = 64;

/// Largest PSK identity accepted on the wire. RFC 4279 5.3 requires support
/// for identities up to 128 bytes.
pub const MAX_PSK_IDENTITY_LEN: usize = 128;

/// Resolves a client PSK identity to a key.
///
/// The engine calls this once per ClientKeyExchange with the identity as the
/// client sent it (arbitrary bytes, not necessarily UTF-8) and a key buffer
/// of [`MAX_PSK_KEY_LEN`] bytes. Implementations write the key into
/// `key_out` and return its length, or return 0 to reject the identity.
///
/// If `key_out` is too small for the key, the implementation must return 0
/// without writing anything. Truncated keys are never acceptable.
pub trait PskStore {
    fn psk_for_identity(&mut self, identity: &[u8], key_out: &mut [u8]) -> usize;
}

/// A [`PskStore`] holding a single fixed key handed out for every identity.
pub struct StaticPsk {
    key: Vec<u8>,
}

impl StaticPsk {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        StaticPsk { key: key.into() }
    }
}

impl PskStore for StaticPsk {
    fn psk_for_identity(&mut self, _identity: &[u8], key_out: &mut [u8]) -> usize {
        if key_out.len() < self.key.len() {
            return 0;
        }
        key_out[..self.key.len()].copy_from_slice(&self.key);
        self.key.len()
    }
}

impl Drop for StaticPsk {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
