use super::prf::prf_tls12;
use super::{key_expansion, MASTER_SECRET_LEN, RANDOM_LEN};
use zeroize::{Zeroize, Zeroizing};

/// Assemble the PSK premaster secret (RFC 4279 2, 3):
/// `len(other) || other || len(psk) || psk`, where `other` is the DH shared
/// secret for DHE_PSK or a zero block of the PSK's length for plain PSK.
pub fn premaster_secret(other: &[u8], psk: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(other.len() + psk.len() + 4));
    out.extend_from_slice(&(other.len() as u16).to_be_bytes());
    out.extend_from_slice(other);
    out.extend_from_slice(&(psk.len() as u16).to_be_bytes());
    out.extend_from_slice(psk);
    out
}

/// Derive the 48-byte master secret (RFC 5246 8.1).
pub fn master_secret(
    premaster: &[u8],
    client_random: &[u8; RANDOM_LEN],
    server_random: &[u8; RANDOM_LEN],
) -> Result<Zeroizing<[u8; MASTER_SECRET_LEN]>, String> {
    let mut seed = [0; RANDOM_LEN * 2];
    seed[..RANDOM_LEN].copy_from_slice(client_random);
    seed[RANDOM_LEN..].copy_from_slice(server_random);

    let prf = prf_tls12(premaster, b"master secret", &seed, MASTER_SECRET_LEN)?;
    let mut out = Zeroizing::new([0; MASTER_SECRET_LEN]);
    out.copy_from_slice(&prf);
    Ok(out)
}

/// Directional keys for AES_128_CBC_SHA256, split out of the key block
/// (RFC 5246 6.3): MAC keys first, then encryption keys. CBC suites take no
/// IVs from the key block, the IV is explicit per record.
pub struct KeyBlock {
    pub client_write_mac: [u8; 32],
    pub server_write_mac: [u8; 32],
    pub client_write_key: [u8; 16],
    pub server_write_key: [u8; 16],
}

impl KeyBlock {
    pub const LEN: usize = 32 + 32 + 16 + 16;

    pub fn derive(
        master_secret: &[u8],
        client_random: &[u8; RANDOM_LEN],
        server_random: &[u8; RANDOM_LEN],
    ) -> Result<KeyBlock, String> {
        let material = key_expansion(master_secret, client_random, server_random, Self::LEN)?;

        let mut block = KeyBlock {
            client_write_mac: [0; 32],
            server_write_mac: [0; 32],
            client_write_key: [0; 16],
            server_write_key: [0; 16],
        };
        block.client_write_mac.copy_from_slice(&material[..32]);
        block.server_write_mac.copy_from_slice(&material[32..64]);
        block.client_write_key.copy_from_slice(&material[64..80]);
        block.server_write_key.copy_from_slice(&material[80..96]);
        Ok(block)
    }
}

impl Drop for KeyBlock {
    fn drop(&mut self) {
        self.client_write_mac.zeroize();
        self.server_write_mac.zeroize();
        self.client_write_key.zeroize();
        self.server_write_key.zeroize();
    }
}
