use super::cbc::CbcAes128Sha256;
use super::dh::{DhDomainParams, DhKeyExchange};
use super::keys::{master_secret, premaster_secret, KeyBlock};
use super::prf::prf_tls12;
use super::{MacHeader, MASTER_SECRET_LEN, RANDOM_LEN, VERIFY_DATA_LEN};
use crate::buffer::Buf;
use crate::message::{ContentType, KeyExchangeAlgorithm, Sequence};
use zeroize::Zeroizing;

/// All key material and cipher state for one session, from the PSK through
/// the directional record ciphers. Secrets are zeroized on drop.
#[derive(Default)]
pub struct CryptoContext {
    dh: Option<DhKeyExchange>,
    psk: Option<Zeroizing<Vec<u8>>>,
    other_secret: Option<Zeroizing<Vec<u8>>>,
    master: Option<Zeroizing<[u8; MASTER_SECRET_LEN]>>,
    /// Decrypts records the client wrote.
    read: Option<CbcAes128Sha256>,
    /// Encrypts records we write.
    write: Option<CbcAes128Sha256>,
}

impl CryptoContext {
    pub fn new() -> Self {
        CryptoContext::default()
    }

    /// Create the ephemeral DH key and return our public value Ys.
    pub fn init_dh(&mut self, params: &DhDomainParams) -> Vec<u8> {
        let kx = self.dh.get_or_insert_with(|| DhKeyExchange::new(params));
        kx.public_key()
    }

    pub fn set_psk(&mut self, key: &[u8]) {
        self.psk = Some(Zeroizing::new(key.to_vec()));
    }

    /// DHE_PSK: the "other secret" is the DH shared secret Z.
    pub fn compute_dh_secret(&mut self, client_public: &[u8]) -> Result<(), String> {
        let kx = self.dh.as_ref().ok_or("DH key not initialized")?;
        self.other_secret = Some(kx.compute_shared_secret(client_public)?);
        Ok(())
    }

    /// Plain PSK: the "other secret" is a zero block as long as the PSK
    /// (RFC 4279 2).
    pub fn set_plain_psk_secret(&mut self) -> Result<(), String> {
        let psk = self.psk.as_ref().ok_or("PSK not set")?;
        self.other_secret = Some(Zeroizing::new(vec![0; psk.len()]));
        Ok(())
    }

    pub fn derive_master_secret(
        &mut self,
        client_random: &[u8; RANDOM_LEN],
        server_random: &[u8; RANDOM_LEN],
    ) -> Result<(), String> {
        let psk = self.psk.as_ref().ok_or("PSK not set")?;
        let other = self.other_secret.as_ref().ok_or("other secret not set")?;

        let premaster = premaster_secret(other, psk);
        self.master = Some(master_secret(&premaster, client_random, server_random)?);

        // Neither input secret is needed beyond this point.
        self.psk = None;
        self.other_secret = None;
        self.dh = None;
        Ok(())
    }

    pub fn derive_keys(
        &mut self,
        client_random: &[u8; RANDOM_LEN],
        server_random: &[u8; RANDOM_LEN],
    ) -> Result<(), String> {
        let master = self.master.as_ref().ok_or("master secret not derived")?;
        let block = KeyBlock::derive(&master[..], client_random, server_random)?;

        self.read = Some(CbcAes128Sha256::new(
            block.client_write_key,
            block.client_write_mac,
        ));
        self.write = Some(CbcAes128Sha256::new(
            block.server_write_key,
            block.server_write_mac,
        ));
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.read.is_some() && self.write.is_some()
    }

    pub fn encrypt(
        &self,
        header: MacHeader,
        iv: [u8; 16],
        fragment: &mut Buf,
    ) -> Result<(), String> {
        let cipher = self.write.as_ref().ok_or("write keys not derived")?;
        cipher.seal(header, iv, fragment)
    }

    pub fn decrypt(
        &self,
        content_type: ContentType,
        sequence: Sequence,
        fragment: &mut [u8],
    ) -> Result<usize, String> {
        let cipher = self.read.as_ref().ok_or("read keys not derived")?;
        cipher.open(content_type, sequence, fragment)
    }

    /// Finished verify_data over the given transcript hash (RFC 5246 7.4.9).
    pub fn verify_data(
        &self,
        handshake_hash: &[u8],
        is_client: bool,
    ) -> Result<[u8; VERIFY_DATA_LEN], String> {
        let master = self.master.as_ref().ok_or("master secret not derived")?;
        let label: &[u8] = if is_client {
            b"client finished"
        } else {
            b"server finished"
        };

        let prf = prf_tls12(&master[..], label, handshake_hash, VERIFY_DATA_LEN)?;
        let mut out = [0; VERIFY_DATA_LEN];
        out.copy_from_slice(&prf);
        Ok(out)
    }
}
