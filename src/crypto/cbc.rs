use super::MacHeader;
use crate::buffer::Buf;
use crate::message::{ContentType, Sequence};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// AES block size, which is also the explicit per-record IV size.
pub const CBC_BLOCK_LEN: usize = 16;
pub const CBC_EXPLICIT_IV_LEN: usize = 16;

/// HMAC-SHA256 MAC size.
pub const CBC_MAC_LEN: usize = 32;

/// Worst-case growth of a fragment under protection: explicit IV + MAC +
/// a full block of padding.
pub const CBC_MAX_OVERHEAD: usize = CBC_EXPLICIT_IV_LEN + CBC_MAC_LEN + CBC_BLOCK_LEN;

/// One direction of AES_128_CBC_SHA256 record protection, MAC-then-encrypt
/// per RFC 5246 6.2.3.2.
pub struct CbcAes128Sha256 {
    enc_key: [u8; 16],
    mac_key: [u8; 32],
}

impl CbcAes128Sha256 {
    pub fn new(enc_key: [u8; 16], mac_key: [u8; 32]) -> Self {
        CbcAes128Sha256 { enc_key, mac_key }
    }

    /// Protect `fragment` in place: append MAC and padding, encrypt, and
    /// prefix the explicit IV. `header` must carry the plaintext length.
    pub fn seal(&self, header: MacHeader, iv: [u8; 16], fragment: &mut Buf) -> Result<(), String> {
        let mut mac = HmacSha256::new_from_slice(&self.mac_key)
            .map_err(|e| format!("MAC key error: {}", e))?;
        mac.update(header.as_ref());
        mac.update(fragment);
        let tag = mac.finalize().into_bytes();
        fragment.extend_from_slice(&tag);

        // TLS block padding: pad_len + 1 bytes, each holding pad_len.
        let pad_len = (CBC_BLOCK_LEN - ((fragment.len() + 1) % CBC_BLOCK_LEN)) % CBC_BLOCK_LEN;
        for _ in 0..=pad_len {
            fragment.push(pad_len as u8);
        }

        let ciphertext_len = fragment.len();
        let enc = Aes128CbcEnc::new(&self.enc_key.into(), &iv.into());
        enc.encrypt_padded_mut::<NoPadding>(fragment, ciphertext_len)
            .map_err(|e| format!("CBC encrypt error: {}", e))?;

        // Make room for the explicit IV at the front.
        fragment.resize(ciphertext_len + CBC_EXPLICIT_IV_LEN, 0);
        fragment.copy_within(0..ciphertext_len, CBC_EXPLICIT_IV_LEN);
        fragment[..CBC_EXPLICIT_IV_LEN].copy_from_slice(&iv);

        Ok(())
    }

    /// Decrypt and verify `fragment` (explicit IV + ciphertext) in place.
    /// On success the plaintext sits at
    /// `fragment[CBC_EXPLICIT_IV_LEN..CBC_EXPLICIT_IV_LEN + len]` and `len`
    /// is returned.
    pub fn open(
        &self,
        content_type: ContentType,
        sequence: Sequence,
        fragment: &mut [u8],
    ) -> Result<usize, String> {
        if fragment.len() < CBC_EXPLICIT_IV_LEN + CBC_BLOCK_LEN {
            return Err("record too short".into());
        }

        let (iv, ciphertext) = fragment.split_at_mut(CBC_EXPLICIT_IV_LEN);
        if ciphertext.len() % CBC_BLOCK_LEN != 0 {
            return Err("ciphertext not block aligned".into());
        }

        let mut iv_arr = [0; CBC_EXPLICIT_IV_LEN];
        iv_arr.copy_from_slice(iv);
        let dec = Aes128CbcDec::new(&self.enc_key.into(), &iv_arr.into());
        dec.decrypt_padded_mut::<NoPadding>(ciphertext)
            .map_err(|e| format!("CBC decrypt error: {}", e))?;

        // Bad padding still runs the MAC check below, over a zero-padding
        // interpretation, so padding and MAC failures are not separable by
        // timing (RFC 5246 6.2.3.2).
        let pad_len = ciphertext[ciphertext.len() - 1] as usize;
        let padding_in_range = pad_len + 1 + CBC_MAC_LEN <= ciphertext.len();
        let checked_pad = if padding_in_range { pad_len } else { 0 };
        let padding_ok = padding_in_range
            && ciphertext[ciphertext.len() - 1 - checked_pad..]
                .iter()
                .fold(0u8, |acc, b| acc | (*b ^ checked_pad as u8))
                == 0;

        let plaintext_len = ciphertext
            .len()
            .checked_sub(checked_pad + 1 + CBC_MAC_LEN)
            .ok_or_else(|| "bad record MAC".to_string())?;
        let header = MacHeader::new(content_type, sequence, plaintext_len as u16);

        let mut mac = HmacSha256::new_from_slice(&self.mac_key)
            .map_err(|e| format!("MAC key error: {}", e))?;
        mac.update(header.as_ref());
        mac.update(&ciphertext[..plaintext_len]);
        let mac_ok = mac
            .verify_slice(&ciphertext[plaintext_len..plaintext_len + CBC_MAC_LEN])
            .is_ok();

        if !padding_ok || !mac_ok {
            return Err("bad record MAC".into());
        }
        Ok(plaintext_len)
    }
}

impl Drop for CbcAes128Sha256 {
    fn drop(&mut self) {
        self.enc_key.zeroize();
        self.mac_key.zeroize();
    }
}
