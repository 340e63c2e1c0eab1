use arrayvec::ArrayVec;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Largest output the PRF is ever asked for (the 96-byte key block).
pub const MAX_PRF_OUTPUT: usize = 128;

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 32], String> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| format!("HMAC key error: {}", e))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// TLS 1.2 PRF with P_SHA256 (RFC 5246 5).
pub fn prf_tls12(
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
    output_len: usize,
) -> Result<ArrayVec<u8, MAX_PRF_OUTPUT>, String> {
    if output_len > MAX_PRF_OUTPUT {
        return Err(format!("PRF output {} too large", output_len));
    }

    let mut full_seed: ArrayVec<u8, MAX_PRF_OUTPUT> = ArrayVec::new();
    full_seed
        .try_extend_from_slice(label)
        .and_then(|_| full_seed.try_extend_from_slice(seed))
        .map_err(|_| "PRF seed too large".to_string())?;

    let mut output: ArrayVec<u8, MAX_PRF_OUTPUT> = ArrayVec::new();

    // P_SHA256: A(0) = seed, A(i) = HMAC(secret, A(i-1)),
    // output = HMAC(secret, A(1) || seed) || HMAC(secret, A(2) || seed) ...
    let mut a = hmac_sha256(secret, &[&full_seed])?;
    while output.len() < output_len {
        let chunk = hmac_sha256(secret, &[&a, &full_seed])?;
        let wanted = (output_len - output.len()).min(chunk.len());
        output
            .try_extend_from_slice(&chunk[..wanted])
            .map_err(|_| "PRF output overflow".to_string())?;
        a = hmac_sha256(secret, &[&a])?;
    }

    Ok(output)
}

/// Key block expansion (RFC 5246 6.3). Note the seed order is
/// server_random then client_random, the reverse of the master secret.
pub fn key_expansion(
    master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    output_len: usize,
) -> Result<ArrayVec<u8, MAX_PRF_OUTPUT>, String> {
    let mut seed: ArrayVec<u8, 64> = ArrayVec::new();
    seed.try_extend_from_slice(server_random)
        .and_then(|_| seed.try_extend_from_slice(client_random))
        .map_err(|_| "random too large".to_string())?;
    prf_tls12(master_secret, b"key expansion", &seed, output_len)
}
