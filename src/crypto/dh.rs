use num_bigint::{BigUint, RandBigInt, RandomBits};
use once_cell::sync::Lazy;
use rand::distributions::Distribution;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Diffie-Hellman domain parameters: prime modulus and generator, both
/// big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhDomainParams {
    p: Vec<u8>,
    g: Vec<u8>,
}

impl DhDomainParams {
    pub fn new(p: Vec<u8>, g: Vec<u8>) -> Self {
        DhDomainParams { p, g }
    }

    pub fn p(&self) -> &[u8] {
        &self.p
    }

    pub fn g(&self) -> &[u8] {
        &self.g
    }

    pub fn prime_bits(&self) -> u64 {
        BigUint::from_bytes_be(&self.p).bits()
    }
}

static FFDHE2048: Lazy<DhDomainParams> = Lazy::new(|| DhDomainParams {
    p: FFDHE2048_P.to_vec(),
    g: vec![2],
});

/// The ffdhe2048 group (RFC 7919 A.1), the default for ServerKeyExchange.
pub fn ffdhe2048() -> DhDomainParams {
    FFDHE2048.clone()
}

const FFDHE2048_P: &[u8] = &[
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xad, 0xf8, 0x54, 0x58, 0xa2, 0xbb, 0x4a, 0x9a,
    0xaf, 0xdc, 0x56, 0x20, 0x27, 0x3d, 0x3c, 0xf1,
    0xd8, 0xb9, 0xc5, 0x83, 0xce, 0x2d, 0x36, 0x95,
    0xa9, 0xe1, 0x36, 0x41, 0x14, 0x64, 0x33, 0xfb,
    0xcc, 0x93, 0x9d, 0xce, 0x24, 0x9b, 0x3e, 0xf9,
    0x7d, 0x2f, 0xe3, 0x63, 0x63, 0x0c, 0x75, 0xd8,
    0xf6, 0x81, 0xb2, 0x02, 0xae, 0xc4, 0x61, 0x7a,
    0xd3, 0xdf, 0x1e, 0xd5, 0xd5, 0xfd, 0x65, 0x61,
    0x24, 0x33, 0xf5, 0x1f, 0x5f, 0x06, 0x6e, 0xd0,
    0x85, 0x63, 0x65, 0x55, 0x3d, 0xed, 0x1a, 0xf3,
    0xb5, 0x57, 0x13, 0x5e, 0x7f, 0x57, 0xc9, 0x35,
    0x98, 0x4f, 0x0c, 0x70, 0xe0, 0xe6, 0x8b, 0x77,
    0xe2, 0xa6, 0x89, 0xda, 0xf3, 0xef, 0xe8, 0x72,
    0x1d, 0xf1, 0x58, 0xa1, 0x36, 0xad, 0xe7, 0x35,
    0x30, 0xac, 0xca, 0x4f, 0x48, 0x3a, 0x79, 0x7a,
    0xbc, 0x0a, 0xb1, 0x82, 0xb3, 0x24, 0xfb, 0x61,
    0xd1, 0x08, 0xa9, 0x4b, 0xb2, 0xc8, 0xe3, 0xfb,
    0xb9, 0x6a, 0xda, 0xb7, 0x60, 0xd7, 0xf4, 0x68,
    0x1d, 0x4f, 0x42, 0xa3, 0xde, 0x39, 0x4d, 0xf4,
    0xae, 0x56, 0xed, 0xe7, 0x63, 0x72, 0xbb, 0x19,
    0x0b, 0x07, 0xa7, 0xc8, 0xee, 0x0a, 0x6d, 0x70,
    0x9e, 0x02, 0xfc, 0xe1, 0xcd, 0xf7, 0xe2, 0xec,
    0xc0, 0x34, 0x04, 0xcd, 0x28, 0x34, 0x2f, 0x61,
    0x91, 0x72, 0xfe, 0x9c, 0xe9, 0x85, 0x83, 0xff,
    0x8e, 0x4f, 0x12, 0x32, 0xee, 0xf2, 0x81, 0x83,
    0xc3, 0xfe, 0x3b, 0x1b, 0x4c, 0x6f, 0xad, 0x73,
    0x3b, 0xb5, 0xfc, 0xbc, 0x2e, 0xc2, 0x20, 0x05,
    0xc5, 0x8e, 0xf1, 0x83, 0x7d, 0x16, 0x83, 0xb2,
    0xc6, 0xf3, 0x4a, 0x26, 0xc1, 0xb2, 0xef, 0xfa,
    0x88, 0x6b, 0x42, 0x38, 0x61, 0x28, 0x5c, 0x97,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// Ephemeral finite-field Diffie-Hellman, one instance per handshake.
pub struct DhKeyExchange {
    prime: BigUint,
    generator: BigUint,
    private_key: Option<BigUint>,
}

impl DhKeyExchange {
    pub fn new(params: &DhDomainParams) -> Self {
        DhKeyExchange {
            prime: BigUint::from_bytes_be(&params.p),
            generator: BigUint::from_bytes_be(&params.g),
            private_key: None,
        }
    }

    /// Generate the private key if needed and return the public value
    /// `g^x mod p` big-endian.
    pub fn public_key(&mut self) -> Vec<u8> {
        let prime = &self.prime;
        let private = self.private_key.get_or_insert_with(|| {
            let bits = prime.bits().saturating_sub(1);
            let distribution = RandomBits::new(bits);
            let mut private: BigUint = distribution.sample(&mut OsRng);
            // A zero exponent would make the public value 1.
            if private.bits() == 0 {
                private = OsRng.gen_biguint_range(&BigUint::from(2u8), prime);
            }
            private
        });
        self.generator.modpow(private, prime).to_bytes_be()
    }

    /// Compute `Yc^x mod p`. The peer value is rejected unless
    /// `1 < Yc < p - 1`, which rules out the degenerate subgroup elements.
    pub fn compute_shared_secret(&self, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>, String> {
        let private = self
            .private_key
            .as_ref()
            .ok_or_else(|| "no private key generated".to_string())?;

        let peer = BigUint::from_bytes_be(peer_public);
        let one = BigUint::from(1u8);
        let p_minus_one = &self.prime - &one;
        if peer <= one || peer >= p_minus_one {
            return Err("peer DH public value out of range".into());
        }

        let shared = peer.modpow(private, &self.prime);
        Ok(Zeroizing::new(shared.to_bytes_be()))
    }

    #[cfg(test)]
    fn set_private_for_test(&mut self, private: u64) {
        self.private_key = Some(BigUint::from(private));
    }
}
