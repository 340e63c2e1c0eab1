use crate::crypto::{ffdhe2048, DhDomainParams};
use crate::message::PskCipherSuite;
use crate::psk::MAX_PSK_IDENTITY_LEN;
use crate::Error;
use std::time::Duration;

/// Engine configuration. Build with [`Config::builder`].
#[derive(Debug, Clone)]
pub struct Config {
    mtu: usize,
    max_queue_rx: usize,
    max_queue_tx: usize,
    flight_start_rto: Duration,
    flight_retries: u32,
    handshake_timeout: Duration,
    cipher_suites: Vec<PskCipherSuite>,
    psk_identity_hint: Option<Vec<u8>>,
    dh_params: DhDomainParams,
    min_dh_prime_bits: u64,
    rng_seed: Option<u64>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Maximum datagram size for outgoing packets.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Maximum number of incoming datagrams held for processing.
    #[inline(always)]
    pub fn max_queue_rx(&self) -> usize {
        self.max_queue_rx
    }

    /// Maximum number of outgoing datagrams waiting to be polled.
    #[inline(always)]
    pub fn max_queue_tx(&self) -> usize {
        self.max_queue_tx
    }

    /// Initial retransmission timeout for a flight (RFC 6347 4.2.4.1).
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// How many times a flight is retransmitted before giving up.
    #[inline(always)]
    pub fn flight_retries(&self) -> u32 {
        self.flight_retries
    }

    /// Hard deadline for the whole handshake.
    #[inline(always)]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Cipher suites the server will negotiate.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[PskCipherSuite] {
        &self.cipher_suites
    }

    /// PSK identity hint sent in ServerKeyExchange, if any.
    #[inline(always)]
    pub fn psk_identity_hint(&self) -> Option<&[u8]> {
        self.psk_identity_hint.as_deref()
    }

    /// DH domain parameters for DHE_PSK.
    #[inline(always)]
    pub fn dh_params(&self) -> &DhDomainParams {
        &self.dh_params
    }

    /// Smallest acceptable DH prime, in bits.
    #[inline(always)]
    pub fn min_dh_prime_bits(&self) -> u64 {
        self.min_dh_prime_bits
    }

    /// RNG seed for deterministic output. Tests only.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

impl Default for Config {
    fn default() -> Self {
        // The builder defaults are always valid.
        match Config::builder().build() {
            Ok(config) => config,
            Err(_) => unreachable!(),
        }
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    mtu: usize,
    max_queue_rx: usize,
    max_queue_tx: usize,
    flight_start_rto: Duration,
    flight_retries: u32,
    handshake_timeout: Duration,
    cipher_suites: Vec<PskCipherSuite>,
    psk_identity_hint: Option<Vec<u8>>,
    dh_params: DhDomainParams,
    min_dh_prime_bits: u64,
    rng_seed: Option<u64>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        ConfigBuilder {
            mtu: 1150,
            max_queue_rx: 30,
            max_queue_tx: 10,
            flight_start_rto: Duration::from_secs(1),
            flight_retries: 4,
            handshake_timeout: Duration::from_secs(40),
            cipher_suites: PskCipherSuite::supported().to_vec(),
            psk_identity_hint: None,
            dh_params: ffdhe2048(),
            min_dh_prime_bits: 128,
            rng_seed: None,
        }
    }
}

impl ConfigBuilder {
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn max_queue_rx(mut self, max: usize) -> Self {
        self.max_queue_rx = max;
        self
    }

    pub fn max_queue_tx(mut self, max: usize) -> Self {
        self.max_queue_tx = max;
        self
    }

    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    pub fn flight_retries(mut self, retries: u32) -> Self {
        self.flight_retries = retries;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn cipher_suites(mut self, suites: Vec<PskCipherSuite>) -> Self {
        self.cipher_suites = suites;
        self
    }

    pub fn psk_identity_hint(mut self, hint: impl Into<Vec<u8>>) -> Self {
        self.psk_identity_hint = Some(hint.into());
        self
    }

    pub fn dh_params(mut self, params: DhDomainParams) -> Self {
        self.dh_params = params;
        self
    }

    pub fn min_dh_prime_bits(mut self, bits: u64) -> Self {
        self.min_dh_prime_bits = bits;
        self
    }

    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Config, Error> {
        // Room for at least a record header, a handshake header and some
        // payload, otherwise fragmentation cannot make progress.
        if self.mtu < 100 {
            return Err(Error::Config(format!("mtu {} too small", self.mtu)));
        }
        if self.max_queue_rx == 0 || self.max_queue_tx == 0 {
            return Err(Error::Config("queue sizes must be non-zero".into()));
        }
        if self.cipher_suites.is_empty() {
            return Err(Error::Config("no cipher suites configured".into()));
        }
        if let Some(suite) = self.cipher_suites.iter().find(|s| !s.is_supported()) {
            return Err(Error::Config(format!("unsupported cipher suite {:?}", suite)));
        }
        if let Some(hint) = &self.psk_identity_hint {
            if hint.len() > MAX_PSK_IDENTITY_LEN {
                return Err(Error::Config("PSK identity hint too long".into()));
            }
        }
        if self.dh_params.prime_bits() < self.min_dh_prime_bits {
            return Err(Error::Config(format!(
                "DH prime is {} bits, minimum is {}",
                self.dh_params.prime_bits(),
                self.min_dh_prime_bits
            )));
        }

        Ok(Config {
            mtu: self.mtu,
            max_queue_rx: self.max_queue_rx,
            max_queue_tx: self.max_queue_tx,
            flight_start_rto: self.flight_start_rto,
            flight_retries: self.flight_retries,
            handshake_timeout: self.handshake_timeout,
            cipher_suites: self.cipher_suites,
            psk_identity_hint: self.psk_identity_hint,
            dh_params: self.dh_params,
            min_dh_prime_bits: self.min_dh_prime_bits,
            rng_seed: self.rng_seed,
        })
    }
}
