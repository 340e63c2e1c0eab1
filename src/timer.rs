use std::time::Duration;

/// Spread retransmission timers by up to +/- 25% to avoid lockstep
/// retransmits between peers.
const JITTER_RANGE: f32 = 0.5;

/// Exponential backoff for flight retransmission (RFC 6347 4.2.4).
///
/// Starts at `start_rto` and doubles on every attempt until `retries` is
/// exhausted.
#[derive(Debug)]
pub(crate) struct ExponentialBackoff {
    start_rto: Duration,
    retries: u32,
    rto: Duration,
    jitter: f32,
    left: u32,
}

impl ExponentialBackoff {
    pub fn new(start_rto: Duration, retries: u32, jitter_seed: f32) -> Self {
        ExponentialBackoff {
            start_rto,
            retries,
            rto: start_rto,
            jitter: jitter_seed,
            left: retries,
        }
    }

    /// Current timeout with jitter applied, never below 50ms.
    pub fn rto(&self) -> Duration {
        let factor = 1.0 + (self.jitter - 0.5) * JITTER_RANGE;
        let jittered = self.rto.mul_f32(factor);
        jittered.max(Duration::from_millis(50))
    }

    /// Register a retransmission attempt, doubling the timeout.
    pub fn attempt(&mut self, jitter_seed: f32) {
        let (left, underflow) = self.left.overflowing_sub(1);
        if underflow {
            return;
        }
        self.left = left;
        self.rto *= 2;
        self.jitter = jitter_seed;
    }

    pub fn can_retry(&self) -> bool {
        self.left > 0
    }

    pub fn reset(&mut self, jitter_seed: f32) {
        self.rto = self.start_rto;
        self.left = self.retries;
        self.jitter = jitter_seed;
    }
}
