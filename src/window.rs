/// Sliding 64-entry anti-replay window (RFC 6347 4.1.2.6).
///
/// One instance guards one epoch. Sequence numbers ahead of the window slide
/// it forward, numbers inside the window are accepted once, numbers behind
/// the window are rejected.
#[derive(Debug, Default)]
pub(crate) struct ReplayWindow {
    max_seq: u64,
    window: u64,
}

impl ReplayWindow {
    pub fn new() -> Self {
        ReplayWindow::default()
    }

    /// Returns true if `seq` is fresh and records it as seen.
    pub fn check_and_update(&mut self, seq: u64) -> bool {
        if seq > self.max_seq {
            let delta = seq - self.max_seq;
            // Shifting by >= 64 is UB, clamp: anything further ahead clears
            // the whole window anyway.
            if delta >= 64 {
                self.window = 0;
            } else {
                self.window <<= delta;
            }
            self.window |= 1;
            self.max_seq = seq;
            return true;
        }

        let offset = self.max_seq - seq;
        if offset >= 64 {
            return false;
        }

        let mask = 1u64 << offset;
        if self.window & mask != 0 {
            return false;
        }

        self.window |= mask;
        true
    }
}
