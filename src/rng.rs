use rand::distributions::{Distribution, Standard};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// Random number generator that is either OS-backed or, when a seed is
/// configured, fully deterministic. Seeding is for tests only.
pub(crate) struct SeededRng {
    inner: Option<StdRng>,
}

impl SeededRng {
    pub fn new(seed: Option<u64>) -> Self {
        SeededRng {
            inner: seed.map(StdRng::seed_from_u64),
        }
    }

    pub fn random<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        match &mut self.inner {
            Some(rng) => rng.gen(),
            None => rand::random(),
        }
    }
}

impl fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededRng")
            .field("seeded", &self.inner.is_some())
            .finish()
    }
}
