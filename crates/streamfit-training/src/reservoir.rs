//! Seeded reservoir sampling for bounded training groups.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed-size uniform sample of a stream (reservoir algorithm R).
///
/// After `n` offers each item is held with probability `capacity / n`.
#[derive(Debug, Clone)]
pub struct ReservoirSampler<T> {
    capacity: usize,
    seen: usize,
    sample: Vec<T>,
    rng: StdRng,
}

impl<T> ReservoirSampler<T> {
    #[must_use]
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            capacity,
            seen: 0,
            sample: Vec::with_capacity(capacity.min(1024)),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn offer(&mut self, item: T) {
        if self.sample.len() < self.capacity {
            self.sample.push(item);
        } else if self.capacity > 0 {
            let slot = self.rng.gen_range(0..=self.seen);
            if slot < self.capacity {
                self.sample[slot] = item;
            }
        }
        self.seen += 1;
    }

    /// Number of items offered so far.
    #[must_use]
    pub fn seen(&self) -> usize {
        self.seen
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sample.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sample.is_empty()
    }

    #[must_use]
    pub fn into_sample(self) -> Vec<T> {
        self.sample
    }
}
