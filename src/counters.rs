use parking_lot::Mutex;
use serde_derive::Serialize;

use crate::label::ObjectClass;

/// Running number of tracks created per class.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassCounts {
    pub people: u64,
    pub vehicles: u64,
    pub bicycles: u64,
}

impl ClassCounts {
    #[inline]
    pub fn increment(&mut self, class: ObjectClass) {
        match class {
            ObjectClass::Person => self.people += 1,
            ObjectClass::Vehicle => self.vehicles += 1,
            ObjectClass::Bicycle => self.bicycles += 1,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub classes: ClassCounts,
    pub collisions: u64,
}

/// Process-wide cumulative totals shared by every channel session.
#[derive(Debug, Default)]
pub struct Counters {
    inner: Mutex<Totals>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the class totals including this track.
    pub fn record_track(&self, class: ObjectClass) -> ClassCounts {
        let mut totals = self.inner.lock();
        totals.classes.increment(class);
        totals.classes
    }

    /// Returns the collision total including this one.
    pub fn record_collision(&self) -> u64 {
        let mut totals = self.inner.lock();
        totals.collisions += 1;
        totals.collisions
    }

    #[inline]
    pub fn snapshot(&self) -> Totals {
        *self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counters = Arc::new(Counters::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        counters.record_track(ObjectClass::Vehicle);
                        counters.record_collision();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let totals = counters.snapshot();
        assert_eq!(totals.classes.vehicles, 1000);
        assert_eq!(totals.classes.people, 0);
        assert_eq!(totals.collisions, 1000);
    }
}
