//! Injected identity and time sources.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of unique identifiers. Shared between concurrent requests.
pub trait IdentitySource: Send + Sync {
    fn next_id(&self, prefix: &str) -> String;
}

/// Monotonic counter producing `PREFIX_00000001`, `PREFIX_00000002`, ...
///
/// The counter is shared across prefixes, so a number is never handed out twice.
#[derive(Debug, Default)]
pub struct SequentialIdSource {
    counter: AtomicU64,
}

impl SequentialIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after `last`, e.g. when resuming from a persisted high-water mark.
    pub fn starting_after(last: u64) -> Self {
        Self {
            counter: AtomicU64::new(last),
        }
    }

    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl IdentitySource for SequentialIdSource {
    fn next_id(&self, prefix: &str) -> String {
        let next = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}_{next:08}")
    }
}

/// Random v4 UUIDs, `PREFIX_<uuid>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdSource;

impl IdentitySource for UuidIdSource {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", Uuid::new_v4().simple())
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant. Used by tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn sequential_ids_are_zero_padded() {
        let ids = SequentialIdSource::new();
        assert_eq!(ids.next_id("CREDIT"), "CREDIT_00000001");
        assert_eq!(ids.next_id("VREQ"), "VREQ_00000002");
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn resumes_after_high_water_mark() {
        let ids = SequentialIdSource::starting_after(41);
        assert_eq!(ids.next_id("CREDIT"), "CREDIT_00000042");
    }

    #[test]
    fn sequential_ids_are_unique_across_threads() {
        let ids = Arc::new(SequentialIdSource::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..250).map(|_| ids.next_id("C")).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn uuid_ids_carry_prefix() {
        let id = UuidIdSource.next_id("CREDIT");
        assert!(id.starts_with("CREDIT_"));
        assert_eq!(id.len(), "CREDIT_".len() + 32);
    }
}
