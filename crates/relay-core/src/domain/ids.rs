//! Session identifiers and verified-unique allocation.
//!
//! Session ids are drawn at random from a large space rather than counted up
//! from 1, so an id reveals nothing about how many players have connected.
//! Random draws can collide, so every draw is checked against the live
//! registry and re-drawn until it is unused.

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Largest session id ever issued.
///
/// Ids stay within the positive range of a signed 64-bit integer so clients
/// that store them as `int64` never see a negative value.
pub const MAX_SESSION_ID: u64 = i64::MAX as u64;

/// Identifies one live session for the lifetime of its connection.
///
/// Unique among currently-active sessions only; ids may be reused after a
/// session ends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Draws session ids that are not present in a live registry.
///
/// # Examples
///
/// ```rust
/// use std::collections::HashMap;
/// use relay_core::{IdAllocator, SessionId};
///
/// let mut ids = IdAllocator::new();
/// let live: HashMap<SessionId, ()> = HashMap::new();
/// let id = ids.allocate(&live).unwrap();
/// assert!(id.get() >= 1);
/// ```
pub struct IdAllocator {
    rng: StdRng,
    range: RangeInclusive<u64>,
}

impl IdAllocator {
    /// Creates an allocator over `1..=MAX_SESSION_ID` seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(1..=MAX_SESSION_ID, StdRng::from_entropy())
    }

    /// Creates an allocator over a custom range with a caller-supplied RNG.
    ///
    /// Small ranges and seeded RNGs make collisions reproducible in tests.
    pub fn with_rng(range: RangeInclusive<u64>, rng: StdRng) -> Self {
        Self { rng, range }
    }

    /// Number of distinct ids this allocator can issue.
    pub fn capacity(&self) -> u64 {
        let (start, end) = (*self.range.start(), *self.range.end());
        if end < start {
            0
        } else {
            (end - start).saturating_add(1)
        }
    }

    /// Returns a random id that is not a key of `live`.
    ///
    /// Returns `None` only when every id in the range is already taken.
    pub fn allocate<V>(&mut self, live: &HashMap<SessionId, V>) -> Option<SessionId> {
        if live.len() as u64 >= self.capacity() {
            return None;
        }
        loop {
            let candidate = SessionId(self.rng.gen_range(self.range.clone()));
            if !live.contains_key(&candidate) {
                return Some(candidate);
            }
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
