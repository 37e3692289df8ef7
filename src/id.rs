use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::{Clock, SystemClock};

/// Largest integer a JavaScript number represents exactly. The sequence wraps
/// back to 1 after reaching it so ids stay readable by the host.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

const ID_PREFIX: &str = "wv";

const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

static SEQUENCE: IdGenerator = IdGenerator::new();

/// Correlation id of an outbound request: `wv:<sequence>:<shortUuid>:<epochMillis>`.
///
/// The creation time travels alongside the string so staleness checks never
/// have to re-parse it. Ids received in raw form keep whatever timestamp can
/// be recovered from their fourth segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId {
    value: String,
    created_at_ms: Option<u64>,
}

impl CorrelationId {
    /// Wraps an id string produced elsewhere.
    pub fn from_raw(value: impl Into<String>) -> Self {
        let value = value.into();
        let created_at_ms = embedded_timestamp(&value);
        Self {
            value,
            created_at_ms,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn created_at_ms(&self) -> Option<u64> {
        self.created_at_ms
    }

    /// Embedded sequence number, if the id is in generator format.
    pub fn sequence(&self) -> Option<u64> {
        self.value.split(':').nth(1)?.parse().ok()
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Recovers the epoch-millis segment (index 3) of a colon-delimited id.
pub fn embedded_timestamp(id: &str) -> Option<u64> {
    id.split(':').nth(3)?.parse().ok()
}

/// Process-wide sequence source for correlation ids.
#[derive(Debug)]
pub struct IdGenerator {
    sequence: AtomicU64,
}

impl IdGenerator {
    pub const fn new() -> Self {
        Self::starting_after(0)
    }

    /// Generator whose next id carries `sequence + 1` (or 1 after the max).
    pub const fn starting_after(sequence: u64) -> Self {
        Self {
            sequence: AtomicU64::new(sequence),
        }
    }

    pub fn next_sequence(&self) -> u64 {
        let previous = self
            .sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                Some(if s >= MAX_SAFE_INTEGER { 1 } else { s + 1 })
            })
            .unwrap_or_default();
        if previous >= MAX_SAFE_INTEGER {
            1
        } else {
            previous + 1
        }
    }

    pub fn next_id(&self, clock: &dyn Clock) -> CorrelationId {
        let sequence = self.next_sequence();
        let now = clock.now_ms();
        CorrelationId {
            value: format!("{ID_PREFIX}:{sequence}:{}:{now}", short_uuid()),
            created_at_ms: Some(now),
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Next id from the process-wide generator, stamped with wall-clock time.
pub fn next_id() -> CorrelationId {
    SEQUENCE.next_id(&SystemClock)
}

/// Next id from the process-wide generator, stamped by `clock`.
pub fn next_id_with(clock: &dyn Clock) -> CorrelationId {
    SEQUENCE.next_id(clock)
}

/// A v4 uuid rendered in base62 (22 chars at most).
pub fn short_uuid() -> String {
    let mut n = uuid::Uuid::new_v4().as_u128();
    let mut out = Vec::with_capacity(22);
    while n > 0 {
        out.push(BASE62[(n % 62) as usize]);
        n /= 62;
    }
    if out.is_empty() {
        out.push(BASE62[0]);
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
