use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2025-01-01T00:00:00Z
const HUDDLE_EPOCH: u64 = 1_735_689_600_000;

const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Last issued `timestamp << 12 | sequence`, shared by every worker id in the process.
static LAST: AtomicU64 = AtomicU64::new(0);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(HUDDLE_EPOCH)
}

/// Generate a Snowflake ID.
/// Format: 42 bits timestamp | 10 bits worker | 12 bits sequence
///
/// Ids are strictly increasing within the process. Once a millisecond's 4096
/// sequence numbers are spent the timestamp borrows the next millisecond, and
/// a clock that steps backwards keeps the last issued timestamp.
pub fn generate(worker_id: u16) -> i64 {
    let now = now_millis().saturating_sub(HUDDLE_EPOCH);
    let mut prev = LAST.load(Ordering::Relaxed);
    let packed = loop {
        let prev_ts = prev >> SEQUENCE_BITS;
        let prev_seq = prev & SEQUENCE_MASK;
        let next = if now > prev_ts {
            now << SEQUENCE_BITS
        } else if prev_seq < SEQUENCE_MASK {
            prev + 1
        } else {
            (prev_ts + 1) << SEQUENCE_BITS
        };
        match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break next,
            Err(actual) => prev = actual,
        }
    };
    let timestamp = packed >> SEQUENCE_BITS;
    let seq = packed & SEQUENCE_MASK;
    let id = (timestamp << 22) | ((worker_id as u64 & 0x3FF) << SEQUENCE_BITS) | seq;
    id as i64
}

/// Extract the Unix timestamp (ms) from a snowflake.
pub fn timestamp_millis(id: i64) -> u64 {
    ((id as u64) >> 22) + HUDDLE_EPOCH
}

/// Parse the decimal wire form of an id. Non-positive values are rejected.
pub fn parse(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}
