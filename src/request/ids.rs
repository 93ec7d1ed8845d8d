//! Correlation id generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generates correlation ids unique for the lifetime of the generator.
///
/// Format: `<prefix>-<counter base36>`, e.g. `sl4f2a-00000C`. The counter is
/// never reset, so an id is never reused while a late reply to it may
/// still be in flight.
pub struct CorrelationIds {
    prefix: String,
    counter: AtomicU64,
}

impl CorrelationIds {
    /// Create a generator with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Create a generator with a random prefix.
    pub fn random() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self::new(format!("sl{}", &uuid[..6]))
    }

    /// Generate the next id.
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, base36_encode_6(n))
    }
}

/// Encode a number as a 6-character base36 string (wraps above 36^6).
fn base36_encode_6(mut n: u64) -> String {
    const CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut result = [b'0'; 6];

    for slot in result.iter_mut().rev() {
        *slot = CHARS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&result).into_owned()
}
