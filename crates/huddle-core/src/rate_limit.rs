use huddle_models::error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Token bucket with periodic full refill: once more than `window` has passed
/// since the last refill, the bucket jumps back to `capacity`. Tokens are not
/// replenished gradually.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u32,
    window: Duration,
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self::starting_at(capacity, window, Instant::now())
    }

    pub fn starting_at(capacity: u32, window: Duration, now: Instant) -> Self {
        Self {
            capacity,
            window,
            tokens: capacity,
            last_refill: now,
        }
    }

    pub fn consume(&mut self) -> bool {
        self.consume_at(Instant::now())
    }

    pub fn consume_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_refill) > self.window {
            self.tokens = self.capacity;
            self.last_refill = now;
        }
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateClass {
    /// Any authenticated event.
    General,
    Chat,
    Reaction,
    Typing,
    /// Nickname changes and room mutations.
    Mutation,
}

impl RateClass {
    /// `None` for classes whose excess is dropped without telling the client.
    pub fn error_code(self) -> Option<ErrorCode> {
        match self {
            Self::Chat => Some(ErrorCode::RateLimitChat),
            Self::Reaction => Some(ErrorCode::RateLimitReaction),
            Self::Mutation => Some(ErrorCode::RateLimitAction),
            Self::General | Self::Typing => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub capacity: u32,
    pub window_ms: u64,
}

impl BucketConfig {
    pub const fn new(capacity: u32, window_ms: u64) -> Self {
        Self { capacity, window_ms }
    }

    fn bucket(self) -> TokenBucket {
        TokenBucket::new(self.capacity, Duration::from_millis(self.window_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub general: BucketConfig,
    pub chat: BucketConfig,
    pub reaction: BucketConfig,
    pub typing: BucketConfig,
    pub mutation: BucketConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general: BucketConfig::new(80, 10_000),
            chat: BucketConfig::new(5, 3_000),
            reaction: BucketConfig::new(10, 5_000),
            typing: BucketConfig::new(1, 2_000),
            mutation: BucketConfig::new(40, 10_000),
        }
    }
}

/// The buckets owned by one connection.
#[derive(Debug, Clone)]
pub struct ConnectionLimits {
    general: TokenBucket,
    chat: TokenBucket,
    reaction: TokenBucket,
    typing: TokenBucket,
    mutation: TokenBucket,
}

impl ConnectionLimits {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            general: config.general.bucket(),
            chat: config.chat.bucket(),
            reaction: config.reaction.bucket(),
            typing: config.typing.bucket(),
            mutation: config.mutation.bucket(),
        }
    }

    pub fn consume(&mut self, class: RateClass) -> bool {
        let bucket = match class {
            RateClass::General => &mut self.general,
            RateClass::Chat => &mut self.chat,
            RateClass::Reaction => &mut self.reaction,
            RateClass::Typing => &mut self.typing,
            RateClass::Mutation => &mut self.mutation,
        };
        bucket.consume()
    }
}
