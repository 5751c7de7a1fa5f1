// Copyright 2024. Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A single token bucket (spec.md §4.4).

use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::Duration;

struct State {
    tokens: f64,
    last_update: Instant,
}

/// Refill-on-acquire token bucket; capacity is `max(1, ceil(rate))`.
pub struct TokenBucket {
    rate: Mutex<f64>,
    capacity: f64,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(rate: f64) -> Self {
        let capacity = (1.0_f64).max(rate.ceil());
        Self {
            rate: Mutex::new(rate),
            capacity,
            state: Mutex::new(State {
                tokens: capacity,
                last_update: Instant::now(),
            }),
        }
    }

    pub async fn set_rate(&self, rate: f64) {
        *self.rate.lock().await = rate;
    }

    pub async fn rate(&self) -> f64 {
        *self.rate.lock().await
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    async fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();
        let rate = *self.rate.lock().await;
        state.tokens = self.capacity.min(state.tokens + elapsed * rate);
        state.last_update = now;
    }

    /// Refills, then takes `tokens` if available. Non-blocking.
    pub async fn acquire(&self, tokens: f64) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state).await;
        if state.tokens >= tokens {
            state.tokens -= tokens;
            true
        } else {
            false
        }
    }

    /// The spec-mandated fallback: polls `acquire` every 100ms until it
    /// succeeds or `timeout` elapses.
    pub async fn wait_for_tokens(&self, tokens: f64, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.acquire(tokens).await {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Enrichment over the 100ms poll loop: sleeps exactly until
    /// `get_wait_time()` reports enough tokens will exist, instead of
    /// busy-polling (spec.md §9 design note on rate-limit polling).
    pub async fn acquire_scheduled(&self, tokens: f64, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.acquire(tokens).await {
                return true;
            }
            let wait = self.get_wait_time(tokens).await;
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return false;
            }
            tokio::time::sleep(Duration::from_secs_f64(wait).min(remaining)).await;
            if start.elapsed() >= timeout {
                return false;
            }
        }
    }

    pub async fn get_wait_time(&self, tokens: f64) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state).await;
        if state.tokens >= tokens {
            return 0.0;
        }
        let rate = *self.rate.lock().await;
        if rate <= 0.0 {
            return f64::INFINITY;
        }
        (tokens - state.tokens) / rate
    }

    pub async fn tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state).await;
        state.tokens
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn capacity_is_at_least_one() {
        let bucket = TokenBucket::new(0.1);
        assert_eq!(bucket.capacity(), 1.0);
    }

    #[tokio::test]
    async fn acquire_drains_then_refuses() {
        let bucket = TokenBucket::new(1.0);
        assert!(bucket.acquire(1.0).await);
        assert!(!bucket.acquire(1.0).await);
    }

    #[tokio::test]
    async fn wait_for_tokens_times_out() {
        let bucket = TokenBucket::new(0.001);
        assert!(bucket.acquire(1.0).await);
        let got = bucket
            .wait_for_tokens(1.0, Duration::from_millis(150))
            .await;
        assert!(!got);
    }
}
