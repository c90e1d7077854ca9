/*
[INPUT]:  Rate-limit errors (with or without a venue Retry-After) and successes
[OUTPUT]: A shared blocked-until gate every REST call waits behind
[POS]:    Resilience layer - one guard per exchange client
[UPDATE]: When backoff bounds or jitter change
*/

use std::time::Duration;

use perpgrid_adapter::AdapterError;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const JITTER_MS: i64 = 250;

struct GuardState {
    blocked_until: Option<Instant>,
    next_backoff: Duration,
}

/// Shared 429 gate. Every REST call acquires first; a rate-limited response
/// pushes `blocked_until` forward by the venue's Retry-After when present,
/// otherwise by an exponentially growing jittered backoff that a success
/// resets.
pub struct RateLimitGuard {
    state: Mutex<GuardState>,
}

impl RateLimitGuard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GuardState {
                blocked_until: None,
                next_backoff: INITIAL_BACKOFF,
            }),
        }
    }

    /// Wait until the guard is open. The lock is never held across the sleep.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let state = self.state.lock().await;
                match state.blocked_until {
                    Some(until) => {
                        let now = Instant::now();
                        if until <= now {
                            return;
                        }
                        until - now
                    }
                    None => return,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Feed an adapter-call outcome back into the guard.
    pub async fn note<T>(&self, result: &Result<T, AdapterError>) {
        match result {
            Ok(_) => self.on_success().await,
            Err(err) if err.is_rate_limit() => self.on_rate_limited(err.retry_after()).await,
            Err(_) => {}
        }
    }

    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;
        state.next_backoff = INITIAL_BACKOFF;
    }

    pub async fn on_rate_limited(&self, retry_after: Option<Duration>) {
        let mut state = self.state.lock().await;
        let delay = match retry_after {
            Some(delay) => delay,
            None => {
                let base = state.next_backoff;
                state.next_backoff = (base * 2).min(MAX_BACKOFF);
                jittered(base)
            }
        };
        let until = Instant::now() + delay;
        let until = match state.blocked_until {
            Some(existing) if existing > until => existing,
            _ => until,
        };
        state.blocked_until = Some(until);
        warn!(delay_ms = delay.as_millis() as u64, "rate limited; pausing REST calls");
    }

    /// Current backoff that would apply to the next unhinted 429.
    pub async fn next_backoff(&self) -> Duration {
        self.state.lock().await.next_backoff
    }
}

impl Default for RateLimitGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn jittered(base: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(-JITTER_MS..=JITTER_MS);
    let base_ms = base.as_millis() as i64;
    Duration::from_millis(base_ms.saturating_add(jitter).max(0) as u64)
}
