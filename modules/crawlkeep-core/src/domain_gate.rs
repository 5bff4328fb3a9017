use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Per-domain rate-limit state: last completed fetch time and any active
/// 429 backoff. Mutated only by fetch workers, and only across map
/// updates — never across network I/O.
#[derive(Default)]
pub struct DomainGate {
    state: Mutex<HashMap<String, DomainState>>,
}

#[derive(Default, Clone, Copy)]
struct DomainState {
    last_crawled: Option<Instant>,
    backoff_until: Option<Instant>,
}

/// What a fetch worker should do before issuing a request to this domain.
pub enum Gate {
    /// Domain is in backoff; caller should requeue and try another pair.
    InBackoff,
    /// Caller must sleep this long before issuing the request.
    WaitThen(Duration),
    /// Caller may proceed immediately.
    Go,
}

impl DomainGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn check(&self, domain: &str, min_delay: Duration) -> Gate {
        let state = self.state.lock().await;
        let Some(entry) = state.get(domain) else {
            return Gate::Go;
        };
        let now = Instant::now();
        if let Some(until) = entry.backoff_until {
            if now < until {
                return Gate::InBackoff;
            }
        }
        if let Some(last) = entry.last_crawled {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < min_delay {
                return Gate::WaitThen(min_delay - elapsed);
            }
        }
        Gate::Go
    }

    /// Record a fetch completion regardless of outcome — rate limiting
    /// applies to attempts, not just successes.
    pub async fn record_completion(&self, domain: &str) {
        let mut state = self.state.lock().await;
        state.entry(domain.to_string()).or_default().last_crawled = Some(Instant::now());
    }

    pub async fn set_backoff(&self, domain: &str, duration: Duration) {
        let mut state = self.state.lock().await;
        state.entry(domain.to_string()).or_default().backoff_until = Some(Instant::now() + duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_domain_goes_immediately() {
        let gate = DomainGate::new();
        assert!(matches!(gate.check("h.test", Duration::from_secs(1)).await, Gate::Go));
    }

    #[tokio::test]
    async fn recently_crawled_domain_must_wait() {
        let gate = DomainGate::new();
        gate.record_completion("h.test").await;
        assert!(matches!(
            gate.check("h.test", Duration::from_secs(1)).await,
            Gate::WaitThen(_)
        ));
    }

    #[tokio::test]
    async fn backoff_blocks_until_elapsed() {
        let gate = DomainGate::new();
        gate.set_backoff("h.test", Duration::from_millis(50)).await;
        assert!(matches!(gate.check("h.test", Duration::from_secs(1)).await, Gate::InBackoff));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(
            gate.check("h.test", Duration::from_secs(1)).await,
            Gate::Go | Gate::WaitThen(_)
        ));
    }
}
