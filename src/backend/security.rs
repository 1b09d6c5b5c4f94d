use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::backend::error::AppError;

/// Matches `X-API-Key` against a comma-separated allow-list. An empty allow-list
/// rejects everything rather than silently disabling auth.
pub fn check_api_key(api_keys: &[String], presented: Option<&str>) -> Result<(), AppError> {
    match presented {
        Some(key) if api_keys.iter().any(|allowed| allowed == key) => Ok(()),
        _ => Err(AppError::AuthFailure),
    }
}

/// Sliding-window rate limiter keyed by client identifier (API key, else remote
/// address). Each client's recent request timestamps are tracked in a bounded deque.
pub struct InMemoryRateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        InMemoryRateLimiter {
            max_requests,
            window: Duration::from_secs(window_seconds),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `(allowed, retry_after_seconds)`. `retry_after_seconds` is computed
    /// from the oldest timestamp still inside the window when rejected.
    pub fn check(&self, client: &str) -> (bool, u64) {
        let now = Instant::now();
        let mut clients = self.clients.lock().expect("rate limiter mutex poisoned");
        let deque = clients.entry(client.to_string()).or_default();

        while let Some(&oldest) = deque.front() {
            if now.duration_since(oldest) > self.window {
                deque.pop_front();
            } else {
                break;
            }
        }

        if (deque.len() as u32) < self.max_requests {
            deque.push_back(now);
            (true, 0)
        } else {
            let retry_after = deque
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            (false, retry_after.as_secs().max(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_must_match_allow_list() {
        let keys = vec!["abc".to_string(), "def".to_string()];
        assert!(check_api_key(&keys, Some("abc")).is_ok());
        assert!(check_api_key(&keys, Some("zzz")).is_err());
        assert!(check_api_key(&keys, None).is_err());
    }

    #[test]
    fn rate_limiter_allows_up_to_budget_then_rejects() {
        let limiter = InMemoryRateLimiter::new(3, 60);
        for _ in 0..3 {
            let (allowed, _) = limiter.check("client-a");
            assert!(allowed);
        }
        let (allowed, retry_after) = limiter.check("client-a");
        assert!(!allowed);
        assert!(retry_after > 0);
    }

    #[test]
    fn distinct_clients_have_independent_budgets() {
        let limiter = InMemoryRateLimiter::new(1, 60);
        assert!(limiter.check("client-a").0);
        assert!(limiter.check("client-b").0);
    }
}
