use std::collections::HashSet;

use parking_lot::Mutex;

/// In-flight request registry keyed by `(operation, client token)`. A second
/// call with the same token while the first is outstanding is answered with
/// an "in progress" signal instead of a second remote call. Process-local,
/// never persisted; entries are removed on completion or error.
#[derive(Debug, Default)]
pub struct RequestGuard {
    inflight: Mutex<HashSet<String>>,
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if an identical token is already in flight.
    pub fn try_acquire(&self, token: &str) -> bool {
        self.inflight.lock().insert(token.to_string())
    }

    pub fn release(&self, token: &str) {
        self.inflight.lock().remove(token);
    }

    pub fn is_inflight(&self, token: &str) -> bool {
        self.inflight.lock().contains(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_token_rejected_until_release() {
        let guard = RequestGuard::new();
        assert!(guard.try_acquire("colorize-1700000000000"));
        assert!(!guard.try_acquire("colorize-1700000000000"));
        assert!(guard.is_inflight("colorize-1700000000000"));

        guard.release("colorize-1700000000000");
        assert!(guard.try_acquire("colorize-1700000000000"));
    }

    #[test]
    fn test_distinct_tokens_do_not_collide() {
        let guard = RequestGuard::new();
        assert!(guard.try_acquire("colorize-1"));
        assert!(guard.try_acquire("vidu-1"));
    }
}
