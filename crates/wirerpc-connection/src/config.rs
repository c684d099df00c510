use std::time::Duration;

/// Default bound on outgoing ids remembered after timeout or cancellation.
pub const DEFAULT_MAX_ABANDONED: usize = 1024;

/// Per-connection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// How long an outgoing request may wait for its response. `None` waits
    /// until the response arrives, the request is canceled, or the peer
    /// disconnects.
    pub request_timeout: Option<Duration>,

    /// How many abandoned request ids are remembered so their late responses
    /// can be dropped quietly. The oldest id is forgotten first; a response
    /// that arrives after its id was forgotten is reported as unknown.
    pub max_abandoned: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_abandoned: DEFAULT_MAX_ABANDONED,
        }
    }
}

impl ConnectionConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_max_abandoned(mut self, max: usize) -> Self {
        self.max_abandoned = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_wait_forever_and_bound_abandoned_ids() {
        let config = ConnectionConfig::default();
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.max_abandoned, DEFAULT_MAX_ABANDONED);

        let tuned = config
            .with_request_timeout(Duration::from_secs(1))
            .with_max_abandoned(8);
        assert_eq!(tuned.request_timeout, Some(Duration::from_secs(1)));
        assert_eq!(tuned.max_abandoned, 8);
    }
}
