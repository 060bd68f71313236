use std::time::Duration;

pub const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_RELAYER_URL: &str = "http://127.0.0.1:8546";
pub const DEFAULT_PAGE_SIZE: usize = 5;
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Ledger contract facade
    pub ledger_url: String,
    /// Encryption relayer
    pub relayer_url: String,
    pub page_size: usize,
    pub history_capacity: usize,
    /// How long a success status stays visible
    pub success_ttl: Duration,
    /// How long an error status stays visible
    pub error_ttl: Duration,
    pub confirmation_poll_interval: Duration,
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ledger_url: DEFAULT_LEDGER_URL.to_string(),
            relayer_url: DEFAULT_RELAYER_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            success_ttl: Duration::from_secs(2),
            error_ttl: Duration::from_secs(3),
            confirmation_poll_interval: Duration::from_millis(500),
            request_timeout_secs: safenote_network::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let ledger_url = lookup("SAFENOTE_LEDGER_URL").unwrap_or(defaults.ledger_url.clone());
        let relayer_url = lookup("SAFENOTE_RELAYER_URL").unwrap_or(defaults.relayer_url.clone());

        let page_size = lookup("SAFENOTE_PAGE_SIZE")
            .and_then(|s| s.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.page_size);

        // Zero would turn confirmation polling into a busy loop.
        let confirmation_poll_interval = lookup("SAFENOTE_POLL_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .filter(|&ms: &u64| ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.confirmation_poll_interval);

        Self {
            ledger_url,
            relayer_url,
            page_size,
            confirmation_poll_interval,
            ..defaults
        }
    }

    pub fn with_ledger_url(mut self, url: &str) -> Self {
        self.ledger_url = url.to_string();
        self
    }

    pub fn with_relayer_url(mut self, url: &str) -> Self {
        self.relayer_url = url.to_string();
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_status_ttls(mut self, success: Duration, error: Duration) -> Self {
        self.success_ttl = success;
        self.error_ttl = error;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.confirmation_poll_interval = interval;
        self
    }

    pub(crate) fn network_config(&self) -> safenote_network::Config {
        safenote_network::Config::default().with_timeout(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_session_policy() {
        let config = SessionConfig::default();
        assert_eq!(config.page_size, 5);
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.success_ttl, Duration::from_secs(2));
        assert_eq!(config.error_ttl, Duration::from_secs(3));
    }

    #[test]
    fn test_builders() {
        let config = SessionConfig::default()
            .with_ledger_url("http://ledger")
            .with_page_size(20)
            .with_poll_interval(Duration::from_millis(10));
        assert_eq!(config.ledger_url, "http://ledger");
        assert_eq!(config.page_size, 20);
        assert_eq!(config.confirmation_poll_interval, Duration::from_millis(10));
    }

    fn lookup_from<'a>(
        vars: &'a [(&'a str, &'a str)],
    ) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("SAFENOTE_LEDGER_URL", "http://ledger:9000"),
            ("SAFENOTE_RELAYER_URL", "http://relayer:9001"),
            ("SAFENOTE_PAGE_SIZE", "12"),
            ("SAFENOTE_POLL_INTERVAL_MS", "250"),
        ]));
        assert_eq!(config.ledger_url, "http://ledger:9000");
        assert_eq!(config.relayer_url, "http://relayer:9001");
        assert_eq!(config.page_size, 12);
        assert_eq!(config.confirmation_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_from_lookup_ignores_zero_and_garbage() {
        let defaults = SessionConfig::default();
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("SAFENOTE_PAGE_SIZE", "0"),
            ("SAFENOTE_POLL_INTERVAL_MS", "0"),
        ]));
        assert_eq!(config.page_size, defaults.page_size);
        assert_eq!(
            config.confirmation_poll_interval,
            defaults.confirmation_poll_interval
        );

        let config = SessionConfig::from_lookup(lookup_from(&[(
            "SAFENOTE_POLL_INTERVAL_MS",
            "soon",
        )]));
        assert_eq!(
            config.confirmation_poll_interval,
            defaults.confirmation_poll_interval
        );
        assert_eq!(config.ledger_url, defaults.ledger_url);
    }
}
