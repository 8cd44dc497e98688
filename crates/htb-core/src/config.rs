use std::time::Duration;
use url::Url;

use crate::errors::Result;

/// Default API base address
pub const API_BASE: &str = "https://www.hackthebox.com/api/v4/";

/// Client identifier sent with every request
pub const USER_AGENT: &str = concat!("htb-client/", env!("CARGO_PKG_VERSION"));

/// Minimum wait between two challenge downloads
pub const DOWNLOAD_COOLDOWN: Duration = Duration::from_secs(30);

/// API endpoints used by the authentication flow, relative to the API base
pub mod endpoints {
    pub const LOGIN: &str = "login";
    pub const REFRESH: &str = "login/refresh";
    pub const TWO_FACTOR: &str = "2fa/login";
    pub const USER_INFO: &str = "user/info";
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Retry policy applied to HTTP 429 responses
///
/// The delay before retry `n` (starting at 0) is `base_delay * multiplier^n`,
/// capped at `max_delay`. `max_retries: None` retries forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: Option<u32>,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Fixed one second delay, retried until the API stops answering 429
    pub fn unbounded() -> Self {
        Self {
            max_retries: None,
            base_delay: Duration::from_secs(1),
            multiplier: 1,
            max_delay: Duration::from_secs(1),
        }
    }

    /// Delay to wait before the given retry
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another retry is allowed after `retries` have been made
    pub fn allows(&self, retries: u32) -> bool {
        self.max_retries.is_none_or(|max| retries < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(10),
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(16),
        }
    }
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address every endpoint is resolved against
    pub api_base: Url,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Client identifier header value
    pub user_agent: String,

    /// Retry policy for rate limited requests
    pub retry: RetryPolicy,

    /// Client-side cooldown between challenge downloads
    pub download_cooldown: Duration,
}

impl ClientConfig {
    /// Create config pointing at a different API base (tests, mirrors)
    pub fn with_api_base(api_base: &str) -> Result<Self> {
        Ok(Self {
            api_base: normalize_base(api_base)?,
            ..Self::default()
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse(API_BASE).expect("valid API base"),
            http_timeouts: HttpTimeouts::default(),
            user_agent: USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
            download_cooldown: DOWNLOAD_COOLDOWN,
        }
    }
}

/// Endpoints are joined relative to the base, which therefore needs a trailing slash
fn normalize_base(api_base: &str) -> Result<Url> {
    if api_base.ends_with('/') {
        Ok(Url::parse(api_base)?)
    } else {
        Ok(Url::parse(&format!("{api_base}/"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_backs_off_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(9), Duration::from_secs(16));
        assert!(policy.allows(9));
        assert!(!policy.allows(10));
    }

    #[test]
    fn unbounded_policy_never_gives_up() {
        let policy = RetryPolicy::unbounded();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(50), Duration::from_secs(1));
        assert!(policy.allows(u32::MAX - 1));
    }

    #[test]
    fn api_base_gains_trailing_slash() {
        let config = ClientConfig::with_api_base("http://127.0.0.1:9000/api/v4").unwrap();
        assert_eq!(config.api_base.as_str(), "http://127.0.0.1:9000/api/v4/");
        assert_eq!(
            config.api_base.join("machine/list").unwrap().as_str(),
            "http://127.0.0.1:9000/api/v4/machine/list"
        );
    }
}
