// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Runtime settings, sourced from the environment with hardcoded defaults.

use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::api::Backoff;

pub const DEFAULT_AUTH_SESSION_URL: &str = "https://www.magicnewton.com/portal/api/auth/session";
pub const DEFAULT_USER_URL: &str = "https://www.magicnewton.com/portal/api/user";
pub const DEFAULT_QUESTS_URL: &str = "https://www.magicnewton.com/portal/api/quests";
pub const DEFAULT_USER_QUESTS_URL: &str = "https://www.magicnewton.com/portal/api/userQuests";
pub const PORTAL_ORIGIN: &str = "https://www.magicnewton.com";
pub const PORTAL_REFERER: &str = "https://www.magicnewton.com/portal/rewards";

/// Inclusive random delay range, sampled at millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    pub fn fixed(delay: Duration) -> Self {
        Self { min: delay, max: delay }
    }

    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min == max {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_session: String,
    pub user: String,
    pub quests: String,
    pub user_quests: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_session: DEFAULT_AUTH_SESSION_URL.to_string(),
            user: DEFAULT_USER_URL.to_string(),
            quests: DEFAULT_QUESTS_URL.to_string(),
            user_quests: DEFAULT_USER_QUESTS_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoints: Endpoints,
    pub request_timeout: Duration,
    pub use_proxy: bool,
    /// Wait applied when there are no accounts to process.
    pub idle_wait: Duration,
    pub auth_settle: DelayRange,
    pub pre_roll: DelayRange,
    pub between_accounts: Duration,
    pub between_social_quests: Duration,
    pub pending_poll: Duration,
    pub dice_retry_delay: DelayRange,
    pub min_cycle_wait: Duration,
    pub max_auth_retries: u32,
    pub max_get_retries: u32,
    pub dice_retries_base: u32,
    pub max_pending_polls: u32,
    /// Generic pause used between session-check retries.
    pub request_delay: DelayRange,
    pub backoff: Backoff,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            auth_session: lookup("MN_BASE_URL_AUTH_SESSION").unwrap_or(defaults.auth_session),
            user: lookup("MN_BASE_URL_USER").unwrap_or(defaults.user),
            quests: lookup("MN_BASE_URL_QUESTS").unwrap_or(defaults.quests),
            user_quests: lookup("MN_BASE_URL_USER_QUESTS").unwrap_or(defaults.user_quests),
        };

        let use_proxy = lookup("USE_PROXY")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let request_delay = lookup("DELAY_BETWEEN_REQUESTS")
            .and_then(|raw| match serde_json::from_str::<Vec<u64>>(&raw) {
                Ok(pair) if pair.len() >= 2 => Some(DelayRange::from_secs(pair[0], pair[1])),
                _ => {
                    warn!(value = %raw, "DELAY_BETWEEN_REQUESTS is not a [min, max] array, using default");
                    None
                }
            })
            .unwrap_or_else(|| DelayRange::from_secs(5, 10));

        Self {
            endpoints,
            request_timeout: Duration::from_millis(parse_or(&lookup, "TIMEOUT_REQUEST", 20_000)),
            use_proxy,
            idle_wait: Duration::from_secs(60 * parse_or::<u64, _>(&lookup, "TIME_SLEEP", 1441)),
            auth_settle: DelayRange::from_millis(
                parse_or(&lookup, "MN_MIN_DELAY_AFTER_AUTH_MS", 12_000),
                parse_or(&lookup, "MN_MAX_DELAY_AFTER_AUTH_MS", 20_000),
            ),
            pre_roll: DelayRange::from_millis(
                parse_or(&lookup, "MN_MIN_DELAY_BEFORE_DICE_POST_MS", 2_000),
                parse_or(&lookup, "MN_MAX_DELAY_BEFORE_DICE_POST_MS", 5_000),
            ),
            between_accounts: Duration::from_millis(parse_or(
                &lookup,
                "MN_DELAY_BETWEEN_ACCOUNTS_MS",
                15_000,
            )),
            between_social_quests: Duration::from_secs(2),
            pending_poll: Duration::from_secs(1),
            dice_retry_delay: DelayRange::from_secs(15, 30),
            min_cycle_wait: Duration::from_secs(
                60 * parse_or::<u64, _>(&lookup, "MN_MIN_CYCLE_WAIT_MINUTES", 30),
            ),
            max_auth_retries: parse_or(&lookup, "MAX_AUTH_SESSION_RETRIES", 3u32).max(1),
            max_get_retries: parse_or(&lookup, "MN_MAX_API_GET_RETRIES", 3u32).max(1),
            dice_retries_base: parse_or(&lookup, "MN_MAX_DICE_PROCESS_RETRIES_BASE", 1),
            max_pending_polls: parse_or(&lookup, "MN_MAX_PENDING_POLLS", 30u32).max(1),
            request_delay,
            backoff: Backoff::default(),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "unparseable setting, using default");
                default
            }
        },
        None => default,
    }
}
