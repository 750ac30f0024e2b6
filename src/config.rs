//! Configuration and policy constants for the client core.
//!
//! The numeric defaults are product policy, carried over as-is; everything is
//! overridable through [`Config`] or environment variables so no call site
//! depends on the literal values.

use std::path::PathBuf;
use std::time::Duration;

use crate::moderation::ModerationPolicy;

/// Budget for any single façade request before it fails with `Timeout`.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 8;

/// A post is suppressed for non-authors at `score <= -10`.
pub const DEFAULT_POST_SUPPRESS_THRESHOLD: i64 = -10;

/// A comment is suppressed for non-authors at `score <= -1`.
pub const DEFAULT_COMMENT_SUPPRESS_THRESHOLD: i64 = -1;

/// Distinct reporters needed before content is flagged bad server-side.
pub const REPORT_FLAG_LIMIT: usize = 3;

/// Runtime configuration.
///
/// Values come from environment variables with hard-coded fallbacks:
///
/// - `AGORA_HOME` — data directory for the local store [default: `~/.agora`]
/// - `AGORA_TIMEOUT_SECS` — request timeout [default: 8]
/// - `AGORA_POST_THRESHOLD` / `AGORA_COMMENT_THRESHOLD` — suppression
///   thresholds [defaults: -10 / -1]
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
    pub moderation: ModerationPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("AGORA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".agora"))
                    .unwrap_or_else(|_| PathBuf::from(".agora"))
            });

        let request_timeout = std::env::var("AGORA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        let moderation = ModerationPolicy {
            post_threshold: env_i64("AGORA_POST_THRESHOLD", DEFAULT_POST_SUPPRESS_THRESHOLD),
            comment_threshold: env_i64(
                "AGORA_COMMENT_THRESHOLD",
                DEFAULT_COMMENT_SUPPRESS_THRESHOLD,
            ),
        };

        Self {
            data_dir,
            request_timeout,
            moderation,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".agora"),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            moderation: ModerationPolicy::default(),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
