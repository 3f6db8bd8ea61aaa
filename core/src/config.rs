//! Per-client request options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout used by `Client::default_client`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options attached to a `Client` and handed to the transport on every send.
///
/// Deserializes from config files with human-readable durations:
///
/// ```
/// let opts: gt_core::Options = serde_json::from_str(r#"{"timeout":"10s"}"#).unwrap();
/// assert_eq!(opts.timeout, Some(std::time::Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Whole-request deadline. `None` waits forever.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Options {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}
