use tokio::sync::watch;
use tracing::{info, warn};

use crate::dao::gateway::{GatewayError, GatewayErrorKind};

/// Fragments of error messages that betray a network failure when the error carries no type.
const NETWORK_FAILURE_MARKERS: &[&str] = &[
    "failed to fetch",
    "network error",
    "network request failed",
    "connection refused",
    "connection reset",
    "timed out",
    "dns",
    "error sending request",
    "broken pipe",
];

/// How the offline queue should react to a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Keep the operation and stop the drain.
    Connectivity,
    /// Drop the operation into the dead-letter log and move on.
    Application,
    /// Retry like a connectivity failure until the attempt budget runs out.
    Unclassified,
}

/// Answers "are we online" for the sync machinery.
///
/// The link flag is driven by the sync supervisor's health checks and knocked down whenever a
/// remote call fails for connectivity reasons.
pub struct ConnectivityOracle {
    online: watch::Sender<bool>,
}

impl ConnectivityOracle {
    /// Build an oracle with the given initial link state.
    pub fn new(online: bool) -> Self {
        let (online, _rx) = watch::channel(online);
        Self { online }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Update the link flag, notifying subscribers only on transitions.
    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            if online {
                info!("remote store reachable; leaving offline mode");
            } else {
                warn!("remote store unreachable; entering offline mode");
            }
        }
    }

    /// Subscribe to link transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Classify a failed remote call.
    pub fn classify(&self, err: &GatewayError) -> FailureClass {
        if !self.is_online() {
            return FailureClass::Connectivity;
        }
        match err.kind() {
            GatewayErrorKind::Network => return FailureClass::Connectivity,
            GatewayErrorKind::Rejected => return FailureClass::Application,
            GatewayErrorKind::Other => {}
        }
        if looks_like_network_failure(&err.full_message()) {
            FailureClass::Connectivity
        } else {
            FailureClass::Unclassified
        }
    }
}

impl Default for ConnectivityOracle {
    fn default() -> Self {
        Self::new(false)
    }
}

fn looks_like_network_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    NETWORK_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn untyped(message: &str) -> GatewayError {
        GatewayError::Other {
            message: message.into(),
            source: None,
        }
    }

    #[test]
    fn offline_oracle_treats_everything_as_connectivity() {
        let oracle = ConnectivityOracle::new(false);
        assert_eq!(
            oracle.classify(&GatewayError::rejected("bad payload")),
            FailureClass::Connectivity
        );
    }

    #[test]
    fn typed_kinds_win_over_text() {
        let oracle = ConnectivityOracle::new(true);
        assert_eq!(
            oracle.classify(&GatewayError::rejected("network error in payload field")),
            FailureClass::Application
        );
        assert_eq!(
            oracle.classify(&GatewayError::network(
                "unreachable",
                std::io::Error::other("boom")
            )),
            FailureClass::Connectivity
        );
    }

    #[test]
    fn text_markers_are_matched_case_insensitively() {
        let oracle = ConnectivityOracle::new(true);
        assert_eq!(oracle.classify(&untyped("TypeError: Failed to fetch")), FailureClass::Connectivity);
        assert_eq!(oracle.classify(&untyped("operation timed out")), FailureClass::Connectivity);
        assert_eq!(oracle.classify(&untyped("document update conflict")), FailureClass::Unclassified);
    }

    #[test]
    fn subscribers_only_see_transitions() {
        let oracle = ConnectivityOracle::new(false);
        let mut rx = oracle.subscribe();
        oracle.set_online(false);
        assert!(!rx.has_changed().unwrap());
        oracle.set_online(true);
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }
}
