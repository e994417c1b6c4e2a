// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed errors shared by the fetch pipeline, adapters and supervisor.
//!
//! Browser, file and SQL plumbing propagates as `anyhow::Error`; the enums
//! here exist where a caller has to branch on the outcome.

/// How the poller reacts to a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Expected miss (block list, upgrade wall, bad URL). Never retried.
    Skip,
    /// Account or configuration problem. Takes the agent offline.
    Terminal,
    /// The owning agent is shutting down.
    Cancelled,
    /// Navigation, timing or network trouble. Goes to the retry queue.
    Transient,
}

/// Outcome of a failed fetch or `handle_article` call.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("url is on the block list: {url}")]
    Blocked { url: String },

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("article requires a subscription upgrade")]
    UpgradeRequired,

    #[error("page did not finish loading: {0:#}")]
    LoadFailed(anyhow::Error),

    #[error("{site} subscription does not cover the article")]
    InvalidSubscription { site: String },

    #[error("login failed: {0}")]
    Login(LoginError),

    #[error("connection failed, page title was {title:?}")]
    Connection { title: String },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("browser error: {0:#}")]
    Browser(anyhow::Error),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl FetchError {
    /// Classify the error for the poller.
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Blocked { .. }
            | FetchError::InvalidUrl { .. }
            | FetchError::UpgradeRequired => FailureKind::Skip,
            FetchError::InvalidSubscription { .. } => FailureKind::Terminal,
            FetchError::Cancelled | FetchError::Login(LoginError::Otp(OtpError::Cancelled)) => {
                FailureKind::Cancelled
            }
            _ => FailureKind::Transient,
        }
    }

    /// Map a login failure, lifting an invalid subscription to the top level.
    /// A `FetchError` raised by a paywall probe inside the login flow keeps its kind.
    pub fn from_login(site: &str, err: LoginError) -> Self {
        match err {
            LoginError::InvalidSubscription => FetchError::InvalidSubscription {
                site: site.to_string(),
            },
            LoginError::Failed(e) => match e.downcast::<FetchError>() {
                Ok(inner) => inner,
                Err(e) => FetchError::Login(LoginError::Failed(e)),
            },
            other => FetchError::Login(other),
        }
    }

    /// Map an adapter probe failure, keeping a `FetchError` the adapter raised itself.
    pub fn from_probe(err: anyhow::Error) -> Self {
        match err.downcast::<FetchError>() {
            Ok(inner) => inner,
            Err(e) => FetchError::LoadFailed(e),
        }
    }
}

/// Fatal-at-init: aborts one agent's startup, never the process.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("{site} has no test page")]
    MissingTestPage { site: String },

    #[error("{site} requires option `{option}`")]
    MissingOption { site: String, option: String },

    #[error("unknown site: {0}")]
    UnknownSite(String),

    #[error("failed to load cookies: {0:#}")]
    Cookies(anyhow::Error),

    #[error("failed to start browser: {0:#}")]
    Browser(anyhow::Error),

    #[error("test page probe failed: {0:#}")]
    Probe(anyhow::Error),
}

/// Failure of an adapter's login flow.
#[derive(thiserror::Error, Debug)]
pub enum LoginError {
    #[error("logged in, but the subscription is not valid")]
    InvalidSubscription,

    #[error("one-time code exchange failed: {0}")]
    Otp(#[from] OtpError),

    #[error("{0:#}")]
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for LoginError {
    fn from(err: anyhow::Error) -> Self {
        LoginError::Failed(err)
    }
}

/// Failure of the one-time code rendezvous.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OtpError {
    #[error("No website requires OTP")]
    NoPendingRequest,

    #[error("one-time code wait was cancelled")]
    Cancelled,
}

/// Failure to route a raw URL to an agent.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("no enabled agent handles {0}")]
    NoAgent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let blocked = FetchError::Blocked {
            url: "https://photos.caixin.com/x".into(),
        };
        assert_eq!(blocked.kind(), FailureKind::Skip);
        assert_eq!(FetchError::UpgradeRequired.kind(), FailureKind::Skip);
        assert_eq!(
            FetchError::InvalidSubscription { site: "ft".into() }.kind(),
            FailureKind::Terminal
        );
        assert_eq!(FetchError::Cancelled.kind(), FailureKind::Cancelled);
        assert_eq!(
            FetchError::LoadFailed(anyhow::anyhow!("timeout")).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            FetchError::Connection {
                title: "Unable to connect".into()
            }
            .kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_cancelled_otp_is_cancellation() {
        let err = FetchError::from_login("ft", LoginError::Otp(OtpError::Cancelled));
        assert_eq!(err.kind(), FailureKind::Cancelled);
    }

    #[test]
    fn test_login_invalid_subscription_is_lifted() {
        let err = FetchError::from_login("Financial Times", LoginError::InvalidSubscription);
        assert!(matches!(err, FetchError::InvalidSubscription { ref site } if site == "Financial Times"));
        let failed = FetchError::from_login("x", anyhow::anyhow!("button missing").into());
        assert_eq!(failed.kind(), FailureKind::Transient);
    }

    #[test]
    fn test_upgrade_wall_survives_wrapping() {
        let err = FetchError::from_login(
            "caixin",
            LoginError::Failed(anyhow::Error::from(FetchError::UpgradeRequired)),
        );
        assert_eq!(err.kind(), FailureKind::Skip);

        let probe = FetchError::from_probe(anyhow::anyhow!("selector timed out"));
        assert!(matches!(probe, FetchError::LoadFailed(_)));
        assert_eq!(probe.kind(), FailureKind::Transient);
    }

    #[test]
    fn test_otp_error_message_matches_operator_text() {
        assert_eq!(OtpError::NoPendingRequest.to_string(), "No website requires OTP");
    }
}
