//! Clients for the external services Hive orchestrates.
//!
//! Each service sits behind a trait so the sweeps and handlers can be driven
//! by in-process fakes in tests:
//!
//! | Trait            | Service                      | HTTP implementation  |
//! |------------------|------------------------------|----------------------|
//! | `WorkflowClient` | Stakwork workflows + prompts | `StakworkClient`     |
//! | `PoolClient`     | Pool Manager VM pools        | `PoolManagerClient`  |
//! | `GitSeeClient`   | GitSee on the swarm host     | `HttpGitSeeClient`   |
//!
//! `UrlSigner` issues the time-limited media URLs.

pub mod gitsee;
pub mod pool_manager;
pub mod signer;
pub mod stakwork;

#[cfg(test)]
pub mod testing;

use thiserror::Error;

pub use gitsee::{GitSeeClient, HttpGitSeeClient};
pub use pool_manager::{
    CreatePoolRequest, CreatedPool, EnvVar, PodWorkspace, PoolClient, PoolManagerClient, PoolStatus,
};
pub use signer::{SignedUrl, UrlSigner};
pub use stakwork::{StakworkClient, WorkflowClient, WorkflowRequest};

/// Failure talking to an external service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} sent an unexpected response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

impl ClientError {
    /// Upstream 4xx status, which handlers pass through to the caller.
    pub fn client_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } if (400..500).contains(status) => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Turn a non-2xx response into `ClientError::Status`, keeping the body text.
pub(crate) async fn check_status(
    service: &'static str,
    resp: reqwest::Response,
) -> ClientResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

pub(crate) async fn decode_json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    resp: reqwest::Response,
) -> ClientResult<T> {
    resp.json::<T>().await.map_err(|e| ClientError::Decode {
        service,
        message: e.to_string(),
    })
}

pub(crate) fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> ClientError {
    move |source| ClientError::Transport { service, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_status_only_for_4xx() {
        let not_found = ClientError::Status {
            service: "Stakwork",
            status: 404,
            body: "missing".into(),
        };
        assert_eq!(not_found.client_status(), Some(404));

        let outage = ClientError::Status {
            service: "Stakwork",
            status: 503,
            body: String::new(),
        };
        assert_eq!(outage.client_status(), None);
        assert_eq!(ClientError::NotConfigured("Stakwork API key").client_status(), None);
    }

    #[test]
    fn status_error_message_includes_body() {
        let err = ClientError::Status {
            service: "Pool Manager",
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "Pool Manager returned 500: boom");
    }
}
