//! Upgrade-time authentication for the stream endpoint.
//!
//! Clients authenticate by passing the configured credential as the
//! `API_KEY` query parameter of the upgrade request. When no credential is
//! configured the endpoint is open, and every attempt is waved through with
//! a warning so an unlocked deployment stays visible in the logs.

use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::warn;

/// Query parameter carrying the client credential.
pub const API_KEY_PARAM: &str = "API_KEY";

/// Why an upgrade request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeRejection {
    /// Request path is not the stream endpoint.
    UnknownPath(String),
    /// A credential is required but none was supplied.
    MissingCredential,
    /// The supplied credential does not match.
    InvalidCredential,
}

impl UpgradeRejection {
    /// HTTP status of the rejection response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownPath(_) => StatusCode::NOT_FOUND,
            Self::MissingCredential | Self::InvalidCredential => StatusCode::UNAUTHORIZED,
        }
    }

    /// Body text of the rejection response.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::UnknownPath(_) => "not found",
            Self::MissingCredential => "authentication required",
            Self::InvalidCredential => "invalid credential",
        }
    }

    /// The HTTP response answering the refused upgrade.
    #[must_use]
    pub fn into_response(self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.message().to_string()));
        *response.status_mut() = self.status();
        response
    }
}

/// Validates the path and credential of an upgrade request.
///
/// With no configured key every request for the right path is accepted,
/// each with its own warning.
pub fn authorize_upgrade(
    request: &Request,
    ws_path: &str,
    api_key: Option<&str>,
) -> Result<(), UpgradeRejection> {
    let uri = request.uri();
    if uri.path() != ws_path {
        return Err(UpgradeRejection::UnknownPath(uri.path().to_string()));
    }

    let Some(expected) = api_key else {
        warn!("no api key configured, accepting unauthenticated stream client");
        return Ok(());
    };

    match query_param(uri.query(), API_KEY_PARAM) {
        None => Err(UpgradeRejection::MissingCredential),
        Some(candidate) if candidate == expected => Ok(()),
        Some(_) => Err(UpgradeRejection::InvalidCredential),
    }
}

fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?
        .split('&')
        .find_map(|pair| match pair.split_once('=') {
            Some((k, v)) if k == key => Some(v),
            _ => None,
        })
}
