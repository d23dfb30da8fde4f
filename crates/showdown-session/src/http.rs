//! Credential exchange over HTTP, against the service's action endpoint.

use std::time::Duration;

use serde_json::Value;

use crate::{
    CredentialExchange, CredentialRequest, SessionError, parse_action_response, parse_assertion,
    replay_upload_form,
};

/// The public login endpoint.
pub const DEFAULT_ACTION_URL: &str = "https://play.pokemonshowdown.com/action.php";

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);

/// A [`CredentialExchange`] that talks to the action endpoint.
///
/// Registered names log in with `act=login` (a form POST); unregistered
/// names, sent with an empty password, fetch an assertion with
/// `act=getassertion`. Replays are uploaded with `act=uploadreplay`.
#[derive(Debug, Clone)]
pub struct ActionEndpoint {
    url: String,
    client: reqwest::Client,
}

impl ActionEndpoint {
    /// Creates an exchange against `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .user_agent(concat!("showdown-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(url, client)
    }

    /// Creates an exchange that reuses an existing HTTP client.
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

impl Default for ActionEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_ACTION_URL)
    }
}

impl CredentialExchange for ActionEndpoint {
    async fn exchange(&self, request: CredentialRequest) -> Result<String, SessionError> {
        let user_id = showdown_protocol::to_id(&request.username);
        let send = if request.password.is_empty() {
            self.client.get(&self.url).query(&[
                ("act", "getassertion"),
                ("userid", user_id.as_str()),
                ("challstr", request.challenge.as_str()),
            ])
        } else {
            self.client.post(&self.url).form(&[
                ("act", "login"),
                ("name", request.username.as_str()),
                ("pass", request.password.as_str()),
                ("challstr", request.challenge.as_str()),
            ])
        };

        let response = send
            .send()
            .await
            .map_err(|err| SessionError::Exchange(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SessionError::Exchange(err.to_string()))?;
        if !status.is_success() {
            return Err(SessionError::Exchange(format!("endpoint returned {status}")));
        }

        tracing::debug!(username = %request.username, "credential exchange answered");
        if request.password.is_empty() {
            parse_assertion(&body)
        } else {
            parse_action_response(&body)
        }
    }

    async fn upload_replay(&self, replay: Value) -> Result<(), SessionError> {
        let form = replay_upload_form(&replay)?;
        let response = self
            .client
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .map_err(|err| SessionError::Exchange(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SessionError::Exchange(err.to_string()))?;
        if !status.is_success() {
            return Err(SessionError::Exchange(format!("endpoint returned {status}")));
        }

        tracing::info!(replay = %replay["id"], outcome = %body.trim(), "replay uploaded");
        Ok(())
    }
}
