//! The credential exchange: trading a challenge for a signed assertion.
//!
//! The chat server does not check passwords. Instead the client sends the
//! challenge and its credentials to the service's login endpoint, which
//! answers with an assertion the chat server can verify. The client code
//! only sees the [`CredentialExchange`] trait; how the endpoint is reached
//! is up to the implementation.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::SessionError;

/// Everything the login endpoint needs for one exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    /// The challenge token, exactly as the server sent it.
    pub challenge: String,
    /// Name to log in as.
    pub username: String,
    /// Account password. Empty for unregistered names.
    pub password: String,
}

impl fmt::Debug for CredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Trades a challenge plus credentials for an assertion.
///
/// The client runs the exchange in its own task so a slow endpoint never
/// holds up message processing.
///
/// # Example
///
/// ```rust
/// use showdown_session::{CredentialExchange, CredentialRequest, SessionError};
///
/// /// Hands out a fixed assertion. Only useful against a test server.
/// struct FixedAssertion(String);
///
/// impl CredentialExchange for FixedAssertion {
///     async fn exchange(
///         &self,
///         _request: CredentialRequest,
///     ) -> Result<String, SessionError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
pub trait CredentialExchange: Send + Sync + 'static {
    /// Performs one exchange.
    ///
    /// # Returns
    /// - `Ok(assertion)`: send it with `/trn`
    /// - `Err(SessionError::AuthFailed)`: the endpoint rejected the login
    /// - `Err(SessionError::Exchange)`: the endpoint could not be reached
    fn exchange(
        &self,
        request: CredentialRequest,
    ) -> impl std::future::Future<Output = Result<String, SessionError>> + Send;

    /// Uploads a finished battle's replay, given the payload of the
    /// server's `savereplay` query response.
    ///
    /// Endpoints that cannot store replays keep the default, which fails
    /// with [`SessionError::Unsupported`].
    fn upload_replay(
        &self,
        _replay: Value,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send {
        async { Err(SessionError::Unsupported("replay upload")) }
    }
}

/// Form fields for an `uploadreplay` action: `act=uploadreplay` followed by
/// every field of the `savereplay` payload. Strings are sent as they are,
/// other values as JSON.
pub fn replay_upload_form(replay: &Value) -> Result<Vec<(String, String)>, SessionError> {
    let fields = replay
        .as_object()
        .ok_or_else(|| SessionError::InvalidResponse("replay payload is not an object".into()))?;
    if !fields.contains_key("id") {
        return Err(SessionError::InvalidResponse("replay payload has no id".into()));
    }

    let mut form = vec![("act".to_owned(), "uploadreplay".to_owned())];
    form.extend(fields.iter().filter(|(key, _)| *key != "act").map(|(key, value)| {
        let value = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        (key.clone(), value)
    }));
    Ok(form)
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    #[serde(default)]
    actionsuccess: bool,
    #[serde(default)]
    assertion: Option<String>,
    #[serde(default)]
    actionerror: Option<String>,
}

/// Parses the login endpoint's answer to a password login.
///
/// The body is JSON behind a one character `]` guard:
/// `]{"actionsuccess":true,"assertion":"..."}`.
pub fn parse_action_response(body: &str) -> Result<String, SessionError> {
    let json = body.strip_prefix(']').unwrap_or(body);
    let response: ActionResponse = serde_json::from_str(json)
        .map_err(|err| SessionError::InvalidResponse(err.to_string()))?;

    if !response.actionsuccess {
        let reason = response
            .actionerror
            .unwrap_or_else(|| "login rejected".to_owned());
        return Err(SessionError::AuthFailed(reason));
    }
    let assertion = response
        .assertion
        .ok_or_else(|| SessionError::InvalidResponse("missing assertion".into()))?;
    parse_assertion(&assertion)
}

/// Checks a bare assertion, as returned for unregistered names.
///
/// The endpoint signals rejection with an assertion starting with `;;`
/// followed by the reason.
pub fn parse_assertion(assertion: &str) -> Result<String, SessionError> {
    let assertion = assertion.trim();
    if assertion.is_empty() {
        return Err(SessionError::InvalidResponse("empty assertion".into()));
    }
    if let Some(reason) = assertion.strip_prefix(";;") {
        return Err(SessionError::AuthFailed(reason.to_owned()));
    }
    Ok(assertion.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_response_success() {
        let body = r#"]{"actionsuccess":true,"assertion":"abc,def;123"}"#;
        assert_eq!(parse_action_response(body).unwrap(), "abc,def;123");
    }

    #[test]
    fn test_parse_action_response_without_guard() {
        let body = r#"{"actionsuccess":true,"assertion":"abc"}"#;
        assert_eq!(parse_action_response(body).unwrap(), "abc");
    }

    #[test]
    fn test_parse_action_response_failure() {
        let body = r#"]{"actionsuccess":false,"assertion":null}"#;
        assert!(matches!(
            parse_action_response(body),
            Err(SessionError::AuthFailed(_))
        ));
    }

    #[test]
    fn test_parse_action_response_rejected_assertion() {
        let body = r#"]{"actionsuccess":true,"assertion":";;Wrong password."}"#;
        assert_eq!(
            parse_action_response(body),
            Err(SessionError::AuthFailed("Wrong password.".into()))
        );
    }

    #[test]
    fn test_parse_action_response_garbage() {
        assert!(matches!(
            parse_action_response("<html>"),
            Err(SessionError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_assertion_plain() {
        assert_eq!(parse_assertion("abc\n").unwrap(), "abc");
        assert!(matches!(
            parse_assertion(";;Name taken"),
            Err(SessionError::AuthFailed(_))
        ));
    }

    #[test]
    fn test_replay_upload_form_flattens_payload() {
        let replay = serde_json::json!({
            "id": "battle-gen9ou-1",
            "log": "|j|raj",
            "rating": 1500,
        });
        let form = replay_upload_form(&replay).unwrap();

        assert_eq!(form[0], ("act".to_owned(), "uploadreplay".to_owned()));
        assert!(form.contains(&("id".to_owned(), "battle-gen9ou-1".to_owned())));
        assert!(form.contains(&("log".to_owned(), "|j|raj".to_owned())));
        assert!(form.contains(&("rating".to_owned(), "1500".to_owned())));
    }

    #[test]
    fn test_replay_upload_form_rejects_payload_without_id() {
        assert!(matches!(
            replay_upload_form(&serde_json::json!({"log": "x"})),
            Err(SessionError::InvalidResponse(_))
        ));
        assert!(matches!(
            replay_upload_form(&serde_json::json!("battle-1")),
            Err(SessionError::InvalidResponse(_))
        ));
    }

    struct LoginOnly;

    impl CredentialExchange for LoginOnly {
        async fn exchange(&self, _request: CredentialRequest) -> Result<String, SessionError> {
            Ok("assertion".into())
        }
    }

    #[tokio::test]
    async fn test_upload_replay_default_is_unsupported() {
        let result = LoginOnly.upload_replay(serde_json::json!({"id": "battle-1"})).await;
        assert!(matches!(result, Err(SessionError::Unsupported(_))));
    }

    #[test]
    fn test_credential_request_debug_redacts_password() {
        let request = CredentialRequest {
            challenge: "4|abc".into(),
            username: "Bot".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}
