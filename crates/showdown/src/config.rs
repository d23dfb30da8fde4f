//! Client configuration.
//!
//! Every struct here implements `Default` and `Deserialize` with
//! `#[serde(default)]`, so a config file only needs the fields it changes.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use showdown_protocol::Framing;
use showdown_room::RoomConfig;
use showdown_session::SessionConfig;
use showdown_transport::{sockjs_url, websocket_url};

use crate::ClientError;

/// Host of the public main server.
pub const DEFAULT_HOST: &str = "sim3.psim.us:8000";

/// Where the service publishes a server's host and port, by server id.
pub const SERVER_INFO_URL: &str = "https://pokemonshowdown.com/servers/{id}.json";

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Settings for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where to connect.
    pub server: ServerConfig,
    /// Login settings.
    pub session: SessionConfig,
    /// Room tracking settings.
    pub rooms: RoomConfig,
    /// How long a query waits for its response.
    pub query_timeout: Duration,
    /// Pause after each outbound line. The server drops clients that send
    /// too fast.
    pub send_throttle: Duration,
    /// Reject over-long chat content instead of truncating it.
    pub strict_length: bool,
    /// What to do when the connection drops. `None` ends
    /// [`Client::run`](crate::Client::run) with the error.
    pub reconnect: Option<ReconnectPolicy>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            rooms: RoomConfig::default(),
            query_timeout: Duration::from_secs(10),
            send_throttle: Duration::from_millis(500),
            strict_length: false,
            reconnect: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// The server endpoint and how its frames are wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket URL.
    pub url: String,
    /// Framing used on that URL.
    pub framing: Framing,
    /// Host the SockJS URL was built for. Each connect attempt then gets a
    /// fresh session path on it.
    pub host: Option<String>,
}

impl ServerConfig {
    /// An explicit URL and framing.
    pub fn new(url: impl Into<String>, framing: Framing) -> Self {
        Self {
            url: url.into(),
            framing,
            host: None,
        }
    }

    /// The SockJS endpoint of `host`. Every connect attempt uses a new
    /// random session path.
    pub fn sockjs(host: &str) -> Self {
        Self {
            host: Some(host.to_owned()),
            ..Self::new(sockjs_url(host), Framing::SockJs)
        }
    }

    /// The plain WebSocket endpoint of `host`.
    pub fn websocket(host: &str) -> Self {
        Self::new(websocket_url(host), Framing::Raw)
    }

    /// The URL for the next connect attempt.
    pub fn connect_url(&self) -> String {
        match (&self.host, self.framing) {
            (Some(host), Framing::SockJs) => sockjs_url(host),
            _ => self.url.clone(),
        }
    }

    /// Looks up the SockJS endpoint of the server registered as
    /// `server_id` (`showdown` for the main server).
    ///
    /// # Errors
    /// Returns [`ClientError::ServerInfo`] if the lookup fails or the
    /// service has no usable entry for the id.
    #[cfg(feature = "http")]
    pub async fn lookup(server_id: &str) -> Result<Self, ClientError> {
        let url = SERVER_INFO_URL.replace("{id}", server_id);
        tracing::info!(%url, "requesting server info");

        let unavailable = |err: reqwest::Error| {
            ClientError::ServerInfo(format!("info for server {server_id:?} is unavailable: {err}"))
        };
        let body = reqwest::get(&url)
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(unavailable)?
            .text()
            .await
            .map_err(unavailable)?;

        let host = parse_server_info(&body)?;
        tracing::debug!(%server_id, %host, "server resolved");
        Ok(Self::sockjs(&host))
    }
}

/// Extracts `host:port` from a server info document.
///
/// # Errors
/// Returns [`ClientError::ServerInfo`] if the body is not JSON or lacks a
/// host or port.
pub fn parse_server_info(body: &str) -> Result<String, ClientError> {
    let malformed =
        |reason: &str| ClientError::ServerInfo(format!("malformed server info: {reason}"));

    let info: Value = serde_json::from_str(body).map_err(|err| malformed(&err.to_string()))?;
    let host = info
        .get("host")
        .and_then(Value::as_str)
        .filter(|host| !host.is_empty())
        .ok_or_else(|| malformed("missing host"))?;
    let port = match info.get("port") {
        Some(Value::Number(port)) => port.to_string(),
        Some(Value::String(port)) if !port.is_empty() => port.clone(),
        _ => return Err(malformed("missing port")),
    };
    Ok(format!("{host}:{port}"))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::websocket(DEFAULT_HOST)
    }
}

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff between reconnect attempts.
///
/// The delay before attempt `n` (zero-based) is
/// `min(max_backoff, initial_backoff * multiplier^n)`, varied by up to
/// `±jitter` of itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub initial_backoff: Duration,
    /// Upper bound on the delay.
    pub max_backoff: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter factor, 0.0 to 1.0.
    pub jitter: f64,
    /// Attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (zero-based), or `None`
    /// once the attempts are used up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }

        let initial = self.initial_backoff.as_secs_f64();
        let max = self.max_backoff.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = (initial * self.multiplier.max(1.0).powi(exponent)).min(max);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            1.0 + rand::rng().random_range(-jitter..=jitter)
        } else {
            1.0
        };
        Some(Duration::from_secs_f64((base * factor).clamp(0.0, max)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> ReconnectPolicy {
        ReconnectPolicy {
            jitter: 0.0,
            ..ReconnectPolicy::default()
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = no_jitter();
        assert_eq!(policy.delay(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay(3), Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = no_jitter();
        assert_eq!(policy.delay(10), Some(Duration::from_secs(60)));
        assert_eq!(policy.delay(u32::MAX), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_delay_stops_after_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: Some(2),
            ..no_jitter()
        };
        assert!(policy.delay(1).is_some());
        assert_eq!(policy.delay(2), None);
    }

    #[test]
    fn test_delay_jitter_stays_in_range() {
        let policy = ReconnectPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay(2).unwrap().as_secs_f64();
            assert!((3.19..=4.81).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.query_timeout, Duration::from_secs(10));
        assert_eq!(config.server.framing, Framing::Raw);
        assert_eq!(config.server.url, "ws://sim3.psim.us:8000/showdown/websocket");
        assert!(config.reconnect.is_none());
        assert!(!config.session.autologin);
    }

    #[test]
    fn test_client_config_partial_deserialize() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"server":{"url":"ws://localhost:8000/showdown/websocket"},"strict_length":true}"#,
        )
        .unwrap();
        assert_eq!(config.server.url, "ws://localhost:8000/showdown/websocket");
        assert_eq!(config.server.framing, Framing::Raw);
        assert!(config.strict_length);
        assert_eq!(config.rooms.max_logs, 5000);
    }

    #[test]
    fn test_sockjs_server_config() {
        let server = ServerConfig::sockjs("localhost:8000");
        assert_eq!(server.framing, Framing::SockJs);
        assert!(server.url.ends_with("/websocket"));
        assert!(server.url.starts_with("ws://localhost:8000/showdown/"));
    }

    #[test]
    fn test_connect_url_sockjs_gets_fresh_session_path() {
        let server = ServerConfig::sockjs("localhost:8000");
        let urls: Vec<String> = (0..8).map(|_| server.connect_url()).collect();

        for url in &urls {
            assert!(url.starts_with("ws://localhost:8000/showdown/"), "{url}");
            assert!(url.ends_with("/websocket"), "{url}");
        }
        assert!(
            urls.iter().any(|url| url != &urls[0]),
            "session path never changed: {urls:?}"
        );
    }

    #[test]
    fn test_connect_url_explicit_url_is_kept() {
        let server = ServerConfig::new(
            "ws://localhost:8000/showdown/123/abcdefgh/websocket",
            Framing::SockJs,
        );
        assert_eq!(server.connect_url(), server.url);

        let raw = ServerConfig::websocket("localhost:8000");
        assert_eq!(raw.connect_url(), "ws://localhost:8000/showdown/websocket");
    }

    #[test]
    fn test_parse_server_info_numeric_port() {
        let body = r#"{"id":"showdown","host":"sim3.psim.us","port":8000}"#;
        let host = parse_server_info(body).unwrap();
        assert_eq!(host, "sim3.psim.us:8000");
    }

    #[test]
    fn test_parse_server_info_string_port() {
        let host = parse_server_info(r#"{"host":"example.psim.us","port":"443"}"#).unwrap();
        assert_eq!(host, "example.psim.us:443");
    }

    #[test]
    fn test_parse_server_info_missing_port_is_error() {
        let err = parse_server_info(r#"{"host":"sim3.psim.us"}"#).unwrap_err();
        assert!(matches!(err, ClientError::ServerInfo(ref reason) if reason.contains("port")));
    }

    #[test]
    fn test_parse_server_info_not_json_is_error() {
        let err = parse_server_info("<html>not found</html>").unwrap_err();
        assert!(matches!(err, ClientError::ServerInfo(_)));
    }
}
