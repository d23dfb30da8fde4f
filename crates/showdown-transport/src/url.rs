//! Server URL helpers.
//!
//! The service exposes two endpoints on the same host: a SockJS endpoint,
//! whose path embeds a random server id and session id, and a plain
//! WebSocket endpoint.

use rand::Rng;

/// Builds a SockJS WebSocket URL for `host` (e.g. `sim3.psim.us:8000`).
///
/// The path carries a zero-padded three digit server id and an eight letter
/// session id, both random, as SockJS expects:
/// `ws://{host}/showdown/{nnn}/{abcdefgh}/websocket`.
pub fn sockjs_url(host: &str) -> String {
    let mut rng = rand::rng();
    let server: u16 = rng.random_range(0..1000);
    let session: String = (0..8)
        .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
        .collect();
    format!("ws://{host}/showdown/{server:03}/{session}/websocket")
}

/// Builds the plain WebSocket URL for `host`.
pub fn websocket_url(host: &str) -> String {
    format!("ws://{host}/showdown/websocket")
}
