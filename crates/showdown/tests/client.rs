//! End-to-end tests: a full client against an in-memory server.

use std::sync::Arc;
use std::time::Duration;

use showdown::{
    BoxError, ChatMessage, Client, ClientBuilder, ClientError, Context, CredentialExchange,
    CredentialRequest, Credentials, Framing, HandlerResult, Hook, Query, ReconnectPolicy, RoomError,
    ProtocolError, RoomId, SendOptions, ServerConfig, Session, SessionError,
};
use serde_json::Value;
use showdown_transport::{MemoryConnector, MemoryListener, MemoryPeer};
use tokio::sync::{Notify, broadcast, mpsc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn builder(framing: Framing) -> (ClientBuilder<MemoryConnector>, MemoryListener) {
    let (connector, listener) = MemoryConnector::pair();
    let builder = Client::builder(connector)
        .server(ServerConfig::new("mem://showdown", framing))
        .send_throttle(Duration::ZERO);
    (builder, listener)
}

async fn accept(listener: &mut MemoryListener) -> MemoryPeer {
    tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client connects")
        .expect("connector alive")
}

async fn line(peer: &mut MemoryPeer) -> String {
    tokio::time::timeout(Duration::from_secs(5), peer.recv())
        .await
        .expect("line in time")
        .expect("connection open")
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

async fn report(rx: &mut broadcast::Receiver<Arc<ClientError>>) -> Arc<ClientError> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("report in time")
        .expect("diagnostics open")
}

/// Hands out a fixed assertion and checks the challenge it was given.
struct FixedAssertion;

impl CredentialExchange for FixedAssertion {
    async fn exchange(&self, request: CredentialRequest) -> Result<String, SessionError> {
        if request.challenge != "4|abcdef" {
            return Err(SessionError::Exchange(format!(
                "unexpected challenge {:?}",
                request.challenge
            )));
        }
        Ok("assertion".to_owned())
    }
}

/// Holds every exchange until the gate opens.
struct Gated(Arc<Notify>);

impl CredentialExchange for Gated {
    async fn exchange(&self, _request: CredentialRequest) -> Result<String, SessionError> {
        self.0.notified().await;
        Ok("late assertion".to_owned())
    }
}

/// Accepts replay uploads and hands the payloads to the test.
struct ReplayStore(mpsc::UnboundedSender<Value>);

impl CredentialExchange for ReplayStore {
    async fn exchange(&self, _request: CredentialRequest) -> Result<String, SessionError> {
        Err(SessionError::NotConfigured)
    }

    async fn upload_replay(&self, replay: Value) -> Result<(), SessionError> {
        self.0
            .send(replay)
            .map_err(|err| SessionError::Exchange(err.to_string()))
    }
}

async fn fail(_msg: ChatMessage, _ctx: Context) -> HandlerResult {
    Err("nope".into())
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_connect_fires_on_connect() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder
        .on_connect(|ctx| async move {
            ctx.handle().join("lobby")?;
            Ok::<(), BoxError>(())
        })
        .build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    assert_eq!(peer.url(), "mem://showdown");
    assert_eq!(line(&mut peer).await, "|/join lobby");
    assert!(handle.is_connected());

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_connect_failure_without_policy_returns_error() {
    let (builder, listener) = builder(Framing::Raw);
    drop(listener);

    let err = builder.build().run().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

#[tokio::test]
async fn test_run_server_hangup_without_policy_returns_disconnected() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();
    drop(peer);

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Disconnected));
    assert!(!handle.is_connected());
}

// ---------------------------------------------------------------------------
// Rooms and dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lobby_payload_creates_room_and_reaches_catch_all() {
    let (builder, mut listener) = builder(Framing::Raw);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (init_tx, mut init_rx) = mpsc::unbounded_channel();
    let client = builder
        .on_receive(move |msg, _ctx| {
            let tx = tx.clone();
            async move {
                tx.send(msg.line().to_owned())?;
                Ok::<(), BoxError>(())
            }
        })
        .on_room_init(move |room, _ctx| {
            let init_tx = init_tx.clone();
            async move {
                init_tx.send(room.id().clone())?;
                Ok::<(), BoxError>(())
            }
        })
        .build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let peer = accept(&mut listener).await;
    peer.send(">lobby\ninit|chat\n|raj|hi everyone");

    assert_eq!(next(&mut rx).await, "init|chat");
    assert_eq!(next(&mut rx).await, "|raj|hi everyone");
    assert_eq!(next(&mut init_rx).await, RoomId::new("lobby"));

    let lobby = handle.room(&RoomId::new("lobby")).expect("lobby tracked");
    assert!(lobby.logs().iter().any(|entry| entry == "|raj|hi everyone"));
    assert!(rx.try_recv().is_err());

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failing_handler_does_not_block_siblings() {
    let (builder, mut listener) = builder(Framing::Raw);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder
        .hook(Hook::chat_message(fail).named("broken"))
        .on_chat_message(move |msg, _ctx| {
            let tx = tx.clone();
            async move {
                tx.send(msg.content)?;
                Ok::<(), BoxError>(())
            }
        })
        .build();
    let handle = client.handle();
    let mut diagnostics = handle.diagnostics();
    let run = tokio::spawn(client.run());

    let peer = accept(&mut listener).await;
    peer.send(">lobby\n|init|chat\n|c|raj|one\n|c|raj|two");

    assert_eq!(next(&mut rx).await, "one");
    assert_eq!(next(&mut rx).await, "two");
    for _ in 0..2 {
        match &*report(&mut diagnostics).await {
            ClientError::Handler { handler, message } => {
                assert_eq!(handler, "broken");
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected report {other}"),
        }
    }

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stuck_handler_does_not_block_siblings_or_later_records() {
    let (builder, mut listener) = builder(Framing::Raw);
    let (all_tx, mut all_rx) = mpsc::unbounded_channel();
    let (slow_tx, mut slow_rx) = mpsc::unbounded_channel();
    let client = builder
        .hook(
            Hook::chat_message(|_msg, _ctx| std::future::pending::<HandlerResult>())
                .named("stuck"),
        )
        .on_chat_message(move |msg, _ctx| {
            let slow_tx = slow_tx.clone();
            async move {
                let n: u64 = msg.content.parse()?;
                tokio::time::sleep(Duration::from_secs(4 - n)).await;
                slow_tx.send(n)?;
                Ok::<(), BoxError>(())
            }
        })
        .on_receive(move |msg, _ctx| {
            let all_tx = all_tx.clone();
            async move {
                all_tx.send(msg.line().to_owned())?;
                Ok::<(), BoxError>(())
            }
        })
        .build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let peer = accept(&mut listener).await;
    peer.send(">lobby\n|init|chat\n|c|raj|0\n|c|raj|1\n|c|raj|2\n|c|raj|3");

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(next(&mut all_rx).await);
    }
    assert_eq!(seen[0], "|init|chat");
    assert_eq!(seen[4], "|c|raj|3");

    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(next(&mut slow_rx).await);
    }
    assert_eq!(order, [0, 1, 2, 3]);

    peer.send(">lobby\n|c|raj|after");
    assert_eq!(next(&mut all_rx).await, "|c|raj|after");

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_room_and_bad_record_are_reported_not_fatal() {
    let (builder, mut listener) = builder(Framing::Raw);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder
        .on_chat_message(move |msg, _ctx| {
            let tx = tx.clone();
            async move {
                tx.send(msg.room)?;
                Ok::<(), BoxError>(())
            }
        })
        .build();
    let handle = client.handle();
    let mut diagnostics = handle.diagnostics();
    let run = tokio::spawn(client.run());

    let peer = accept(&mut listener).await;
    peer.send(">nowhere\n|c|raj|hi");
    let unknown = report(&mut diagnostics).await;
    assert!(matches!(
        &*unknown,
        ClientError::Room(RoomError::UnknownRoom(id)) if *id == RoomId::new("nowhere")
    ));
    assert_eq!(next(&mut rx).await, RoomId::new("nowhere"));

    peer.send("|bad type!|x\n|c|raj|still here");
    let decode = report(&mut diagnostics).await;
    assert!(matches!(&*decode, ClientError::Protocol(_)));
    assert_eq!(next(&mut rx).await, RoomId::Global);

    assert!(handle.rooms().is_empty());
    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_once_hook_fires_once() {
    let (builder, mut listener) = builder(Framing::Raw);
    let (once_tx, mut once_rx) = mpsc::unbounded_channel();
    let (all_tx, mut all_rx) = mpsc::unbounded_channel();
    let client = builder
        .hook(
            Hook::any(move |msg, _ctx| {
                let once_tx = once_tx.clone();
                async move {
                    once_tx.send(msg.line().to_owned())?;
                    Ok::<(), BoxError>(())
                }
            })
            .once(),
        )
        .on_receive(move |msg, _ctx| {
            let all_tx = all_tx.clone();
            async move {
                all_tx.send(msg.line().to_owned())?;
                Ok::<(), BoxError>(())
            }
        })
        .build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let peer = accept(&mut listener).await;
    peer.send("|popup|first");
    peer.send("|popup|second");

    assert_eq!(next(&mut all_rx).await, "|popup|first");
    assert_eq!(next(&mut all_rx).await, "|popup|second");
    assert_eq!(next(&mut once_rx).await, "|popup|first");
    assert!(once_rx.try_recv().is_err());

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_hook_registered_at_runtime_receives_messages() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    handle
        .hook(Hook::private_message(move |pm, _ctx| {
            let tx = tx.clone();
            async move {
                tx.send(pm.content)?;
                Ok::<(), BoxError>(())
            }
        }))
        .await
        .unwrap();
    peer.send("|pm| Zarel| Bot|hello there");

    assert_eq!(next(&mut rx).await, "hello there");
    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_hook_on_stopped_client_fails_closed() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let _peer = accept(&mut listener).await;
    handle.close();
    run.await.unwrap().unwrap();

    let err = handle.hook(Hook::any(|_msg, _ctx| async { Ok::<(), BoxError>(()) })).await;
    assert!(matches!(err, Err(ClientError::Closed)));
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_query_resolves_with_response_payload() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();

    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.query(Query::user_details("Zarel")).await }
    });
    assert_eq!(line(&mut peer).await, "|/cmd userdetails zarel");
    peer.send(r#"|queryresponse|userdetails|{"userid":"zarel","group":"~"}"#);

    let data = pending.await.unwrap().unwrap();
    assert_eq!(data["group"], "~");

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_query_without_response_times_out() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.query_timeout(Duration::from_secs(10)).build();
    let handle = client.handle();
    let mut diagnostics = handle.diagnostics();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();

    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.query(Query::Rooms).await }
    });
    assert_eq!(line(&mut peer).await, "|/cmd rooms");

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Timeout(t) if t == Duration::from_secs(10)));
    assert!(matches!(&*report(&mut diagnostics).await, ClientError::Timeout(_)));

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_query_same_key_conflicts_and_first_still_resolves() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();

    let first = tokio::spawn({
        let handle = handle.clone();
        async move { handle.query(Query::Rooms).await }
    });
    assert_eq!(line(&mut peer).await, "|/cmd rooms");

    let second = handle.query(Query::Rooms).await.unwrap_err();
    assert!(matches!(second, ClientError::Conflict(ref key) if key == "rooms"));

    peer.send(r#"|queryresponse|rooms|{"chat":[{"title":"Lobby"}]}"#);
    let data = first.await.unwrap().unwrap();
    assert_eq!(data["chat"][0]["title"], "Lobby");

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_query_resolves_while_delayed_line_waits() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.query_timeout(Duration::from_secs(10)).build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();

    handle
        .send_with("lobby|later", SendOptions::delayed(Duration::from_secs(60)))
        .unwrap();
    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.query(Query::Rooms).await }
    });
    assert_eq!(line(&mut peer).await, "|/cmd rooms");
    peer.send(r#"|queryresponse|rooms|{"chat":[]}"#);

    let data = pending.await.unwrap().unwrap();
    assert!(data["chat"].as_array().is_some_and(|rooms| rooms.is_empty()));

    let delayed = tokio::time::timeout(Duration::from_secs(120), peer.recv())
        .await
        .expect("delayed line sent")
        .expect("connection open");
    assert_eq!(delayed, "lobby|later");

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_query_with_unreadable_payload_fails_with_decode_error() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();

    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.query(Query::user_details("Zarel")).await }
    });
    assert_eq!(line(&mut peer).await, "|/cmd userdetails zarel");
    peer.send("|queryresponse|userdetails|{bad json");

    let err = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("query fails before its timeout")
        .unwrap()
        .unwrap_err();
    let ClientError::Protocol(ProtocolError::Decode { record, .. }) = err else {
        panic!("expected decode error, got {err}");
    };
    assert!(record.ends_with("{bad json"), "{record}");

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_save_replay_response_is_uploaded() {
    let (builder, mut listener) = builder(Framing::Raw);
    let (tx, mut uploads) = mpsc::unbounded_channel();
    let client = builder.credential_exchange(ReplayStore(tx)).build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();
    peer.send(r#"|queryresponse|savereplay|{"id":"battle-gen9ou-1","log":"|j|Bot"}"#);

    let replay = next(&mut uploads).await;
    assert_eq!(replay["id"], "battle-gen9ou-1");
    assert_eq!(replay["log"], "|j|Bot");

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_close_fails_pending_query_with_closed() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();

    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.query(Query::Rooms).await }
    });
    assert_eq!(line(&mut peer).await, "|/cmd rooms");
    handle.close();

    assert!(matches!(pending.await.unwrap(), Err(ClientError::Closed)));
    run.await.unwrap().unwrap();
    assert!(matches!(handle.query(Query::Rooms).await, Err(ClientError::Closed)));
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_autologin_completes_handshake() {
    let (builder, mut listener) = builder(Framing::Raw);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder
        .credentials(Credentials::new("Bot Name", "pw"))
        .credential_exchange(FixedAssertion)
        .on_login(move |session: Session, _ctx| {
            let tx = tx.clone();
            async move {
                tx.send(session.username)?;
                Ok::<(), BoxError>(())
            }
        })
        .build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    peer.send("|challstr|4|abcdef");
    assert_eq!(line(&mut peer).await, "|/trn Bot Name,0,assertion");
    peer.send("|updateuser| Bot Name|1|1|{}");

    assert_eq!(next(&mut rx).await.as_deref(), Some("Bot Name"));
    assert!(handle.session().is_authenticated());

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_autologin_rejected_ends_run_even_with_policy() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder
        .credentials(Credentials::new("Bot Name", "pw"))
        .credential_exchange(FixedAssertion)
        .reconnect(ReconnectPolicy::default())
        .build();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    peer.send("|challstr|4|abcdef");
    assert_eq!(line(&mut peer).await, "|/trn Bot Name,0,assertion");
    peer.send("|updateuser| Someone Else|1|1");

    let err = run.await.unwrap().unwrap_err();
    assert!(err.is_auth_failure(), "got {err}");
}

#[tokio::test]
async fn test_manual_login_resolves_with_session() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.credential_exchange(FixedAssertion).build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    peer.send("|challstr|4|abcdef");
    handle
        .wait_for(|state| state.session.challenge.is_some())
        .await
        .unwrap();

    let login = tokio::spawn({
        let handle = handle.clone();
        async move { handle.login(Credentials::new("Bot Name", "")).await }
    });
    assert_eq!(line(&mut peer).await, "|/trn Bot Name,0,assertion");
    peer.send("|updateuser| Bot Name|1|1|{}");

    let session = login.await.unwrap().unwrap();
    assert_eq!(session.username.as_deref(), Some("Bot Name"));

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_name_taken_during_exchange_reports_once() {
    let (builder, mut listener) = builder(Framing::Raw);
    let gate = Arc::new(Notify::new());
    let client = builder.credential_exchange(Gated(Arc::clone(&gate))).build();
    let handle = client.handle();
    let mut diagnostics = handle.diagnostics();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    peer.send("|challstr|4|abcdef");
    handle
        .wait_for(|state| state.session.challenge.is_some())
        .await
        .unwrap();

    let login = tokio::spawn({
        let handle = handle.clone();
        async move { handle.login(Credentials::new("Bot Name", "")).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    peer.send("|nametaken|Bot Name|Someone is using that name");

    let err = login.await.unwrap().unwrap_err();
    assert!(err.is_auth_failure(), "got {err}");

    gate.notify_one();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(diagnostics.try_recv().is_err());
    assert!(
        tokio::time::timeout(Duration::from_secs(1), peer.recv())
            .await
            .is_err(),
        "stale assertion was submitted"
    );

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_manual_login_before_challenge_fails() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder.credential_exchange(FixedAssertion).build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let _peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();

    let err = handle
        .login(Credentials::new("Bot Name", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Session(SessionError::NoChallenge)));

    handle.close();
    run.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_reconnect_clears_rooms_and_refires_on_connect() {
    let (builder, mut listener) = builder(Framing::Raw);
    let (tx, mut connects) = mpsc::unbounded_channel();
    let client = builder
        .reconnect(ReconnectPolicy {
            initial_backoff: Duration::from_secs(1),
            jitter: 0.0,
            ..ReconnectPolicy::default()
        })
        .on_connect(move |_ctx| {
            let tx = tx.clone();
            async move {
                tx.send(())?;
                Ok::<(), BoxError>(())
            }
        })
        .build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut first = accept(&mut listener).await;
    next(&mut connects).await;
    first.send(">lobby\n|init|chat");
    handle
        .wait_for(|state| state.rooms.contains_key(&RoomId::new("lobby")))
        .await
        .unwrap();

    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.query(Query::Rooms).await }
    });
    assert_eq!(line(&mut first).await, "|/cmd rooms");
    drop(first);

    assert!(matches!(pending.await.unwrap(), Err(ClientError::Disconnected)));
    let _second = accept(&mut listener).await;
    next(&mut connects).await;
    assert!(handle.rooms().is_empty());
    assert!(handle.is_connected());

    handle.close();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_max_attempts() {
    let (builder, mut listener) = builder(Framing::Raw);
    let client = builder
        .reconnect(ReconnectPolicy {
            jitter: 0.0,
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        })
        .build();
    let run = tokio::spawn(client.run());

    let first = accept(&mut listener).await;
    drop(listener);
    drop(first);

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

// ---------------------------------------------------------------------------
// Intervals
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_interval_ticks_on_its_period() {
    let (builder, mut listener) = builder(Framing::Raw);
    let (tx, mut ticks) = mpsc::unbounded_channel();
    let client = builder
        .every(Duration::from_secs(10), move |_ctx| {
            let tx = tx.clone();
            async move {
                tx.send(())?;
                Ok::<(), BoxError>(())
            }
        })
        .build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let _peer = accept(&mut listener).await;
    handle.wait_for(|state| state.connected).await.unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;

    let mut count = 0;
    while ticks.try_recv().is_ok() {
        count += 1;
    }
    assert_eq!(count, 3);

    handle.close();
    run.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// SockJS
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sockjs_session_open_payload_and_close() {
    let (builder, mut listener) = builder(Framing::SockJs);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder
        .on_connect(|ctx| async move {
            ctx.handle().join("lobby")?;
            Ok::<(), BoxError>(())
        })
        .on_chat_message(move |msg, _ctx| {
            let tx = tx.clone();
            async move {
                tx.send((msg.room, msg.content))?;
                Ok::<(), BoxError>(())
            }
        })
        .build();
    let handle = client.handle();
    let run = tokio::spawn(client.run());

    let mut peer = accept(&mut listener).await;
    assert!(!handle.is_connected());
    peer.send("o");
    assert_eq!(line(&mut peer).await, r#"["|/join lobby"]"#);

    peer.send(r#"a[">lobby\n|init|chat\n|c|raj|hi"]"#);
    assert_eq!(
        next(&mut rx).await,
        (RoomId::new("lobby"), "hi".to_owned())
    );

    peer.send(r#"c[3000,"Go away"]"#);
    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Disconnected));
}
