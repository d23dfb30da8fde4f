use std::time::Duration;

use showdown::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `!echo TEXT` in any joined room repeats TEXT.
async fn echo(msg: ChatMessage, ctx: Context) -> HandlerResult {
    let Some(text) = msg.content.strip_prefix("!echo ") else {
        return Ok(());
    };
    if msg.author.is(ctx.session().username.as_deref().unwrap_or_default()) {
        return Ok(());
    }
    ctx.handle().reply(&msg, text)?;
    Ok(())
}

/// Private messages are answered with their own text.
async fn echo_private(pm: PrivateMessage, ctx: Context) -> HandlerResult {
    if pm.author.is(ctx.session().username.as_deref().unwrap_or_default()) {
        return Ok(());
    }
    ctx.handle().private_message(&pm.author.id, &pm.content)?;
    Ok(())
}

async fn report_rooms(ctx: Context) -> HandlerResult {
    tracing::info!(rooms = ctx.rooms().len(), "still here");
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let rooms: Vec<String> = std::env::args().skip(1).collect();
    let rooms = if rooms.is_empty() { vec!["lobby".to_owned()] } else { rooms };

    let mut builder = Client::builder(WebSocketConnector::new())
        .action_endpoint()
        .reconnect(ReconnectPolicy::default())
        .on_connect(move |ctx| {
            let rooms = rooms.clone();
            async move {
                for room in &rooms {
                    ctx.handle().join(room)?;
                }
                Ok::<(), BoxError>(())
            }
        })
        .on_login(|session, _ctx| async move {
            tracing::info!(username = ?session.username, "logged in");
            Ok::<(), BoxError>(())
        })
        .on_chat_message(echo)
        .on_private_message(echo_private)
        .every(Duration::from_secs(300), report_rooms);

    if let (Ok(username), Ok(password)) = (
        std::env::var("SHOWDOWN_USERNAME"),
        std::env::var("SHOWDOWN_PASSWORD"),
    ) {
        builder = builder.credentials(Credentials::new(username, password));
    }
    if let Ok(server_id) = std::env::var("SHOWDOWN_SERVER") {
        builder = builder.server(ServerConfig::lookup(&server_id).await?);
    }

    let client = builder.build();
    let mut diagnostics = client.handle().diagnostics();
    tokio::spawn(async move {
        loop {
            match diagnostics.recv().await {
                Ok(err) => tracing::warn!(error = %err, "client reported an error"),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "diagnostics lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    client.run().await?;
    Ok(())
}
