// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use courier::client::api::ApiClient;
use courier::client::session::{ChannelSession, ConnectionStatus, SessionConfig};
use courier::config::Config;
use courier::middleware::auth::issue_token;
use courier::routes::build_router;
use courier::state::AppState;
use courier::websocket::events::ChannelEvent;

pub const JWT_SECRET: &str = "test-secret";

pub struct TestServer {
    pub base_url: String,
    pub ws_url: String,
    pub state: AppState,
}

/// Bind the full application to an ephemeral port on an in-memory store.
pub async fn spawn_server() -> TestServer {
    let config = Arc::new(Config {
        database_url: "sqlite::memory:".into(),
        port: 0,
        jwt_secret: JWT_SECRET.into(),
        typing_ttl_ms: 500,
    });
    let db = courier::db::init_pool(&config.database_url)
        .await
        .expect("open in-memory store");
    let state = AppState::new(db, config);
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    TestServer {
        base_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/api/v1/ws"),
        state,
    }
}

pub fn token_for(user: Uuid) -> String {
    issue_token(user, JWT_SECRET, Duration::from_secs(3600)).expect("token")
}

pub fn api_client(server: &TestServer, user: Uuid) -> ApiClient {
    ApiClient::new(server.base_url.clone(), token_for(user)).expect("api client")
}

/// Open a channel session for the user and wait until it is connected and
/// the server has registered the connection for fan-out, so events sent
/// right afterwards cannot slip past it.
pub async fn connected_session(
    server: &TestServer,
    user: Uuid,
) -> (ChannelSession, UnboundedReceiver<ChannelEvent>) {
    let config = SessionConfig::new(server.ws_url.clone(), token_for(user));
    let (session, events) = ChannelSession::connect(config);
    let mut status = session.status_stream();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *status.borrow() == ConnectionStatus::Connected {
                break;
            }
            status.changed().await.expect("status channel closed");
        }
    })
    .await
    .expect("session did not connect");

    tokio::time::timeout(Duration::from_secs(5), async {
        while server.state.registry.connection_count(user).await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("server never registered the connection");

    (session, events)
}

/// Pull events until one matches, failing the test after a timeout.
pub async fn wait_for_event(
    events: &mut UnboundedReceiver<ChannelEvent>,
    mut matches: impl FnMut(&ChannelEvent) -> bool,
) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}
