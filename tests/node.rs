use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::{HeaderMap, HeaderValue},
        Message,
    },
    WebSocketStream,
};

use nodelink::{
    config::Config,
    events::Event,
    gateway::NoopGateway,
    node::{Node, NodeState},
    player::{Player, PlayerState},
    protocol::{ChannelId, GuildId, UserId, VoiceServer, VoiceState},
    router::Listeners,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn guild() -> GuildId {
    GuildId::try_from(987_654_321).unwrap()
}

fn channel() -> ChannelId {
    ChannelId::try_from(1234).unwrap()
}

fn config(port: u16) -> Config {
    Config {
        host: "127.0.0.1".to_owned(),
        port,
        password: "youshallnotpass".to_owned(),
        user_id: 42,
        shard_count: 2,
        client_name: "tests/1.0".to_owned(),
        ..Config::default()
    }
}

async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Accepts one connection, recording its request headers.
async fn accept(
    listener: &TcpListener,
    resumed: bool,
) -> (WebSocketStream<TcpStream>, HeaderMap) {
    let (stream, _) = listener.accept().await.unwrap();
    let headers = Arc::new(Mutex::new(HeaderMap::new()));
    let recorded = Arc::clone(&headers);

    let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        *recorded.lock().unwrap() = request.headers().clone();
        if resumed {
            response
                .headers_mut()
                .insert("session-resumed", HeaderValue::from_static("true"));
        }
        Ok(response)
    };
    let ws = accept_hdr_async(stream, callback).await.unwrap();

    let headers = headers.lock().unwrap().clone();
    (ws, headers)
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let message = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

fn voice_server() -> VoiceServer {
    VoiceServer {
        token: "e5bbc4a783a1af5b".to_owned(),
        guild_id: guild(),
        endpoint: Some("us-west43.discord.gg:80".to_owned()),
    }
}

fn voice_state() -> VoiceState {
    VoiceState {
        session_id: "744d1ac65d00e31fb7ab29fc2436be3e".to_owned(),
        channel_id: Some(channel()),
        guild_id: Some(guild()),
        user_id: Some(UserId::try_from(42).unwrap()),
    }
}

#[tokio::test]
async fn handshake_routing_and_commands() {
    let (listener, port) = listen().await;

    let listeners = Listeners::default();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    listeners.register_event_listener(move |guild_id, event| {
        let _ = events_tx.send((guild_id, event.clone()));
    });
    let (stats_tx, mut stats) = mpsc::unbounded_channel();
    listeners.register_stats_listener(move |stats| {
        let _ = stats_tx.send(stats.clone());
    });

    let node = Node::new(
        Config {
            resume_key: Some("resume-me".to_owned()),
            resume_timeout: 90,
            ..config(port)
        },
        listeners,
    );
    node.connect().unwrap();

    let (mut ws, headers) = accept(&listener, false).await;
    assert_eq!(headers["authorization"], "youshallnotpass");
    assert_eq!(headers["user-id"], "42");
    assert_eq!(headers["num-shards"], "2");
    assert_eq!(headers["client-name"], "tests/1.0");
    assert_eq!(headers["resume-key"], "resume-me");

    assert_eq!(
        next_json(&mut ws).await,
        json!({"op": "configureResuming", "key": "resume-me", "timeout": 90})
    );

    node.wait_until_ready(Some(TIMEOUT)).await.unwrap();
    let player = Player::new(guild(), channel(), node.clone(), Arc::new(NoopGateway));
    player.connect(false).unwrap();

    player.set_volume(80).unwrap();
    assert_eq!(
        next_json(&mut ws).await,
        json!({"op": "volume", "guildId": "987654321", "volume": 80})
    );

    let stats_message = json!({
        "op": "stats",
        "players": 1,
        "playingPlayers": 0,
        "uptime": 123_456,
        "memory": {"free": 1, "used": 2, "allocated": 3, "reservable": 4},
        "cpu": {"cores": 4, "systemLoad": 0.5, "lavalinkLoad": 0.1}
    });
    ws.send(Message::text(stats_message.to_string())).await.unwrap();

    let event_message = json!({
        "op": "event",
        "type": "WebSocketClosedEvent",
        "guildId": "987654321",
        "code": 4006,
        "reason": "Session is no longer valid.",
        "byRemote": true
    });
    ws.send(Message::text(event_message.to_string())).await.unwrap();

    let received = tokio::time::timeout(TIMEOUT, stats.recv()).await.unwrap().unwrap();
    assert_eq!(received.players, 1);
    assert_eq!(received.uptime, 123_456);
    assert_eq!(node.stats().map(|stats| stats.players), Some(1));

    let (guild_id, event) = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(guild_id, guild());
    assert!(matches!(event, Event::WebSocketClosed { code: 4006, .. }));
    assert!(player.reconnect_pending());

    node.disconnect().await;
    assert_eq!(node.state(), NodeState::Disconnecting);
}

#[tokio::test]
async fn fresh_session_after_reconnect_restores_players() {
    let (listener, port) = listen().await;
    let node = Node::new(config(port), Listeners::default());
    node.connect().unwrap();

    let (mut ws, _) = accept(&listener, false).await;
    node.wait_until_ready(Some(TIMEOUT)).await.unwrap();

    let player = Player::new(guild(), channel(), node.clone(), Arc::new(NoopGateway));
    player.connect(false).unwrap();
    player.on_voice_server_update(voice_server()).unwrap();
    player.on_voice_state_update(voice_state()).unwrap();

    let first = next_json(&mut ws).await;
    assert_eq!(first["op"], "voiceUpdate");
    assert_eq!(first["sessionId"], "744d1ac65d00e31fb7ab29fc2436be3e");
    assert_eq!(first["event"]["endpoint"], "us-west43.discord.gg:80");
    assert_eq!(player.state(), PlayerState::Ready);

    // Drop the connection without resuming.
    ws.close(None).await.unwrap();
    drop(ws);

    let (mut ws, _) = tokio::time::timeout(TIMEOUT, accept(&listener, false))
        .await
        .unwrap();
    let again = next_json(&mut ws).await;
    assert_eq!(again, first);

    node.wait_until_ready(Some(TIMEOUT)).await.unwrap();
    tokio::time::timeout(TIMEOUT, async {
        while player.state() != PlayerState::Ready {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    node.disconnect().await;
}
