//! IPC transport against a scripted host listening on a local socket

mod common;

use common::{settle, Recorder, GENERATIONS};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use global_shortcut::execution::Command;
use global_shortcut::{
    create_callback_channel, BridgeConfig, CommandName, CommandTransport, GlobalShortcut,
    IpcConfig, IpcTransport, ShortcutError, TransportError, TransportGeneration,
};

/// What the scripted host does with one request
enum Reply {
    Frames(Vec<Value>),
    Silent,
    Hangup,
}

/// Accept one connection and answer each request with `script`
async fn spawn_host<F>(mut script: F) -> u16
where
    F: FnMut(&Value) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["kind"], "request");

            match script(&request) {
                Reply::Frames(frames) => {
                    for frame in frames {
                        let line = format!("{frame}\n");
                        write_half.write_all(line.as_bytes()).await.unwrap();
                    }
                }
                Reply::Silent => {}
                Reply::Hangup => return,
            }
        }
    });

    port
}

fn config(port: u16, generation: TransportGeneration) -> BridgeConfig {
    BridgeConfig {
        generation,
        ipc: IpcConfig {
            port,
            ..IpcConfig::default()
        },
        ..BridgeConfig::default()
    }
}

fn response(request: &Value, ok: Value) -> Value {
    json!({"kind": "response", "id": request["id"], "ok": ok})
}

fn event(channel: &Value, payload: Value) -> Value {
    json!({"kind": "event", "channel": channel, "payload": payload})
}

/// Host that registers descriptors, emits two triggers right after each
/// registration and pushes a stale trigger ahead of every query
fn echo_host() -> impl FnMut(&Value) -> Reply + Send + 'static {
    let mut registered: HashMap<String, Value> = HashMap::new();
    let mut released: Vec<Value> = Vec::new();

    move |request: &Value| {
        let payload = &request["payload"];
        match request["cmd"].as_str().unwrap() {
            "plugin:globalShortcut|register" => {
                let shortcut = payload["shortcut"].as_str().unwrap().to_string();
                let handler = payload["handler"].clone();
                registered.insert(shortcut.clone(), handler.clone());
                Reply::Frames(vec![
                    response(request, Value::Null),
                    event(&handler, json!(shortcut)),
                    event(&handler, json!({ "shortcut": shortcut })),
                ])
            }
            "plugin:globalShortcut|is_registered" => {
                let shortcut = payload["shortcut"].as_str().unwrap();
                let mut frames: Vec<Value> = released
                    .iter()
                    .map(|handler| event(handler, json!(shortcut)))
                    .collect();
                frames.push(response(request, json!(registered.contains_key(shortcut))));
                Reply::Frames(frames)
            }
            "plugin:globalShortcut|unregister" => {
                let shortcut = payload["shortcut"].as_str().unwrap();
                released.extend(registered.remove(shortcut));
                Reply::Frames(vec![response(request, Value::Null)])
            }
            other => panic!("Unexpected command {other}"),
        }
    }
}

#[tokio::test]
async fn facade_round_trip_over_ipc() {
    for generation in GENERATIONS {
        let port = spawn_host(echo_host()).await;
        let shortcuts = GlobalShortcut::connect(&config(port, generation)).await.unwrap();
        let recorder = Recorder::new();

        shortcuts
            .register("CommandOrControl+Shift+C", recorder.handler())
            .await
            .unwrap();
        assert_eq!(
            recorder.wait_for(2).await,
            vec!["CommandOrControl+Shift+C", "CommandOrControl+Shift+C"]
        );
        assert!(shortcuts
            .is_registered("CommandOrControl+Shift+C")
            .await
            .unwrap());

        shortcuts.unregister("CommandOrControl+Shift+C").await.unwrap();

        // The host pushes to the released channel before answering
        assert!(!shortcuts
            .is_registered("CommandOrControl+Shift+C")
            .await
            .unwrap());
        settle().await;
        assert_eq!(recorder.count(), 2);
        assert_eq!(shortcuts.channels().attached_count(), 0);
        assert_eq!(shortcuts.generation(), generation);
    }
}

#[tokio::test]
async fn host_rejection_is_surfaced_verbatim() {
    let port = spawn_host(|request| {
        Reply::Frames(vec![json!({
            "kind": "response",
            "id": request["id"],
            "error": "Shortcut Ctrl+K is already registered"
        })])
    })
    .await;
    let shortcuts = GlobalShortcut::connect(&config(port, TransportGeneration::Structured))
        .await
        .unwrap();

    let err = shortcuts
        .register("Ctrl+K", Recorder::new().handler())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ShortcutError::HostRejected {
            command: "plugin:globalShortcut|register".to_string(),
            reason: "Shortcut Ctrl+K is already registered".to_string(),
        }
    );
    assert_eq!(shortcuts.channels().attached_count(), 0);
}

#[tokio::test]
async fn connection_loss_fails_pending_and_later_commands() {
    let port = spawn_host(|_| Reply::Hangup).await;
    let shortcuts = GlobalShortcut::connect(&config(port, TransportGeneration::Legacy))
        .await
        .unwrap();

    let err = shortcuts
        .register("Ctrl+L", Recorder::new().handler())
        .await
        .unwrap_err();
    assert!(err.is_transport_unavailable());
    assert_eq!(shortcuts.channels().attached_count(), 0);

    let err = shortcuts.unregister_all().await.unwrap_err();
    assert!(err.is_transport_unavailable());
}

#[tokio::test]
async fn request_timeout_releases_pending_slot() {
    let port = spawn_host(|_| Reply::Silent).await;
    let ipc = IpcConfig {
        port,
        request_timeout_ms: Some(100),
        ..IpcConfig::default()
    };
    let channels = create_callback_channel(TransportGeneration::Structured);
    let transport = IpcTransport::connect(&ipc, channels).await.unwrap();

    let command = Command::new("globalShortcut", CommandName::UnregisterAll, json!({}));
    let result = transport.invoke(&command).await;

    assert!(matches!(result, Err(TransportError::Unavailable(_))));
    assert_eq!(transport.pending_count(), 0);
    assert!(transport.is_connected());
}

#[tokio::test]
async fn stray_frames_do_not_disturb_pending_requests() {
    let port = spawn_host(|request| {
        Reply::Frames(vec![
            json!({"kind": "response", "id": 9999, "ok": true}),
            json!({"kind": "event", "channel": "__CHANNEL__:777", "payload": "Ctrl+Q"}),
            json!({"kind": "event", "channel": 777, "payload": "Ctrl+Q"}),
            response(request, json!(true)),
        ])
    })
    .await;
    let ipc = IpcConfig {
        port,
        ..IpcConfig::default()
    };
    let channels = create_callback_channel(TransportGeneration::Legacy);
    let transport = IpcTransport::connect(&ipc, channels).await.unwrap();

    let command = Command::new(
        "globalShortcut",
        CommandName::IsRegistered,
        json!({"shortcut": "Ctrl+Q"}),
    );
    assert_eq!(transport.invoke(&command).await, Ok(json!(true)));
    assert_eq!(transport.transport_name(), "ipc");
    assert_eq!(transport.peer_address(), format!("127.0.0.1:{port}"));
}

#[tokio::test]
async fn connect_without_host_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    match GlobalShortcut::connect(&config(port, TransportGeneration::Structured)).await {
        Err(err) => assert!(err.is_transport_unavailable()),
        Ok(_) => panic!("Expected connect to fail"),
    }
}
