//! Integration test: stands up an in-process mini bridge on `sb-bus`,
//! runs a real [`WorkerClient`] against it, and asserts the handshake plus
//! the session envelope cycle:
//! - init is answered with ready, and the worker publishes on the given port
//! - `__connect` creates a worker-side session and runs the connect hook
//! - signals dispatch with action bracketing and reply on the same session id
//! - envelopes for unknown sessions or other namespaces are ignored
//! - `__disconnect` forgets the session
//! - CLI args and later datastore changes are mirrored as `__data`

use std::net::SocketAddr;
use std::time::Duration;

use sb_bus::{reserve_port, resolve, Publisher, Subscriber};
use sb_protocol::{BridgeEnvelope, BusFrame, InitMessage, SignalMessage};
use sb_worker_sdk::{Signature, SignalTable, WorkerClientBuilder};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

const NS: &str = "testns";
const RETRY: Duration = Duration::from_millis(20);

struct MiniBridge {
    publisher: Publisher,
    subscriber: Subscriber,
}

impl MiniBridge {
    fn publish_envelope(&self, session_id: &str, namespace: &str, signal: &str, payload: Value) {
        self.publisher
            .publish(&BridgeEnvelope {
                session_id: session_id.into(),
                namespace: namespace.into(),
                payload: SignalMessage::new(signal, payload),
            })
            .unwrap();
    }

    /// Next envelope from the worker, skipping handshake acks.
    async fn next_envelope(&mut self) -> BridgeEnvelope {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.subscriber.recv_json::<BusFrame>().await {
                    Some(Ok(BusFrame::Envelope(env))) => return env,
                    Some(_) => continue,
                    None => panic!("bridge subscriber closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for an envelope")
    }

    /// Nothing but handshake acks arrives within `window`.
    async fn assert_quiet(&mut self, window: Duration) {
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return,
                frame = self.subscriber.recv_json::<BusFrame>() => {
                    if let Some(Ok(BusFrame::Envelope(env))) = frame {
                        panic!("unexpected envelope: {env:?}");
                    }
                }
            }
        }
    }
}

fn test_table() -> SignalTable {
    let mut table = SignalTable::new();
    table
        .on("ping", Signature::none(), |session, _| async move {
            session.emit("pong", &json!({})).await?;
            Ok(())
        })
        .on("echo", Signature::new(["text"]), |session, args| async move {
            let text: String = args.value("text")?;
            session.emit("echoed", &json!({ "text": text })).await?;
            Ok(())
        })
        .on("remember", Signature::new(["value"]), |session, args| async move {
            let value: Value = args.value("value")?;
            session.data().set("remembered", &value)?;
            Ok(())
        })
        .on_connect(|session| async move {
            let user = session.request_arg("user").unwrap_or("anonymous").to_owned();
            session.emit("hello", &json!({ "user": user })).await?;
            Ok(())
        });
    table
}

async fn start() -> (MiniBridge, CancellationToken) {
    start_with_args(Vec::new()).await
}

/// Boot the bridge side, start the worker, and complete the handshake.
async fn start_with_args(cli_args: Vec<&str>) -> (MiniBridge, CancellationToken) {
    let publisher = Publisher::bind(resolve("127.0.0.1", 0).unwrap())
        .await
        .unwrap();
    let bridge_addr: SocketAddr = publisher.local_addr();
    let subscribe_port = reserve_port("127.0.0.1").unwrap();
    let subscriber = Subscriber::connect(resolve("127.0.0.1", subscribe_port).unwrap(), RETRY);

    let shutdown = CancellationToken::new();
    WorkerClientBuilder::new()
        .bridge_addr(bridge_addr.to_string())
        .namespace(NS)
        .retry_interval(RETRY)
        .cli_args(cli_args)
        .build()
        .unwrap()
        .spawn(test_table(), shutdown.clone());

    let mut bridge = MiniBridge {
        publisher,
        subscriber,
    };

    let init = InitMessage {
        namespace: NS.into(),
        publish_on_port: subscribe_port,
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            bridge.publisher.publish(&init).unwrap();
            tokio::select! {
                frame = bridge.subscriber.recv_json::<BusFrame>() => {
                    if let Some(Ok(BusFrame::Ready(ready))) = frame {
                        assert_eq!(ready.namespace, NS);
                        assert!(ready.ready);
                        return;
                    }
                }
                _ = tokio::time::sleep(RETRY) => {}
            }
        }
    })
    .await
    .expect("worker never acknowledged init");

    (bridge, shutdown)
}

#[tokio::test]
async fn connect_runs_hook_with_request_args() {
    let (mut bridge, shutdown) = start().await;

    bridge.publish_envelope("s1", NS, "__connect", json!({ "user": ["ada"] }));
    let env = bridge.next_envelope().await;
    assert_eq!(env.session_id, "s1");
    assert_eq!(env.payload.signal, "hello");
    assert_eq!(env.payload.payload, json!({ "user": "ada" }));

    shutdown.cancel();
}

#[tokio::test]
async fn signals_reply_on_their_own_session() {
    let (mut bridge, shutdown) = start().await;

    bridge.publish_envelope("s1", NS, "__connect", json!({}));
    bridge.publish_envelope("s2", NS, "__connect", json!({}));
    for _ in 0..2 {
        assert_eq!(bridge.next_envelope().await.payload.signal, "hello");
    }

    bridge.publish_envelope("s1", NS, "ping", json!({ "__action_id": "a1" }));
    let signals: Vec<(String, String)> = {
        let mut out = Vec::new();
        for _ in 0..3 {
            let env = bridge.next_envelope().await;
            out.push((env.session_id, env.payload.signal));
        }
        out
    };
    assert_eq!(
        signals,
        vec![
            ("s1".into(), "__action".into()),
            ("s1".into(), "pong".into()),
            ("s1".into(), "__action".into()),
        ]
    );

    bridge.publish_envelope("s2", NS, "echo", json!(["hi"]));
    let env = bridge.next_envelope().await;
    assert_eq!(env.session_id, "s2");
    assert_eq!(env.payload, SignalMessage::new("echoed", json!({ "text": "hi" })));

    shutdown.cancel();
}

#[tokio::test]
async fn unknown_sessions_and_foreign_namespaces_are_ignored() {
    let (mut bridge, shutdown) = start().await;

    bridge.publish_envelope("ghost", NS, "ping", json!({}));
    bridge.publish_envelope("s1", "other", "__connect", json!({}));
    bridge.assert_quiet(Duration::from_millis(200)).await;

    shutdown.cancel();
}

#[tokio::test]
async fn disconnect_forgets_session() {
    let (mut bridge, shutdown) = start().await;

    bridge.publish_envelope("s1", NS, "__connect", json!({}));
    assert_eq!(bridge.next_envelope().await.payload.signal, "hello");

    bridge.publish_envelope("s1", NS, "__disconnect", json!({}));
    bridge.publish_envelope("s1", NS, "ping", json!({}));
    bridge.assert_quiet(Duration::from_millis(200)).await;

    shutdown.cancel();
}

#[tokio::test]
async fn cli_args_and_data_changes_are_mirrored() {
    let (mut bridge, shutdown) = start_with_args(vec!["--some-test-flag"]).await;

    bridge.publish_envelope("s1", NS, "__connect", json!({}));
    let env = bridge.next_envelope().await;
    assert_eq!(
        env.payload,
        SignalMessage::new("__data", json!({ "cli_args": ["--some-test-flag"] }))
    );
    assert_eq!(bridge.next_envelope().await.payload.signal, "hello");

    bridge.publish_envelope("s1", NS, "remember", json!({ "value": 42 }));
    let env = bridge.next_envelope().await;
    assert_eq!(env.session_id, "s1");
    assert_eq!(env.payload, SignalMessage::new("__data", json!({ "remembered": 42 })));

    shutdown.cancel();
}
