//! Bridge against a real WebSocket broker on localhost.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use coap_broker_bridge::bridge::{Bridge, BridgeSettings, Outbox};
use coap_broker_bridge::controller::{DeviceController, InMemoryController};
use coap_broker_bridge::domain::NodeAddress;
use coap_broker_bridge::error::BridgeError;
use coap_broker_bridge::transport::{Connector, WsConnector};

const WAIT: Duration = Duration::from_secs(5);

fn addr(s: &str) -> NodeAddress {
    let Ok(a) = NodeAddress::new(s) else {
        panic!("invalid test address {s}");
    };
    a
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let Ok(frame) = tokio::time::timeout(WAIT, ws.next()).await else {
            panic!("timed out waiting for bridge frame");
        };
        match frame {
            Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
            Some(Ok(_)) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn bind() -> (TcpListener, String) {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(local) = listener.local_addr() else {
        panic!("no local addr");
    };
    (listener, format!("ws://{local}/broker"))
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let Ok(Ok((tcp, _))) = tokio::time::timeout(WAIT, listener.accept()).await else {
        panic!("bridge never connected");
    };
    let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
        panic!("websocket upgrade failed");
    };
    ws
}

#[tokio::test]
async fn broker_session_end_to_end() {
    let (listener, url) = bind().await;

    let (outbox, outbox_rx) = Outbox::channel();
    let controller = Arc::new(InMemoryController::new(
        outbox,
        "coap",
        Duration::from_secs(120),
    ));
    // Registered before the broker is reachable: their announcements are dropped.
    controller.touch(addr("A1")).await;
    controller.touch(addr("B2")).await;

    let bridge = Bridge::new(
        Arc::clone(&controller) as Arc<dyn DeviceController>,
        Arc::new(WsConnector::new(WAIT)) as Arc<dyn Connector>,
        outbox_rx,
        BridgeSettings::default(),
    );
    let bridge_url = url.clone();
    let runner = tokio::spawn(async move { bridge.run(&bridge_url).await });

    let mut ws = accept(&listener).await;

    // A broker client appeared: every node is announced, in order.
    let Ok(()) = ws.send(Message::text(r#"{"type":"new"}"#)).await else {
        panic!("broker send failed");
    };
    assert_eq!(
        next_text(&mut ws).await,
        r#"{"command":"new","node":"A1","origin":"coap"}"#
    );
    assert_eq!(
        next_text(&mut ws).await,
        r#"{"command":"new","node":"B2","origin":"coap"}"#
    );

    // A broker client writes to a node.
    let payload = json!({"node": "B2", "path": "led", "payload": "1"});
    let update = json!({"type": "update", "data": payload}).to_string();
    let Ok(()) = ws.send(Message::text(update)).await else {
        panic!("broker send failed");
    };

    // Node traffic reaches the broker through the outbox.
    controller
        .update_resource(addr("A1"), "temperature", json!("21.5"))
        .await;
    let Ok(forwarded) = serde_json::from_str::<Value>(&next_text(&mut ws).await) else {
        panic!("bridge forwarded invalid JSON");
    };
    assert_eq!(
        forwarded,
        json!({
            "command": "update",
            "node": "A1",
            "endpoint": "temperature",
            "data": "21.5",
            "origin": "coap"
        })
    );

    let delivered = tokio::time::timeout(WAIT, async {
        loop {
            let pending = controller.take_pending(&addr("B2")).await;
            if !pending.is_empty() {
                return pending;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(delivered.ok(), Some(vec![payload]));

    // Broker goes away: the session ends and the bridge does not redial.
    let Ok(()) = ws.close(None).await else {
        panic!("broker close failed");
    };
    let Ok(Ok(result)) = tokio::time::timeout(WAIT, runner).await else {
        panic!("bridge did not stop after end-of-stream");
    };
    assert!(result.is_ok());
}

#[tokio::test]
async fn unreachable_broker_is_a_connect_error() {
    let (listener, url) = bind().await;
    drop(listener);

    let (outbox, outbox_rx) = Outbox::channel();
    let controller: Arc<dyn DeviceController> = Arc::new(InMemoryController::new(
        outbox,
        "coap",
        Duration::from_secs(120),
    ));
    let bridge = Bridge::new(
        controller,
        Arc::new(WsConnector::new(WAIT)),
        outbox_rx,
        BridgeSettings::default(),
    );

    let result = bridge.run(&url).await;
    assert!(matches!(result, Err(BridgeError::Connect { .. })));
}
