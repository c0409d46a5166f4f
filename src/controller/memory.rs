//! In-memory reference controller.
//!
//! [`InMemoryController`] keeps the node table in a `tokio::sync::RwLock`
//! protected `Vec`, so enumeration order is registration order. It does not
//! speak CoAP: whatever receives device traffic calls [`InMemoryController::touch`]
//! and [`InMemoryController::update_resource`], and the controller turns
//! those into broker notifications through its [`Outbox`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::DeviceController;
use crate::bridge::Outbox;
use crate::domain::{Node, NodeAddress};
use crate::error::ControllerError;
use crate::protocol::OutboundNotification;

/// One row of the node table.
#[derive(Debug)]
struct NodeEntry {
    node: Node,
    last_seen: Instant,
    last_seen_at: DateTime<Utc>,
    resources: BTreeMap<String, serde_json::Value>,
    pending: Vec<serde_json::Value>,
}

impl NodeEntry {
    fn new(node: Node) -> Self {
        Self {
            node,
            last_seen: Instant::now(),
            last_seen_at: Utc::now(),
            resources: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    fn refresh(&mut self) {
        self.last_seen = Instant::now();
        self.last_seen_at = Utc::now();
    }
}

/// Node table with liveness tracking and broker notifications.
#[derive(Debug)]
pub struct InMemoryController {
    nodes: RwLock<Vec<NodeEntry>>,
    outbox: Outbox,
    origin: String,
    max_time: Duration,
}

impl InMemoryController {
    /// Creates an empty controller.
    ///
    /// Nodes silent for longer than `max_time` are removed by
    /// [`DeviceController::check_dead_nodes`].
    #[must_use]
    pub fn new(outbox: Outbox, origin: impl Into<String>, max_time: Duration) -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            outbox,
            origin: origin.into(),
            max_time,
        }
    }

    /// Records that `address` was heard from.
    ///
    /// A first sighting registers the node and emits a `new` notification.
    /// Returns `true` if the node was new.
    pub async fn touch(&self, address: NodeAddress) -> bool {
        let mut nodes = self.nodes.write().await;
        self.seen(&mut nodes, &address, |_| {})
    }

    /// Stores a resource value reported by a node and emits an `update`.
    ///
    /// Unknown nodes are registered first, as if [`Self::touch`] was called.
    pub async fn update_resource(
        &self,
        address: NodeAddress,
        endpoint: impl Into<String>,
        value: serde_json::Value,
    ) {
        let endpoint = endpoint.into();
        let mut nodes = self.nodes.write().await;
        self.seen(&mut nodes, &address, |entry| {
            entry.resources.insert(endpoint.clone(), value.clone());
        });
        self.outbox.notify(&OutboundNotification::update(
            address,
            endpoint,
            value,
            &self.origin,
        ));
    }

    /// Takes the payloads queued for `address` by `send_data_to_node`.
    pub async fn take_pending(&self, address: &NodeAddress) -> Vec<serde_json::Value> {
        let mut nodes = self.nodes.write().await;
        nodes
            .iter_mut()
            .find(|e| &e.node.address == address)
            .map(|e| std::mem::take(&mut e.pending))
            .unwrap_or_default()
    }

    /// Number of known nodes.
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Returns `true` if no node is known.
    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Refreshes `address` in the locked table and applies `update` to its
    /// row, registering the node (and emitting `new`) on first sighting.
    /// Returns `true` if the node was new.
    fn seen(
        &self,
        nodes: &mut Vec<NodeEntry>,
        address: &NodeAddress,
        update: impl FnOnce(&mut NodeEntry),
    ) -> bool {
        if let Some(entry) = nodes.iter_mut().find(|e| &e.node.address == address) {
            entry.refresh();
            update(entry);
            return false;
        }

        tracing::info!(node = %address, "node registered");
        self.outbox
            .notify(&OutboundNotification::new_node(address.clone(), &self.origin));
        let mut entry = NodeEntry::new(Node::new(address.clone()));
        update(&mut entry);
        nodes.push(entry);
        true
    }

    /// Routes a broker payload to its node.
    ///
    /// The payload must be an object whose `node` field is the address.
    async fn deliver(&self, data: &serde_json::Value) -> Result<NodeAddress, ControllerError> {
        let address = data
            .get("node")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ControllerError::InvalidPayload("missing `node` field".to_string()))?;
        let address = NodeAddress::new(address)
            .map_err(|e| ControllerError::InvalidPayload(e.to_string()))?;

        let mut nodes = self.nodes.write().await;
        let entry = nodes
            .iter_mut()
            .find(|e| e.node.address == address)
            .ok_or_else(|| ControllerError::UnknownNode(address.to_string()))?;
        entry.pending.push(data.clone());
        Ok(address)
    }
}

#[async_trait]
impl DeviceController for InMemoryController {
    async fn nodes(&self) -> Vec<Node> {
        let nodes = self.nodes.read().await;
        nodes.iter().map(|e| e.node.clone()).collect()
    }

    async fn discover_node(&self, node: &Node) {
        let nodes = self.nodes.read().await;
        let Some(entry) = nodes.iter().find(|e| e.node.address == node.address) else {
            tracing::debug!(node = %node.address, "discovery requested for unknown node");
            return;
        };
        for (endpoint, value) in &entry.resources {
            self.outbox.notify(&OutboundNotification::update(
                node.address.clone(),
                endpoint.clone(),
                value.clone(),
                &self.origin,
            ));
        }
    }

    async fn send_data_to_node(&self, data: &serde_json::Value) {
        match self.deliver(data).await {
            Ok(address) => tracing::debug!(node = %address, "payload queued for node"),
            Err(e) => tracing::warn!(error = %e, "cannot deliver payload"),
        }
    }

    async fn check_dead_nodes(&self) -> Result<usize, ControllerError> {
        let now = Instant::now();
        let mut nodes = self.nodes.write().await;
        let max_time = self.max_time;
        let (alive, dead): (Vec<_>, Vec<_>) = nodes
            .drain(..)
            .partition(|e| now.duration_since(e.last_seen) <= max_time);
        *nodes = alive;

        for entry in &dead {
            tracing::info!(
                node = %entry.node.address,
                last_seen = %entry.last_seen_at,
                "node is dead"
            );
            self.outbox
                .notify(&OutboundNotification::out(entry.node.address.clone(), &self.origin));
        }
        Ok(dead.len())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::bridge::OutboxReceiver;
    use serde_json::{Value, json};

    fn addr(s: &str) -> NodeAddress {
        let Ok(a) = NodeAddress::new(s) else {
            panic!("invalid test address {s}");
        };
        a
    }

    fn controller(max_time: Duration) -> (InMemoryController, OutboxReceiver) {
        let (outbox, rx) = Outbox::channel();
        (InMemoryController::new(outbox, "coap", max_time), rx)
    }

    fn frames(rx: &mut OutboxReceiver) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let Ok(value) = serde_json::from_str(&frame) else {
                panic!("invalid frame {frame}");
            };
            out.push(value);
        }
        out
    }

    #[tokio::test]
    async fn touch_registers_once_and_announces() {
        let (ctl, mut rx) = controller(Duration::from_secs(120));
        assert!(ctl.touch(addr("A1")).await);
        assert!(!ctl.touch(addr("A1")).await);
        assert_eq!(ctl.len().await, 1);
        assert_eq!(
            frames(&mut rx),
            vec![json!({"command": "new", "node": "A1", "origin": "coap"})]
        );
    }

    #[tokio::test]
    async fn nodes_keep_registration_order() {
        let (ctl, _rx) = controller(Duration::from_secs(120));
        for a in ["C3", "A1", "B2"] {
            ctl.touch(addr(a)).await;
        }
        let order: Vec<String> = ctl
            .nodes()
            .await
            .into_iter()
            .map(|n| n.address.to_string())
            .collect();
        assert_eq!(order, ["C3", "A1", "B2"]);
    }

    #[tokio::test]
    async fn discover_replays_resources() {
        let (ctl, mut rx) = controller(Duration::from_secs(120));
        ctl.update_resource(addr("A1"), "led", json!("on")).await;
        ctl.update_resource(addr("A1"), "temperature", json!("21")).await;
        frames(&mut rx);

        ctl.discover_node(&Node::new(addr("A1"))).await;
        let replay = frames(&mut rx);
        assert_eq!(replay.len(), 2);
        assert!(replay.iter().all(|f| f["command"] == "update" && f["node"] == "A1"));
    }

    #[tokio::test(start_paused = true)]
    async fn update_registers_and_stores_before_a_queued_sweep() {
        let (ctl, mut rx) = controller(Duration::from_secs(10));
        let ctl = std::sync::Arc::new(ctl);

        // Park both writers behind a reader; the lock hands out in FIFO order.
        let guard = ctl.nodes.read().await;
        let updater = {
            let ctl = std::sync::Arc::clone(&ctl);
            tokio::spawn(async move { ctl.update_resource(addr("A1"), "led", json!("on")).await })
        };
        tokio::task::yield_now().await;
        let sweeper = {
            let ctl = std::sync::Arc::clone(&ctl);
            tokio::spawn(async move { ctl.check_dead_nodes().await })
        };
        tokio::task::yield_now().await;
        drop(guard);

        let Ok(()) = updater.await else {
            panic!("update task failed");
        };
        let Ok(swept) = sweeper.await else {
            panic!("sweep task failed");
        };
        assert_eq!(swept, Ok(0));
        assert_eq!(
            frames(&mut rx),
            vec![
                json!({"command": "new", "node": "A1", "origin": "coap"}),
                json!({
                    "command": "update",
                    "node": "A1",
                    "endpoint": "led",
                    "data": "on",
                    "origin": "coap"
                }),
            ]
        );

        ctl.discover_node(&Node::new(addr("A1"))).await;
        assert_eq!(frames(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn update_on_known_node_does_not_reannounce() {
        let (ctl, mut rx) = controller(Duration::from_secs(120));
        ctl.touch(addr("A1")).await;
        frames(&mut rx);

        ctl.update_resource(addr("A1"), "led", json!("off")).await;
        let sent = frames(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["command"], "update");
        assert_eq!(ctl.len().await, 1);
    }

    #[tokio::test]
    async fn discover_unknown_node_is_silent() {
        let (ctl, mut rx) = controller(Duration::from_secs(120));
        ctl.discover_node(&Node::new(addr("Z9"))).await;
        assert!(frames(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn send_data_queues_for_named_node() {
        let (ctl, _rx) = controller(Duration::from_secs(120));
        ctl.touch(addr("A1")).await;
        let payload = json!({"node": "A1", "path": "led", "payload": "1"});
        ctl.send_data_to_node(&payload).await;
        assert_eq!(ctl.take_pending(&addr("A1")).await, vec![payload]);
        assert!(ctl.take_pending(&addr("A1")).await.is_empty());
    }

    #[tokio::test]
    async fn deliver_rejects_bad_payloads() {
        let (ctl, _rx) = controller(Duration::from_secs(120));
        assert!(matches!(
            ctl.deliver(&json!({"path": "led"})).await,
            Err(ControllerError::InvalidPayload(_))
        ));
        assert_eq!(
            ctl.deliver(&json!({"node": "B2"})).await,
            Err(ControllerError::UnknownNode("B2".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_silent_nodes() {
        let (ctl, mut rx) = controller(Duration::from_secs(10));
        ctl.touch(addr("A1")).await;
        ctl.touch(addr("B2")).await;
        frames(&mut rx);

        tokio::time::advance(Duration::from_secs(6)).await;
        ctl.touch(addr("B2")).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(ctl.check_dead_nodes().await, Ok(1));
        assert_eq!(
            frames(&mut rx),
            vec![json!({"command": "out", "node": "A1", "origin": "coap"})]
        );
        assert_eq!(ctl.len().await, 1);
        assert_eq!(ctl.check_dead_nodes().await, Ok(0));
    }
}
