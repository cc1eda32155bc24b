//! Readiness polling over several nodes.
//!
//! A [`Poller`] is built for one wait and dropped after it; there is no
//! shared poller state between waits.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::select_all;
use tokio::time::Instant;

use crate::node::Node;

/// Waits until one or more registered nodes have an event to read.
#[derive(Debug, Default)]
pub struct Poller<'a> {
    nodes: Vec<&'a Node>,
}

impl<'a> Poller<'a> {
    /// Creates a poller over `nodes`, in registration order.
    pub fn new(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut poller = Self { nodes: Vec::new() };
        for node in nodes {
            poller.add(node);
        }
        poller
    }

    /// Registers `node`. Registering a node twice has no effect.
    pub fn add(&mut self, node: &'a Node) {
        if !self.nodes.iter().any(|n| n.uuid() == node.uuid()) {
            self.nodes.push(node);
        }
    }

    /// Unregisters `node`. Returns `false` if it was not registered.
    pub fn remove(&mut self, node: &Node) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.uuid() != node.uuid());
        self.nodes.len() != before
    }

    /// Registered nodes keyed by endpoint.
    pub fn nodes(&self) -> BTreeMap<String, &'a Node> {
        self.nodes
            .iter()
            .map(|n| (n.endpoint().to_string(), *n))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn ready(&self) -> Vec<&'a Node> {
        self.nodes.iter().copied().filter(|n| n.is_ready()).collect()
    }

    /// Returns the ready nodes in registration order, waiting up to
    /// `timeout` for one to become ready. `None` waits indefinitely.
    ///
    /// An empty result means the timeout expired. A poller without nodes
    /// returns immediately when `timeout` is `None`.
    pub async fn wait(&self, timeout: Option<Duration>) -> Vec<&'a Node> {
        if self.nodes.is_empty() {
            if let Some(timeout) = timeout {
                tokio::time::sleep(timeout).await;
            }
            return Vec::new();
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let ready = self.ready();
            if !ready.is_empty() {
                return ready;
            }

            let readable = select_all(self.nodes.iter().map(|n| Box::pin(n.inbox().readable())));
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, readable).await.is_err() {
                        return self.ready();
                    }
                }
                None => {
                    readable.await;
                }
            }
        }
    }
}

/// Waits for any of `nodes` to become ready and returns the first ready
/// one in slice order, or `None` when `timeout` expires.
pub async fn wait<'a>(nodes: &[&'a Node], timeout: Option<Duration>) -> Option<&'a Node> {
    Poller::new(nodes.iter().copied())
        .wait(timeout)
        .await
        .into_iter()
        .next()
}
