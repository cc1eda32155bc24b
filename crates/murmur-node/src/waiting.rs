//! Waiting for a particular event.

use std::time::Duration;

use futures::stream::{self, Stream};
use murmur_event::{Criteria, Event, EventType};
use murmur_types::{MurmurError, Result};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::node::Node;
use crate::poller::Poller;

impl Node {
    /// Receives events until one of type `type_name` matching `criteria`
    /// arrives, and returns it.
    ///
    /// Every event received before the match is handed to `on_skip`, in
    /// arrival order. With `timeout` set, returns `Ok(None)` once the
    /// budget is spent; time spent in `on_skip` counts against it. A zero
    /// timeout checks the queue once without blocking.
    ///
    /// # Errors
    ///
    /// [`MurmurError::UnknownEventType`] for an unknown `type_name`,
    /// checked before anything is received. [`MurmurError::HangUp`] if
    /// the node stops while waiting.
    pub async fn wait_for<F>(
        &self,
        type_name: &str,
        criteria: &Criteria,
        timeout: Option<Duration>,
        mut on_skip: F,
    ) -> Result<Option<Event>>
    where
        F: FnMut(Event),
    {
        let wanted: EventType = type_name.parse()?;
        let is_match = |event: &Event| event.event_type() == wanted && event.matches(criteria);
        debug!(node = %self.uuid(), kind = %wanted, ?timeout, "waiting for event");

        let Some(timeout) = timeout else {
            loop {
                let event = self.recv().await?;
                if is_match(&event) {
                    return Ok(Some(event));
                }
                on_skip(event);
            }
        };

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if Poller::new([self]).wait(Some(remaining)).await.is_empty() {
                debug!(node = %self.uuid(), kind = %wanted, "wait timed out");
                return Ok(None);
            }

            let Some(event) = self.try_recv()? else {
                continue;
            };
            if is_match(&event) {
                return Ok(Some(event));
            }
            on_skip(event);
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    /// Like [`Node::wait_for`], discarding skipped events.
    pub async fn wait_for_event(
        &self,
        type_name: &str,
        criteria: &Criteria,
        timeout: Option<Duration>,
    ) -> Result<Option<Event>> {
        self.wait_for(type_name, criteria, timeout, |_| {}).await
    }

    /// Stream of received events, ending when the node hangs up.
    ///
    /// Each call returns an independent stream over the same queue.
    pub fn events(&self) -> impl Stream<Item = Event> + '_ {
        stream::unfold(self, |node| async move {
            match node.recv().await {
                Ok(event) => Some((event, node)),
                Err(MurmurError::HangUp) => None,
                Err(e) => {
                    warn!(node = %node.uuid(), error = %e, "event stream ended");
                    None
                }
            }
        })
    }
}
