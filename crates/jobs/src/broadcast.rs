// crates/jobs/src/broadcast.rs
//! Per-job fan-out of events to attached subscriber sinks.
//!
//! Every sink is the sending half of an unbounded channel, so publishing
//! never waits on a slow subscriber. Delivery is best-effort: a sink whose
//! receiver has gone away is dropped from the set and the failure is not
//! reported to anyone.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::types::{JobEvent, SinkMessage};

/// Identifier of one attached sink, unique within its job.
pub type SubscriberId = u64;

/// Sending half of a subscriber's channel.
pub type Sink = mpsc::UnboundedSender<SinkMessage>;

/// Default keep-alive interval for attached sinks.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2000);

/// Subscriber set for a single job.
///
/// Not synchronized on its own; the owning job serializes access so that
/// attach snapshots and broadcasts can't interleave.
#[derive(Debug, Default)]
pub struct Broadcaster {
    next_id: SubscriberId,
    sinks: HashMap<SubscriberId, Sink>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink and send it `greeting` before anything else.
    pub fn attach(&mut self, sink: Sink, greeting: JobEvent) -> SubscriberId {
        let id = self.next_id;
        self.next_id += 1;
        let _ = sink.send(SinkMessage::Event(greeting));
        self.sinks.insert(id, sink);
        metrics::gauge!("docflow_job_subscribers").increment(1.0);
        id
    }

    /// Remove a sink. Returns `false` if it was already gone.
    pub fn detach(&mut self, id: SubscriberId) -> bool {
        let removed = self.sinks.remove(&id).is_some();
        if removed {
            metrics::gauge!("docflow_job_subscribers").decrement(1.0);
        }
        removed
    }

    /// Best-effort publish to every attached sink.
    ///
    /// The per-sink send result is deliberately discarded: a closed sink is
    /// pruned and the remaining sinks still get the event. Returns how many
    /// sinks accepted it.
    pub fn publish(&mut self, event: &JobEvent) -> usize {
        let before = self.sinks.len();
        self.sinks
            .retain(|_, sink| sink.send(SinkMessage::Event(event.clone())).is_ok());
        let pruned = before - self.sinks.len();
        if pruned > 0 {
            metrics::gauge!("docflow_job_subscribers").decrement(pruned as f64);
            tracing::debug!(pruned, event = event.name(), "dropped closed subscriber sinks");
        }
        self.sinks.len()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// Spawn the keep-alive task for one sink.
///
/// The first tick fires one full interval after attach. The task ends on its
/// own once the receiver is gone, but owners abort it on detach.
pub(crate) fn spawn_heartbeat(sink: Sink, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if sink.send(SinkMessage::Heartbeat).is_err() {
                break;
            }
        }
    })
}
