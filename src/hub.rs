/// hub.rs – Publish/subscribe point for the portfolio-level aggregate.
///
/// The feed engine owns the hub and is the only writer. Widgets hold a
/// [`Subscription`] and only ever read. Before the first publish, and after
/// the engine is gone, readers see a zeroed snapshot.
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{AggregateSnapshot, SimulationState};

/// Sum simulated P/L across the visible positions.
pub fn summarize<'a>(
    states: impl IntoIterator<Item = &'a SimulationState>,
    daily_pl: f64,
    daily_target: f64,
) -> AggregateSnapshot {
    let (unrealized_pl, open_positions) = states
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), s| (sum + s.simulated_pl, n + 1));
    AggregateSnapshot {
        unrealized_pl,
        open_positions,
        daily_pl,
        daily_target,
    }
}

pub struct AggregationHub {
    tx: watch::Sender<AggregateSnapshot>,
}

impl Default for AggregationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregationHub {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AggregateSnapshot::default());
        Self { tx }
    }

    /// Replace the current snapshot and wake every subscriber.
    pub fn publish(&self, snapshot: AggregateSnapshot) {
        // send_replace succeeds even with no live receivers.
        self.tx.send_replace(snapshot);
    }

    pub fn latest(&self) -> AggregateSnapshot {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Invoke `callback` with every new snapshot until the hub is dropped.
    pub fn on_publish<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(AggregateSnapshot) + Send + 'static,
    {
        let mut sub = self.subscribe();
        tokio::spawn(async move {
            while let Some(snapshot) = sub.changed().await {
                callback(snapshot);
            }
        })
    }
}

/// Read-only view of the hub.
#[derive(Clone)]
pub struct Subscription {
    rx: watch::Receiver<AggregateSnapshot>,
}

impl Subscription {
    /// Latest snapshot; zeroed once the producer has gone away.
    pub fn current(&self) -> AggregateSnapshot {
        if self.rx.has_changed().is_err() {
            return AggregateSnapshot::default();
        }
        *self.rx.borrow()
    }

    /// Wait for the next publish. `None` once the hub has been dropped.
    pub async fn changed(&mut self) -> Option<AggregateSnapshot> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_of_nothing_is_zero() {
        let snap = summarize(std::iter::empty(), 0.0, 0.0);
        assert_eq!(snap, AggregateSnapshot::default());
    }

    #[test]
    fn summarize_adds_simulated_values() {
        let states = [
            SimulationState {
                simulated_pl: 1.5,
                progress: 0.2,
            },
            SimulationState {
                simulated_pl: -0.5,
                progress: 0.9,
            },
        ];
        let snap = summarize(&states, 3.0, 10.0);
        assert!((snap.unrealized_pl - 1.0).abs() < 1e-12);
        assert_eq!(snap.open_positions, 2);
        assert_eq!(snap.daily_pl, 3.0);
        assert_eq!(snap.daily_target, 10.0);
    }

    #[test]
    fn subscriber_sees_default_before_publish() {
        let hub = AggregationHub::new();
        let sub = hub.subscribe();
        assert_eq!(sub.current(), AggregateSnapshot::default());
    }

    #[test]
    fn subscriber_falls_back_to_default_after_hub_dropped() {
        let hub = AggregationHub::new();
        let sub = hub.subscribe();
        hub.publish(AggregateSnapshot {
            unrealized_pl: 4.0,
            open_positions: 1,
            ..AggregateSnapshot::default()
        });
        drop(hub);
        assert_eq!(sub.current(), AggregateSnapshot::default());
    }
}
