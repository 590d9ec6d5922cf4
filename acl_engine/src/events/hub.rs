//! The event distribution hub: topic-scoped fan-out over persistent connections.
//!
//! Subscribers join one topic each: their partner's topic, the admin firehose, or the analytics
//! feed. The topic registry is explicit, constructor-injected state with a defined lifecycle
//! (created at process start, dropped at shutdown) behind `RwLock`; there are no ambient
//! globals. Delivery to connected subscribers is `tokio::sync::broadcast`; a slow subscriber
//! lags and eventually drops messages rather than back-pressuring publishers.
//!
//! When a partner has no connected subscriber at publish time, a lightweight nudge record is
//! parked in the offline queue instead, keyed by (partner, event kind) and overwritten by newer
//! events of the same kind. Delivery of nudges is the push-notification collaborator's problem;
//! the durable Notification row remains the inbox of record.
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use log::*;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::events::{EventHooks, LedgerEvent};

const DEFAULT_TOPIC_CAPACITY: usize = 64;

//--------------------------------------        Topic        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// One topic per partner id; partner-scoped connections join their own.
    Partner(i64),
    /// Every domain event, for back-office dashboards.
    Admin,
    /// Traffic-shaped events only (clicks, conversions, session ends).
    Analytics,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::Partner(id) => write!(f, "partner:{id}"),
            Topic::Admin => write!(f, "admin"),
            Topic::Analytics => write!(f, "analytics"),
        }
    }
}

//--------------------------------------     HubMessage      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub enum HubMessage {
    Event(Arc<LedgerEvent>),
    /// Liveness frame, broadcast on a timer to every topic independent of domain events.
    Heartbeat { at: DateTime<Utc> },
}

//--------------------------------------    OfflineNudge     ---------------------------------------------------------
/// The at-most-one-pending record handed to the push-notification collaborator when a partner
/// was offline at publish time. Not an inbox: a newer event of the same kind replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineNudge {
    pub partner_id: i64,
    pub kind: &'static str,
    pub at: DateTime<Utc>,
}

//--------------------------------------      EventHub       ---------------------------------------------------------
pub struct EventHub {
    topics: RwLock<HashMap<Topic, broadcast::Sender<HubMessage>>>,
    partner_subscribers: RwLock<HashMap<i64, usize>>,
    nudges: Mutex<HashMap<(i64, &'static str), OfflineNudge>>,
    topic_capacity: usize,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

impl EventHub {
    pub fn new(topic_capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            partner_subscribers: RwLock::new(HashMap::new()),
            nudges: Mutex::new(HashMap::new()),
            topic_capacity,
        }
    }

    /// Joins a topic. The returned subscription leaves the topic again when dropped, which is
    /// how disconnects are noticed.
    pub fn subscribe(self: &Arc<Self>, topic: Topic) -> Subscription {
        let receiver = {
            let mut topics = self.topics.write().expect("topic registry lock poisoned");
            let sender =
                topics.entry(topic).or_insert_with(|| broadcast::channel(self.topic_capacity).0);
            sender.subscribe()
        };
        if let Topic::Partner(partner_id) = topic {
            let mut counts = self.partner_subscribers.write().expect("subscriber count lock poisoned");
            *counts.entry(partner_id).or_insert(0) += 1;
        }
        trace!("📬️ New subscriber on topic {topic}");
        Subscription { topic, receiver, hub: Arc::clone(self) }
    }

    fn disconnect(&self, topic: Topic) {
        if let Topic::Partner(partner_id) = topic {
            let mut counts = self.partner_subscribers.write().expect("subscriber count lock poisoned");
            if let Some(count) = counts.get_mut(&partner_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(&partner_id);
                }
            }
        }
        trace!("📬️ Subscriber left topic {topic}");
    }

    pub fn partner_subscriber_count(&self, partner_id: i64) -> usize {
        self.partner_subscribers
            .read()
            .expect("subscriber count lock poisoned")
            .get(&partner_id)
            .copied()
            .unwrap_or(0)
    }

    /// Publishes a domain event to the partner's topic and the admin topic (and analytics, for
    /// traffic-shaped events). If the partner has no connected subscriber right now, a nudge is
    /// parked for the push collaborator instead.
    pub fn publish(&self, event: LedgerEvent) {
        let partner_id = event.partner_id();
        let kind = event.kind();
        let for_analytics = event.for_analytics();
        let message = HubMessage::Event(Arc::new(event));

        self.send_to(Topic::Partner(partner_id), message.clone());
        self.send_to(Topic::Admin, message.clone());
        if for_analytics {
            self.send_to(Topic::Analytics, message);
        }

        if self.partner_subscriber_count(partner_id) == 0 {
            let nudge = OfflineNudge { partner_id, kind, at: Utc::now() };
            let mut nudges = self.nudges.lock().expect("nudge queue lock poisoned");
            nudges.insert((partner_id, kind), nudge);
            trace!("📬️ Partner {partner_id} offline; parked {kind} nudge");
        }
    }

    fn send_to(&self, topic: Topic, message: HubMessage) {
        let topics = self.topics.read().expect("topic registry lock poisoned");
        if let Some(sender) = topics.get(&topic) {
            // send only fails when there are no receivers, which is fine
            let _ = sender.send(message);
        }
    }

    /// Removes and returns the pending nudges for a partner. Called by the push-notification
    /// collaborator; delivery guarantees from here on are its responsibility.
    pub fn drain_nudges(&self, partner_id: i64) -> Vec<OfflineNudge> {
        let mut nudges = self.nudges.lock().expect("nudge queue lock poisoned");
        let keys: Vec<_> = nudges.keys().filter(|(id, _)| *id == partner_id).cloned().collect();
        let mut drained: Vec<_> = keys.into_iter().filter_map(|k| nudges.remove(&k)).collect();
        drained.sort_by_key(|n| n.at);
        drained
    }

    /// Broadcasts a liveness frame to every topic on a timer, independent of domain events.
    /// The task runs until the returned handle is aborted.
    pub fn start_heartbeat(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately; skip it so subscribers see a steady cadence
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let message = HubMessage::Heartbeat { at: Utc::now() };
                let topics = hub.topics.read().expect("topic registry lock poisoned");
                for sender in topics.values() {
                    let _ = sender.send(message.clone());
                }
                trace!("📬️ Heartbeat broadcast to {} topic(s)", topics.len());
            }
        })
    }
}

impl EventHub {
    /// Hooks that forward every domain event into this hub, ready to be handed to
    /// [`crate::events::EventHandlers::new`]. Each event family gets its own bounded channel and
    /// dedicated fan-out worker; the hub itself never blocks a publisher.
    pub fn fanout_hooks(self: &Arc<Self>) -> EventHooks {
        fn done() -> Pin<Box<dyn Future<Output = ()> + Send>> {
            futures_util::future::ready(()).boxed()
        }
        let mut hooks = EventHooks::default();
        let hub = Arc::clone(self);
        hooks.on_click_recorded(move |ev| {
            hub.publish(LedgerEvent::ClickRecorded(ev));
            done()
        });
        let hub = Arc::clone(self);
        hooks.on_conversion_recorded(move |ev| {
            hub.publish(LedgerEvent::ConversionRecorded(ev));
            done()
        });
        let hub = Arc::clone(self);
        hooks.on_commission_status_changed(move |ev| {
            hub.publish(LedgerEvent::CommissionStatusChanged(ev));
            done()
        });
        let hub = Arc::clone(self);
        hooks.on_commissions_settled(move |ev| {
            hub.publish(LedgerEvent::CommissionsSettled(ev));
            done()
        });
        let hub = Arc::clone(self);
        hooks.on_payout_updated(move |ev| {
            hub.publish(LedgerEvent::PayoutUpdated(ev));
            done()
        });
        let hub = Arc::clone(self);
        hooks.on_session_ended(move |ev| {
            hub.publish(LedgerEvent::SessionEnded(ev));
            done()
        });
        hooks
    }
}

//--------------------------------------    Subscription     ---------------------------------------------------------
/// A live membership of one topic. Dropping it is the disconnect.
pub struct Subscription {
    topic: Topic,
    receiver: broadcast::Receiver<HubMessage>,
    hub: Arc<EventHub>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub async fn recv(&mut self) -> Result<HubMessage, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<HubMessage, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.disconnect(self.topic);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::CommissionsSettledEvent;

    fn settled(partner_id: i64) -> LedgerEvent {
        LedgerEvent::CommissionsSettled(CommissionsSettledEvent {
            partner_id,
            action: "approve".to_string(),
            commission_ids: vec![1],
            total_amount: 1000.into(),
        })
    }

    #[tokio::test]
    async fn connected_partner_receives_instead_of_nudge() {
        let hub = Arc::new(EventHub::default());
        let mut sub = hub.subscribe(Topic::Partner(1));
        hub.publish(settled(1));
        match sub.try_recv().expect("expected a message") {
            HubMessage::Event(ev) => assert_eq!(ev.partner_id(), 1),
            other => panic!("unexpected message {other:?}"),
        }
        assert!(hub.drain_nudges(1).is_empty());
    }

    #[tokio::test]
    async fn offline_partner_gets_one_nudge_per_kind() {
        let hub = Arc::new(EventHub::default());
        hub.publish(settled(2));
        hub.publish(settled(2));
        let nudges = hub.drain_nudges(2);
        assert_eq!(nudges.len(), 1);
        assert_eq!(nudges[0].kind, "commissions_settled");
        // draining empties the queue
        assert!(hub.drain_nudges(2).is_empty());
    }

    #[tokio::test]
    async fn dropping_a_subscription_counts_as_disconnect() {
        let hub = Arc::new(EventHub::default());
        let sub = hub.subscribe(Topic::Partner(3));
        assert_eq!(hub.partner_subscriber_count(3), 1);
        drop(sub);
        assert_eq!(hub.partner_subscriber_count(3), 0);
    }
}
