//! Events emitted by the ledger pipeline, and the hub that fans them out.
//!
//! The APIs publish domain events through per-family bounded channels ([`channel`]); the
//! [`hub::EventHub`] groups live subscribers into partner/admin/analytics topics and parks a
//! nudge for offline partners. Wire the two together with [`hub::EventHub::fanout_hooks`]:
//!
//! ```ignore
//! let hub = Arc::new(EventHub::default());
//! let handlers = EventHandlers::new(config.event_buffer_size, hub.fanout_hooks());
//! let producers = handlers.producers();
//! handlers.start_handlers().await;
//! let heartbeat = hub.start_heartbeat(config.heartbeat_interval);
//! ```
mod channel;
mod event_types;
mod hooks;
pub mod hub;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
pub use hub::{EventHub, HubMessage, OfflineNudge, Subscription, Topic};
