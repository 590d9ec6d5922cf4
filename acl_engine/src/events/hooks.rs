use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    ClickRecordedEvent,
    CommissionStatusChangedEvent,
    CommissionsSettledEvent,
    ConversionRecordedEvent,
    EventHandler,
    EventProducer,
    Handler,
    PayoutUpdatedEvent,
    SessionEndedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub click_recorded: Vec<EventProducer<ClickRecordedEvent>>,
    pub conversion_recorded: Vec<EventProducer<ConversionRecordedEvent>>,
    pub commission_status_changed: Vec<EventProducer<CommissionStatusChangedEvent>>,
    pub commissions_settled: Vec<EventProducer<CommissionsSettledEvent>>,
    pub payout_updated: Vec<EventProducer<PayoutUpdatedEvent>>,
    pub session_ended: Vec<EventProducer<SessionEndedEvent>>,
}

pub struct EventHandlers {
    pub on_click_recorded: Option<EventHandler<ClickRecordedEvent>>,
    pub on_conversion_recorded: Option<EventHandler<ConversionRecordedEvent>>,
    pub on_commission_status_changed: Option<EventHandler<CommissionStatusChangedEvent>>,
    pub on_commissions_settled: Option<EventHandler<CommissionsSettledEvent>>,
    pub on_payout_updated: Option<EventHandler<PayoutUpdatedEvent>>,
    pub on_session_ended: Option<EventHandler<SessionEndedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_click_recorded: hooks.on_click_recorded.map(|f| EventHandler::new(buffer_size, f)),
            on_conversion_recorded: hooks.on_conversion_recorded.map(|f| EventHandler::new(buffer_size, f)),
            on_commission_status_changed: hooks
                .on_commission_status_changed
                .map(|f| EventHandler::new(buffer_size, f)),
            on_commissions_settled: hooks.on_commissions_settled.map(|f| EventHandler::new(buffer_size, f)),
            on_payout_updated: hooks.on_payout_updated.map(|f| EventHandler::new(buffer_size, f)),
            on_session_ended: hooks.on_session_ended.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_click_recorded {
            result.click_recorded.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_conversion_recorded {
            result.conversion_recorded.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_commission_status_changed {
            result.commission_status_changed.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_commissions_settled {
            result.commissions_settled.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payout_updated {
            result.payout_updated.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_session_ended {
            result.session_ended.push(handler.subscribe());
        }
        result
    }

    /// Spawns one dedicated worker task per configured hook.
    pub async fn start_handlers(self) {
        fn spawn<E: Send + Sync + 'static>(handler: Option<EventHandler<E>>) {
            if let Some(handler) = handler {
                tokio::spawn(async move {
                    handler.start_handler().await;
                });
            }
        }
        spawn(self.on_click_recorded);
        spawn(self.on_conversion_recorded);
        spawn(self.on_commission_status_changed);
        spawn(self.on_commissions_settled);
        spawn(self.on_payout_updated);
        spawn(self.on_session_ended);
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_click_recorded: Option<Handler<ClickRecordedEvent>>,
    pub on_conversion_recorded: Option<Handler<ConversionRecordedEvent>>,
    pub on_commission_status_changed: Option<Handler<CommissionStatusChangedEvent>>,
    pub on_commissions_settled: Option<Handler<CommissionsSettledEvent>>,
    pub on_payout_updated: Option<Handler<PayoutUpdatedEvent>>,
    pub on_session_ended: Option<Handler<SessionEndedEvent>>,
}

impl EventHooks {
    pub fn on_click_recorded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ClickRecordedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_click_recorded = Some(Arc::new(f));
        self
    }

    pub fn on_conversion_recorded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ConversionRecordedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_conversion_recorded = Some(Arc::new(f));
        self
    }

    pub fn on_commission_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CommissionStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_commission_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_commissions_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CommissionsSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_commissions_settled = Some(Arc::new(f));
        self
    }

    pub fn on_payout_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PayoutUpdatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payout_updated = Some(Arc::new(f));
        self
    }

    pub fn on_session_ended<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SessionEndedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_session_ended = Some(Arc::new(f));
        self
    }
}
