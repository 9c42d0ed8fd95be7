use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    AccrualCreditedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderAbandonedEvent,
    OrderFinalizedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub accrual_credited_producer: Vec<EventProducer<AccrualCreditedEvent>>,
    pub order_finalized_producer: Vec<EventProducer<OrderFinalizedEvent>>,
    pub order_abandoned_producer: Vec<EventProducer<OrderAbandonedEvent>>,
}

impl EventProducers {
    pub async fn publish_accrual_credited(&self, event: AccrualCreditedEvent) {
        for emitter in &self.accrual_credited_producer {
            trace!("📬️ Notifying accrual credited hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_finalized(&self, event: OrderFinalizedEvent) {
        for emitter in &self.order_finalized_producer {
            trace!("📬️ Notifying order finalized hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_abandoned(&self, event: OrderAbandonedEvent) {
        for emitter in &self.order_abandoned_producer {
            trace!("📬️ Notifying order abandoned hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_accrual_credited: Option<EventHandler<AccrualCreditedEvent>>,
    pub on_order_finalized: Option<EventHandler<OrderFinalizedEvent>>,
    pub on_order_abandoned: Option<EventHandler<OrderAbandonedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_accrual_credited = hooks.on_accrual_credited.map(|f| EventHandler::new(buffer_size, f));
        let on_order_finalized = hooks.on_order_finalized.map(|f| EventHandler::new(buffer_size, f));
        let on_order_abandoned = hooks.on_order_abandoned.map(|f| EventHandler::new(buffer_size, f));
        Self { on_accrual_credited, on_order_finalized, on_order_abandoned }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_accrual_credited {
            result.accrual_credited_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_finalized {
            result.order_finalized_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_abandoned {
            result.order_abandoned_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task for each registered handler. Each task ends once all of its producers have been dropped.
    pub fn start_handlers(self) {
        if let Some(handler) = self.on_accrual_credited {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_finalized {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_abandoned {
            tokio::spawn(handler.start_handler());
        }
    }
}

pub type BoxedHookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_accrual_credited: Option<Handler<AccrualCreditedEvent>>,
    pub on_order_finalized: Option<Handler<OrderFinalizedEvent>>,
    pub on_order_abandoned: Option<Handler<OrderAbandonedEvent>>,
}

impl EventHooks {
    pub fn on_accrual_credited<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AccrualCreditedEvent) -> BoxedHookFuture) + Send + Sync + 'static {
        self.on_accrual_credited = Some(Arc::new(f));
        self
    }

    pub fn on_order_finalized<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderFinalizedEvent) -> BoxedHookFuture) + Send + Sync + 'static {
        self.on_order_finalized = Some(Arc::new(f));
        self
    }

    pub fn on_order_abandoned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAbandonedEvent) -> BoxedHookFuture) + Send + Sync + 'static {
        self.on_order_abandoned = Some(Arc::new(f));
        self
    }
}
