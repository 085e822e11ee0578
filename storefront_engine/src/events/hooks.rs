use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderAnnulledEvent,
    OrderPaidEvent,
    OrderPlacedEvent,
    OrderRefundedEvent,
    ReturnSubmittedEvent,
};

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_placed_producer: Vec<EventProducer<OrderPlacedEvent>>,
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_annulled_producer: Vec<EventProducer<OrderAnnulledEvent>>,
    pub order_refunded_producer: Vec<EventProducer<OrderRefundedEvent>>,
    pub return_submitted_producer: Vec<EventProducer<ReturnSubmittedEvent>>,
}

impl EventProducers {
    pub async fn order_placed(&self, event: OrderPlacedEvent) {
        for producer in &self.order_placed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn order_paid(&self, event: OrderPaidEvent) {
        for producer in &self.order_paid_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn order_annulled(&self, event: OrderAnnulledEvent) {
        for producer in &self.order_annulled_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn order_refunded(&self, event: OrderRefundedEvent) {
        for producer in &self.order_refunded_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn return_submitted(&self, event: ReturnSubmittedEvent) {
        for producer in &self.return_submitted_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_placed: Option<EventHandler<OrderPlacedEvent>>,
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_annulled: Option<EventHandler<OrderAnnulledEvent>>,
    pub on_order_refunded: Option<EventHandler<OrderRefundedEvent>>,
    pub on_return_submitted: Option<EventHandler<ReturnSubmittedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_placed: hooks.on_order_placed.map(|f| EventHandler::new("OrderPlaced", buffer_size, f)),
            on_order_paid: hooks.on_order_paid.map(|f| EventHandler::new("OrderPaid", buffer_size, f)),
            on_order_annulled: hooks.on_order_annulled.map(|f| EventHandler::new("OrderAnnulled", buffer_size, f)),
            on_order_refunded: hooks.on_order_refunded.map(|f| EventHandler::new("OrderRefunded", buffer_size, f)),
            on_return_submitted: hooks
                .on_return_submitted
                .map(|f| EventHandler::new("ReturnSubmitted", buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_placed {
            result.order_placed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_annulled {
            result.order_annulled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_refunded {
            result.order_refunded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_return_submitted {
            result.return_submitted_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        spawn_handler(self.on_order_placed);
        spawn_handler(self.on_order_paid);
        spawn_handler(self.on_order_annulled);
        spawn_handler(self.on_order_refunded);
        spawn_handler(self.on_return_submitted);
    }
}

fn spawn_handler<E: Send + Sync + 'static>(handler: Option<EventHandler<E>>) {
    if let Some(handler) = handler {
        tokio::spawn(async move {
            handler.start_handler().await;
        });
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_placed: Option<Handler<OrderPlacedEvent>>,
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_annulled: Option<Handler<OrderAnnulledEvent>>,
    pub on_order_refunded: Option<Handler<OrderRefundedEvent>>,
    pub on_return_submitted: Option<Handler<ReturnSubmittedEvent>>,
}

impl EventHooks {
    pub fn on_order_placed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPlacedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_placed = Some(Arc::new(f));
        self
    }

    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAnnulledEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_order_refunded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderRefundedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_refunded = Some(Arc::new(f));
        self
    }

    pub fn on_return_submitted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReturnSubmittedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_return_submitted = Some(Arc::new(f));
        self
    }
}
