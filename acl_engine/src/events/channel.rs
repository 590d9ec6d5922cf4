//! Bounded message-passing plumbing between the ledger APIs and event consumers.
//!
//! Each hook gets its own bounded mpsc channel and a dedicated worker task draining it, so
//! back-pressure and ordering are explicit properties of the channel rather than accidents of a
//! callback graph. Handlers are stateless: all they receive is the event itself, though they can
//! be async.
use std::{
    future::Future,
    pin::Pin,
    sync::{atomic::AtomicI64, Arc},
};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs the worker until every producer has been dropped, then waits for in-flight handler
    /// invocations to finish before returning.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // drop the internal sender so the worker shuts down automatically once the last
        // subscribed producer is dropped
        drop(self.sender);
        let jobs = Arc::new(AtomicI64::new(0));
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let job = jobs.clone();
            tokio::spawn(async move {
                (handler)(ev).await;
                job.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                trace!("📬️ Event handled");
            });
        }
        match tokio::spawn(async move {
            while jobs.load(std::sync::atomic::Ordering::SeqCst) > 0 {
                debug!("📬️ Waiting for in-flight handlers to complete");
                tokio::time::sleep(tokio::time::Duration::from_millis(1000)).await;
            }
        })
        .await
        {
            Ok(_) => {
                debug!("📬️ Event handler shutting down gracefully");
            },
            Err(e) => {
                warn!("📬️ Event handler shutdown wait failed: {e}. Logging this just in case.");
            },
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU64;

    use super::*;

    #[tokio::test]
    async fn events_from_all_producers_reach_the_handler() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let t2 = total.clone();
        let handler = Arc::new(move |amount| {
            let total = total.clone();
            Box::pin(async move {
                debug!("Handler received commission amount {amount}");
                let _ = total.fetch_add(amount, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(1, handler);
        let producer_1 = event_handler.subscribe();
        let producer_2 = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..5u64 {
                producer_1.publish_event(i * 100).await;
            }
        });
        tokio::spawn(async move {
            for i in 0..5u64 {
                producer_2.publish_event(i * 10).await;
            }
        });

        event_handler.start_handler().await;
        assert_eq!(t2.load(std::sync::atomic::Ordering::SeqCst), 1100);
    }
}
