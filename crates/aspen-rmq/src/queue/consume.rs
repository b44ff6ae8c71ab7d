//! Push-style consumption.
//!
//! `start_consuming` spawns a fetch task that keeps a bounded channel topped
//! up with deliveries moved from the ready list. Each consumer added with
//! `add_consumer` runs in its own task and pulls from that shared channel, so
//! the channel capacity is the prefetch limit for the whole queue handle.
//!
//! Buffered deliveries are already in the unacknowledged list. Stopping
//! leaves them there; `return_all_unacked` or peer recovery puts them back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Delivery;
use super::Queue;
use crate::connection::unique_name;
use crate::error::AlreadyConsumingSnafu;
use crate::error::InvalidPrefetchLimitSnafu;
use crate::error::NotConsumingSnafu;
use crate::error::Result;
use crate::store::ListStore;

/// Handles deliveries from a consuming queue.
///
/// A consumer is expected to ack or reject each delivery. One it drops stays
/// unacknowledged until the queue is closed or the connection is recovered.
#[async_trait]
pub trait Consumer<S: ListStore + ?Sized>: Send + Sync + 'static {
    /// Process one delivery.
    async fn consume(&self, delivery: Delivery<S>);
}

type SharedReceiver<S> = Arc<Mutex<mpsc::Receiver<Delivery<S>>>>;

pub(super) struct Consuming<S: ListStore + ?Sized> {
    cancel: CancellationToken,
    deliveries: SharedReceiver<S>,
    fetcher: Option<JoinHandle<()>>,
    consumers: Vec<JoinHandle<()>>,
}

impl<S: ListStore + ?Sized> Drop for Consuming<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Fetcher<S: ListStore + ?Sized> {
    queue: String,
    ready_key: String,
    unacked_key: String,
    store: Arc<S>,
    poll_interval: Duration,
}

impl<S: ListStore + ?Sized + 'static> Fetcher<S> {
    async fn run(self, sender: mpsc::Sender<Delivery<S>>, cancel: CancellationToken) {
        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = sender.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.store.list_move(&self.ready_key, &self.unacked_key).await {
                Ok(Some(payload)) => {
                    permit.send(Delivery::new(
                        payload,
                        self.unacked_key.clone(),
                        self.ready_key.clone(),
                        self.store.clone(),
                    ));
                    continue;
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    drop(permit);
                    warn!(queue = %self.queue, error = %e, "failed to fetch from ready list");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        debug!(queue = %self.queue, "fetcher stopped");
    }
}

async fn run_consumer<S, C>(
    name: String,
    consumer: C,
    deliveries: SharedReceiver<S>,
    cancel: CancellationToken,
    store: Arc<S>,
    consumers_key: String,
) where
    S: ListStore + ?Sized + 'static,
    C: Consumer<S>,
{
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => None,
            delivery = async { deliveries.lock().await.recv().await } => delivery,
        };
        let Some(delivery) = next else { break };
        consumer.consume(delivery).await;
    }

    if let Err(e) = store.set_remove(&consumers_key, &name).await {
        warn!(consumer = %name, error = %e, "failed to deregister consumer");
    }
    debug!(consumer = %name, "consumer stopped");
}

impl<S: ListStore + ?Sized + 'static> Queue<S> {
    /// Whether `start_consuming` is active on this handle.
    pub fn is_consuming(&self) -> bool {
        self.consuming.is_some()
    }

    /// Start fetching from the ready list into a buffer of `prefetch_limit`
    /// deliveries, polling every `poll_interval` while the list is empty.
    pub async fn start_consuming(&mut self, prefetch_limit: usize, poll_interval: Duration) -> Result<()> {
        snafu::ensure!(self.consuming.is_none(), AlreadyConsumingSnafu { queue: &self.name });
        snafu::ensure!(prefetch_limit > 0, InvalidPrefetchLimitSnafu {
            queue: &self.name,
            limit: prefetch_limit,
        });

        self.register_in_connection().await?;

        let (sender, receiver) = mpsc::channel(prefetch_limit);
        let cancel = CancellationToken::new();
        let fetcher = Fetcher {
            queue: self.name.clone(),
            ready_key: self.ready_key.clone(),
            unacked_key: self.unacked_key.clone(),
            store: self.store.clone(),
            poll_interval,
        };
        let fetcher = tokio::spawn(fetcher.run(sender, cancel.clone()));

        self.consuming = Some(Consuming {
            cancel,
            deliveries: Arc::new(Mutex::new(receiver)),
            fetcher: Some(fetcher),
            consumers: Vec::new(),
        });
        info!(queue = %self.name, connection = %self.connection, prefetch_limit, "started consuming");
        Ok(())
    }

    /// Register a consumer named `<tag>-<random suffix>` and start feeding it.
    ///
    /// Returns the consumer name.
    pub async fn add_consumer<C: Consumer<S>>(&mut self, tag: &str, consumer: C) -> Result<String> {
        let Some(consuming) = self.consuming.as_mut() else {
            return NotConsumingSnafu { queue: &self.name }.fail();
        };

        let name = unique_name(tag);
        self.store.set_add(&self.consumers_key, &name).await?;

        let task = tokio::spawn(run_consumer(
            name.clone(),
            consumer,
            consuming.deliveries.clone(),
            consuming.cancel.clone(),
            self.store.clone(),
            self.consumers_key.clone(),
        ));
        consuming.consumers.push(task);

        info!(queue = %self.name, consumer = %name, "consumer added");
        Ok(name)
    }

    /// Stop fetching and wait for every consumer to finish its current
    /// delivery. Returns false if the queue was not consuming.
    pub async fn stop_consuming(&mut self) -> bool {
        let Some(mut consuming) = self.consuming.take() else {
            return false;
        };

        consuming.cancel.cancel();
        if let Some(fetcher) = consuming.fetcher.take()
            && let Err(e) = fetcher.await
        {
            warn!(queue = %self.name, error = %e, "fetch task ended abnormally");
        }
        for task in consuming.consumers.drain(..) {
            if let Err(e) = task.await {
                warn!(queue = %self.name, error = %e, "consumer task ended abnormally");
            }
        }

        info!(queue = %self.name, connection = %self.connection, "stopped consuming");
        true
    }
}
