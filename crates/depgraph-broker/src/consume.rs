//! Bridge between a blocking broker channel and an asynchronous worker.
//!
//! The broker channel is not safe to share across threads, so each
//! subscription spawns a dedicated OS thread that owns its own connection and
//! channel. Two bounded hand-off channels connect it to the worker:
//!
//! ```text
//!    [broker thread] --(record)--> records --> [async worker]
//!    [broker thread] <-(ack/nack)--  acks  <-- [async worker]
//! ```
//!
//! The delivery handler blocks awaiting the worker's ack decision, so
//! delivery and acknowledgement stay paired on the broker side and processing
//! is strictly sequential within one consumer.

use std::thread;
use std::time::Duration;

use depgraph_core::config::RabbitConfig;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{BrokerError, Result};
use crate::topology;

/// How long the worker waits on the record queue before checking whether the
/// consumer thread is still alive.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker-side handle of one queue subscription.
pub struct Subscription<T> {
    queue: &'static str,
    records: mpsc::Receiver<T>,
    acks: mpsc::Sender<bool>,
    handle: thread::JoinHandle<()>,
}

impl<T> Subscription<T> {
    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// The next decoded record, or `None` once the consumer thread has died.
    ///
    /// After every `Some`, exactly one [`ack`](Self::ack) call must follow
    /// before the next `recv`; the broker thread is blocked on that decision.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match tokio::time::timeout(POLL_TIMEOUT, self.records.recv()).await {
                Ok(Some(record)) => return Some(record),
                Ok(None) => {
                    tracing::error!(queue = self.queue, "consumer thread has died");
                    return None;
                }
                Err(_) if !self.is_alive() => {
                    tracing::error!(queue = self.queue, "consumer thread has died");
                    return None;
                }
                Err(_) => {}
            }
        }
    }

    /// Post the ack decision for the record most recently received. `false`
    /// nacks the delivery and shuts the subscription down.
    pub async fn ack(&self, ack: bool) {
        if self.acks.send(ack).await.is_err() {
            tracing::warn!(
                queue = self.queue,
                "consumer thread gone before ack decision could be delivered"
            );
        }
    }
}

/// Spawn the consumer thread for `queue` and return the worker-side handle.
///
/// Records are decoded from JSON into `T` as they are delivered; a payload
/// that fails to decode nacks the delivery, closes the channel, and kills the
/// thread, surfacing through [`Subscription::recv`] returning `None`.
pub fn start_consume_thread<T>(
    config: RabbitConfig,
    queue: &'static str,
    prefetch_count: u16,
) -> Result<Subscription<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    let capacity = usize::from(prefetch_count.max(1));
    let (record_tx, record_rx) = mpsc::channel(capacity);
    let (ack_tx, ack_rx) = mpsc::channel(1);

    let handle = thread::Builder::new()
        .name(format!("consume-{queue}"))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(error) => {
                    tracing::error!(%error, queue, "failed to build consumer runtime");
                    return;
                }
            };

            match runtime.block_on(consume_loop::<T>(
                &config,
                queue,
                prefetch_count,
                record_tx,
                ack_rx,
            )) {
                Ok(()) => tracing::info!(queue, "consumer thread stopped"),
                Err(error) => {
                    tracing::error!(%error, queue, "consumer thread exited with error");
                }
            }
        })?;

    Ok(Subscription {
        queue,
        records: record_rx,
        acks: ack_tx,
        handle,
    })
}

async fn consume_loop<T>(
    config: &RabbitConfig,
    queue: &'static str,
    prefetch_count: u16,
    record_tx: mpsc::Sender<T>,
    mut ack_rx: mpsc::Receiver<bool>,
) -> Result<()>
where
    T: DeserializeOwned + Send + 'static,
{
    let connection = topology::connect(config).await?;
    let channel = connection.create_channel().await?;
    topology::declare_topology(&channel, config).await?;
    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await?;

    let consumer_tag = match &config.ctag_prefix {
        Some(prefix) => {
            let tag = format!("{prefix}{}", Uuid::new_v4());
            tracing::info!(queue, consumer_tag = %tag, "starting consumer");
            tag
        }
        None => String::new(),
    };

    let mut consumer = channel
        .basic_consume(
            queue,
            &consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;

        match hand_off(queue, &delivery.data, &record_tx, &mut ack_rx).await {
            Ok(true) => delivery.ack(BasicAckOptions::default()).await?,
            Ok(false) => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await?;
                channel.close(200, "worker nacked").await?;
                return Ok(());
            }
            Err(error) => {
                tracing::error!(%error, queue, "error while handling delivery");
                let _ = delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await;
                let _ = channel.close(500, "delivery handling failed").await;
                return Err(error);
            }
        }
    }

    Ok(())
}

/// Decode one delivery, push it to the worker, and block on the ack verdict.
async fn hand_off<T>(
    queue: &'static str,
    body: &[u8],
    record_tx: &mpsc::Sender<T>,
    ack_rx: &mut mpsc::Receiver<bool>,
) -> Result<bool>
where
    T: DeserializeOwned,
{
    let record: T =
        serde_json::from_slice(body).map_err(|source| BrokerError::Decode { queue, source })?;

    record_tx
        .send(record)
        .await
        .map_err(|_| BrokerError::WorkerGone { queue })?;

    ack_rx
        .recv()
        .await
        .ok_or(BrokerError::WorkerGone { queue })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hand_off_delivers_record_and_returns_verdict() {
        let (record_tx, mut record_rx) = mpsc::channel::<u64>(1);
        let (ack_tx, mut ack_rx) = mpsc::channel(1);

        let worker = tokio::spawn(async move {
            let record = record_rx.recv().await.unwrap();
            ack_tx.send(record == 7).await.unwrap();
        });

        let verdict = hand_off("package_names", b"7", &record_tx, &mut ack_rx)
            .await
            .unwrap();
        assert!(verdict);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_hand_off_rejects_undecodable_payload() {
        let (record_tx, _record_rx) = mpsc::channel::<u64>(1);
        let (_ack_tx, mut ack_rx) = mpsc::channel(1);

        let result = hand_off("package_names", b"not json", &record_tx, &mut ack_rx).await;
        assert!(matches!(result, Err(BrokerError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_hand_off_detects_worker_gone() {
        let (record_tx, record_rx) = mpsc::channel::<u64>(1);
        let (ack_tx, mut ack_rx) = mpsc::channel(1);
        drop(record_rx);
        drop(ack_tx);

        let result = hand_off("package_names", b"7", &record_tx, &mut ack_rx).await;
        assert!(matches!(result, Err(BrokerError::WorkerGone { .. })));
    }
}
