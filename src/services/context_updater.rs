use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{InteractionEvent, UserShoppingContext},
    services::providers::UserContextStore,
};

/// Message for asynchronous context updates
struct ContextUpdateMessage {
    user_id: Uuid,
    event: InteractionEvent,
}

/// Folds interaction events into stored shopping contexts off the request path
#[derive(Clone)]
pub struct ContextUpdater {
    update_tx: mpsc::UnboundedSender<ContextUpdateMessage>,
}

/// Handle for gracefully shutting down the context worker
pub struct ContextUpdaterHandle {
    shutdown_tx: mpsc::Sender<()>,
    worker: tokio::task::JoinHandle<()>,
}

impl ContextUpdaterHandle {
    /// Signals the worker and waits until queued events are applied
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Context updater shutdown signal sent");
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "Context updater task failed");
        }
    }
}

impl ContextUpdater {
    /// Spawns the background worker that owns all context writes
    pub fn spawn(store: Arc<dyn UserContextStore>) -> (Self, ContextUpdaterHandle) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = tokio::spawn(async move {
            Self::context_worker_task(store, update_rx, shutdown_rx).await;
        });

        (
            Self { update_tx },
            ContextUpdaterHandle {
                shutdown_tx,
                worker,
            },
        )
    }

    /// Queues an event and returns immediately
    ///
    /// Failures are logged by the worker and never reach the caller.
    pub fn update(&self, user_id: Uuid, event: InteractionEvent) {
        let msg = ContextUpdateMessage { user_id, event };
        if let Err(e) = self.update_tx.send(msg) {
            tracing::error!(user_id = %user_id, error = %e, "Failed to queue context update");
        }
    }

    async fn context_worker_task(
        store: Arc<dyn UserContextStore>,
        mut update_rx: mpsc::UnboundedReceiver<ContextUpdateMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(store = store.name(), "Context updater task started");

        loop {
            tokio::select! {
                Some(msg) = update_rx.recv() => {
                    Self::apply_logged(store.as_ref(), msg).await;
                }
                Some(()) = shutdown_rx.recv() => {
                    tracing::info!("Context updater shutting down, draining queued events");
                    update_rx.close();
                    while let Some(msg) = update_rx.recv().await {
                        Self::apply_logged(store.as_ref(), msg).await;
                    }
                    tracing::info!("Context updater task stopped");
                    break;
                }
                else => break,
            }
        }
    }

    async fn apply_logged(store: &dyn UserContextStore, msg: ContextUpdateMessage) {
        let user_id = msg.user_id;
        if let Err(e) = Self::apply(store, msg).await {
            tracing::error!(user_id = %user_id, error = %e, "Failed to update shopping context");
        }
    }

    /// Read-modify-write of one user's context
    async fn apply(store: &dyn UserContextStore, msg: ContextUpdateMessage) -> AppResult<()> {
        let mut context = store
            .load(msg.user_id)
            .await?
            .unwrap_or_else(|| UserShoppingContext::new(msg.user_id));
        context.apply(&msg.event);
        store.save(&context).await?;

        tracing::debug!(
            user_id = %msg.user_id,
            kind = ?msg.event.kind,
            "Shopping context updated"
        );
        Ok(())
    }
}
