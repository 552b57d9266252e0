//! Per-customer message coalescing.
//!
//! Customers often split one thought over several WhatsApp messages. Each
//! message is queued under its customer id and a flush is scheduled after a
//! quiet window; every new message resets that window. When the window
//! elapses the queued messages are joined with `\n` and handed to a
//! [`BatchHandler`] exactly once.
//!
//! State per customer: `IDLE → PENDING → PENDING (reset) → FLUSHING → IDLE`.
//! The entry is removed from the table before the handler runs, so a message
//! arriving mid-flush opens a new batch.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::time::Sleep,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use metrics::counter;

use {barista_channels::ChannelOutbound, barista_config::DebounceConfig};

/// Downstream consumer of a coalesced batch.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, customer_id: &str, text: &str) -> anyhow::Result<()>;
}

/// Timing and fallback settings for a [`Debouncer`].
#[derive(Debug, Clone)]
pub struct DebounceSettings {
    pub quiet_window: Duration,
    pub handler_timeout: Duration,
    /// Sent to the customer when a reply pass fails.
    pub fallback_message: String,
}

impl DebounceSettings {
    pub fn new(config: &DebounceConfig, fallback_message: impl Into<String>) -> Self {
        Self {
            quiet_window: config.quiet_window(),
            handler_timeout: config.handler_timeout(),
            fallback_message: fallback_message.into(),
        }
    }
}

struct PendingBatch {
    messages: Vec<String>,
    /// Cancelling this stops the scheduled flush.
    timer: CancellationToken,
}

struct Inner {
    pending: Mutex<HashMap<String, PendingBatch>>,
    handler: Arc<dyn BatchHandler>,
    fallback: Arc<dyn ChannelOutbound>,
    settings: DebounceSettings,
}

/// Coalesces rapid-fire messages per customer. Cheap to clone.
#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<Inner>,
}

impl Debouncer {
    pub fn new(
        settings: DebounceSettings,
        handler: Arc<dyn BatchHandler>,
        fallback: Arc<dyn ChannelOutbound>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                handler,
                fallback,
                settings,
            }),
        }
    }

    /// Queue `text` for `customer_id` and (re)start its quiet window.
    ///
    /// Never blocks. Whitespace-only text is dropped and leaves any pending
    /// window untouched; returns whether the text was queued. Must be called
    /// from within a tokio runtime.
    pub fn submit(&self, customer_id: &str, text: &str) -> bool {
        if text.trim().is_empty() {
            debug!(customer_id, "dropping empty message");
            #[cfg(feature = "metrics")]
            counter!("messages_dropped_total", "reason" => "empty").increment(1);
            return false;
        }

        let token = CancellationToken::new();
        // Deadline is fixed here, not when the timer task first runs.
        let sleep = tokio::time::sleep(self.inner.settings.quiet_window);

        let queued = {
            let mut pending = self.inner.lock_pending();
            let batch = pending
                .entry(customer_id.to_string())
                .or_insert_with(|| PendingBatch {
                    messages: Vec::new(),
                    timer: CancellationToken::new(),
                });
            batch.timer.cancel();
            batch.timer = token.clone();
            batch.messages.push(text.to_string());
            batch.messages.len()
        };

        debug!(customer_id, queued, "message queued");
        tokio::spawn(Arc::clone(&self.inner).run_timer(customer_id.to_string(), token, sleep));
        true
    }

    /// Number of customers with a batch waiting for its window to elapse.
    pub fn pending_count(&self) -> usize {
        self.inner.lock_pending().len()
    }

    /// Cancel every pending window. Queued batches are logged and discarded.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<(String, PendingBatch)> = self.inner.lock_pending().drain().collect();
        for (customer_id, batch) in &drained {
            batch.timer.cancel();
            warn!(
                customer_id = %customer_id,
                batch = %batch.messages.join("\n"),
                "dropping pending batch on shutdown"
            );
            #[cfg(feature = "metrics")]
            counter!("messages_dropped_total", "reason" => "shutdown")
                .increment(batch.messages.len() as u64);
        }
        drained.len()
    }
}

impl Inner {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, PendingBatch>> {
        // The table holds plain data; a panic elsewhere cannot leave it torn.
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn run_timer(self: Arc<Self>, customer_id: String, token: CancellationToken, sleep: Sleep) {
        tokio::select! {
            biased;
            () = token.cancelled() => return,
            () = sleep => {},
        }

        let Some(messages) = self.take_if_live(&customer_id, &token) else {
            return;
        };
        self.flush(&customer_id, messages).await;
    }

    /// Remove the batch, unless a newer submit replaced our timer.
    fn take_if_live(&self, customer_id: &str, token: &CancellationToken) -> Option<Vec<String>> {
        let mut pending = self.lock_pending();
        // Resets cancel the old token under this same lock.
        if token.is_cancelled() {
            return None;
        }
        pending.remove(customer_id).map(|batch| batch.messages)
    }

    async fn flush(&self, customer_id: &str, messages: Vec<String>) {
        let count = messages.len();
        let text = messages.join("\n");
        info!(customer_id, messages = count, "flushing batch");
        #[cfg(feature = "metrics")]
        counter!("batches_flushed_total").increment(1);

        let handler = Arc::clone(&self.handler);
        let (id, batch) = (customer_id.to_string(), text.clone());
        let task = tokio::spawn(async move { handler.handle(&id, &batch).await });
        let abort = task.abort_handle();

        let failure = match tokio::time::timeout(self.settings.handler_timeout, task).await {
            Ok(Ok(Ok(()))) => {
                debug!(customer_id, "batch handled");
                return;
            },
            Ok(Ok(Err(e))) => format!("{e:#}"),
            Ok(Err(join_err)) if join_err.is_panic() => "reply handler panicked".to_string(),
            Ok(Err(_)) => "reply handler was cancelled".to_string(),
            Err(_) => {
                abort.abort();
                format!(
                    "reply handler timed out after {}ms",
                    self.settings.handler_timeout.as_millis()
                )
            },
        };

        error!(customer_id, batch = %text, error = %failure, "reply failed, sending fallback");
        #[cfg(feature = "metrics")]
        counter!("batch_fallbacks_total").increment(1);

        if let Err(e) = self
            .fallback
            .send_text(customer_id, &self.settings.fallback_message)
            .await
        {
            error!(customer_id, error = %e, "fallback message could not be sent");
        }
    }
}
