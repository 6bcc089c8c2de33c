pub mod allocation;
pub mod cache;
pub mod purchase;
pub mod session;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::RetryPolicy;
use crate::dlq::DlqPublisher;
use crate::error::AppError;
use crate::events::extract_event_id;
use crate::logger::{worker_span, CorrelationId};
use crate::retry::execute_with_retry;
use crate::transport::{EventLogTransport, InboundMessage};

/// Idle backoff between empty polls, so a drained topic doesn't spin hot.
const POLL_IDLE_BACKOFF: Duration = Duration::from_millis(50);

/// Drives one consumer group against one topic until `shutdown` fires
/// (§5 "one message per partition at a time").
///
/// `handler` owns the worker-specific idempotency check, side effects, and
/// downstream emission. Its `Err` is retried up to `policy`'s budget; on
/// exhaustion a non-best-effort error goes to the DLQ, a best-effort one is
/// logged at WARN and swallowed (§4.3). Either way the offset is committed
/// afterwards — leaving it uncommitted would redeliver the same poison
/// message forever once its permanent record already lives in the DLQ.
pub async fn run_worker_loop<F, Fut>(
    worker: &'static str,
    topic: &str,
    group: &str,
    transport: Arc<dyn EventLogTransport>,
    policy: RetryPolicy,
    dlq: Option<Arc<DlqPublisher>>,
    mut shutdown: watch::Receiver<bool>,
    handler: F,
) where
    F: Fn(InboundMessage) -> Fut,
    Fut: std::future::Future<Output = Result<(), AppError>>,
{
    loop {
        if *shutdown.borrow() {
            return;
        }

        let msg = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() { return; }
                continue;
            }
            polled = transport.poll(topic, group) => polled,
        };

        let msg = match msg {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tokio::time::sleep(POLL_IDLE_BACKOFF).await;
                continue;
            }
            Err(e) => {
                tracing::error!(worker, topic, error = %e, "poll failed");
                tokio::time::sleep(POLL_IDLE_BACKOFF).await;
                continue;
            }
        };

        let event_id = extract_event_id(&msg.payload);
        let correlation_id = CorrelationId::new(msg.key.clone());
        let span = worker_span(worker, &correlation_id);
        let _enter = span.enter();

        let attempts_used = AtomicU32::new(0);
        let result = execute_with_retry(&policy, |attempt| {
            attempts_used.store(attempt, Ordering::SeqCst);
            handler(msg.clone())
        })
        .await;

        match result {
            Ok(()) => {
                if let Err(e) = transport.commit(group, &msg).await {
                    tracing::error!(worker, error = %e, "commit failed after successful handling");
                }
            }
            Err(e) if e.is_best_effort() => {
                tracing::warn!(worker, error = %e, "best-effort handler failed, swallowing");
                if let Err(commit_err) = transport.commit(group, &msg).await {
                    tracing::error!(worker, error = %commit_err, "commit failed after swallowed error");
                }
            }
            Err(e) => {
                let attempts = attempts_used.load(Ordering::SeqCst);
                tracing::error!(worker, error = %e, attempts, "handler exhausted retries");
                if let Some(dlq) = &dlq {
                    if let Err(dlq_err) = dlq
                        .publish(
                            msg.payload.clone(),
                            &msg.topic,
                            msg.partition,
                            msg.offset,
                            e.to_string(),
                            attempts,
                            &msg.key,
                            event_id,
                        )
                        .await
                    {
                        tracing::error!(worker, error = %dlq_err, "failed to publish to DLQ");
                    }
                }
                if let Err(commit_err) = transport.commit(group, &msg).await {
                    tracing::error!(worker, error = %commit_err, "commit failed after DLQ publish");
                }
            }
        }
    }
}
