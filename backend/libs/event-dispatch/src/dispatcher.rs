use crate::error::HandlerError;
use crate::handler::HandlerTable;
use crate::metrics::DispatchMetrics;
use crate::policy::RedeliveryPolicy;
use event_schema::EventEnvelope;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// What the transport must do with a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    /// Present the message again after `delay`, on tier `tier`, as attempt
    /// `attempt`.
    Redeliver {
        attempt: u32,
        tier: usize,
        delay: Duration,
        reason: String,
    },
    DeadLetter {
        attempts: u32,
        reason: String,
    },
    Discard {
        reason: String,
    },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Ack => "ack",
            Outcome::Redeliver { .. } => "redeliver",
            Outcome::DeadLetter { .. } => "dead_letter",
            Outcome::Discard { .. } => "discard",
        }
    }
}

/// Routes each event to the handler bound to its mode and turns the result
/// into an [`Outcome`]. Performs no deduplication.
pub struct Dispatcher {
    table: HandlerTable,
    policy: RedeliveryPolicy,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    pub fn new(table: HandlerTable, policy: RedeliveryPolicy) -> Self {
        Self {
            table,
            policy,
            metrics: DispatchMetrics,
        }
    }

    pub fn policy(&self) -> &RedeliveryPolicy {
        &self.policy
    }

    pub fn table(&self) -> &HandlerTable {
        &self.table
    }

    /// Decode a raw bus payload and dispatch it.
    pub async fn dispatch_raw(&self, raw: &[u8], attempt: u32) -> Outcome {
        match EventEnvelope::from_slice(raw) {
            Ok(event) => self.dispatch(&event, attempt).await,
            Err(e) => {
                warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(raw),
                    "Discarding undecodable event"
                );
                self.metrics.record_outcome("unknown", "discard");
                Outcome::Discard {
                    reason: format!("undecodable payload: {}", e),
                }
            }
        }
    }

    pub async fn dispatch(&self, event: &EventEnvelope, attempt: u32) -> Outcome {
        let mode = event.mode;
        let Some(handler) = self.table.get(mode) else {
            warn!(mode = %mode, event_id = %event.event_id, "No handler bound for mode");
            self.metrics.record_outcome(mode.as_str(), "discard");
            return Outcome::Discard {
                reason: format!("no handler bound for mode {}", mode),
            };
        };

        let started = Instant::now();
        let result = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
        self.metrics
            .observe_handler(mode.as_str(), started.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(Ok(())) => {
                debug!(mode = %mode, event_id = %event.event_id, attempt, "Event handled");
                Outcome::Ack
            }
            Ok(Err(HandlerError::Malformed(reason))) => {
                warn!(
                    mode = %mode,
                    event_id = %event.event_id,
                    reason = %reason,
                    "Discarding malformed event"
                );
                Outcome::Discard { reason }
            }
            Ok(Err(HandlerError::Retryable(err))) => {
                warn!(
                    mode = %mode,
                    event_id = %event.event_id,
                    attempt,
                    error = %format!("{:#}", err),
                    "Event handler failed"
                );
                self.after_failure(attempt, format!("{:#}", err))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    mode = %mode,
                    event_id = %event.event_id,
                    attempt,
                    panic = %message,
                    payload = %serde_json::Value::Object(event.payload.clone()),
                    "Event handler panicked"
                );
                self.after_failure(attempt, format!("handler panicked: {}", message))
            }
        };

        self.metrics.record_outcome(mode.as_str(), outcome.label());
        outcome
    }

    fn after_failure(&self, attempt: u32, reason: String) -> Outcome {
        match self.policy.next(attempt) {
            Some((tier, delay)) => Outcome::Redeliver {
                attempt: attempt + 1,
                tier,
                delay,
                reason,
            },
            None => Outcome::DeadLetter {
                attempts: attempt + 1,
                reason,
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
