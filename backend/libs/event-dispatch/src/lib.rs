//! Mode-keyed event dispatch over an at-least-once bus.
//!
//! A [`HandlerTable`] binds each [`event_schema::EventMode`] to one
//! [`EventHandler`]. The [`Dispatcher`] runs the handler, recovers panics and
//! maps the result to an [`Outcome`]: ack, redeliver on a delay tier, dead
//! letter once the [`RedeliveryPolicy`] budget is spent, or discard.

pub mod dispatcher;
pub mod dlq;
pub mod error;
pub mod handler;
pub mod headers;
pub mod kafka;
pub mod metrics;
pub mod policy;
pub mod publisher;

pub use dispatcher::{Dispatcher, Outcome};
pub use dlq::DeadLetter;
pub use error::{HandlerError, PublishError};
pub use handler::{handler_fn, EventHandler, HandlerTable};
pub use headers::DeliveryHeaders;
pub use kafka::{ConsumerConfig, KafkaDispatchRunner};
pub use metrics::DispatchMetrics;
pub use policy::RedeliveryPolicy;
pub use publisher::{EventPublisher, KafkaEventPublisher, KafkaPublisherConfig, MemoryEventPublisher};
