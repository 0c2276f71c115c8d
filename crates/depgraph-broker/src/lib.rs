//! RabbitMQ plumbing for the pipeline.
//!
//! Three concerns live here: declaring the topic-exchange topology every
//! process agrees on, bridging a broker channel (which must never cross
//! threads) into an asynchronous worker via paired hand-off channels, and
//! publishing domain records on deterministic routing keys.

pub mod consume;
pub mod error;
pub mod publish;
pub mod routing;
pub mod topology;

pub use consume::{Subscription, start_consume_thread};
pub use error::{BrokerError, Result};
pub use publish::PublishService;
pub use topology::{connect, declare_topology};
