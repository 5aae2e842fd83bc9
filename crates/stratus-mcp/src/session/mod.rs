//! Session lifecycle and subscriber fan-out.

pub mod registry;

pub use registry::{Session, SessionRegistry, SubscriberQueue, DEFAULT_QUEUE_CAPACITY};
