pub mod notification_consumer;
pub mod notifier;
pub mod pipeline;
pub mod transcoder;
