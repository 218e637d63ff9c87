pub mod broker;
pub mod listener;
pub mod rabbitmq;
