pub mod notifications;
pub mod videos;
