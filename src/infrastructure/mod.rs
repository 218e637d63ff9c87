pub mod db;
pub mod http;
pub mod media;
pub mod queue;
pub mod storage;
