pub mod record_client;
