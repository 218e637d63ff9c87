use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::queue::broker::Broker;
use crate::infrastructure::storage::object_store::ObjectStore;
use crate::modules::notifications::hub::LiveHub;
use crate::modules::videos::repository::VideoRepository;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub videos: VideoRepository,
    pub broker: Arc<dyn Broker>,
    pub storage: Arc<dyn ObjectStore>,
    pub hub: LiveHub,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        videos: VideoRepository,
        broker: Arc<dyn Broker>,
        storage: Arc<dyn ObjectStore>,
        hub: LiveHub,
    ) -> Self {
        Self {
            config,
            videos,
            broker,
            storage,
            hub,
        }
    }
}
