use std::env;
use std::str::FromStr;

pub enum EnvKey {
    Role,
    ServerPort,
    DatabaseUrl,
    RabbitMqUrl,
    WorkTopic,
    WorkSubscription,
    NotificationTopic,
    NotificationSubscription,
    NotificationPrefetch,
    NotificationPublishTimeoutMs,
    ListenerReconnectDelayMs,
    MinioUrl,
    MinioBucket,
    MinioAccessKey,
    MinioSecretKey,
    ServerBaseUrl,
    OrphanCheckTimeoutMs,
    OrphanCheckPolicy,
    MaxRetryAttempts,
    RetryBackoffMs,
    FfmpegPreset,
    FfmpegThreads,
    FfmpegMaxBitrate,
    WorkDir,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::Role => "APP_ROLE",
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::WorkTopic => "WORK_TOPIC",
            EnvKey::WorkSubscription => "WORK_SUBSCRIPTION",
            EnvKey::NotificationTopic => "NOTIFICATION_TOPIC",
            EnvKey::NotificationSubscription => "NOTIFICATION_SUBSCRIPTION",
            EnvKey::NotificationPrefetch => "NOTIFICATION_PREFETCH",
            EnvKey::NotificationPublishTimeoutMs => "NOTIFICATION_PUBLISH_TIMEOUT_MS",
            EnvKey::ListenerReconnectDelayMs => "LISTENER_RECONNECT_DELAY_MS",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioBucket => "MINIO_BUCKET_VIDEOS",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::ServerBaseUrl => "SERVER_BASE_URL",
            EnvKey::OrphanCheckTimeoutMs => "ORPHAN_CHECK_TIMEOUT_MS",
            EnvKey::OrphanCheckPolicy => "ORPHAN_CHECK_POLICY",
            EnvKey::MaxRetryAttempts => "MAX_RETRY_ATTEMPTS",
            EnvKey::RetryBackoffMs => "RETRY_BACKOFF_MS",
            EnvKey::FfmpegPreset => "FFMPEG_PRESET",
            EnvKey::FfmpegThreads => "FFMPEG_THREADS",
            EnvKey::FfmpegMaxBitrate => "FFMPEG_MAX_BITRATE",
            EnvKey::WorkDir => "WORK_DIR",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
