#[derive(Debug, thiserror::Error)]
pub enum LiveStoreError {
    #[error("live store connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
