use thiserror::Error;

/// Errors raised by typed access to [`TaskParams`](crate::TaskParams).
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("failed to serialize param '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to deserialize param '{key}': {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while loading a [`FlowConfig`](crate::FlowConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid flow config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid flow config: {0}")]
    Invalid(String),
}
