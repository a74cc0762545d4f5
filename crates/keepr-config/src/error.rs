#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config key: '{0}'")]
    InvalidKey(String),

    #[error("bad config line {line} in {file}: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("bad boolean config value '{value}' for '{key}'")]
    InvalidBool { key: String, value: String },

    #[error("bad numeric config value '{value}' for '{key}'")]
    InvalidInt { key: String, value: String },

    #[error("failed to parse '{key}' value '{value}'")]
    InvalidExpiry { key: String, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
