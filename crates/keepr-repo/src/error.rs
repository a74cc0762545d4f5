use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository: '{0}'")]
    NotARepository(PathBuf),

    #[error("corrupt {what}: {reason}")]
    Corrupt { what: String, reason: String },

    #[error(transparent)]
    Config(#[from] keepr_config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RepoError {
    pub fn corrupt(what: impl Into<String>, reason: impl Into<String>) -> Self {
        RepoError::Corrupt {
            what: what.into(),
            reason: reason.into(),
        }
    }
}
