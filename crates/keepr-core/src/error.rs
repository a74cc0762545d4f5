#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A child worker exited non-zero; fatal inside the gc pipeline.
    #[error("failed to run {0}")]
    WorkerFailed(String),

    #[error("gc is already running on machine '{host}' pid {pid} (use --force if not)")]
    AlreadyRunning { host: String, pid: u32 },

    #[error("'{0}' is not a valid task")]
    UnknownTask(String),

    #[error("task '{0}' cannot be selected multiple times")]
    DuplicateTask(String),

    #[error(transparent)]
    Config(#[from] keepr_config::ConfigError),

    #[error(transparent)]
    Repo(#[from] keepr_repo::RepoError),

    #[error(transparent)]
    Util(#[from] keepr_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
