use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn worker thread `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker thread `{name}` has shut down")]
    ShutDown { name: String },

    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },
}

impl ExecError {
    #[must_use]
    pub fn shut_down(name: impl Into<String>) -> Self {
        Self::ShutDown { name: name.into() }
    }
}
