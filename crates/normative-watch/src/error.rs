#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}
