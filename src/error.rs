use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("port {index} not found")]
    PortNotFound { index: usize },

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("rejected configuration write: {0}")]
    ConfigConflict(String),
}

pub type Result<T> = std::result::Result<T, Error>;
