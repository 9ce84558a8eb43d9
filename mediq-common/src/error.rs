//! Error type for configuration and filesystem setup

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file exists but could not be read
    #[error("Cannot read config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected shape
    #[error("Invalid config {}: {message}", .path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("Cannot serialize config: {0}")]
    ConfigSerialize(String),

    /// Root folder path exists but is not a directory
    #[error("Root folder {} is not a directory", .0.display())]
    RootFolderNotDirectory(PathBuf),
}
