//! Transport errors

use std::io;

use lidarctl_core::InitError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not initialized")]
    NotInitialized,
    
    #[error("Already initialized")]
    AlreadyInitialized,
    
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl From<Error> for InitError {
    fn from(err: Error) -> Self {
        InitError::with_source(err.to_string(), err)
    }
}
