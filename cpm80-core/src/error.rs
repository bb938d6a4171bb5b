//! Error types for the emulator core.

use thiserror::Error;

/// Host-fatal conditions. Guest-visible failures (file not found, end of
/// file, record out of range...) are returned to the guest as BDOS result
/// codes instead and never appear here.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Program file not found: {0}")]
    ProgramNotFound(String),

    #[error("Bad program name: {0}")]
    BadProgramName(String),

    #[error("Program too large for the TPA: {0}")]
    ProgramTooLarge(String),

    #[error("Drive {0}: is not configured")]
    DriveNotConfigured(char),

    #[error("Invalid drive number: {0}")]
    InvalidDrive(u8),

    #[error("Signal setup failed: {0}")]
    Signal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
