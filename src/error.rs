//! Crate-wide error type.
//!
//! Every fatal condition carries a process exit code:
//!
//! - `2`: configuration (incompatible volumes, bad parameters, bad grid, zero workers)
//! - `3`: input/output (unreadable files, malformed NIfTI, failed writes)
//! - `4`: worker-task failure during parallel processing
//!
//! Per-voxel numerical failures are never errors; they are reported through
//! `FitDiagnostics` instead.

/// Exit code for configuration errors.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for I/O errors.
pub const EXIT_IO: u8 = 3;
/// Exit code for worker-task failures.
pub const EXIT_WORKER: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(EXIT_IO, message)
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::new(EXIT_WORKER, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_config(&self) -> bool {
        self.exit_code == EXIT_CONFIG
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
