use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RtpError {
    #[error("rtp header must be 20 bytes, got {0}")]
    InvalidLength(usize),
}
