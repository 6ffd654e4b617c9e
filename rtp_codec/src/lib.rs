//! Fixed 20-byte RTP header record and its packed bit fields.

pub mod error;
pub mod header;

pub use error::RtpError;
pub use header::{Field, RtpHeader, HEADER_LEN};

pub type Result<T> = core::result::Result<T, RtpError>;
