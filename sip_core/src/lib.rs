//! Client-side SIP signaling over UDP: message model, Digest authentication,
//! REGISTER/INVITE flows and the transport seam they run on.

use thiserror::Error;

pub mod auth;
pub mod dialog;
pub mod message;
pub mod registration;
pub mod request;
pub mod stack;
pub mod transaction;
pub mod transport;

#[cfg(test)]
mod testing;

pub use auth::{
    authorization_value, challenge_in, compute_digest_response, digest_uri, parse_challenge,
    split_params, DigestChallenge, DigestCredentials,
};
pub use dialog::{authenticate_invite, build_ack, build_invite, Call, ChallengeKind, DialogState};
pub use message::{HeaderValue, Headers, Method, SipMessage, StartLine, Version};
pub use registration::{authenticate_register, build_register, RegistrationState};
pub use request::caller_identity;
pub use stack::{SipStack, StackConfig};
pub use transaction::{CallId, Transaction, TransactionIds, TransactionState};
pub use transport::{
    spawn_listener, Connect, Listener, SharedTransport, Transport, UdpConnector, UdpTransport,
};

/// Fixed identification sent in every generated request.
pub const USER_AGENT: &str = "announce-dialer 0.1";

/// Methods advertised in every generated request.
pub const ALLOW: &str = "INVITE, ACK, BYE, CANCEL";

#[derive(Debug, Error)]
pub enum SipError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unexpected status {code} {reason}")]
    UnexpectedStatus { code: u16, reason: String },
    #[error("proxy authentication is not implemented")]
    UnsupportedChallenge,
    #[error("timed out waiting for a datagram")]
    ReceiveTimeout,
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    #[error("missing challenge parameter: {0}")]
    MissingParameter(&'static str),
    #[error("transport is closed")]
    TransportClosed,
    #[error("listener thread panicked")]
    ListenerPanicked,
    #[error("{0} already sent twice in this transaction")]
    RetryLimit(Method),
    #[error("sdp: {0}")]
    Sdp(#[from] sdp::SdpError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl SipError {
    /// Errors a receive loop can skip over without giving up on the socket.
    pub fn is_transient(&self) -> bool {
        matches!(self, SipError::MalformedMessage(_) | SipError::ReceiveTimeout)
    }

    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        SipError::MalformedMessage(what.into())
    }
}

pub type Result<T> = std::result::Result<T, SipError>;
