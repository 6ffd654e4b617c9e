use log::info;
use sdp::MediaEndpoint;

use crate::{
    auth::{authorization_value, challenge_in, digest_uri, DigestCredentials},
    request::{callee, new_request, set_sequence},
    stack::StackConfig,
    CallId, Method, Result, SipMessage, TransactionIds, Transport,
};

pub const INVITE_CSEQ: u32 = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    #[default]
    Idle,
    Inviting,
    Ringing,
    Established,
    Terminated,
}

/// Which authenticate header a challenge came in. Both kinds are answered with
/// `Authorization`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// 401
    Server,
    /// 407
    Proxy,
}

impl ChallengeKind {
    pub fn from_status(code: u16) -> Option<Self> {
        match code {
            401 => Some(ChallengeKind::Server),
            407 => Some(ChallengeKind::Proxy),
            _ => None,
        }
    }

    pub fn challenge_header(self) -> &'static str {
        match self {
            ChallengeKind::Server => "WWW-Authenticate",
            ChallengeKind::Proxy => "Proxy-Authenticate",
        }
    }
}

pub fn build_invite(
    config: &StackConfig,
    caller: &str,
    number: &str,
    ids: &TransactionIds,
    cseq: u32,
) -> SipMessage {
    let target = callee(number, &config.server);
    let mut req = new_request(config, Method::Invite, &target, &ids.branch);

    req.set("From", caller);
    req.set("Contact", caller);
    req.set("Call-ID", ids.call_id.as_str());
    req.set("To", format!("<sip:{target}>"));
    set_sequence(&mut req, cseq, &Method::Invite);
    req
}

/// ACK for a 2xx; `cseq` is the number the 200 response carried.
pub fn build_ack(
    config: &StackConfig,
    caller: &str,
    number: &str,
    ids: &TransactionIds,
    cseq: u32,
) -> SipMessage {
    let mut req = new_request(config, Method::Ack, &config.server, &ids.branch);

    req.set("From", caller);
    req.set("To", format!("<sip:{}>", callee(number, &config.server)));
    req.set("Call-ID", ids.call_id.as_str());
    set_sequence(&mut req, cseq, &Method::Ack);
    req
}

/// Turns `invite` into its authenticated retry. The sequence number continues
/// from the one the challenge echoed.
pub fn authenticate_invite(
    invite: &mut SipMessage,
    challenge: &SipMessage,
    kind: ChallengeKind,
    creds: &DigestCredentials<'_>,
    server: &str,
) -> Result<()> {
    let digest = challenge_in(challenge, kind.challenge_header())?;
    let (number, method) = challenge.cseq()?;

    set_sequence(invite, number.wrapping_add(1), &Method::Invite);
    invite.set(
        "Authorization",
        authorization_value(&digest, creds, method.as_str(), &digest_uri(server)),
    );
    Ok(())
}

/// An established outbound call. Dropping it does not close the media
/// transport; call [`Call::hangup`].
#[derive(Debug)]
pub struct Call<T: Transport> {
    call_id: CallId,
    number: String,
    endpoint: MediaEndpoint,
    media: T,
}

impl<T: Transport> Call<T> {
    pub(crate) fn new(call_id: CallId, number: &str, endpoint: MediaEndpoint, media: T) -> Self {
        Self {
            call_id,
            number: number.to_string(),
            endpoint,
            media,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn endpoint(&self) -> &MediaEndpoint {
        &self.endpoint
    }

    pub fn media(&self) -> &T {
        &self.media
    }

    /// Sends raw media bytes to the negotiated endpoint.
    pub fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.media.send(data)
    }

    /// Closes the media transport. No BYE is sent.
    pub fn hangup(mut self) {
        info!(
            "hanging up call {} to {} ({}:{})",
            self.call_id, self.number, self.endpoint.host, self.endpoint.port
        );
        self.media.close();
    }
}
