use crate::{
    auth::{authorization_value, challenge_in, digest_uri, DigestCredentials},
    request::{new_request, set_sequence, with_tag},
    stack::StackConfig,
    Method, Result, SipMessage, TransactionIds,
};

pub const REGISTER_CSEQ: u32 = 1;
pub const REGISTER_EXPIRES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationState {
    #[default]
    Unregistered,
    Registering,
    Registered,
    Error,
}

/// REGISTER for `caller`; `From` and `To` carry a tag derived from the Call-ID.
pub fn build_register(
    config: &StackConfig,
    caller: &str,
    ids: &TransactionIds,
    cseq: u32,
) -> SipMessage {
    let mut req = new_request(config, Method::Register, &config.server, &ids.branch);
    let tag = ids.call_id.tag();

    req.set("From", with_tag(caller, &tag));
    req.set("To", with_tag(caller, &tag));
    req.set(
        "Call-ID",
        format!("{}@{}:{}", ids.call_id, config.local_ip, config.local_port),
    );
    set_sequence(&mut req, cseq, &Method::Register);
    req.set("Contact", caller);
    req.set("Expires", REGISTER_EXPIRES);
    req
}

/// Turns `req` into its authenticated retry after a 401: next sequence
/// number, the registrar's `To`, and a Digest `Authorization`.
pub fn authenticate_register(
    req: &mut SipMessage,
    challenge: &SipMessage,
    creds: &DigestCredentials<'_>,
    server: &str,
) -> Result<()> {
    let digest = challenge_in(challenge, "WWW-Authenticate")?;
    let (_, method) = challenge.cseq()?;

    set_sequence(req, REGISTER_CSEQ + 1, &Method::Register);
    if let Some(to) = challenge.get("To") {
        req.set("To", to.joined());
    }
    req.set(
        "Authorization",
        authorization_value(&digest, creds, method.as_str(), &digest_uri(server)),
    );
    Ok(())
}
