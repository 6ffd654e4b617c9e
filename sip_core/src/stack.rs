use std::time::Duration;

use log::{debug, info, warn};

use crate::{
    auth::DigestCredentials,
    dialog::{
        authenticate_invite, build_ack, build_invite, Call, ChallengeKind, DialogState, INVITE_CSEQ,
    },
    registration::{authenticate_register, build_register, RegistrationState, REGISTER_CSEQ},
    request::caller_identity,
    CallId, Connect, Method, Result, SipError, SipMessage, Transaction, TransactionIds, Transport,
};

/// Provisional codes the INVITE flow keeps waiting through.
const WAIT_CODES: [u16; 3] = [100, 183, 401];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    pub server: String,
    pub port: u16,
    /// Address advertised in `Via` and the REGISTER `Call-ID`.
    pub local_ip: String,
    pub local_port: u16,
    pub receive_timeout: Duration,
    /// Largest datagram accepted from the server.
    pub buffer_size: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".into(),
            port: 5060,
            local_ip: "0.0.0.0".into(),
            local_port: 5060,
            receive_timeout: Duration::from_secs(30),
            buffer_size: 8196,
        }
    }
}

/// Client SIP stack: one signaling transport towards the server, plus a media
/// transport per established call.
pub struct SipStack<C: Connect> {
    config: StackConfig,
    username: String,
    password: String,
    connector: C,
    transport: C::Transport,
    registration: RegistrationState,
    dialog: DialogState,
}

impl<C: Connect> SipStack<C> {
    pub fn new(
        config: StackConfig,
        username: impl Into<String>,
        password: impl Into<String>,
        connector: C,
    ) -> Self {
        let transport = connector.connect(&config.server, config.port);
        Self {
            config,
            username: username.into(),
            password: password.into(),
            connector,
            transport,
            registration: RegistrationState::default(),
            dialog: DialogState::default(),
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn caller_id(&self) -> String {
        caller_identity(&self.username, &self.config.server)
    }

    pub fn registration_state(&self) -> RegistrationState {
        self.registration
    }

    pub fn dialog_state(&self) -> DialogState {
        self.dialog
    }

    pub fn transport(&self) -> &C::Transport {
        &self.transport
    }

    pub fn open(&mut self) -> Result<()> {
        self.transport.open()
    }

    /// Opens the signaling transport and registers under a fresh Call-ID.
    pub fn connect(&mut self) -> Result<CallId> {
        self.open()?;
        let call_id = CallId::generate(&self.caller_id());
        self.register(&call_id)?;
        Ok(call_id)
    }

    pub fn register(&mut self, call_id: &CallId) -> Result<()> {
        let caller = self.caller_id();
        let ids = TransactionIds::new(call_id.clone());
        let mut tx = Transaction::new(Method::Register);
        let mut req = build_register(&self.config, &caller, &ids, REGISTER_CSEQ);

        self.registration = RegistrationState::Registering;
        let result = self.run_register(&mut tx, &mut req);
        match &result {
            Ok(()) => {
                tx.succeed();
                self.registration = RegistrationState::Registered;
                info!("registered {} with {}", self.username, self.config.server);
            }
            Err(e) => {
                tx.fail(e);
                self.registration = RegistrationState::Error;
                warn!("registration with {} failed: {e}", self.config.server);
            }
        }
        result
    }

    fn run_register(&mut self, tx: &mut Transaction, req: &mut SipMessage) -> Result<()> {
        let resp = self.request(tx, req)?;
        match resp.status_code() {
            Some(200) => Ok(()),
            Some(401) => {
                tx.on_challenge();
                let creds = DigestCredentials {
                    username: &self.username,
                    password: &self.password,
                };
                authenticate_register(req, &resp, &creds, &self.config.server)?;

                let resp = self.request(tx, req)?;
                match resp.status_code() {
                    Some(200) => Ok(()),
                    _ => Err(unexpected(&resp)),
                }
            }
            Some(407) => Err(SipError::UnsupportedChallenge),
            _ => Err(unexpected(&resp)),
        }
    }

    /// Calls `number` under a fresh Call-ID.
    pub fn call(&mut self, number: &str) -> Result<Option<Call<C::Transport>>> {
        let call_id = CallId::generate(&self.caller_id());
        self.call_with(&call_id, number)
    }

    /// Places an INVITE and, on 200, opens media towards the answered SDP.
    ///
    /// Returns `Ok(None)` when the callee ends the attempt with any other final
    /// status.
    pub fn call_with(
        &mut self,
        call_id: &CallId,
        number: &str,
    ) -> Result<Option<Call<C::Transport>>> {
        let caller = self.caller_id();
        let ids = TransactionIds::new(call_id.clone());
        let mut tx = Transaction::new(Method::Invite);
        let mut invite = build_invite(&self.config, &caller, number, &ids, INVITE_CSEQ);

        self.dialog = DialogState::Inviting;
        let result = self.run_invite(&mut tx, &caller, number, &ids, &mut invite);
        match &result {
            Ok(Some(_)) => {
                tx.succeed();
                self.dialog = DialogState::Established;
            }
            Ok(None) => {
                tx.reject();
                self.dialog = DialogState::Terminated;
            }
            Err(e) => {
                tx.fail(e);
                self.dialog = DialogState::Terminated;
                warn!("call to {number} failed: {e}");
            }
        }
        result
    }

    fn run_invite(
        &mut self,
        tx: &mut Transaction,
        caller: &str,
        number: &str,
        ids: &TransactionIds,
        invite: &mut SipMessage,
    ) -> Result<Option<Call<C::Transport>>> {
        let first = self.request(tx, invite)?;
        let Some(kind) = first.status_code().and_then(ChallengeKind::from_status) else {
            return Err(unexpected(&first));
        };

        tx.on_challenge();
        let creds = DigestCredentials {
            username: &self.username,
            password: &self.password,
        };
        authenticate_invite(invite, &first, kind, &creds, &self.config.server)?;

        let mut resp = self.request(tx, invite)?;
        while let Some(code) = resp.status_code().filter(|c| WAIT_CODES.contains(c)) {
            if code == 183 {
                self.dialog = DialogState::Ringing;
            }
            debug!("INVITE to {number}: {code} {}, waiting", resp.reason());
            resp = self.receive()?;
        }

        if resp.status_code() != Some(200) {
            warn!(
                "call to {number} ended with {} {}",
                resp.status_code().unwrap_or_default(),
                resp.reason()
            );
            return Ok(None);
        }

        let (cseq, _) = resp.cseq()?;
        let endpoint = sdp::parse(resp.body_str()?)?.media_endpoint()?;

        let mut media = self.connector.connect(&endpoint.host, endpoint.port);
        media.open()?;

        let ack_ids = TransactionIds::new(ids.call_id.clone());
        let ack = build_ack(&self.config, caller, number, &ack_ids, cseq);
        if let Err(e) = self.send(&ack) {
            media.close();
            return Err(e);
        }

        info!(
            "call {} to {number} established, media at {}:{} ({})",
            ids.call_id, endpoint.host, endpoint.port, endpoint.protocol
        );
        Ok(Some(Call::new(ids.call_id.clone(), number, endpoint, media)))
    }

    /// Ends the call locally by closing its media transport.
    pub fn hangup(&mut self, call: Call<C::Transport>) {
        call.hangup();
        self.dialog = DialogState::Terminated;
    }

    pub fn close(&mut self) {
        self.transport.close();
        self.registration = RegistrationState::Unregistered;
        self.dialog = DialogState::Idle;
    }

    fn request(&mut self, tx: &mut Transaction, msg: &SipMessage) -> Result<SipMessage> {
        tx.on_send()?;
        self.send(msg)?;
        tx.on_wait();
        self.receive()
    }

    fn send(&mut self, msg: &SipMessage) -> Result<()> {
        debug!("sending:\n{msg}");
        self.transport.send(&msg.serialize(true))
    }

    fn receive(&mut self) -> Result<SipMessage> {
        let data = self
            .transport
            .receive(self.config.buffer_size, self.config.receive_timeout)?;
        let msg = SipMessage::parse(&data)?;
        debug!("received:\n{msg}");
        Ok(msg)
    }
}

fn unexpected(resp: &SipMessage) -> SipError {
    SipError::UnexpectedStatus {
        code: resp.status_code().unwrap_or_default(),
        reason: resp.reason().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{response, MockConnector, MockTransport};

    const SDP: &str = "v=0\r\no=- 1 1 IN IP4 10.0.0.5\r\ns=call\r\nm=audio 30000 RTP/AVP 0\r\n";
    const CHALLENGE: &str = "WWW-Authenticate: Digest realm=\"pbx\", nonce=\"4f2a\"";

    fn stack() -> (SipStack<MockConnector>, MockConnector, MockTransport) {
        let config = StackConfig {
            server: "pbx.local".into(),
            receive_timeout: Duration::from_millis(10),
            ..StackConfig::default()
        };
        let connector = MockConnector::default();
        let mut stack = SipStack::new(config, "alice", "secret", connector.clone());
        stack.open().unwrap();
        let signaling = connector.created()[0].clone();
        (stack, connector, signaling)
    }

    fn call_id() -> CallId {
        CallId::new("0123456789abcdef")
    }

    #[test]
    fn register_accepted() {
        let (mut stack, _, wire) = stack();
        wire.push(&response(200, "OK", "1 REGISTER", &[], ""));

        stack.register(&call_id()).unwrap();
        assert_eq!(stack.registration_state(), RegistrationState::Registered);

        let sent = wire.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method(), Some(&Method::Register));
        assert_eq!(sent[0].get("CSeq").unwrap().joined(), "1 REGISTER");
        assert!(sent[0].get("Authorization").is_none());
    }

    #[test]
    fn register_retries_once_after_401() {
        let (mut stack, _, wire) = stack();
        wire.push(&response(401, "Unauthorized", "1 REGISTER", &[CHALLENGE], ""));
        wire.push(&response(200, "OK", "2 REGISTER", &[], ""));

        stack.register(&call_id()).unwrap();

        let sent = wire.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].get("CSeq").unwrap().joined(), "2 REGISTER");
        assert!(sent[1]
            .get("Authorization")
            .unwrap()
            .to_string()
            .contains("response=\"55699dc9eaa9e324641ed9d077a36848\""));
        assert_eq!(
            sent[0].get("Via").unwrap().to_string(),
            sent[1].get("Via").unwrap().to_string()
        );
    }

    #[test]
    fn second_401_is_unexpected() {
        let (mut stack, _, wire) = stack();
        wire.push(&response(401, "Unauthorized", "1 REGISTER", &[CHALLENGE], ""));
        wire.push(&response(401, "Unauthorized", "2 REGISTER", &[CHALLENGE], ""));

        let err = stack.register(&call_id()).unwrap_err();
        assert!(matches!(err, SipError::UnexpectedStatus { code: 401, .. }));
        assert_eq!(stack.registration_state(), RegistrationState::Error);
        assert_eq!(wire.sent().len(), 2);
    }

    #[test]
    fn register_407_fails_fast() {
        let (mut stack, _, wire) = stack();
        wire.push(&response(407, "Proxy Authentication Required", "1 REGISTER", &[], ""));

        let err = stack.register(&call_id()).unwrap_err();
        assert!(matches!(err, SipError::UnsupportedChallenge));
        assert_eq!(wire.sent().len(), 1);
    }

    #[test]
    fn register_timeout_keeps_transport_usable() {
        let (mut stack, _, wire) = stack();

        let err = stack.register(&call_id()).unwrap_err();
        assert!(matches!(err, SipError::ReceiveTimeout));
        assert!(stack.transport().is_open());

        wire.push(&response(200, "OK", "1 REGISTER", &[], ""));
        stack.register(&call_id()).unwrap();
        assert_eq!(stack.registration_state(), RegistrationState::Registered);
    }

    #[test]
    fn invite_happy_path() {
        let (mut stack, connector, wire) = stack();
        wire.push(&response(401, "Unauthorized", "100 INVITE", &[CHALLENGE], ""));
        wire.push(&response(100, "Trying", "101 INVITE", &[], ""));
        wire.push(&response(183, "Session Progress", "101 INVITE", &[], ""));
        wire.push(&response(200, "OK", "101 INVITE", &[], SDP));

        let call = stack.call_with(&call_id(), "100").unwrap().unwrap();
        assert_eq!(call.endpoint().host, "10.0.0.5");
        assert_eq!(call.endpoint().port, 30000);
        assert_eq!(call.number(), "100");
        assert_eq!(stack.dialog_state(), DialogState::Established);

        let sent = wire.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].get("CSeq").unwrap().joined(), "100 INVITE");
        assert_eq!(sent[1].get("CSeq").unwrap().joined(), "101 INVITE");
        assert!(sent[1]
            .get("Authorization")
            .unwrap()
            .to_string()
            .contains("response=\"1501f121665ab17fd89400cbeb706bb7\""));

        let ack = &sent[2];
        assert_eq!(ack.method(), Some(&Method::Ack));
        assert_eq!(ack.get("CSeq").unwrap().joined(), "101 ACK");
        assert!(ack.get("Authorization").is_none());
        assert_eq!(ack.get("Call-ID").unwrap().joined(), "0123456789abcdef");

        let media = &connector.created()[1];
        assert_eq!((media.host.as_str(), media.port), ("10.0.0.5", 30000));
        assert!(media.is_open());
    }

    #[test]
    fn invite_proxy_challenge() {
        let (mut stack, _, wire) = stack();
        wire.push(&response(
            407,
            "Proxy Authentication Required",
            "100 INVITE",
            &["Proxy-Authenticate: Digest realm=\"pbx\", nonce=\"4f2a\""],
            "",
        ));
        wire.push(&response(200, "OK", "101 INVITE", &[], SDP));

        assert!(stack.call_with(&call_id(), "100").unwrap().is_some());
        let retry = &wire.sent()[1];
        assert!(retry
            .get("Authorization")
            .unwrap()
            .to_string()
            .contains("response=\"1501f121665ab17fd89400cbeb706bb7\""));
        assert!(retry.get("Proxy-Authorization").is_none());
    }

    #[test]
    fn late_401_keeps_waiting() {
        let (mut stack, _, wire) = stack();
        wire.push(&response(401, "Unauthorized", "100 INVITE", &[CHALLENGE], ""));
        wire.push(&response(401, "Unauthorized", "101 INVITE", &[CHALLENGE], ""));
        wire.push(&response(200, "OK", "101 INVITE", &[], SDP));

        let call = stack.call_with(&call_id(), "100").unwrap();
        assert!(call.is_some());

        let sent = wire.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].method(), Some(&Method::Ack));
        assert_eq!(sent[2].get("CSeq").unwrap().joined(), "101 ACK");
    }

    #[test]
    fn timeout_while_ringing_ends_the_dialog() {
        let (mut stack, connector, wire) = stack();
        wire.push(&response(401, "Unauthorized", "100 INVITE", &[CHALLENGE], ""));
        wire.push(&response(183, "Session Progress", "101 INVITE", &[], ""));

        let err = stack.call_with(&call_id(), "100").unwrap_err();
        assert!(matches!(err, SipError::ReceiveTimeout));
        assert_eq!(stack.dialog_state(), DialogState::Terminated);
        assert_eq!(wire.sent().len(), 2);
        assert_eq!(connector.created().len(), 1);
        assert!(stack.transport().is_open());
    }

    #[test]
    fn ringing_180_means_no_call() {
        let (mut stack, connector, wire) = stack();
        wire.push(&response(401, "Unauthorized", "100 INVITE", &[CHALLENGE], ""));
        wire.push(&response(100, "Trying", "101 INVITE", &[], ""));
        wire.push(&response(180, "Ringing", "101 INVITE", &[], ""));
        wire.push(&response(200, "OK", "101 INVITE", &[], SDP));

        assert!(stack.call_with(&call_id(), "100").unwrap().is_none());
        assert_eq!(stack.dialog_state(), DialogState::Terminated);
        assert_eq!(wire.sent().len(), 2);
        assert_eq!(connector.created().len(), 1);
    }

    #[test]
    fn invite_without_challenge_is_unexpected() {
        let (mut stack, connector, wire) = stack();
        wire.push(&response(100, "Trying", "100 INVITE", &[], ""));

        let err = stack.call_with(&call_id(), "100").unwrap_err();
        assert!(matches!(err, SipError::UnexpectedStatus { code: 100, .. }));
        assert_eq!(connector.created().len(), 1);
    }

    #[test]
    fn busy_callee_means_no_call() {
        let (mut stack, connector, wire) = stack();
        wire.push(&response(401, "Unauthorized", "100 INVITE", &[CHALLENGE], ""));
        wire.push(&response(486, "Busy Here", "101 INVITE", &[], ""));

        assert!(stack.call_with(&call_id(), "100").unwrap().is_none());
        assert_eq!(stack.dialog_state(), DialogState::Terminated);
        assert_eq!(wire.sent().len(), 2);
        assert_eq!(connector.created().len(), 1);
    }

    #[test]
    fn hangup_closes_media_only() {
        let (mut stack, connector, wire) = stack();
        wire.push(&response(401, "Unauthorized", "100 INVITE", &[CHALLENGE], ""));
        wire.push(&response(200, "OK", "101 INVITE", &[], SDP));

        let mut call = stack.call_with(&call_id(), "100").unwrap().unwrap();
        call.send_raw(b"\x00\x01").unwrap();
        stack.hangup(call);

        let media = &connector.created()[1];
        assert!(!media.is_open());
        assert_eq!(media.close_count(), 1);
        assert_eq!(media.sent_raw(), vec![b"\x00\x01".to_vec()]);
        assert_eq!(wire.sent().len(), 3);
        assert!(wire.is_open());
        assert_eq!(stack.dialog_state(), DialogState::Terminated);
    }
}
