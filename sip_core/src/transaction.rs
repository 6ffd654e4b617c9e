use core::fmt::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::{auth::md5_hex, Method, Result, SipError};

pub const BRANCH_MAGIC: &str = "z9hG4bK";
pub const MAX_BRANCH_LEN: usize = 32;
pub const MAX_TAG_LEN: usize = 8;

/// First send plus one authenticated retry.
pub const MAX_SENDS: u8 = 2;

pub type Branch = heapless::String<MAX_BRANCH_LEN>;
pub type Tag = heapless::String<MAX_TAG_LEN>;

/// Dialog identifier, stable across every request of one call attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// MD5 over the caller identity and the current time.
    pub fn generate(caller: &str) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self(md5_hex(format!("{caller}{now}").as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tag derived from the identifier: its first eight characters.
    pub fn tag(&self) -> Tag {
        let mut tag = Tag::new();
        for c in self.0.chars() {
            if tag.push(c).is_err() {
                break;
            }
        }
        tag
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiers of one request, fixed when the request is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIds {
    pub call_id: CallId,
    pub branch: Branch,
}

impl TransactionIds {
    pub fn new(call_id: CallId) -> Self {
        Self {
            call_id,
            branch: new_branch(),
        }
    }
}

pub fn new_branch() -> Branch {
    let mut branch = Branch::new();
    let random = format!("{:032x}", rand::random::<u128>());
    let _ = write!(branch, "{}{}", BRANCH_MAGIC, &random[..MAX_BRANCH_LEN - BRANCH_MAGIC.len()]);
    branch
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Building,
    Sent,
    AwaitingResponse,
    Authenticating,
    Success,
    Rejected,
    TimedOut,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Success | TransactionState::Rejected | TransactionState::TimedOut
        )
    }
}

/// Progress of one client transaction (REGISTER or INVITE).
#[derive(Debug)]
pub struct Transaction {
    method: Method,
    state: TransactionState,
    history: Vec<TransactionState>,
    sends: u8,
}

impl Transaction {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            state: TransactionState::Building,
            history: vec![TransactionState::Building],
            sends: 0,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> &[TransactionState] {
        &self.history
    }

    pub fn sends(&self) -> u8 {
        self.sends
    }

    pub fn on_send(&mut self) -> Result<()> {
        if self.sends >= MAX_SENDS {
            return Err(SipError::RetryLimit(self.method.clone()));
        }
        self.sends += 1;
        self.transition(TransactionState::Sent);
        Ok(())
    }

    pub fn on_wait(&mut self) {
        self.transition(TransactionState::AwaitingResponse);
    }

    pub fn on_challenge(&mut self) {
        self.transition(TransactionState::Authenticating);
    }

    pub fn succeed(&mut self) {
        self.transition(TransactionState::Success);
    }

    pub fn reject(&mut self) {
        self.transition(TransactionState::Rejected);
    }

    pub fn fail(&mut self, err: &SipError) {
        match err {
            SipError::ReceiveTimeout => self.transition(TransactionState::TimedOut),
            _ => self.transition(TransactionState::Rejected),
        }
    }

    fn transition(&mut self, next: TransactionState) {
        if self.state.is_terminal() {
            return;
        }
        debug!("{} transaction: {:?} -> {:?}", self.method, self.state, next);
        self.state = next;
        self.history.push(next);
    }
}
