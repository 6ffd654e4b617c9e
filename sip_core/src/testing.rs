//! In-memory transport for exercising the call flows without sockets.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{Connect, Result, SipError, SipMessage, Transport};

#[derive(Debug, Default)]
struct Wire {
    open: bool,
    opened: u32,
    closed: u32,
    sent: Vec<Vec<u8>>,
    inbox: VecDeque<Vec<u8>>,
}

/// Replays queued datagrams and records everything sent. Clones share state.
#[derive(Debug, Clone)]
pub struct MockTransport {
    pub host: String,
    pub port: u16,
    wire: Arc<Mutex<Wire>>,
}

impl MockTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            wire: Arc::default(),
        }
    }

    pub fn push_raw(&self, data: &[u8]) {
        self.wire.lock().unwrap().inbox.push_back(data.to_vec());
    }

    pub fn push(&self, text: &str) {
        self.push_raw(text.as_bytes());
    }

    pub fn sent(&self) -> Vec<SipMessage> {
        self.wire
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|d| SipMessage::parse(d).unwrap())
            .collect()
    }

    pub fn sent_raw(&self) -> Vec<Vec<u8>> {
        self.wire.lock().unwrap().sent.clone()
    }

    pub fn open_count(&self) -> u32 {
        self.wire.lock().unwrap().opened
    }

    pub fn close_count(&self) -> u32 {
        self.wire.lock().unwrap().closed
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        let mut wire = self.wire.lock().unwrap();
        wire.open = true;
        wire.opened += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut wire = self.wire.lock().unwrap();
        wire.open = false;
        wire.closed += 1;
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut wire = self.wire.lock().unwrap();
        if !wire.open {
            return Err(SipError::TransportClosed);
        }
        wire.sent.push(data.to_vec());
        Ok(())
    }

    fn receive(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        let next = {
            let mut wire = self.wire.lock().unwrap();
            if !wire.open {
                return Err(SipError::TransportClosed);
            }
            wire.inbox.pop_front()
        };
        match next {
            Some(mut data) => {
                data.truncate(max_bytes);
                Ok(data)
            }
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(5)));
                Err(SipError::ReceiveTimeout)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.wire.lock().unwrap().open
    }
}

/// Hands out mock transports and remembers them for inspection.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    created: Arc<Mutex<Vec<MockTransport>>>,
}

impl MockConnector {
    pub fn created(&self) -> Vec<MockTransport> {
        self.created.lock().unwrap().clone()
    }
}

impl Connect for MockConnector {
    type Transport = MockTransport;

    fn connect(&self, host: &str, port: u16) -> MockTransport {
        let transport = MockTransport::new(host, port);
        self.created.lock().unwrap().push(transport.clone());
        transport
    }
}

/// Builds a response datagram with the given extra header lines and body.
pub fn response(code: u16, reason: &str, cseq: &str, headers: &[&str], body: &str) -> String {
    let mut out = format!("SIP/2.0 {code} {reason}\r\nCSeq: {cseq}\r\n");
    for header in headers {
        out.push_str(header);
        out.push_str("\r\n");
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    out
}
