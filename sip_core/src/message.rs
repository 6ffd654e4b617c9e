use core::fmt::{self, Write};

use crate::{Result, SipError};

const CRLF: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Register,
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Other(String),
}

impl Method {
    pub fn from_token(token: &str) -> Method {
        match token {
            "REGISTER" => Method::Register,
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Other(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const SIP_2_0: Version = Version { major: 2, minor: 0 };

    /// Parses the `SIP/<major>.<minor>` protocol token.
    pub fn parse(token: &str) -> Option<Version> {
        let (major, minor) = token.strip_prefix("SIP/")?.split_once('.')?;
        Some(Version {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: Method,
        /// Request target without the `sip:` scheme.
        target: String,
        version: Version,
    },
    Response {
        version: Version,
        status_code: u16,
        reason: String,
    },
}

/// A header body as the message model keeps it.
///
/// Values built locally are usually `Text`. Parsed values are always `Tokens`:
/// `", "` is collapsed to `","` and the result is split on single spaces, so
/// `CSeq: 2 REGISTER` becomes `["2", "REGISTER"]` and callers index into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    Tokens(Vec<String>),
    Params(Vec<(String, String)>),
}

impl HeaderValue {
    pub fn parse(raw: &str) -> HeaderValue {
        HeaderValue::Tokens(tokenize(raw))
    }

    /// Token list of this value. Rendered forms are re-tokenized.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            HeaderValue::Tokens(tokens) => tokens.clone(),
            other => tokenize(&other.to_string()),
        }
    }

    pub fn token(&self, index: usize) -> Option<String> {
        match self {
            HeaderValue::Tokens(tokens) => tokens.get(index).cloned(),
            other => other.tokens().into_iter().nth(index),
        }
    }

    /// Tokens joined back with single spaces; for parsed values this is the
    /// received text minus the `", "` collapse.
    pub fn joined(&self) -> String {
        self.tokens().join(" ")
    }
}

fn tokenize(raw: &str) -> Vec<String> {
    raw.replace(", ", ",").split(' ').map(str::to_string).collect()
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(text) => f.write_str(text),
            HeaderValue::Tokens(tokens) => f.write_str(&tokens.join(",")),
            HeaderValue::Params(params) => {
                for (i, (key, value)) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{key}={value}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<u32> for HeaderValue {
    fn from(value: u32) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(value: Vec<String>) -> Self {
        HeaderValue::Tokens(value)
    }
}

/// Insertion-ordered headers, looked up by exact (case-sensitive) name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a HeaderValue) -> &'a HeaderValue {
        self.get(name).unwrap_or(default)
    }

    /// Overwrites an existing header in place, otherwise appends it.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMessage {
    pub start: StartLine,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl SipMessage {
    pub fn request(method: Method, target: impl Into<String>) -> Self {
        Self {
            start: StartLine::Request {
                method,
                target: target.into(),
                version: Version::SIP_2_0,
            },
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn response(status_code: u16, reason: impl Into<String>) -> Self {
        Self {
            start: StartLine::Response {
                version: Version::SIP_2_0,
                status_code,
                reason: reason.into(),
            },
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Parses one datagram. `Content-Length` is not checked against the body.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = core::str::from_utf8(bytes)
            .map_err(|_| SipError::malformed("message is not valid UTF-8"))?;

        let (head, body) = match text.find("\r\n\r\n") {
            Some(idx) => (&text[..idx], &text[idx + 4..]),
            None => (text, ""),
        };

        let mut lines = head.lines();
        let first = lines
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or_else(|| SipError::malformed("missing start line"))?;

        let start = if first.starts_with("SIP/") {
            parse_status_line(first)?
        } else {
            parse_request_line(first)?
        };

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(": ")
                .ok_or_else(|| SipError::malformed(format!("bad header line {line:?}")))?;
            headers.set(name, HeaderValue::parse(value));
        }

        Ok(SipMessage {
            start,
            headers,
            body: body.trim().as_bytes().to_vec(),
        })
    }

    /// Wire form. With `include_body` a computed `Content-Length` and the body
    /// are appended; a stored `Content-Length` header is never emitted. The
    /// output always ends in CRLF.
    pub fn serialize(&self, include_body: bool) -> Vec<u8> {
        let mut head = String::new();
        let _ = self.render_head(&mut head, include_body);
        let mut out = head.into_bytes();
        if include_body && !self.body.is_empty() {
            out.extend_from_slice(&self.body);
            out.extend_from_slice(CRLF.as_bytes());
        }
        out
    }

    fn render_head<W: Write>(&self, out: &mut W, include_body: bool) -> fmt::Result {
        match &self.start {
            StartLine::Request {
                method,
                target,
                version,
            } => write!(out, "{method} sip:{target} {version}{CRLF}")?,
            StartLine::Response {
                version,
                status_code,
                reason,
            } => write!(out, "{version} {status_code} {reason}{CRLF}")?,
        }

        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            write!(out, "{name}: {value}{CRLF}")?;
        }

        if include_body {
            write!(out, "Content-Length: {}{CRLF}", self.body.len())?;
        }
        out.write_str(CRLF)
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.headers.set(name, value)
    }

    pub fn is_response(&self) -> bool {
        matches!(self.start, StartLine::Response { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.start {
            StartLine::Response { status_code, .. } => Some(status_code),
            StartLine::Request { .. } => None,
        }
    }

    pub fn reason(&self) -> &str {
        match &self.start {
            StartLine::Response { reason, .. } => reason,
            StartLine::Request { .. } => "",
        }
    }

    pub fn method(&self) -> Option<&Method> {
        match &self.start {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    /// Number and method from the `CSeq` header (tokens 0 and 1).
    pub fn cseq(&self) -> Result<(u32, Method)> {
        let value = self.get("CSeq").ok_or(SipError::MissingHeader("CSeq"))?;
        let number = value
            .token(0)
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| SipError::malformed(format!("bad CSeq {value}")))?;
        let method = value
            .token(1)
            .ok_or_else(|| SipError::malformed(format!("CSeq without method {value}")))?;
        Ok((number, Method::from_token(&method)))
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn body_str(&self) -> Result<&str> {
        core::str::from_utf8(&self.body).map_err(|_| SipError::malformed("body is not valid UTF-8"))
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render_head(f, true)?;
        if !self.body.is_empty() {
            f.write_str(&String::from_utf8_lossy(&self.body))?;
            f.write_str(CRLF)?;
        }
        Ok(())
    }
}

fn parse_status_line(line: &str) -> Result<StartLine> {
    let mut parts = line.splitn(3, ' ');
    let version = parts
        .next()
        .and_then(Version::parse)
        .ok_or_else(|| SipError::malformed(format!("bad version in {line:?}")))?;
    let status_code = parts
        .next()
        .ok_or_else(|| SipError::malformed(format!("missing status in {line:?}")))?
        .parse::<u16>()
        .map_err(|_| SipError::malformed(format!("status is not a number in {line:?}")))?;
    let reason = parts.next().unwrap_or_default().to_string();

    Ok(StartLine::Response {
        version,
        status_code,
        reason,
    })
}

fn parse_request_line(line: &str) -> Result<StartLine> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();
    let &[method, target, version] = parts.as_slice() else {
        return Err(SipError::malformed(format!("bad request line {line:?}")));
    };
    let version = Version::parse(version)
        .ok_or_else(|| SipError::malformed(format!("bad version in {line:?}")))?;

    Ok(StartLine::Request {
        method: Method::from_token(method),
        target: target.strip_prefix("sip:").unwrap_or(target).to_string(),
        version,
    })
}
