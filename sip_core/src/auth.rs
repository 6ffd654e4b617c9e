use core::fmt::Write;

use md5::Digest;

use crate::{Result, SipError, SipMessage};

/// Parameters of one `WWW-Authenticate` / `Proxy-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCredentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Splits `k=v[,k=v...]` into ordered pairs. Quotes are dropped and `;`
/// separates pairs the same way `,` does. A bare key maps to an empty value.
pub fn split_params(input: &str) -> Vec<(String, String)> {
    let data = input.replace(';', ",").replace('"', "");
    data.split(',')
        .map(|item| match item.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (item.to_string(), String::new()),
        })
        .collect()
}

/// Builds a challenge from the parameter part of an authenticate header.
/// A leading `Digest` scheme token is tolerated.
pub fn parse_challenge(params: &str) -> Result<DigestChallenge> {
    let params = params.trim();
    let params = params
        .strip_prefix("Digest ")
        .map(str::trim_start)
        .unwrap_or(params);

    let mut realm = None;
    let mut nonce = None;
    let mut algorithm = None;
    let mut qop = None;

    for (key, value) in split_params(params) {
        match key.trim().to_ascii_lowercase().as_str() {
            "realm" => realm = Some(value),
            "nonce" => nonce = Some(value),
            "algorithm" => algorithm = Some(value),
            "qop" => qop = Some(value),
            _ => {}
        }
    }

    Ok(DigestChallenge {
        realm: realm.ok_or(SipError::MissingParameter("realm"))?,
        nonce: nonce.ok_or(SipError::MissingParameter("nonce"))?,
        algorithm,
        qop,
    })
}

/// Challenge carried by `header` of a 401/407 response. The parameters are
/// the header's second token, after the `Digest` scheme.
pub fn challenge_in(resp: &SipMessage, header: &'static str) -> Result<DigestChallenge> {
    let value = resp.get(header).ok_or(SipError::MissingHeader(header))?;
    let params = value
        .token(1)
        .ok_or_else(|| SipError::malformed(format!("{header} without parameters")))?;
    parse_challenge(&params)
}

pub fn digest_uri(server: &str) -> String {
    format!("sip:{server};transport=UDP")
}

/// Single-round Digest; `qop` in the challenge is ignored.
pub fn compute_digest_response(
    challenge: &DigestChallenge,
    creds: &DigestCredentials<'_>,
    method: &str,
    uri: &str,
) -> String {
    let a1 = format!("{}:{}:{}", creds.username, challenge.realm, creds.password);
    let ha1 = md5_hex(a1.as_bytes());
    let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
    md5_hex(format!("{ha1}:{}:{ha2}", challenge.nonce).as_bytes())
}

pub fn authorization_value(
    challenge: &DigestChallenge,
    creds: &DigestCredentials<'_>,
    method: &str,
    uri: &str,
) -> String {
    let response = compute_digest_response(challenge, creds, method, uri);
    format!(
        "Digest username=\"{}\",realm=\"{}\",nonce=\"{}\",uri=\"{}\",response=\"{}\",algorithm=MD5",
        creds.username, challenge.realm, challenge.nonce, uri, response
    )
}

pub(crate) fn md5_hex(data: &[u8]) -> String {
    let digest = md5::Md5::digest(data);
    let mut out = String::with_capacity(32);
    for b in &digest {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
