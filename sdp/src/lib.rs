//! Read-only view of a peer's session description: just enough to find where
//! the media stream has to go.

use log::debug;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media_type: String,
    pub port: u16,
    pub protocol: String,
    pub formats: Vec<String>,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    pub version: Option<u32>,
    /// `o=` tokens as received.
    pub origin: Vec<String>,
    pub session_name: Option<String>,
    pub media: Vec<MediaDescription>,
    /// `a=` lines seen before the first `m=` line.
    pub attributes: Vec<String>,
}

/// Where the negotiated media stream is sent, plus the session-level fields
/// that came with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEndpoint {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub formats: Vec<String>,
    pub version: Option<u32>,
    pub session_name: Option<String>,
    pub origin: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SdpError {
    #[error("invalid SDP line: {0:?}")]
    InvalidLine(String),
    #[error("invalid SDP version: {0:?}")]
    InvalidVersion(String),
    #[error("invalid media port: {0:?}")]
    InvalidPort(String),
    #[error("incomplete media line: {0:?}")]
    IncompleteMedia(String),
    #[error("no origin line")]
    MissingOrigin,
    #[error("no media line")]
    MissingMedia,
}

impl SessionDescription {
    pub fn parse(input: &str) -> Result<Self, SdpError> {
        let mut sdp = SessionDescription::default();

        for line in input.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| SdpError::InvalidLine(line.to_string()))?;

            match key {
                "v" => {
                    let version = value
                        .trim()
                        .parse()
                        .map_err(|_| SdpError::InvalidVersion(value.to_string()))?;
                    sdp.version = Some(version);
                }
                "o" => sdp.origin = value.split(' ').map(str::to_string).collect(),
                "s" => sdp.session_name = Some(value.to_string()),
                "m" => sdp.media.push(parse_media(value)?),
                "a" => match sdp.media.last_mut() {
                    Some(media) => media.attributes.push(value.to_string()),
                    None => sdp.attributes.push(value.to_string()),
                },
                k if k.len() == 1 => debug!("ignoring SDP line {line:?}"),
                _ => return Err(SdpError::InvalidLine(line.to_string())),
            }
        }

        Ok(sdp)
    }

    pub fn media(&self, media_type: &str) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.media_type == media_type)
    }

    /// Host is the last token of the origin line; port and formats come from
    /// the audio stream, or the first stream when there is no audio.
    pub fn media_endpoint(&self) -> Result<MediaEndpoint, SdpError> {
        let host = self.origin.last().ok_or(SdpError::MissingOrigin)?;
        let media = self
            .media("audio")
            .or_else(|| self.media.first())
            .ok_or(SdpError::MissingMedia)?;

        Ok(MediaEndpoint {
            host: host.clone(),
            port: media.port,
            protocol: media.protocol.clone(),
            formats: media.formats.clone(),
            version: self.version,
            session_name: self.session_name.clone(),
            origin: self.origin.clone(),
        })
    }
}

fn parse_media(value: &str) -> Result<MediaDescription, SdpError> {
    let mut tokens = value.split(' ');
    let (Some(media_type), Some(port), Some(protocol)) =
        (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(SdpError::IncompleteMedia(value.to_string()));
    };
    // `<port>/<count>` announces several consecutive ports; the first one is used.
    let port = port
        .split('/')
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| SdpError::InvalidPort(port.to_string()))?;

    Ok(MediaDescription {
        media_type: media_type.to_string(),
        port,
        protocol: protocol.to_string(),
        formats: tokens.map(str::to_string).collect(),
        attributes: Vec::new(),
    })
}

pub fn parse(input: &str) -> Result<SessionDescription, SdpError> {
    SessionDescription::parse(input)
}
