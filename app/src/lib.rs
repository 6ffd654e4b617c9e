use std::net::IpAddr;
use std::thread;
use std::time::Duration;

use log::info;
use sip_core::{SipError, SipStack, StackConfig, UdpConnector};
use thiserror::Error;

use crate::settings::{Settings, SETTINGS};

pub mod announcement;
mod settings;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("sip error: {0}")]
    Sip(#[from] SipError),
    #[error("announcement error: {0}")]
    Announcement(#[from] hound::Error),
    #[error("invalid setting {name}: {value:?}")]
    Setting { name: &'static str, value: String },
}

pub fn run() -> Result<(), AppError> {
    let settings = &SETTINGS;
    info!(
        "starting announcement dialer: {}@{}:{} -> {}",
        settings.sip_user, settings.sip_server, settings.sip_port, settings.callee
    );

    let local_ip: IpAddr = settings.local_ip.parse().map_err(|_| AppError::Setting {
        name: "local_ip",
        value: settings.local_ip.to_string(),
    })?;
    let announcement = announcement::load(settings.announcement)?;

    let mut stack = SipStack::new(
        stack_config(settings),
        settings.sip_user,
        settings.sip_password,
        UdpConnector::new(local_ip),
    );

    let result = stack
        .connect()
        .map_err(AppError::from)
        .and_then(|_| dial(&mut stack, settings, &announcement));
    stack.close();
    result
}

fn stack_config(settings: &Settings) -> StackConfig {
    StackConfig {
        server: settings.sip_server.to_string(),
        port: settings.sip_port,
        local_ip: settings.local_ip.to_string(),
        receive_timeout: Duration::from_secs(settings.receive_timeout_secs),
        ..StackConfig::default()
    }
}

fn dial(
    stack: &mut SipStack<UdpConnector>,
    settings: &Settings,
    announcement: &[u8],
) -> Result<(), AppError> {
    let Some(mut call) = stack.call(settings.callee)? else {
        info!("{} did not answer", settings.callee);
        return Ok(());
    };

    thread::sleep(Duration::from_secs(settings.ring_delay_secs));
    let played = announcement::play(&mut call, announcement, settings.chunk_size);
    stack.hangup(call);

    let datagrams = played?;
    info!("announcement delivered in {datagrams} datagrams");
    Ok(())
}
