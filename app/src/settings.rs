//! Compile-time configuration loaded via `toml-cfg`.

#[toml_cfg::toml_config]
pub struct Settings {
    #[default("127.0.0.1")]
    pub sip_server: &'static str,
    #[default(5060)]
    pub sip_port: u16,
    #[default("1001")]
    pub sip_user: &'static str,
    #[default("secret")]
    pub sip_password: &'static str,
    #[default("100")]
    pub callee: &'static str,
    #[default("0.0.0.0")]
    pub local_ip: &'static str,
    #[default("announcement.wav")]
    pub announcement: &'static str,
    #[default(30)]
    pub receive_timeout_secs: u64,
    #[default(1024)]
    pub chunk_size: usize,
    #[default(2)]
    pub ring_delay_secs: u64,
}
