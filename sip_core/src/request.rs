//! Scaffolding shared by every request this client generates.

use crate::{stack::StackConfig, Method, SipMessage, ALLOW, USER_AGENT};

/// `Expires` carried by every generated request unless a flow overrides it.
pub const DEFAULT_EXPIRES: u32 = 30;

/// `"user" <sip:user@server>`
pub fn caller_identity(user: &str, server: &str) -> String {
    format!("\"{user}\" <sip:{user}@{server}>")
}

pub fn callee(number: &str, server: &str) -> String {
    format!("{number}@{server}")
}

/// Request line plus `Via`, `Expires`, `User-Agent` and `Allow`, in that order.
pub fn new_request(config: &StackConfig, method: Method, target: &str, branch: &str) -> SipMessage {
    let mut req = SipMessage::request(method, target);
    req.set("Via", build_via(&config.local_ip, config.local_port, branch));
    req.set("Expires", DEFAULT_EXPIRES);
    req.set("User-Agent", USER_AGENT);
    req.set("Allow", ALLOW);
    req
}

pub fn set_sequence(req: &mut SipMessage, number: u32, method: &Method) {
    req.set("CSeq", format!("{number} {method}"));
}

pub fn with_tag(uri: &str, tag: &str) -> String {
    format!("{uri};tag={tag}")
}

fn build_via(host: &str, port: u16, branch: &str) -> String {
    format!("SIP/2.0/UDP {host}:{port};branch={branch};rport")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_starts_with_common_headers() {
        let config = StackConfig::default();
        let req = new_request(&config, Method::Options, "pbx.local", "z9hG4bKabc");
        let names: Vec<&str> = req.headers.names().collect();
        assert_eq!(names, ["Via", "Expires", "User-Agent", "Allow"]);
        assert_eq!(
            req.get("Via").unwrap().to_string(),
            "SIP/2.0/UDP 0.0.0.0:5060;branch=z9hG4bKabc;rport"
        );
    }

    #[test]
    fn identities() {
        assert_eq!(
            caller_identity("alice", "pbx.local"),
            "\"alice\" <sip:alice@pbx.local>"
        );
        assert_eq!(callee("100", "pbx.local"), "100@pbx.local");
        assert_eq!(with_tag("<sip:a@b>", "1234"), "<sip:a@b>;tag=1234");
    }
}
