//! Host facts reported at registration

use std::net::UdpSocket;

pub const UNKNOWN_HOST: &str = "unknown-host";
pub const UNKNOWN_IP: &str = "0.0.0.0";

pub fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|n| !n.is_empty()))
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

/// Address of the interface that routes outward. Connecting a UDP socket
/// selects a route without sending anything.
pub fn primary_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| UNKNOWN_IP.to_string())
}

/// e.g. `Ubuntu 22.04.4 LTS (linux x86_64)`
pub fn os_description() -> String {
    let platform = format!("{} {}", std::env::consts::OS, std::env::consts::ARCH);
    match pretty_name(std::fs::read_to_string("/etc/os-release").ok().as_deref()) {
        Some(name) => format!("{} ({})", name, platform),
        None => platform,
    }
}

fn pretty_name(os_release: Option<&str>) -> Option<String> {
    os_release?
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|value| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
