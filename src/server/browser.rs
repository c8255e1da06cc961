//! Browser opening and LAN address discovery.

use std::io;
use std::net::{IpAddr, UdpSocket};
use std::process::{Command, Stdio};

/// Open `url` in the default browser without waiting for it.
pub fn open_browser(url: &str) -> io::Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(url);
        command
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", "", url]);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    };
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).spawn().map(|_| ())
}

/// Address this machine uses to reach the network, if any.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outgoing interface.
pub fn network_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_loopback() || ip.is_unspecified() {
        None
    } else {
        Some(ip)
    }
}

/// URLs printed when the server starts: loopback and, when known, LAN.
pub fn server_urls(port: u16) -> (String, Option<String>) {
    let local = format!("http://localhost:{}", port);
    let network = network_address().map(|ip| format!("http://{}:{}", ip, port));
    (local, network)
}
