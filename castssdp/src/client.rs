//! SSDP client: sends M-SEARCH queries and collects location-bearing replies.

use super::{SSDP_MULTICAST_ADDR, SSDP_PORT};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A location-bearing SSDP message seen by the control point.
///
/// Both `NOTIFY ssdp:alive` announcements and unicast `HTTP/1.1 200` search
/// replies carry the same three things a control point needs: the announced
/// USN, the description LOCATION and the address the message came from.
/// Everything else (byebye, other control points' M-SEARCH) is dropped.
#[derive(Debug, Clone)]
pub struct SsdpMessage {
    pub usn: String,
    pub location: String,
    pub from: SocketAddr,
}

/// SSDP control-point socket.
pub struct SsdpClient {
    socket: UdpSocket,
}

impl SsdpClient {
    /// Binds an ephemeral UDP port and joins the SSDP multicast group on
    /// every non-loopback IPv4 interface.
    pub fn new() -> std::io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;

        let bind_addr: SocketAddr = "0.0.0.0:0"
            .parse()
            .expect("static bind address must parse");
        socket2.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(Duration::from_secs(1)))?;
        socket.set_multicast_loop_v4(true)?;

        let group = SSDP_MULTICAST_ADDR
            .parse()
            .expect("static multicast address must parse");
        for iface in get_if_addrs::get_if_addrs()? {
            if let std::net::IpAddr::V4(ipv4) = iface.ip() {
                if !ipv4.is_loopback() {
                    match socket.join_multicast_v4(&group, &ipv4) {
                        Ok(()) => debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4),
                        Err(e) => {
                            warn!("SSDP: failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, ipv4, e)
                        }
                    }
                }
            }
        }

        Ok(Self { socket })
    }

    /// Sends an M-SEARCH for the given search target.
    pub fn search(&self, st: &str, mx: u32) -> std::io::Result<()> {
        let mx = mx.max(1); // MX must be >= 1
        let msg = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             USER-AGENT: castssdp client\r\n\
             \r\n",
            SSDP_MULTICAST_ADDR, SSDP_PORT, mx, st
        );

        let addr: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
            .parse()
            .expect("static multicast address must parse");

        match self.socket.send_to(msg.as_bytes(), addr) {
            Ok(_) => {
                debug!("M-SEARCH sent (ST={}, MX={})", st, mx);
                Ok(())
            }
            Err(e) => {
                warn!("failed to send M-SEARCH: {}", e);
                Err(e)
            }
        }
    }

    /// Waits up to the socket read timeout for one SSDP message.
    ///
    /// Returns `Ok(None)` on timeout or when the datagram is not a
    /// location-bearing SSDP message; the caller loops.
    pub fn recv(&self) -> std::io::Result<Option<SsdpMessage>> {
        let mut buf = [0u8; 8192];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                let data = String::from_utf8_lossy(&buf[..n]);
                Ok(parse_message(&data, from))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Parses one SSDP datagram into a location-bearing message, if it is one.
pub fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpMessage> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    if upper.starts_with("NOTIFY ") {
        // Only alive notifications carry a LOCATION worth following.
        let nts = headers.get("NTS")?.to_ascii_lowercase();
        if nts != "ssdp:alive" {
            trace!("ignoring NOTIFY {} from {}", nts, from);
            return None;
        }
    } else if upper.starts_with("HTTP/") && upper.contains(" 200 ") {
        // M-SEARCH reply, fall through to header extraction.
    } else {
        // Another control point querying, or something malformed.
        trace!("ignoring SSDP message from {}: {}", from, first_line);
        return None;
    }

    let usn = headers.get("USN")?.to_string();
    let location = match headers.get("LOCATION") {
        Some(loc) => loc.to_string(),
        None => {
            trace!("SSDP message from {} has no LOCATION, ignoring", from);
            return None;
        }
    };

    Some(SsdpMessage { usn, location, from })
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();

        // Empty line marks end of headers
        if line.is_empty() {
            break;
        }

        // Split on first ':' only (values may contain ':')
        if let Some(colon_pos) = line.find(':') {
            let (name, value_with_colon) = line.split_at(colon_pos);
            let value = &value_with_colon[1..];

            let name = name.trim().to_ascii_uppercase();
            let value = value.trim().to_string();

            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value);
            } else {
                trace!("skipping malformed header: '{}'", line);
            }
        } else {
            trace!("skipping line without colon: '{}'", line);
        }
    }
    headers
}
