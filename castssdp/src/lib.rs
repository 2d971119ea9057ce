/*!
SSDP control-point client used to locate DIAL-capable cast receivers.
It must **not** bind to UDP port 1900.

Reason:

* A device in UPnP server mode listens on 0.0.0.0:1900 for M-SEARCH discovery.
* A control point only needs to send M-SEARCH and receive unicast HTTP/200
  replies, so it binds an ephemeral port and joins the multicast group for
  the NOTIFY traffic it cares about.
* If two sockets bind 1900 (even with SO_REUSEPORT) the kernel load-balances
  incoming datagrams between them and replies are lost randomly.
*/

mod client;

pub use client::{SsdpClient, SsdpMessage, parse_message};

/// SSDP multicast address.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// SSDP port.
pub const SSDP_PORT: u16 = 1900;
