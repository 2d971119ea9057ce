mod events;

pub mod apps;
pub mod browser;
pub mod cast_client;
pub mod describe;
pub mod device;
pub mod errors;
pub mod mdns_source;
pub mod model;
pub mod scanner;
pub mod transport;

use std::time::Duration;

pub use apps::AppKind;
pub use browser::DeviceBrowser;
pub use cast_client::CastClient;
pub use describe::{DeviceDescription, fetch_description, parse_description};
pub use device::Device;
pub use errors::{CastError, DescriptionError};
pub use events::{DeviceEvent, ScannerEvent};
pub use model::{
    ConnectionState, DeviceInfo, EditTracksRequest, IdleReason, LoadOptions, MediaInfo,
    MediaMetadata, MediaStatus, PlayTarget, PlayerState, ReceiverStatus, RemoteSession,
    RepeatMode, SubtitleTrack, TextTrackStyle, Volume, VolumeSpec,
};
pub use scanner::{DiscoveryRecord, Scanner, TransportFactory};
pub use transport::{AppSession, Transport};

/// mDNS service domain cast receivers register under.
pub const CAST_SERVICE_DOMAIN: &str = "_googlecast._tcp.local";

/// SSDP search target cast receivers answer on (the DIAL service).
pub const DIAL_SEARCH_TARGET: &str = "urn:dial-multiscreen-org:service:dial:1";

/// TCP port of the cast receiver control channel.
pub const DEFAULT_CAST_PORT: u16 = 8009;

pub(crate) const MDNS_QUERY_INTERVAL: Duration = Duration::from_secs(15);
pub(crate) const SSDP_SEARCH_INTERVAL: Duration = Duration::from_secs(30);
