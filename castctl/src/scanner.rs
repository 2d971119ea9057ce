//! Discovery reconciler.
//!
//! Both discovery transports deliver fragmentary records: mDNS spreads a
//! device's identity, address and friendly name over PTR/SRV/TXT records
//! that arrive in any order, while the SSDP path delivers everything at
//! once after a description fetch. The reconciler fuses them by identity
//! and announces each device exactly once, only when both the friendly
//! name and the address are known.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use tracing::debug;

use crate::cast_client::CastClient;
use crate::device::Device;
use crate::events::{ScannerEvent, ScannerEventBus};
use crate::model::DeviceInfo;
use crate::transport::Transport;

/// One partial discovery observation, from either transport.
#[derive(Clone, Debug)]
pub enum DiscoveryRecord {
    /// An identity exists (mDNS PTR).
    Pointer { identity: String },
    /// Identity has this network address (mDNS SRV).
    Service { identity: String, address: String },
    /// Identity has these attributes, friendly name possibly among them
    /// (mDNS TXT, chunks already merged).
    Text {
        identity: String,
        attributes: HashMap<String, String>,
    },
    /// Complete observation derived from an SSDP description document.
    Description {
        identity: String,
        friendly_name: String,
        address: String,
    },
}

/// Accumulated knowledge about one identity. Fields only ever gain data;
/// `announced` flips to true at most once.
#[derive(Clone, Debug, Default)]
struct DeviceRecord {
    friendly_name: Option<String>,
    address: Option<String>,
    announced: bool,
}

/// Builds the transport a newly announced device will own.
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

/// Reconciles discovery records into announced devices.
#[derive(Clone)]
pub struct Scanner {
    records: Arc<Mutex<HashMap<String, DeviceRecord>>>,
    events: ScannerEventBus,
    factory: TransportFactory,
}

impl Scanner {
    /// Scanner whose announced devices speak the default `rust_cast`
    /// transport.
    pub fn new() -> Self {
        Self::with_transport_factory(Arc::new(|| Box::new(CastClient::new()) as Box<dyn Transport>))
    }

    /// Scanner with an injected transport factory (tests, alternative wire
    /// clients).
    pub fn with_transport_factory(factory: TransportFactory) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            events: ScannerEventBus::new(),
            factory,
        }
    }

    /// Subscribes to device-found events.
    pub fn subscribe(&self) -> Receiver<ScannerEvent> {
        self.events.subscribe()
    }

    /// Folds one record into the identity table, announcing the device if
    /// this record completed it.
    ///
    /// Safe under concurrent delivery from both transports: the whole
    /// upsert-then-maybe-announce sequence runs under the table lock, so an
    /// interleaving cannot announce the same identity twice.
    pub fn ingest(&self, record: DiscoveryRecord) {
        let (identity, name, address) = match record {
            DiscoveryRecord::Pointer { identity } => (identity, None, None),
            DiscoveryRecord::Service { identity, address } => (identity, None, Some(address)),
            DiscoveryRecord::Text {
                identity,
                attributes,
            } => {
                let name = attributes
                    .get("fn")
                    .or_else(|| attributes.get("n"))
                    .cloned();
                (identity, name, None)
            }
            DiscoveryRecord::Description {
                identity,
                friendly_name,
                address,
            } => (identity, Some(friendly_name), Some(address)),
        };

        // Malformed observations are dropped, never surfaced.
        if identity.is_empty() {
            return;
        }

        let mut records = self.records.lock().unwrap();
        let entry = records.entry(identity.clone()).or_default();

        // Records only ever add information; an empty field never clears
        // what an earlier record already established.
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            entry.friendly_name = Some(name);
        }
        if let Some(address) = address.filter(|a| !a.is_empty()) {
            entry.address = Some(address);
        }
        debug!("updated record {}: {:?}", identity, entry);

        if entry.announced {
            return;
        }
        let (Some(friendly_name), Some(address)) =
            (entry.friendly_name.clone(), entry.address.clone())
        else {
            return;
        };
        entry.announced = true;

        let device = Device::with_transport(
            DeviceInfo {
                name: identity.clone(),
                friendly_name,
                host: address,
            },
            (self.factory)(),
        );

        // Retire the record when the device closes (or errors out), so
        // re-discovery can announce the identity again.
        let records_ref = Arc::clone(&self.records);
        let retired = identity.clone();
        device.set_close_hook(Box::new(move || {
            records_ref.lock().unwrap().remove(&retired);
        }));

        debug!("new device discovered: {}", device);
        self.events.broadcast(ScannerEvent::DeviceFound(device));
    }

    /// Number of identities currently tracked (announced or not).
    pub fn tracked(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::parse_description;
    use std::time::Duration;

    const IDENTITY: &str = "Chromecast-12345._googlecast._tcp.local";

    fn txt_record(identity: &str, name: &str) -> DiscoveryRecord {
        let mut attributes = HashMap::new();
        attributes.insert("fn".to_string(), name.to_string());
        DiscoveryRecord::Text {
            identity: identity.to_string(),
            attributes,
        }
    }

    fn srv_record(identity: &str, address: &str) -> DiscoveryRecord {
        DiscoveryRecord::Service {
            identity: identity.to_string(),
            address: address.to_string(),
        }
    }

    fn found(events: &Receiver<ScannerEvent>) -> Option<Device> {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(ScannerEvent::DeviceFound(device)) => Some(device),
            Err(_) => None,
        }
    }

    #[test]
    fn announces_once_name_and_address_are_known() {
        let scanner = Scanner::new();
        let events = scanner.subscribe();

        scanner.ingest(DiscoveryRecord::Pointer {
            identity: IDENTITY.to_string(),
        });
        assert!(found(&events).is_none());

        scanner.ingest(srv_record(IDENTITY, "cast-host.local"));
        assert!(found(&events).is_none(), "address alone must not announce");

        scanner.ingest(txt_record(IDENTITY, "Living Room"));
        let device = found(&events).expect("complete record must announce");
        assert_eq!(device.name(), IDENTITY);
        assert_eq!(device.friendly_name(), "Living Room");
        assert_eq!(device.host(), "cast-host.local");
    }

    #[test]
    fn announces_regardless_of_record_order() {
        let scanner = Scanner::new();
        let events = scanner.subscribe();

        scanner.ingest(txt_record(IDENTITY, "Living Room"));
        assert!(found(&events).is_none(), "name alone must not announce");
        scanner.ingest(srv_record(IDENTITY, "192.168.1.42"));
        assert!(found(&events).is_some());
    }

    #[test]
    fn repeated_records_announce_only_once() {
        let scanner = Scanner::new();
        let events = scanner.subscribe();

        for _ in 0..2 {
            scanner.ingest(DiscoveryRecord::Pointer {
                identity: IDENTITY.to_string(),
            });
            scanner.ingest(srv_record(IDENTITY, "192.168.1.42"));
            scanner.ingest(txt_record(IDENTITY, "Living Room"));
        }

        assert!(found(&events).is_some());
        assert!(found(&events).is_none(), "re-ingest must not re-announce");
    }

    #[test]
    fn distinct_identities_announce_independently() {
        let scanner = Scanner::new();
        let events = scanner.subscribe();

        scanner.ingest(srv_record("a._googlecast._tcp.local", "10.0.0.1"));
        scanner.ingest(srv_record("b._googlecast._tcp.local", "10.0.0.2"));
        scanner.ingest(txt_record("a._googlecast._tcp.local", "A"));
        scanner.ingest(txt_record("b._googlecast._tcp.local", "B"));

        let mut names: Vec<String> = Vec::new();
        while let Some(device) = found(&events) {
            names.push(device.friendly_name().to_string());
        }
        names.sort();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn empty_fields_never_clear_known_data() {
        let scanner = Scanner::new();
        let events = scanner.subscribe();

        scanner.ingest(txt_record(IDENTITY, "Living Room"));
        // A later TXT without a name attribute must not retract the name.
        scanner.ingest(DiscoveryRecord::Text {
            identity: IDENTITY.to_string(),
            attributes: HashMap::new(),
        });
        scanner.ingest(srv_record(IDENTITY, "192.168.1.42"));

        let device = found(&events).expect("must still announce");
        assert_eq!(device.friendly_name(), "Living Room");
    }

    #[test]
    fn records_without_identity_are_dropped() {
        let scanner = Scanner::new();
        scanner.ingest(srv_record("", "192.168.1.42"));
        assert_eq!(scanner.tracked(), 0);
    }

    #[test]
    fn closing_a_device_allows_re_announcement() {
        let scanner = Scanner::new();
        let events = scanner.subscribe();

        scanner.ingest(srv_record(IDENTITY, "192.168.1.42"));
        scanner.ingest(txt_record(IDENTITY, "Living Room"));
        let device = found(&events).expect("first announcement");

        device.close().expect("close must succeed");
        assert_eq!(scanner.tracked(), 0, "record must be retired on close");

        scanner.ingest(srv_record(IDENTITY, "192.168.1.42"));
        scanner.ingest(txt_record(IDENTITY, "Living Room"));
        assert!(found(&events).is_some(), "re-discovery must re-announce");
    }

    #[test]
    fn ssdp_description_path_announces_normalized_identity() {
        // End to end: SSDP reply -> description document -> announcement.
        let document = r#"<?xml version="1.0"?>
<root><device>
  <friendlyName>Living Room</friendlyName>
  <manufacturer>Google Inc.</manufacturer>
  <UDN>uuid:1234-5</UDN>
</device></root>"#;
        let description = parse_description(document.as_bytes()).unwrap();

        let scanner = Scanner::new();
        let events = scanner.subscribe();
        scanner.ingest(DiscoveryRecord::Description {
            identity: description.identity(),
            friendly_name: description.friendly_name,
            address: "192.168.1.42".to_string(),
        });

        let device = found(&events).expect("description alone is complete");
        assert_eq!(device.name(), "Chromecast-12345._googlecast._tcp.local");
        assert_eq!(device.friendly_name(), "Living Room");
        assert_eq!(device.host(), "192.168.1.42");
    }

    #[test]
    fn both_paths_map_to_one_identity() {
        let scanner = Scanner::new();
        let events = scanner.subscribe();

        // mDNS half first, then the SSDP description for the same device.
        scanner.ingest(DiscoveryRecord::Pointer {
            identity: IDENTITY.to_string(),
        });
        scanner.ingest(DiscoveryRecord::Description {
            identity: IDENTITY.to_string(),
            friendly_name: "Living Room".to_string(),
            address: "192.168.1.42".to_string(),
        });
        scanner.ingest(srv_record(IDENTITY, "cast-host.local"));
        scanner.ingest(txt_record(IDENTITY, "Living Room"));

        assert!(found(&events).is_some());
        assert!(found(&events).is_none(), "one device, one announcement");
    }
}
