//! SSDP device-description retrieval.
//!
//! An SSDP response only carries a LOCATION URL; the actual identity lives
//! in the XML description document behind it. This module fetches that
//! document, checks it describes a cast receiver, and normalizes its UDN
//! into the mDNS identity namespace so a device reached over either
//! discovery transport maps onto the same identity.

use std::io::{BufReader, Read};

use quick_xml::{Error as XmlError, Reader, events::Event};
use tracing::debug;
use ureq::Agent;

use crate::CAST_SERVICE_DOMAIN;
use crate::errors::DescriptionError;

/// Manufacturer token a description document must carry to be treated as a
/// cast receiver.
const EXPECTED_MANUFACTURER: &str = "Google";

const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// The fields of a description document the reconciler cares about.
#[derive(Clone, Debug)]
pub struct DeviceDescription {
    pub udn: String,
    pub friendly_name: String,
    pub manufacturer: String,
}

impl DeviceDescription {
    /// Normalized identity in the mDNS namespace, e.g. UDN `uuid:1234-5`
    /// becomes `Chromecast-12345._googlecast._tcp.local`.
    pub fn identity(&self) -> String {
        cast_identity_from_udn(&self.udn)
    }
}

/// Normalizes a UPnP UDN into the mDNS service-instance namespace.
pub fn cast_identity_from_udn(udn: &str) -> String {
    let bare: String = udn.trim().replace("uuid:", "").replace('-', "");
    format!("Chromecast-{}.{}", bare, CAST_SERVICE_DOMAIN)
}

/// Fetches and parses the description document at `location`.
pub fn fetch_description(location: &str) -> Result<DeviceDescription, DescriptionError> {
    debug!("fetching device description at {}", location);

    let config = Agent::config_builder()
        .timeout_global(Some(FETCH_TIMEOUT))
        .build();
    let agent: Agent = config.into();

    let response = agent.get(location).call()?;
    let (_parts, body) = response.into_parts();

    parse_description(body.into_reader())
}

/// Parses a device description document from any reader.
///
/// Rejects documents whose manufacturer does not carry the expected vendor
/// token and documents lacking a friendly name or UDN.
pub fn parse_description<R: Read>(body: R) -> Result<DeviceDescription, DescriptionError> {
    let mut reader = Reader::from_reader(BufReader::new(body));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current_tag: Option<String> = None;
    let mut in_device = false;

    let mut udn: Option<String> = None;
    let mut friendly_name: Option<String> = None;
    let mut manufacturer: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "device" {
                    in_device = true;
                    current_tag = None;
                } else if in_device {
                    current_tag = Some(name);
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "device" {
                    in_device = false;
                }
                current_tag = None;
            }
            Event::Text(e) => {
                if in_device {
                    let text = e.decode().map_err(XmlError::Encoding)?.into_owned();
                    match current_tag.as_deref() {
                        Some("UDN") if udn.is_none() => udn = Some(text),
                        Some("friendlyName") if friendly_name.is_none() => {
                            friendly_name = Some(text)
                        }
                        Some("manufacturer") if manufacturer.is_none() => {
                            manufacturer = Some(text)
                        }
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let manufacturer = manufacturer.ok_or(DescriptionError::MissingField("manufacturer"))?;
    if !manufacturer.contains(EXPECTED_MANUFACTURER) {
        return Err(DescriptionError::WrongManufacturer(manufacturer));
    }

    Ok(DeviceDescription {
        udn: udn.ok_or(DescriptionError::MissingField("UDN"))?,
        friendly_name: friendly_name.ok_or(DescriptionError::MissingField("friendlyName"))?,
        manufacturer,
    })
}
