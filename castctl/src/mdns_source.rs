//! Conversion of raw mDNS responses into discovery records.
//!
//! Cast receivers advertise themselves on `_googlecast._tcp.local`; one
//! response usually mixes PTR, SRV and TXT records for several instances,
//! and a TXT attribute set may be split across chunks. This module flattens
//! a response into the reconciler's record vocabulary without deciding
//! anything about announcement; that is the reconciler's job.

use std::collections::HashMap;

use crate::CAST_SERVICE_DOMAIN;
use crate::scanner::DiscoveryRecord;

/// Flattens one mDNS response into discovery records.
///
/// Record kinds we do not understand are skipped; a response that yields no
/// records at all is simply an empty vector, never an error.
pub fn records_from_response(response: &mdns::Response) -> Vec<DiscoveryRecord> {
    let mut records = Vec::new();

    for record in response.records() {
        match &record.kind {
            mdns::RecordKind::PTR(instance) => {
                if record.name == CAST_SERVICE_DOMAIN {
                    records.push(DiscoveryRecord::Pointer {
                        identity: instance.clone(),
                    });
                }
            }
            mdns::RecordKind::SRV { target, .. } => {
                records.push(DiscoveryRecord::Service {
                    identity: record.name.clone(),
                    address: target.clone(),
                });
            }
            mdns::RecordKind::TXT(chunks) => {
                records.push(DiscoveryRecord::Text {
                    identity: record.name.clone(),
                    attributes: merge_txt_attributes(chunks),
                });
            }
            _ => {}
        }
    }

    records
}

/// Merges TXT chunks (`key=value` strings) into one attribute map.
///
/// A chunk without a separator cannot be decoded; only that chunk is
/// skipped, the other attributes stay usable.
pub fn merge_txt_attributes<S: AsRef<str>>(chunks: &[S]) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for chunk in chunks {
        let parts: Vec<&str> = chunk.as_ref().splitn(2, '=').collect();
        if parts.len() == 2 {
            attributes.insert(parts[0].to_string(), parts[1].to_string());
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_chunks_into_one_map() {
        let chunks = ["id=abcd1234", "fn=Living Room", "md=Chromecast"];
        let attributes = merge_txt_attributes(&chunks);
        assert_eq!(attributes.get("fn").map(String::as_str), Some("Living Room"));
        assert_eq!(attributes.get("md").map(String::as_str), Some("Chromecast"));
        assert_eq!(attributes.len(), 3);
    }

    #[test]
    fn undecodable_chunk_spoils_only_itself() {
        let chunks = ["garbage-without-separator", "fn=Kitchen"];
        let attributes = merge_txt_attributes(&chunks);
        assert_eq!(attributes.get("fn").map(String::as_str), Some("Kitchen"));
        assert_eq!(attributes.len(), 1);
    }

    #[test]
    fn values_keep_embedded_separators() {
        let chunks = ["rs=state=playing"];
        let attributes = merge_txt_attributes(&chunks);
        assert_eq!(
            attributes.get("rs").map(String::as_str),
            Some("state=playing")
        );
    }
}
