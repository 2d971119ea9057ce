//! Static application descriptors supported by the session client.
//!
//! The receiver reports sessions by application identifier; we map those
//! identifiers onto a small closed set of variants instead of a runtime
//! registry, so every lookup is an exhaustive match.

/// The two first-party receiver applications this client can bind to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppKind {
    /// Default media receiver: loads media by URL descriptor.
    GenericReceiver,
    /// Video-sharing-site receiver: loads media by video identifier.
    VideoSharing,
}

impl AppKind {
    /// Stable application identifier announced by the receiver.
    pub fn app_id(&self) -> &'static str {
        match self {
            AppKind::GenericReceiver => "CC1AD845",
            AppKind::VideoSharing => "233637DE",
        }
    }

    /// Maps a remote-reported identifier back onto a supported descriptor.
    pub fn from_app_id(app_id: &str) -> Option<AppKind> {
        match app_id {
            "CC1AD845" => Some(AppKind::GenericReceiver),
            "233637DE" => Some(AppKind::VideoSharing),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppKind::GenericReceiver => f.write_str("DefaultMediaReceiver"),
            AppKind::VideoSharing => f.write_str("YouTube"),
        }
    }
}

/// Extracts the video identifier from a video-sharing-site link.
///
/// Recognized forms: `watch?v=<id>`, `youtu.be/<id>`, `/embed/<id>` and
/// `/v/<id>`. Returns `None` for anything else, which routes the URL to the
/// generic receiver instead.
pub fn video_id(url: &str) -> Option<String> {
    if let Some(rest) = url.split("youtu.be/").nth(1) {
        return take_id(rest);
    }

    let rest = url.split("youtube.com").nth(1)?;

    if let Some(query) = rest.split(['?', '&']).find(|part| part.starts_with("v=")) {
        return take_id(&query[2..]);
    }
    if let Some(path) = rest.split("/embed/").nth(1) {
        return take_id(path);
    }
    if let Some(path) = rest.split("/v/").nth(1) {
        return take_id(path);
    }

    None
}

fn take_id(rest: &str) -> Option<String> {
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if id.is_empty() { None } else { Some(id) }
}
