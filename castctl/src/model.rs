//! Shared data model for discovery and session control.

use serde::{Deserialize, Serialize};

/// Immutable identity of a discovered device, captured at announce time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Stable discovery identity, e.g.
    /// `Chromecast-1234abcd._googlecast._tcp.local`.
    pub name: String,
    /// Human-readable label advertised by the device.
    pub friendly_name: String,
    /// Host name or IP address of the device.
    pub host: String,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{} ({})", self.friendly_name, self.host),
        }
    }
}

/// Connection lifecycle of a device session client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// A receiver-side application session reported by the transport.
#[derive(Clone, Debug)]
pub struct RemoteSession {
    pub session_id: String,
    pub app_id: String,
    pub transport_id: String,
    pub display_name: String,
}

/// Media descriptor handed to the generic receiver application.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subtitles: Vec<SubtitleTrack>,
}

impl MediaInfo {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub images: Vec<String>,
}

/// A side-loaded subtitle track offered at load time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleTrack {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Load configuration; every unset field means "no override".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadOptions {
    pub autoplay: Option<bool>,
    /// Start offset in seconds; `None` starts at the beginning.
    pub start_time: Option<f32>,
    pub repeat_mode: Option<RepeatMode>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatMode {
    Off,
    All,
    Single,
}

/// Player state reported by the receiver application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Idle,
    Buffering,
    Playing,
    Paused,
}

/// Why an idle player went idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdleReason {
    Cancelled,
    Interrupted,
    Finished,
    Error,
}

/// Most recent media status observed from the receiver. No history is kept;
/// each notification overwrites the previous one.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStatus {
    pub player_state: PlayerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_reason: Option<IdleReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_session_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_track_style: Option<TextTrackStyle>,
}

impl MediaStatus {
    pub fn idle() -> Self {
        Self {
            player_state: PlayerState::Idle,
            idle_reason: None,
            current_time: None,
            media_session_id: None,
            media: None,
            text_track_style: None,
        }
    }

    /// True when playback ended on its own.
    pub fn is_finished(&self) -> bool {
        self.player_state == PlayerState::Idle && self.idle_reason == Some(IdleReason::Finished)
    }
}

/// Text track rendering style, as last reported by the receiver.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTrackStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

/// Device-level (receiver-wide) status.
#[derive(Clone, Debug)]
pub struct ReceiverStatus {
    pub volume: Volume,
    pub applications: Vec<RemoteSession>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Volume {
    pub level: Option<f32>,
    pub muted: Option<bool>,
}

/// What to change in a `set_volume` request.
#[derive(Clone, Copy, Debug)]
pub enum VolumeSpec {
    /// Volume level, clamped into `0.0..=1.0`.
    Level(f32),
    Muted(bool),
}

/// Track-edit request issued against the bound media session.
#[derive(Clone, Debug, Default)]
pub struct EditTracksRequest {
    /// `Some(vec![])` deactivates every track; `None` leaves activation as is.
    pub active_track_ids: Option<Vec<i32>>,
    pub text_track_style: Option<TextTrackStyle>,
}

/// What `Device::play` is asked to play.
#[derive(Clone, Debug)]
pub enum PlayTarget {
    /// A bare URL, classified by `apps::video_id` before loading.
    Url(String),
    /// A full media descriptor; always goes to the generic receiver.
    Media(MediaInfo),
}

impl From<&str> for PlayTarget {
    fn from(url: &str) -> Self {
        PlayTarget::Url(url.to_string())
    }
}

impl From<String> for PlayTarget {
    fn from(url: String) -> Self {
        PlayTarget::Url(url)
    }
}

impl From<MediaInfo> for PlayTarget {
    fn from(media: MediaInfo) -> Self {
        PlayTarget::Media(media)
    }
}
