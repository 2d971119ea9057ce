//! Trait boundary to the cast wire client.
//!
//! The session state machine in [`crate::device`] is written entirely
//! against these traits; the `rust_cast`-backed adapter lives in
//! [`crate::cast_client`] and tests substitute mocks.

use crossbeam_channel::Receiver;

use crate::apps::AppKind;
use crate::errors::CastError;
use crate::model::{
    EditTracksRequest, LoadOptions, MediaInfo, MediaStatus, ReceiverStatus, RemoteSession, Volume,
    VolumeSpec,
};

/// Control-channel connection to one device.
///
/// Every call may block indefinitely; no transport operation carries an
/// intrinsic timeout. Callers needing bounded latency impose their own.
pub trait Transport: Send {
    /// Opens the control channel to the device at `host`.
    fn connect(&mut self, host: &str) -> Result<(), CastError>;

    /// Lists the application sessions currently running on the receiver.
    fn remote_sessions(&mut self) -> Result<Vec<RemoteSession>, CastError>;

    /// Joins an existing remote session for the given application.
    fn join(
        &mut self,
        session: &RemoteSession,
        app: AppKind,
    ) -> Result<Box<dyn AppSession>, CastError>;

    /// Launches a new session for the given application.
    fn launch(&mut self, app: AppKind) -> Result<Box<dyn AppSession>, CastError>;

    /// Receiver-wide status (volume, running applications).
    fn receiver_status(&mut self) -> Result<ReceiverStatus, CastError>;

    fn volume(&mut self) -> Result<Volume, CastError>;

    fn set_volume(&mut self, spec: VolumeSpec) -> Result<Volume, CastError>;

    /// Stops the remote application session with the given id.
    fn stop_session(&mut self, session_id: &str) -> Result<(), CastError>;

    /// Closes the control channel. Infallible by design; a channel that is
    /// already gone is as closed as it gets.
    fn close(&mut self);
}

/// An application session obtained by join or launch.
pub trait AppSession: Send {
    fn app(&self) -> AppKind;

    fn session_id(&self) -> &str;

    /// Loads media by URL descriptor (generic receiver semantics).
    fn load(&mut self, media: &MediaInfo, options: &LoadOptions)
    -> Result<MediaStatus, CastError>;

    /// Loads media by video identifier (video-sharing receiver semantics).
    fn load_video(&mut self, video_id: &str) -> Result<(), CastError>;

    fn play(&mut self) -> Result<(), CastError>;

    fn pause(&mut self) -> Result<(), CastError>;

    fn stop(&mut self) -> Result<(), CastError>;

    /// Absolute seek, in seconds.
    fn seek(&mut self, position: f32) -> Result<(), CastError>;

    fn status(&mut self) -> Result<MediaStatus, CastError>;

    fn edit_tracks(&mut self, request: &EditTracksRequest) -> Result<(), CastError>;

    /// The session's status notification channel. The device subscribes to
    /// it exactly once, right after the session is bound; notifications are
    /// delivered in transport order.
    fn status_events(&self) -> Receiver<MediaStatus>;
}
