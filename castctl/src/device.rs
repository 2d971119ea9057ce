//! Per-device session client.
//!
//! A `Device` owns one control-channel transport connection and at most one
//! bound application session. Commands implicitly ensure a session exists
//! before acting (join an existing remote session if one matches, launch
//! otherwise), so callers can issue `play`/`pause`/`seek` against a freshly
//! discovered device without any session bookkeeping of their own.
//!
//! Only transport-level failures close a device; per-operation errors
//! (no session, unknown subtitle style) leave it usable.

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::apps::{self, AppKind};
use crate::cast_client::CastClient;
use crate::errors::CastError;
use crate::events::{DeviceEvent, DeviceEventBus};
use crate::model::{
    ConnectionState, DeviceInfo, EditTracksRequest, LoadOptions, MediaInfo, MediaStatus,
    PlayTarget, ReceiverStatus, TextTrackStyle, Volume, VolumeSpec,
};
use crate::transport::{AppSession, Transport};

/// Caller-facing handle for one discovered device.
///
/// Cloning the handle shares the same connection and session; every clone
/// observes the same events.
#[derive(Clone)]
pub struct Device {
    info: DeviceInfo,
    shared: Arc<DeviceShared>,
}

struct DeviceShared {
    state: Mutex<ConnectionState>,
    transport: Mutex<Box<dyn Transport>>,
    session: Mutex<Option<ActiveSession>>,
    /// Last text-track style seen in a status payload; sizing requests
    /// mutate this, they cannot invent style data.
    subtitles_style: Mutex<Option<TextTrackStyle>>,
    events: DeviceEventBus,
    close_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

struct ActiveSession {
    app: AppKind,
    session: Box<dyn AppSession>,
}

impl Device {
    /// Builds a device driven by the default `rust_cast` transport.
    pub fn new(info: DeviceInfo) -> Self {
        let transport = Box::new(CastClient::new());
        Self::with_transport(info, transport)
    }

    /// Builds a device over an explicit transport (tests, alternative wire
    /// clients).
    pub fn with_transport(info: DeviceInfo, transport: Box<dyn Transport>) -> Self {
        Self {
            info,
            shared: Arc::new(DeviceShared {
                state: Mutex::new(ConnectionState::Disconnected),
                transport: Mutex::new(transport),
                session: Mutex::new(None),
                subtitles_style: Mutex::new(None),
                events: DeviceEventBus::new(),
                close_hook: Mutex::new(None),
            }),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn friendly_name(&self) -> &str {
        &self.info.friendly_name
    }

    pub fn host(&self) -> &str {
        &self.info.host
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.lock().unwrap()
    }

    /// Subscribes to this device's event stream.
    pub fn subscribe(&self) -> Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }

    /// Invoked once, on close or error teardown. The scanner uses it to
    /// retire the device's discovery record so re-discovery can re-announce.
    pub(crate) fn set_close_hook(&self, hook: Box<dyn FnOnce() + Send>) {
        *self.shared.close_hook.lock().unwrap() = Some(hook);
    }

    /// Opens the control channel to the device's address.
    pub fn connect(&self) -> Result<(), CastError> {
        self.assert_open()?;
        debug!("connecting to {} at {}", self.info.friendly_name, self.info.host);
        *self.shared.state.lock().unwrap() = ConnectionState::Connecting;

        let result = { self.shared.transport.lock().unwrap().connect(&self.info.host) };
        match result {
            Ok(()) => {
                *self.shared.state.lock().unwrap() = ConnectionState::Connected;
                self.shared.events.broadcast(DeviceEvent::Connected);
                Ok(())
            }
            Err(err) => Err(self.note_failure(err)),
        }
    }

    /// Ensures an application session is bound, joining or launching as
    /// needed, and returns which application it belongs to.
    ///
    /// With a session already bound this returns immediately without any
    /// remote call. Otherwise the receiver's running sessions are listed and
    /// the first one matching the requested application (or, with no
    /// specific request, any supported application) is joined; with no match
    /// the requested application is launched. A bare query with no request
    /// and no matching remote session fails with [`CastError::NoSession`]
    /// rather than launching anything.
    pub fn ensure_session(&self, app: Option<AppKind>) -> Result<AppKind, CastError> {
        self.assert_open()?;

        if let Some(active) = self.shared.session.lock().unwrap().as_ref() {
            return Ok(active.app);
        }

        let bound = {
            let mut transport = self.shared.transport.lock().unwrap();
            bind_session(transport.as_mut(), app)
        };
        let (kind, session) = match bound {
            Ok(pair) => pair,
            Err(err) => return Err(self.note_failure(err)),
        };
        debug!("bound {} session on {}", kind, self.info.friendly_name);

        // Subscribed exactly once per bound session; the forwarder thread
        // ends when the session (and its sender side) is dropped.
        let statuses = session.status_events();
        *self.shared.session.lock().unwrap() = Some(ActiveSession { app: kind, session });
        self.spawn_status_forwarder(statuses);

        Ok(kind)
    }

    /// Loads a resource, routing it to the right receiver application.
    ///
    /// A URL matching the video-sharing link format is loaded by identifier
    /// on the video app; everything else goes to the generic receiver as a
    /// media descriptor with the given options.
    pub fn play(
        &self,
        target: impl Into<PlayTarget>,
        options: &LoadOptions,
    ) -> Result<(), CastError> {
        match target.into() {
            PlayTarget::Url(url) => match apps::video_id(&url) {
                Some(id) => self.with_session(Some(AppKind::VideoSharing), |session| {
                    session.load_video(&id)
                }),
                None => {
                    let media = MediaInfo::from_url(url);
                    self.with_session(Some(AppKind::GenericReceiver), |session| {
                        session.load(&media, options).map(|_| ())
                    })
                }
            },
            PlayTarget::Media(media) => {
                self.with_session(Some(AppKind::GenericReceiver), |session| {
                    session.load(&media, options).map(|_| ())
                })
            }
        }
    }

    pub fn pause(&self) -> Result<(), CastError> {
        self.with_session(Some(AppKind::GenericReceiver), |session| session.pause())
    }

    pub fn unpause(&self) -> Result<(), CastError> {
        self.with_session(Some(AppKind::GenericReceiver), |session| session.play())
    }

    pub fn resume(&self) -> Result<(), CastError> {
        self.unpause()
    }

    pub fn stop(&self) -> Result<(), CastError> {
        self.with_session(Some(AppKind::GenericReceiver), |session| session.stop())
    }

    /// Seeks to an absolute position, in seconds.
    pub fn seek_to(&self, time: f32) -> Result<(), CastError> {
        self.with_session(Some(AppKind::GenericReceiver), |session| session.seek(time))
    }

    /// Seeks relative to the current position.
    ///
    /// The position is read from a status query first; playback that moves
    /// between that read and the absolute seek lands slightly off target.
    /// Accepted limitation, same as issuing the two calls by hand.
    pub fn seek(&self, delta: f32) -> Result<(), CastError> {
        let status = self.get_status()?;
        self.seek_to(status.current_time.unwrap_or(0.0) + delta)
    }

    /// Current playback position in seconds, 0 when the receiver reports
    /// none.
    pub fn current_time(&self) -> Result<f32, CastError> {
        Ok(self.get_status()?.current_time.unwrap_or(0.0))
    }

    /// App-level media status; ensures the generic receiver session first.
    pub fn get_status(&self) -> Result<MediaStatus, CastError> {
        self.with_session(Some(AppKind::GenericReceiver), |session| session.status())
    }

    /// Receiver-wide status. Also ensures the generic receiver session
    /// first, so the receiver is in a known launched state when read.
    pub fn get_receiver_status(&self) -> Result<ReceiverStatus, CastError> {
        self.ensure_session(Some(AppKind::GenericReceiver))?;
        let result = { self.shared.transport.lock().unwrap().receiver_status() };
        result.map_err(|err| self.note_failure(err))
    }

    /// Device-level volume; no app session required.
    pub fn volume(&self) -> Result<Volume, CastError> {
        self.assert_open()?;
        let result = { self.shared.transport.lock().unwrap().volume() };
        result.map_err(|err| self.note_failure(err))
    }

    /// Sets the volume level, clamped into `0.0..=1.0`.
    pub fn set_volume(&self, level: f32) -> Result<Volume, CastError> {
        self.assert_open()?;
        let spec = VolumeSpec::Level(level.clamp(0.0, 1.0));
        let result = { self.shared.transport.lock().unwrap().set_volume(spec) };
        result.map_err(|err| self.note_failure(err))
    }

    pub fn set_muted(&self, muted: bool) -> Result<Volume, CastError> {
        self.assert_open()?;
        let result = {
            self.shared
                .transport
                .lock()
                .unwrap()
                .set_volume(VolumeSpec::Muted(muted))
        };
        result.map_err(|err| self.note_failure(err))
    }

    /// Deactivates every text track.
    pub fn subtitles_off(&self) -> Result<(), CastError> {
        self.with_session(Some(AppKind::GenericReceiver), |session| {
            session.edit_tracks(&EditTracksRequest {
                active_track_ids: Some(Vec::new()),
                text_track_style: None,
            })
        })
    }

    /// Activates a single text track by id.
    pub fn change_subtitles(&self, track_id: i32) -> Result<(), CastError> {
        self.with_session(Some(AppKind::GenericReceiver), |session| {
            session.edit_tracks(&EditTracksRequest {
                active_track_ids: Some(vec![track_id]),
                text_track_style: None,
            })
        })
    }

    /// Rescales subtitles by mutating the last style the receiver reported.
    ///
    /// Fails with [`CastError::SubtitleStylesUndefined`] before any status
    /// carried a style; the style check happens before any transport call.
    /// The cache guard is held across the edit so concurrent sizing calls
    /// serialize, and the cache only records what the receiver accepted.
    pub fn change_subtitles_size(&self, font_scale: f32) -> Result<(), CastError> {
        let mut cache = self.shared.subtitles_style.lock().unwrap();
        let mut style = cache.clone().ok_or(CastError::SubtitleStylesUndefined)?;
        style.font_scale = Some(font_scale);

        self.with_session(Some(AppKind::GenericReceiver), |session| {
            session.edit_tracks(&EditTracksRequest {
                active_track_ids: None,
                text_track_style: Some(style.clone()),
            })
        })?;

        *cache = Some(style);
        Ok(())
    }

    /// Stops the bound session (if any), closes the transport and signals
    /// the close event. Exactly one stop command is issued when a session is
    /// bound, none otherwise.
    pub fn close(&self) -> Result<(), CastError> {
        self.assert_open()?;

        let active = self.shared.session.lock().unwrap().take();
        {
            let mut transport = self.shared.transport.lock().unwrap();
            if let Some(active) = active {
                if let Err(err) = transport.stop_session(active.session.session_id()) {
                    debug!("stop on close failed for {}: {}", self.info.name, err);
                }
            }
            transport.close();
        }

        *self.shared.state.lock().unwrap() = ConnectionState::Closed;
        debug!("device {} closed", self.info.name);
        self.shared.events.broadcast(DeviceEvent::Closed);
        if let Some(hook) = self.shared.close_hook.lock().unwrap().take() {
            hook();
        }
        Ok(())
    }

    fn assert_open(&self) -> Result<(), CastError> {
        match *self.shared.state.lock().unwrap() {
            ConnectionState::Closed => Err(CastError::Closed),
            _ => Ok(()),
        }
    }

    /// Ensures a session for `app`, then runs one command against it.
    fn with_session<T>(
        &self,
        app: Option<AppKind>,
        f: impl FnOnce(&mut dyn AppSession) -> Result<T, CastError>,
    ) -> Result<T, CastError> {
        self.ensure_session(app)?;
        let result = {
            let mut slot = self.shared.session.lock().unwrap();
            let active = slot.as_mut().ok_or(CastError::NoSession)?;
            f(active.session.as_mut())
        };
        result.map_err(|err| self.note_failure(err))
    }

    /// Transport errors tear the device down; everything else passes
    /// through untouched.
    fn note_failure(&self, err: CastError) -> CastError {
        if let CastError::Transport(message) = &err {
            self.teardown(message.clone());
        }
        err
    }

    fn teardown(&self, message: String) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }
        warn!("closing {} after transport error: {}", self.info.name, message);
        self.shared.session.lock().unwrap().take();
        self.shared.transport.lock().unwrap().close();
        self.shared.events.broadcast(DeviceEvent::Error(message));
        self.shared.events.broadcast(DeviceEvent::Closed);
        if let Some(hook) = self.shared.close_hook.lock().unwrap().take() {
            hook();
        }
    }

    /// Re-emits the session's status notifications, in delivery order, as
    /// device events; an idle/finished status additionally emits `Finished`.
    fn spawn_status_forwarder(&self, statuses: Receiver<MediaStatus>) {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("castctl-status".to_string())
            .spawn(move || {
                for status in statuses.iter() {
                    if let Some(style) = status.text_track_style.clone() {
                        *shared.subtitles_style.lock().unwrap() = Some(style);
                    }
                    let finished = status.is_finished();
                    shared.events.broadcast(DeviceEvent::Status(status));
                    if finished {
                        shared.events.broadcast(DeviceEvent::Finished);
                    }
                }
            });
        if let Err(err) = spawned {
            warn!("failed to spawn status forwarder: {}", err);
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.info.fmt(f)
    }
}

/// Join-or-launch against the transport, first match wins.
fn bind_session(
    transport: &mut dyn Transport,
    app: Option<AppKind>,
) -> Result<(AppKind, Box<dyn AppSession>), CastError> {
    let sessions = transport.remote_sessions()?;

    let matched = sessions.into_iter().find_map(|remote| {
        let kind = AppKind::from_app_id(&remote.app_id)?;
        match app {
            Some(requested) if kind != requested => None,
            _ => Some((kind, remote)),
        }
    });

    match (matched, app) {
        (Some((kind, remote)), _) => Ok((kind, transport.join(&remote, kind)?)),
        (None, Some(requested)) => Ok((requested, transport.launch(requested)?)),
        (None, None) => Err(CastError::NoSession),
    }
}
