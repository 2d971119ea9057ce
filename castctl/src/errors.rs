use thiserror::Error;

/// Errors surfaced by a device session client.
///
/// Only `Transport` is fatal to the device: it tears the connection down and
/// moves the device to `Closed`. Everything else leaves the device usable.
#[derive(Error, Debug)]
pub enum CastError {
    #[error("device is closed")]
    Closed,
    #[error("no active session on the receiver")]
    NoSession,
    #[error("subtitle styles not defined")]
    SubtitleStylesUndefined,
    #[error("operation '{0}' is not supported by this transport")]
    Unsupported(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
}

impl CastError {
    pub fn transport(message: impl Into<String>) -> Self {
        CastError::Transport(message.into())
    }
}

/// Errors raised while fetching and parsing an SSDP device description.
///
/// These never reach the discovery reconciler; the browser logs them and
/// drops the response.
#[derive(Error, Debug)]
pub enum DescriptionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("failed to read HTTP body: {0}")]
    HttpIo(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("missing required device element: {0}")]
    MissingField(&'static str),

    #[error("manufacturer '{0}' is not a cast receiver vendor")]
    WrongManufacturer(String),
}
