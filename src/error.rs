use crate::SessionId;

/// Errors reported to callers of the player bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation referenced a session id absent from the registry.
    #[error("player with id {0} not found")]
    NotFound(SessionId),
    /// `create` was called with an id that is already registered.
    #[error("player with id {0} already exists")]
    AlreadyExists(SessionId),
    /// The decoder could not open the data source.
    #[error("failed to load {uri}: {reason}")]
    SourceLoad { uri: String, reason: String },
    /// A fit mode name or constant could not be parsed.
    #[error("unknown fit mode {0:?}")]
    UnknownFitMode(String),
    /// The decoder was asked to prepare before a source was opened.
    #[error("no source has been opened")]
    NoSource,
    /// The dispatcher thread has stopped and no longer accepts commands.
    #[error("player dispatcher is not running")]
    Disconnected,
    /// The dispatcher thread could not be spawned.
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[cfg(feature = "gstreamer")]
    #[error("{0}")]
    Glib(#[from] glib::Error),
    #[cfg(feature = "gstreamer")]
    #[error("{0}")]
    Bool(#[from] glib::BoolError),
    #[cfg(feature = "gstreamer")]
    #[error("failed to change pipeline state: {0}")]
    StateChange(#[from] gstreamer::StateChangeError),
    #[cfg(feature = "gstreamer")]
    #[error("failed to cast gstreamer element")]
    Cast,
}

impl Error {
    /// Whether this error only means the session id was unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
