use crate::SessionId;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Playback capabilities reported with the `load` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub fast_forward: bool,
    pub slow_forward: bool,
    pub slow_reverse: bool,
    pub reverse: bool,
    pub step_forward: bool,
    pub step_backward: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        fast_forward: true,
        slow_forward: true,
        slow_reverse: true,
        reverse: true,
        step_forward: true,
        step_backward: true,
    };

    pub const NONE: Capabilities = Capabilities {
        fast_forward: false,
        slow_forward: false,
        slow_reverse: false,
        reverse: false,
        step_forward: false,
        step_backward: false,
    };
}

/// Payload of a [`PlayerEvent`]. Times are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    LoadStart {
        uri: String,
        media_type: String,
        is_network: bool,
    },
    Load {
        duration: f64,
        current_time: f64,
        width: u32,
        height: u32,
        capabilities: Capabilities,
    },
    Error {
        code: i32,
        extra_code: i32,
    },
    Progress {
        current_time: f64,
        playable_duration: f64,
    },
    /// `previous_time` is the position before the seek, `current_time` and
    /// `seek_time` the clamped target.
    Seek {
        previous_time: f64,
        current_time: f64,
        seek_time: f64,
    },
    End,
}

impl EventKind {
    /// Progress is periodic and superseded by the next tick; every other
    /// event is delivered.
    pub fn is_progress(&self) -> bool {
        matches!(self, EventKind::Progress { .. })
    }

    /// Name under which the host bridge dispatches this event.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::LoadStart { .. } => "onVideoLoadStart",
            EventKind::Load { .. } => "onVideoLoad",
            EventKind::Error { .. } => "onVideoError",
            EventKind::Progress { .. } => "onVideoProgress",
            EventKind::Seek { .. } => "onVideoSeek",
            EventKind::End => "onVideoEnd",
        }
    }
}

/// An event emitted by a player session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvent {
    pub target: SessionId,
    pub kind: EventKind,
}

struct Listener {
    filter: Option<SessionId>,
    tx: Sender<PlayerEvent>,
    // Kept to compact the queue of a lagging subscriber.
    rx: Receiver<PlayerEvent>,
}

impl Listener {
    /// Drops queued progress events, keeping everything else in order. With
    /// `keep_latest` the newest progress survives in its place.
    fn compact(&self, keep_latest: bool) {
        let queued: Vec<_> = self.rx.try_iter().collect();
        let latest = queued
            .iter()
            .rposition(|e| e.kind.is_progress())
            .filter(|_| keep_latest);
        for (index, event) in queued.into_iter().enumerate() {
            if !event.kind.is_progress() || Some(index) == latest {
                let _ = self.tx.send(event);
            }
        }
    }
}

#[derive(Default)]
struct Listeners {
    next_key: u64,
    entries: HashMap<u64, Listener>,
}

/// Fan-out of player events to any number of subscribers.
///
/// Emitting never blocks. Once a subscriber has `capacity` events queued,
/// stale progress events are discarded so at most the newest position is
/// kept; lifecycle events (load, seek, error, end) are never dropped.
#[derive(Clone)]
pub struct EventHub {
    listeners: Arc<Mutex<Listeners>>,
    capacity: usize,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.listeners.lock().entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners::default())),
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to every event, or only to those of `target`.
    pub fn subscribe(&self, target: Option<SessionId>) -> EventSubscription {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut listeners = self.listeners.lock();
        let key = listeners.next_key;
        listeners.next_key += 1;
        listeners.entries.insert(
            key,
            Listener {
                filter: target,
                tx,
                rx: rx.clone(),
            },
        );

        EventSubscription {
            key,
            rx,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn emit(&self, target: &SessionId, kind: EventKind) {
        log::trace!("{} -> {}", kind.name(), target);
        let event = PlayerEvent {
            target: target.clone(),
            kind,
        };

        self.listeners.lock().entries.retain(|key, listener| {
            if listener.filter.as_ref().is_some_and(|f| f != target) {
                return true;
            }
            if listener.tx.len() >= self.capacity {
                log::debug!("subscriber {key} is lagging, discarding queued progress");
                listener.compact(!event.kind.is_progress());
                if event.kind.is_progress() && listener.tx.len() >= self.capacity {
                    log::warn!("subscriber {key} is full, dropped {}", event.kind.name());
                    return true;
                }
            }
            listener.tx.send(event.clone()).is_ok()
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }
}

/// Receiving end of an [`EventHub`] subscription. Dropping it unsubscribes.
pub struct EventSubscription {
    key: u64,
    rx: Receiver<PlayerEvent>,
    listeners: std::sync::Weak<Mutex<Listeners>>,
}

impl EventSubscription {
    pub fn try_recv(&self) -> Option<PlayerEvent> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PlayerEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drains everything queued so far.
    pub fn drain(&self) -> Vec<PlayerEvent> {
        self.rx.try_iter().collect()
    }

    pub fn receiver(&self) -> &Receiver<PlayerEvent> {
        &self.rx
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().entries.remove(&self.key);
        }
    }
}
