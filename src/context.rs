//! Host seams of the relay.
//!
//! The relay core never touches a browser directly. Each role is driven by
//! a context that performs the window operations it needs and schedules
//! timers that the host later feeds back through `on_timer`:
//!
//! ```text
//! PageContext (own location, clock, replying to a message source)
//!     │
//!     ├── ChildContext   (embedding check, top location, ancestors, retry timers)
//!     │
//!     └── ParentContext  (frame tree, per-frame delivery, broadcast timers)
//! ```
//!
//! Implementations: `sim::Browser` for tests and the CLI, and the
//! `top-params-wasm` crate for real windows.

use std::time::Duration;

use serde_json::Value;

use crate::constants::ANY_ORIGIN;
use crate::error::Result;
use crate::message::RelayMessage;

/// Ancestor window a request can be posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ancestor {
    /// The immediate parent window.
    Parent,
    /// The top-level window.
    Top,
}

/// Origin a posted message is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// Deliver regardless of the receiver's origin (`*`).
    Any,
    /// Deliver only when the receiver has exactly this origin.
    Exact(String),
}

impl TargetOrigin {
    /// Target the origin reported by a message event.
    ///
    /// Unknown, empty and opaque (`"null"`) origins cannot be targeted and
    /// fall back to [`TargetOrigin::Any`].
    pub fn from_event_origin(origin: Option<&str>) -> Self {
        match origin {
            Some(origin) if !origin.is_empty() && origin != "null" => {
                Self::Exact(origin.to_string())
            }
            _ => Self::Any,
        }
    }

    /// String form passed to `postMessage`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Any => ANY_ORIGIN,
            Self::Exact(origin) => origin,
        }
    }
}

/// A message event as delivered by the host.
#[derive(Debug, Clone)]
pub struct InboundMessage<S> {
    /// Structured payload, not yet validated.
    pub data: Value,
    /// Origin of the sending window, when known.
    pub origin: Option<String>,
    /// Handle used to reply to the sender, when known.
    pub source: Option<S>,
}

impl<S> InboundMessage<S> {
    /// Event with data only.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            origin: None,
            source: None,
        }
    }

    /// Attach the sender's origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Attach the reply handle.
    pub fn with_source(mut self, source: S) -> Self {
        self.source = Some(source);
        self
    }
}

/// Timer identities scheduled by the Reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryTimer {
    /// Send the request again; `attempt` counts the first request as 1.
    Resend {
        /// Attempt number of the re-send.
        attempt: u32,
    },
    /// Stop waiting for a response.
    GiveUp,
}

/// Timer identities scheduled by the Listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastTimer {
    /// One of the broadcasts scheduled at load.
    Initial {
        /// Position in the load schedule.
        index: usize,
    },
    /// Debounced broadcast after frame insertion.
    FrameInserted,
}

/// Operations available in every frame.
pub trait PageContext {
    /// Reply handle of a message sender.
    type Source;

    /// Search string (`?a=1`) of this frame's own location.
    fn own_search(&self) -> String;

    /// Milliseconds on a monotonic host clock.
    fn now_millis(&self) -> u64;

    /// Post `message` back to the sender of an earlier message.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RelayError::DeliveryFault`] when the sender can no
    /// longer be reached.
    fn reply(&mut self, source: &Self::Source, message: &RelayMessage, target: &TargetOrigin)
        -> Result<()>;
}

/// Operations of an embedded frame running the Reader.
pub trait ChildContext: PageContext {
    /// Whether this frame is the top-level window.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RelayError::AccessFault`] when the comparison is
    /// blocked.
    fn is_top_level(&self) -> Result<bool>;

    /// Search string of the top-level window's location.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RelayError::AccessFault`] when the top window is
    /// cross-origin.
    fn top_search(&self) -> Result<String>;

    /// Ancestors that are distinct windows: `Parent` when the parent is not
    /// this frame, `Top` when the top window is neither this frame nor the
    /// parent.
    fn distinct_ancestors(&self) -> Vec<Ancestor>;

    /// Post `message` to an ancestor with an open target origin.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RelayError::DeliveryFault`] when posting fails.
    fn post_to_ancestor(&mut self, ancestor: Ancestor, message: &RelayMessage) -> Result<()>;

    /// Call `ChildRelay::on_timer` with `timer` after `delay`.
    fn schedule_retry(&mut self, delay: Duration, timer: RetryTimer);
}

/// Operations of the host page running the Listener.
pub trait ParentContext: PageContext {
    /// Handle of an embedded frame element.
    type Frame;

    /// Frames embedded directly in this page's document.
    fn top_level_frames(&self) -> Vec<Self::Frame>;

    /// Frames embedded in `frame`'s own document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RelayError::AccessFault`] when `frame`'s document
    /// is cross-origin.
    fn nested_frames(&self, frame: &Self::Frame) -> Result<Vec<Self::Frame>>;

    /// Post `message` to `frame`'s content window with an open target.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RelayError::DeliveryFault`] when the frame has no
    /// content window or posting throws.
    fn post_to_frame(&mut self, frame: &Self::Frame, message: &RelayMessage) -> Result<()>;

    /// Call `TopParamsListener::on_timer` with `timer` after `delay`.
    fn schedule_broadcast(&mut self, delay: Duration, timer: BroadcastTimer);
}
