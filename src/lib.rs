//! TopParams - URL parameters of a host page, relayed into embedded frames.
//!
//! An embedded app often needs the query parameters of the page it is
//! embedded in, but the browser blocks reading a cross-origin top window's
//! location. This crate implements both ends of a small `postMessage`
//! protocol that carries the parameters across:
//!
//! - **Reader** ([`TopParamsReader`]) - runs inside the frame, reads the
//!   top location directly when allowed and otherwise requests the
//!   parameters from its ancestors, retrying a bounded number of times
//! - **Listener** ([`TopParamsListener`]) - runs in the host page, answers
//!   requests and broadcasts the parameters to every reachable frame
//!
//! # Architecture
//!
//! The protocol core does no I/O. Each role is driven through a context
//! trait ([`ChildContext`], [`ParentContext`]) that the host implements,
//! and timers are scheduled through the context and fed back by the host.
//!
//! # Modules
//!
//! - [`params`] - the relayed key/value set
//! - [`message`] - wire messages
//! - [`child`] - request/retry state machine of the frame
//! - [`listener`] - request answering and broadcasting in the host page
//! - [`discovery`] - bounded nested frame traversal
//! - [`reader`] - the embedded control and its outputs
//! - [`sim`] - deterministic in-memory browser

pub mod child;
pub mod config;
pub mod constants;
pub mod context;
pub mod discovery;
pub mod error;
pub mod listener;
pub mod message;
pub mod params;
pub mod reader;
pub mod sim;

// Re-export commonly used types
pub use child::{ChildRelay, RelayPhase, RelayState, RelayUpdate};
pub use config::{ListenerConfig, ListenerProfile, ReaderConfig};
pub use context::{
    Ancestor, BroadcastTimer, ChildContext, InboundMessage, PageContext, ParentContext, RetryTimer,
    TargetOrigin,
};
pub use error::{RelayError, Result};
pub use listener::{BroadcastReport, BroadcastTrigger, TopParamsListener};
pub use message::RelayMessage;
pub use params::ParameterSet;
pub use reader::{ReaderOutputs, RenderSurface, StatusView, TopParamsReader};
