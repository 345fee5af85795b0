//! Protocol-wide constants for the parameter relay.
//!
//! This module centralizes the wire vocabulary, timing defaults and
//! traversal bounds so the Reader, the Listener and the browser bindings
//! agree on them.
//!
//! # Categories
//!
//! - **Wire**: message discriminators and the request source tag
//! - **Reader timing**: retry and give-up delays
//! - **Listener timing**: broadcast schedule and insertion debounce
//! - **Discovery**: nested frame traversal bound

use std::time::Duration;

// ============================================================================
// Wire
// ============================================================================

/// Discriminator of a parameter request message.
pub const REQUEST_TYPE: &str = "requestUrlParams";

/// Discriminator of a parameter response message.
pub const RESPONSE_TYPE: &str = "urlParams";

/// Source tag placed in every request sent by the Reader.
pub const REQUEST_SOURCE_TAG: &str = "TopParamsReader";

/// Target origin meaning "any receiver".
pub const ANY_ORIGIN: &str = "*";

// ============================================================================
// Reader timing
// ============================================================================

/// Delays, measured from the first request, at which an unanswered
/// request is sent again.
///
/// Exactly two re-sends are made.
pub const RETRY_DELAYS: [Duration; 2] = [Duration::from_millis(1000), Duration::from_millis(3000)];

/// Delay after the first request at which the Reader stops waiting and
/// reports that no parent answered.
pub const GIVE_UP_DELAY: Duration = Duration::from_millis(5000);

// ============================================================================
// Listener timing
// ============================================================================

/// Broadcast schedule of the page-customizer extension after load.
///
/// Nested frames often finish loading well after the host page, so the
/// parameters are pushed three times.
pub const EXTENSION_BROADCAST_DELAYS: [Duration; 3] = [
    Duration::from_millis(1000),
    Duration::from_millis(3000),
    Duration::from_millis(5000),
];

/// Broadcast schedule of the drop-in page script after load.
pub const SNIPPET_BROADCAST_DELAYS: [Duration; 1] = [Duration::from_millis(500)];

/// Delay between detecting an inserted frame and broadcasting to it.
pub const INSERTION_DEBOUNCE: Duration = Duration::from_millis(500);

// ============================================================================
// Discovery
// ============================================================================

/// Maximum number of frame levels visited by nested discovery.
pub const MAX_DISCOVERY_DEPTH: usize = 10;

/// Node name reported by the DOM for iframe elements.
pub const FRAME_NODE_NAME: &str = "IFRAME";

// ============================================================================
// Log targets
// ============================================================================

/// Log target of the Reader side.
pub const READER_LOG_TARGET: &str = "top_params::reader";

/// Log target of the Listener side.
pub const LISTENER_LOG_TARGET: &str = "top_params::listener";
