//! The embedded Reader control.
//!
//! Wraps a [`ChildRelay`] in the host component lifecycle:
//!
//! - `start(ctx, surface)` - attach the render surface and start relaying
//! - `on_inputs_changed(ctx, name, show_details)` - new input properties
//! - `dispose()` - tear down
//!
//! and exposes the four output fields of [`ReaderOutputs`]. Observers are
//! notified through the callback given at construction whenever outputs
//! change.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::child::{ChildRelay, RelayPhase, RelayUpdate};
use crate::config::ReaderConfig;
use crate::context::{ChildContext, InboundMessage, RetryTimer};

/// Output fields published to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderOutputs {
    /// Value of the configured parameter, or empty.
    pub parameter_value: String,
    /// Every parameter as a JSON object string; `{}` when none.
    pub all_parameters: String,
    /// Whether the control runs inside a frame.
    pub is_in_iframe: bool,
    /// Diagnostic for the app maker; empty when healthy.
    pub error_message: String,
}

/// What the control displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    /// Whether the control runs inside a frame.
    pub is_embedded: bool,
    /// Whether a request is still outstanding.
    pub waiting: bool,
    /// Diagnostic, if any.
    pub error: Option<String>,
    /// Parameters in name order.
    pub parameters: Vec<(String, String)>,
    /// Whether the detail sections are shown at all.
    pub show_details: bool,
}

impl StatusView {
    /// One-line indicator, e.g. `✓ 📄 2 params`.
    pub fn compact_label(&self) -> String {
        let status = if self.error.is_some() { "⚠️" } else { "✓" };
        let frame = if self.is_embedded { " 📄" } else { "" };
        let count = self.parameters.len();
        let plural = if count == 1 { "" } else { "s" };
        format!("{status}{frame} {count} param{plural}")
    }

    /// Embedding status line.
    pub fn status_line(&self) -> &'static str {
        if self.is_embedded {
            "Running in iframe"
        } else {
            "Not in iframe"
        }
    }

    /// Outcome line: the diagnostic, the waiting notice, or success.
    pub fn outcome_line(&self) -> String {
        match (&self.error, self.waiting) {
            (Some(error), _) => format!("Error: {error}"),
            (None, true) => "Waiting for parameters from the parent window".to_string(),
            (None, false) => "✓ Successfully accessed parameters".to_string(),
        }
    }
}

/// Where the control draws its [`StatusView`].
pub trait RenderSurface {
    /// Redraw with `view`.
    fn render(&mut self, view: &StatusView);
}

/// Embedded control reading the top window's parameters.
pub struct TopParamsReader<R> {
    relay: ChildRelay,
    surface: Option<R>,
    parameter_name: String,
    show_details: bool,
    parameter_value: String,
    notify: Box<dyn FnMut()>,
}

impl<R> fmt::Debug for TopParamsReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopParamsReader")
            .field("relay", &self.relay)
            .field("attached", &self.surface.is_some())
            .field("parameter_name", &self.parameter_name)
            .field("show_details", &self.show_details)
            .finish_non_exhaustive()
    }
}

impl<R: RenderSurface> TopParamsReader<R> {
    /// Create a control; `notify` runs whenever outputs change.
    pub fn new(config: ReaderConfig, notify: impl FnMut() + 'static) -> Self {
        Self {
            relay: ChildRelay::new(config),
            surface: None,
            parameter_name: String::new(),
            show_details: true,
            parameter_value: String::new(),
            notify: Box::new(notify),
        }
    }

    /// Attach `surface` and start relaying.
    pub fn start<C: ChildContext>(&mut self, ctx: &mut C, surface: R) {
        self.surface = Some(surface);
        self.relay.start(ctx);
        self.publish();
    }

    /// Apply new input properties and retry the direct read.
    pub fn on_inputs_changed<C: ChildContext>(
        &mut self,
        ctx: &mut C,
        parameter_name: &str,
        show_details: bool,
    ) {
        if self.relay.is_disposed() {
            return;
        }
        self.parameter_name = parameter_name.to_string();
        self.show_details = show_details;
        self.relay.refresh_direct(ctx);
        self.publish();
    }

    /// Route a message event to the relay.
    pub fn handle_message<C: ChildContext>(&mut self, ctx: &mut C, event: &InboundMessage<C::Source>) {
        let update = self.relay.handle_message(ctx, event);
        if update.should_notify() {
            self.publish();
        }
    }

    /// Route a fired retry timer to the relay.
    pub fn on_timer<C: ChildContext>(&mut self, ctx: &mut C, timer: RetryTimer) -> RelayUpdate {
        let update = self.relay.on_timer(ctx, timer);
        if update.should_notify() {
            self.publish();
        }
        update
    }

    /// Tear down; later events are ignored.
    pub fn dispose(&mut self) {
        self.relay.dispose();
        self.surface = None;
    }

    /// Current outputs.
    pub fn outputs(&self) -> ReaderOutputs {
        ReaderOutputs {
            parameter_value: self.parameter_value.clone(),
            all_parameters: self.relay.parameters().to_json(),
            is_in_iframe: self.relay.is_embedded(),
            error_message: self.relay.last_error().unwrap_or_default().to_string(),
        }
    }

    /// Current display state.
    pub fn view(&self) -> StatusView {
        StatusView {
            is_embedded: self.relay.is_embedded(),
            waiting: self.relay.phase() == RelayPhase::AwaitingResponse,
            error: self.relay.last_error().map(str::to_string),
            parameters: self
                .relay
                .parameters()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            show_details: self.show_details,
        }
    }

    /// Underlying relay.
    pub fn relay(&self) -> &ChildRelay {
        &self.relay
    }

    /// Attached render surface, until disposed.
    pub fn surface(&self) -> Option<&R> {
        self.surface.as_ref()
    }

    /// Configured parameter name.
    pub fn parameter_name(&self) -> &str {
        &self.parameter_name
    }

    fn publish(&mut self) {
        if self.relay.is_disposed() {
            return;
        }
        self.parameter_value = if self.parameter_name.is_empty() {
            String::new()
        } else {
            self.relay
                .parameters()
                .get(&self.parameter_name)
                .unwrap_or_default()
                .to_string()
        };

        let view = self.view();
        if let Some(surface) = self.surface.as_mut() {
            surface.render(&view);
        }
        (self.notify)();
    }
}
