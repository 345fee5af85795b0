//! Parent side of the relay: answer requests and broadcast parameters.
//!
//! The Listener runs in the host page. It answers every
//! `requestUrlParams` message with the page's parameters, and pushes them
//! unasked to every reachable frame:
//!
//! - on a schedule after load (frames may still be loading),
//! - when the page goes from hidden to visible (restored from cache),
//! - shortly after a new frame element is inserted.
//!
//! Each broadcast rebuilds the frame registry and posts to every frame
//! independently; one failing frame never stops the others, and one
//! failing broadcast never stops later triggers.

use std::fmt;

use crate::config::ListenerConfig;
use crate::constants::{FRAME_NODE_NAME, LISTENER_LOG_TARGET as TARGET};
use crate::context::{BroadcastTimer, InboundMessage, ParentContext, TargetOrigin};
use crate::discovery::discover_frames;
use crate::error::{RelayError, Result};
use crate::message::RelayMessage;
use crate::params::ParameterSet;

/// Why a broadcast ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastTrigger {
    /// Scheduled after load; `index` is the position in the schedule.
    Initial {
        /// Position in the load schedule.
        index: usize,
    },
    /// The page became visible.
    Visible,
    /// A frame element was inserted.
    FrameInserted,
    /// Requested by the host.
    Manual,
}

impl fmt::Display for BroadcastTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial { index } => write!(f, "load broadcast #{}", index + 1),
            Self::Visible => write!(f, "visibility broadcast"),
            Self::FrameInserted => write!(f, "frame insertion broadcast"),
            Self::Manual => write!(f, "manual broadcast"),
        }
    }
}

/// Outcome of one broadcast, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// What caused the broadcast.
    pub trigger: BroadcastTrigger,
    /// Frames found by discovery.
    pub discovered: usize,
    /// Frames the message was posted to.
    pub delivered: usize,
    /// Frames posting failed for.
    pub failed: usize,
    /// Whether discovery stopped at the depth bound.
    pub truncated: bool,
}

/// Host-page listener state.
#[derive(Debug)]
pub struct TopParamsListener {
    config: ListenerConfig,
    initialized: bool,
    disposed: bool,
    insertion_pending: bool,
    requests_answered: u64,
    last_report: Option<BroadcastReport>,
}

impl Default for TopParamsListener {
    fn default() -> Self {
        Self::new(ListenerConfig::default())
    }
}

impl TopParamsListener {
    /// Create a listener that has not been initialized yet.
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            initialized: false,
            disposed: false,
            insertion_pending: false,
            requests_answered: 0,
            last_report: None,
        }
    }

    /// Verbose traffic log, gated by `enableLogging`.
    fn trace(&self, args: fmt::Arguments<'_>) {
        if self.config.enable_logging {
            log::info!(target: TARGET, "{args}");
        }
    }

    /// Initialize: schedule the load broadcasts.
    ///
    /// The host attaches its message, visibility and mutation subscriptions
    /// around this call and routes them to the other handlers.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Disposed`] after [`Self::on_dispose`].
    pub fn on_init<C: ParentContext>(&mut self, ctx: &mut C) -> Result<()> {
        if self.disposed {
            return Err(RelayError::Disposed);
        }
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;

        let params = ParameterSet::from_search(&ctx.own_search());
        log::info!(
            target: TARGET,
            "Listener initialized ({:?} profile, {} page parameter(s))",
            self.config.profile,
            params.len()
        );

        for (index, delay) in self.config.broadcast_delays().into_iter().enumerate() {
            ctx.schedule_broadcast(delay, BroadcastTimer::Initial { index });
        }
        Ok(())
    }

    /// Answer a parameter request; ignore everything else.
    ///
    /// Returns true when a response was sent.
    pub fn handle_message<C: ParentContext>(
        &mut self,
        ctx: &mut C,
        event: &InboundMessage<C::Source>,
    ) -> bool {
        if self.disposed {
            return false;
        }

        match RelayMessage::parse(&event.data) {
            Ok(RelayMessage::RequestUrlParams { source }) => {
                self.trace(format_args!(
                    "Received request for URL params from {} ({})",
                    event.origin.as_deref().unwrap_or("unknown origin"),
                    source.as_deref().unwrap_or("untagged")
                ));
                let Some(reply_to) = event.source.as_ref() else {
                    self.trace(format_args!("Request has no source window, not answering"));
                    return false;
                };

                let params = ParameterSet::from_search(&ctx.own_search());
                let target = TargetOrigin::from_event_origin(event.origin.as_deref());
                match ctx.reply(reply_to, &RelayMessage::response(params), &target) {
                    Ok(()) => {
                        self.requests_answered += 1;
                        self.trace(format_args!("URL params sent to {}", target.as_str()));
                        true
                    }
                    Err(e) => {
                        log::warn!(target: TARGET, "Error sending params: {e}");
                        false
                    }
                }
            }
            // Responses are consumed by readers, not listeners.
            Ok(RelayMessage::UrlParams { .. }) => false,
            Err(e) => {
                log::trace!(target: TARGET, "Ignoring message: {e}");
                false
            }
        }
    }

    /// Handle a scheduled broadcast.
    pub fn on_timer<C: ParentContext>(
        &mut self,
        ctx: &mut C,
        timer: BroadcastTimer,
    ) -> Option<BroadcastReport> {
        if self.disposed {
            return None;
        }
        let trigger = match timer {
            BroadcastTimer::Initial { index } => BroadcastTrigger::Initial { index },
            BroadcastTimer::FrameInserted => {
                self.insertion_pending = false;
                BroadcastTrigger::FrameInserted
            }
        };
        Some(self.broadcast(ctx, trigger))
    }

    /// Handle a `visibilitychange` event.
    ///
    /// Browsers fire it on every hidden/visible transition, so each event
    /// reporting a visible page is a return to visibility.
    pub fn on_visibility_change<C: ParentContext>(
        &mut self,
        ctx: &mut C,
        hidden: bool,
    ) -> Option<BroadcastReport> {
        if self.disposed {
            return None;
        }
        if hidden || !self.config.rebroadcasts_on_visible() {
            return None;
        }
        self.trace(format_args!("Page became visible, broadcasting params"));
        Some(self.broadcast(ctx, BroadcastTrigger::Visible))
    }

    /// Handle nodes inserted anywhere below the page body.
    ///
    /// When one of them is a frame, a broadcast is scheduled after the
    /// insertion debounce; further insertions before it fires share it.
    /// Returns true when a broadcast was scheduled.
    pub fn on_nodes_inserted<C, I, S>(&mut self, ctx: &mut C, node_names: I) -> bool
    where
        C: ParentContext,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.disposed || !self.config.watches_insertions() {
            return false;
        }
        let frame_added = node_names
            .into_iter()
            .any(|name| name.as_ref().eq_ignore_ascii_case(FRAME_NODE_NAME));
        if !frame_added {
            return false;
        }
        if self.insertion_pending {
            self.trace(format_args!("New iframe detected, broadcast already pending"));
            return false;
        }

        self.trace(format_args!("New iframe detected, broadcasting params"));
        self.insertion_pending = true;
        ctx.schedule_broadcast(self.config.insertion_debounce(), BroadcastTimer::FrameInserted);
        true
    }

    /// Post the page's parameters to every reachable frame.
    pub fn broadcast<C: ParentContext>(
        &mut self,
        ctx: &mut C,
        trigger: BroadcastTrigger,
    ) -> BroadcastReport {
        let params = ParameterSet::from_search(&ctx.own_search());
        self.trace(format_args!(
            "{trigger}: broadcasting {} param(s) to all frames (including nested)",
            params.len()
        ));

        let registry = discover_frames(ctx, self.config.discovery_depth());
        let total = registry.len();
        self.trace(format_args!("Found {total} total frame(s) including nested"));

        let message = RelayMessage::response(params);
        let mut delivered = 0;
        let mut failed = 0;
        for (index, entry) in registry.frames.iter().enumerate() {
            match ctx.post_to_frame(&entry.frame, &message) {
                Ok(()) => {
                    delivered += 1;
                    self.trace(format_args!("Sent to frame {}/{total}", index + 1));
                }
                Err(e) => {
                    failed += 1;
                    self.trace(format_args!("Could not send to frame {}: {e}", index + 1));
                }
            }
        }
        self.trace(format_args!("Successfully sent params to {delivered}/{total} frames"));

        let report = BroadcastReport {
            trigger,
            discovered: total,
            delivered,
            failed,
            truncated: registry.truncated,
        };
        self.last_report = Some(report.clone());
        report
    }

    /// Tear down. Every later call becomes a no-op.
    pub fn on_dispose(&mut self) {
        if !self.disposed {
            log::info!(target: TARGET, "Listener disposed");
        }
        self.disposed = true;
        self.insertion_pending = false;
    }

    /// Active configuration.
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Whether `on_init` ran.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether `on_dispose` ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Requests answered so far.
    pub fn requests_answered(&self) -> u64 {
        self.requests_answered
    }

    /// Report of the most recent broadcast.
    pub fn last_report(&self) -> Option<&BroadcastReport> {
        self.last_report.as_ref()
    }
}
