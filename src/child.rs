//! Child side of the relay: obtain the top window's parameters.
//!
//! # Protocol
//!
//! ```text
//! Child (embedded frame)                     Parent / Top (listener)
//!   │
//!   │  embedding check, direct read of top.location
//!   │  ── same origin: Resolved(direct), done
//!   │
//!   │  { type: requestUrlParams }             │
//!   │────────────────────────────────────────>│  (parent and top)
//!   │                                         │
//!   │  (t+1s, still waiting: re-send)         │
//!   │  (t+3s, still waiting: re-send)         │
//!   │                                         │
//!   │  { type: urlParams, params }            │
//!   │<────────────────────────────────────────│  Resolved(relayed)
//!   │                                         │
//!   │  (t+5s, still waiting: Abandoned + diagnostic)
//! ```
//!
//! Every timer callback first checks whether the outcome is already known,
//! so late, duplicated or reordered callbacks are harmless. Responses are
//! idempotent full replacements of the parameter set.

use crate::config::ReaderConfig;
use crate::constants::READER_LOG_TARGET as TARGET;
use crate::context::{ChildContext, InboundMessage, RetryTimer, TargetOrigin};
use crate::error::RelayError;
use crate::message::RelayMessage;
use crate::params::ParameterSet;

/// Progress of one relay instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    /// `start` has not run yet.
    Unstarted,
    /// Reading the top window's location.
    AttemptingDirectRead,
    /// Parameters were read directly from the top window.
    ResolvedDirect,
    /// A request is outstanding.
    AwaitingResponse,
    /// Parameters arrived in a response message.
    ResolvedRelayed,
    /// No response arrived before the give-up check.
    Abandoned,
}

impl RelayPhase {
    /// True once parameters have been obtained by either path.
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::ResolvedDirect | Self::ResolvedRelayed)
    }
}

/// What a relay call changed, for the host's output notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayUpdate {
    /// Nothing observable changed.
    Unchanged,
    /// The relay resolved; reported once per resolution.
    Resolved,
    /// An already resolved relay received a replacement set.
    Replaced,
    /// The relay gave up waiting.
    Abandoned,
}

impl RelayUpdate {
    /// Whether observers should be told that outputs changed.
    pub fn should_notify(self) -> bool {
        self != Self::Unchanged
    }
}

/// An outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    /// Host clock reading when the latest attempt was sent.
    pub sent_at_ms: u64,
    /// Requests sent so far, the first one included.
    pub attempt_count: u32,
}

/// Snapshot of the child-side relay state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayState {
    /// Whether the frame is embedded in another window.
    pub is_embedded: bool,
    /// Current parameter set.
    pub parameters: ParameterSet,
    /// Diagnostic shown to the consumer, if any.
    pub last_error: Option<String>,
}

/// Request/response state machine of an embedded frame.
#[derive(Debug)]
pub struct ChildRelay {
    config: ReaderConfig,
    phase: RelayPhase,
    embedded: bool,
    parameters: ParameterSet,
    last_error: Option<String>,
    pending: Option<PendingRequest>,
    requests_sent: u32,
    disposed: bool,
}

impl Default for ChildRelay {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}

impl ChildRelay {
    /// Create an unstarted relay.
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            config,
            phase: RelayPhase::Unstarted,
            embedded: false,
            parameters: ParameterSet::new(),
            last_error: None,
            pending: None,
            requests_sent: 0,
            disposed: false,
        }
    }

    /// Determine embedding, try the direct read, and fall back to the
    /// request path when it is blocked.
    ///
    /// Only the first call on an undisposed relay has any effect.
    pub fn start<C: ChildContext>(&mut self, ctx: &mut C) -> RelayUpdate {
        if self.disposed || self.phase != RelayPhase::Unstarted {
            return RelayUpdate::Unchanged;
        }

        self.embedded = match ctx.is_top_level() {
            Ok(top) => !top,
            Err(e) => {
                log::debug!(target: TARGET, "Embedding check blocked ({e}), assuming embedded");
                true
            }
        };
        log::info!(target: TARGET, "Starting relay (embedded: {})", self.embedded);

        self.phase = RelayPhase::AttemptingDirectRead;
        match ctx.top_search() {
            Ok(search) => {
                self.parameters = ParameterSet::from_search(&search);
                self.phase = RelayPhase::ResolvedDirect;
                log::info!(
                    target: TARGET,
                    "Read {} parameter(s) directly from the top window",
                    self.parameters.len()
                );
                RelayUpdate::Resolved
            }
            Err(e) => {
                log::info!(target: TARGET, "Direct read blocked ({e}), requesting via postMessage");
                self.phase = RelayPhase::AwaitingResponse;
                self.send_request(ctx);
                let retries: Vec<_> = self.config.retry_delays().collect();
                for (index, delay) in retries.into_iter().enumerate() {
                    let attempt = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(2);
                    ctx.schedule_retry(delay, RetryTimer::Resend { attempt });
                }
                ctx.schedule_retry(self.config.give_up_after(), RetryTimer::GiveUp);
                RelayUpdate::Unchanged
            }
        }
    }

    /// Handle a scheduled retry or give-up check.
    pub fn on_timer<C: ChildContext>(&mut self, ctx: &mut C, timer: RetryTimer) -> RelayUpdate {
        if self.disposed || self.phase != RelayPhase::AwaitingResponse {
            return RelayUpdate::Unchanged;
        }

        match timer {
            RetryTimer::Resend { attempt } => {
                log::debug!(target: TARGET, "No parameters yet, sending attempt {attempt}");
                self.send_request(ctx);
                RelayUpdate::Unchanged
            }
            RetryTimer::GiveUp => {
                let error = RelayError::RelayTimeout {
                    attempts: self.requests_sent,
                };
                log::warn!(target: TARGET, "{error}");
                self.last_error = Some(error.to_string());
                self.pending = None;
                self.phase = RelayPhase::Abandoned;
                RelayUpdate::Abandoned
            }
        }
    }

    /// Handle a message event delivered to this frame.
    ///
    /// Responses replace the parameter set. Requests are answered with this
    /// frame's own page parameters. Anything else is ignored.
    pub fn handle_message<C: ChildContext>(
        &mut self,
        ctx: &mut C,
        event: &InboundMessage<C::Source>,
    ) -> RelayUpdate {
        if self.disposed {
            return RelayUpdate::Unchanged;
        }

        let message = match RelayMessage::parse(&event.data) {
            Ok(message) => message,
            Err(e) => {
                log::trace!(target: TARGET, "Ignoring message: {e}");
                return RelayUpdate::Unchanged;
            }
        };

        match message {
            RelayMessage::UrlParams { params } => self.accept_response(params, event.origin.as_deref()),
            RelayMessage::RequestUrlParams { source } => {
                log::debug!(
                    target: TARGET,
                    "Answering parameter request from {}",
                    source.as_deref().unwrap_or("unknown requester")
                );
                let Some(reply_to) = event.source.as_ref() else {
                    log::debug!(target: TARGET, "Request has no source window, not answering");
                    return RelayUpdate::Unchanged;
                };
                let response = RelayMessage::response(ParameterSet::from_search(&ctx.own_search()));
                let target = TargetOrigin::from_event_origin(event.origin.as_deref());
                if let Err(e) = ctx.reply(reply_to, &response, &target) {
                    log::warn!(target: TARGET, "Could not answer parameter request: {e}");
                }
                RelayUpdate::Unchanged
            }
        }
    }

    /// Try the direct read again, e.g. after the host's inputs changed.
    ///
    /// A blocked read leaves the state untouched.
    pub fn refresh_direct<C: ChildContext>(&mut self, ctx: &mut C) -> RelayUpdate {
        if self.disposed || self.phase == RelayPhase::Unstarted {
            return RelayUpdate::Unchanged;
        }

        let Ok(search) = ctx.top_search() else {
            return RelayUpdate::Unchanged;
        };
        let params = ParameterSet::from_search(&search);
        let was_resolved = self.phase.is_resolved();
        let changed = params != self.parameters || self.last_error.is_some();

        self.parameters = params;
        self.last_error = None;
        self.pending = None;
        self.phase = RelayPhase::ResolvedDirect;

        if !was_resolved {
            RelayUpdate::Resolved
        } else if changed {
            RelayUpdate::Replaced
        } else {
            RelayUpdate::Unchanged
        }
    }

    /// Tear down. Every later call becomes a no-op.
    pub fn dispose(&mut self) {
        if !self.disposed {
            log::info!(target: TARGET, "Relay disposed");
        }
        self.disposed = true;
        self.pending = None;
    }

    fn accept_response(&mut self, params: ParameterSet, origin: Option<&str>) -> RelayUpdate {
        log::debug!(
            target: TARGET,
            "Received {} parameter(s) from {}",
            params.len(),
            origin.unwrap_or("unknown origin")
        );
        let changed = params != self.parameters;
        self.parameters = params;
        self.last_error = None;
        self.pending = None;

        if self.phase.is_resolved() {
            if changed {
                RelayUpdate::Replaced
            } else {
                RelayUpdate::Unchanged
            }
        } else {
            self.phase = RelayPhase::ResolvedRelayed;
            RelayUpdate::Resolved
        }
    }

    fn send_request<C: ChildContext>(&mut self, ctx: &mut C) {
        let message = RelayMessage::request_from(self.config.source_tag.clone());
        let mut delivered = 0usize;
        for ancestor in ctx.distinct_ancestors() {
            match ctx.post_to_ancestor(ancestor, &message) {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!(target: TARGET, "Request to {ancestor:?} failed: {e}"),
            }
        }

        self.requests_sent = self.requests_sent.saturating_add(1);
        self.pending = Some(PendingRequest {
            sent_at_ms: ctx.now_millis(),
            attempt_count: self.requests_sent,
        });
        log::debug!(
            target: TARGET,
            "Sent {} to {delivered} ancestor window(s)",
            message.kind()
        );
    }

    /// Current phase.
    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    /// Whether the frame is embedded.
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    /// Current parameter set.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Diagnostic for the consumer, set only after giving up.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Outstanding request, if waiting.
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Number of request rounds sent so far.
    pub fn requests_sent(&self) -> u32 {
        self.requests_sent
    }

    /// Whether `dispose` ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Snapshot of the externally visible state.
    pub fn state(&self) -> RelayState {
        RelayState {
            is_embedded: self.embedded,
            parameters: self.parameters.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Ancestor, PageContext};
    use crate::error::Result;
    use serde_json::json;
    use std::time::Duration;

    /// Scripted child window.
    #[derive(Default)]
    struct FakeChild {
        top_level: Option<bool>,
        top_search: Option<String>,
        own_search: String,
        ancestors: Vec<Ancestor>,
        failing_ancestor: Option<Ancestor>,
        posted: Vec<(Ancestor, RelayMessage)>,
        replies: Vec<(u32, RelayMessage, TargetOrigin)>,
        scheduled: Vec<(Duration, RetryTimer)>,
        now: u64,
    }

    impl FakeChild {
        fn cross_origin() -> Self {
            Self {
                top_level: None,
                top_search: None,
                ancestors: vec![Ancestor::Parent, Ancestor::Top],
                ..Self::default()
            }
        }

        fn requests_posted(&self) -> usize {
            self.posted
                .iter()
                .filter(|(_, m)| matches!(m, RelayMessage::RequestUrlParams { .. }))
                .count()
        }
    }

    impl PageContext for FakeChild {
        type Source = u32;

        fn own_search(&self) -> String {
            self.own_search.clone()
        }

        fn now_millis(&self) -> u64 {
            self.now
        }

        fn reply(&mut self, source: &u32, message: &RelayMessage, target: &TargetOrigin) -> Result<()> {
            self.replies.push((*source, message.clone(), target.clone()));
            Ok(())
        }
    }

    impl ChildContext for FakeChild {
        fn is_top_level(&self) -> Result<bool> {
            self.top_level.ok_or_else(|| RelayError::access("SecurityError"))
        }

        fn top_search(&self) -> Result<String> {
            self.top_search
                .clone()
                .ok_or_else(|| RelayError::access("SecurityError"))
        }

        fn distinct_ancestors(&self) -> Vec<Ancestor> {
            self.ancestors.clone()
        }

        fn post_to_ancestor(&mut self, ancestor: Ancestor, message: &RelayMessage) -> Result<()> {
            if self.failing_ancestor == Some(ancestor) {
                return Err(RelayError::delivery("detached"));
            }
            self.posted.push((ancestor, message.clone()));
            Ok(())
        }

        fn schedule_retry(&mut self, delay: Duration, timer: RetryTimer) {
            self.scheduled.push((delay, timer));
        }
    }

    fn response(params: serde_json::Value) -> InboundMessage<u32> {
        InboundMessage::new(json!({ "type": "urlParams", "params": params }))
    }

    #[test]
    fn test_direct_read_resolves_without_retries() {
        let mut ctx = FakeChild {
            top_level: Some(false),
            top_search: Some("?a=1".to_string()),
            ancestors: vec![Ancestor::Parent],
            ..FakeChild::default()
        };
        let mut relay = ChildRelay::default();

        assert_eq!(relay.start(&mut ctx), RelayUpdate::Resolved);
        assert_eq!(relay.phase(), RelayPhase::ResolvedDirect);
        assert!(relay.is_embedded());
        assert_eq!(relay.parameters().get("a"), Some("1"));
        assert!(ctx.posted.is_empty());
        assert!(ctx.scheduled.is_empty());
    }

    #[test]
    fn test_top_level_window_is_not_embedded() {
        let mut ctx = FakeChild {
            top_level: Some(true),
            top_search: Some(String::new()),
            ..FakeChild::default()
        };
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);
        assert!(!relay.is_embedded());
        assert_eq!(relay.phase(), RelayPhase::ResolvedDirect);
    }

    #[test]
    fn test_embedding_access_fault_means_embedded() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);
        assert!(relay.is_embedded());
        assert!(relay.state().is_embedded);
    }

    #[test]
    fn test_blocked_read_requests_parent_and_top() {
        let mut ctx = FakeChild::cross_origin();
        ctx.now = 42;
        let mut relay = ChildRelay::default();

        assert_eq!(relay.start(&mut ctx), RelayUpdate::Unchanged);
        assert_eq!(relay.phase(), RelayPhase::AwaitingResponse);
        assert_eq!(
            ctx.posted.iter().map(|(a, _)| *a).collect::<Vec<_>>(),
            vec![Ancestor::Parent, Ancestor::Top]
        );
        assert_eq!(
            ctx.posted[0].1,
            RelayMessage::request_from("TopParamsReader")
        );
        assert_eq!(
            relay.pending(),
            Some(&PendingRequest {
                sent_at_ms: 42,
                attempt_count: 1
            })
        );
        assert_eq!(
            ctx.scheduled,
            vec![
                (Duration::from_secs(1), RetryTimer::Resend { attempt: 2 }),
                (Duration::from_secs(3), RetryTimer::Resend { attempt: 3 }),
                (Duration::from_secs(5), RetryTimer::GiveUp),
            ]
        );
        assert_eq!(relay.last_error(), None);
    }

    #[test]
    fn test_bounded_retries_then_abandoned() {
        let mut ctx = FakeChild::cross_origin();
        ctx.ancestors = vec![Ancestor::Parent];
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);

        let timers: Vec<_> = ctx.scheduled.iter().map(|(_, t)| *t).collect();
        let mut updates = Vec::new();
        for timer in timers {
            updates.push(relay.on_timer(&mut ctx, timer));
        }

        // One initial request plus exactly two re-sends.
        assert_eq!(ctx.requests_posted(), 3);
        assert_eq!(relay.requests_sent(), 3);
        assert_eq!(
            updates,
            vec![
                RelayUpdate::Unchanged,
                RelayUpdate::Unchanged,
                RelayUpdate::Abandoned
            ]
        );
        assert_eq!(relay.phase(), RelayPhase::Abandoned);
        assert!(relay.last_error().is_some_and(|e| !e.is_empty()));
        assert!(relay.parameters().is_empty());
        assert!(relay.pending().is_none());
    }

    #[test]
    fn test_resends_reach_every_distinct_ancestor() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);

        relay.on_timer(&mut ctx, RetryTimer::Resend { attempt: 2 });
        relay.on_timer(&mut ctx, RetryTimer::Resend { attempt: 3 });

        assert_eq!(
            ctx.posted.iter().map(|(a, _)| *a).collect::<Vec<_>>(),
            vec![
                Ancestor::Parent,
                Ancestor::Top,
                Ancestor::Parent,
                Ancestor::Top,
                Ancestor::Parent,
                Ancestor::Top,
            ]
        );
        assert_eq!(ctx.requests_posted(), 6);
        assert_eq!(relay.requests_sent(), 3);
    }

    #[test]
    fn test_no_retry_after_resolution() {
        let mut ctx = FakeChild::cross_origin();
        ctx.ancestors = vec![Ancestor::Parent];
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);

        let update = relay.handle_message(&mut ctx, &response(json!({ "a": "1" })));
        assert_eq!(update, RelayUpdate::Resolved);

        let timers: Vec<_> = ctx.scheduled.iter().map(|(_, t)| *t).collect();
        for timer in timers {
            assert_eq!(relay.on_timer(&mut ctx, timer), RelayUpdate::Unchanged);
        }
        assert_eq!(ctx.requests_posted(), 1);
        assert_eq!(relay.phase(), RelayPhase::ResolvedRelayed);
        assert_eq!(relay.last_error(), None);
    }

    #[test]
    fn test_empty_response_still_resolves() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);

        assert_eq!(
            relay.handle_message(&mut ctx, &response(json!({}))),
            RelayUpdate::Resolved
        );
        assert_eq!(
            relay.on_timer(&mut ctx, RetryTimer::Resend { attempt: 2 }),
            RelayUpdate::Unchanged
        );
        assert_eq!(ctx.requests_posted(), 2);
    }

    #[test]
    fn test_last_response_wins() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);

        let updates: Vec<_> = [
            json!({ "a": "1", "b": "2" }),
            json!({ "c": "3" }),
            json!({ "a": "9" }),
        ]
        .into_iter()
        .map(|params| relay.handle_message(&mut ctx, &response(params)))
        .collect();

        assert_eq!(
            updates,
            vec![
                RelayUpdate::Resolved,
                RelayUpdate::Replaced,
                RelayUpdate::Replaced
            ]
        );
        let expected: ParameterSet = [("a", "9")].into_iter().collect();
        assert_eq!(relay.parameters(), &expected);
    }

    #[test]
    fn test_identical_late_response_is_unchanged() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);

        let params = json!({ "a": "1", "b": "2" });
        assert_eq!(
            relay.handle_message(&mut ctx, &response(params.clone())),
            RelayUpdate::Resolved
        );
        assert_eq!(
            relay.handle_message(&mut ctx, &response(params)),
            RelayUpdate::Unchanged
        );
        assert_eq!(
            relay.handle_message(&mut ctx, &response(json!({ "a": "1" }))),
            RelayUpdate::Replaced
        );
        assert_eq!(relay.parameters().get("b"), None);
    }

    #[test]
    fn test_late_response_after_abandon_resolves_and_clears_error() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);
        relay.on_timer(&mut ctx, RetryTimer::GiveUp);
        assert!(relay.last_error().is_some());

        let update = relay.handle_message(&mut ctx, &response(json!({ "x": "1" })));
        assert_eq!(update, RelayUpdate::Resolved);
        assert_eq!(relay.phase(), RelayPhase::ResolvedRelayed);
        assert_eq!(relay.last_error(), None);
    }

    #[test]
    fn test_malformed_messages_ignored() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);
        let before = relay.state();

        for data in [
            json!({ "foo": "bar" }),
            serde_json::Value::Null,
            json!({ "type": "urlParams", "params": "a=1" }),
        ] {
            let update = relay.handle_message(&mut ctx, &InboundMessage::new(data));
            assert_eq!(update, RelayUpdate::Unchanged);
        }
        assert_eq!(relay.state(), before);
        assert_eq!(relay.phase(), RelayPhase::AwaitingResponse);
        assert!(ctx.replies.is_empty());
    }

    #[test]
    fn test_answers_requests_with_own_parameters() {
        let mut ctx = FakeChild {
            top_level: Some(true),
            top_search: Some("?own=1".to_string()),
            own_search: "?own=1".to_string(),
            ..FakeChild::default()
        };
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);

        let request = InboundMessage::new(json!({ "type": "requestUrlParams", "source": "x" }))
            .with_origin("https://child.example")
            .with_source(5);
        assert_eq!(relay.handle_message(&mut ctx, &request), RelayUpdate::Unchanged);

        assert_eq!(
            ctx.replies,
            vec![(
                5,
                RelayMessage::response([("own", "1")].into_iter().collect()),
                TargetOrigin::Exact("https://child.example".to_string())
            )]
        );
    }

    #[test]
    fn test_request_without_source_is_not_answered() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);
        relay.handle_message(
            &mut ctx,
            &InboundMessage::new(json!({ "type": "requestUrlParams" })),
        );
        assert!(ctx.replies.is_empty());
    }

    #[test]
    fn test_delivery_fault_to_one_ancestor_is_isolated() {
        let mut ctx = FakeChild::cross_origin();
        ctx.failing_ancestor = Some(Ancestor::Parent);
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);

        assert_eq!(ctx.posted.len(), 1);
        assert_eq!(ctx.posted[0].0, Ancestor::Top);
        assert_eq!(relay.phase(), RelayPhase::AwaitingResponse);
    }

    #[test]
    fn test_dispose_makes_everything_a_no_op() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);
        relay.dispose();

        assert_eq!(
            relay.on_timer(&mut ctx, RetryTimer::Resend { attempt: 2 }),
            RelayUpdate::Unchanged
        );
        assert_eq!(relay.on_timer(&mut ctx, RetryTimer::GiveUp), RelayUpdate::Unchanged);
        assert_eq!(
            relay.handle_message(&mut ctx, &response(json!({ "a": "1" }))),
            RelayUpdate::Unchanged
        );
        assert_eq!(ctx.requests_posted(), 2);
        assert!(relay.parameters().is_empty());
        assert!(relay.last_error().is_none());
        assert!(relay.is_disposed());
    }

    #[test]
    fn test_start_is_once_only() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);
        relay.start(&mut ctx);
        assert_eq!(relay.requests_sent(), 1);
        assert_eq!(ctx.requests_posted(), 2);
        assert_eq!(ctx.scheduled.len(), 3);
    }

    #[test]
    fn test_refresh_direct_after_origin_becomes_readable() {
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::default();
        relay.start(&mut ctx);

        assert_eq!(relay.refresh_direct(&mut ctx), RelayUpdate::Unchanged);

        ctx.top_search = Some("?late=yes".to_string());
        assert_eq!(relay.refresh_direct(&mut ctx), RelayUpdate::Resolved);
        assert_eq!(relay.phase(), RelayPhase::ResolvedDirect);
        assert_eq!(relay.refresh_direct(&mut ctx), RelayUpdate::Unchanged);

        ctx.top_search = Some("?late=no".to_string());
        assert_eq!(relay.refresh_direct(&mut ctx), RelayUpdate::Replaced);
        assert_eq!(relay.parameters().get("late"), Some("no"));
    }

    #[test]
    fn test_custom_retry_schedule() {
        let config = ReaderConfig {
            retry_delays_ms: vec![200],
            give_up_after_ms: 400,
            source_tag: "Custom".to_string(),
        };
        let mut ctx = FakeChild::cross_origin();
        let mut relay = ChildRelay::new(config);
        relay.start(&mut ctx);

        assert_eq!(
            ctx.scheduled,
            vec![
                (Duration::from_millis(200), RetryTimer::Resend { attempt: 2 }),
                (Duration::from_millis(400), RetryTimer::GiveUp),
            ]
        );
        assert_eq!(ctx.posted[0].1, RelayMessage::request_from("Custom"));
    }
}
