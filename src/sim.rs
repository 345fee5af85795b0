//! Deterministic in-memory browser.
//!
//! Hosts Readers and Listeners in a tree of windows with per-window
//! origins, a virtual clock, a timer queue and a message queue. Same-origin
//! rules are applied the way browsers apply them: a frame may read the top
//! window's location only when it shares its origin, a page may search a
//! frame's document only when it shares its origin, and a message posted
//! with an exact target origin is dropped when the receiver's origin
//! differs.
//!
//! Used by the integration tests and by `top-params simulate`.

use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;

use crate::config::{ListenerConfig, ReaderConfig};
use crate::constants::FRAME_NODE_NAME;
use crate::context::{
    Ancestor, BroadcastTimer, ChildContext, InboundMessage, PageContext, ParentContext, RetryTimer,
    TargetOrigin,
};
use crate::error::{RelayError, Result};
use crate::listener::{BroadcastReport, TopParamsListener};
use crate::message::RelayMessage;
use crate::reader::{ReaderOutputs, RenderSurface, StatusView, TopParamsReader};

/// Upper bound on events processed by one `advance`, against
/// self-sustaining message loops.
const MAX_EVENTS_PER_ADVANCE: usize = 10_000;

/// Handle of a simulated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(usize);

impl WindowId {
    /// Position in creation order; the top window is 0.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Render surface that remembers what it was asked to draw.
#[derive(Debug, Default)]
pub struct SimSurface {
    /// Most recent view.
    pub last: Option<StatusView>,
    /// Number of renders.
    pub renders: usize,
}

impl RenderSurface for SimSurface {
    fn render(&mut self, view: &StatusView) {
        self.last = Some(view.clone());
        self.renders += 1;
    }
}

#[derive(Debug)]
struct WindowNode {
    origin: String,
    search: String,
    parent: Option<WindowId>,
    frames: Vec<WindowId>,
    detached: bool,
}

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Retry(RetryTimer),
    Broadcast(BroadcastTimer),
}

#[derive(Debug)]
struct Envelope {
    from: WindowId,
    to: WindowId,
    data: Value,
    target: TargetOrigin,
}

#[derive(Debug)]
enum App {
    Empty,
    Reader {
        reader: Box<TopParamsReader<SimSurface>>,
        notifications: Rc<Cell<usize>>,
    },
    Listener(TopParamsListener),
}

/// Everything but the apps, so an app and its context borrow disjointly.
#[derive(Debug, Default)]
struct World {
    windows: Vec<WindowNode>,
    now_ms: u64,
    seq: u64,
    timers: BTreeMap<(u64, u64), (WindowId, TimerKind)>,
    mailbox: VecDeque<Envelope>,
    delivered: usize,
    dropped: usize,
}

impl World {
    fn node(&self, id: WindowId) -> &WindowNode {
        &self.windows[id.0]
    }

    fn top_of(&self, mut id: WindowId) -> WindowId {
        while let Some(parent) = self.node(id).parent {
            id = parent;
        }
        id
    }

    fn schedule(&mut self, id: WindowId, delay: Duration, kind: TimerKind) {
        let due = self
            .now_ms
            .saturating_add(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self.seq += 1;
        self.timers.insert((due, self.seq), (id, kind));
    }

    fn post(&mut self, from: WindowId, to: WindowId, message: &RelayMessage, target: TargetOrigin) {
        self.mailbox.push_back(Envelope {
            from,
            to,
            data: message.to_value(),
            target,
        });
    }
}

/// Context handed to the app running in window `id`.
struct WindowCtx<'a> {
    world: &'a mut World,
    id: WindowId,
}

impl WindowCtx<'_> {
    fn node(&self) -> &WindowNode {
        self.world.node(self.id)
    }
}

impl PageContext for WindowCtx<'_> {
    type Source = WindowId;

    fn own_search(&self) -> String {
        self.node().search.clone()
    }

    fn now_millis(&self) -> u64 {
        self.world.now_ms
    }

    fn reply(&mut self, source: &WindowId, message: &RelayMessage, target: &TargetOrigin) -> Result<()> {
        if self.world.node(*source).detached {
            return Err(RelayError::delivery("source window is gone"));
        }
        self.world.post(self.id, *source, message, target.clone());
        Ok(())
    }
}

impl ChildContext for WindowCtx<'_> {
    fn is_top_level(&self) -> Result<bool> {
        Ok(self.node().parent.is_none())
    }

    fn top_search(&self) -> Result<String> {
        let top = self.world.node(self.world.top_of(self.id));
        if top.origin == self.node().origin {
            Ok(top.search.clone())
        } else {
            Err(RelayError::access(format!(
                "Blocked a frame with origin \"{}\" from accessing a cross-origin frame",
                self.node().origin
            )))
        }
    }

    fn distinct_ancestors(&self) -> Vec<Ancestor> {
        let mut ancestors = Vec::new();
        let parent = self.node().parent;
        if parent.is_some() {
            ancestors.push(Ancestor::Parent);
        }
        let top = self.world.top_of(self.id);
        if top != self.id && Some(top) != parent {
            ancestors.push(Ancestor::Top);
        }
        ancestors
    }

    fn post_to_ancestor(&mut self, ancestor: Ancestor, message: &RelayMessage) -> Result<()> {
        let to = match ancestor {
            Ancestor::Parent => self
                .node()
                .parent
                .ok_or_else(|| RelayError::delivery("no parent window"))?,
            Ancestor::Top => self.world.top_of(self.id),
        };
        self.world.post(self.id, to, message, TargetOrigin::Any);
        Ok(())
    }

    fn schedule_retry(&mut self, delay: Duration, timer: RetryTimer) {
        self.world.schedule(self.id, delay, TimerKind::Retry(timer));
    }
}

impl ParentContext for WindowCtx<'_> {
    type Frame = WindowId;

    fn top_level_frames(&self) -> Vec<WindowId> {
        self.node().frames.clone()
    }

    fn nested_frames(&self, frame: &WindowId) -> Result<Vec<WindowId>> {
        let node = self.world.node(*frame);
        if node.origin != self.node().origin {
            return Err(RelayError::access(format!(
                "frame document at {} is cross-origin",
                node.origin
            )));
        }
        Ok(node.frames.clone())
    }

    fn post_to_frame(&mut self, frame: &WindowId, message: &RelayMessage) -> Result<()> {
        if self.world.node(*frame).detached {
            return Err(RelayError::delivery("frame has no content window"));
        }
        self.world.post(self.id, *frame, message, TargetOrigin::Any);
        Ok(())
    }

    fn schedule_broadcast(&mut self, delay: Duration, timer: BroadcastTimer) {
        self.world.schedule(self.id, delay, TimerKind::Broadcast(timer));
    }
}

/// A simulated browser tab.
#[derive(Debug)]
pub struct Browser {
    world: World,
    apps: Vec<App>,
    broadcasts: Vec<(WindowId, BroadcastReport)>,
}

impl Browser {
    /// Open a top-level page at `origin` with location search `search`.
    pub fn new(origin: &str, search: &str) -> Self {
        let mut browser = Self {
            world: World::default(),
            apps: Vec::new(),
            broadcasts: Vec::new(),
        };
        browser.push_window(origin, search, None);
        browser
    }

    /// Open a top-level page from an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `raw` is not an absolute URL.
    pub fn from_url(raw: &str) -> std::result::Result<Self, url::ParseError> {
        let (origin, search) = split_url(raw)?;
        Ok(Self::new(&origin, &search))
    }

    /// The top-level window.
    pub fn top(&self) -> WindowId {
        WindowId(0)
    }

    /// Embed a frame in `parent` at page load. No insertion is reported.
    pub fn add_frame(&mut self, parent: WindowId, origin: &str, search: &str) -> WindowId {
        self.push_window(origin, search, Some(parent))
    }

    /// Insert a frame into `parent` after load and report the insertion to
    /// a Listener running there.
    pub fn insert_frame(&mut self, parent: WindowId, origin: &str, search: &str) -> WindowId {
        let id = self.push_window(origin, search, Some(parent));
        let Self { world, apps, .. } = self;
        if let App::Listener(listener) = &mut apps[parent.0] {
            let mut ctx = WindowCtx { world, id: parent };
            listener.on_nodes_inserted(&mut ctx, [FRAME_NODE_NAME]);
        }
        id
    }

    /// Remove a frame's content window; posting to it fails afterwards.
    pub fn detach(&mut self, id: WindowId) {
        self.world.windows[id.0].detached = true;
    }

    /// Change a window's location search without reloading it.
    pub fn set_search(&mut self, id: WindowId, search: &str) {
        self.world.windows[id.0].search = search.to_string();
    }

    /// Origin of `id`.
    pub fn origin(&self, id: WindowId) -> &str {
        &self.world.node(id).origin
    }

    /// Run a Listener in `id`.
    ///
    /// # Errors
    ///
    /// Propagates the Listener's initialization error.
    pub fn install_listener(&mut self, id: WindowId, config: ListenerConfig) -> Result<()> {
        let mut listener = TopParamsListener::new(config);
        let mut ctx = WindowCtx {
            world: &mut self.world,
            id,
        };
        listener.on_init(&mut ctx)?;
        self.apps[id.0] = App::Listener(listener);
        Ok(())
    }

    /// Run a Reader in `id`, reading `parameter_name`.
    pub fn install_reader(&mut self, id: WindowId, config: ReaderConfig, parameter_name: &str) {
        let notifications = Rc::new(Cell::new(0));
        let counter = Rc::clone(&notifications);
        let mut reader = Box::new(TopParamsReader::new(config, move || {
            counter.set(counter.get() + 1);
        }));

        let mut ctx = WindowCtx {
            world: &mut self.world,
            id,
        };
        reader.start(&mut ctx, SimSurface::default());
        reader.on_inputs_changed(&mut ctx, parameter_name, true);
        self.apps[id.0] = App::Reader {
            reader,
            notifications,
        };
    }

    /// Deliver new input properties to the Reader in `id`.
    pub fn update_inputs(&mut self, id: WindowId, parameter_name: &str, show_details: bool) {
        let Self { world, apps, .. } = self;
        if let App::Reader { reader, .. } = &mut apps[id.0] {
            let mut ctx = WindowCtx { world, id };
            reader.on_inputs_changed(&mut ctx, parameter_name, show_details);
        }
    }

    /// Report a visibility change of the page in `id`.
    pub fn set_hidden(&mut self, id: WindowId, hidden: bool) {
        let Self {
            world,
            apps,
            broadcasts,
        } = self;
        if let App::Listener(listener) = &mut apps[id.0] {
            let mut ctx = WindowCtx { world, id };
            if let Some(report) = listener.on_visibility_change(&mut ctx, hidden) {
                broadcasts.push((id, report));
            }
        }
    }

    /// Tear down whatever runs in `id`.
    pub fn dispose(&mut self, id: WindowId) {
        match &mut self.apps[id.0] {
            App::Reader { reader, .. } => reader.dispose(),
            App::Listener(listener) => listener.on_dispose(),
            App::Empty => {}
        }
    }

    /// Queue an arbitrary message from `from` to `to`.
    pub fn post_raw(&mut self, from: WindowId, to: WindowId, data: Value) {
        self.world.mailbox.push_back(Envelope {
            from,
            to,
            data,
            target: TargetOrigin::Any,
        });
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        Duration::from_millis(self.world.now_ms)
    }

    /// Advance the clock by `by`, delivering messages and firing timers in
    /// order.
    pub fn advance(&mut self, by: Duration) {
        let until = self
            .world
            .now_ms
            .saturating_add(u64::try_from(by.as_millis()).unwrap_or(u64::MAX));
        let mut budget = MAX_EVENTS_PER_ADVANCE;

        loop {
            while let Some(envelope) = self.world.mailbox.pop_front() {
                if budget == 0 {
                    log::warn!("Event budget exhausted at {}ms", self.world.now_ms);
                    return;
                }
                budget -= 1;
                self.deliver(envelope);
            }

            let Some((&(due, seq), _)) = self.world.timers.iter().next() else {
                break;
            };
            if due > until {
                break;
            }
            let Some((id, kind)) = self.world.timers.remove(&(due, seq)) else {
                break;
            };
            self.world.now_ms = due;
            self.fire(id, kind);
        }
        self.world.now_ms = until;
    }

    /// Advance until no timer is left.
    pub fn run_until_idle(&mut self) {
        while let Some(&(due, _)) = self.world.timers.keys().next_back() {
            let by = due.saturating_sub(self.world.now_ms);
            self.advance(Duration::from_millis(by));
        }
        self.advance(Duration::ZERO);
    }

    /// Outputs of the Reader in `id`.
    pub fn outputs(&self, id: WindowId) -> Option<ReaderOutputs> {
        self.reader(id).map(TopParamsReader::outputs)
    }

    /// The Reader running in `id`.
    pub fn reader(&self, id: WindowId) -> Option<&TopParamsReader<SimSurface>> {
        match &self.apps[id.0] {
            App::Reader { reader, .. } => Some(reader),
            _ => None,
        }
    }

    /// Output notifications raised by the Reader in `id`.
    pub fn notifications(&self, id: WindowId) -> usize {
        match &self.apps[id.0] {
            App::Reader { notifications, .. } => notifications.get(),
            _ => 0,
        }
    }

    /// The Listener running in `id`.
    pub fn listener(&self, id: WindowId) -> Option<&TopParamsListener> {
        match &self.apps[id.0] {
            App::Listener(listener) => Some(listener),
            _ => None,
        }
    }

    /// Every broadcast so far, with the window that ran it.
    pub fn broadcasts(&self) -> &[(WindowId, BroadcastReport)] {
        &self.broadcasts
    }

    /// Messages delivered to a window.
    pub fn messages_delivered(&self) -> usize {
        self.world.delivered
    }

    /// Messages dropped for a target origin mismatch or a detached receiver.
    pub fn messages_dropped(&self) -> usize {
        self.world.dropped
    }

    fn push_window(&mut self, origin: &str, search: &str, parent: Option<WindowId>) -> WindowId {
        let id = WindowId(self.world.windows.len());
        self.world.windows.push(WindowNode {
            origin: origin.to_string(),
            search: search.to_string(),
            parent,
            frames: Vec::new(),
            detached: false,
        });
        self.apps.push(App::Empty);
        if let Some(parent) = parent {
            self.world.windows[parent.0].frames.push(id);
        }
        id
    }

    fn deliver(&mut self, envelope: Envelope) {
        let receiver = self.world.node(envelope.to);
        let origin_matches = match &envelope.target {
            TargetOrigin::Any => true,
            TargetOrigin::Exact(origin) => *origin == receiver.origin,
        };
        if receiver.detached || !origin_matches {
            log::debug!(
                "Dropping message to window {} (target {})",
                envelope.to.0,
                envelope.target.as_str()
            );
            self.world.dropped += 1;
            return;
        }
        self.world.delivered += 1;

        let event = InboundMessage::new(envelope.data)
            .with_origin(self.world.node(envelope.from).origin.clone())
            .with_source(envelope.from);
        let id = envelope.to;
        let Self { world, apps, .. } = self;
        let mut ctx = WindowCtx { world, id };
        match &mut apps[id.0] {
            App::Reader { reader, .. } => reader.handle_message(&mut ctx, &event),
            App::Listener(listener) => {
                listener.handle_message(&mut ctx, &event);
            }
            App::Empty => {}
        }
    }

    fn fire(&mut self, id: WindowId, kind: TimerKind) {
        let Self {
            world,
            apps,
            broadcasts,
        } = self;
        let mut ctx = WindowCtx { world, id };
        match (&mut apps[id.0], kind) {
            (App::Reader { reader, .. }, TimerKind::Retry(timer)) => {
                reader.on_timer(&mut ctx, timer);
            }
            (App::Listener(listener), TimerKind::Broadcast(timer)) => {
                if let Some(report) = listener.on_timer(&mut ctx, timer) {
                    broadcasts.push((id, report));
                }
            }
            _ => {}
        }
    }
}

fn split_url(raw: &str) -> std::result::Result<(String, String), url::ParseError> {
    let parsed = url::Url::parse(raw)?;
    let search = parsed.query().map(|q| format!("?{q}")).unwrap_or_default();
    Ok((parsed.origin().ascii_serialization(), search))
}
