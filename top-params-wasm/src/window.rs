//! Relay contexts backed by a real browser window.
//!
//! One type serves both roles; the timer identity it schedules selects the
//! role: `BrowserContext<RetryTimer>` is a [`ChildContext`] and
//! `BrowserContext<BroadcastTimer>` a [`ParentContext`]. Fired timers are
//! handed to `on_timer`, which the owning binding wires back into its core.

use std::rc::Rc;
use std::time::Duration;

use js_sys::{Function, Object, Reflect};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlIFrameElement, MessageEvent, Window};

use top_params::{
    Ancestor, BroadcastTimer, ChildContext, InboundMessage, PageContext, ParentContext, RelayError,
    RelayMessage, RetryTimer, TargetOrigin,
};

/// Window-backed context.
pub(crate) struct BrowserContext<T> {
    window: Window,
    on_timer: Rc<dyn Fn(T)>,
}

impl<T: Copy + 'static> BrowserContext<T> {
    pub(crate) fn new(window: Window, on_timer: impl Fn(T) + 'static) -> Self {
        Self {
            window,
            on_timer: Rc::new(on_timer),
        }
    }

    pub(crate) fn window(&self) -> &Window {
        &self.window
    }

    fn schedule(&self, delay: Duration, timer: T) {
        let on_timer = Rc::clone(&self.on_timer);
        set_timeout(&self.window, delay, move || on_timer(timer));
    }
}

/// Run `callback` once after `delay`.
pub(crate) fn set_timeout(window: &Window, delay: Duration, callback: impl FnOnce() + 'static) {
    let callback = Closure::once_into_js(callback);
    let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
    if let Err(e) = window
        .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis)
    {
        log::warn!("setTimeout failed: {e:?}");
    }
}

/// Run `callback` once the current task completes.
pub(crate) fn defer(window: &Window, callback: impl FnOnce() + 'static) {
    let callback = Closure::once_into_js(callback);
    window.queue_microtask(callback.unchecked_ref());
}

/// Encode `message` as a plain JS object.
fn to_js(message: &RelayMessage) -> Result<JsValue, RelayError> {
    message
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(RelayError::delivery)
}

/// Decode a message event. Data that is not JSON-like becomes `null`,
/// which the core ignores as malformed.
pub(crate) fn inbound(event: &MessageEvent) -> InboundMessage<Object> {
    let data: Value = serde_wasm_bindgen::from_value(event.data()).unwrap_or(Value::Null);
    let message = InboundMessage::new(data).with_origin(event.origin());
    match event.source() {
        Some(source) => message.with_source(source),
        None => message,
    }
}

fn same_window(a: &Window, b: &Window) -> bool {
    Object::is(a.as_ref(), b.as_ref())
}

fn frames_in(document: &Document) -> Vec<HtmlIFrameElement> {
    let collection = document.get_elements_by_tag_name("iframe");
    (0..collection.length())
        .filter_map(|i| collection.item(i))
        .filter_map(|element| element.dyn_into::<HtmlIFrameElement>().ok())
        .collect()
}

impl<T: Copy + 'static> PageContext for BrowserContext<T> {
    type Source = Object;

    fn own_search(&self) -> String {
        self.window.location().search().unwrap_or_default()
    }

    fn now_millis(&self) -> u64 {
        js_sys::Date::now() as u64
    }

    fn reply(&mut self, source: &Object, message: &RelayMessage, target: &TargetOrigin) -> top_params::Result<()> {
        // The source may be a window proxy, a port or a worker.
        let post = Reflect::get(source, &JsValue::from_str("postMessage"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| RelayError::delivery("message source cannot receive messages"))?;
        post.call2(source, &to_js(message)?, &JsValue::from_str(target.as_str()))
            .map(|_| ())
            .map_err(|e| RelayError::delivery(format!("{e:?}")))
    }
}

impl ChildContext for BrowserContext<RetryTimer> {
    fn is_top_level(&self) -> top_params::Result<bool> {
        match self.window.top() {
            Ok(Some(top)) => Ok(same_window(&self.window, &top)),
            Ok(None) => Ok(true),
            Err(e) => Err(RelayError::access(format!("{e:?}"))),
        }
    }

    fn top_search(&self) -> top_params::Result<String> {
        let top = self
            .window
            .top()
            .map_err(|e| RelayError::access(format!("{e:?}")))?
            .ok_or_else(|| RelayError::access("no top window"))?;
        top.location()
            .search()
            .map_err(|e| RelayError::access(format!("{e:?}")))
    }

    fn distinct_ancestors(&self) -> Vec<Ancestor> {
        let parent = self.window.parent().ok().flatten();
        let top = self.window.top().ok().flatten();
        let mut ancestors = Vec::new();

        if let Some(parent) = &parent {
            if !same_window(parent, &self.window) {
                ancestors.push(Ancestor::Parent);
            }
        }
        if let Some(top) = &top {
            let is_parent = parent.as_ref().is_some_and(|p| same_window(p, top));
            if !same_window(top, &self.window) && !is_parent {
                ancestors.push(Ancestor::Top);
            }
        }
        ancestors
    }

    fn post_to_ancestor(&mut self, ancestor: Ancestor, message: &RelayMessage) -> top_params::Result<()> {
        let target = match ancestor {
            Ancestor::Parent => self.window.parent(),
            Ancestor::Top => self.window.top(),
        }
        .map_err(|e| RelayError::delivery(format!("{e:?}")))?
        .ok_or_else(|| RelayError::delivery(format!("no {ancestor:?} window")))?;

        target
            .post_message(&to_js(message)?, TargetOrigin::Any.as_str())
            .map_err(|e| RelayError::delivery(format!("{e:?}")))
    }

    fn schedule_retry(&mut self, delay: Duration, timer: RetryTimer) {
        self.schedule(delay, timer);
    }
}

impl ParentContext for BrowserContext<BroadcastTimer> {
    type Frame = HtmlIFrameElement;

    fn top_level_frames(&self) -> Vec<HtmlIFrameElement> {
        self.window.document().map(|d| frames_in(&d)).unwrap_or_default()
    }

    fn nested_frames(&self, frame: &HtmlIFrameElement) -> top_params::Result<Vec<HtmlIFrameElement>> {
        // Cross-origin frames report no content document.
        let document = frame
            .content_document()
            .ok_or_else(|| RelayError::access("frame document is not accessible"))?;
        Ok(frames_in(&document))
    }

    fn post_to_frame(&mut self, frame: &HtmlIFrameElement, message: &RelayMessage) -> top_params::Result<()> {
        let target = frame
            .content_window()
            .ok_or_else(|| RelayError::delivery("frame has no content window"))?;
        target
            .post_message(&to_js(message)?, TargetOrigin::Any.as_str())
            .map_err(|e| RelayError::delivery(format!("{e:?}")))
    }

    fn schedule_broadcast(&mut self, delay: Duration, timer: BroadcastTimer) {
        self.schedule(delay, timer);
    }
}
