//! JavaScript binding of the host-page Listener.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use js_sys::{Array, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Event, MessageEvent, MutationObserver, MutationObserverInit, MutationRecord};

use top_params::constants::LISTENER_LOG_TARGET as TARGET;
use top_params::{BroadcastTimer, BroadcastTrigger, ListenerConfig, TopParamsListener};

use crate::window::{inbound, BrowserContext};
use crate::{config_value, WasmError};

type ObserverCallback = Closure<dyn FnMut(Array, MutationObserver)>;

/// Page subscriptions held between `onInit` and `onDispose`.
struct Subscriptions {
    document: Document,
    on_message: Closure<dyn FnMut(MessageEvent)>,
    on_visibility: Option<Closure<dyn FnMut(Event)>>,
    observer: Option<(MutationObserver, ObserverCallback)>,
}

struct ListenerShared {
    ctx: BrowserContext<BroadcastTimer>,
    listener: TopParamsListener,
    subscriptions: Option<Subscriptions>,
}

impl ListenerShared {
    fn subscribe(&mut self, weak: &Weak<RefCell<ListenerShared>>) -> Result<(), WasmError> {
        if self.subscriptions.is_some() {
            return Ok(());
        }
        let window = self.ctx.window().clone();
        let document = window
            .document()
            .ok_or_else(|| WasmError::Browser("no document".to_string()))?;

        let on_message = {
            let weak = weak.clone();
            Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                with_shared(&weak, |state| {
                    let ListenerShared { ctx, listener, .. } = state;
                    listener.handle_message(ctx, &inbound(&event));
                });
            })
        };
        window
            .add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())
            .map_err(browser_error)?;

        let on_visibility = if self.listener.config().rebroadcasts_on_visible() {
            let weak = weak.clone();
            let page = document.clone();
            let handler = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
                let hidden = page.hidden();
                with_shared(&weak, |state| {
                    let ListenerShared { ctx, listener, .. } = state;
                    listener.on_visibility_change(ctx, hidden);
                });
            });
            document
                .add_event_listener_with_callback("visibilitychange", handler.as_ref().unchecked_ref())
                .map_err(browser_error)?;
            Some(handler)
        } else {
            None
        };

        let observer = if self.listener.config().watches_insertions() {
            observe_insertions(&document, weak)?
        } else {
            None
        };

        self.subscriptions = Some(Subscriptions {
            document,
            on_message,
            on_visibility,
            observer,
        });
        Ok(())
    }

    fn unsubscribe(&mut self) {
        let Some(subscriptions) = self.subscriptions.take() else {
            return;
        };
        let _ = self.ctx.window().remove_event_listener_with_callback(
            "message",
            subscriptions.on_message.as_ref().unchecked_ref(),
        );
        if let Some(handler) = &subscriptions.on_visibility {
            let _ = subscriptions.document.remove_event_listener_with_callback(
                "visibilitychange",
                handler.as_ref().unchecked_ref(),
            );
        }
        if let Some((observer, _)) = &subscriptions.observer {
            observer.disconnect();
        }
    }
}

fn browser_error(e: JsValue) -> WasmError {
    WasmError::Browser(format!("{e:?}"))
}

/// Watch the page body for inserted frames.
fn observe_insertions(
    document: &Document,
    weak: &Weak<RefCell<ListenerShared>>,
) -> Result<Option<(MutationObserver, ObserverCallback)>, WasmError> {
    let Some(body) = document.body() else {
        log::debug!(target: TARGET, "No document body, frame insertions are not watched");
        return Ok(None);
    };

    let weak = weak.clone();
    let callback: ObserverCallback = Closure::new(move |records: Array, _: MutationObserver| {
        let names: Vec<String> = records
            .iter()
            .filter_map(|record| record.dyn_into::<MutationRecord>().ok())
            .flat_map(|record| {
                let nodes = record.added_nodes();
                (0..nodes.length()).filter_map(move |i| nodes.item(i))
            })
            .map(|node| node.node_name())
            .collect();
        if names.is_empty() {
            return;
        }
        with_shared(&weak, |state| {
            let ListenerShared { ctx, listener, .. } = state;
            listener.on_nodes_inserted(ctx, &names);
        });
    });

    let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).map_err(browser_error)?;
    let options = MutationObserverInit::new();
    options.set_child_list(true);
    options.set_subtree(true);
    observer
        .observe_with_options(&body, &options)
        .map_err(browser_error)?;
    Ok(Some((observer, callback)))
}

fn with_shared(weak: &Weak<RefCell<ListenerShared>>, f: impl FnOnce(&mut ListenerShared)) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    match shared.try_borrow_mut() {
        Ok(mut state) => f(&mut state),
        Err(_) => log::warn!(target: TARGET, "Listener busy, dropping callback"),
    };
}

/// Host-page listener answering parameter requests and broadcasting the
/// page's URL parameters to every reachable frame.
#[wasm_bindgen(js_name = "TopParamsListener")]
pub struct WasmListener {
    shared: Rc<RefCell<ListenerShared>>,
}

#[wasm_bindgen(js_class = "TopParamsListener")]
impl WasmListener {
    /// Create a listener from customizer properties such as
    /// `{ enableLogging: true }`.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmListener, JsError> {
        let config = ListenerConfig::from_value(config_value(config)?)
            .map_err(|e| WasmError::Config(format!("{e:#}")))?;
        Ok(Self::with_config(config)?)
    }

    /// Subscribe to page events and schedule the load broadcasts.
    #[wasm_bindgen(js_name = "onInit")]
    pub fn on_init(&self) -> Result<Promise, JsValue> {
        let weak = Rc::downgrade(&self.shared);
        let mut state = self
            .shared
            .try_borrow_mut()
            .map_err(|_| WasmError::Browser("listener is busy".to_string()))?;
        if state.listener.is_disposed() {
            return Err(WasmError::Relay(top_params::RelayError::Disposed).into());
        }
        state.subscribe(&weak)?;

        let ListenerShared { ctx, listener, .. } = &mut *state;
        listener.on_init(ctx).map_err(WasmError::from)?;
        Ok(Promise::resolve(&JsValue::UNDEFINED))
    }

    /// Remove every subscription; pending broadcasts become no-ops.
    #[wasm_bindgen(js_name = "onDispose")]
    pub fn on_dispose(&self) {
        let weak = Rc::downgrade(&self.shared);
        with_shared(&weak, |state| {
            state.unsubscribe();
            state.listener.on_dispose();
        });
    }

    /// Broadcast now. Returns the number of frames posted to.
    pub fn broadcast(&self) -> Result<usize, JsError> {
        let mut state = self
            .shared
            .try_borrow_mut()
            .map_err(|_| WasmError::Browser("listener is busy".to_string()))?;
        if state.listener.is_disposed() {
            return Err(WasmError::Relay(top_params::RelayError::Disposed).into());
        }
        let ListenerShared { ctx, listener, .. } = &mut *state;
        Ok(listener.broadcast(ctx, BroadcastTrigger::Manual).delivered)
    }

    /// Requests answered so far.
    #[wasm_bindgen(getter, js_name = "requestsAnswered")]
    pub fn requests_answered(&self) -> f64 {
        self.shared
            .try_borrow()
            .map(|state| state.listener.requests_answered() as f64)
            .unwrap_or_default()
    }
}

impl WasmListener {
    fn with_config(config: ListenerConfig) -> Result<Self, WasmError> {
        let window = web_sys::window().ok_or_else(|| WasmError::Browser("no window".to_string()))?;
        let shared = Rc::new_cyclic(|weak: &Weak<RefCell<ListenerShared>>| {
            let weak = weak.clone();
            let ctx = BrowserContext::new(window, move |timer| {
                with_shared(&weak, |state| {
                    let ListenerShared { ctx, listener, .. } = state;
                    listener.on_timer(ctx, timer);
                });
            });
            RefCell::new(ListenerShared {
                ctx,
                listener: TopParamsListener::new(config),
                subscriptions: None,
            })
        });
        Ok(Self { shared })
    }
}

/// Start the drop-in page script: answer requests and broadcast once to
/// the page's own frames.
#[wasm_bindgen(js_name = "installSnippet")]
pub fn install_snippet() -> Result<WasmListener, JsValue> {
    let listener = WasmListener::with_config(ListenerConfig::snippet())?;
    listener.on_init()?;
    Ok(listener)
}
