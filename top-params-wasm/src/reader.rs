//! JavaScript binding of the embedded Reader control.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use js_sys::Function;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{HtmlElement, MessageEvent};

use top_params::constants::READER_LOG_TARGET as TARGET;
use top_params::{ReaderConfig, RetryTimer, TopParamsReader};

use crate::surface::DomSurface;
use crate::window::{defer, inbound, BrowserContext};
use crate::{config_value, WasmError};

struct ReaderShared {
    ctx: BrowserContext<RetryTimer>,
    reader: TopParamsReader<DomSurface>,
    on_message: Option<Closure<dyn FnMut(MessageEvent)>>,
}

impl ReaderShared {
    fn on_timer(&mut self, timer: RetryTimer) {
        let Self { ctx, reader, .. } = self;
        reader.on_timer(ctx, timer);
    }

    fn handle(&mut self, event: &MessageEvent) {
        let Self { ctx, reader, .. } = self;
        reader.handle_message(ctx, &inbound(event));
    }

    fn unsubscribe(&mut self) {
        if let Some(handler) = self.on_message.take() {
            let _ = self
                .ctx
                .window()
                .remove_event_listener_with_callback("message", handler.as_ref().unchecked_ref());
        }
    }
}

/// Run `f` on the shared state if it is still alive and not in use.
fn with_shared(weak: &Weak<RefCell<ReaderShared>>, f: impl FnOnce(&mut ReaderShared)) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    match shared.try_borrow_mut() {
        Ok(mut state) => f(&mut state),
        Err(_) => log::warn!(target: TARGET, "Reader busy, dropping callback"),
    };
}

/// Embedded control exposing the top window's URL parameters.
#[wasm_bindgen(js_name = "TopParamsReader")]
pub struct WasmReader {
    shared: Rc<RefCell<ReaderShared>>,
}

#[wasm_bindgen(js_class = "TopParamsReader")]
impl WasmReader {
    /// Create a control. `config` may be omitted; `notify` is called
    /// whenever the outputs change.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, notify: Function) -> Result<WasmReader, JsError> {
        let config = ReaderConfig::from_value(config_value(config)?)
            .map_err(|e| WasmError::Config(format!("{e:#}")))?;
        let window =
            web_sys::window().ok_or_else(|| WasmError::Browser("no window".to_string()))?;

        let notify_window = window.clone();
        let notify_outputs = move || {
            let notify = notify.clone();
            defer(&notify_window, move || {
                if let Err(e) = notify.call0(&JsValue::NULL) {
                    log::warn!(target: TARGET, "Output callback threw: {e:?}");
                }
            });
        };

        let shared = Rc::new_cyclic(|weak: &Weak<RefCell<ReaderShared>>| {
            let weak = weak.clone();
            let ctx = BrowserContext::new(window, move |timer| {
                with_shared(&weak, |state| state.on_timer(timer));
            });
            RefCell::new(ReaderShared {
                ctx,
                reader: TopParamsReader::new(config, notify_outputs),
                on_message: None,
            })
        });
        Ok(Self { shared })
    }

    /// Attach to `container` and start relaying. Fails after `destroy`.
    pub fn init(&self, container: HtmlElement) -> Result<(), JsError> {
        let weak = Rc::downgrade(&self.shared);
        let mut state = self
            .shared
            .try_borrow_mut()
            .map_err(|_| WasmError::Browser("reader is busy".to_string()))?;
        if state.reader.relay().is_disposed() {
            return Err(WasmError::Relay(top_params::RelayError::Disposed).into());
        }
        let window = state.ctx.window().clone();
        let document = window
            .document()
            .ok_or_else(|| WasmError::Browser("no document".to_string()))?;

        if state.on_message.is_none() {
            let handler = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                with_shared(&weak, |state| state.handle(&event));
            });
            window
                .add_event_listener_with_callback("message", handler.as_ref().unchecked_ref())
                .map_err(|e| WasmError::Browser(format!("{e:?}")))?;
            state.on_message = Some(handler);
        }

        let ReaderShared { ctx, reader, .. } = &mut *state;
        reader.start(ctx, DomSurface::new(document, container));
        Ok(())
    }

    /// Apply new input properties.
    #[wasm_bindgen(js_name = "updateView")]
    pub fn update_view(&self, parameter_name: &str, show_details: bool) {
        let weak = Rc::downgrade(&self.shared);
        with_shared(&weak, |state| {
            let ReaderShared { ctx, reader, .. } = state;
            reader.on_inputs_changed(ctx, parameter_name, show_details);
        });
    }

    /// Current outputs as `{ parameterValue, allParameters, isInIframe,
    /// errorMessage }`.
    #[wasm_bindgen(js_name = "getOutputs")]
    pub fn get_outputs(&self) -> Result<JsValue, JsError> {
        let state = self
            .shared
            .try_borrow()
            .map_err(|_| WasmError::Browser("reader is busy".to_string()))?;
        state
            .reader
            .outputs()
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Remove the message subscription and stop all pending work.
    pub fn destroy(&self) {
        let weak = Rc::downgrade(&self.shared);
        with_shared(&weak, |state| {
            state.unsubscribe();
            state.reader.dispose();
        });
    }
}
