//! DOM rendering of the Reader's status.

use wasm_bindgen::JsValue;
use web_sys::{Document, HtmlElement};

use top_params::constants::READER_LOG_TARGET;
use top_params::{RenderSurface, StatusView};

/// Renders into a container element owned by the host.
pub(crate) struct DomSurface {
    document: Document,
    container: HtmlElement,
}

impl DomSurface {
    pub(crate) fn new(document: Document, container: HtmlElement) -> Self {
        Self {
            document,
            container,
        }
    }

    fn line(&self, tag: &str, class: &str, text: &str) -> Result<web_sys::Element, JsValue> {
        let element = self.document.create_element(tag)?;
        element.set_class_name(class);
        element.set_text_content(Some(text));
        Ok(element)
    }

    fn draw(&self, view: &StatusView) -> Result<(), JsValue> {
        self.container.set_text_content(None);
        self.container
            .append_child(&self.line("div", "top-params-summary", &view.compact_label())?.into())?;
        if !view.show_details {
            return Ok(());
        }

        self.container
            .append_child(&self.line("div", "top-params-status", view.status_line())?.into())?;
        let outcome_class = if view.error.is_some() {
            "top-params-error"
        } else {
            "top-params-outcome"
        };
        self.container
            .append_child(&self.line("div", outcome_class, &view.outcome_line())?.into())?;

        let list = self.line("ul", "top-params-list", "")?;
        if view.parameters.is_empty() {
            list.append_child(&self.line("li", "top-params-empty", "No parameters")?.into())?;
        }
        for (name, value) in &view.parameters {
            list.append_child(&self.line("li", "top-params-item", &format!("{name}: {value}"))?.into())?;
        }
        self.container.append_child(&list)?;
        Ok(())
    }
}

impl RenderSurface for DomSurface {
    fn render(&mut self, view: &StatusView) {
        if let Err(e) = self.draw(view) {
            log::warn!(target: READER_LOG_TARGET, "Could not render status: {e:?}");
        }
    }
}
