//! WASM bindings for liquido
//!
//! This crate provides a JavaScript-friendly API for:
//! - One-shot rendering of a JSON document through a template
//! - Parsing a template once and rendering it against many documents
//!
//! # Example (JavaScript)
//!
//! ```javascript
//! import init, { render, LiquidTemplate } from 'liquido-wasm';
//!
//! await init();
//!
//! // One-shot: returns { status: "success", output } or
//! // { status: "failure", kind, message, position: [line, column] }
//! const outcome = render('{"name":"Ann"}', 'Hello, {{ name }}!');
//!
//! // Reusable template
//! const template = new LiquidTemplate('{% for x in model %}{{ x }}{% endfor %}');
//! const text = template.render(["a", "b"]);
//! ```

use liquido::{RenderOptions, RenderOutcome, Template};
use wasm_bindgen::prelude::*;

// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Render a template against JSON text
///
/// @param jsonData - JSON document text
/// @param liquidTemplate - Template source
/// @returns Render outcome object
#[wasm_bindgen]
pub fn render(json_data: &str, liquid_template: &str) -> Result<JsValue, JsValue> {
    to_js(&liquido::render_document(json_data, liquid_template))
}

/// Render with explicit limits
///
/// @param jsonData - JSON document text
/// @param liquidTemplate - Template source
/// @param options - `{ maxIterations, maxNestingDepth }`, all optional
/// @returns Render outcome object
#[wasm_bindgen(js_name = renderWithOptions)]
pub fn render_with_options(
    json_data: &str,
    liquid_template: &str,
    options: JsValue,
) -> Result<JsValue, JsValue> {
    let options = parse_options(options)?;
    to_js(&liquido::render_document_with(
        json_data,
        liquid_template,
        &options,
    ))
}

/// Names of the built-in filters
///
/// @returns Array of filter names
#[wasm_bindgen(js_name = filterNames)]
pub fn filter_names() -> Vec<JsValue> {
    liquido::FilterRegistry::global()
        .names()
        .into_iter()
        .map(JsValue::from_str)
        .collect()
}

/// A parsed template
#[wasm_bindgen]
pub struct LiquidTemplate {
    inner: Template,
}

#[wasm_bindgen]
impl LiquidTemplate {
    /// Parse a template with default limits
    ///
    /// @param source - Template source
    #[wasm_bindgen(constructor)]
    pub fn new(source: &str) -> Result<LiquidTemplate, JsValue> {
        let inner = Template::parse(source).map_err(to_js_error)?;
        Ok(LiquidTemplate { inner })
    }

    /// Parse a template with explicit limits
    ///
    /// @param source - Template source
    /// @param options - `{ maxIterations, maxNestingDepth }`, all optional
    #[wasm_bindgen(js_name = withOptions)]
    pub fn with_options(source: &str, options: JsValue) -> Result<LiquidTemplate, JsValue> {
        let options = parse_options(options)?;
        let inner = Template::parse_with(source, options).map_err(to_js_error)?;
        Ok(LiquidTemplate { inner })
    }

    /// Render against a JavaScript value
    ///
    /// @param data - Any JSON-compatible value
    /// @returns Rendered text
    pub fn render(&self, data: JsValue) -> Result<String, JsValue> {
        let data: serde_json::Value = serde_wasm_bindgen::from_value(data)?;
        self.inner.render(&data).map_err(to_js_error)
    }

    /// Render against JSON text
    ///
    /// @param jsonData - JSON document text
    /// @returns Rendered text
    #[wasm_bindgen(js_name = renderJson)]
    pub fn render_json(&self, json_data: &str) -> Result<String, JsValue> {
        let data = liquido::parse_document(json_data).map_err(to_js_error)?;
        self.inner.render(&data).map_err(to_js_error)
    }
}

fn parse_options(options: JsValue) -> Result<RenderOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        return Ok(RenderOptions::default());
    }
    Ok(serde_wasm_bindgen::from_value(options)?)
}

fn to_js(outcome: &RenderOutcome) -> Result<JsValue, JsValue> {
    Ok(serde_wasm_bindgen::to_value(outcome)?)
}

fn to_js_error(err: liquido::TemplateError) -> JsValue {
    JsValue::from_str(&err.to_string())
}
