//! Variable scoping for a single render
//!
//! A stack of frames over the root document. Lookups go innermost frame
//! first, then the reserved `model` binding, then the root document's
//! top-level keys. The root document is borrowed, never copied into a frame.

use std::collections::HashMap;

use serde_json::Value;

/// Name always bound to the whole root document
pub const MODEL: &str = "model";

#[derive(Debug)]
pub struct Scope<'d> {
    root: &'d Value,
    frames: Vec<HashMap<String, Value>>,
}

impl<'d> Scope<'d> {
    /// Scope with a single (root) frame over `root`
    ///
    /// If `root` is an object, each top-level key resolves as a variable, and
    /// `model` resolves to the whole document either way. When the document has
    /// its own `model` key, `model` still means the whole document; the key
    /// stays reachable as `model.model`.
    pub fn new(root: &'d Value) -> Self {
        Self {
            root,
            frames: vec![HashMap::new()],
        }
    }

    /// Resolve a variable name
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.frames.iter().rev().find_map(|frame| frame.get(name)) {
            return Some(value);
        }
        if name == MODEL {
            return Some(self.root);
        }
        self.root.as_object().and_then(|map| map.get(name))
    }

    /// Bind `name` in the innermost frame, shadowing outer bindings
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pop the innermost frame; the root frame is never popped
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Number of frames, including the root frame
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
