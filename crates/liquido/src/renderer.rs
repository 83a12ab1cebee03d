//! AST rendering
//!
//! Walks the node list in order, appending to a single output buffer. Loops
//! push a scope frame per iteration; `if` and `capture` bodies render in the
//! enclosing frame. Any error aborts the render and the partial buffer is
//! dropped.

use serde_json::{json, Value};

use crate::ast::{AstNode, Branch, Expression, ForLoop};
use crate::eval::Evaluator;
use crate::scope::Scope;
use crate::value::{as_integer, value_to_string};
use crate::{RenderOptions, Result, TemplateError};

/// Render parsed nodes against a root value with default options
pub fn render(nodes: &[AstNode], root: &Value) -> Result<String> {
    Renderer::new(&RenderOptions::default()).render(nodes, root)
}

/// Template renderer
///
/// Counts loop iterations across the whole render, so nested loops share one
/// budget.
#[derive(Debug)]
pub struct Renderer {
    evaluator: Evaluator,
    max_iterations: usize,
    iterations: usize,
}

impl Renderer {
    pub fn new(options: &RenderOptions) -> Self {
        Self {
            evaluator: Evaluator::new(options),
            max_iterations: options.max_iterations,
            iterations: 0,
        }
    }

    /// Render `nodes` with `root` as the data document
    #[tracing::instrument(level = "debug", skip_all, fields(nodes = nodes.len()))]
    pub fn render(&mut self, nodes: &[AstNode], root: &Value) -> Result<String> {
        self.iterations = 0;
        let mut scope = Scope::new(root);
        let mut output = String::new();
        self.render_nodes(nodes, &mut scope, &mut output)?;
        tracing::debug!(
            bytes = output.len(),
            iterations = self.iterations,
            "rendered template"
        );
        Ok(output)
    }

    /// Loop iterations spent by the last render
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn render_nodes(&mut self, nodes: &[AstNode], scope: &mut Scope<'_>, output: &mut String) -> Result<()> {
        for node in nodes {
            self.render_node(node, scope, output)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &AstNode, scope: &mut Scope<'_>, output: &mut String) -> Result<()> {
        match node {
            AstNode::TextLiteral(text) => output.push_str(text),
            AstNode::Output { expression, .. } => {
                let value = self.evaluator.evaluate(expression, scope)?;
                output.push_str(&value_to_string(&value));
            }
            AstNode::If {
                condition,
                then_branch,
                alternatives,
                else_branch,
                ..
            } => {
                let branch = self.taken_branch(condition, then_branch, alternatives, scope)?;
                self.render_nodes(branch.unwrap_or(else_branch.as_slice()), scope, output)?;
            }
            AstNode::Assign {
                name, expression, ..
            } => {
                let value = self.evaluator.evaluate(expression, scope)?;
                scope.set(name.as_str(), value);
            }
            AstNode::Capture { name, body, .. } => {
                let mut captured = String::new();
                self.render_nodes(body, scope, &mut captured)?;
                scope.set(name.as_str(), Value::String(captured));
            }
            AstNode::ForLoop(for_loop) => self.render_for(for_loop, scope, output)?,
        }
        Ok(())
    }

    /// Body of the first arm whose condition holds
    fn taken_branch<'n>(
        &self,
        condition: &Expression,
        then_branch: &'n [AstNode],
        alternatives: &'n [Branch],
        scope: &Scope<'_>,
    ) -> Result<Option<&'n [AstNode]>> {
        if self.evaluator.is_truthy(condition, scope)? {
            return Ok(Some(then_branch));
        }
        for branch in alternatives {
            if self.evaluator.is_truthy(&branch.condition, scope)? {
                return Ok(Some(&branch.body));
            }
        }
        Ok(None)
    }

    fn render_for(&mut self, for_loop: &ForLoop, scope: &mut Scope<'_>, output: &mut String) -> Result<()> {
        let items = self.loop_items(for_loop, scope)?;
        if items.is_empty() {
            return self.render_nodes(&for_loop.else_body, scope, output);
        }

        let length = items.len();
        for (index, item) in items.into_iter().enumerate() {
            self.iterations += 1;
            if self.iterations > self.max_iterations {
                tracing::debug!(limit = self.max_iterations, position = %for_loop.position, "iteration limit hit");
                return Err(TemplateError::IterationLimitExceeded {
                    limit: self.max_iterations,
                    position: for_loop.position,
                });
            }

            scope.push();
            // a loop variable named `forloop` shadows the loop object
            scope.set("forloop", forloop_object(index, length));
            scope.set(for_loop.variable.as_str(), item);
            let result = self.render_nodes(&for_loop.body, scope, output);
            scope.pop();
            result?;
        }
        Ok(())
    }

    /// Elements to iterate, after `offset`, `limit` and `reversed`
    fn loop_items(&self, for_loop: &ForLoop, scope: &Scope<'_>) -> Result<Vec<Value>> {
        let mut items = match self.evaluator.evaluate(&for_loop.iterable, scope)? {
            Value::Array(items) => items,
            Value::Object(map) => map
                .into_iter()
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect(),
            _ => Vec::new(),
        };

        if let Some(offset) = &for_loop.offset {
            let offset = self.count(offset, scope)?.min(items.len());
            items.drain(..offset);
        }
        if let Some(limit) = &for_loop.limit {
            let limit = self.count(limit, scope)?;
            items.truncate(limit);
        }
        if for_loop.reversed {
            items.reverse();
        }
        Ok(items)
    }

    /// Non-negative count from a loop parameter; anything else is `0`
    fn count(&self, expression: &Expression, scope: &Scope<'_>) -> Result<usize> {
        let value = self.evaluator.evaluate(expression, scope)?;
        Ok(as_integer(&value)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0))
    }
}

fn forloop_object(index: usize, length: usize) -> Value {
    json!({
        "index": index + 1,
        "index0": index,
        "rindex": length - index,
        "rindex0": length - index - 1,
        "first": index == 0,
        "last": index + 1 == length,
        "length": length,
    })
}
