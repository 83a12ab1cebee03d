//! Expression evaluation
//!
//! Evaluation is forgiving about data: a path that runs off the document, an
//! out-of-range index or a step through a scalar all yield `nil`. The only
//! errors are an unknown filter name and a range longer than the iteration
//! limit. Templates from [`parse_template`](crate::parse_template) never
//! reach the first one; it guards trees built by hand.

use std::borrow::Cow;

use serde_json::Value;

use crate::ast::{BinaryOp, Expression, FilterCall, PathSegment};
use crate::filters::FilterRegistry;
use crate::lexer::Position;
use crate::scope::Scope;
use crate::value::{as_integer, compare, get_member, is_truthy, Key};
use crate::{RenderOptions, Result, TemplateError};

#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    filters: &'static FilterRegistry,
    max_iterations: usize,
}

impl Evaluator {
    pub fn new(options: &RenderOptions) -> Self {
        Self {
            filters: FilterRegistry::global(),
            max_iterations: options.max_iterations,
        }
    }

    /// Evaluate an expression against the current scope
    pub fn evaluate(&self, expression: &Expression, scope: &Scope<'_>) -> Result<Value> {
        match expression {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::VariableRef(path) => Ok(self
                .resolve(path, scope)?
                .map(Cow::into_owned)
                .unwrap_or(Value::Null)),
            Expression::FilterChain { base, filters } => {
                let mut value = self.evaluate(base, scope)?;
                for call in filters {
                    value = self.apply_filter(call, &value, scope)?;
                }
                Ok(value)
            }
            Expression::BinaryOp { op, left, right } => {
                let left = self.evaluate(left, scope)?;
                let result = match op {
                    BinaryOp::And => is_truthy(&left) && is_truthy(&self.evaluate(right, scope)?),
                    BinaryOp::Or => is_truthy(&left) || is_truthy(&self.evaluate(right, scope)?),
                    op => compare(*op, &left, &self.evaluate(right, scope)?),
                };
                Ok(Value::Bool(result))
            }
            Expression::Not(inner) => Ok(Value::Bool(!is_truthy(&self.evaluate(inner, scope)?))),
            Expression::Range {
                start,
                end,
                position,
            } => self.range(start, end, *position, scope),
        }
    }

    /// Evaluate a condition to a boolean
    pub fn is_truthy(&self, expression: &Expression, scope: &Scope<'_>) -> Result<bool> {
        Ok(is_truthy(&self.evaluate(expression, scope)?))
    }

    fn apply_filter(&self, call: &FilterCall, input: &Value, scope: &Scope<'_>) -> Result<Value> {
        let filter = self
            .filters
            .get(&call.name)
            .ok_or_else(|| TemplateError::UnknownFilter {
                name: call.name.clone(),
                position: call.position,
            })?;
        let args = call
            .args
            .iter()
            .map(|arg| self.evaluate(arg, scope))
            .collect::<Result<Vec<_>>>()?;
        tracing::trace!(filter = %call.name, args = args.len(), "applying filter");
        Ok(filter(input, &args))
    }

    /// Walk a variable path; `None` as soon as a step finds nothing
    fn resolve<'s>(&self, path: &[PathSegment], scope: &'s Scope<'_>) -> Result<Option<Cow<'s, Value>>> {
        let Some((PathSegment::Field(name), rest)) = path.split_first() else {
            return Ok(None);
        };
        let Some(root) = scope.get(name) else {
            return Ok(None);
        };

        let mut current = Cow::Borrowed(root);
        for segment in rest {
            let key = match segment {
                PathSegment::Field(name) => Key::Name(Cow::Borrowed(name.as_str())),
                PathSegment::Index(index) => Key::Index(*index),
                PathSegment::Lookup(expression) => match self.evaluate(expression, scope)? {
                    Value::String(name) => Key::Name(Cow::Owned(name)),
                    Value::Number(n) => match n.as_i64() {
                        Some(index) => Key::Index(index),
                        None => return Ok(None),
                    },
                    _ => return Ok(None),
                },
            };
            let next = match &current {
                Cow::Borrowed(value) => get_member(*value, &key),
                Cow::Owned(value) => get_member(value, &key).map(|member| Cow::Owned(member.into_owned())),
            };
            match next {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Inclusive integer range; non-numeric bounds count as `0`
    fn range(
        &self,
        start: &Expression,
        end: &Expression,
        position: Position,
        scope: &Scope<'_>,
    ) -> Result<Value> {
        let start = as_integer(&self.evaluate(start, scope)?).unwrap_or(0);
        let end = as_integer(&self.evaluate(end, scope)?).unwrap_or(0);
        if end < start {
            return Ok(Value::Array(Vec::new()));
        }
        let len = (i128::from(end) - i128::from(start) + 1) as u128;
        if len > self.max_iterations as u128 {
            return Err(TemplateError::IterationLimitExceeded {
                limit: self.max_iterations,
                position,
            });
        }
        Ok(Value::Array((start..=end).map(Value::from).collect()))
    }
}
