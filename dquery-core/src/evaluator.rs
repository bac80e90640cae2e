//! Evaluation of parsed expressions against stored items.
//!
//! ```
//! use dquery_core::evaluator::{ExpressionContext, ExpressionEvaluator};
//! use dquery_core::parser::ExpressionParser;
//! use dquery_core::{record, Value};
//!
//! let item = record! { "age" => 30 };
//! let context = ExpressionContext::new()
//!     .with_name("#aaa", "age")
//!     .with_value(":aaa", Value::from(18));
//! let expr = ExpressionParser::parse("#aaa > :aaa").unwrap();
//! assert!(ExpressionEvaluator::new(&item, &context).evaluate(&expr).unwrap());
//! ```

use crate::parser::{AttributePath, Expr, UpdateAction, UpdateValue};
use crate::{Error, Record, Result, Value};
use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Expression context with attribute values and names
#[derive(Debug, Clone, Default)]
pub struct ExpressionContext {
    /// Expression attribute values (:value1 -> Value)
    pub values: HashMap<String, Value>,
    /// Expression attribute names (#name -> actual_name)
    pub names: HashMap<String, String>,
}

impl ExpressionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_maps(names: HashMap<String, String>, values: HashMap<String, Value>) -> Self {
        Self { values, names }
    }

    pub fn with_value(mut self, placeholder: impl Into<String>, value: Value) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }

    pub fn with_name(mut self, placeholder: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), name.into());
        self
    }

    /// Attribute names for each path segment, resolving `#name` placeholders.
    pub fn resolve_path(&self, path: &AttributePath) -> Result<Vec<String>> {
        path.segments()
            .iter()
            .map(|segment| {
                if segment.starts_with('#') {
                    self.names.get(segment).cloned().ok_or_else(|| {
                        Error::InvalidExpression(format!(
                            "Name placeholder {} is not defined",
                            segment
                        ))
                    })
                } else {
                    Ok(segment.clone())
                }
            })
            .collect()
    }

    pub fn value(&self, placeholder: &str) -> Result<&Value> {
        self.values.get(placeholder).ok_or_else(|| {
            Error::InvalidExpression(format!("Value placeholder {} is not defined", placeholder))
        })
    }
}

/// Looks up a nested attribute.
pub fn lookup<'a>(item: &'a Record, path: &[String]) -> Option<&'a Value> {
    crate::utils::get_nested_item(item, path)
}

/// Condition evaluator
///
/// A comparison that touches a missing attribute or mismatched types is
/// false rather than an error.
pub struct ExpressionEvaluator<'a> {
    item: &'a Record,
    context: &'a ExpressionContext,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(item: &'a Record, context: &'a ExpressionContext) -> Self {
        Self { item, context }
    }

    /// Evaluate expression against item
    pub fn evaluate(&self, expr: &Expr) -> Result<bool> {
        match expr {
            Expr::Equal(left, right) => self.compare(left, right, |l, r| l.loose_eq(r)),
            Expr::NotEqual(left, right) => {
                let l = self.resolve_value(left)?;
                let r = self.resolve_value(right)?;
                Ok(match (l, r) {
                    (Some(l), Some(r)) => !l.loose_eq(&r),
                    (None, None) => false,
                    _ => true,
                })
            }
            Expr::LessThan(left, right) => self.ordered(left, right, Ordering::is_lt),
            Expr::LessThanOrEqual(left, right) => self.ordered(left, right, Ordering::is_le),
            Expr::GreaterThan(left, right) => self.ordered(left, right, Ordering::is_gt),
            Expr::GreaterThanOrEqual(left, right) => self.ordered(left, right, Ordering::is_ge),
            Expr::Between(operand, low, high) => {
                Ok(self.ordered(operand, low, Ordering::is_ge)?
                    && self.ordered(operand, high, Ordering::is_le)?)
            }
            Expr::In(operand, candidates) => {
                let Some(value) = self.resolve_value(operand)? else {
                    return Ok(false);
                };
                for candidate in candidates {
                    if let Some(c) = self.resolve_value(candidate)? {
                        if value.loose_eq(&c) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            Expr::And(left, right) => Ok(self.evaluate(left)? && self.evaluate(right)?),
            Expr::Or(left, right) => Ok(self.evaluate(left)? || self.evaluate(right)?),
            Expr::Not(expr) => Ok(!self.evaluate(expr)?),
            Expr::AttributeExists(path) => {
                let path = self.context.resolve_path(path)?;
                Ok(lookup(self.item, &path).is_some())
            }
            Expr::AttributeNotExists(path) => {
                let path = self.context.resolve_path(path)?;
                Ok(lookup(self.item, &path).is_none())
            }
            Expr::BeginsWith(path_expr, prefix_expr) => {
                self.compare(path_expr, prefix_expr, |value, prefix| match (value, prefix) {
                    (Value::S(s), Value::S(prefix)) => s.starts_with(prefix.as_str()),
                    (Value::B(b), Value::B(prefix)) => b.starts_with(prefix.as_ref()),
                    _ => false,
                })
            }
            Expr::Contains(path_expr, operand) => {
                self.compare(path_expr, operand, |value, needle| value.contains(needle))
            }
            Expr::Path(_) | Expr::ValuePlaceholder(_) | Expr::Literal(_) => Err(
                Error::InvalidExpression("Cannot evaluate operand as boolean expression".into()),
            ),
        }
    }

    fn compare<F>(&self, left: &Expr, right: &Expr, predicate: F) -> Result<bool>
    where
        F: Fn(&Value, &Value) -> bool,
    {
        let l = self.resolve_value(left)?;
        let r = self.resolve_value(right)?;
        Ok(match (l, r) {
            (Some(l), Some(r)) => predicate(&l, &r),
            _ => false,
        })
    }

    fn ordered<F>(&self, left: &Expr, right: &Expr, accept: F) -> Result<bool>
    where
        F: Fn(Ordering) -> bool,
    {
        self.compare(left, right, |l, r| l.compare(r).map(&accept).unwrap_or(false))
    }

    /// Resolve an operand; a missing attribute is `None`.
    fn resolve_value(&self, expr: &Expr) -> Result<Option<Value>> {
        match expr {
            Expr::Path(path) => {
                let path = self.context.resolve_path(path)?;
                Ok(lookup(self.item, &path).cloned())
            }
            Expr::ValuePlaceholder(placeholder) => {
                Ok(Some(self.context.value(placeholder)?.clone()))
            }
            Expr::Literal(value) => Ok(Some(value.clone())),
            _ => Err(Error::InvalidExpression(
                "Cannot resolve non-value expression to value".into(),
            )),
        }
    }
}

/// Update executor
pub struct UpdateExecutor<'a> {
    context: &'a ExpressionContext,
}

impl<'a> UpdateExecutor<'a> {
    pub fn new(context: &'a ExpressionContext) -> Self {
        Self { context }
    }

    /// Execute update actions on an item
    pub fn execute(&self, item: &Record, actions: &[UpdateAction]) -> Result<Record> {
        let mut result = item.clone();

        for action in actions {
            match action {
                UpdateAction::Set(path, value) => {
                    let path = self.context.resolve_path(path)?;
                    let value = self.resolve_update_value(value, item)?;
                    set_path(&mut result, &path, value)?;
                }
                UpdateAction::Remove(path) => {
                    let path = self.context.resolve_path(path)?;
                    remove_path(&mut result, &path);
                }
                UpdateAction::Add(path, value) => {
                    let path = self.context.resolve_path(path)?;
                    let value = self.resolve_update_value(value, item)?;
                    let merged = match lookup(&result, &path) {
                        None => value,
                        Some(existing) => add_values(existing, &value)?,
                    };
                    set_path(&mut result, &path, merged)?;
                }
                UpdateAction::Delete(path, value) => {
                    let path = self.context.resolve_path(path)?;
                    let value = self.resolve_update_value(value, item)?;
                    if let Some(existing) = lookup(&result, &path) {
                        match subtract_set(existing, &value)? {
                            Some(remaining) => set_path(&mut result, &path, remaining)?,
                            None => remove_path(&mut result, &path),
                        }
                    }
                }
            }
        }

        Ok(result)
    }

    /// Operands read the item as it was before the update.
    fn resolve_update_value(&self, value: &UpdateValue, item: &Record) -> Result<Value> {
        match value {
            UpdateValue::Placeholder(placeholder) => Ok(self.context.value(placeholder)?.clone()),
            UpdateValue::Path(path) => {
                let path = self.context.resolve_path(path)?;
                lookup(item, &path).cloned().ok_or_else(|| {
                    Error::InvalidExpression(format!(
                        "Attribute {} not found",
                        path.join(".")
                    ))
                })
            }
            UpdateValue::IfNotExists(path, fallback) => {
                let resolved = self.context.resolve_path(path)?;
                match lookup(item, &resolved) {
                    Some(existing) => Ok(existing.clone()),
                    None => self.resolve_update_value(fallback, item),
                }
            }
            UpdateValue::Add(left, right) => {
                let l = self.resolve_update_value(left, item)?;
                let r = self.resolve_update_value(right, item)?;
                numeric(&l, &r, false)
            }
            UpdateValue::Sub(left, right) => {
                let l = self.resolve_update_value(left, item)?;
                let r = self.resolve_update_value(right, item)?;
                numeric(&l, &r, true)
            }
        }
    }
}

/// Keeps only the projected paths, preserving nesting.
pub fn project(item: &Record, paths: &[Vec<String>]) -> Record {
    let mut result = Record::new();
    for path in paths {
        if let Some(value) = lookup(item, path) {
            insert_creating(&mut result, path, value.clone());
        }
    }
    result
}

fn insert_creating(record: &mut Record, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        record.insert(first.clone(), value);
        return;
    }
    if !matches!(record.get(first), Some(Value::M(_))) {
        record.insert(first.clone(), Value::M(HashMap::new()));
    }
    if let Some(Value::M(map)) = record.get_mut(first) {
        insert_into_map(map, rest, value);
    }
}

fn insert_into_map(map: &mut HashMap<String, Value>, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.clone(), value);
        return;
    }
    let entry = map
        .entry(first.clone())
        .or_insert_with(|| Value::M(HashMap::new()));
    if !matches!(entry, Value::M(_)) {
        *entry = Value::M(HashMap::new());
    }
    if let Value::M(inner) = entry {
        insert_into_map(inner, rest, value);
    }
}

fn invalid_path(path: &[String]) -> Error {
    Error::InvalidExpression(format!(
        "The document path {} is invalid for update",
        path.join(".")
    ))
}

/// Sets a nested attribute; parent maps must already exist.
fn set_path(item: &mut Record, path: &[String], value: Value) -> Result<()> {
    let (first, rest) = path.split_first().ok_or_else(|| invalid_path(path))?;
    if rest.is_empty() {
        item.insert(first.clone(), value);
        return Ok(());
    }
    match item.get_mut(first) {
        Some(Value::M(map)) => set_in_map(map, rest, value, path),
        _ => Err(invalid_path(path)),
    }
}

fn set_in_map(
    map: &mut HashMap<String, Value>,
    rest: &[String],
    value: Value,
    full_path: &[String],
) -> Result<()> {
    let (first, rest) = rest.split_first().ok_or_else(|| invalid_path(full_path))?;
    if rest.is_empty() {
        map.insert(first.clone(), value);
        return Ok(());
    }
    match map.get_mut(first) {
        Some(Value::M(inner)) => set_in_map(inner, rest, value, full_path),
        _ => Err(invalid_path(full_path)),
    }
}

fn remove_path(item: &mut Record, path: &[String]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        item.remove(first);
    } else if let Some(Value::M(map)) = item.get_mut(first) {
        remove_in_map(map, rest);
    }
}

fn remove_in_map(map: &mut HashMap<String, Value>, path: &[String]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.remove(first);
    } else if let Some(Value::M(inner)) = map.get_mut(first) {
        remove_in_map(inner, rest);
    }
}

fn numeric(left: &Value, right: &Value, subtract: bool) -> Result<Value> {
    let (Value::N(l), Value::N(r)) = (left, right) else {
        return Err(Error::InvalidExpression(
            "Arithmetic requires number operands".into(),
        ));
    };
    if let (Ok(l), Ok(r)) = (l.parse::<i128>(), r.parse::<i128>()) {
        let result = if subtract { l.checked_sub(r) } else { l.checked_add(r) };
        if let Some(result) = result {
            return Ok(Value::N(result.to_string()));
        }
    }
    let parse = |n: &str| {
        n.parse::<f64>()
            .map_err(|_| Error::InvalidExpression(format!("Invalid number {}", n)))
    };
    let (l, r) = (parse(l)?, parse(r)?);
    Ok(Value::number(if subtract { l - r } else { l + r }))
}

fn union<T: Clone + PartialEq>(existing: &[T], added: &[T]) -> Vec<T> {
    let mut result = existing.to_vec();
    for item in added {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    result
}

fn difference<T: Clone + PartialEq>(existing: &[T], removed: &[T]) -> Vec<T> {
    existing
        .iter()
        .filter(|item| !removed.contains(item))
        .cloned()
        .collect()
}

/// ADD semantics: number increment or set union.
fn add_values(existing: &Value, value: &Value) -> Result<Value> {
    match (existing, value) {
        (Value::N(_), Value::N(_)) => numeric(existing, value, false),
        (Value::SS(a), Value::SS(b)) => Ok(Value::SS(union(a, b))),
        (Value::NS(a), Value::NS(b)) => Ok(Value::NS(union(a, b))),
        (Value::BS(a), Value::BS(b)) => Ok(Value::BS(union::<Bytes>(a, b))),
        _ => Err(Error::InvalidExpression(format!(
            "ADD cannot combine {} with {}",
            existing.type_name(),
            value.type_name()
        ))),
    }
}

/// DELETE semantics: set difference; `None` when the set becomes empty.
fn subtract_set(existing: &Value, value: &Value) -> Result<Option<Value>> {
    let remaining = match (existing, value) {
        (Value::SS(a), Value::SS(b)) => Value::SS(difference(a, b)),
        (Value::NS(a), Value::NS(b)) => Value::NS(difference(a, b)),
        (Value::BS(a), Value::BS(b)) => Value::BS(difference(a, b)),
        _ => {
            return Err(Error::InvalidExpression(format!(
                "DELETE cannot remove {} from {}",
                value.type_name(),
                existing.type_name()
            )))
        }
    };
    let empty = match &remaining {
        Value::SS(v) | Value::NS(v) => v.is_empty(),
        Value::BS(v) => v.is_empty(),
        _ => false,
    };
    Ok(if empty { None } else { Some(remaining) })
}
