/// Placeholder substitution for rendered expressions
///
/// Attribute names become `#aaa`, `#aab`, ... over the sorted union of the
/// names every expression references. Values become `:aaa`, `:aab`, ... in
/// input column order, one per data column an expression needs. A list or
/// set value used by a filter or condition expands to `:aaa___0, :aaa___1`.

use crate::transport::{AttributeNames, AttributeValues};
use dquery_core::expression::{value_key, AnyExpression, Expression};
use dquery_core::utils::{format_template, AsciiStringGenerator};
use dquery_core::{json, Error, Record, Result, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

const LIST_INDEX_SEPARATOR: &str = "___";

/// Request parameter an expression is sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExpressionName {
    KeyCondition,
    Filter,
    Condition,
    Update,
    Projection,
}

impl ExpressionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpressionName::KeyCondition => "KeyConditionExpression",
            ExpressionName::Filter => "FilterExpression",
            ExpressionName::Condition => "ConditionExpression",
            ExpressionName::Update => "UpdateExpression",
            ExpressionName::Projection => "ProjectionExpression",
        }
    }

    /// Whether list values are spread into one placeholder per element.
    pub fn expands_lists(&self) -> bool {
        matches!(self, ExpressionName::Filter | ExpressionName::Condition)
    }
}

impl fmt::Display for ExpressionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type ExpressionMap = BTreeMap<ExpressionName, AnyExpression>;

/// Rendered expressions with their substitution maps.
#[derive(Debug, Clone, Default)]
pub struct FormattedRequest {
    pub expressions: BTreeMap<ExpressionName, String>,
    pub names: AttributeNames,
    pub values: AttributeValues,
}

impl FormattedRequest {
    pub fn get(&self, name: ExpressionName) -> Option<String> {
        self.expressions.get(&name).cloned()
    }
}

fn next_name(names: &mut AsciiStringGenerator) -> Result<String> {
    names
        .next()
        .ok_or_else(|| Error::query("Ran out of placeholder names"))
}

fn is_list_like(value: &Value) -> bool {
    matches!(value, Value::L(_)) || value.is_set()
}

/// `#name` placeholder -> attribute name, over all expressions.
pub fn get_projection_dict(expressions: &ExpressionMap) -> Result<BTreeMap<String, String>> {
    let keys: BTreeSet<String> = expressions
        .values()
        .flat_map(|e| e.get_format_keys())
        .collect();
    let mut names = AsciiStringGenerator::default();
    let mut result = BTreeMap::new();
    for key in keys {
        result.insert(format!("#{}", next_name(&mut names)?), key);
    }
    Ok(result)
}

/// Template key -> placeholder text for every name and needed value.
pub fn get_format_dict(
    projection: &BTreeMap<String, String>,
    expressions: &ExpressionMap,
    data: &Record,
) -> Result<HashMap<String, String>> {
    let mut result: HashMap<String, String> = projection
        .iter()
        .map(|(placeholder, key)| (key.clone(), placeholder.clone()))
        .collect();

    let format_values: Vec<(ExpressionName, BTreeSet<String>)> = expressions
        .iter()
        .map(|(name, e)| (*name, e.get_format_values()))
        .collect();

    let mut names = AsciiStringGenerator::default();
    for (key, value) in data.iter() {
        let users: Vec<ExpressionName> = format_values
            .iter()
            .filter(|(_, values)| values.contains(key))
            .map(|(name, _)| *name)
            .collect();
        if users.is_empty() {
            continue;
        }

        let name = next_name(&mut names)?;
        let expand = users.iter().any(ExpressionName::expands_lists) && is_list_like(value);
        let placeholder = if expand {
            let count = value.elements().map(|e| e.len()).unwrap_or(0);
            if count == 0 {
                return Err(Error::query_with_data(
                    format!("Column \"{}\" has an empty list value, IN needs at least one", key),
                    serde_json::json!({ "column": key }),
                ));
            }
            (0..count)
                .map(|i| format!(":{}{}{}", name, LIST_INDEX_SEPARATOR, i))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            format!(":{}", name)
        };
        result.insert(value_key(key), placeholder);
    }
    Ok(result)
}

/// `:value` placeholder -> literal, read from the same data.
pub fn get_expression_attribute_values(
    format_dict: &HashMap<String, String>,
    data: &Record,
) -> Result<AttributeValues> {
    let mut result = AttributeValues::new();
    for (key, value) in data.iter() {
        let Some(placeholders) = format_dict.get(&value_key(key)) else {
            continue;
        };
        for placeholder in placeholders.split(", ").filter(|p| p.starts_with(':')) {
            match placeholder.split_once(LIST_INDEX_SEPARATOR) {
                Some((_, index)) => {
                    let element = index
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| value.elements().and_then(|e| e.get(i).cloned()))
                        .ok_or_else(|| {
                            Error::query(format!(
                                "Placeholder {} does not match the value of \"{}\"",
                                placeholder, key
                            ))
                        })?;
                    result.insert(placeholder.to_string(), element);
                }
                None => {
                    result.insert(placeholder.to_string(), value.clone());
                }
            }
        }
    }
    Ok(result)
}

/// Substitutes placeholders into every rendered expression.
pub fn format_expressions(
    expressions: &ExpressionMap,
    format_dict: &HashMap<String, String>,
) -> Result<BTreeMap<ExpressionName, String>> {
    expressions
        .iter()
        .map(|(name, expression)| {
            let rendered = format_template(&expression.render(), format_dict)
                .map_err(|e| Error::query(format!("Cannot format {}: {}", name, e)))?;
            Ok((*name, rendered))
        })
        .collect()
}

/// Builds the rendered expressions and both substitution maps for `data`.
pub fn build_request(expressions: &ExpressionMap, data: &Record) -> Result<FormattedRequest> {
    let projection = get_projection_dict(expressions)?;
    let format_dict = get_format_dict(&projection, expressions, data)?;
    let values = get_expression_attribute_values(&format_dict, data)?;
    let rendered = format_expressions(expressions, &format_dict)?;

    for (name, expression) in &rendered {
        debug!(
            expression = %name,
            rendered = %expression,
            values = %describe_values(&values),
            "Formatted expression"
        );
    }

    Ok(FormattedRequest {
        expressions: rendered,
        names: projection.into_iter().collect(),
        values,
    })
}

/// Sorted JSON view of the value map, for logs.
pub fn describe_values(values: &AttributeValues) -> String {
    json::dumps(&Record::from(values.clone())).unwrap_or_default()
}
