//! Expression grammar for DynamoDB-style requests
//!
//! Expressions render to placeholder templates: attribute names appear as
//! `{key}` and attribute values as `{key__value}`. Literal values are never
//! embedded; the query layer substitutes `#name` / `:value` placeholders
//! from the input row when it builds a request.
//!
//! Supports:
//! - **Condition expressions**: comparisons, `IN`, `BETWEEN`, functions,
//!   composed with `&` / `|` (or [`Condition::and`] / [`Condition::or`])
//! - **Projection expressions**: a sorted set of attribute names
//! - **Update expressions**: `SET`, `SET if_not_exists`, `ADD`, `DELETE`, `REMOVE`
//! - **Raw expressions**: pre-rendered templates passed through unchanged
//!
//! # Examples
//!
//! ```
//! use dquery_core::expression::{ConditionExpression, Expression, UpdateExpression};
//!
//! let filter = ConditionExpression::new("name") & ConditionExpression::gt("age", "min_age");
//! assert_eq!(filter.render(), "{name} = {name__value} AND {age} > {min_age__value}");
//!
//! let update = UpdateExpression::new().set(["email"]).remove(["temp"]);
//! assert_eq!(update.render(), "SET {email} = {email__value} REMOVE {temp}");
//! ```

use crate::{Error, Record, Result, Value};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;
use std::sync::OnceLock;

/// Suffix that marks a value placeholder in a template.
pub const VALUE_KEY_POSTFIX: &str = "__value";

/// Attribute-name template for a possibly nested key: `a.b` -> `{a}.{b}`.
pub fn render_key(key: &str) -> String {
    key.split('.')
        .map(|part| format!("{{{}}}", part))
        .collect::<Vec<_>>()
        .join(".")
}

/// Value placeholder name for a data column: `a.b` -> `a.b__value`.
///
/// The column name is kept verbatim so distinct columns never share a
/// placeholder; templates are substituted by exact key lookup.
pub fn value_key(column: &str) -> String {
    format!("{}{}", column, VALUE_KEY_POSTFIX)
}

fn render_value(column: &str) -> String {
    format!("{{{}}}", value_key(column))
}

fn key_parts(key: &str) -> impl Iterator<Item = String> + '_ {
    key.split('.').map(str::to_string)
}

/// Comparison operators and functions usable in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Eq,
    Ne,
    In,
    Gt,
    Lt,
    Gte,
    Lte,
    BeginsWith,
    AttributeExists,
    AttributeNotExists,
    Between,
    Contains,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Eq,
        Operator::Ne,
        Operator::In,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
        Operator::BeginsWith,
        Operator::AttributeExists,
        Operator::AttributeNotExists,
        Operator::Between,
        Operator::Contains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::In => "IN",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::BeginsWith => "begins_with",
            Operator::AttributeExists => "attribute_exists",
            Operator::AttributeNotExists => "attribute_not_exists",
            Operator::Between => "BETWEEN",
            Operator::Contains => "contains",
        }
    }

    /// Operators allowed in a key condition.
    pub fn is_key_operator(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::Lt
                | Operator::Gt
                | Operator::Lte
                | Operator::Gte
                | Operator::Between
                | Operator::BeginsWith
        )
    }

    pub fn takes_value(&self) -> bool {
        !matches!(self, Operator::AttributeExists | Operator::AttributeNotExists)
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operator::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let choices: Vec<&str> = Operator::ALL.iter().map(Operator::as_str).collect();
                Error::Expression(format!(
                    "Invalid operator {}, choices are {}",
                    s,
                    choices.join(", ")
                ))
            })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean join between conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Join {
    And,
    Or,
}

impl Join {
    pub fn as_str(&self) -> &'static str {
        match self {
            Join::And => "AND",
            Join::Or => "OR",
        }
    }
}

/// Common capability of every expression kind.
pub trait Expression {
    /// Placeholder template. Pure and deterministic.
    fn render(&self) -> String;

    /// Attribute names referenced as `{key}`.
    fn get_format_keys(&self) -> BTreeSet<String>;

    /// Data columns whose values must be supplied.
    fn get_format_values(&self) -> BTreeSet<String>;

    fn get_operators(&self) -> BTreeSet<Operator> {
        BTreeSet::new()
    }

    /// Checks that `data` fits this expression before any request is sent.
    fn validate_input_data(&self, _data: &Record) -> Result<()> {
        Ok(())
    }

    /// Fails when the expression renders to nothing.
    fn ensure_not_empty(&self) -> Result<()> {
        if self.render().trim().is_empty() {
            return Err(Error::Expression("Expression cannot be empty".into()));
        }
        Ok(())
    }
}

macro_rules! display_as_render {
    ($($t:ty),*) => {
        $(
            impl fmt::Display for $t {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.render())
                }
            }
        )*
    };
}

fn placeholder_regex() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{([^{}]+)\}").ok())
        .as_ref()
}

/// Pre-rendered template, used as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExpression {
    data: String,
}

impl RawExpression {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            data: template.into(),
        }
    }

    fn placeholders(&self) -> Vec<&str> {
        placeholder_regex()
            .map(|re| {
                re.captures_iter(&self.data)
                    .filter_map(|c| c.get(1).map(|m| m.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn and(self, other: RawExpression) -> RawExpression {
        RawExpression::new(format!("{} AND {}", self.data, other.data))
    }

    pub fn or(self, other: RawExpression) -> RawExpression {
        RawExpression::new(format!("{} OR {}", self.data, other.data))
    }
}

impl Expression for RawExpression {
    fn render(&self) -> String {
        self.data.clone()
    }

    fn get_format_keys(&self) -> BTreeSet<String> {
        self.placeholders()
            .into_iter()
            .filter(|p| !p.ends_with(VALUE_KEY_POSTFIX))
            .map(str::to_string)
            .collect()
    }

    fn get_format_values(&self) -> BTreeSet<String> {
        self.placeholders()
            .into_iter()
            .filter_map(|p| p.strip_suffix(VALUE_KEY_POSTFIX))
            .map(str::to_string)
            .collect()
    }
}

impl BitAnd for RawExpression {
    type Output = RawExpression;

    fn bitand(self, rhs: RawExpression) -> RawExpression {
        self.and(rhs)
    }
}

impl BitOr for RawExpression {
    type Output = RawExpression;

    fn bitor(self, rhs: RawExpression) -> RawExpression {
        self.or(rhs)
    }
}

/// Attributes to return; renders sorted for determinism.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectionExpression {
    keys: BTreeSet<String>,
}

impl ProjectionExpression {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn merge(mut self, other: ProjectionExpression) -> ProjectionExpression {
        self.keys.extend(other.keys);
        self
    }
}

impl Expression for ProjectionExpression {
    fn render(&self) -> String {
        self.keys
            .iter()
            .map(|k| render_key(k))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn get_format_keys(&self) -> BTreeSet<String> {
        self.keys.iter().flat_map(|k| key_parts(k)).collect()
    }

    fn get_format_values(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

impl BitAnd for ProjectionExpression {
    type Output = ProjectionExpression;

    fn bitand(self, rhs: ProjectionExpression) -> ProjectionExpression {
        self.merge(rhs)
    }
}

/// Single `{key} <operator> {value}` predicate.
///
/// `values` holds data column names: none for the existence functions,
/// two for `BETWEEN`, one otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionExpression {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl ConditionExpression {
    /// Equality against the data column of the same name.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            values: vec![key.clone()],
            key,
            operator: Operator::Eq,
        }
    }

    /// Validated constructor from an operator string.
    ///
    /// With no value column the key itself is used. `BETWEEN` needs
    /// exactly two value columns.
    pub fn try_new(key: impl Into<String>, operator: &str, values: &[&str]) -> Result<Self> {
        let key = key.into();
        let operator: Operator = operator.parse()?;
        let values: Vec<String> = match operator {
            Operator::AttributeExists | Operator::AttributeNotExists => Vec::new(),
            Operator::Between => {
                if values.len() != 2 {
                    return Err(Error::Expression(format!(
                        "Operator BETWEEN requires a list of two values, got {:?}",
                        values
                    )));
                }
                values.iter().map(|v| v.to_string()).collect()
            }
            _ => match values {
                [] => vec![key.clone()],
                [value] => vec![value.to_string()],
                _ => {
                    return Err(Error::Expression(format!(
                        "Operator {} takes one value, got {:?}",
                        operator, values
                    )))
                }
            },
        };
        Ok(Self {
            key,
            operator,
            values,
        })
    }

    fn with_value(key: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            values: vec![value.into()],
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(key, Operator::Eq, value)
    }

    pub fn ne(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(key, Operator::Ne, value)
    }

    pub fn gt(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(key, Operator::Gt, value)
    }

    pub fn gte(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(key, Operator::Gte, value)
    }

    pub fn lt(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(key, Operator::Lt, value)
    }

    pub fn lte(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(key, Operator::Lte, value)
    }

    /// Membership in the list held by the `value` column.
    pub fn is_in(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(key, Operator::In, value)
    }

    pub fn begins_with(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(key, Operator::BeginsWith, value)
    }

    pub fn contains(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(key, Operator::Contains, value)
    }

    pub fn between(
        key: impl Into<String>,
        low: impl Into<String>,
        high: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            operator: Operator::Between,
            values: vec![low.into(), high.into()],
        }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: Operator::AttributeExists,
            values: Vec::new(),
        }
    }

    pub fn not_exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: Operator::AttributeNotExists,
            values: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn and(self, other: impl Into<Condition>) -> ConditionExpressionGroup {
        Condition::Single(self).and(other)
    }

    pub fn or(self, other: impl Into<Condition>) -> ConditionExpressionGroup {
        Condition::Single(self).or(other)
    }
}

impl Expression for ConditionExpression {
    fn render(&self) -> String {
        let key = render_key(&self.key);
        let value = |i: usize| {
            self.values
                .get(i)
                .map(|v| render_value(v))
                .unwrap_or_default()
        };
        match self.operator {
            Operator::In => format!("{} IN ({})", key, value(0)),
            Operator::Between => format!("{} BETWEEN {} AND {}", key, value(0), value(1)),
            Operator::BeginsWith => format!("begins_with({}, {})", key, value(0)),
            Operator::Contains => format!("contains({}, {})", key, value(0)),
            Operator::AttributeExists => format!("attribute_exists({})", key),
            Operator::AttributeNotExists => format!("attribute_not_exists({})", key),
            op => format!("{} {} {}", key, op, value(0)),
        }
    }

    fn get_format_keys(&self) -> BTreeSet<String> {
        key_parts(&self.key).collect()
    }

    fn get_format_values(&self) -> BTreeSet<String> {
        self.values.iter().cloned().collect()
    }

    fn get_operators(&self) -> BTreeSet<Operator> {
        BTreeSet::from([self.operator])
    }
}

impl TryFrom<(&str, &str)> for ConditionExpression {
    type Error = Error;

    fn try_from((key, operator): (&str, &str)) -> Result<Self> {
        ConditionExpression::try_new(key, operator, &[])
    }
}

impl TryFrom<(&str, Operator)> for ConditionExpression {
    type Error = Error;

    fn try_from((key, operator): (&str, Operator)) -> Result<Self> {
        ConditionExpression::try_new(key, operator.as_str(), &[])
    }
}

/// A condition tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Single(ConditionExpression),
    Group(ConditionExpressionGroup),
}

impl Condition {
    pub fn and(self, other: impl Into<Condition>) -> ConditionExpressionGroup {
        ConditionExpressionGroup::join(self, Join::And, other.into())
    }

    pub fn or(self, other: impl Into<Condition>) -> ConditionExpressionGroup {
        ConditionExpressionGroup::join(self, Join::Or, other.into())
    }
}

impl Expression for Condition {
    fn render(&self) -> String {
        match self {
            Condition::Single(c) => c.render(),
            Condition::Group(g) => g.render(),
        }
    }

    fn get_format_keys(&self) -> BTreeSet<String> {
        match self {
            Condition::Single(c) => c.get_format_keys(),
            Condition::Group(g) => g.get_format_keys(),
        }
    }

    fn get_format_values(&self) -> BTreeSet<String> {
        match self {
            Condition::Single(c) => c.get_format_values(),
            Condition::Group(g) => g.get_format_values(),
        }
    }

    fn get_operators(&self) -> BTreeSet<Operator> {
        match self {
            Condition::Single(c) => c.get_operators(),
            Condition::Group(g) => g.get_operators(),
        }
    }
}

impl From<ConditionExpression> for Condition {
    fn from(c: ConditionExpression) -> Self {
        Condition::Single(c)
    }
}

impl From<ConditionExpressionGroup> for Condition {
    fn from(g: ConditionExpressionGroup) -> Self {
        Condition::Group(g)
    }
}

/// Key-equality shorthand.
impl From<&str> for Condition {
    fn from(key: &str) -> Self {
        Condition::Single(ConditionExpression::new(key))
    }
}

/// Conditions joined left to right by `AND` / `OR`.
///
/// Operands that are groups with the same join are flattened; a group with
/// a different join is kept as one parenthesized member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionExpressionGroup {
    members: Vec<Condition>,
    join_operators: Vec<Join>,
}

impl ConditionExpressionGroup {
    /// Builds a group rendered in the given order without extra nesting.
    pub fn new(members: Vec<Condition>, join_operators: Vec<Join>) -> Result<Self> {
        if members.is_empty() || join_operators.len() + 1 != members.len() {
            return Err(Error::Expression(format!(
                "Condition group needs one join operator between each of its {} members, got {}",
                members.len(),
                join_operators.len()
            )));
        }
        Ok(Self {
            members,
            join_operators,
        })
    }

    fn join(left: Condition, join: Join, right: Condition) -> Self {
        let mut members = Vec::new();
        for side in [left, right] {
            match side {
                Condition::Group(group) if group.join_operators.iter().all(|j| *j == join) => {
                    members.extend(group.members)
                }
                other => members.push(other),
            }
        }
        let join_operators = vec![join; members.len().saturating_sub(1)];
        Self {
            members,
            join_operators,
        }
    }

    pub fn members(&self) -> &[Condition] {
        &self.members
    }

    pub fn join_operators(&self) -> &[Join] {
        &self.join_operators
    }

    pub fn and(self, other: impl Into<Condition>) -> ConditionExpressionGroup {
        Condition::Group(self).and(other)
    }

    pub fn or(self, other: impl Into<Condition>) -> ConditionExpressionGroup {
        Condition::Group(self).or(other)
    }
}

impl Expression for ConditionExpressionGroup {
    fn render(&self) -> String {
        let mut parts = Vec::with_capacity(self.members.len() * 2);
        for (index, member) in self.members.iter().enumerate() {
            if index > 0 {
                parts.push(self.join_operators[index - 1].as_str().to_string());
            }
            match member {
                Condition::Group(g) if g.members.len() > 1 => {
                    parts.push(format!("({})", g.render()))
                }
                other => parts.push(other.render()),
            }
        }
        parts.join(" ")
    }

    fn get_format_keys(&self) -> BTreeSet<String> {
        self.members.iter().flat_map(|m| m.get_format_keys()).collect()
    }

    fn get_format_values(&self) -> BTreeSet<String> {
        self.members
            .iter()
            .flat_map(|m| m.get_format_values())
            .collect()
    }

    fn get_operators(&self) -> BTreeSet<Operator> {
        self.members.iter().flat_map(|m| m.get_operators()).collect()
    }
}

macro_rules! condition_ops {
    ($($t:ty),*) => {
        $(
            impl<R: Into<Condition>> BitAnd<R> for $t {
                type Output = ConditionExpressionGroup;

                fn bitand(self, rhs: R) -> ConditionExpressionGroup {
                    Condition::from(self).and(rhs)
                }
            }

            impl<R: Into<Condition>> BitOr<R> for $t {
                type Output = ConditionExpressionGroup;

                fn bitor(self, rhs: R) -> ConditionExpressionGroup {
                    Condition::from(self).or(rhs)
                }
            }
        )*
    };
}

condition_ops!(ConditionExpression, ConditionExpressionGroup, Condition);

/// Update clauses over data columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateExpression {
    update: Vec<String>,
    set_if_not_exists: Vec<String>,
    add: Vec<String>,
    delete: Vec<String>,
    remove: Vec<String>,
}

fn extend_dedup<I, S>(target: &mut Vec<String>, keys: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for key in keys {
        let key = key.into();
        if !target.contains(&key) {
            target.push(key);
        }
    }
}

impl UpdateExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SET {key} = {key__value}`
    pub fn set<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_dedup(&mut self.update, keys);
        self
    }

    /// `SET {key} = if_not_exists({key}, {key__value})`
    pub fn set_if_not_exists<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_dedup(&mut self.set_if_not_exists, keys);
        self
    }

    /// `ADD {key} {key__value}`, numbers and sets only.
    pub fn add<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_dedup(&mut self.add, keys);
        self
    }

    /// `DELETE {key} {key__value}`, numbers and sets only.
    pub fn delete<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_dedup(&mut self.delete, keys);
        self
    }

    /// `REMOVE {key}`
    pub fn remove<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_dedup(&mut self.remove, keys);
        self
    }

    pub fn set_keys(&self) -> &[String] {
        &self.update
    }

    pub fn set_if_not_exists_keys(&self) -> &[String] {
        &self.set_if_not_exists
    }

    pub fn add_keys(&self) -> &[String] {
        &self.add
    }

    pub fn delete_keys(&self) -> &[String] {
        &self.delete
    }

    pub fn remove_keys(&self) -> &[String] {
        &self.remove
    }

    /// Union of both expressions' clauses, first-seen order kept.
    pub fn merge(self, other: UpdateExpression) -> UpdateExpression {
        self.set(other.update)
            .set_if_not_exists(other.set_if_not_exists)
            .add(other.add)
            .delete(other.delete)
            .remove(other.remove)
    }

    fn value_keys(&self) -> impl Iterator<Item = &String> {
        self.update
            .iter()
            .chain(&self.set_if_not_exists)
            .chain(&self.add)
            .chain(&self.delete)
    }
}

impl Expression for UpdateExpression {
    fn render(&self) -> String {
        let mut set_list: Vec<String> = self
            .update
            .iter()
            .map(|k| format!("{} = {}", render_key(k), render_value(k)))
            .collect();
        set_list.extend(self.set_if_not_exists.iter().map(|k| {
            let key = render_key(k);
            format!("{} = if_not_exists({}, {})", key, key, render_value(k))
        }));
        let pairs = |keys: &[String]| -> Vec<String> {
            keys.iter()
                .map(|k| format!("{} {}", render_key(k), render_value(k)))
                .collect()
        };
        let add_list = pairs(self.add.as_slice());
        let delete_list = pairs(self.delete.as_slice());
        let remove_list: Vec<String> = self.remove.iter().map(|k| render_key(k)).collect();

        let mut clauses = Vec::new();
        for (name, list) in [
            ("SET", set_list),
            ("ADD", add_list),
            ("DELETE", delete_list),
            ("REMOVE", remove_list),
        ] {
            if !list.is_empty() {
                clauses.push(format!("{} {}", name, list.join(", ")));
            }
        }
        clauses.join(" ")
    }

    fn get_format_keys(&self) -> BTreeSet<String> {
        self.value_keys()
            .chain(&self.remove)
            .flat_map(|k| key_parts(k))
            .collect()
    }

    fn get_format_values(&self) -> BTreeSet<String> {
        self.value_keys().cloned().collect()
    }

    /// `ADD` and `DELETE` accept only numbers and sets.
    fn validate_input_data(&self, data: &Record) -> Result<()> {
        let mut invalid = Vec::new();
        for key in self.add.iter().chain(&self.delete) {
            match data.get(key) {
                Some(value) if is_set_or_number(value) => {}
                Some(value) => invalid.push(format!("\"{}\" = {:?}", key, value)),
                None => invalid.push(format!("\"{}\" is missing", key)),
            }
        }
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(Error::Expression(format!(
                "ADD and DELETE values should be a set or a number: {}",
                invalid.join(", ")
            )))
        }
    }
}

impl BitAnd for UpdateExpression {
    type Output = UpdateExpression;

    fn bitand(self, rhs: UpdateExpression) -> UpdateExpression {
        self.merge(rhs)
    }
}

/// Any expression kind, as stored by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyExpression {
    Raw(RawExpression),
    Condition(Condition),
    Projection(ProjectionExpression),
    Update(UpdateExpression),
}

impl AnyExpression {
    fn inner(&self) -> &dyn Expression {
        match self {
            AnyExpression::Raw(e) => e,
            AnyExpression::Condition(e) => e,
            AnyExpression::Projection(e) => e,
            AnyExpression::Update(e) => e,
        }
    }
}

impl Expression for AnyExpression {
    fn render(&self) -> String {
        self.inner().render()
    }

    fn get_format_keys(&self) -> BTreeSet<String> {
        self.inner().get_format_keys()
    }

    fn get_format_values(&self) -> BTreeSet<String> {
        self.inner().get_format_values()
    }

    fn get_operators(&self) -> BTreeSet<Operator> {
        self.inner().get_operators()
    }

    fn validate_input_data(&self, data: &Record) -> Result<()> {
        self.inner().validate_input_data(data)
    }
}

impl From<RawExpression> for AnyExpression {
    fn from(e: RawExpression) -> Self {
        AnyExpression::Raw(e)
    }
}

impl From<&str> for AnyExpression {
    fn from(template: &str) -> Self {
        AnyExpression::Raw(RawExpression::new(template))
    }
}

impl From<Condition> for AnyExpression {
    fn from(e: Condition) -> Self {
        AnyExpression::Condition(e)
    }
}

impl From<ConditionExpression> for AnyExpression {
    fn from(e: ConditionExpression) -> Self {
        AnyExpression::Condition(Condition::Single(e))
    }
}

impl From<ConditionExpressionGroup> for AnyExpression {
    fn from(e: ConditionExpressionGroup) -> Self {
        AnyExpression::Condition(Condition::Group(e))
    }
}

impl From<ProjectionExpression> for AnyExpression {
    fn from(e: ProjectionExpression) -> Self {
        AnyExpression::Projection(e)
    }
}

impl From<UpdateExpression> for AnyExpression {
    fn from(e: UpdateExpression) -> Self {
        AnyExpression::Update(e)
    }
}

display_as_render!(
    RawExpression,
    ProjectionExpression,
    ConditionExpression,
    Condition,
    ConditionExpressionGroup,
    UpdateExpression,
    AnyExpression
);

/// True when the value can be sent in `ADD` / `DELETE`.
pub fn is_set_or_number(value: &Value) -> bool {
    value.is_number() || value.is_set()
}
