use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// DynamoDB-style typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Number (stored as string for precision)
    N(String),
    /// String
    S(String),
    /// Binary
    B(Bytes),
    /// Boolean
    Bool(bool),
    /// Null
    Null,
    /// List
    L(Vec<Value>),
    /// Map
    M(HashMap<String, Value>),
    /// String set
    SS(Vec<String>),
    /// Number set
    NS(Vec<String>),
    /// Binary set
    BS(Vec<Bytes>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::S(s.into())
    }

    pub fn number(n: impl ToString) -> Self {
        Value::N(n.to_string())
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        Value::B(b.into())
    }

    pub fn map(m: HashMap<String, Value>) -> Self {
        Value::M(m)
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::L(items.into_iter().collect())
    }

    pub fn string_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: Vec<String> = Vec::new();
        for item in items {
            let item = item.into();
            if !set.contains(&item) {
                set.push(item);
            }
        }
        Value::SS(set)
    }

    pub fn number_set<I, N>(items: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: ToString,
    {
        let mut set: Vec<String> = Vec::new();
        for item in items {
            let item = item.to_string();
            if !set.contains(&item) {
                set.push(item);
            }
        }
        Value::NS(set)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&str> {
        match self {
            Value::N(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().and_then(|n| n.parse().ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(|n| n.parse().ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::L(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::M(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::N(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Value::SS(_) | Value::NS(_) | Value::BS(_))
    }

    /// Provider type descriptor (`S`, `N`, `SS`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::N(_) => "N",
            Value::S(_) => "S",
            Value::B(_) => "B",
            Value::Bool(_) => "BOOL",
            Value::Null => "NULL",
            Value::L(_) => "L",
            Value::M(_) => "M",
            Value::SS(_) => "SS",
            Value::NS(_) => "NS",
            Value::BS(_) => "BS",
        }
    }

    /// Elements of a list or set value, each as a scalar `Value`.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::L(items) => Some(items.clone()),
            Value::SS(items) => Some(items.iter().cloned().map(Value::S).collect()),
            Value::NS(items) => Some(items.iter().cloned().map(Value::N).collect()),
            Value::BS(items) => Some(items.iter().cloned().map(Value::B).collect()),
            _ => None,
        }
    }

    /// Membership test for list and set values.
    pub fn contains(&self, needle: &Value) -> bool {
        match (self, needle) {
            (Value::L(items), _) => items.iter().any(|item| item.loose_eq(needle)),
            (Value::SS(items), Value::S(s)) => items.contains(s),
            (Value::NS(items), Value::N(_)) => items
                .iter()
                .any(|item| Value::N(item.clone()).loose_eq(needle)),
            (Value::BS(items), Value::B(b)) => items.contains(b),
            (Value::S(haystack), Value::S(s)) => haystack.contains(s.as_str()),
            _ => false,
        }
    }

    /// Equality that treats numerically equal numbers as equal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::N(l), Value::N(r)) => match (l.parse::<f64>(), r.parse::<f64>()) {
                (Ok(l), Ok(r)) => l == r,
                _ => l == r,
            },
            _ => self == other,
        }
    }

    /// Ordering for scalar values of the same type.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::N(l), Value::N(r)) => {
                let l: f64 = l.parse().ok()?;
                let r: f64 = r.parse().ok()?;
                l.partial_cmp(&r)
            }
            (Value::S(l), Value::S(r)) => Some(l.cmp(r)),
            (Value::B(l), Value::B(r)) => Some(l.cmp(r)),
            _ => None,
        }
    }

    /// Copy with every string lowercased, used for case-insensitive keys.
    pub fn to_lowercase(&self) -> Value {
        match self {
            Value::S(s) => Value::S(s.to_lowercase()),
            Value::SS(items) => Value::SS(items.iter().map(|s| s.to_lowercase()).collect()),
            Value::L(items) => Value::L(items.iter().map(Value::to_lowercase).collect()),
            Value::M(m) => Value::M(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_lowercase()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::S(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::S(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::B(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::L(items)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(m: HashMap<String, Value>) -> Self {
        Value::M(m)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::N(n.to_string())
                }
            }
        )*
    };
}

number_from!(i32, i64, u32, u64, usize, f64);

/// Partition key and optional sort key column names of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableKeys {
    pub partition_key: String,
    pub sort_key: Option<String>,
}

impl TableKeys {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    pub fn with_sort_key(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }

    /// Key column names, partition key first.
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.partition_key.as_str()];
        if let Some(sk) = &self.sort_key {
            names.push(sk.as_str());
        }
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.partition_key == name || self.sort_key.as_deref() == Some(name)
    }
}

impl std::fmt::Display for TableKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.names().join(", "))
    }
}
