//! Core types for realtime change notifications.

use crate::error::{RealtimeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Schema assumed when a filter or event does not name one.
pub const DEFAULT_SCHEMA: &str = "public";

/// Key identifying one logical stream of change events.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Topic(name.into())
    }

    /// Derive the topic name for a filter: `realtime:<schema>:<table>[:<column filter>]`.
    ///
    /// Two subscriptions with equal filters share one topic and therefore one
    /// transport channel.
    pub fn for_filter(filter: &ChangeFilter) -> Self {
        let table = filter.table.as_deref().unwrap_or("*");
        match &filter.column {
            Some(column) => Topic(format!("realtime:{}:{}:{}", filter.schema, table, column)),
            None => Topic(format!("realtime:{}:{}", filter.schema, table)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Topic(s.to_string())
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Topic(s)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one listener registration.
///
/// A fresh id is allocated for every registration, so a consumer that
/// re-registers never collides with its own earlier registration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of row change carried by an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => f.write_str("INSERT"),
            ChangeKind::Update => f.write_str("UPDATE"),
            ChangeKind::Delete => f.write_str("DELETE"),
        }
    }
}

/// A single row change delivered by the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    /// Row after the change (`null` for deletes).
    #[serde(default)]
    pub new: Value,
    /// Row before the change, when the backend provides it.
    #[serde(default)]
    pub old: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, new: Value) -> Self {
        Self::build(table, ChangeKind::Insert, new, Value::Null)
    }

    pub fn update(table: impl Into<String>, new: Value, old: Value) -> Self {
        Self::build(table, ChangeKind::Update, new, old)
    }

    pub fn delete(table: impl Into<String>, old: Value) -> Self {
        Self::build(table, ChangeKind::Delete, Value::Null, old)
    }

    fn build(table: impl Into<String>, kind: ChangeKind, new: Value, old: Value) -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            kind,
            new,
            old,
            commit_timestamp: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// The row a column filter is evaluated against: the old row for
    /// deletes, the new row otherwise.
    pub fn record(&self) -> &Value {
        match self.kind {
            ChangeKind::Delete => &self.old,
            ChangeKind::Insert | ChangeKind::Update => &self.new,
        }
    }
}

/// Which change kinds a subscription wants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventFilter {
    #[default]
    #[serde(rename = "*")]
    All,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl EventFilter {
    pub fn matches(self, kind: ChangeKind) -> bool {
        matches!(
            (self, kind),
            (EventFilter::All, _)
                | (EventFilter::Insert, ChangeKind::Insert)
                | (EventFilter::Update, ChangeKind::Update)
                | (EventFilter::Delete, ChangeKind::Delete)
        )
    }
}

impl FromStr for EventFilter {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "*" => Ok(EventFilter::All),
            "INSERT" => Ok(EventFilter::Insert),
            "UPDATE" => Ok(EventFilter::Update),
            "DELETE" => Ok(EventFilter::Delete),
            other => Err(RealtimeError::InvalidFilter(format!(
                "unknown event type {other:?}"
            ))),
        }
    }
}

/// Comparison operator of a column filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl FilterOp {
    fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::In => "in",
        }
    }
}

impl FromStr for FilterOp {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(FilterOp::Eq),
            "neq" => Ok(FilterOp::Neq),
            "lt" => Ok(FilterOp::Lt),
            "lte" => Ok(FilterOp::Lte),
            "gt" => Ok(FilterOp::Gt),
            "gte" => Ok(FilterOp::Gte),
            "in" => Ok(FilterOp::In),
            other => Err(RealtimeError::InvalidFilter(format!(
                "unknown operator {other:?}"
            ))),
        }
    }
}

/// A `column=op.value` row filter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnFilter {
    pub column: String,
    pub op: FilterOp,
    /// Operand values; exactly one unless `op` is `In`.
    pub values: Vec<String>,
}

impl ColumnFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            values: vec![value.into()],
        }
    }

    /// Parse a filter expression such as `user_id=eq.42` or `status=in.(open,closed)`.
    pub fn parse(expr: &str) -> Result<Self> {
        let invalid = |why: &str| RealtimeError::InvalidFilter(format!("{expr:?}: {why}"));

        let (column, rest) = expr.split_once('=').ok_or_else(|| invalid("missing '='"))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(invalid("empty column"));
        }
        let (op, operand) = rest.split_once('.').ok_or_else(|| invalid("missing operator"))?;
        let op: FilterOp = op.trim().parse()?;

        let values = if op == FilterOp::In {
            let list = operand
                .trim()
                .strip_prefix('(')
                .and_then(|s| s.strip_suffix(')'))
                .ok_or_else(|| invalid("'in' expects a parenthesized list"))?;
            let values: Vec<String> = list
                .split(',')
                .map(|v| v.trim().trim_matches('"').to_string())
                .filter(|v| !v.is_empty())
                .collect();
            if values.is_empty() {
                return Err(invalid("empty 'in' list"));
            }
            values
        } else {
            vec![operand.to_string()]
        };

        Ok(Self {
            column: column.to_string(),
            op,
            values,
        })
    }

    /// Evaluate against a row object. Missing columns never match.
    pub fn matches(&self, row: &Value) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        let actual = plain_text(actual);
        let Some(expected) = self.values.first() else {
            return false;
        };

        match self.op {
            FilterOp::Eq => actual == *expected,
            FilterOp::Neq => actual != *expected,
            FilterOp::In => self.values.iter().any(|v| *v == actual),
            FilterOp::Lt => compare(&actual, expected) == Ordering::Less,
            FilterOp::Lte => compare(&actual, expected) != Ordering::Greater,
            FilterOp::Gt => compare(&actual, expected) == Ordering::Greater,
            FilterOp::Gte => compare(&actual, expected) != Ordering::Less,
        }
    }
}

impl fmt::Display for ColumnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op == FilterOp::In {
            write!(f, "{}=in.({})", self.column, self.values.join(","))
        } else {
            write!(
                f,
                "{}={}.{}",
                self.column,
                self.op.as_str(),
                self.values.first().map(String::as_str).unwrap_or_default()
            )
        }
    }
}

/// Render a JSON scalar the way it appears in a filter expression.
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric comparison when both sides parse as numbers, lexical otherwise.
fn compare(actual: &str, expected: &str) -> Ordering {
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => actual.cmp(expected),
    }
}

/// Match criteria for a subscription: schema, optional table, optional column filter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChangeFilter {
    pub schema: String,
    /// None = every table in the schema.
    pub table: Option<String>,
    pub column: Option<ColumnFilter>,
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: None,
            column: None,
        }
    }
}

impl ChangeFilter {
    /// All changes to one table in the default schema.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_column(mut self, column: ColumnFilter) -> Self {
        self.column = Some(column);
        self
    }

    /// Attach a column filter given as an expression (`user_id=eq.42`).
    pub fn with_expression(self, expr: &str) -> Result<Self> {
        Ok(self.with_column(ColumnFilter::parse(expr)?))
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.schema != self.schema {
            return false;
        }
        if let Some(ref table) = self.table {
            if *table != event.table {
                return false;
            }
        }
        match &self.column {
            Some(column) => column.matches(event.record()),
            None => true,
        }
    }
}
