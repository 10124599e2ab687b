use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DbError;

// ---------------------------------------------------------------------------
// FilterOp
// ---------------------------------------------------------------------------

/// A filter operator. Combination across filters is implicit AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Exists,
}

impl FilterOp {
    /// Parses a wire operator name. Unknown names surface as
    /// [`DbError::InvalidQuery`] rather than a body-decoding failure so
    /// the response carries the standard envelope.
    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "in" => Ok(Self::In),
            "contains" => Ok(Self::Contains),
            "startsWith" => Ok(Self::StartsWith),
            "endsWith" => Ok(Self::EndsWith),
            "exists" => Ok(Self::Exists),
            other => Err(DbError::InvalidQuery {
                reason: format!("unknown filter operator '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Exists => "exists",
        }
    }

    /// Range operators require comparable values.
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Filter / QueryOptions
// ---------------------------------------------------------------------------

/// A single filter condition as it arrives on the wire. The operator stays
/// a string here and is parsed during query validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            op: op.as_str().to_string(),
            value,
        }
    }
}

/// The join cardinality. `one_to_one` and `many_to_one` attach a single
/// foreign row; `one_to_many` and `many_to_many` attach a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl JoinKind {
    /// True when the join attaches a list of foreign rows.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

/// A join against another entity type, attached under `as`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    pub entity_type: String,
    pub local_field: String,
    pub foreign_field: String,
    #[serde(rename = "as")]
    pub as_alias: String,
    #[serde(rename = "type", default)]
    pub kind: JoinKind,
    #[serde(default)]
    pub select_fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// A complete query against one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    pub entity_type: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: String,
    #[serde(default)]
    pub order_desc: bool,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub joins: Vec<Join>,
}

impl QueryOptions {
    pub fn for_type(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            filters: Vec::new(),
            order_by: String::new(),
            order_desc: false,
            limit: 0,
            offset: 0,
            joins: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_order(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.order_by = field.into();
        self.order_desc = desc;
        self
    }

    pub fn with_page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Paginated query response. `data` holds wire-shaped rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub data: Vec<serde_json::Value>,
    pub total: usize,
    pub count: usize,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

/// Count-only response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResult {
    pub count: usize,
    pub entity_type: String,
    pub query_type: String,
    pub filters_count: usize,
    pub joins_applied: usize,
    pub execution_time: String,
}
