//! Query predicates for list calls
//!
//! Serialised in the platform's JSON query syntax:
//! `{"method":"equal","attribute":"post_id","values":["p1"]}`

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Page size the platform applies when a list call carries no `limit`
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Upper bound the platform accepts for a single page
pub const MAX_PAGE_SIZE: u32 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    Equal { attribute: String, values: Vec<Value> },
    NotEqual { attribute: String, values: Vec<Value> },
    OrderAsc(String),
    OrderDesc(String),
    Limit(u32),
    Offset(u32),
    CursorAfter(String),
}

impl Query {
    pub fn equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Equal {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    pub fn equal_any(attribute: impl Into<String>, values: Vec<Value>) -> Self {
        Query::Equal {
            attribute: attribute.into(),
            values,
        }
    }

    pub fn not_equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::NotEqual {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    pub fn order_asc(attribute: impl Into<String>) -> Self {
        Query::OrderAsc(attribute.into())
    }

    pub fn order_desc(attribute: impl Into<String>) -> Self {
        Query::OrderDesc(attribute.into())
    }

    pub fn limit(limit: u32) -> Self {
        Query::Limit(limit.min(MAX_PAGE_SIZE))
    }

    pub fn offset(offset: u32) -> Self {
        Query::Offset(offset)
    }

    pub fn cursor_after(document_id: impl Into<String>) -> Self {
        Query::CursorAfter(document_id.into())
    }

    /// Wire form sent as one `queries[]` parameter
    pub fn to_wire(&self) -> String {
        let value = match self {
            Query::Equal { attribute, values } => json!({
                "method": "equal",
                "attribute": attribute,
                "values": values,
            }),
            Query::NotEqual { attribute, values } => json!({
                "method": "notEqual",
                "attribute": attribute,
                "values": values,
            }),
            Query::OrderAsc(attribute) => json!({
                "method": "orderAsc",
                "attribute": attribute,
            }),
            Query::OrderDesc(attribute) => json!({
                "method": "orderDesc",
                "attribute": attribute,
            }),
            Query::Limit(limit) => json!({
                "method": "limit",
                "values": [limit],
            }),
            Query::Offset(offset) => json!({
                "method": "offset",
                "values": [offset],
            }),
            Query::CursorAfter(id) => json!({
                "method": "cursorAfter",
                "values": [id],
            }),
        };
        value.to_string()
    }
}

/// Effective page window of a query list
pub(crate) fn page_window(queries: &[Query]) -> (usize, usize) {
    let mut limit = DEFAULT_PAGE_SIZE;
    let mut offset = 0;
    for query in queries {
        match query {
            Query::Limit(l) => limit = *l,
            Query::Offset(o) => offset = *o,
            _ => {}
        }
    }
    (limit as usize, offset as usize)
}
