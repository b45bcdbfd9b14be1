//! Schema Introspector
//!
//! Lists tables and columns of the analytical database. The last successful
//! listing is cached for building the system prompt.

use std::sync::{Arc, RwLock};

use serde_json::{json, Value};

use analytics_agent_core::{CoreError, CoreResult};

use crate::services::analytics_db::{AnalyticsDatabase, TableInfo};

pub struct SchemaIntrospector {
    db: Arc<dyn AnalyticsDatabase>,
    cache: RwLock<Option<Vec<TableInfo>>>,
}

impl SchemaIntrospector {
    pub fn new(db: Arc<dyn AnalyticsDatabase>) -> Self {
        Self {
            db,
            cache: RwLock::new(None),
        }
    }

    /// All tables, or only `filter` (matched case-insensitively).
    pub async fn list_tables(&self, filter: Option<&str>) -> CoreResult<Vec<TableInfo>> {
        let tables = self.db.list_tables().await?;
        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(tables.clone());
        }

        let Some(filter) = filter else {
            return Ok(tables);
        };
        let matched: Vec<TableInfo> = tables
            .iter()
            .filter(|t| t.name.eq_ignore_ascii_case(filter))
            .cloned()
            .collect();
        if matched.is_empty() {
            let available: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
            return Err(CoreError::validation(format!(
                "Table '{}' not found. Available tables: {}",
                filter,
                available.join(", ")
            )));
        }
        Ok(matched)
    }

    /// Tool output for `schema-introspect`.
    pub async fn describe(&self, filter: Option<&str>) -> CoreResult<Value> {
        let tables = self.list_tables(filter).await?;
        Ok(json!({ "tables": tables }))
    }

    /// Last successful listing, if any.
    pub fn cached(&self) -> Option<Vec<TableInfo>> {
        self.cache.read().ok().and_then(|c| c.clone())
    }
}

/// `**table**: col, col` lines for the system prompt.
pub fn render_for_prompt(tables: &[TableInfo]) -> String {
    tables
        .iter()
        .map(|t| {
            let columns: Vec<&str> = t.columns.iter().map(|c| c.name.as_str()).collect();
            format!("**{}**: {}", t.name, columns.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
