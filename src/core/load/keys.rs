//! Merge key selection

use crate::config::{KeyFallback, LoadConfig};
use crate::domain::ids::canonicalize;
use crate::domain::{Result, Schema, TableId, TabliftError};
use std::collections::BTreeMap;

/// Decides which columns identify a row of a table
#[derive(Debug, Clone, Default)]
pub struct KeyPolicy {
    explicit: BTreeMap<String, Vec<String>>,
    fallback: KeyFallback,
}

impl KeyPolicy {
    /// Configured table names are canonicalized so `Invoice-Lines` and
    /// `invoice_lines` address the same table
    pub fn new(explicit: &BTreeMap<String, Vec<String>>, fallback: KeyFallback) -> Self {
        Self {
            explicit: explicit
                .iter()
                .map(|(table, keys)| (canonicalize(table), keys.clone()))
                .collect(),
            fallback,
        }
    }

    pub fn from_config(config: &LoadConfig) -> Self {
        Self::new(&config.key_columns, config.key_fallback)
    }

    /// Key columns for `table`, using `schema` when falling back
    ///
    /// # Errors
    ///
    /// `MissingKey` when no key is configured and the fallback cannot or may
    /// not pick one.
    pub fn resolve(&self, table: &TableId, schema: &Schema) -> Result<Vec<String>> {
        if let Some(keys) = self.explicit.get(table.as_str()) {
            if !keys.is_empty() {
                return Ok(keys.clone());
            }
        }

        match self.fallback {
            KeyFallback::Require => Err(TabliftError::MissingKey(table.to_string())),
            KeyFallback::IdOrFirst => schema
                .get("id")
                .or_else(|| schema.columns().first())
                .map(|column| vec![column.name.clone()])
                .ok_or_else(|| TabliftError::MissingKey(table.to_string())),
        }
    }
}
