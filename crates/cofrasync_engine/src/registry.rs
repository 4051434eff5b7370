//! Registered tables and their processing order.

use crate::error::ConfigError;
use cofrasync_protocol::{TableName, TableSpec};

/// The set of tables an engine synchronizes.
///
/// Tables can be registered in any order; references are only checked when
/// [`TableRegistry::ordered`] runs, which the engine does at the start of
/// every cycle.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: Vec<TableSpec>,
}

impl TableRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `specs`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTable`] if a name repeats.
    pub fn from_specs(specs: impl IntoIterator<Item = TableSpec>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    /// The office's five tables.
    ///
    /// # Errors
    ///
    /// Never in practice; names are checked when they are built.
    pub fn standard() -> Result<Self, ConfigError> {
        Self::from_specs(cofrasync_protocol::schema::standard_tables()?)
    }

    /// Adds a table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTable`] if the name is taken.
    pub fn register(&mut self, spec: TableSpec) -> Result<(), ConfigError> {
        if self.contains(&spec.name) {
            return Err(ConfigError::DuplicateTable(spec.name));
        }
        self.tables.push(spec);
        Ok(())
    }

    /// Whether `table` is registered.
    pub fn contains(&self, table: &TableName) -> bool {
        self.tables.iter().any(|t| &t.name == table)
    }

    /// Registered tables in registration order.
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no table is registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables ordered so every table comes after the tables it references.
    /// Among tables that are ready at the same time, registration order wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDependency`] for a reference to an
    /// unregistered table and [`ConfigError::DependencyCycle`] if no order
    /// exists.
    pub fn ordered(&self) -> Result<Vec<TableSpec>, ConfigError> {
        for spec in &self.tables {
            if let Some(missing) = spec.depends_on.iter().find(|d| !self.contains(d)) {
                return Err(ConfigError::UnknownDependency {
                    table: spec.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let mut remaining: Vec<&TableSpec> = self.tables.iter().collect();
        let mut ordered: Vec<TableSpec> = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let ready = remaining.iter().position(|spec| {
                spec.depends_on
                    .iter()
                    .all(|dep| ordered.iter().any(|done| &done.name == dep))
            });
            match ready {
                Some(index) => ordered.push(remaining.remove(index).clone()),
                None => {
                    return Err(ConfigError::DependencyCycle {
                        tables: remaining.iter().map(|s| s.name.clone()).collect(),
                    })
                }
            }
        }
        Ok(ordered)
    }
}
