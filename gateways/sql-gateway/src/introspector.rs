//! Schema introspection
//!
//! Builds a size-bounded [`SchemaSummary`] from catalog metadata. A table
//! whose columns cannot be read is kept with [`TableColumns::Unavailable`]
//! instead of failing the whole summary; only a failure to list tables at
//! all is an error.

use std::fmt;

use rusqlite::Connection;
use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};

/// Column name and declared type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
}

/// Outcome of reading one table's columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableColumns {
    Listed { columns: Vec<ColumnDescriptor> },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: TableColumns,
}

/// Bounded, request-scoped description of the visible tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSummary {
    pub tables: Vec<TableDescriptor>,
}

/// Size bounds for a summary
#[derive(Debug, Clone, Copy)]
pub struct SchemaLimits {
    pub max_tables: usize,
    pub max_columns_per_table: usize,
}

/// Read-only metadata source
pub trait Catalog {
    /// Names of the tables and views visible on this connection, in a stable order
    fn table_names(&self) -> anyhow::Result<Vec<String>>;

    /// Columns of one table in declaration order
    fn columns(&self, table: &str) -> anyhow::Result<Vec<ColumnDescriptor>>;
}

impl Catalog for Connection {
    fn table_names(&self) -> anyhow::Result<Vec<String>> {
        let mut stmt = self.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn columns(&self, table: &str) -> anyhow::Result<Vec<ColumnDescriptor>> {
        let mut stmt = self.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| {
                let type_tag: String = row.get(1)?;
                Ok(ColumnDescriptor {
                    name: row.get(0)?,
                    type_tag: if type_tag.is_empty() {
                        "any".to_string()
                    } else {
                        type_tag
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}

/// Enumerate tables and their columns, truncated to `limits`
pub fn describe_schema<C: Catalog + ?Sized>(
    catalog: &C,
    limits: SchemaLimits,
) -> GatewayResult<SchemaSummary> {
    let mut names = catalog
        .table_names()
        .map_err(|e| GatewayError::execution(format!("Failed to list tables: {:#}", e)))?;
    names.truncate(limits.max_tables);

    let tables = names
        .into_iter()
        .map(|name| {
            let columns = match catalog.columns(&name) {
                Ok(mut columns) => {
                    columns.truncate(limits.max_columns_per_table);
                    TableColumns::Listed { columns }
                }
                Err(e) => {
                    tracing::warn!("Failed to read columns of {}: {:#}", name, e);
                    TableColumns::Unavailable {
                        reason: format!("{:#}", e),
                    }
                }
            };
            TableDescriptor { name, columns }
        })
        .collect();

    Ok(SchemaSummary { tables })
}

impl SchemaSummary {
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// One line per table: `- <table> (columns: <name>:<type>, ...)`
///
/// Tables whose columns could not be read render as `- <table> (columns: ?)`.
impl fmt::Display for SchemaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, table) in self.tables.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", table)?;
        }
        Ok(())
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "- {} (columns: ", self.name)?;
        match &self.columns {
            TableColumns::Listed { columns } => {
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}:{}", column.name, column.type_tag)?;
                }
            }
            TableColumns::Unavailable { .. } => f.write_str("?")?,
        }
        f.write_str(")")
    }
}
