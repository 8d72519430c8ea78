//! LibsqlTreeStore - `TreeStore` implementation for libsql/SQLite
//!
//! Every trait call becomes exactly one parameterized SQL statement, so the
//! bulk shifts issued by the engine run as single `UPDATE ... WHERE`
//! statements inside SQLite.
//!
//! # Table layout
//!
//! Column names for parent, left, right and (optional) level come from the
//! `TreeConfig`; the table is created on open when missing:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS <table> (
//!     id TEXT PRIMARY KEY,
//!     <parent_field> TEXT,
//!     <left_field> INTEGER NOT NULL,
//!     <right_field> INTEGER NOT NULL,
//!     [<level_field> INTEGER NOT NULL DEFAULT 0,]
//!     properties TEXT NOT NULL DEFAULT '{}'
//! )
//! ```
//!
//! Property predicates are rendered through `json_extract(properties, '$.name')`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::db::LibsqlTreeStore;
//! use nestedset_core::{NestedSet, TreeConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TreeConfig::default();
//!     let store = LibsqlTreeStore::open("./data/categories.db", "categories", &config).await?;
//!     let tree = NestedSet::new(Arc::new(store), config)?;
//!     println!("{} nodes", tree.child_count(None, false).await?);
//!     Ok(())
//! }
//! ```

use crate::config::TreeConfig;
use crate::db::error::{is_valid_identifier, DatabaseError};
use crate::db::predicate::{
    Aggregate, AssignValue, Assignment, Condition, Field, FindQuery, Operand, Predicate,
    SortDirection,
};
use crate::db::tree_store::TreeStore;
use crate::models::{Bounds, NewNode, TreeNode};
use anyhow::Result;
use async_trait::async_trait;
use libsql::params::Params;
use libsql::{Builder, Connection, Database, Value as SqlValue};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Column names of the tree table
#[derive(Debug, Clone)]
struct Columns {
    table: String,
    parent: String,
    left: String,
    right: String,
    level: Option<String>,
}

impl Columns {
    fn from_config(table: &str, config: &TreeConfig) -> Result<Self, DatabaseError> {
        let mut names = vec![
            table,
            config.parent_field.as_str(),
            config.left_field.as_str(),
            config.right_field.as_str(),
        ];
        if let Some(level) = &config.level_field {
            names.push(level.as_str());
        }
        if let Some(bad) = names.iter().find(|n| !is_valid_identifier(n)) {
            return Err(DatabaseError::invalid_identifier(*bad));
        }

        Ok(Self {
            table: table.to_string(),
            parent: config.parent_field.clone(),
            left: config.left_field.clone(),
            right: config.right_field.clone(),
            level: config.level_field.clone(),
        })
    }

    fn select_list(&self) -> String {
        format!(
            "id, {}, {}, {}, {}, properties",
            self.parent,
            self.left,
            self.right,
            self.level.as_deref().unwrap_or("0"),
        )
    }

    fn column(&self, field: &Field) -> Result<String, DatabaseError> {
        Ok(match field {
            Field::Id => "id".to_string(),
            Field::Parent => self.parent.clone(),
            Field::Left => self.left.clone(),
            Field::Right => self.right.clone(),
            Field::Level => self
                .level
                .clone()
                .ok_or_else(|| DatabaseError::unsupported_field(field, "no level column configured"))?,
            Field::Properties => "properties".to_string(),
            Field::Property(name) => {
                if !is_valid_identifier(name) {
                    return Err(DatabaseError::invalid_identifier(name.as_str()));
                }
                format!("json_extract(properties, '$.{}')", name)
            }
        })
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Accumulates positional parameters while rendering SQL fragments
struct SqlBuilder<'a> {
    columns: &'a Columns,
    params: Vec<SqlValue>,
}

impl<'a> SqlBuilder<'a> {
    fn new(columns: &'a Columns) -> Self {
        Self {
            columns,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: SqlValue) -> &'static str {
        self.params.push(value);
        "?"
    }

    fn condition(&mut self, condition: &Condition) -> Result<String, DatabaseError> {
        Ok(match condition {
            Condition::Compare { field, op, operand } => {
                let lhs = self.columns.column(field)?;
                let rhs = match operand {
                    Operand::Value(v) => self.bind(to_sql_value(v)).to_string(),
                    Operand::Field(other) => self.columns.column(other)?,
                };
                format!("{} {} {}", lhs, op.as_sql(), rhs)
            }
            Condition::Between { field, low, high } => {
                let col = self.columns.column(field)?;
                self.params.push(SqlValue::Integer(*low));
                self.params.push(SqlValue::Integer(*high));
                format!("{} BETWEEN ? AND ?", col)
            }
            Condition::IsNull(field) => format!("{} IS NULL", self.columns.column(field)?),
            Condition::NotNull(field) => format!("{} IS NOT NULL", self.columns.column(field)?),
            Condition::In { field, values } => {
                if values.is_empty() {
                    return Ok("0".to_string());
                }
                let col = self.columns.column(field)?;
                let slots: Vec<&str> = values.iter().map(|v| self.bind(to_sql_value(v))).collect();
                format!("{} IN ({})", col, slots.join(", "))
            }
            Condition::Any(conditions) => {
                if conditions.is_empty() {
                    return Ok("0".to_string());
                }
                let parts = conditions
                    .iter()
                    .map(|c| self.condition(c))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("({})", parts.join(" OR "))
            }
        })
    }

    fn where_clause(&mut self, predicate: &Predicate) -> Result<String, DatabaseError> {
        if predicate.is_unconditional() {
            return Ok("1 = 1".to_string());
        }
        let parts = predicate
            .conditions()
            .iter()
            .map(|c| self.condition(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(" AND "))
    }

    fn assignment(&mut self, assignment: &Assignment) -> Result<String, DatabaseError> {
        let field = &assignment.field;
        Ok(match (&assignment.value, field) {
            (_, Field::Id) => {
                return Err(DatabaseError::unsupported_field(field, "ids are immutable"))
            }
            (AssignValue::Set(value), Field::Property(name)) => {
                if !is_valid_identifier(name) {
                    return Err(DatabaseError::invalid_identifier(name.as_str()));
                }
                self.params.push(SqlValue::Text(value.to_string()));
                format!("properties = json_set(properties, '$.{}', json(?))", name)
            }
            (AssignValue::Set(value), Field::Properties) => {
                self.params.push(SqlValue::Text(value.to_string()));
                "properties = ?".to_string()
            }
            (AssignValue::Set(value), _) => {
                let col = self.columns.column(field)?;
                self.params.push(to_sql_value(value));
                format!("{} = ?", col)
            }
            (AssignValue::Shift(delta), Field::Left | Field::Right | Field::Level) => {
                let col = self.columns.column(field)?;
                self.params.push(SqlValue::Integer(*delta));
                format!("{} = {} + ?", col, col)
            }
            (AssignValue::Shift(_), _) => {
                return Err(DatabaseError::unsupported_field(
                    field,
                    "only bounds and level shift",
                ))
            }
        })
    }

    fn finish(self) -> Params {
        Params::Positional(self.params)
    }
}

/// libsql-backed tree table
#[derive(Clone)]
pub struct LibsqlTreeStore {
    /// Keeps the database alive for the lifetime of the connection
    _db: Arc<Database>,
    conn: Connection,
    columns: Columns,
}

impl std::fmt::Debug for LibsqlTreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibsqlTreeStore")
            .field("table", &self.columns.table)
            .finish()
    }
}

impl LibsqlTreeStore {
    /// Open (or create) a database file and ensure the tree table exists
    pub async fn open(
        db_path: impl AsRef<Path>,
        table: &str,
        config: &TreeConfig,
    ) -> Result<Self, DatabaseError> {
        let db_path: PathBuf = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;
        Self::from_database(db, table, config).await
    }

    /// Private in-memory database (lives as long as the store)
    pub async fn open_in_memory(table: &str, config: &TreeConfig) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(PathBuf::from(":memory:"), e))?;
        Self::from_database(db, table, config).await
    }

    async fn from_database(
        db: Database,
        table: &str,
        config: &TreeConfig,
    ) -> Result<Self, DatabaseError> {
        let columns = Columns::from_config(table, config)?;
        let conn = db.connect()?;
        let store = Self {
            _db: Arc::new(db),
            conn,
            columns,
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// PRAGMA statements return rows, so they go through query() instead of execute()
    async fn execute_pragma(&self, pragma: &str) -> Result<(), DatabaseError> {
        self.conn.query(pragma, ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.execute_pragma("PRAGMA busy_timeout = 5000").await?;

        let c = &self.columns;
        let level_column = c
            .level
            .as_ref()
            .map(|l| format!("{} INTEGER NOT NULL DEFAULT 0,", l))
            .unwrap_or_default();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                {parent} TEXT,
                {left} INTEGER NOT NULL,
                {right} INTEGER NOT NULL,
                {level_column}
                properties TEXT NOT NULL DEFAULT '{{}}'
            )",
            table = c.table,
            parent = c.parent,
            left = c.left,
            right = c.right,
            level_column = level_column,
        );
        self.conn.execute(&ddl, ()).await.map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create {}: {}", c.table, e))
        })?;

        for column in [&c.parent, &c.left, &c.right] {
            let index = format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})",
                table = c.table,
                column = column
            );
            self.conn.execute(&index, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index on {}.{}: {}",
                    c.table, column, e
                ))
            })?;
        }
        Ok(())
    }

    fn row_to_node(row: &libsql::Row) -> Result<TreeNode, DatabaseError> {
        let id = match row.get_value(0)? {
            SqlValue::Text(s) => s,
            other => return Err(DatabaseError::malformed_row(format!("id is {:?}", other))),
        };
        let parent_id = match row.get_value(1)? {
            SqlValue::Null => None,
            SqlValue::Text(s) => Some(s),
            other => {
                return Err(DatabaseError::malformed_row(format!(
                    "parent of '{}' is {:?}",
                    id, other
                )))
            }
        };
        let integer = |idx: i32, name: &str| -> Result<i64, DatabaseError> {
            match row.get_value(idx)? {
                SqlValue::Integer(i) => Ok(i),
                other => Err(DatabaseError::malformed_row(format!(
                    "{} of '{}' is {:?}",
                    name, id, other
                ))),
            }
        };
        let lft = integer(2, "left")?;
        let rght = integer(3, "right")?;
        let level = integer(4, "level")?;
        let properties = match row.get_value(5)? {
            SqlValue::Text(s) => serde_json::from_str(&s).map_err(|e| {
                DatabaseError::malformed_row(format!("properties of '{}': {}", id, e))
            })?,
            SqlValue::Null => Value::Object(Default::default()),
            other => {
                return Err(DatabaseError::malformed_row(format!(
                    "properties of '{}' is {:?}",
                    id, other
                )))
            }
        };

        Ok(TreeNode {
            id,
            parent_id,
            lft,
            rght,
            level,
            properties,
        })
    }
}

#[async_trait]
impl TreeStore for LibsqlTreeStore {
    async fn insert(&self, node: &NewNode, bounds: Bounds, level: i64) -> Result<TreeNode> {
        let c = &self.columns;
        let id = node
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let properties =
            serde_json::to_string(&node.properties).map_err(anyhow::Error::from)?;

        let mut columns: Vec<&str> = vec!["id", c.parent.as_str(), c.left.as_str(), c.right.as_str()];
        let mut values = vec![
            SqlValue::Text(id.clone()),
            node.parent_id
                .clone()
                .map_or(SqlValue::Null, SqlValue::Text),
            SqlValue::Integer(bounds.left),
            SqlValue::Integer(bounds.right),
        ];
        if let Some(level_col) = &c.level {
            columns.push(level_col);
            values.push(SqlValue::Integer(level));
        }
        columns.push("properties");
        values.push(SqlValue::Text(properties));

        let slots = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            c.table,
            columns.join(", "),
            slots
        );
        self.conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert node: {}", e)))?;

        Ok(TreeNode {
            id,
            parent_id: node.parent_id.clone(),
            lft: bounds.left,
            rght: bounds.right,
            level: if c.level.is_some() { level } else { 0 },
            properties: node.properties.clone(),
        })
    }

    async fn find_all(&self, query: &FindQuery) -> Result<Vec<TreeNode>> {
        let mut builder = SqlBuilder::new(&self.columns);
        let where_clause = builder.where_clause(&query.predicate)?;
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.columns.select_list(),
            self.columns.table,
            where_clause
        );

        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|o| {
                    let dir = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    self.columns.column(&o.field).map(|col| format!("{} {}", col, dir))
                })
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        if query.limit.is_some() || query.offset > 0 {
            // SQLite treats a negative LIMIT as unbounded
            let limit = query.limit.map_or(-1, |l| l as i64);
            builder.params.push(SqlValue::Integer(limit));
            builder.params.push(SqlValue::Integer(query.offset as i64));
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut rows = self
            .conn
            .query(&sql, builder.finish())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query nodes: {}", e)))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let mut builder = SqlBuilder::new(&self.columns);
        let where_clause = builder.where_clause(predicate)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.columns.table, where_clause
        );
        let mut rows = self
            .conn
            .query(&sql, builder.finish())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to count nodes: {}", e)))?;
        match rows.next().await.map_err(DatabaseError::from)? {
            Some(row) => match row.get_value(0).map_err(DatabaseError::from)? {
                SqlValue::Integer(n) => Ok(n.max(0) as u64),
                other => Err(DatabaseError::malformed_row(format!("count is {:?}", other)).into()),
            },
            None => Ok(0),
        }
    }

    async fn aggregate(
        &self,
        function: Aggregate,
        field: Field,
        predicate: &Predicate,
    ) -> Result<Option<i64>> {
        let mut builder = SqlBuilder::new(&self.columns);
        let column = self.columns.column(&field)?;
        let where_clause = builder.where_clause(predicate)?;
        let sql = format!(
            "SELECT {}({}) FROM {} WHERE {}",
            function.as_sql(),
            column,
            self.columns.table,
            where_clause
        );
        let mut rows = self.conn.query(&sql, builder.finish()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to aggregate {}: {}", column, e))
        })?;
        match rows.next().await.map_err(DatabaseError::from)? {
            Some(row) => match row.get_value(0).map_err(DatabaseError::from)? {
                SqlValue::Integer(n) => Ok(Some(n)),
                SqlValue::Null => Ok(None),
                other => {
                    Err(DatabaseError::malformed_row(format!("aggregate is {:?}", other)).into())
                }
            },
            None => Ok(None),
        }
    }

    async fn bulk_update(&self, assignments: &[Assignment], predicate: &Predicate) -> Result<u64> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let mut builder = SqlBuilder::new(&self.columns);
        let sets = assignments
            .iter()
            .map(|a| builder.assignment(a))
            .collect::<Result<Vec<_>, _>>()?;
        let where_clause = builder.where_clause(predicate)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.columns.table,
            sets.join(", "),
            where_clause
        );
        let affected = self
            .conn
            .execute(&sql, builder.finish())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to update nodes: {}", e)))?;
        Ok(affected)
    }

    async fn bulk_delete(&self, predicate: &Predicate) -> Result<u64> {
        let mut builder = SqlBuilder::new(&self.columns);
        let where_clause = builder.where_clause(predicate)?;
        let sql = format!("DELETE FROM {} WHERE {}", self.columns.table, where_clause);
        let removed = self
            .conn
            .execute(&sql, builder.finish())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete nodes: {}", e)))?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Columns {
        Columns::from_config("nodes", &TreeConfig::default()).unwrap()
    }

    #[test]
    fn test_where_clause_renders_parameters_in_order() {
        let columns = columns();
        let mut builder = SqlBuilder::new(&columns);
        let predicate = Predicate::all()
            .eq(Field::property("owner"), "alice")
            .between(Field::Left, 3, 9)
            .is_null(Field::Parent);
        let sql = builder.where_clause(&predicate).unwrap();
        assert_eq!(
            sql,
            "json_extract(properties, '$.owner') = ? AND lft BETWEEN ? AND ? AND parent_id IS NULL"
        );
        assert_eq!(
            builder.params,
            vec![
                SqlValue::Text("alice".to_string()),
                SqlValue::Integer(3),
                SqlValue::Integer(9)
            ]
        );
    }

    #[test]
    fn test_unconditional_predicate_renders_tautology() {
        let columns = columns();
        let mut builder = SqlBuilder::new(&columns);
        assert_eq!(builder.where_clause(&Predicate::all()).unwrap(), "1 = 1");
    }

    #[test]
    fn test_shift_assignment_renders_in_place_arithmetic() {
        let columns = columns();
        let mut builder = SqlBuilder::new(&columns);
        let sql = builder
            .assignment(&Assignment::shift(Field::Right, -4))
            .unwrap();
        assert_eq!(sql, "rght = rght + ?");
        assert_eq!(builder.params, vec![SqlValue::Integer(-4)]);
    }

    #[test]
    fn test_property_names_are_validated() {
        let columns = columns();
        let mut builder = SqlBuilder::new(&columns);
        let predicate = Predicate::all().eq(Field::property("x') OR 1=1 --"), 1);
        assert!(builder.where_clause(&predicate).is_err());
    }

    #[test]
    fn test_level_requires_configured_column() {
        let columns = columns();
        assert!(columns.column(&Field::Level).is_err());

        let config = TreeConfig {
            level_field: Some("depth".to_string()),
            ..Default::default()
        };
        let with_level = Columns::from_config("nodes", &config).unwrap();
        assert_eq!(with_level.column(&Field::Level).unwrap(), "depth");
    }

    #[test]
    fn test_bool_values_bind_as_integers() {
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(to_sql_value(&json!(null)), SqlValue::Null);
    }
}
