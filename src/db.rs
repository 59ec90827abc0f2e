use crossbeam_channel::{Receiver, Sender};
use rusqlite::{Batch, Connection, Statement, types::ValueRef};
use serde_json::{Map, Value, json};
use std::time::Instant;
use thiserror::Error;

use crate::cells::{CellId, RunOutcome};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    Rejected(String),
    #[error("execution worker is not running")]
    WorkerGone,
}

/// The boundary to whatever actually runs SQL: text in, JSON text out.
pub trait SqlExecutor: Send {
    fn execute(&mut self, sql: &str) -> Result<String, ExecError>;
    fn describe(&self) -> String;
}

#[derive(Debug)]
pub enum ExecRequest {
    Execute { cell: CellId, sql: String },
}

#[derive(Debug)]
pub enum ExecResponse {
    Finished {
        cell: CellId,
        outcome: RunOutcome,
        finished_at: Instant,
    },
}

pub fn start_exec_worker(
    mut executor: Box<dyn SqlExecutor>,
    req_rx: Receiver<ExecRequest>,
    resp_tx: Sender<ExecResponse>,
) {
    tracing::info!(backend = %executor.describe(), "execution worker started");

    while let Ok(req) = req_rx.recv() {
        match req {
            ExecRequest::Execute { cell, sql } => {
                tracing::debug!(%cell, bytes = sql.len(), "executing");
                let outcome = executor.execute(&sql).map_err(|e| e.to_string());
                if let Err(e) = &outcome {
                    tracing::debug!(%cell, error = %e, "execution failed");
                }
                let resp = ExecResponse::Finished {
                    cell,
                    outcome,
                    finished_at: Instant::now(),
                };
                if resp_tx.send(resp).is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("execution worker stopped");
}

pub struct SqliteExecutor {
    conn: Connection,
    label: String,
    max_rows: usize,
}

impl SqliteExecutor {
    /// `None` opens a private in-memory database.
    pub fn open(path: Option<&str>, max_rows: usize) -> Result<Self, ExecError> {
        let (conn, label) = match path {
            Some(p) => {
                let conn = Connection::open(p)?;
                // safemode: faster reading
                let _ = conn.pragma_update(None, "journal_mode", "WAL");
                let _ = conn.pragma_update(None, "synchronous", "NORMAL");
                (conn, format!("sqlite:{p}"))
            }
            None => (Connection::open_in_memory()?, "sqlite::memory:".to_string()),
        };
        Ok(Self {
            conn,
            label,
            max_rows,
        })
    }
}

impl SqlExecutor for SqliteExecutor {
    /// Runs every statement in `sql`; the last one's output is returned.
    fn execute(&mut self, sql: &str) -> Result<String, ExecError> {
        let max_rows = self.max_rows;
        let mut batch = Batch::new(&self.conn, sql);
        let mut last: Option<Value> = None;
        while let Some(mut stmt) = batch.next()? {
            last = Some(run_statement(&mut stmt, max_rows)?);
        }
        let value = last.ok_or_else(|| ExecError::Rejected("No SQL statements to execute".into()))?;
        Ok(value.to_string())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

fn run_statement(stmt: &mut Statement<'_>, max_rows: usize) -> Result<Value, ExecError> {
    if stmt.column_count() == 0 {
        let changed = stmt.execute([])?;
        return Ok(json!({
            "message": "Statement executed successfully",
            "rows_affected": changed,
        }));
    }

    let columns = unique_column_names(stmt.column_names());
    let mut rows = stmt.query([])?;
    let mut out: Vec<Value> = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= max_rows {
            tracing::warn!(max_rows, "result truncated");
            break;
        }
        let mut obj = Map::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            obj.insert(name.clone(), value_to_json(row.get_ref(i)?));
        }
        out.push(Value::Object(obj));
    }
    Ok(Value::Array(out))
}

/// Row objects are keyed by column name, so `SELECT 1, 1` needs distinct keys.
fn unique_column_names(names: Vec<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.to_string();
        let mut n = 2;
        while out.contains(&candidate) {
            candidate = format!("{name}_{n}");
            n += 1;
        }
        out.push(candidate);
    }
    out
}

fn value_to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(format!("0x{}", hex::encode(b))),
    }
}

/// Canned answers for trying the notebook without a database.
#[derive(Debug, Default)]
pub struct DemoExecutor;

impl SqlExecutor for DemoExecutor {
    fn execute(&mut self, sql: &str) -> Result<String, ExecError> {
        let result = if sql.contains("SELECT * FROM users") {
            json!([
                {"id": 1, "name": "John Doe", "email": "john@example.com", "age": 30},
                {"id": 2, "name": "Jane Smith", "email": "jane@example.com", "age": 25},
                {"id": 3, "name": "Bob Johnson", "email": "bob@example.com", "age": 35},
                {"id": 4, "name": "Alice Brown", "email": "alice@example.com", "age": 28},
                {"id": 5, "name": "Charlie Wilson", "email": "charlie@example.com", "age": 32}
            ])
        } else if sql.contains("COUNT") {
            json!([{"user_count": 5}])
        } else if sql.contains("INSERT") {
            json!({"message": "Insert successful", "rows_affected": 1})
        } else if sql.contains("UPDATE") {
            json!({"message": "Update successful", "rows_affected": 1})
        } else if sql.contains("DELETE") {
            json!({"message": "Delete successful", "rows_affected": 1})
        } else if sql.contains("CREATE TABLE") {
            json!({"message": "Table created successfully"})
        } else if sql.trim().is_empty() {
            return Err(ExecError::Rejected("Empty SQL query".into()));
        } else {
            json!({"error": "Query not supported in demo", "received_query": sql})
        };
        Ok(result.to_string())
    }

    fn describe(&self) -> String {
        "demo".into()
    }
}

// Lowercase hex for blob values
mod hex {
    pub fn encode(data: &[u8]) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut s = String::with_capacity(data.len() * 2);
        for &b in data {
            s.push(HEX[(b >> 4) as usize] as char);
            s.push(HEX[(b & 0xf) as usize] as char);
        }
        s
    }
}
