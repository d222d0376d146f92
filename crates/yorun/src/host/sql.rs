//! # SQL host functions
//!
//! `yomo_sql_open(drvPtr, drvLen, dsnPtr, dsnLen)`,
//! `yomo_sql_query(qPtr, qLen, argsPtr, argsLen, outPtrCell, outSizeCell)`,
//! `yomo_sql_query_row(…)`, `yomo_sql_exec(…)`, `yomo_sql_close()`.
//!
//! Arguments are a JSON array of scalars; `query`/`query_row` results are
//! JSON row maps; `exec` returns `{"last_insert_id", "rows_affected"}`.
//! A `query_row` with zero rows writes nothing: the guest's size cell stays
//! at whatever it initialized it to, which is how it tells "no rows" from a
//! row. The database handle is owned by the instance.

use anyhow::Result;
use anyhow::anyhow;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde_json::Value as JsonValue;
use wasmtime::Caller;
use wasmtime::Linker;

use crate::context::GuestContext;
use crate::memory::alloc_buffer;
use crate::memory::read_buffer;

pub(crate) fn link(linker: &mut Linker<GuestContext>) -> Result<()> {
    linker.func_wrap("env", "yomo_sql_open", open)?;
    linker.func_wrap("env", "yomo_sql_query", query)?;
    linker.func_wrap("env", "yomo_sql_query_row", query_row)?;
    linker.func_wrap("env", "yomo_sql_exec", exec)?;
    linker.func_wrap("env", "yomo_sql_close", close)?;
    Ok(())
}

/// Opens a database by driver name and data source name, then pings it.
/// Codes: 0 ok, 1/2 argument read error, 3 open error, 4 ping error.
fn open(
    mut caller: Caller<'_, GuestContext>,
    driver_ptr: u32,
    driver_len: u32,
    dsn_ptr: u32,
    dsn_len: u32,
) -> u32 {
    let driver = match read_buffer(&mut caller, driver_ptr, driver_len) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            tracing::error!(err = %err, "sql open: get driver name error");
            return 1;
        }
    };
    let dsn = match read_buffer(&mut caller, dsn_ptr, dsn_len) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            tracing::error!(err = %err, "sql open: get data source name error");
            return 2;
        }
    };

    let conn = match open_driver(&driver, &dsn) {
        Ok(conn) => conn,
        Err(err) => {
            tracing::error!(driver = %driver, err = %err, "sql open: open error");
            return 3;
        }
    };
    if let Err(err) = conn.query_row("SELECT 1", [], |_| Ok(())) {
        tracing::error!(err = %err, "sql open: ping error");
        return 4;
    }

    tracing::info!(driver = %driver, "sql open: success");
    caller.data_mut().sql = Some(conn);
    0
}

/// The driver table. The bundled sqlite engine is the carried driver; an
/// unknown name is an open error.
fn open_driver(driver: &str, dsn: &str) -> Result<rusqlite::Connection> {
    match driver {
        "sqlite" | "sqlite3" => Ok(rusqlite::Connection::open(dsn)?),
        other => Err(anyhow!("unknown sql driver `{}`", other)),
    }
}

/// Executes a query returning rows, typically a SELECT.
/// Codes: 0 ok, 1 query read, 2 args read, 3 args decode, 4 execute,
/// 5 row scan, 6 marshal, 9 memory write.
fn query(
    mut caller: Caller<'_, GuestContext>,
    query_ptr: u32,
    query_len: u32,
    args_ptr: u32,
    args_len: u32,
    out_ptr_cell: u32,
    out_size_cell: u32,
) -> u32 {
    let (sql, args) = match read_query_and_args(&mut caller, query_ptr, query_len, args_ptr, args_len)
    {
        Ok(parts) => parts,
        Err(code) => return code,
    };

    let rows = match run_query(&mut caller, &sql, &args) {
        Ok(rows) => rows,
        Err(code) => return code,
    };

    let buf = match serde_json::to_vec(&rows) {
        Ok(buf) => buf,
        Err(err) => {
            tracing::error!(err = %err, "sql query: marshal error");
            return 6;
        }
    };
    if let Err(err) = alloc_buffer(&mut caller, out_ptr_cell, out_size_cell, &buf) {
        tracing::error!(err = %err, "sql query: allocate buffer error");
        return 9;
    }
    0
}

/// Executes a query expected to return at most one row. Zero rows succeed
/// without touching the out cells.
fn query_row(
    mut caller: Caller<'_, GuestContext>,
    query_ptr: u32,
    query_len: u32,
    args_ptr: u32,
    args_len: u32,
    out_ptr_cell: u32,
    out_size_cell: u32,
) -> u32 {
    let (sql, args) = match read_query_and_args(&mut caller, query_ptr, query_len, args_ptr, args_len)
    {
        Ok(parts) => parts,
        Err(code) => return code,
    };

    let mut rows = match run_query(&mut caller, &sql, &args) {
        Ok(rows) => rows,
        Err(code) => return code,
    };
    if rows.is_empty() {
        return 0;
    }

    let buf = match serde_json::to_vec(&rows.remove(0)) {
        Ok(buf) => buf,
        Err(err) => {
            tracing::error!(err = %err, "sql query row: marshal error");
            return 6;
        }
    };
    if let Err(err) = alloc_buffer(&mut caller, out_ptr_cell, out_size_cell, &buf) {
        tracing::error!(err = %err, "sql query row: allocate buffer error");
        return 9;
    }
    0
}

/// Executes a statement without returning rows.
fn exec(
    mut caller: Caller<'_, GuestContext>,
    query_ptr: u32,
    query_len: u32,
    args_ptr: u32,
    args_len: u32,
    out_ptr_cell: u32,
    out_size_cell: u32,
) -> u32 {
    let (sql, args) = match read_query_and_args(&mut caller, query_ptr, query_len, args_ptr, args_len)
    {
        Ok(parts) => parts,
        Err(code) => return code,
    };

    let Some(conn) = caller.data().sql.as_ref() else {
        tracing::error!("sql exec: no open database");
        return 4;
    };
    let rows_affected = match conn.execute(&sql, params_from_iter(args)) {
        Ok(n) => n as i64,
        Err(err) => {
            tracing::error!(query = %sql, err = %err, "sql exec: execute error");
            return 4;
        }
    };
    let last_insert_id = conn.last_insert_rowid();

    let result = serde_json::json!({
        "last_insert_id": last_insert_id,
        "rows_affected": rows_affected,
    });
    let buf = match serde_json::to_vec(&result) {
        Ok(buf) => buf,
        Err(err) => {
            tracing::error!(err = %err, "sql exec: marshal error");
            return 6;
        }
    };
    if let Err(err) = alloc_buffer(&mut caller, out_ptr_cell, out_size_cell, &buf) {
        tracing::error!(err = %err, "sql exec: allocate buffer error");
        return 9;
    }
    0
}

/// Closes the database. Codes: 0 ok, 1 close error (including no open
/// handle).
fn close(mut caller: Caller<'_, GuestContext>) -> u32 {
    match caller.data_mut().sql.take() {
        Some(conn) => match conn.close() {
            Ok(()) => 0,
            Err((conn, err)) => {
                tracing::error!(err = %err, "sql close: error");
                caller.data_mut().sql = Some(conn);
                1
            }
        },
        None => {
            tracing::error!("sql close: no open database");
            1
        }
    }
}

/// Reads the query string (code 1) and decodes the JSON argument array
/// (codes 2, 3). A zero pointer or length means no arguments.
fn read_query_and_args(
    caller: &mut Caller<'_, GuestContext>,
    query_ptr: u32,
    query_len: u32,
    args_ptr: u32,
    args_len: u32,
) -> std::result::Result<(String, Vec<SqlValue>), u32> {
    let sql = match read_buffer(caller, query_ptr, query_len) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            tracing::error!(err = %err, "sql: get query error");
            return Err(1);
        }
    };

    if args_ptr == 0 || args_len == 0 {
        return Ok((sql, Vec::new()));
    }

    let args_buf = match read_buffer(caller, args_ptr, args_len) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(err = %err, "sql: get args error");
            return Err(2);
        }
    };
    let json_args: Vec<JsonValue> = match serde_json::from_slice(&args_buf) {
        Ok(args) => args,
        Err(err) => {
            tracing::error!(err = %err, "sql: args unmarshal error");
            return Err(3);
        }
    };
    Ok((sql, json_args.iter().map(json_to_sql).collect()))
}

/// Runs a row query, converting every row to a JSON map. Codes 4 (execute)
/// and 5 (scan) flow back to the caller.
fn run_query(
    caller: &mut Caller<'_, GuestContext>,
    sql: &str,
    args: &[SqlValue],
) -> std::result::Result<Vec<serde_json::Map<String, JsonValue>>, u32> {
    let Some(conn) = caller.data().sql.as_ref() else {
        tracing::error!("sql query: no open database");
        return Err(4);
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(err) => {
            tracing::error!(query = %sql, err = %err, "sql query: execute error");
            return Err(4);
        }
    };
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = match stmt.query(params_from_iter(args.iter().cloned())) {
        Ok(rows) => rows,
        Err(err) => {
            tracing::error!(query = %sql, err = %err, "sql query: execute error");
            return Err(4);
        }
    };

    let mut result = Vec::new();
    loop {
        let row = match rows.next() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(err = %err, "sql query: row scan error");
                return Err(5);
            }
        };
        let mut map = serde_json::Map::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let value: SqlValue = match row.get(i) {
                Ok(value) => value,
                Err(err) => {
                    tracing::error!(err = %err, "sql query: row scan error");
                    return Err(5);
                }
            };
            map.insert(column.clone(), sql_to_json(value));
        }
        result.push(map);
    }
    Ok(result)
}

fn json_to_sql(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(*b as i64),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        // Nested arrays and objects are not scalars; bind their JSON text.
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: SqlValue) -> JsonValue {
    match value {
        SqlValue::Null => JsonValue::Null,
        SqlValue::Integer(i) => JsonValue::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        SqlValue::Text(s) => JsonValue::String(s),
        SqlValue::Blob(bytes) => JsonValue::Array(bytes.into_iter().map(JsonValue::from).collect()),
    }
}
