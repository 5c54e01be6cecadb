use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, OpenFlags, OptionalExtension};

use super::{DbError, DbResult, SqlDatabase};

pub const SQLITE_DIALECT: &str = "sqlite";
pub const DEFAULT_SAMPLE_ROWS_IN_TABLE_INFO: usize = 3;
pub const DEFAULT_MAX_STRING_LENGTH: usize = 300;
const SAMPLE_VALUE_MAX_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SqliteTarget {
    Memory,
    File(PathBuf),
}

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
    sample_rows_in_table_info: usize,
    max_string_length: usize,
}

impl SqliteDatabase {
    /// A missing database file is a connection error; nothing is created on disk.
    pub fn from_uri(uri: &str) -> DbResult<Self> {
        let conn = match parse_sqlite_uri(uri)? {
            SqliteTarget::Memory => Connection::open_in_memory(),
            SqliteTarget::File(path) => Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
        }
        .map_err(|err| DbError::Connection(format!("unable to open {uri}: {err}")))?;

        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|err| DbError::Connection(format!("unable to read {uri}: {err}")))?;

        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            sample_rows_in_table_info: DEFAULT_SAMPLE_ROWS_IN_TABLE_INFO,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
        }
    }

    pub fn with_sample_rows_in_table_info(mut self, rows: usize) -> Self {
        self.sample_rows_in_table_info = rows;
        self
    }

    pub fn with_max_string_length(mut self, max_len: usize) -> Self {
        self.max_string_length = max_len;
        self
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DbError::Connection("connection lock poisoned".to_string()))
    }

    fn describe_table(&self, conn: &Connection, table: &str) -> DbResult<String> {
        let ddl = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = ?1 AND sql IS NOT NULL",
                [table],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(execution_error)?
            .ok_or_else(|| DbError::NotFound(vec![table.to_string()]))?;

        if self.sample_rows_in_table_info == 0 {
            return Ok(ddl);
        }

        let sample_sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(table),
            self.sample_rows_in_table_info
        );
        let mut stmt = conn
            .prepare(&sample_sql)
            .map_err(execution_error)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();

        let mut lines = vec![columns.join("\t")];
        let mut rows = stmt
            .query([])
            .map_err(execution_error)?;
        while let Some(row) = rows
            .next()
            .map_err(execution_error)?
        {
            let mut cells = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                let value = row
                    .get_ref(idx)
                    .map_err(execution_error)?;
                cells.push(render_plain(value, SAMPLE_VALUE_MAX_LEN));
            }
            lines.push(cells.join("\t"));
        }

        Ok(format!(
            "{ddl}\n\n/*\n{} rows from {table} table:\n{}\n*/",
            self.sample_rows_in_table_info,
            lines.join("\n")
        ))
    }
}

impl SqlDatabase for SqliteDatabase {
    fn dialect(&self) -> &str {
        SQLITE_DIALECT
    }

    fn usable_table_names(&self) -> DbResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )
            .map_err(|err| DbError::Connection(err.to_string()))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|err| DbError::Connection(err.to_string()))?;
        Ok(names)
    }

    fn table_info(&self, table_names: &[String]) -> DbResult<String> {
        let known = self.usable_table_names()?;
        let missing = table_names
            .iter()
            .filter(|name| !known.contains(name))
            .cloned()
            .collect::<Vec<_>>();
        if table_names.is_empty() {
            return Err(DbError::Execution(
                "no table names given, expected a comma-separated list of tables".to_string(),
            ));
        }
        if !missing.is_empty() {
            return Err(DbError::NotFound(missing));
        }

        let conn = self.lock()?;
        let mut sections = Vec::with_capacity(table_names.len());
        for table in table_names {
            sections.push(self.describe_table(&conn, table)?);
        }
        Ok(sections.join("\n\n"))
    }

    fn run(&self, sql: &str) -> DbResult<String> {
        let conn = self.lock()?;
        let mut batch = Batch::new(&conn, sql);
        let Some(mut stmt) = batch.next().map_err(execution_error)? else {
            return Err(DbError::Execution(
                "empty query, expected one SQL statement".to_string(),
            ));
        };
        if !matches!(batch.next(), Ok(None)) {
            return Err(DbError::Execution(
                "You can only execute one statement at a time.".to_string(),
            ));
        }

        let column_count = stmt.column_count();
        if column_count == 0 {
            stmt.execute([])
                .map_err(execution_error)?;
            return Ok(String::new());
        }

        let mut rendered = Vec::new();
        let mut rows = stmt
            .query([])
            .map_err(execution_error)?;
        while let Some(row) = rows
            .next()
            .map_err(execution_error)?
        {
            let mut cells = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value = row
                    .get_ref(idx)
                    .map_err(execution_error)?;
                cells.push(render_literal(value, self.max_string_length));
            }
            rendered.push(render_tuple(&cells));
        }

        if rendered.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("[{}]", rendered.join(", ")))
        }
    }
}

fn parse_sqlite_uri(uri: &str) -> DbResult<SqliteTarget> {
    let uri = uri.trim();
    let Some(rest) = uri.strip_prefix("sqlite://") else {
        return match uri.split_once("://") {
            Some((scheme, _)) => Err(DbError::Connection(format!(
                "unsupported database scheme '{scheme}', expected sqlite"
            ))),
            None => Err(DbError::Connection(format!(
                "invalid database URI '{uri}', expected sqlite:///path/to/file.db"
            ))),
        };
    };

    let rest = rest.split_once('?').map_or(rest, |(path, _)| path);
    match rest {
        "" | "/" | "/:memory:" => Ok(SqliteTarget::Memory),
        _ => match rest.strip_prefix('/') {
            Some(path) => Ok(SqliteTarget::File(PathBuf::from(path))),
            None => Err(DbError::Connection(format!(
                "invalid sqlite URI '{uri}', expected sqlite:///path/to/file.db"
            ))),
        },
    }
}

fn execution_error(err: rusqlite::Error) -> DbError {
    let msg = match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg,
        rusqlite::Error::SqlInputError { msg, .. } => msg,
        other => other.to_string(),
    };
    DbError::Execution(msg)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn render_tuple(cells: &[String]) -> String {
    if cells.len() == 1 {
        format!("({},)", cells[0])
    } else {
        format!("({})", cells.join(", "))
    }
}

fn render_literal(value: ValueRef<'_>, max_len: usize) -> String {
    match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => render_float(v),
        ValueRef::Text(bytes) => {
            let text = truncate_value(&String::from_utf8_lossy(bytes), max_len);
            quote_text(&text)
        }
        ValueRef::Blob(bytes) => render_bytes(bytes),
    }
}

// Python repr: signed exponent with at least two digits.
fn render_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let debug = format!("{value:?}");
    let Some((mantissa, exponent)) = debug.split_once('e') else {
        return debug;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

fn quote_text(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn render_bytes(bytes: &[u8]) -> String {
    let quote = if bytes.contains(&b'\'') && !bytes.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };

    let mut out = String::with_capacity(bytes.len() + 3);
    out.push('b');
    out.push(char::from(quote));
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if b == quote => {
                out.push('\\');
                out.push(char::from(b));
            }
            0x20..=0x7e => out.push(char::from(byte)),
            other => out.push_str(&format!("\\x{other:02x}")),
        }
    }
    out.push(char::from(quote));
    out
}

fn render_plain(value: ValueRef<'_>, max_len: usize) -> String {
    match value {
        ValueRef::Text(bytes) => truncate_value(&String::from_utf8_lossy(bytes), max_len),
        ValueRef::Null => "None".to_string(),
        other => render_literal(other, max_len),
    }
}

fn truncate_value(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let head = text.chars().take(max_len).collect::<String>();
    format!("{head}...")
}
