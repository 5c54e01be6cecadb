pub mod sqlite;

use std::error::Error;
use std::fmt::{Display, Formatter};

pub use sqlite::SqliteDatabase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    Connection(String),
    NotFound(Vec<String>),
    Execution(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "database connection error: {msg}"),
            Self::NotFound(names) => {
                write!(f, "table_names {{{}}} not found in database", names.join(", "))
            }
            Self::Execution(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error for DbError {}

pub type DbResult<T> = std::result::Result<T, DbError>;

pub trait SqlDatabase: Send + Sync {
    fn dialect(&self) -> &str;

    fn usable_table_names(&self) -> DbResult<Vec<String>>;

    fn table_info(&self, table_names: &[String]) -> DbResult<String>;

    fn run(&self, sql: &str) -> DbResult<String>;
}
