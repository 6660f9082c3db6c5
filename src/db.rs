use log::{error, info};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, ExecResult,
    QueryResult, SqlErr, Statement, Value,
};
use std::fs;
use std::path::Path;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::query::{Param, Query};

pub async fn connect_db(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let url = config.database_url();
    if url.starts_with("sqlite:") {
        ensure_sqlite_dir(&url);
    }
    let db = Database::connect(ConnectOptions::new(url)).await?;
    init_sqlite_schema(&db).await?;
    Ok(db)
}

fn ensure_sqlite_dir(url: &str) {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        let _ = fs::create_dir_all(parent);
    }
}

/// Creates the members table on SQLite when it is missing. Other backends
/// are expected to be migrated externally.
pub async fn init_sqlite_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    if backend != DbBackend::Sqlite {
        return Ok(());
    }
    let exists_stmt = Statement::from_string(
        backend,
        "SELECT name FROM sqlite_master WHERE type='table' AND name='members' LIMIT 1",
    );
    if db.query_one(exists_stmt).await?.is_some() {
        return Ok(());
    }

    let sql = include_str!("../members-sqlite.sql");
    for stmt in split_sql(sql) {
        db.execute(Statement::from_string(backend, stmt)).await?;
    }
    info!("sqlite schema initialised");
    Ok(())
}

fn split_sql(input: &str) -> Vec<String> {
    let mut buf = String::new();
    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }
        buf.push_str(line);
        buf.push('\n');
    }
    buf.split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Set-expansion: every `?` bound to a [`Param::List`] of n values becomes
/// n comma-separated placeholders, and the list is flattened in place.
pub fn expand_in(sql: &str, params: Vec<Param>) -> Result<(String, Vec<Value>), AppError> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::with_capacity(params.len());
    let mut params = params.into_iter();

    for ch in sql.chars() {
        if ch != '?' {
            out.push(ch);
            continue;
        }
        match params.next() {
            Some(Param::Value(v)) => {
                out.push('?');
                values.push(v);
            }
            Some(Param::List(list)) => {
                if list.is_empty() {
                    return Err(AppError::param_error("Empty list in filter"));
                }
                out.push_str(&vec!["?"; list.len()].join(", "));
                values.extend(list);
            }
            None => return Err(AppError::integrity("Fewer parameters than placeholders")),
        }
    }
    if params.next().is_some() {
        return Err(AppError::integrity("More parameters than placeholders"));
    }
    Ok((out, values))
}

/// Rewrites `?` placeholders into the backend's native form.
pub fn rebind(backend: DbBackend, sql: &str) -> String {
    match backend {
        DbBackend::Postgres => {
            let mut out = String::with_capacity(sql.len() + 8);
            let mut n = 0;
            for ch in sql.chars() {
                if ch == '?' {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                } else {
                    out.push(ch);
                }
            }
            out
        }
        DbBackend::MySql | DbBackend::Sqlite => sql.to_string(),
    }
}

pub fn statement(backend: DbBackend, query: Query) -> Result<Statement, AppError> {
    let (sql, values) = expand_in(&query.sql, query.params)?;
    Ok(Statement::from_sql_and_values(backend, &rebind(backend, &sql), values))
}

pub async fn query_one<C: ConnectionTrait>(db: &C, query: Query) -> Result<Option<QueryResult>, AppError> {
    let sql = query.sql.clone();
    let stmt = statement(db.get_database_backend(), query)?;
    db.query_one(stmt).await.map_err(|e| {
        error!("query_one failed: {} (sql={})", e, sql);
        AppError::Storage(e)
    })
}

pub async fn query_all<C: ConnectionTrait>(db: &C, query: Query) -> Result<Vec<QueryResult>, AppError> {
    let sql = query.sql.clone();
    let stmt = statement(db.get_database_backend(), query)?;
    db.query_all(stmt).await.map_err(|e| {
        error!("query_all failed: {} (sql={})", e, sql);
        AppError::Storage(e)
    })
}

pub async fn query_count<C: ConnectionTrait>(db: &C, query: Query) -> Result<i64, AppError> {
    let row = query_one(db, query).await?;
    match row {
        Some(row) => Ok(row.try_get::<i64>("", "cnt")?),
        None => Ok(0),
    }
}

pub async fn exec_sql<C: ConnectionTrait>(db: &C, query: Query) -> Result<ExecResult, AppError> {
    let sql = query.sql.clone();
    let stmt = statement(db.get_database_backend(), query)?;
    db.execute(stmt).await.map_err(|e| {
        if !is_unique_violation(&e) {
            error!("exec_sql failed: {} (sql={})", e, sql);
        }
        AppError::Storage(e)
    })
}

pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
pub async fn connect_memory() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    init_sqlite_schema(&db).await.unwrap();
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_list_params_in_place() {
        let params = vec![
            Param::Value(1i64.into()),
            Param::List(vec![0i64.into(), (-1i64).into(), 2i64.into()]),
            Param::Value("readr%".into()),
        ];
        let (sql, values) =
            expand_in("SELECT id FROM members WHERE active = ? AND role IN (?) AND nickname LIKE ?", params)
                .unwrap();
        assert_eq!(
            sql,
            "SELECT id FROM members WHERE active = ? AND role IN (?, ?, ?) AND nickname LIKE ?"
        );
        assert_eq!(
            values,
            vec![
                Value::from(1i64),
                Value::from(0i64),
                Value::from(-1i64),
                Value::from(2i64),
                Value::from("readr%"),
            ]
        );
    }

    #[test]
    fn empty_list_is_a_validation_error() {
        let err = expand_in("UPDATE members SET active = ? WHERE id IN (?)", vec![
            Param::Value(1i64.into()),
            Param::List(vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn placeholder_mismatch_is_detected() {
        assert!(matches!(
            expand_in("id = ? AND role = ?", vec![Param::Value(1i64.into())]),
            Err(AppError::Integrity(_))
        ));
        assert!(matches!(
            expand_in("id = ?", vec![Param::Value(1i64.into()), Param::Value(2i64.into())]),
            Err(AppError::Integrity(_))
        ));
    }

    #[test]
    fn rebind_numbers_postgres_placeholders() {
        let sql = "UPDATE members SET active = ? WHERE id IN (?, ?)";
        assert_eq!(
            rebind(DbBackend::Postgres, sql),
            "UPDATE members SET active = $1 WHERE id IN ($2, $3)"
        );
        assert_eq!(rebind(DbBackend::MySql, sql), sql);
        assert_eq!(rebind(DbBackend::Sqlite, sql), sql);
    }

    #[actix_rt::test]
    async fn unique_violation_is_read_from_driver_error() {
        let db = connect_memory().await;
        let insert = || Query {
            sql: "INSERT INTO members (member_id, uuid) VALUES (?, ?)".to_string(),
            params: vec![Param::Value("readr".into()), Param::Value("u-1".into())],
        };
        exec_sql(&db, insert()).await.unwrap();

        match exec_sql(&db, insert()).await {
            Err(AppError::Storage(e)) => assert!(is_unique_violation(&e)),
            other => panic!("expected storage error, got {:?}", other.map(|r| r.rows_affected())),
        }
        assert!(!is_unique_violation(&DbErr::Custom("UNIQUE in a message".to_string())));
    }

    #[test]
    fn split_sql_drops_comments() {
        let stmts = split_sql("-- members\nCREATE TABLE a (id INTEGER);\n\nCREATE INDEX i ON a (id);\n");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TABLE a"));
    }
}
