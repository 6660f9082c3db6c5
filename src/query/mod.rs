//! SQL assembly for single-table statements.
//!
//! Statements are built from a [`Predicate`] and a [`Pagination`] and carry
//! their bound parameters in placeholder order: predicate values first,
//! then pagination values.

mod order;
mod predicate;

use sea_orm::{DbBackend, Value};

pub use order::Pagination;
pub use predicate::Predicate;

/// A bound parameter. `List` occupies a single `?` until it is expanded by
/// [`crate::db::expand_in`].
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    Value(Value),
    List(Vec<Value>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<Param>,
}

fn join_parts(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cast to text for substring matching. PostgreSQL reads a bare `CHAR` as
/// `char(1)` and MySQL has no `CAST .. AS TEXT`.
pub fn text_cast(backend: DbBackend, expr: &str) -> String {
    match backend {
        DbBackend::MySql => format!("CAST({} AS CHAR)", expr),
        DbBackend::Postgres | DbBackend::Sqlite => format!("CAST({} AS TEXT)", expr),
    }
}

pub fn select(table: &str, fields: &[&str], predicate: &Predicate, pagination: &Pagination) -> Query {
    let head = format!("SELECT {} FROM {}", fields.join(", "), table);
    let where_clause = predicate.where_clause();
    let (tail, tail_params) = pagination.fragment();

    let mut params = predicate.params().to_vec();
    params.extend(tail_params);
    Query {
        sql: join_parts(&[head.as_str(), where_clause.as_str(), tail.as_str()]),
        params,
    }
}

/// Count never carries pagination.
pub fn count(table: &str, expr: &str, predicate: &Predicate) -> Query {
    let head = format!("SELECT COUNT({}) AS cnt FROM {}", expr, table);
    let where_clause = predicate.where_clause();
    Query {
        sql: join_parts(&[head.as_str(), where_clause.as_str()]),
        params: predicate.params().to_vec(),
    }
}

pub fn insert(table: &str, columns: Vec<(&str, Value)>) -> Query {
    let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    let placeholders = vec!["?"; names.len()].join(", ");
    Query {
        sql: format!("INSERT INTO {} ({}) VALUES ({})", table, names.join(", "), placeholders),
        params: columns.into_iter().map(|(_, v)| Param::Value(v)).collect(),
    }
}

pub fn update(table: &str, columns: Vec<(&str, Value)>, key: (&str, Value)) -> Query {
    let mut predicate = Predicate::new();
    predicate.eq(key.0, key.1);
    update_where(table, columns, &predicate)
}

/// SET values bind before the predicate values.
pub fn update_where(table: &str, columns: Vec<(&str, Value)>, predicate: &Predicate) -> Query {
    let assignments: Vec<String> = columns.iter().map(|(name, _)| format!("{} = ?", name)).collect();
    let head = format!("UPDATE {} SET {}", table, assignments.join(", "));
    let where_clause = predicate.where_clause();

    let mut params: Vec<Param> = columns.into_iter().map(|(_, v)| Param::Value(v)).collect();
    params.extend(predicate.params().iter().cloned());
    Query {
        sql: join_parts(&[head.as_str(), where_clause.as_str()]),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOWED: &[&str] = &["id", "nickname", "updated_at"];

    #[test]
    fn select_orders_predicate_before_pagination_params() {
        let mut predicate = Predicate::new();
        predicate.eq("role", 3i64).in_list("members.id", &[1i64, 2]);
        let pagination = Pagination::new("-updated_at", 10, 2, ALLOWED).unwrap();

        let q = select("members", &["id", "nickname"], &predicate, &pagination);
        assert_eq!(
            q.sql,
            "SELECT id, nickname FROM members WHERE role = ? AND members.id IN (?, ?) ORDER BY updated_at DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            q.params,
            vec![
                Param::Value(3i64.into()),
                Param::Value(1i64.into()),
                Param::Value(2i64.into()),
                Param::Value(10i64.into()),
                Param::Value(10i64.into()),
            ]
        );
    }

    #[test]
    fn select_without_filters_is_bare() {
        let q = select("members", &["id"], &Predicate::new(), &Pagination::unbounded());
        assert_eq!(q.sql, "SELECT id FROM members");
        assert!(q.params.is_empty());
    }

    #[test]
    fn count_ignores_pagination() {
        let mut predicate = Predicate::new();
        predicate.eq("custom_editor", true);
        let q = count("members", "*", &predicate);
        assert_eq!(q.sql, "SELECT COUNT(*) AS cnt FROM members WHERE custom_editor = ?");
        assert_eq!(q.params, vec![Param::Value(true.into())]);
    }

    #[test]
    fn insert_lists_columns_and_placeholders() {
        let q = insert(
            "members",
            vec![("member_id", "spaceoddity".into()), ("name", "Major Tom".into())],
        );
        assert_eq!(q.sql, "INSERT INTO members (member_id, name) VALUES (?, ?)");
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn update_binds_key_last() {
        let q = update(
            "members",
            vec![("name", "Clark Kent".into()), ("daily_push", true.into())],
            ("id", 1i64.into()),
        );
        assert_eq!(q.sql, "UPDATE members SET name = ?, daily_push = ? WHERE id = ?");
        assert_eq!(q.params.last(), Some(&Param::Value(1i64.into())));
    }

    #[test]
    fn update_where_keeps_list_params_after_set_values() {
        let mut predicate = Predicate::new();
        predicate.push("id IN (?)", vec![Param::List(vec![1i64.into(), 2i64.into()])]);
        let q = update_where("members", vec![("active", 0i64.into())], &predicate);
        assert_eq!(q.sql, "UPDATE members SET active = ? WHERE id IN (?)");
        assert_eq!(
            q.params,
            vec![
                Param::Value(0i64.into()),
                Param::List(vec![1i64.into(), 2i64.into()]),
            ]
        );
    }
}
