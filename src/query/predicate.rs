use std::collections::BTreeMap;

use sea_orm::Value;

use super::Param;
use crate::error::AppError;

/// Operator keys accepted by set-membership filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOperator {
    In,
    NotIn,
}

impl SetOperator {
    pub fn parse(key: &str) -> Result<Self, AppError> {
        match key {
            "$in" => Ok(Self::In),
            "$nin" => Ok(Self::NotIn),
            other => Err(AppError::param_error(format!("Invalid operator: {}", other))),
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }
}

/// WHERE fragment under construction: clauses joined by AND, with one
/// entry in `params` per `?` in the clauses, in order.
#[derive(Clone, Debug, Default)]
pub struct Predicate {
    clauses: Vec<String>,
    params: Vec<Param>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: impl Into<String>, params: Vec<Param>) -> &mut Self {
        self.clauses.push(clause.into());
        self.params.extend(params);
        self
    }

    pub fn eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.push(format!("{} = ?", column), vec![Param::Value(value.into())])
    }

    pub fn like(&mut self, expr: &str, pattern: String) -> &mut Self {
        self.push(format!("{} LIKE ?", expr), vec![Param::Value(pattern.into())])
    }

    /// Substring match. `%` and `_` in `needle` are passed through unescaped.
    pub fn contains(&mut self, expr: &str, needle: &str) -> &mut Self {
        self.like(expr, format!("%{}%", needle))
    }

    pub fn starts_with(&mut self, expr: &str, prefix: &str) -> &mut Self {
        self.like(expr, format!("{}%", prefix))
    }

    /// `$gt` becomes `>=` and `$lt` becomes `<=`; both bounds are inclusive.
    pub fn range<V>(&mut self, column: &str, bounds: &BTreeMap<String, V>) -> Result<&mut Self, AppError>
    where
        V: Clone + Into<Value>,
    {
        if let Some(key) = bounds.keys().find(|k| *k != "$gt" && *k != "$lt") {
            return Err(AppError::param_error(format!("Invalid range operator: {}", key)));
        }
        if let Some(v) = bounds.get("$gt") {
            self.push(format!("{} >= ?", column), vec![Param::Value(v.clone().into())]);
        }
        if let Some(v) = bounds.get("$lt") {
            self.push(format!("{} <= ?", column), vec![Param::Value(v.clone().into())]);
        }
        Ok(self)
    }

    /// Set membership from `{"$in": [...]}` or `{"$nin": [...]}`. The list is
    /// bound as a single parameter and expanded right before execution.
    pub fn set<V>(
        &mut self,
        column: &str,
        filter: &BTreeMap<String, Vec<V>>,
        too_many: &str,
    ) -> Result<&mut Self, AppError>
    where
        V: Clone + Into<Value>,
    {
        if filter.len() > 1 {
            return Err(AppError::param_error(too_many));
        }
        if let Some((key, values)) = filter.iter().next() {
            let op = SetOperator::parse(key)?;
            let list = values.iter().cloned().map(Into::into).collect();
            self.push(format!("{} {} (?)", column, op.sql()), vec![Param::List(list)]);
        }
        Ok(self)
    }

    /// `column IN (?, ?, ...)` with one placeholder per element.
    pub fn in_list<V>(&mut self, column: &str, values: &[V]) -> &mut Self
    where
        V: Clone + Into<Value>,
    {
        if values.is_empty() {
            return self;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        let params = values.iter().cloned().map(|v| Param::Value(v.into())).collect();
        self.push(format!("{} IN ({})", column, placeholders), params)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// `WHERE a AND b`, or an empty string when nothing was contributed.
    pub fn where_clause(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}
