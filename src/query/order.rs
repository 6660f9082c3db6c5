use super::Param;
use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    /// `field` sorts ascending, `-field` descending. The field must be one of
    /// `allowed`.
    pub fn parse(token: &str, allowed: &[&str]) -> Result<Self, AppError> {
        let (field, direction) = match token.strip_prefix('-') {
            Some(rest) => (rest, Direction::Desc),
            None => (token, Direction::Asc),
        };
        if !allowed.contains(&field) {
            return Err(AppError::param_error(format!("Invalid sort field: {}", field)));
        }
        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }

    pub fn sql(&self) -> String {
        match self.direction {
            Direction::Asc => format!("{} ASC", self.field),
            Direction::Desc => format!("{} DESC", self.field),
        }
    }
}

/// ORDER BY / LIMIT / OFFSET tail of a select.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pagination {
    order: Option<OrderBy>,
    max_result: u64,
    page: u64,
}

impl Pagination {
    pub fn new(sort: &str, max_result: u64, page: u64, allowed: &[&str]) -> Result<Self, AppError> {
        let order = if sort.is_empty() {
            None
        } else {
            Some(OrderBy::parse(sort, allowed)?)
        };
        Ok(Self {
            order,
            max_result,
            page,
        })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A zero `max_result` disables both LIMIT and OFFSET; `page` is 1-based
    /// and a zero page omits OFFSET.
    pub fn fragment(&self) -> (String, Vec<Param>) {
        let mut parts = Vec::new();
        let mut params = Vec::new();

        if let Some(order) = &self.order {
            parts.push(format!("ORDER BY {}", order.sql()));
        }
        if self.max_result > 0 {
            parts.push("LIMIT ?".to_string());
            params.push(Param::Value((self.max_result as i64).into()));
            if self.page > 0 {
                parts.push("OFFSET ?".to_string());
                params.push(Param::Value((((self.page - 1) * self.max_result) as i64).into()));
            }
        }
        (parts.join(" "), params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOWED: &[&str] = &["id", "updated_at"];

    #[test]
    fn leading_dash_sorts_descending() {
        let order = OrderBy::parse("-updated_at", ALLOWED).unwrap();
        assert_eq!(order.sql(), "updated_at DESC");
        assert_eq!(OrderBy::parse("updated_at", ALLOWED).unwrap().sql(), "updated_at ASC");
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let err = OrderBy::parse("-password; DROP TABLE members", ALLOWED).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn limit_and_offset_follow_page() {
        let p = Pagination::new("-updated_at", 20, 3, ALLOWED).unwrap();
        let (sql, params) = p.fragment();
        assert_eq!(sql, "ORDER BY updated_at DESC LIMIT ? OFFSET ?");
        assert_eq!(
            params,
            vec![Param::Value(20i64.into()), Param::Value(40i64.into())]
        );
    }

    #[test]
    fn zero_page_size_is_unbounded() {
        let p = Pagination::new("", 0, 7, ALLOWED).unwrap();
        let (sql, params) = p.fragment();
        assert_eq!(sql, "");
        assert!(params.is_empty());
    }

    #[test]
    fn zero_page_omits_offset() {
        let (sql, params) = Pagination::new("id", 5, 0, ALLOWED).unwrap().fragment();
        assert_eq!(sql, "ORDER BY id ASC LIMIT ?");
        assert_eq!(params.len(), 1);
    }
}
