use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use sea_orm::{DbBackend, Value};

use crate::config::MemberStatus;
use crate::entity::member::{FieldMode, Fields, Member, TABLE};
use crate::error::AppError;
use crate::query::{self, Pagination, Predicate, Query};

/// Operator-keyed value lists such as `{"$nin": [0, -1]}`.
pub type SetFilter = BTreeMap<String, Vec<i64>>;
/// Date bounds such as `{"$gt": ..., "$lt": ...}`.
pub type RangeFilter = BTreeMap<String, NaiveDateTime>;

fn full_fields() -> Vec<&'static str> {
    Member::default().get_fields(FieldMode::Full)
}

/// Builds the COUNT statement for a list-style argument shape.
pub trait CountQuery {
    fn count_query(&self, backend: DbBackend) -> Result<Query, AppError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdType {
    Id,
    MemberId,
    Mail,
}

impl IdType {
    /// All-digit ids address the numeric primary key, anything else the
    /// external member id.
    pub fn infer(id: &str) -> Self {
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            Self::Id
        } else {
            Self::MemberId
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::MemberId => "member_id",
            Self::Mail => "mail",
        }
    }

    pub fn bind(&self, id: &str) -> Result<Value, AppError> {
        if id.is_empty() {
            return Err(AppError::param_error("Invalid ID"));
        }
        match self {
            Self::Id => id
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| AppError::param_error("Invalid ID")),
            Self::MemberId | Self::Mail => Ok(id.to_string().into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GetMemberArgs {
    pub id_type: IdType,
    pub id: String,
    pub mode: Option<String>,
}

impl GetMemberArgs {
    pub fn new(id_type: IdType, id: impl Into<String>) -> Self {
        Self {
            id_type,
            id: id.into(),
            mode: None,
        }
    }

    pub fn predicate(&self) -> Result<Predicate, AppError> {
        let mut p = Predicate::new();
        p.eq(self.id_type.column(), self.id_type.bind(&self.id)?);
        if let Some(mode) = self.mode.as_deref().filter(|m| !m.is_empty()) {
            p.eq("register_mode", mode.to_string());
        }
        Ok(p)
    }

    pub fn select_query(&self) -> Result<Query, AppError> {
        Ok(query::select(
            TABLE,
            &full_fields(),
            &self.predicate()?,
            &Pagination::unbounded(),
        ))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GetMembersArgs {
    pub max_result: u8,
    pub page: u16,
    pub sort: String,
    pub custom_editor: bool,
    pub role: Option<i64>,
    pub active: Option<SetFilter>,
    pub ids: Vec<i64>,
    pub uuids: Vec<String>,
    pub total: bool,
}

impl Default for GetMembersArgs {
    fn default() -> Self {
        Self {
            max_result: 20,
            page: 1,
            sort: "-updated_at".to_string(),
            custom_editor: false,
            role: None,
            active: None,
            ids: Vec::new(),
            uuids: Vec::new(),
            total: false,
        }
    }
}

impl GetMembersArgs {
    /// Without an explicit active filter, deleted members are hidden.
    pub fn with_default_active(mut self, status: &MemberStatus) -> Self {
        if self.active.is_none() {
            let mut active = SetFilter::new();
            active.insert("$nin".to_string(), vec![status.delete()]);
            self.active = Some(active);
        }
        self
    }

    /// Checks the active filter against the configured status codes.
    pub fn validate(&self, status: &MemberStatus) -> Result<(), AppError> {
        let Some(active) = &self.active else {
            return Ok(());
        };
        if active.len() > 1 {
            return Err(AppError::param_error("Too many active lists"));
        }
        for codes in active.values() {
            let known = codes.iter().filter(|c| status.is_known(**c)).count();
            if known == 0 {
                return Err(AppError::param_error("No valid active request"));
            }
            if known < codes.len() {
                return Err(AppError::param_error("Not all active elements are valid"));
            }
        }
        Ok(())
    }

    pub fn predicate(&self) -> Result<Predicate, AppError> {
        let mut p = Predicate::new();
        if self.custom_editor {
            p.eq("custom_editor", true);
        }
        if let Some(role) = self.role {
            p.eq("role", role);
        }
        if let Some(active) = &self.active {
            p.set("members.active", active, "Too many active lists")?;
        }
        p.in_list("members.id", &self.ids);
        p.in_list("members.uuid", &self.uuids);
        Ok(p)
    }

    pub fn pagination(&self) -> Result<Pagination, AppError> {
        Pagination::new(
            &self.sort,
            u64::from(self.max_result),
            u64::from(self.page),
            &Member::selectable(),
        )
    }

    pub fn select_query(&self) -> Result<Query, AppError> {
        Ok(query::select(
            TABLE,
            &full_fields(),
            &self.predicate()?,
            &self.pagination()?,
        ))
    }
}

impl CountQuery for GetMembersArgs {
    fn count_query(&self, _backend: DbBackend) -> Result<Query, AppError> {
        Ok(query::count(TABLE, "*", &self.predicate()?))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterMemberArgs {
    pub max_result: u8,
    pub page: u16,
    pub sort: String,
    pub id: i64,
    pub mail: String,
    pub nickname: String,
    pub created_at: RangeFilter,
    pub updated_at: RangeFilter,
    pub fields: Vec<String>,
}

impl Default for FilterMemberArgs {
    fn default() -> Self {
        Self {
            max_result: 20,
            page: 1,
            sort: "-updated_at".to_string(),
            id: 0,
            mail: String::new(),
            nickname: String::new(),
            created_at: RangeFilter::new(),
            updated_at: RangeFilter::new(),
            fields: Vec::new(),
        }
    }
}

impl FilterMemberArgs {
    pub fn predicate(&self, backend: DbBackend) -> Result<Predicate, AppError> {
        let mut p = Predicate::new();
        if self.id != 0 {
            p.contains(&query::text_cast(backend, "members.id"), &self.id.to_string());
        }
        if !self.mail.is_empty() {
            p.contains(&query::text_cast(backend, "members.mail"), &self.mail);
        }
        if !self.nickname.is_empty() {
            p.contains(&query::text_cast(backend, "members.nickname"), &self.nickname);
        }
        p.range("members.created_at", &self.created_at)?;
        p.range("members.updated_at", &self.updated_at)?;
        Ok(p)
    }

    /// Requested projection; every selectable column when none was asked for.
    pub fn fields(&self) -> Result<Vec<&'static str>, AppError> {
        if self.fields.is_empty() {
            return Ok(Member::selectable());
        }
        Member::validate_fields(&self.fields)
    }

    pub fn select_query(&self, backend: DbBackend) -> Result<(Query, Vec<&'static str>), AppError> {
        let fields = self.fields()?;
        let pagination = Pagination::new(
            &self.sort,
            u64::from(self.max_result),
            u64::from(self.page),
            &Member::selectable(),
        )?;
        let q = query::select(TABLE, &fields, &self.predicate(backend)?, &pagination);
        Ok((q, fields))
    }
}

impl CountQuery for FilterMemberArgs {
    fn count_query(&self, backend: DbBackend) -> Result<Query, AppError> {
        Ok(query::count(TABLE, "member_id", &self.predicate(backend)?))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NicknameArgs {
    pub keyword: String,
    pub roles: Option<SetFilter>,
    pub fields: Vec<String>,
}

impl NicknameArgs {
    /// Validates the keyword and fields, returning the projection with `id`
    /// and `nickname` always present.
    pub fn validate(&self) -> Result<Vec<&'static str>, AppError> {
        if self.keyword.is_empty() {
            return Err(AppError::param_error("Invalid keyword"));
        }
        let mut fields = Member::validate_fields(&self.fields)?;
        for required in ["id", "nickname"] {
            if !fields.contains(&required) {
                fields.push(required);
            }
        }
        Ok(fields)
    }

    pub fn predicate(&self, active: i64) -> Result<Predicate, AppError> {
        let mut p = Predicate::new();
        p.eq("members.active", active);
        p.starts_with("members.nickname", &self.keyword);
        if let Some(roles) = &self.roles {
            p.set("members.role", roles, "Too many role lists")?;
        }
        Ok(p)
    }

    pub fn select_query(&self, active: i64) -> Result<(Query, Vec<&'static str>), AppError> {
        let fields = self.validate()?;
        let q = query::select(TABLE, &fields, &self.predicate(active)?, &Pagination::unbounded());
        Ok((q, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Param;
    use chrono::NaiveDate;

    fn status() -> MemberStatus {
        MemberStatus::parse("delete=-1,deactive=0,active=1").unwrap()
    }

    fn active(key: &str, codes: &[i64]) -> Option<SetFilter> {
        let mut f = SetFilter::new();
        f.insert(key.to_string(), codes.to_vec());
        Some(f)
    }

    #[test]
    fn id_type_inference() {
        assert_eq!(IdType::infer("24601"), IdType::Id);
        assert_eq!(IdType::infer("superman@mirrormedia.mg"), IdType::MemberId);
        assert_eq!(IdType::infer(""), IdType::MemberId);
        assert!(IdType::Id.bind("abc").is_err());
    }

    #[test]
    fn get_member_with_register_mode() {
        let mut args = GetMemberArgs::new(IdType::Mail, "registerdupeuser@mirrormedia.mg");
        args.mode = Some("ordinary".to_string());
        let p = args.predicate().unwrap();
        assert_eq!(p.where_clause(), "WHERE mail = ? AND register_mode = ?");
        assert_eq!(p.params().len(), 2);
    }

    #[test]
    fn list_defaults_hide_deleted_members() {
        let args = GetMembersArgs::default().with_default_active(&status());
        let q = args.select_query().unwrap();
        assert!(q.sql.ends_with(
            "FROM members WHERE members.active NOT IN (?) ORDER BY updated_at DESC LIMIT ? OFFSET ?"
        ));
        assert_eq!(
            q.params,
            vec![
                Param::List(vec![(-1i64).into()]),
                Param::Value(20i64.into()),
                Param::Value(0i64.into()),
            ]
        );
    }

    #[test]
    fn list_predicate_order_is_fixed() {
        let args = GetMembersArgs {
            custom_editor: true,
            role: Some(9),
            active: active("$in", &[1]),
            ids: vec![1, 2],
            uuids: vec!["3d64e480-3e30-11e8-b94b-cfe922eb374f".to_string()],
            ..Default::default()
        };
        assert_eq!(
            args.predicate().unwrap().where_clause(),
            "WHERE custom_editor = ? AND role = ? AND members.active IN (?) AND members.id IN (?, ?) AND members.uuid IN (?)"
        );
    }

    #[test]
    fn active_validation_messages() {
        let s = status();
        let mut two = active("$nin", &[1, 0]).unwrap();
        two.insert("$in".to_string(), vec![-1, 3]);
        let cases = [
            (Some(two), "Too many active lists"),
            (active("$in", &[-3, 0, 1]), "Not all active elements are valid"),
            (active("$nin", &[3, 4]), "No valid active request"),
        ];
        for (active, msg) in cases {
            let args = GetMembersArgs {
                active,
                ..Default::default()
            };
            let err = args.validate(&s).unwrap_err();
            assert_eq!(err.to_string(), msg);
        }
        let ok = GetMembersArgs {
            active: active("$nin", &[0, -1]),
            ..Default::default()
        };
        assert!(ok.validate(&s).is_ok());
    }

    #[test]
    fn count_ignores_pagination_and_keeps_filters() {
        let args = GetMembersArgs {
            custom_editor: true,
            ..Default::default()
        };
        let q = args.count_query(DbBackend::Sqlite).unwrap();
        assert_eq!(q.sql, "SELECT COUNT(*) AS cnt FROM members WHERE custom_editor = ?");
        assert_eq!(q.params.len(), 1);

        let bare = GetMembersArgs::default().count_query(DbBackend::Sqlite).unwrap();
        assert_eq!(bare.sql, "SELECT COUNT(*) AS cnt FROM members");
    }

    #[test]
    fn filter_text_and_range_predicates() {
        let day = |d| {
            NaiveDate::from_ymd_opt(2017, 1, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let mut created_at = RangeFilter::new();
        created_at.insert("$gt".to_string(), day(1));
        created_at.insert("$lt".to_string(), day(31));
        let args = FilterMemberArgs {
            id: 12,
            mail: "hotmail".to_string(),
            created_at,
            fields: vec!["id".to_string(), "mail".to_string()],
            ..Default::default()
        };
        let (q, fields) = args.select_query(DbBackend::MySql).unwrap();
        assert_eq!(fields, vec!["id", "mail"]);
        assert_eq!(
            q.sql,
            "SELECT id, mail FROM members WHERE CAST(members.id AS CHAR) LIKE ? AND CAST(members.mail AS CHAR) LIKE ? AND members.created_at >= ? AND members.created_at <= ? ORDER BY updated_at DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(q.params[0], Param::Value("%12%".into()));
        assert_eq!(q.params[1], Param::Value("%hotmail%".into()));
        assert_eq!(q.params[2], Param::Value(day(1).into()));

        let count = args.count_query(DbBackend::MySql).unwrap();
        assert!(count.sql.starts_with("SELECT COUNT(member_id) AS cnt FROM members WHERE"));
        assert_eq!(count.params.len(), 4);
    }

    #[test]
    fn filter_text_cast_follows_backend() {
        let args = FilterMemberArgs {
            id: 12,
            nickname: "readr".to_string(),
            ..Default::default()
        };
        let cases = [
            (
                DbBackend::MySql,
                "WHERE CAST(members.id AS CHAR) LIKE ? AND CAST(members.nickname AS CHAR) LIKE ?",
            ),
            (
                DbBackend::Postgres,
                "WHERE CAST(members.id AS TEXT) LIKE ? AND CAST(members.nickname AS TEXT) LIKE ?",
            ),
            (
                DbBackend::Sqlite,
                "WHERE CAST(members.id AS TEXT) LIKE ? AND CAST(members.nickname AS TEXT) LIKE ?",
            ),
        ];
        for (backend, expected) in cases {
            assert_eq!(args.predicate(backend).unwrap().where_clause(), expected);
        }
    }

    #[test]
    fn filter_rejects_unknown_fields() {
        let args = FilterMemberArgs {
            fields: vec!["line".to_string()],
            ..Default::default()
        };
        assert_eq!(
            args.select_query(DbBackend::Sqlite).unwrap_err().to_string(),
            "Invalid fields: line"
        );
    }

    #[test]
    fn nickname_validation() {
        let err = NicknameArgs::default().validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid keyword");

        let args = NicknameArgs {
            keyword: "readr".to_string(),
            fields: vec!["line".to_string()],
            ..Default::default()
        };
        assert_eq!(args.validate().unwrap_err().to_string(), "Invalid fields: line");

        let args = NicknameArgs {
            keyword: "readr".to_string(),
            fields: vec!["mail".to_string()],
            ..Default::default()
        };
        assert_eq!(args.validate().unwrap(), vec!["mail", "id", "nickname"]);
    }

    #[test]
    fn nickname_query_with_roles() {
        let args = NicknameArgs {
            keyword: "readr".to_string(),
            roles: active("$in", &[3, 9]),
            fields: Vec::new(),
        };
        let (q, fields) = args.select_query(1).unwrap();
        assert_eq!(fields, vec!["id", "nickname"]);
        assert_eq!(
            q.sql,
            "SELECT id, nickname FROM members WHERE members.active = ? AND members.nickname LIKE ? AND members.role IN (?)"
        );
        assert_eq!(q.params[1], Param::Value("readr%".into()));
    }
}
