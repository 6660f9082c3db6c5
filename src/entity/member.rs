use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sea_orm::{DbErr, QueryResult, Value};
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::AppError;

pub const TABLE: &str = "members";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldMode {
    /// Every persistable column.
    Full,
    /// Only columns whose value is set.
    Partial,
}

/// Column registry for a row type.
pub trait Fields {
    /// Persistable columns in declaration order.
    const FIELDS: &'static [&'static str];
    /// Persisted but never selectable or serialised.
    const HIDDEN: &'static [&'static str] = &[];

    /// Bind value of `field`, or `None` when the field is unset.
    fn value_of(&self, field: &str) -> Option<Value>;

    fn get_fields(&self, mode: FieldMode) -> Vec<&'static str> {
        match mode {
            FieldMode::Full => Self::FIELDS.to_vec(),
            FieldMode::Partial => Self::FIELDS
                .iter()
                .copied()
                .filter(|f| self.value_of(f).is_some())
                .collect(),
        }
    }

    fn selectable() -> Vec<&'static str> {
        Self::FIELDS
            .iter()
            .copied()
            .filter(|f| !Self::HIDDEN.contains(f))
            .collect()
    }

    /// Maps caller-supplied names onto registered selectable columns.
    fn validate_fields(requested: &[String]) -> Result<Vec<&'static str>, AppError> {
        let selectable = Self::selectable();
        requested
            .iter()
            .map(|f| {
                selectable
                    .iter()
                    .find(|s| **s == f.as_str())
                    .copied()
                    .ok_or_else(|| AppError::param_error(format!("Invalid fields: {}", f)))
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub id: i64,
    pub member_id: String,
    pub uuid: String,
    pub points: Option<i64>,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub birthday: Option<NaiveDateTime>,
    pub gender: Option<String>,
    pub work: Option<String>,
    pub mail: Option<String>,
    pub phone: Option<String>,

    pub register_mode: Option<String>,
    pub social_id: Option<String>,
    pub talk_id: Option<String>,

    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub updated_by: Option<i64>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[serde(skip_serializing)]
    pub salt: Option<String>,
    pub premium_before: Option<NaiveDateTime>,

    pub description: Option<String>,
    pub profile_image: Option<String>,
    pub identity: Option<String>,

    pub role: Option<i64>,
    pub active: Option<i64>,

    pub custom_editor: Option<bool>,
    pub hide_profile: Option<bool>,
    pub profile_push: Option<bool>,
    pub post_push: Option<bool>,
    pub daily_push: Option<bool>,
    pub comment_push: Option<bool>,
}

impl Fields for Member {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "member_id",
        "uuid",
        "points",
        "name",
        "nickname",
        "birthday",
        "gender",
        "work",
        "mail",
        "phone",
        "register_mode",
        "social_id",
        "talk_id",
        "created_at",
        "updated_at",
        "updated_by",
        "password",
        "salt",
        "premium_before",
        "description",
        "profile_image",
        "identity",
        "role",
        "active",
        "custom_editor",
        "hide_profile",
        "profile_push",
        "post_push",
        "daily_push",
        "comment_push",
    ];
    const HIDDEN: &'static [&'static str] = &["password", "salt"];

    fn value_of(&self, field: &str) -> Option<Value> {
        match field {
            "id" => (self.id != 0).then(|| self.id.into()),
            "member_id" => (!self.member_id.is_empty()).then(|| self.member_id.clone().into()),
            "uuid" => (!self.uuid.is_empty()).then(|| self.uuid.clone().into()),
            "points" => self.points.map(Value::from),
            "name" => self.name.clone().map(Value::from),
            "nickname" => self.nickname.clone().map(Value::from),
            "birthday" => self.birthday.map(Value::from),
            "gender" => self.gender.clone().map(Value::from),
            "work" => self.work.clone().map(Value::from),
            "mail" => self.mail.clone().map(Value::from),
            "phone" => self.phone.clone().map(Value::from),
            "register_mode" => self.register_mode.clone().map(Value::from),
            "social_id" => self.social_id.clone().map(Value::from),
            "talk_id" => self.talk_id.clone().map(Value::from),
            "created_at" => self.created_at.map(Value::from),
            "updated_at" => self.updated_at.map(Value::from),
            "updated_by" => self.updated_by.map(Value::from),
            "password" => self.password.clone().map(Value::from),
            "salt" => self.salt.clone().map(Value::from),
            "premium_before" => self.premium_before.map(Value::from),
            "description" => self.description.clone().map(Value::from),
            "profile_image" => self.profile_image.clone().map(Value::from),
            "identity" => self.identity.clone().map(Value::from),
            "role" => self.role.map(Value::from),
            "active" => self.active.map(Value::from),
            "custom_editor" => self.custom_editor.map(Value::from),
            "hide_profile" => self.hide_profile.map(Value::from),
            "profile_push" => self.profile_push.map(Value::from),
            "post_push" => self.post_push.map(Value::from),
            "daily_push" => self.daily_push.map(Value::from),
            "comment_push" => self.comment_push.map(Value::from),
            _ => None,
        }
    }
}

impl Member {
    /// Set columns paired with their bind values, in registry order.
    pub fn columns(&self, mode: FieldMode) -> Vec<(&'static str, Value)> {
        self.get_fields(mode)
            .into_iter()
            .filter_map(|f| self.value_of(f).map(|v| (f, v)))
            .collect()
    }

    pub fn from_row(row: &QueryResult, fields: &[&str]) -> Result<Self, DbErr> {
        let mut member = Member::default();
        for field in fields {
            member.read_column(row, field)?;
        }
        Ok(member)
    }

    fn read_column(&mut self, row: &QueryResult, field: &str) -> Result<(), DbErr> {
        match field {
            "id" => self.id = row.try_get("", "id")?,
            "member_id" => self.member_id = row.try_get("", "member_id")?,
            "uuid" => self.uuid = row.try_get("", "uuid")?,
            "points" => self.points = row.try_get("", "points")?,
            "name" => self.name = row.try_get("", "name")?,
            "nickname" => self.nickname = row.try_get("", "nickname")?,
            "birthday" => self.birthday = get_naive_datetime(row, "birthday"),
            "gender" => self.gender = row.try_get("", "gender")?,
            "work" => self.work = row.try_get("", "work")?,
            "mail" => self.mail = row.try_get("", "mail")?,
            "phone" => self.phone = row.try_get("", "phone")?,
            "register_mode" => self.register_mode = row.try_get("", "register_mode")?,
            "social_id" => self.social_id = row.try_get("", "social_id")?,
            "talk_id" => self.talk_id = row.try_get("", "talk_id")?,
            "created_at" => self.created_at = get_naive_datetime(row, "created_at"),
            "updated_at" => self.updated_at = get_naive_datetime(row, "updated_at"),
            "updated_by" => self.updated_by = row.try_get("", "updated_by")?,
            "password" => self.password = row.try_get("", "password")?,
            "salt" => self.salt = row.try_get("", "salt")?,
            "premium_before" => self.premium_before = get_naive_datetime(row, "premium_before"),
            "description" => self.description = row.try_get("", "description")?,
            "profile_image" => self.profile_image = row.try_get("", "profile_image")?,
            "identity" => self.identity = row.try_get("", "identity")?,
            "role" => self.role = row.try_get("", "role")?,
            "active" => self.active = row.try_get("", "active")?,
            "custom_editor" => self.custom_editor = row.try_get("", "custom_editor")?,
            "hide_profile" => self.hide_profile = row.try_get("", "hide_profile")?,
            "profile_push" => self.profile_push = row.try_get("", "profile_push")?,
            "post_push" => self.post_push = row.try_get("", "post_push")?,
            "daily_push" => self.daily_push = row.try_get("", "daily_push")?,
            "comment_push" => self.comment_push = row.try_get("", "comment_push")?,
            other => return Err(DbErr::Custom(format!("unknown member column {}", other))),
        }
        Ok(())
    }
}

/// A member together with the set of columns it was loaded with. Only
/// those columns are serialised.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberView {
    pub member: Member,
    fields: Vec<&'static str>,
}

impl MemberView {
    pub fn new(member: Member, fields: Vec<&'static str>) -> Self {
        Self { member, fields }
    }

    pub fn from_row(row: &QueryResult, fields: &[&'static str]) -> Result<Self, DbErr> {
        Ok(Self::new(Member::from_row(row, fields)?, fields.to_vec()))
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }
}

impl Serialize for MemberView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = serde_json::to_value(&self.member).map_err(S::Error::custom)?;
        let mut map = serializer.serialize_map(None)?;
        if let serde_json::Value::Object(obj) = value {
            for field in &self.fields {
                if let Some(v) = obj.get(*field) {
                    map.serialize_entry(field, v)?;
                }
            }
        }
        map.end()
    }
}

fn get_naive_datetime(row: &QueryResult, col: &str) -> Option<NaiveDateTime> {
    row.try_get::<Option<NaiveDateTime>>("", col)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<DateTime<Utc>>>("", col)
                .ok()
                .flatten()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            row.try_get::<Option<String>>("", col)
                .ok()
                .flatten()
                .and_then(parse_db_datetime)
        })
}

fn parse_db_datetime(input: String) -> Option<NaiveDateTime> {
    parse_datetime(&input)
}

/// Accepts RFC 3339 (converted to UTC), zoneless `T` or space separated
/// timestamps, and bare dates at midnight.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
