use log::debug;
use sea_orm::{DatabaseConnection, DbBackend, ConnectionTrait, ExecResult};
use uuid::Uuid;

use super::args::{CountQuery, FilterMemberArgs, GetMemberArgs, GetMembersArgs, IdType, NicknameArgs};
use crate::config::MemberStatus;
use crate::db;
use crate::entity::member::{FieldMode, Fields, Member, MemberView, TABLE};
use crate::error::AppError;
use crate::query::{self, Pagination, Param, Predicate, Query};

/// Member storage. Every call issues one statement (two for insert, which
/// checks for an existing row first) and auto-commits.
#[derive(Clone)]
pub struct MemberRepository {
    db: DatabaseConnection,
    status: MemberStatus,
}

impl MemberRepository {
    pub fn new(db: DatabaseConnection, status: MemberStatus) -> Self {
        Self { db, status }
    }

    pub fn status(&self) -> &MemberStatus {
        &self.status
    }

    pub async fn get_member(&self, args: &GetMemberArgs) -> Result<Member, AppError> {
        let row = db::query_one(&self.db, args.select_query()?)
            .await?
            .ok_or_else(|| AppError::not_found("User Not Found"))?;
        Ok(Member::from_row(&row, Member::FIELDS)?)
    }

    pub async fn get_members(&self, args: &GetMembersArgs) -> Result<Vec<Member>, AppError> {
        let rows = db::query_all(&self.db, args.select_query()?).await?;
        rows.iter()
            .map(|row| Member::from_row(row, Member::FIELDS).map_err(AppError::from))
            .collect()
    }

    pub async fn filter_members(&self, args: &FilterMemberArgs) -> Result<Vec<MemberView>, AppError> {
        let (q, fields) = args.select_query(self.db.get_database_backend())?;
        let rows = db::query_all(&self.db, q).await?;
        rows.iter()
            .map(|row| MemberView::from_row(row, &fields).map_err(AppError::from))
            .collect()
    }

    /// Returns the generated id.
    pub async fn insert_member(&self, mut member: Member) -> Result<i64, AppError> {
        if member.member_id.is_empty() {
            return Err(AppError::param_error("Invalid User"));
        }
        if self.exists(&member).await? {
            return Err(AppError::duplicate());
        }
        if member.uuid.is_empty() {
            member.uuid = Uuid::new_v4().to_string();
        }

        let mut q = query::insert(TABLE, member.columns(FieldMode::Partial));
        if self.db.get_database_backend() == DbBackend::Postgres {
            q.sql.push_str(" RETURNING id");
            let row = db::query_one(&self.db, q)
                .await
                .map_err(map_unique_violation)?
                .ok_or_else(|| AppError::integrity("No Row Inserted"))?;
            let id: i64 = row.try_get("", "id")?;
            debug!("member inserted id={}", id);
            return Ok(id);
        }

        let result = db::exec_sql(&self.db, q).await.map_err(map_unique_violation)?;
        match result.rows_affected() {
            0 => return Err(AppError::integrity("No Row Inserted")),
            1 => {}
            _ => return Err(AppError::integrity("More Than One Rows Affected")),
        }
        let id = result.last_insert_id() as i64;
        debug!("member inserted id={}", id);
        Ok(id)
    }

    async fn exists(&self, member: &Member) -> Result<bool, AppError> {
        let mut p = Predicate::new();
        p.push(
            "(id = ? OR member_id = ?)",
            vec![
                Param::Value(member.id.into()),
                Param::Value(member.member_id.clone().into()),
            ],
        );
        let limit_one = Pagination::new("", 1, 0, &[])?;
        let row = db::query_one(&self.db, query::select(TABLE, &["id"], &p, &limit_one)).await?;
        Ok(row.is_some())
    }

    /// Overwrites the set fields of the row keyed by `member.id`.
    pub async fn update_member(&self, member: &Member) -> Result<(), AppError> {
        if member.id == 0 {
            return Err(AppError::param_error("Invalid ID"));
        }
        let columns: Vec<_> = member
            .columns(FieldMode::Partial)
            .into_iter()
            .filter(|(name, _)| *name != "id")
            .collect();
        if columns.is_empty() {
            return Err(AppError::param_error("No fields to update"));
        }

        let q = query::update(TABLE, columns, ("id", member.id.into()));
        let result = db::exec_sql(&self.db, q).await.map_err(map_unique_violation)?;
        expect_single_row(&result)?;
        debug!("member updated id={}", member.id);
        Ok(())
    }

    /// Marks the member deleted; rows are never removed.
    pub async fn delete_member(&self, id_type: IdType, id: &str) -> Result<(), AppError> {
        let q = query::update(
            TABLE,
            vec![("active", self.status.delete().into())],
            (id_type.column(), id_type.bind(id)?),
        );
        let result = db::exec_sql(&self.db, q).await?;
        expect_single_row(&result)?;
        debug!("member deleted {}={}", id_type.column(), id);
        Ok(())
    }

    pub async fn update_all(&self, ids: &[i64], active: i64) -> Result<(), AppError> {
        if ids.is_empty() {
            return Err(AppError::param_error("ID List Empty"));
        }
        let mut p = Predicate::new();
        p.push(
            "id IN (?)",
            vec![Param::List(ids.iter().copied().map(Into::into).collect())],
        );
        let q = query::update_where(TABLE, vec![("active", active.into())], &p);
        let result = db::exec_sql(&self.db, q).await?;

        let affected = result.rows_affected();
        if affected == 0 {
            return Err(AppError::not_found("Members Not Found"));
        }
        if affected > ids.len() as u64 {
            return Err(AppError::integrity("More Rows Affected"));
        }
        debug!("members active={} rows={}", active, affected);
        Ok(())
    }

    pub async fn count(&self, args: &impl CountQuery) -> Result<i64, AppError> {
        db::query_count(&self.db, args.count_query(self.db.get_database_backend())?).await
    }

    /// Active members whose nickname starts with the keyword.
    pub async fn get_ids_by_nickname(&self, args: &NicknameArgs) -> Result<Vec<MemberView>, AppError> {
        let (q, fields): (Query, _) = args.select_query(self.status.active())?;
        let rows = db::query_all(&self.db, q).await?;
        rows.iter()
            .map(|row| MemberView::from_row(row, &fields).map_err(AppError::from))
            .collect()
    }
}

fn map_unique_violation(err: AppError) -> AppError {
    match err {
        AppError::Storage(e) if db::is_unique_violation(&e) => AppError::duplicate(),
        other => other,
    }
}

fn expect_single_row(result: &ExecResult) -> Result<(), AppError> {
    match result.rows_affected() {
        0 => Err(AppError::not_found("User Not Found")),
        1 => Ok(()),
        _ => Err(AppError::integrity("More Than One Rows Affected")),
    }
}
