use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entity::member::{parse_datetime, Member};
use crate::error::AppError;
use crate::member::{
    FilterMemberArgs, GetMemberArgs, GetMembersArgs, IdType, MemberRepository, NicknameArgs, RangeFilter,
    SetFilter,
};
use crate::password::{generate_salt, hash_password};
use crate::response::ResponseDto;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/members/count").route(web::get().to(count_members)))
        .service(web::resource("/members/filter/count").route(web::get().to(count_filtered)))
        .service(web::resource("/members/filter").route(web::get().to(filter_members)))
        .service(web::resource("/members/nickname").route(web::get().to(members_by_nickname)))
        .service(
            web::resource("/members")
                .route(web::get().to(list_members))
                .route(web::put().to(update_members))
                .route(web::delete().to(delete_members)),
        )
        .service(web::resource("/member/password").route(web::put().to(update_password)))
        .service(
            web::resource("/member")
                .route(web::post().to(create_member))
                .route(web::put().to(update_member)),
        )
        .service(
            web::resource("/member/{id}")
                .route(web::get().to(get_member))
                .route(web::delete().to(delete_member)),
        );
}

/// Query string of the list endpoints. Structured values arrive JSON-encoded.
#[derive(Deserialize)]
struct ListQuery {
    max_result: Option<u8>,
    page: Option<u16>,
    sort: Option<String>,
    custom_editor: Option<bool>,
    role: Option<i64>,
    active: Option<String>,
    ids: Option<String>,
    uuids: Option<String>,
    total: Option<bool>,
}

#[derive(Deserialize)]
struct FilterQuery {
    max_result: Option<u8>,
    page: Option<u16>,
    sort: Option<String>,
    id: Option<i64>,
    mail: Option<String>,
    nickname: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    fields: Option<String>,
}

#[derive(Deserialize)]
struct NicknameQuery {
    keyword: Option<String>,
    roles: Option<String>,
    fields: Option<String>,
}

#[derive(Deserialize)]
struct IdsQuery {
    ids: Option<String>,
}

#[derive(Deserialize)]
struct ModeQuery {
    mode: Option<String>,
}

#[derive(Deserialize)]
struct UpdateMembersRequest {
    #[serde(default)]
    ids: Vec<i64>,
    active: Option<i64>,
}

/// Member id sent either as a JSON number or as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdField {
    Number(i64),
    Text(String),
}

impl Default for IdField {
    fn default() -> Self {
        Self::Number(0)
    }
}

impl IdField {
    fn value(&self) -> Result<i64, AppError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s.trim().parse().map_err(|_| AppError::param_error("Invalid ID")),
        }
    }
}

#[derive(Deserialize)]
struct PasswordRequest {
    #[serde(default)]
    id: IdField,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct ListResponse<T: Serialize> {
    items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<i64>,
}

#[derive(Serialize)]
struct CountResponse {
    total: i64,
}

#[derive(Serialize)]
struct CreatedResponse {
    id: i64,
}

fn decode<T: DeserializeOwned>(name: &str, raw: Option<&str>) -> Result<Option<T>, AppError> {
    match raw.filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => serde_json::from_str(s)
            .map(Some)
            .map_err(|_| AppError::param_error(format!("Invalid {}", name))),
    }
}

/// Date bounds such as `{"$gt": "2017-01-01T00:00:00Z"}`.
fn decode_range(name: &str, raw: Option<&str>) -> Result<RangeFilter, AppError> {
    let bounds: BTreeMap<String, String> = decode(name, raw)?.unwrap_or_default();
    bounds
        .into_iter()
        .map(|(op, value)| {
            parse_datetime(&value)
                .map(|at| (op, at))
                .ok_or_else(|| AppError::param_error(format!("Invalid {}", name)))
        })
        .collect()
}

impl ListQuery {
    fn into_args(self, repo: &MemberRepository) -> Result<GetMembersArgs, AppError> {
        let defaults = GetMembersArgs::default();
        let args = GetMembersArgs {
            max_result: self.max_result.unwrap_or(defaults.max_result),
            page: self.page.unwrap_or(defaults.page),
            sort: self.sort.unwrap_or(defaults.sort),
            custom_editor: self.custom_editor.unwrap_or(false),
            role: self.role,
            active: decode::<SetFilter>("active", self.active.as_deref())?,
            ids: decode("ids", self.ids.as_deref())?.unwrap_or_default(),
            uuids: decode("uuids", self.uuids.as_deref())?.unwrap_or_default(),
            total: self.total.unwrap_or(false),
        }
        .with_default_active(repo.status());
        args.validate(repo.status())?;
        Ok(args)
    }
}

impl FilterQuery {
    fn into_args(self) -> Result<FilterMemberArgs, AppError> {
        let defaults = FilterMemberArgs::default();
        Ok(FilterMemberArgs {
            max_result: self.max_result.unwrap_or(defaults.max_result),
            page: self.page.unwrap_or(defaults.page),
            sort: self.sort.unwrap_or(defaults.sort),
            id: self.id.unwrap_or(0),
            mail: self.mail.unwrap_or_default(),
            nickname: self.nickname.unwrap_or_default(),
            created_at: decode_range("created_at", self.created_at.as_deref())?,
            updated_at: decode_range("updated_at", self.updated_at.as_deref())?,
            fields: decode("fields", self.fields.as_deref())?.unwrap_or_default(),
        })
    }
}

async fn list_members(
    repo: web::Data<MemberRepository>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let args = query.into_inner().into_args(&repo)?;
    let items = repo.get_members(&args).await?;
    let total = if args.total {
        Some(repo.count(&args).await?)
    } else {
        None
    };
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(ListResponse { items, total }))))
}

async fn count_members(
    repo: web::Data<MemberRepository>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let args = query.into_inner().into_args(&repo)?;
    let total = repo.count(&args).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(CountResponse { total }))))
}

async fn filter_members(
    repo: web::Data<MemberRepository>,
    query: web::Query<FilterQuery>,
) -> Result<HttpResponse, AppError> {
    let args = query.into_inner().into_args()?;
    let items = repo.filter_members(&args).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(ListResponse { items, total: None }))))
}

async fn count_filtered(
    repo: web::Data<MemberRepository>,
    query: web::Query<FilterQuery>,
) -> Result<HttpResponse, AppError> {
    let args = query.into_inner().into_args()?;
    let total = repo.count(&args).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(CountResponse { total }))))
}

async fn members_by_nickname(
    repo: web::Data<MemberRepository>,
    query: web::Query<NicknameQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let args = NicknameArgs {
        keyword: query.keyword.unwrap_or_default(),
        roles: decode("roles", query.roles.as_deref())?,
        fields: decode("fields", query.fields.as_deref())?.unwrap_or_default(),
    };
    let items = repo.get_ids_by_nickname(&args).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(ListResponse { items, total: None }))))
}

async fn update_members(
    repo: web::Data<MemberRepository>,
    payload: web::Json<UpdateMembersRequest>,
) -> Result<HttpResponse, AppError> {
    let active = payload.active.unwrap_or_else(|| repo.status().active());
    if !repo.status().is_known(active) {
        return Err(AppError::param_error("Invalid active"));
    }
    repo.update_all(&payload.ids, active).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn delete_members(
    repo: web::Data<MemberRepository>,
    query: web::Query<IdsQuery>,
) -> Result<HttpResponse, AppError> {
    let ids: Vec<i64> = decode("ids", query.ids.as_deref())?.unwrap_or_default();
    repo.update_all(&ids, repo.status().delete()).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn get_member(
    repo: web::Data<MemberRepository>,
    path: web::Path<String>,
    query: web::Query<ModeQuery>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let mut args = GetMemberArgs::new(IdType::infer(&id), id);
    args.mode = query.into_inner().mode;
    let member = repo.get_member(&args).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(member))))
}

async fn create_member(
    repo: web::Data<MemberRepository>,
    payload: web::Json<Member>,
) -> Result<HttpResponse, AppError> {
    let mut member = payload.into_inner();
    if member.member_id.is_empty() {
        member.member_id = member.mail.clone().unwrap_or_default();
    }
    let now = Utc::now().naive_utc();
    member.created_at.get_or_insert(now);
    member.updated_at.get_or_insert(now);
    member.active.get_or_insert(repo.status().active());
    member.salt = None;
    if let Some(password) = member.password.take().filter(|p| !p.is_empty()) {
        let salt = generate_salt();
        member.password = Some(hash_password(&password, &salt)?);
        member.salt = Some(salt);
    }

    let id = repo.insert_member(member).await?;
    info!("member created id={}", id);
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(CreatedResponse { id }))))
}

/// Credentials only change through the password endpoint.
async fn update_member(
    repo: web::Data<MemberRepository>,
    payload: web::Json<Member>,
) -> Result<HttpResponse, AppError> {
    let mut member = payload.into_inner();
    member.password = None;
    member.salt = None;
    member.updated_at.get_or_insert(Utc::now().naive_utc());
    repo.update_member(&member).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn update_password(
    repo: web::Data<MemberRepository>,
    payload: web::Json<PasswordRequest>,
) -> Result<HttpResponse, AppError> {
    if payload.password.is_empty() {
        return Err(AppError::param_error("Invalid Password"));
    }
    let id = payload.id.value()?;
    let salt = generate_salt();
    let member = Member {
        id,
        password: Some(hash_password(&payload.password, &salt)?),
        salt: Some(salt),
        updated_at: Some(Utc::now().naive_utc()),
        ..Default::default()
    };
    repo.update_member(&member).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn delete_member(
    repo: web::Data<MemberRepository>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    repo.delete_member(IdType::infer(&id), &id).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}
