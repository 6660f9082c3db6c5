use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

use crate::error::AppError;

#[derive(Serialize)]
pub struct ResponseDto<T: Serialize> {
    pub data: Option<T>,
    pub code: i32,
    pub msg: String,
}

impl<T: Serialize> ResponseDto<T> {
    pub fn success(data: Option<T>) -> Self {
        Self {
            data,
            code: 0,
            msg: "".to_string(),
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match err {
        JsonPayloadError::ContentType => AppError::param_error("Invalid Content-Type"),
        _ => AppError::param_error("Invalid Request Body"),
    };
    app_err.into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("query rejected: {}", err);
    AppError::param_error("Invalid Query").into()
}

pub fn response_from_error(err: &AppError) -> HttpResponse {
    HttpResponse::build(err.status_code()).json(ResponseDto::<()> {
        data: None,
        code: err.code(),
        msg: err.msg(),
    })
}
