use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;

use syncopate_core::error::DbError;

use crate::error::ApiError;

/// `Json<T>` with rejections mapped into the API error envelope, so a
/// body that fails to decode still produces `{error, message, code,
/// db_code}` instead of axum's plain-text 400.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(DbError::MalformedData {
                field: "body".into(),
                reason: rejection.body_text(),
            })),
        }
    }
}
