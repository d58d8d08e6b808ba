use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::{AppError, FieldViolation};
use validator::Validate;

/// JSON body extractor that runs `validator` rules before the handler sees it.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection_to_error)?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

fn json_rejection_to_error(rejection: JsonRejection) -> AppError {
    match rejection {
        // Well-formed JSON with the wrong shape, e.g. a number where a string belongs.
        JsonRejection::JsonDataError(err) => {
            AppError::ValidationError(vec![FieldViolation::new("body", err.body_text())])
        }
        JsonRejection::JsonSyntaxError(_) => AppError::BadRequest("Invalid JSON body".to_string()),
        other => AppError::BadRequest(other.body_text()),
    }
}
