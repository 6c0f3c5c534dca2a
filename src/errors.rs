use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use log::error;
use thiserror::Error;

use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("Payment provider unavailable")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        let message = e.to_string();
        match e {
            DomainError::NotFound(_) => AppError::NotFound(message),
            DomainError::InvalidInput(_) | DomainError::UnknownPayment(_) => {
                AppError::BadRequest(message)
            }
            DomainError::InsufficientStock(_)
            | DomainError::InsufficientBalance
            | DomainError::CouponUnavailable(_)
            | DomainError::NotPayable(_) => AppError::Conflict(message),
            DomainError::AmountMismatch { .. } => AppError::Unprocessable(message),
            DomainError::Gateway(msg) => AppError::BadGateway(msg),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Internal(detail) => {
                error!("Request failed: {}", detail);
                "Internal server error".to_string()
            }
            AppError::BadGateway(detail) => {
                error!("Payment provider call failed: {}", detail);
                self.to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::ResponseError;
    use bigdecimal::BigDecimal;

    fn status_of(e: DomainError) -> StatusCode {
        AppError::from(e).error_response().status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(
            status_of(DomainError::NotFound("Order O1".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn invalid_input_and_unknown_payment_return_400() {
        assert_eq!(
            status_of(DomainError::InvalidInput("quantity".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::UnknownPayment("P1".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn business_conflicts_return_409() {
        for e in [
            DomainError::InsufficientStock("sku".into()),
            DomainError::InsufficientBalance,
            DomainError::CouponUnavailable("SAVE".into()),
            DomainError::NotPayable("O1".into()),
        ] {
            assert_eq!(status_of(e), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn amount_mismatch_returns_422() {
        let e = DomainError::amount_mismatch(
            &BigDecimal::from(10),
            "CNY",
            &BigDecimal::from(1),
            "CNY",
        );
        assert_eq!(status_of(e), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn gateway_error_returns_502() {
        assert_eq!(
            status_of(DomainError::Gateway("timeout".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[actix_web::test]
    async fn internal_error_hides_details() {
        let resp = AppError::Internal("connection refused".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[test]
    fn not_found_display() {
        let app_err: AppError = DomainError::NotFound("Order O1".into()).into();
        assert_eq!(app_err.to_string(), "Order O1 not found");
    }

    #[test]
    fn internal_error_display() {
        assert_eq!(
            AppError::Internal("msg".to_string()).to_string(),
            "Internal error: msg"
        );
    }
}
