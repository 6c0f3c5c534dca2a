use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use utoipa::ToSchema;

use crate::application::reconciliation::ReconciliationProcessor;
use crate::domain::payment::{PaymentView, ProviderType, RawCallback};
use crate::errors::AppError;

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: uuid::Uuid,
    pub payment_no: String,
    pub provider_type: String,
    pub channel_type: String,
    /// "redirect" or "qr".
    pub interaction_mode: String,
    pub amount: String,
    pub currency: String,
    pub status: String,
    /// Redirect URL or QR payload.
    pub pay_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<PaymentView> for PaymentResponse {
    fn from(p: PaymentView) -> Self {
        PaymentResponse {
            id: p.id,
            payment_no: p.payment_no,
            provider_type: p.provider_type,
            channel_type: p.channel_type,
            interaction_mode: p.interaction_mode,
            amount: p.amount.to_string(),
            currency: p.currency,
            status: p.status.as_str().to_string(),
            pay_url: p.pay_url,
            expires_at: p.expires_at,
        }
    }
}

/// Capture a request exactly as the provider sent it.
fn raw_callback(req: &HttpRequest, body: &[u8]) -> RawCallback {
    RawCallback {
        headers: req
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect(),
        query: req.query_string().to_string(),
        body: body.to_vec(),
    }
}

/// POST /payments/callback/{provider}
///
/// Provider webhook. The signature is checked by the provider's adapter
/// before anything is applied. Replays of an already applied result are
/// acknowledged again without side effects.
#[utoipa::path(
    post,
    path = "/payments/callback/{provider}",
    params(
        ("provider" = String, Path, description = "official, epay, paypal, stripe or crypto"),
    ),
    request_body(content = Vec<u8>, description = "Raw provider callback payload", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Provider-specific acknowledgement", body = String, content_type = "text/plain"),
        (status = 400, description = "Unsigned, forged or unknown callback"),
        (status = 422, description = "Reported amount does not match the payment"),
    ),
    tag = "payments"
)]
pub async fn payment_callback(
    processor: web::Data<ReconciliationProcessor>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let provider: ProviderType = path.into_inner().parse()?;
    let raw = raw_callback(&req, &body);

    let reply = web::block(move || processor.handle_callback(provider, &raw))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    debug!("{} callback: {:?}", provider, reply.outcome);

    Ok(HttpResponse::Ok().content_type("text/plain").body(reply.ack))
}

/// GET /payments/{payment_no}
#[utoipa::path(
    get,
    path = "/payments/{payment_no}",
    params(
        ("payment_no" = String, Path, description = "Payment number"),
    ),
    responses(
        (status = 200, description = "Payment found", body = PaymentResponse),
        (status = 404, description = "Payment not found"),
    ),
    tag = "payments"
)]
pub async fn get_payment(
    processor: web::Data<ReconciliationProcessor>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let payment_no = path.into_inner();

    let payment = web::block(move || processor.get_payment(&payment_no))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn raw_callback_keeps_headers_query_and_body() {
        let req = TestRequest::post()
            .uri("/payments/callback/epay?out_trade_no=P1&sign=abc")
            .insert_header(("X-Signature", "deadbeef"))
            .to_http_request();
        let raw = raw_callback(&req, b"{\"a\":1}");
        assert_eq!(raw.headers.get("x-signature").map(String::as_str), Some("deadbeef"));
        assert_eq!(raw.query, "out_trade_no=P1&sign=abc");
        assert_eq!(raw.body, b"{\"a\":1}".to_vec());
    }
}
