use actix_web::{post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{Money, Tip},
    error::EngagementError,
    middleware::AuthenticatedUser,
    services::TipRequest,
    state::AppState,
};

/// Amounts arrive either as a decimal string ("5.00") or a JSON number (5)
#[derive(Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    fn parse(&self) -> Result<Money, EngagementError> {
        let money = match self {
            AmountInput::Text(s) => s.parse::<Money>()?,
            AmountInput::Number(n) => n.to_string().parse::<Money>()?,
        };
        Ok(money)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipConfirmRequest {
    pub story_id: Uuid,
    pub amount: AmountInput,
    pub message: Option<String>,
    pub payment_reference: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TipResponse {
    pub id: Uuid,
    pub story_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount: String,
    pub payment_reference: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Tip> for TipResponse {
    fn from(tip: Tip) -> Self {
        Self {
            amount: tip.amount().to_string(),
            id: tip.id,
            story_id: tip.story_id,
            from_user_id: tip.from_user_id,
            to_user_id: tip.to_user_id,
            payment_reference: tip.payment_reference,
            message: tip.message,
            created_at: tip.created_at,
        }
    }
}

/// POST /payments/tip-confirm
/// Record a confirmed payment as a tip. Confirmations are retried by the
/// payment flow, so a reference seen before answers 200 `{"duplicate": true}`.
#[post("/payments/tip-confirm")]
pub async fn tip_confirm(
    state: web::Data<AppState>,
    user: Option<AuthenticatedUser>,
    body: web::Json<TipConfirmRequest>,
) -> Result<HttpResponse, EngagementError> {
    // Identity before input, so anonymous callers always get 401
    let user_id = user.map(|u| u.0).ok_or(EngagementError::Auth)?;

    let body = body.into_inner();
    let request = TipRequest {
        story_id: body.story_id,
        amount: body.amount.parse()?,
        message: body.message,
        payment_reference: body.payment_reference,
    };

    match state.engagement.record_tip(Some(user_id), request).await {
        Ok(tip) => Ok(HttpResponse::Created().json(TipResponse::from(tip))),
        Err(EngagementError::DuplicatePayment(_)) => {
            Ok(HttpResponse::Ok().json(serde_json::json!({ "duplicate": true })))
        }
        Err(e) => Err(e),
    }
}
