use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use serde_json::{json, Value};

use super::{audited, header, success_body};
use crate::domain::{Order, PaymentLink};
use crate::error::AppError;
use crate::middleware::auth::authenticate_merchant;
use crate::services::OrderReceipt;
use crate::validation::{parse_order_lookup, parse_order_request};
use crate::AppState;

const CURRENCY: &str = "INR";

/// Splits the body so it can be audited even when authentication fails first.
fn split_body(payload: Result<Json<Value>, JsonRejection>) -> (Value, Option<AppError>) {
    match payload {
        Ok(Json(body)) => (body, None),
        Err(e) => (
            Value::Null,
            Some(AppError::BadRequest(format!("Invalid JSON body: {}", e))),
        ),
    }
}

fn receipt_data(receipt: &OrderReceipt) -> Value {
    let order = &receipt.order;
    let mut data = json!({
        "orderRefId": order.id,
        "clientRefId": order.client_ref_id,
        "amount": order.amount.to_string(),
        "fee": order.fee.to_string(),
        "tax": order.tax.to_string(),
        "transactionAmount": order.transaction_amount.to_string(),
        "status": order.status.as_str(),
        "utr": order.utr,
    });
    if let Some(link) = receipt.payment_link.as_ref().filter(|l| !l.is_empty()) {
        data["paymentLink"] = payment_link(link);
    }
    data
}

fn payment_link(link: &PaymentLink) -> Value {
    serde_json::to_value(link).unwrap_or(Value::Null)
}

fn status_data(order: &Order) -> Value {
    json!({
        "clientRefId": order.client_ref_id,
        "accountNo": order.beneficiary.account_no(),
        "orderRefId": order.id,
        "currency": CURRENCY,
        "amount": order.amount.to_string(),
        "fee": order.fee.to_string(),
        "tax": order.tax.to_string(),
        "mode": order.product,
        "utr": order.utr,
        "status": order.status.as_str(),
    })
}

pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let mut merchant_id = None;
    let (request, rejected) = split_body(payload);

    let result = async {
        let actor = authenticate_merchant(state.store.as_ref(), header(&headers, "Authorization")).await?;
        merchant_id = Some(actor.merchant_id.clone());
        if let Some(e) = rejected {
            return Err(e);
        }

        let order_request = parse_order_request(&request)?;
        let receipt = state.orders.create_order(&actor, order_request).await?;
        Ok::<_, AppError>(success_body("Order accepted", receipt_data(&receipt)))
    }
    .await;

    audited(&state, "/api/orders", merchant_id, &request, result).await
}

pub async fn order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let mut merchant_id = None;
    let (request, rejected) = split_body(payload);

    let result = async {
        let actor = authenticate_merchant(state.store.as_ref(), header(&headers, "Authorization")).await?;
        merchant_id = Some(actor.merchant_id.clone());
        if let Some(e) = rejected {
            return Err(e);
        }

        let lookup = parse_order_lookup(&request)?;
        let order = state.orders.find(&actor, &lookup).await?;
        Ok::<_, AppError>(success_body("Order found", status_data(&order)))
    }
    .await;

    audited(&state, "/api/orders/status", merchant_id, &request, result).await
}

pub async fn wallet_balance(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut merchant_id = None;

    let result = async {
        let actor = authenticate_merchant(state.store.as_ref(), header(&headers, "Authorization")).await?;
        merchant_id = Some(actor.merchant_id.clone());

        let wallet = state
            .store
            .wallet(&actor.merchant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Wallet not found".to_string()))?;
        Ok::<_, AppError>(success_body(
            "Wallet balance",
            json!({
                "balance": wallet.balance.to_string(),
                "currency": CURRENCY,
                "status": wallet.status.as_str(),
            }),
        ))
    }
    .await;

    audited(&state, "/api/wallet", merchant_id, &Value::Null, result).await
}
