use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::{ActorContext, Principal};
use crate::error::AppError;
use crate::ports::LedgerStore;
use crate::AppState;

pub const BANK_AUTH_HEADER: &str = "X-Bank-Auth";

/// Admin routes accept `Authorization: Bearer <ADMIN_API_KEY>`.
pub async fn admin_auth<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    if admin_key_matches(auth_header, &state.admin_api_key) {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn admin_key_matches(header: Option<&str>, admin_api_key: &str) -> bool {
    match header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => !admin_api_key.is_empty() && constant_time_eq(token, admin_api_key),
        None => false,
    }
}

fn constant_time_eq(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1
}

/// Lowercase hex SHA-256, the form API secrets are stored in.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

async fn resolve_credential(
    store: &dyn LedgerStore,
    api_key: &str,
    api_secret: &str,
) -> Result<Principal, AppError> {
    let credential = store
        .credential(api_key)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown api key".to_string()))?;
    if !constant_time_eq(&hash_secret(api_secret), &credential.secret_hash) {
        return Err(AppError::Unauthorized("api secret mismatch".to_string()));
    }
    Ok(credential.principal)
}

fn split_pair(pair: &str) -> Result<(&str, &str), AppError> {
    match pair.split_once(':') {
        Some((key, secret)) if !key.is_empty() && !secret.is_empty() => Ok((key, secret)),
        _ => Err(AppError::Unauthorized(
            "credentials must be <api_key>:<api_secret>".to_string(),
        )),
    }
}

/// Resolves `Authorization: Token <api_key>:<api_secret>` to a merchant.
pub async fn authenticate_merchant(
    store: &dyn LedgerStore,
    header: Option<&str>,
) -> Result<ActorContext, AppError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::MissingHeader("Authorization".to_string()))?;
    let pair = header
        .strip_prefix("Token ")
        .ok_or_else(|| AppError::Unauthorized("expected Token scheme".to_string()))?;
    let (api_key, api_secret) = split_pair(pair.trim())?;

    match resolve_credential(store, api_key, api_secret).await? {
        Principal::Merchant(merchant_id) => Ok(ActorContext::new(merchant_id)),
        Principal::Bank => Err(AppError::Unauthorized(
            "bank credentials cannot place orders".to_string(),
        )),
    }
}

/// Resolves `X-Bank-Auth: Bearer base64(<api_key>:<api_secret>)` to the bank principal.
pub async fn authenticate_bank(store: &dyn LedgerStore, header: Option<&str>) -> Result<(), AppError> {
    let token = header
        .map(str::trim)
        .filter(|h| h.get(..7).map_or(false, |p| p.eq_ignore_ascii_case("bearer ")))
        .and_then(|h| h.get(7..))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::MissingHeader(BANK_AUTH_HEADER.to_string()))?;
    let decoded = STANDARD
        .decode(token)
        .map_err(|_| AppError::Unauthorized("token is not base64".to_string()))?;
    let pair = String::from_utf8(decoded)
        .map_err(|_| AppError::Unauthorized("token is not utf-8".to_string()))?;
    let (api_key, api_secret) = split_pair(&pair)?;

    match resolve_credential(store, api_key, api_secret).await? {
        Principal::Bank => Ok(()),
        Principal::Merchant(_) => Err(AppError::Unauthorized(
            "merchant credentials cannot post bank notifications".to_string(),
        )),
    }
}
