//! Route table and handlers. Every handler is a thin shim: deserialize,
//! call the flow controller, serialize.

use axum::extract::{Json, Query, State};
use axum::routing::{Router, get, post};
use http::StatusCode;
use serde::Deserialize;

use passless::{
    CreationOptions, RegisterCredential, RequestOptions, SignInCredential, SignInResponse,
    SignUpOptions,
};

use crate::error::{ApiError, ErrorBody};
use crate::session::AuthUser;
use crate::state::AuthState;

/// The auth router. Mount it at the server root; the emailed links point at
/// `{server_url}/verify`.
pub fn auth_router(state: AuthState) -> Router {
    Router::new()
        .route("/signin/magic-link", post(signin_magic_link))
        .route("/signin/passwordless/email", post(signin_passwordless_email))
        .route("/signin/passwordless/sms", post(signin_passwordless_sms))
        .route("/signin/otp/verify", post(signin_otp_verify))
        .route("/signin/webauthn", post(signin_webauthn))
        .route("/signin/webauthn/verify", post(signin_webauthn_verify))
        .route("/signup/webauthn", post(signup_webauthn))
        .route("/signup/webauthn/verify", post(signup_webauthn_verify))
        .route("/user/webauthn", post(user_webauthn_add))
        .route("/user/webauthn/verify", post(user_webauthn_verify))
        .route("/verify", get(verify_ticket))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmailStartRequest {
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) options: Option<SignUpOptions>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OtpVerifyRequest {
    pub(crate) email: String,
    pub(crate) otp: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignInVerifyRequest {
    pub(crate) credential: SignInCredential,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignUpVerifyRequest {
    pub(crate) user_id: String,
    pub(crate) credential: RegisterCredential,
    #[serde(default)]
    pub(crate) options: Option<SignUpOptions>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddVerifyRequest {
    pub(crate) credential: RegisterCredential,
    #[serde(default)]
    pub(crate) nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyQuery {
    pub(crate) ticket: String,
}

pub(crate) async fn signin_magic_link(
    State(state): State<AuthState>,
    Json(request): Json<EmailStartRequest>,
) -> Result<Json<&'static str>, ApiError> {
    state
        .passwordless
        .start_magic_link(&request.email, &request.options.unwrap_or_default())
        .await?;
    Ok(Json("OK"))
}

pub(crate) async fn signin_passwordless_email(
    State(state): State<AuthState>,
    Json(request): Json<EmailStartRequest>,
) -> Result<Json<&'static str>, ApiError> {
    state
        .passwordless
        .start_passwordless_email(&request.email, &request.options.unwrap_or_default())
        .await?;
    Ok(Json("OK"))
}

pub(crate) async fn signin_passwordless_sms() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(ErrorBody {
            status: 501,
            error: "not-implemented",
            message: "SMS sign-in is not implemented".to_string(),
        }),
    )
}

pub(crate) async fn signin_otp_verify(
    State(state): State<AuthState>,
    Json(request): Json<OtpVerifyRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    let response = state
        .passwordless
        .complete_otp(&request.email, &request.otp)
        .await?;
    Ok(Json(response))
}

pub(crate) async fn signin_webauthn(
    State(state): State<AuthState>,
    Json(request): Json<EmailStartRequest>,
) -> Result<Json<RequestOptions>, ApiError> {
    let options = state.webauthn.signin_options(&request.email).await?;
    Ok(Json(options))
}

pub(crate) async fn signin_webauthn_verify(
    State(state): State<AuthState>,
    Json(request): Json<SignInVerifyRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    let response = state.webauthn.signin_verify(&request.credential).await?;
    Ok(Json(response))
}

pub(crate) async fn signup_webauthn(
    State(state): State<AuthState>,
    Json(request): Json<EmailStartRequest>,
) -> Result<Json<CreationOptions>, ApiError> {
    let options = state
        .webauthn
        .signup_options(&request.email, &request.options.unwrap_or_default())
        .await?;
    Ok(Json(options))
}

pub(crate) async fn signup_webauthn_verify(
    State(state): State<AuthState>,
    Json(request): Json<SignUpVerifyRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    let response = state
        .webauthn
        .signup_verify(
            &request.user_id,
            &request.credential,
            &request.options.unwrap_or_default(),
        )
        .await?;
    Ok(Json(response))
}

pub(crate) async fn user_webauthn_add(
    auth_user: AuthUser,
    State(state): State<AuthState>,
) -> Result<Json<CreationOptions>, ApiError> {
    let options = state.webauthn.add_options(auth_user.user_id()).await?;
    Ok(Json(options))
}

pub(crate) async fn user_webauthn_verify(
    auth_user: AuthUser,
    State(state): State<AuthState>,
    Json(request): Json<AddVerifyRequest>,
) -> Result<Json<&'static str>, ApiError> {
    state
        .webauthn
        .add_verify(auth_user.user_id(), &request.credential, request.nickname)
        .await?;
    Ok(Json("OK"))
}

/// Redeems an emailed ticket. The original flow redirects the browser to
/// `redirectTo` with the session in a fragment; here the session comes back
/// as JSON and the caller handles navigation.
pub(crate) async fn verify_ticket(
    State(state): State<AuthState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<SignInResponse>, ApiError> {
    let response = state.passwordless.complete_ticket(&query.ticket).await?;
    Ok(Json(response))
}
