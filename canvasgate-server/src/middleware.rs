//! Gate middleware.
//!
//! Runs on every gated route: identifies the session, pulls a fresh
//! `signed_request` out of form posts, runs the pipeline and either hands the
//! request on with its [`Authorized`](canvasgate_core::Authorized) result in
//! the extensions or answers with the rejection.

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use canvasgate_core::{GateError, GateRequest, SessionId};

use crate::error::ServerError;
use crate::response::LoginRedirect;
use crate::state::GateState;

/// Form field carrying the platform's signed envelope.
pub const SIGNED_REQUEST_FIELD: &str = "signed_request";

pub(crate) async fn gate_middleware(
    State(state): State<GateState>,
    matched: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let cookie_name = state.settings.session_cookie.as_str();
    let (session, minted) = match session_from_cookies(request.headers(), cookie_name) {
        Some(session) => (session, false),
        None => (SessionId::generate(), true),
    };

    let route = matched
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let (request, signed_request) =
        match extract_signed_request(request, state.settings.max_body_bytes).await {
            Ok(extracted) => extracted,
            Err(e) => return with_session_cookie(e.into_response(), cookie_name, &session, minted),
        };

    let mut gate_request = GateRequest::new(session.clone(), route);
    gate_request.signed_request = signed_request;

    let result = state
        .pipeline
        .authorize_with(gate_request, state.requirements.clone())
        .await;

    let response = match result {
        Ok(authorized) => {
            let mut request = request;
            request.extensions_mut().insert(authorized);
            next.run(request).await
        }
        Err(error) => rejection(&state, error),
    };

    with_session_cookie(response, cookie_name, &session, minted)
}

fn rejection(state: &GateState, error: GateError) -> Response {
    let wants_login = state.settings.redirect_unauthorized
        && matches!(
            error,
            GateError::Authorization(_) | GateError::Permission { .. }
        );

    if !wants_login {
        return ServerError::from(error).into_response();
    }

    match state.pipeline.authorize_redirect(None) {
        Ok(redirect) => LoginRedirect(redirect).into_response(),
        Err(e) => ServerError::from(e).into_response(),
    }
}

/// Find the session id in the request's `Cookie` headers.
pub(crate) fn session_from_cookies(headers: &HeaderMap, name: &str) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| SessionId::new(value))
}

fn with_session_cookie(
    mut response: Response,
    name: &str,
    session: &SessionId,
    minted: bool,
) -> Response {
    if !minted {
        return response;
    }
    // Canvas pages live in a cross-site iframe.
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; Secure; SameSite=None",
        name, session
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => log::warn!("Could not set session cookie {}: {}", name, e),
    }
    response
}

/// Buffer a form POST body, pull out `signed_request`, and put the body back.
async fn extract_signed_request(
    request: Request,
    max_body_bytes: usize,
) -> Result<(Request, Option<String>), ServerError> {
    if request.method() != Method::POST || !is_form(request.headers()) {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|e| ServerError::InvalidRequest(format!("Failed to read form body: {}", e)))?;

    let signed_request = url::form_urlencoded::parse(&bytes)
        .find(|(key, _)| key == SIGNED_REQUEST_FIELD)
        .map(|(_, value)| value.into_owned());

    Ok((Request::from_parts(parts, Body::from(bytes)), signed_request))
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}
