//! HTTP rendering of redirect instructions.

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use canvasgate_core::{Redirect, RedirectMode};

/// Response for a login redirect.
///
/// [`RedirectMode::Http`] becomes `302 Found`; [`RedirectMode::TopFrame`]
/// becomes an HTML page that moves the top frame out of the canvas iframe.
#[derive(Debug, Clone)]
pub struct LoginRedirect(pub Redirect);

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        match self.0.mode() {
            RedirectMode::Http => (
                StatusCode::FOUND,
                [(header::LOCATION, self.0.location().to_string())],
            )
                .into_response(),
            RedirectMode::TopFrame => Html(self.0.top_frame_html()).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn target() -> Url {
        Url::parse("https://www.facebook.com/dialog/oauth?client_id=1").unwrap()
    }

    #[test]
    fn test_http_redirect() {
        let response = LoginRedirect(Redirect::new(target(), RedirectMode::Http)).into_response();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://www.facebook.com/dialog/oauth?client_id=1"
        );
    }

    #[tokio::test]
    async fn test_top_frame_redirect() {
        let response =
            LoginRedirect(Redirect::new(target(), RedirectMode::TopFrame)).into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("top.location.href"));
    }
}
