//! Login dialog hand-off.
//!
//! The pipeline never writes responses. When a user has to (re)authorize the
//! application it produces a [`Redirect`] and the HTTP layer turns it into a
//! response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::ApplicationConfig;

/// Default platform login dialog.
pub const DEFAULT_DIALOG_URL: &str = "https://www.facebook.com/dialog/oauth";

/// How a redirect should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectMode {
    /// A plain `302 Found` with a `Location` header.
    #[default]
    Http,
    /// An HTML page that navigates the top frame.
    ///
    /// Canvas and tab pages run inside an iframe; the login dialog refuses
    /// to render there, so the whole window has to move.
    TopFrame,
}

/// A redirect instruction for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    url: Url,
    mode: RedirectMode,
}

impl Redirect {
    pub fn new(url: Url, mode: RedirectMode) -> Self {
        Self { url, mode }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn mode(&self) -> RedirectMode {
        self.mode
    }

    /// Value for the `Location` header.
    pub fn location(&self) -> &str {
        self.url.as_str()
    }

    /// HTML document that sends the top frame to the target.
    pub fn top_frame_html(&self) -> String {
        // JSON string literal is valid JS; "</" is escaped so the URL cannot close the script tag.
        let target = Value::String(self.url.to_string()).to_string().replace("</", "<\\/");
        format!(
            "<!DOCTYPE html>\n<html><head><script>top.location.href = {};</script></head><body></body></html>\n",
            target
        )
    }
}

/// Builder for the login dialog URL.
///
/// # Example
///
/// ```rust
/// use canvasgate_core::login::LoginUrl;
/// use url::Url;
///
/// let url = LoginUrl::new(
///     Url::parse("https://www.facebook.com/dialog/oauth").unwrap(),
///     "123",
///     Url::parse("https://apps.facebook.com/myapp/").unwrap(),
/// )
/// .scopes(["email", "publish_stream"])
/// .build();
///
/// assert!(url.as_str().contains("scope=email%2Cpublish_stream"));
/// ```
#[derive(Debug, Clone)]
pub struct LoginUrl {
    dialog_url: Url,
    client_id: String,
    redirect_uri: Url,
    scopes: Vec<String>,
    state: Option<String>,
}

impl LoginUrl {
    pub fn new(dialog_url: Url, client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            dialog_url,
            client_id: client_id.into(),
            redirect_uri,
            scopes: Vec::new(),
            state: None,
        }
    }

    /// Login URL for an application: its dialog, its canvas URL as the
    /// return target and its full scope list.
    pub fn for_application(config: &ApplicationConfig) -> Self {
        Self::new(
            config.dialog_url().clone(),
            config.id(),
            config.canvas_url().clone(),
        )
        .scopes(config.scopes().iter().cloned())
    }

    /// Where the dialog sends the user back to.
    pub fn redirect_uri(mut self, redirect_uri: Url) -> Self {
        self.redirect_uri = redirect_uri;
        self
    }

    pub fn scopes<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Opaque value echoed back to the redirect target.
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn build(&self) -> Url {
        let mut url = self.dialog_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", self.redirect_uri.as_str());
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(","));
            }
            if let Some(state) = &self.state {
                query.append_pair("state", state);
            }
        }
        url
    }
}
