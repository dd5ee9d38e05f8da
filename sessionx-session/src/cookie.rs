//! Session cookie template.
//!
//! The template is configuration only. Every outbound cookie is built fresh
//! from it, so no two sessions ever share a mutable cookie value.

use crate::error::{SessionError, SessionResult};
use chrono::{DateTime, Utc};
use cookie::time::{Duration as CookieDuration, OffsetDateTime};
use cookie::{Cookie, SameSite};

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "session-id";

/// Attributes shared by every session cookie.
///
/// `HttpOnly` is not configurable: session cookies are always hidden from
/// scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieTemplate {
    name: String,
    domain: Option<String>,
    path: String,
    secure: bool,
    same_site: Option<SameSite>,
}

impl Default for CookieTemplate {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            domain: None,
            path: "/".to_string(),
            secure: false,
            same_site: None,
        }
    }
}

impl CookieTemplate {
    /// Create a template with the default attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cookie name.
    #[must_use]
    pub fn name(self, value: impl Into<String>) -> Self {
        Self {
            name: value.into(),
            ..self
        }
    }

    /// Sets the `Domain` attribute.
    #[must_use]
    pub fn domain(self, value: impl Into<String>) -> Self {
        Self {
            domain: Some(value.into()),
            ..self
        }
    }

    /// Sets the `Path` attribute. Default is `/`.
    #[must_use]
    pub fn path(self, value: impl Into<String>) -> Self {
        Self {
            path: value.into(),
            ..self
        }
    }

    /// Sets the `Secure` attribute. Default is `false`.
    #[must_use]
    pub fn secure(self, value: bool) -> Self {
        Self {
            secure: value,
            ..self
        }
    }

    /// Sets the `SameSite` attribute.
    #[must_use]
    pub fn same_site(self, value: impl Into<Option<SameSite>>) -> Self {
        Self {
            same_site: value.into(),
            ..self
        }
    }

    /// The cookie name.
    pub fn cookie_name(&self) -> &str {
        &self.name
    }

    /// The cookie path.
    pub fn cookie_path(&self) -> &str {
        &self.path
    }

    /// The cookie domain, if any.
    pub fn cookie_domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Whether the cookie is restricted to HTTPS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Check name and path before the template is used.
    pub fn validate(&self) -> SessionResult<()> {
        if self.name.is_empty() {
            return Err(SessionError::Config("cookie name must not be empty".to_string()));
        }
        if !self.name.chars().all(is_token_char) {
            return Err(SessionError::Config(format!(
                "cookie name {:?} contains characters not allowed in a cookie token",
                self.name
            )));
        }
        if !self.path.starts_with('/') {
            return Err(SessionError::Config(
                "cookie path must be absolute (start with '/')".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the cookie binding `session_id` to the client until `expires_at`.
    ///
    /// `Max-Age` and `Expires` both round up to whole seconds, so neither
    /// lets the client drop the cookie before the session ends.
    pub fn issue(&self, session_id: &str, expires_at: DateTime<Utc>) -> Cookie<'static> {
        let mut cookie = self.base(session_id.to_string());

        let millis = (expires_at - Utc::now()).num_milliseconds().max(0);
        cookie.set_max_age(CookieDuration::seconds((millis + 999) / 1000));
        if let Ok(at) = OffsetDateTime::from_unix_timestamp(ceil_to_second(expires_at)) {
            cookie.set_expires(at);
        }

        cookie
    }

    /// Build a cookie that makes the client drop the session cookie.
    pub fn removal(&self) -> Cookie<'static> {
        let mut cookie = self.base(String::new());
        cookie.make_removal();
        cookie
    }

    /// Find this template's cookie in a raw `Cookie` request header.
    ///
    /// Values are percent-decoded. Malformed pairs are skipped.
    pub fn extract(&self, header: &str) -> Option<String> {
        Cookie::split_parse_encoded(header)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.name)
            .map(|cookie| cookie.value().to_string())
    }

    fn base(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), value);
        cookie.set_path(self.path.clone());
        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }
        cookie.set_secure(self.secure);
        cookie.set_http_only(true);
        cookie.set_same_site(self.same_site);
        cookie
    }
}

fn ceil_to_second(at: DateTime<Utc>) -> i64 {
    if at.timestamp_subsec_nanos() > 0 {
        at.timestamp() + 1
    } else {
        at.timestamp()
    }
}

/// RFC 6265 token characters.
fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c)
}

/// Render a cookie as a `Set-Cookie` header value.
pub fn set_cookie_header(cookie: &Cookie<'_>) -> String {
    cookie.encoded().to_string()
}
