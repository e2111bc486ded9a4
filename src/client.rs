//! HTTP layer over the Forum, shared by puller and poster.
//!
//! A thin wrapper around a [`reqwest::Client`] that carries our own cookie
//! jar: the poster has to look at cookie expiry times, which no stock jar
//! exposes, so `Cookie` headers are applied and `Set-Cookie` responses
//! absorbed by hand. Redirects are not followed: the Forum answers a
//! successful form submission with one, and the cookies it sets along the
//! way must not be lost.

use crate::cookies::CookieJar;
use crate::error::RemoteError;
use chrono::Utc;
use reqwest::header::{COOKIE, SET_COOKIE};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub const BASE_URL: &str = "http://www.linux.org.ru";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

const USER_AGENT: &str = concat!("lornews/", env!("CARGO_PKG_VERSION"));

pub struct Forum {
    http: reqwest::Client,
    base: String,
    jar: CookieJar,
    jar_path: Option<PathBuf>,
}

impl Forum {
    /// A client with no cookie persistence; the puller reads anonymously.
    pub fn anonymous(timeout: Duration) -> Result<Self, RemoteError> {
        Self::build(timeout, CookieJar::default(), None)
    }

    /// A client backed by one user's persistent jar.
    pub fn for_user(cookies_path: PathBuf, timeout: Duration) -> Result<Self, RemoteError> {
        let jar = CookieJar::load(&cookies_path);
        Self::build(timeout, jar, Some(cookies_path))
    }

    /// Point the client somewhere other than the Forum.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    fn build(
        timeout: Duration,
        jar: CookieJar,
        jar_path: Option<PathBuf>,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            base: BASE_URL.to_string(),
            jar,
            jar_path,
        })
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Fetch a page. `path_query` is the part after the base URL, e.g.
    /// `/group-lastmod.jsp?group=42&offset=0`.
    pub async fn get(&mut self, path_query: &str) -> Result<String, RemoteError> {
        let url = format!("{}{}", self.base, path_query);
        debug!(%url, "GET");
        let mut req = self.http.get(&url);
        if let Some(cookies) = self.jar.header_value(Utc::now()) {
            req = req.header(COOKIE, cookies);
        }
        let resp = req.send().await?;
        self.finish(resp).await
    }

    /// Submit an `application/x-www-form-urlencoded` form.
    pub async fn post_form(
        &mut self,
        path: &str,
        fields: &[(&str, String)],
    ) -> Result<String, RemoteError> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "POST");
        let mut req = self.http.post(&url).form(fields);
        if let Some(cookies) = self.jar.header_value(Utc::now()) {
            req = req.header(COOKIE, cookies);
        }
        let resp = req.send().await?;
        self.finish(resp).await
    }

    /// Submit a `multipart/form-data` form (used for image uploads).
    pub async fn post_multipart(
        &mut self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<String, RemoteError> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "POST multipart");
        let mut req = self.http.post(&url).multipart(form);
        if let Some(cookies) = self.jar.header_value(Utc::now()) {
            req = req.header(COOKIE, cookies);
        }
        let resp = req.send().await?;
        self.finish(resp).await
    }

    /// Absorb cookies, check the status, return the body. Redirects count
    /// as success: the Forum redirects after login and after an accepted
    /// submission.
    async fn finish(&mut self, resp: reqwest::Response) -> Result<String, RemoteError> {
        let mut set_any = false;
        for value in resp.headers().get_all(SET_COOKIE) {
            if let Ok(header) = value.to_str() {
                self.jar.store(header);
                set_any = true;
            }
        }
        if set_any {
            self.save_jar();
        }
        let status = resp.status();
        if !status.is_success() && !status.is_redirection() {
            return Err(RemoteError::Status(format!(
                "{:?} {}",
                resp.version(),
                status
            )));
        }
        Ok(resp.text().await?)
    }

    fn save_jar(&self) {
        if let Some(path) = &self.jar_path {
            if let Err(e) = self.jar.save(path) {
                tracing::warn!(path = %path.display(), error = %e, "cannot save cookie jar");
            }
        }
    }

    /// Force a jar save; the poster calls this after its login/refresh step.
    pub fn persist_jar(&self) {
        self.save_jar();
    }
}
