//! Per-request context.
//!
//! Bundles the parsed request, the live connection and the resolved
//! session. All response writing and cookie handling goes through here.
//!
//! The response moves forward only:
//!
//! ```text
//! NotStarted --start_response/write/abort/redirect--> HeadersSent --write--> BodyWritten
//! ```

use std::io;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use chrono::Utc;

use crate::cookie::jar::cookie_expiry;
use crate::cookie::{format_set_cookie, CookieError, CookieSigner};
use crate::http::connection::Connection;
use crate::http::request::Request;
use crate::session::{Session, SessionId};

/// Where the response currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    NotStarted,
    HeadersSent,
    BodyWritten,
}

pub struct Context {
    request: Request,
    conn: Box<dyn Connection>,
    signer: Arc<CookieSigner>,
    session: Session,
    session_id: Option<SessionId>,
    state: ResponseState,
    status: Option<StatusCode>,
}

impl Context {
    pub fn new(request: Request, conn: Box<dyn Connection>, signer: Arc<CookieSigner>) -> Self {
        Self {
            request,
            conn,
            signer,
            session: Session::new(),
            session_id: None,
            state: ResponseState::NotStarted,
            status: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// A query or form parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    /// A raw (unsigned) request cookie.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.request.cookie(name)
    }

    pub fn response_state(&self) -> ResponseState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state != ResponseState::NotStarted
    }

    /// Status sent so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Send the status line. Ignored once the response has started.
    pub fn start_response(&mut self, status: StatusCode) {
        if self.is_started() {
            tracing::warn!(
                path = %self.request.path,
                status = %status,
                "Response already started; status ignored"
            );
            return;
        }
        self.conn.start_response(status);
        self.status = Some(status);
        self.state = ResponseState::HeadersSent;
    }

    pub fn set_header(&mut self, name: &str, value: &str, unique: bool) {
        self.conn.set_header(name, value, unique);
    }

    /// Write body bytes, starting a 200 response first if needed.
    /// HEAD requests get an empty body.
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.is_started() {
            self.start_response(StatusCode::OK);
        }
        let data = if self.request.is_head() { &[][..] } else { data };
        let written = self.conn.write(data)?;
        self.state = ResponseState::BodyWritten;
        Ok(written)
    }

    pub fn write_str(&mut self, content: &str) {
        if let Err(e) = self.write(content.as_bytes()) {
            tracing::warn!(path = %self.request.path, error = %e, "Response write failed");
        }
    }

    /// Respond with `status` and `body`.
    pub fn abort(&mut self, status: StatusCode, body: &str) {
        self.start_response(status);
        self.write_str(body);
    }

    pub fn redirect(&mut self, status: StatusCode, url: &str) {
        self.set_header("Location", url, true);
        self.start_response(status);
        self.write_str(&format!("Redirecting to: {}", url));
    }

    pub fn not_found(&mut self, message: &str) {
        self.abort(StatusCode::NOT_FOUND, message);
    }

    /// Set a plain cookie living `age_secs` seconds (0 = long-lived).
    pub fn set_cookie(&mut self, name: &str, value: &str, age_secs: u64) {
        let expires = cookie_expiry(age_secs, Utc::now());
        let cookie = format_set_cookie(name, value, expires);
        self.set_header("Set-Cookie", &cookie, false);
    }

    /// Set a signed cookie. Refused (and logged) without a secret.
    pub fn set_secure_cookie(&mut self, name: &str, value: &str, age_secs: u64) -> Result<(), CookieError> {
        match self.signer.encode(value) {
            Ok(wire) => {
                self.set_cookie(name, &wire, age_secs);
                Ok(())
            }
            Err(e) => {
                tracing::error!(cookie = %name, error = %e, "Refusing to set secure cookie");
                Err(e)
            }
        }
    }

    /// Read and verify a signed cookie. Any failure reads as absent.
    pub fn get_secure_cookie(&self, name: &str) -> Option<String> {
        let raw = self.request.cookie(name)?;
        match self.signer.decode(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(cookie = %name, error = %e, "Ignoring secure cookie");
                None
            }
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Used by session stores while loading.
    pub fn set_session_id(&mut self, id: SessionId) {
        self.session_id = Some(id);
    }

    /// Used by session stores while loading.
    pub fn set_session(&mut self, session: Session) {
        self.session = session;
    }

    /// Hand the response to the transport.
    pub fn close(&mut self) {
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::connection::BufferedConnection;
    use axum::body::{Body, Bytes};
    use axum::http::{header, Response};
    use tokio::sync::oneshot;

    fn context(request: Request) -> (Context, oneshot::Receiver<Response<Body>>) {
        let (conn, rx) = BufferedConnection::new();
        let signer = Arc::new(CookieSigner::new(Some("context-secret")));
        (Context::new(request, Box::new(conn), signer), rx)
    }

    fn body_of(response: Response<Body>) -> Bytes {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(axum::body::to_bytes(response.into_body(), usize::MAX))
            .unwrap()
    }

    #[test]
    fn test_write_promotes_to_ok() {
        let (mut ctx, mut rx) = context(Request::new(Method::GET, "/"));
        assert_eq!(ctx.response_state(), ResponseState::NotStarted);
        ctx.write_str("hi");
        assert_eq!(ctx.response_state(), ResponseState::BodyWritten);
        assert_eq!(ctx.status(), Some(StatusCode::OK));
        ctx.close();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response), "hi");
    }

    #[test]
    fn test_no_backward_transition() {
        let (mut ctx, mut rx) = context(Request::new(Method::GET, "/"));
        ctx.abort(StatusCode::FORBIDDEN, "no");
        ctx.start_response(StatusCode::OK);
        assert_eq!(ctx.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(ctx.response_state(), ResponseState::BodyWritten);
        ctx.close();
        assert_eq!(rx.try_recv().unwrap().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_head_writes_empty_body() {
        let (mut ctx, mut rx) = context(Request::new(Method::HEAD, "/"));
        ctx.write_str("invisible");
        ctx.close();
        assert!(body_of(rx.try_recv().unwrap()).is_empty());
    }

    #[test]
    fn test_redirect() {
        let (mut ctx, mut rx) = context(Request::new(Method::GET, "/old"));
        ctx.redirect(StatusCode::FOUND, "/new");
        ctx.close();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/new");
        assert_eq!(body_of(response), "Redirecting to: /new");
    }

    #[test]
    fn test_secure_cookie_roundtrip() {
        let (mut ctx, mut rx) = context(Request::new(Method::GET, "/"));
        ctx.set_secure_cookie("token", "abc", 60).unwrap();
        ctx.close();
        let response = rx.try_recv().unwrap();
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("token="));
        assert!(set_cookie.contains("; expires="));
        assert!(set_cookie.ends_with(" GMT; path=/"));

        let wire = set_cookie
            .trim_start_matches("token=")
            .split(';')
            .next()
            .unwrap();
        let mut request = Request::new(Method::GET, "/")
            .with_header(header::COOKIE, &format!("token={}", wire));
        request.parse_cookies().unwrap();
        let (ctx, _rx) = context(request);
        assert_eq!(ctx.get_secure_cookie("token").as_deref(), Some("abc"));
        assert_eq!(ctx.get_secure_cookie("missing"), None);
    }

    #[test]
    fn test_tampered_cookie_reads_absent() {
        let mut request = Request::new(Method::GET, "/")
            .with_header(header::COOKIE, "token=YWJj|1700000000|0000");
        request.parse_cookies().unwrap();
        let (ctx, _rx) = context(request);
        assert_eq!(ctx.get_secure_cookie("token"), None);
    }

    #[test]
    fn test_secure_cookie_refused_without_secret() {
        let (conn, _rx) = BufferedConnection::new();
        let mut ctx = Context::new(
            Request::new(Method::GET, "/"),
            Box::new(conn),
            Arc::new(CookieSigner::new(None)),
        );
        assert_eq!(ctx.set_secure_cookie("a", "b", 0), Err(CookieError::NoSecret));
    }
}
