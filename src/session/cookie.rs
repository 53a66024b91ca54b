//! Session store that keeps the whole session in a signed cookie.
//!
//! The server holds nothing. Every save serializes the session to JSON and
//! re-issues the signed `sessionData` cookie; expiry is the signer's
//! timestamp check on the way back in. The `sessionId` cookie is issued as
//! for every other backend so handlers can rely on an id being present.
//!
//! Saving sets a header, so it only reaches the client if the handler left
//! the response unstarted (returned its body instead of writing it).

use crate::http::context::Context;
use crate::session::{load_session_id, Session, SessionError, SessionStore};

/// Cookie carrying the signed, serialized session.
pub const SESSION_DATA_COOKIE: &str = "sessionData";

// Browsers cap a single cookie at roughly 4 KiB.
const COOKIE_SIZE_WARNING: usize = 4096;

const STORE_NAME: &str = "cookie";

#[derive(Debug, Clone)]
pub struct CookieStore {
    duration_secs: u64,
}

impl CookieStore {
    pub fn new(duration_secs: u64) -> Self {
        Self { duration_secs }
    }
}

impl SessionStore for CookieStore {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    fn init(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn load(&self, ctx: &mut Context) {
        load_session_id(ctx, STORE_NAME, self.duration_secs);

        let session = match ctx.get_secure_cookie(SESSION_DATA_COOKIE) {
            Some(raw) => Session::from_json(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Discarding unreadable session cookie");
                Session::new()
            }),
            None => Session::new(),
        };
        ctx.set_session(session);
    }

    fn save(&self, ctx: &mut Context) {
        let json = match ctx.session().to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Session not serializable; not saved");
                return;
            }
        };
        if json.len() > COOKIE_SIZE_WARNING {
            tracing::warn!(
                bytes = json.len(),
                "Session cookie exceeds 4 KiB; clients may drop it"
            );
        }
        // Refusal without a secret is already logged by the context.
        let _ = ctx.set_secure_cookie(SESSION_DATA_COOKIE, &json, self.duration_secs);
    }

    fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
}
