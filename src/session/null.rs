//! Store used when no backend is configured or one failed to start.
//!
//! Loads always yield an empty session and saves are discarded. No cookie
//! is issued, so a misconfigured deployment does not hand out ids that
//! will never resolve.

use crate::http::context::Context;
use crate::session::{Session, SessionError, SessionStore};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl SessionStore for NullStore {
    fn name(&self) -> &'static str {
        "null"
    }

    fn init(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn load(&self, ctx: &mut Context) {
        ctx.set_session(Session::new());
    }

    fn save(&self, _ctx: &mut Context) {}

    fn duration_secs(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::*;

    #[test]
    fn test_nothing_persists() {
        let store = NullStore;
        let (mut ctx, rx) = context_with_cookies(None);
        store.load(&mut ctx);
        ctx.session_mut().insert("count", 1u64);
        store.save(&mut ctx);
        assert!(ctx.session_id().is_none());
        let cookies = replay_cookies(ctx, rx);
        assert!(cookies.is_empty());

        let (mut ctx, _rx) = context_with_cookies(None);
        store.load(&mut ctx);
        assert!(ctx.session().is_empty());
    }
}
