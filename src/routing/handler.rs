//! Typed handler shapes.
//!
//! A handler is one of three fixed shapes, decided when it is registered:
//!
//! - [`Handler::ContextOnly`]: `fn(&mut Context) -> R`
//! - [`Handler::ContextPlusArgs`]: `fn(&mut Context, String, ..) -> R`
//! - [`Handler::ArgsOnly`]: `fn(String, ..) -> R`
//!
//! The arity is known up front, so the route table can reject a handler
//! whose argument count does not equal the pattern's capture count before
//! any request arrives.
//!
//! Plain functions and closures convert through [`IntoHandler`] for up to
//! four captured arguments; wider handlers use the explicit constructors.

use std::fmt;
use std::sync::Arc;

use crate::http::context::Context;

/// What a handler hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to write; the handler owns the response.
    Empty,
    /// A body to send with status 200 if the response has not started.
    Body(String),
}

/// Conversion of handler return values into a [`Reply`].
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply {
        self
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply {
        Reply::Empty
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply {
        Reply::Body(self)
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Reply {
        Reply::Body(self.to_string())
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Reply {
        self.map_or(Reply::Empty, IntoReply::into_reply)
    }
}

type ContextFn = dyn Fn(&mut Context) -> Reply + Send + Sync;
type ContextArgsFn = dyn Fn(&mut Context, Vec<String>) -> Reply + Send + Sync;
type ArgsFn = dyn Fn(Vec<String>) -> Reply + Send + Sync;

/// A registered request handler.
#[derive(Clone)]
pub enum Handler {
    ContextOnly(Arc<ContextFn>),
    ContextPlusArgs { arity: usize, call: Arc<ContextArgsFn> },
    ArgsOnly { arity: usize, call: Arc<ArgsFn> },
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::ContextOnly(_) => f.write_str("ContextOnly"),
            Handler::ContextPlusArgs { arity, .. } => write!(f, "ContextPlusArgs({})", arity),
            Handler::ArgsOnly { arity, .. } => write!(f, "ArgsOnly({})", arity),
        }
    }
}

impl Handler {
    /// Handler that only takes the request context.
    pub fn context_only<F, R>(f: F) -> Self
    where
        F: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        Handler::ContextOnly(Arc::new(move |ctx: &mut Context| f(ctx).into_reply()))
    }

    /// Handler taking the context plus `arity` captured strings.
    pub fn context_plus_args<F, R>(arity: usize, f: F) -> Self
    where
        F: Fn(&mut Context, Vec<String>) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        Handler::ContextPlusArgs {
            arity,
            call: Arc::new(move |ctx: &mut Context, args: Vec<String>| f(ctx, args).into_reply()),
        }
    }

    /// Handler taking `arity` captured strings and no context.
    pub fn args_only<F, R>(arity: usize, f: F) -> Self
    where
        F: Fn(Vec<String>) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        Handler::ArgsOnly {
            arity,
            call: Arc::new(move |args: Vec<String>| f(args).into_reply()),
        }
    }

    /// Number of captured strings the handler expects.
    pub fn arity(&self) -> usize {
        match self {
            Handler::ContextOnly(_) => 0,
            Handler::ContextPlusArgs { arity, .. } | Handler::ArgsOnly { arity, .. } => *arity,
        }
    }

    /// Whether the context is bound as the first argument.
    pub fn takes_context(&self) -> bool {
        !matches!(self, Handler::ArgsOnly { .. })
    }

    /// Invoke with the context and the captured groups.
    ///
    /// `args.len()` equals [`arity`](Self::arity); the route table checks
    /// this at registration.
    pub fn call(&self, ctx: &mut Context, args: Vec<String>) -> Reply {
        match self {
            Handler::ContextOnly(call) => call(ctx),
            Handler::ContextPlusArgs { call, .. } => call(ctx, args),
            Handler::ArgsOnly { call, .. } => call(args),
        }
    }
}

/// Conversion of functions and closures into a [`Handler`].
///
/// `Marker` only disambiguates the blanket impls for different signatures.
pub trait IntoHandler<Marker> {
    fn into_handler(self) -> Handler;
}

impl IntoHandler<Handler> for Handler {
    fn into_handler(self) -> Handler {
        self
    }
}

impl<F, R> IntoHandler<fn(&mut Context) -> R> for F
where
    F: Fn(&mut Context) -> R + Send + Sync + 'static,
    R: IntoReply,
{
    fn into_handler(self) -> Handler {
        Handler::context_only(self)
    }
}

impl<F, R> IntoHandler<fn() -> R> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoReply,
{
    fn into_handler(self) -> Handler {
        Handler::args_only(0, move |_args: Vec<String>| self())
    }
}

macro_rules! capture_ty {
    ($_arg:ident) => {
        String
    };
}

macro_rules! impl_into_handler {
    ($arity:literal, $($arg:ident),+) => {
        impl<F, R> IntoHandler<fn(&mut Context, $(capture_ty!($arg)),+) -> R> for F
        where
            F: Fn(&mut Context, $(capture_ty!($arg)),+) -> R + Send + Sync + 'static,
            R: IntoReply,
        {
            fn into_handler(self) -> Handler {
                Handler::context_plus_args($arity, move |ctx: &mut Context, args: Vec<String>| {
                    let mut args = args.into_iter();
                    $(let $arg = args.next().unwrap_or_default();)+
                    self(ctx, $($arg),+)
                })
            }
        }

        impl<F, R> IntoHandler<fn($(capture_ty!($arg)),+) -> R> for F
        where
            F: Fn($(capture_ty!($arg)),+) -> R + Send + Sync + 'static,
            R: IntoReply,
        {
            fn into_handler(self) -> Handler {
                Handler::args_only($arity, move |args: Vec<String>| {
                    let mut args = args.into_iter();
                    $(let $arg = args.next().unwrap_or_default();)+
                    self($($arg),+)
                })
            }
        }
    };
}

impl_into_handler!(1, a);
impl_into_handler!(2, a, b);
impl_into_handler!(3, a, b, c);
impl_into_handler!(4, a, b, c, d);

#[cfg(test)]
mod tests {
    use super::*;

    fn greet(name: String) -> String {
        format!("Hi {}", name)
    }

    fn pair(a: String, b: String) -> String {
        format!("{}+{}", a, b)
    }

    fn nothing() {}

    #[test]
    fn test_arity_from_signature() {
        assert_eq!(greet.into_handler().arity(), 1);
        assert_eq!(pair.into_handler().arity(), 2);
        assert_eq!(nothing.into_handler().arity(), 0);
        assert!(!greet.into_handler().takes_context());

        let h = (|_ctx: &mut Context, id: String| id).into_handler();
        assert_eq!(h.arity(), 1);
        assert!(h.takes_context());

        let h = (|_ctx: &mut Context| "ok").into_handler();
        assert!(matches!(h, Handler::ContextOnly(_)));
    }

    #[test]
    fn test_explicit_shapes() {
        let h = Handler::args_only(5, |args: Vec<String>| args.concat());
        assert_eq!(h.arity(), 5);
        let h = Handler::context_plus_args(2, |_ctx: &mut Context, args: Vec<String>| args.len().to_string());
        assert_eq!(h.arity(), 2);
        assert_eq!(format!("{:?}", h), "ContextPlusArgs(2)");
    }

    #[test]
    fn test_reply_conversions() {
        assert_eq!(().into_reply(), Reply::Empty);
        assert_eq!("x".into_reply(), Reply::Body("x".into()));
        assert_eq!(None::<String>.into_reply(), Reply::Empty);
        assert_eq!(Some("y".to_string()).into_reply(), Reply::Body("y".into()));
    }
}
