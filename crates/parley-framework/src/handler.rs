//! The handler system.
//!
//! Any function whose parameters all implement [`FromContext`] and whose
//! return value implements [`IntoReply`] is a [`Handler`]. Both plain and
//! `async` functions are accepted; which one a function is gets decided by
//! its signature through the marker types [`Immediate`] and [`Awaitable`],
//! so registration never needs to say.
//!
//! ```rust,ignore
//! // Immediate
//! fn hello() -> &'static str {
//!     "Hi!"
//! }
//!
//! // Awaitable, with extractors
//! async fn times(args: Args) -> Result<String, Error> {
//!     let a: i64 = args.get("a")?;
//!     let b: i64 = args.get("b")?;
//!     Ok(format!("{a} times {b} equals {}", a * b))
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::answer::{IntoReply, Reply};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::extractor::FromContext;

/// What every handler invocation produces.
pub type HandlerResult = Result<Reply>;

/// Marker for handlers that return their reply directly.
pub struct Immediate;

/// Marker for handlers that return a future.
pub struct Awaitable;

/// Marker for already type-erased handlers.
pub struct Erased;

/// A function usable as a handler.
///
/// `M` is a marker inferred from the function signature; it never has to be
/// spelled out.
#[async_trait]
pub trait Handler<M>: Clone + Send + Sync + 'static {
    /// Extracts the parameters from `ctx`, runs the handler and converts its
    /// return value.
    async fn call(self, ctx: Context) -> HandlerResult;

    /// The name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

// ============================================================================
// BoxedHandler
// ============================================================================

type ErasedFn = dyn Fn(Context) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A type-erased, cheaply clonable handler.
#[derive(Clone)]
pub struct BoxedHandler {
    name: &'static str,
    call: Arc<ErasedFn>,
}

impl BoxedHandler {
    /// Erases `handler`.
    pub fn new<H, M>(handler: H) -> Self
    where
        H: Handler<M>,
        M: 'static,
    {
        Self {
            name: handler.name(),
            call: Arc::new(move |ctx| handler.clone().call(ctx)),
        }
    }

    /// Wraps a closure that already works on a [`Context`].
    pub fn from_fn<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(Context) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static,
    {
        Self {
            name,
            call: Arc::new(f),
        }
    }

    /// The handler's type name, used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the handler. A panic inside it becomes an [`Error::HandlerFault`].
    pub async fn invoke(&self, ctx: Context) -> HandlerResult {
        match AssertUnwindSafe((self.call)(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(Error::HandlerFault {
                message: format!("handler panicked: {}", panic_message(&*panic)),
                location: None,
            }),
        }
    }
}

impl fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoxedHandler").field(&self.name).finish()
    }
}

#[async_trait]
impl Handler<Erased> for BoxedHandler {
    async fn call(self, ctx: Context) -> HandlerResult {
        self.invoke(ctx).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

// ============================================================================
// Handler implementations for functions
// ============================================================================

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_variables)]
        #[async_trait]
        impl<F, Fut, Res, $($ty,)*> Handler<(Awaitable, $($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: IntoReply + 'static,
            $( $ty: FromContext + Send + 'static, )*
        {
            async fn call(self, ctx: Context) -> HandlerResult {
                $(
                    let $ty = $ty::from_context(&ctx)?;
                )*
                (self)($($ty,)*).await.into_reply()
            }
        }

        #[allow(non_snake_case, unused_variables)]
        #[async_trait]
        impl<F, Res, $($ty,)*> Handler<(Immediate, $($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Res + Clone + Send + Sync + 'static,
            Res: IntoReply + 'static,
            $( $ty: FromContext + Send + 'static, )*
        {
            async fn call(self, ctx: Context) -> HandlerResult {
                $(
                    let $ty = $ty::from_context(&ctx)?;
                )*
                (self)($($ty,)*).into_reply()
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
