//! Signal table: maps signal names to handlers, plus connect/disconnect hooks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::session::Session;
use crate::signature::{Args, Signature};
use crate::types::HandlerResult;

/// Implement this trait to handle a signal from the frontend.
///
/// # Example
///
/// ```rust,no_run
/// use sb_analysis::{Args, HandlerResult, Session, SignalHandler, Signature};
///
/// struct Ping(Signature);
///
/// #[async_trait::async_trait]
/// impl SignalHandler for Ping {
///     fn signature(&self) -> &Signature {
///         &self.0
///     }
///     async fn call(&self, session: Session, _args: Args) -> HandlerResult {
///         session.emit("pong", &serde_json::json!({})).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait SignalHandler: Send + Sync + 'static {
    /// Parameters the payload is bound against before [`call`](Self::call).
    fn signature(&self) -> &Signature;

    async fn call(&self, session: Session, args: Args) -> HandlerResult;
}

/// Adapter turning an async closure into a [`SignalHandler`].
struct FnHandler<F> {
    signature: Signature,
    f: F,
}

#[async_trait::async_trait]
impl<F, Fut> SignalHandler for FnHandler<F>
where
    F: Fn(Session, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn call(&self, session: Session, args: Args) -> HandlerResult {
        (self.f)(session, args).await
    }
}

type Hook = Arc<dyn Fn(Session) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Handlers of one analysis.
///
/// Signal names match exactly. The table is built once at startup and then
/// shared behind an `Arc`; it is never mutated while sessions are live.
#[derive(Clone, Default)]
pub struct SignalTable {
    handlers: HashMap<String, Arc<dyn SignalHandler>>,
    on_connect: Option<Hook>,
    on_disconnect: Option<Hook>,
}

impl SignalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A second registration under the same name replaces
    /// the first.
    pub fn register<H: SignalHandler>(&mut self, name: impl Into<String>, handler: H) -> &mut Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register a pre-wrapped handler.
    pub fn register_boxed(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn SignalHandler>,
    ) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Register an async closure with the given signature.
    pub fn on<F, Fut>(&mut self, name: impl Into<String>, signature: Signature, f: F) -> &mut Self
    where
        F: Fn(Session, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(name, FnHandler { signature, f })
    }

    /// Runs once per new session, before any signal is dispatched.
    /// The request's query arguments are on [`Session::request_args`].
    pub fn on_connect<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_connect = Some(Arc::new(move |s| f(s).boxed()));
        self
    }

    /// Runs once when a session closes.
    pub fn on_disconnect<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_disconnect = Some(Arc::new(move |s| f(s).boxed()));
        self
    }

    pub fn get(&self, signal: &str) -> Option<Arc<dyn SignalHandler>> {
        self.handlers.get(signal).cloned()
    }

    /// All registered signal names (sorted).
    pub fn signal_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn connect(&self, session: &Session) -> HandlerResult {
        match &self.on_connect {
            Some(hook) => hook(session.clone()).await,
            None => Ok(()),
        }
    }

    pub async fn disconnect(&self, session: &Session) -> HandlerResult {
        match &self.on_disconnect {
            Some(hook) => hook(session.clone()).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SignalTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalTable")
            .field("signals", &self.signal_names())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}
