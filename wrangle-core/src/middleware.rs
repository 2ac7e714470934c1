// ABOUTME: Middleware trait and registry with chain composition
// ABOUTME: Chains fold right-to-left so the first name runs outermost

use crate::command::Command;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

/// What a middleware sees about the command being executed.
#[derive(Debug, Clone)]
pub struct ChainContext {
    pub command: Command,
}

impl ChainContext {
    pub fn new(command: Command) -> Self {
        Self { command }
    }
}

/// A pre-execution hook for plugin commands.
///
/// `chain` receives the next middleware and returns the composed unit;
/// implementations usually wrap `next` in a closure-style adapter or return a
/// combined instance. `execute` runs the composed behavior; an error aborts
/// plugin dispatch.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn execute(&self, ctx: &ChainContext) -> Result<()>;

    async fn chain(
        &self,
        ctx: &ChainContext,
        next: Arc<dyn Middleware>,
    ) -> Result<Arc<dyn Middleware>>;
}

/// Compose two middleware so both `execute` bodies run in order. The usual
/// body of a [`Middleware::chain`] implementation.
pub fn compose(first: Arc<dyn Middleware>, second: Arc<dyn Middleware>) -> Arc<dyn Middleware> {
    Arc::new(Composed { first, second })
}

/// Composes two middleware so both `execute` bodies run in order.
struct Composed {
    first: Arc<dyn Middleware>,
    second: Arc<dyn Middleware>,
}

#[async_trait]
impl Middleware for Composed {
    async fn execute(&self, ctx: &ChainContext) -> Result<()> {
        self.first.execute(ctx).await?;
        self.second.execute(ctx).await
    }

    async fn chain(
        &self,
        _ctx: &ChainContext,
        next: Arc<dyn Middleware>,
    ) -> Result<Arc<dyn Middleware>> {
        Ok(Arc::new(Composed {
            first: Arc::new(Composed {
                first: Arc::clone(&self.first),
                second: Arc::clone(&self.second),
            }),
            second: next,
        }))
    }
}

/// Sequentially compose `middleware` into one unit and run it.
pub async fn run(ctx: &ChainContext, middleware: Vec<Arc<dyn Middleware>>) -> Result<()> {
    let mut iter = middleware.into_iter();
    let Some(mut seed) = iter.next() else {
        return Ok(());
    };
    for next in iter {
        seed = seed.chain(ctx, next).await?;
    }
    seed.execute(ctx).await
}

/// Named middleware lookup used when resolving a plugin's declared chain.
///
/// In lenient mode (the default) an unregistered name is skipped with a
/// warning; strict mode turns it into an error.
pub struct MiddlewareRegistry {
    middleware: DashMap<String, Arc<dyn Middleware>>,
    strict: bool,
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self {
            middleware: DashMap::new(),
            strict: false,
        }
    }

    pub fn strict() -> Self {
        Self {
            middleware: DashMap::new(),
            strict: true,
        }
    }

    pub fn register(&self, name: &str, mw: Arc<dyn Middleware>) {
        self.middleware.insert(name.to_string(), mw);
    }

    pub fn has(&self, name: &str) -> bool {
        self.middleware.contains_key(name)
    }

    /// Resolve `names`, compose them in order and run the chain against
    /// `ctx`. An empty or fully-unresolvable chain is a no-op.
    pub async fn run_chain(&self, ctx: &ChainContext, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let mut resolved: Vec<Arc<dyn Middleware>> = Vec::with_capacity(names.len());
        for name in names {
            match self.middleware.get(name) {
                Some(entry) => resolved.push(Arc::clone(entry.value())),
                None if self.strict => {
                    return Err(Error::MiddlewareNotFound(name.clone()));
                }
                None => {
                    warn!(middleware = %name, command = %ctx.command.name, "middleware not registered, skipping");
                }
            }
        }

        run(ctx, resolved).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Recorder {
        tag: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn execute(&self, _ctx: &ChainContext) -> Result<()> {
            self.order.lock().unwrap().push(self.tag);
            Ok(())
        }

        async fn chain(
            &self,
            _ctx: &ChainContext,
            next: Arc<dyn Middleware>,
        ) -> Result<Arc<dyn Middleware>> {
            Ok(Arc::new(Composed {
                first: Arc::new(Recorder {
                    tag: self.tag,
                    order: Arc::clone(&self.order),
                }),
                second: next,
            }))
        }
    }

    struct Failing;

    #[async_trait]
    impl Middleware for Failing {
        async fn execute(&self, ctx: &ChainContext) -> Result<()> {
            Err(Error::MiddlewareAborted(format!(
                "denied {}",
                ctx.command.name
            )))
        }

        async fn chain(
            &self,
            _ctx: &ChainContext,
            next: Arc<dyn Middleware>,
        ) -> Result<Arc<dyn Middleware>> {
            Ok(Arc::new(Composed {
                first: Arc::new(Failing),
                second: next,
            }))
        }
    }

    fn ctx() -> ChainContext {
        ChainContext::new(Command::new("/ping", "chat1", "msg1"))
    }

    #[tokio::test]
    async fn test_chain_runs_in_declared_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = MiddlewareRegistry::new();
        registry.register(
            "a",
            Arc::new(Recorder {
                tag: "a",
                order: Arc::clone(&order),
            }),
        );
        registry.register(
            "b",
            Arc::new(Recorder {
                tag: "b",
                order: Arc::clone(&order),
            }),
        );

        registry
            .run_chain(&ctx(), &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_noop() {
        let registry = MiddlewareRegistry::new();
        registry.run_chain(&ctx(), &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_lenient_mode_skips_unknown_names() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = MiddlewareRegistry::new();
        registry.register(
            "a",
            Arc::new(Recorder {
                tag: "a",
                order: Arc::clone(&order),
            }),
        );

        registry
            .run_chain(&ctx(), &["missing".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_strict_mode_errors_on_unknown_names() {
        let registry = MiddlewareRegistry::strict();
        let err = registry
            .run_chain(&ctx(), &["missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MiddlewareNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_failure_aborts_the_chain() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = MiddlewareRegistry::new();
        registry.register("deny", Arc::new(Failing));
        registry.register(
            "after",
            Arc::new(Recorder {
                tag: "after",
                order: Arc::clone(&order),
            }),
        );

        let err = registry
            .run_chain(&ctx(), &["deny".to_string(), "after".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MiddlewareAborted(_)));
        assert!(order.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chain_error_aborts_before_execute() {
        struct RefusesToChain;

        #[async_trait]
        impl Middleware for RefusesToChain {
            async fn execute(&self, _ctx: &ChainContext) -> Result<()> {
                Ok(())
            }

            async fn chain(
                &self,
                _ctx: &ChainContext,
                _next: Arc<dyn Middleware>,
            ) -> Result<Arc<dyn Middleware>> {
                Err(Error::MiddlewareAborted("refused to compose".into()))
            }
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = MiddlewareRegistry::new();
        registry.register("first", Arc::new(RefusesToChain));
        registry.register(
            "second",
            Arc::new(Recorder {
                tag: "second",
                order: Arc::clone(&order),
            }),
        );

        let err = registry
            .run_chain(&ctx(), &["first".to_string(), "second".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MiddlewareAborted(_)));
        assert!(order.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counting_middleware_runs_once_per_chain() {
        struct Counting(Arc<AtomicUsize>);

        #[async_trait]
        impl Middleware for Counting {
            async fn execute(&self, _ctx: &ChainContext) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            async fn chain(
                &self,
                _ctx: &ChainContext,
                next: Arc<dyn Middleware>,
            ) -> Result<Arc<dyn Middleware>> {
                Ok(Arc::new(Composed {
                    first: Arc::new(Counting(Arc::clone(&self.0))),
                    second: next,
                }))
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let registry = MiddlewareRegistry::new();
        registry.register("count", Arc::new(Counting(Arc::clone(&count))));

        registry
            .run_chain(&ctx(), &["count".to_string()])
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
