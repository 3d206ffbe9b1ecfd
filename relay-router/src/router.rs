// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Router facade: route registration, lifecycle hooks and request processing
//!
//! ```rust
//! use http::Method;
//! use relay_router::{handler_fn, Context, Response, Router};
//!
//! let mut builder = Router::<()>::builder();
//! builder
//!     .get("/users/:id", handler_fn(|ctx: &mut Context<'_, ()>| {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         Ok(Some(Response::text(format!("user {id}"))))
//!     }))
//!     .unwrap();
//! let router = builder.build().unwrap();
//!
//! let found = router.find(&Method::GET, "/users/42").unwrap();
//! assert_eq!(found.params.get("id"), Some("42"));
//! assert!(router.find(&Method::GET, "/users/").is_none());
//! ```

use bytes::Bytes;
use http::{Method, StatusCode};
use log::{debug, info, trace, warn};
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use crate::compiler::Program;
use crate::configuration::{Backend, RouterConf};
use crate::context::{self, Context, Params, Phase, ResponseState, Shared};
use crate::error::Error;
use crate::handler::{Action, Derive, Handler};
use crate::interpreter::{Interpreter, Match};
use crate::message::{ExecutionContext, Request, Response};
use crate::pattern::{self, Pattern, Token};
use crate::standard_response::error_response;
use crate::trie::{Trie, TrieBuilder};

/// Method name registering a route for any method
pub const ALL: &str = "ALL";

/// A registered route: what to do and the names of the captured parameters
struct Route<E> {
    action: Action<E>,
    names: Vec<String>,
}

/// Routes registered for one pattern
struct Endpoint<E> {
    methods: Vec<(Method, Route<E>)>,
    all: Option<Route<E>>,
}

impl<E> Default for Endpoint<E> {
    fn default() -> Self {
        Self {
            methods: Vec::new(),
            all: None,
        }
    }
}

impl<E> Endpoint<E> {
    /// Adds a route, `None` meaning any method. Returns `false` if the method is taken.
    fn add(&mut self, method: Option<Method>, route: Route<E>) -> bool {
        match method {
            Some(method) => {
                if self.methods.iter().any(|(m, _)| *m == method) {
                    return false;
                }
                self.methods.push((method, route));
            }
            None => {
                if self.all.is_some() {
                    return false;
                }
                self.all = Some(route);
            }
        }
        true
    }

    /// Selects the route for a method: exact match, `GET` for `HEAD` requests, then `ALL`.
    fn resolve(&self, method: &Method) -> Option<&Route<E>> {
        let find = |method: &Method| {
            self.methods
                .iter()
                .find(|(m, _)| m == method)
                .map(|(_, route)| route)
        };
        find(method)
            .or_else(|| {
                if *method == Method::HEAD {
                    find(&Method::GET)
                } else {
                    None
                }
            })
            .or(self.all.as_ref())
    }

    fn routes(&self) -> impl Iterator<Item = (&str, &Route<E>)> {
        self.methods
            .iter()
            .map(|(method, route)| (method.as_str(), route))
            .chain(self.all.iter().map(|route| (ALL, route)))
    }
}

impl<E> Debug for Endpoint<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.routes()
                    .map(|(method, route)| (method, (&route.action, &route.names))),
            )
            .finish()
    }
}

/// Lifecycle hooks registered on the router root
struct Hooks<E> {
    on_request: Vec<Arc<dyn Handler<E>>>,
    derive: Vec<Arc<dyn Derive<E>>>,
    not_found: Vec<Action<E>>,
    on_response: Vec<Arc<dyn Handler<E>>>,
}

impl<E> Default for Hooks<E> {
    fn default() -> Self {
        Self {
            on_request: Vec::new(),
            derive: Vec::new(),
            not_found: Vec::new(),
            on_response: Vec::new(),
        }
    }
}

impl<E> Hooks<E> {
    fn is_empty(&self) -> bool {
        self.on_request.is_empty()
            && self.derive.is_empty()
            && self.not_found.is_empty()
            && self.on_response.is_empty()
    }
}

impl<E> Debug for Hooks<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_request", &self.on_request.len())
            .field("derive", &self.derive.len())
            .field("not_found", &self.not_found)
            .field("on_response", &self.on_response.len())
            .finish()
    }
}

/// Parses a method name, `ALL` is represented as `None`.
fn parse_method(method: &str) -> Result<Option<Method>, Error> {
    let method = method.to_ascii_uppercase();
    if method == ALL {
        Ok(None)
    } else {
        Method::from_bytes(method.as_bytes())
            .map(Some)
            .map_err(|_| Error::InvalidMethod(method))
    }
}

/// Restores parameter names in the tokens produced by [`Trie::entries`].
fn named(mut tokens: Vec<Token>, names: &[String]) -> Vec<Token> {
    let mut names = names.iter();
    for token in &mut tokens {
        match token {
            Token::Byte(_) => {}
            Token::Param(name) => {
                if let Some(next) = names.next() {
                    name.clone_from(next);
                }
            }
            Token::Wildcard => {
                names.next();
            }
        }
    }
    tokens
}

/// The router builder used to set up a [`Router`] instance
pub struct RouterBuilder<E> {
    trie: TrieBuilder<Endpoint<E>>,
    hooks: Hooks<E>,
    shared: Shared,
    conf: RouterConf,
}

impl<E> Debug for RouterBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("trie", &self.trie)
            .field("hooks", &self.hooks)
            .field("shared", &self.shared)
            .field("conf", &self.conf)
            .finish()
    }
}

impl<E: Sync + 'static> Default for RouterBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Sync + 'static> RouterBuilder<E> {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            trie: Trie::builder(),
            hooks: Hooks::default(),
            shared: Shared::default(),
            conf: RouterConf::default(),
        }
    }

    /// Replaces the router settings.
    pub fn configure(&mut self, conf: RouterConf) -> &mut Self {
        self.conf = conf;
        self
    }

    /// Registers a route. `method` is case-insensitive, `ALL` matches any method without a route
    /// of its own.
    pub fn on(
        &mut self,
        method: &str,
        pattern: &str,
        action: impl Into<Action<E>>,
    ) -> Result<&mut Self, Error> {
        let parsed = Pattern::parse(pattern)?;
        let names = parsed.names();
        let method_name = method.to_ascii_uppercase();
        let method = parse_method(method)?;

        let endpoint = self
            .trie
            .insert(&parsed)?
            .get_or_insert_with(Endpoint::default);
        let route = Route {
            action: action.into(),
            names,
        };
        if !endpoint.add(method, route) {
            return Err(Error::DuplicateRoute {
                method: method_name,
                pattern: pattern.to_owned(),
            });
        }

        debug!("Added route {method_name} {pattern}");
        Ok(self)
    }

    /// Registers a `GET` route, also used for `HEAD` requests.
    pub fn get(&mut self, pattern: &str, action: impl Into<Action<E>>) -> Result<&mut Self, Error> {
        self.on(Method::GET.as_str(), pattern, action)
    }

    /// Registers a `POST` route.
    pub fn post(
        &mut self,
        pattern: &str,
        action: impl Into<Action<E>>,
    ) -> Result<&mut Self, Error> {
        self.on(Method::POST.as_str(), pattern, action)
    }

    /// Registers a route for any method.
    pub fn all(&mut self, pattern: &str, action: impl Into<Action<E>>) -> Result<&mut Self, Error> {
        self.on(ALL, pattern, action)
    }

    /// Grafts the routes of another router below `prefix`.
    ///
    /// The prefix must not contain parameters and must not have any routes yet. Lifecycle hooks
    /// of the other router are discarded, its state and decorations are added unless the keys
    /// are already taken.
    pub fn mount(&mut self, prefix: &str, router: RouterBuilder<E>) -> Result<&mut Self, Error> {
        let RouterBuilder {
            trie, hooks, shared, ..
        } = router;
        self.trie.mount(prefix, trie)?;
        if !hooks.is_empty() {
            warn!("Discarding lifecycle hooks of the router mounted at {prefix}: {hooks:?}");
        }
        self.shared.merge(shared);

        debug!("Mounted router at {prefix}");
        Ok(self)
    }

    /// Adds a hook running before matching. A hook producing a response skips everything up to
    /// the `onResponse` hooks.
    pub fn on_request(&mut self, hook: impl Handler<E> + 'static) -> &mut Self {
        self.hooks.on_request.push(Arc::new(hook));
        self
    }

    /// Adds a hook contributing request-scoped values to the context.
    pub fn derive(&mut self, hook: impl Derive<E> + 'static) -> &mut Self {
        self.hooks.derive.push(Arc::new(hook));
        self
    }

    /// Adds a fallback for requests not matching any route.
    pub fn not_found(&mut self, action: impl Into<Action<E>>) -> &mut Self {
        self.hooks.not_found.push(action.into());
        self
    }

    /// Adds a hook running after the response has been produced, even if the handler failed.
    pub fn on_response(&mut self, hook: impl Handler<E> + 'static) -> &mut Self {
        self.hooks.on_response.push(Arc::new(hook));
        self
    }

    /// Stores a value available to all requests via [`Context::store`].
    pub fn state<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> &mut Self {
        self.shared.store.insert(key.into(), Arc::new(value));
        self
    }

    /// Stores a value available to all requests via [`Context::decoration`].
    pub fn decorate<T: Any + Send + Sync>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> &mut Self {
        self.shared.decorations.insert(key.into(), Arc::new(value));
        self
    }

    /// Builds the routing trie and, for the compiled backend, the matching program.
    pub fn build(self) -> Result<Router<E>, Error> {
        let trie = self.trie.build();
        let program = match self.conf.backend {
            Backend::Interpreted => None,
            Backend::Compiled => Some(Program::compile(&trie)),
        };

        let router = Router {
            trie,
            program,
            hooks: self.hooks,
            shared: self.shared,
            conf: self.conf,
        };

        if let Some(program) = &router.program {
            let (instructions, states) = program.size();
            info!(
                "Compiled routing program: {instructions} instructions, {states} automaton states"
            );
            if router.conf.verify {
                router.verify(program)?;
            }
        }
        info!(
            "Built router with {} routes, {} trie nodes",
            router.routes().len(),
            router.trie.len()
        );
        Ok(router)
    }
}

/// Result of [`Router::find`]
pub struct Found<'a, E> {
    /// What the route does
    pub action: &'a Action<E>,
    /// Parameters captured by the route
    pub params: Params,
}

impl<E> Debug for Found<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Found")
            .field("action", self.action)
            .field("params", &self.params)
            .finish()
    }
}

/// A registered route as listed by [`Router::routes`]
pub struct RouteInfo<E> {
    /// Method name, `ALL` for routes matching any method
    pub method: String,
    /// Pattern reconstructed from the routing trie
    pub pattern: String,
    /// What the route does
    pub action: Action<E>,
}

impl<E> Debug for RouteInfo<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteInfo")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("action", &self.action)
            .finish()
    }
}

/// The router implementation.
///
/// A new instance is created by calling [`Router::builder`]. Once built, the router is
/// read-only and can be shared between any number of concurrent requests.
pub struct Router<E> {
    trie: Trie<Endpoint<E>>,
    program: Option<Program>,
    hooks: Hooks<E>,
    shared: Shared,
    conf: RouterConf,
}

impl<E> Debug for Router<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("trie", &self.trie)
            .field("compiled", &self.program.is_some())
            .field("hooks", &self.hooks)
            .field("shared", &self.shared)
            .field("conf", &self.conf)
            .finish()
    }
}

impl<E: Sync + 'static> Router<E> {
    /// Returns a builder instance that can be used to set up a router.
    pub fn builder() -> RouterBuilder<E> {
        RouterBuilder::new()
    }

    /// Router settings
    pub fn conf(&self) -> &RouterConf {
        &self.conf
    }

    fn run(
        &self,
        program: Option<&Program>,
        method: &Method,
        url: &str,
        start: usize,
        end: usize,
    ) -> Option<Match> {
        let path = url.as_bytes();
        let slashes = self.conf.slashes_in_params;
        let accept = |endpoint: &Endpoint<E>| endpoint.resolve(method).is_some();
        match program {
            Some(program) => program.find(path, start, end, slashes, |index| {
                self.trie
                    .value(index)
                    .is_some_and(|endpoint| accept(endpoint))
            }),
            None => Interpreter::find(&self.trie, path, start, end, slashes, accept),
        }
    }

    fn locate(
        &self,
        method: &Method,
        url: &str,
        start: usize,
        end: usize,
    ) -> Option<(&Route<E>, Params)> {
        let found = self.run(self.program.as_ref(), method, url, start, end)?;
        let route = self.trie.value(found.value)?.resolve(method)?;
        Some((route, Params::from_spans(&route.names, url, &found.spans)))
    }

    /// Matches a request without running any hooks.
    pub fn find(&self, method: &Method, url: &str) -> Option<Found<'_, E>> {
        let start = context::route_start(url);
        let end = context::query_start(url, start);
        let (route, params) = self.locate(method, url, start, end)?;
        Some(Found {
            action: &route.action,
            params,
        })
    }

    /// Lists all registered routes.
    pub fn routes(&self) -> Vec<RouteInfo<E>> {
        let mut routes = Vec::new();
        for (tokens, endpoint) in self.trie.entries() {
            for (method, route) in endpoint.routes() {
                routes.push(RouteInfo {
                    method: method.to_owned(),
                    pattern: pattern::format(&named(tokens.clone(), &route.names)),
                    action: route.action.clone(),
                });
            }
        }
        routes
    }

    /// Checks the compiled program against the interpreter on sample URLs derived from every
    /// registered route.
    fn verify(&self, program: &Program) -> Result<(), Error> {
        for (tokens, endpoint) in self.trie.entries() {
            let mut sample = vec![b'/'];
            for token in &tokens {
                match token {
                    Token::Byte(byte) => sample.push(*byte),
                    Token::Param(_) => sample.push(b'p'),
                    Token::Wildcard => sample.extend_from_slice(b"w/x"),
                }
            }
            let sample = String::from_utf8_lossy(&sample).into_owned();

            let mut methods = vec![Method::GET, Method::HEAD];
            methods.extend(endpoint.methods.iter().map(|(method, _)| method.clone()));
            for url in [sample.clone(), format!("{sample}/"), format!("{sample}?q")] {
                let end = context::query_start(&url, 1);
                for method in &methods {
                    let interpreted = self.run(None, method, &url, 1, end);
                    let compiled = self.run(Some(program), method, &url, 1, end);
                    if interpreted != compiled {
                        return Err(Error::Mismatch {
                            method: method.to_string(),
                            url,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Processes a request: `onRequest` hooks, `derive` hooks, matching, route handler or
    /// `notFound` hooks, `onResponse` hooks.
    pub async fn fetch(
        &self,
        request: Request,
        env: &E,
        execution: &ExecutionContext,
    ) -> Result<Response, Error> {
        let head = request.method == Method::HEAD;
        let mut ctx = Context::new(request, env, execution, &self.shared);

        let outcome = match self.prepare(&mut ctx).await? {
            Some(response) => Ok(response),
            None => self.dispatch(&mut ctx).await,
        };
        let mut response = self.finalize(&mut ctx, outcome).await?;
        ctx.enter(Phase::Done)?;

        if head {
            response.body = Bytes::new();
        }
        Ok(response)
    }

    /// Runs `onRequest` and `derive` hooks, errors abort processing immediately.
    async fn prepare(&self, ctx: &mut Context<'_, E>) -> Result<Option<Response>, Error> {
        ctx.enter(Phase::PreHooks)?;
        for hook in &self.hooks.on_request {
            if let Some(response) = hook.handle(ctx).await? {
                trace!("Request {} answered by onRequest hook", ctx.request().url);
                return Ok(Some(ctx.shape(response)));
            }
        }

        ctx.enter(Phase::Derive)?;
        for hook in &self.hooks.derive {
            let extensions = hook.derive(ctx).await?;
            ctx.extend(extensions);
        }
        Ok(None)
    }

    async fn dispatch(&self, ctx: &mut Context<'_, E>) -> Result<Response, Error> {
        ctx.enter(Phase::Matching)?;
        let method = ctx.request().method.clone();
        let found = self.locate(
            &method,
            &ctx.request().url,
            ctx.route_start(),
            ctx.query_start(),
        );

        if let Some((route, params)) = found {
            trace!("Request {} matched with {params:?}", ctx.request().url);
            ctx.set_params(params);
            ctx.enter(Phase::Handler)?;
            return Ok(match route.action.run(ctx).await? {
                Some(response) => ctx.shape(response),
                None => ctx.reply(Bytes::new()),
            });
        }

        trace!("No route matched request {}", ctx.request().url);
        ctx.enter(Phase::NotFound)?;
        ctx.set.status = Some(StatusCode::NOT_FOUND);
        for action in &self.hooks.not_found {
            if let Some(response) = action.run(ctx).await? {
                return Ok(ctx.shape(response));
            }
        }
        Ok(ctx.shape(error_response(
            ctx.set.status.unwrap_or(StatusCode::NOT_FOUND),
        )))
    }

    /// Runs `onResponse` hooks. A failing hook discards the response, a handler failure is
    /// reported once all hooks ran.
    async fn finalize(
        &self,
        ctx: &mut Context<'_, E>,
        outcome: Result<Response, Error>,
    ) -> Result<Response, Error> {
        if matches!(outcome, Err(Error::Cancelled)) {
            return outcome;
        }
        ctx.enter(Phase::PostHooks)?;

        let (response, failure) = match outcome {
            Ok(response) => (Some(response), None),
            Err(err) => (None, Some(err)),
        };
        ctx.set_response(response);

        for hook in &self.hooks.on_response {
            ctx.set = ResponseState::default();
            match hook.handle(ctx).await {
                Ok(Some(response)) => ctx.set_response(Some(response)),
                Ok(None) => ctx.apply_set(),
                Err(err) => {
                    ctx.set_response(None);
                    return Err(err);
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        Ok(ctx
            .take_response()
            .unwrap_or_else(|| ctx.reply(Bytes::new())))
    }
}
