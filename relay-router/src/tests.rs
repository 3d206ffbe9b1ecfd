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

use http::header::{HeaderValue, CONTENT_LENGTH};
use http::{Extensions, Method, StatusCode};
use std::sync::Mutex;
use test_log::test;

use crate::configuration::{Backend, RouterConf};
use crate::context::Context;
use crate::error::Error;
use crate::handler::{derive_fn, handler_fn, HandlerFn};
use crate::message::{ExecutionContext, Request, Response};
use crate::router::{Router, RouterBuilder};

#[derive(Debug, Default)]
struct Env {
    log: Mutex<Vec<String>>,
}

impl Env {
    fn record(&self, entry: impl Into<String>) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry.into());
        }
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

/// Closure handler usable both as hook and as route action
type TestHandler = HandlerFn<Env, Box<HandlerClosure>>;
type HandlerClosure =
    dyn Fn(&mut Context<'_, Env>) -> Result<Option<Response>, Error> + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target(String);

fn tracer(label: &'static str) -> TestHandler {
    let f: Box<HandlerClosure> = Box::new(move |ctx: &mut Context<'_, Env>| {
        ctx.env().record(label);
        Ok(None)
    });
    handler_fn(f)
}

fn failing(label: &'static str) -> TestHandler {
    let f: Box<HandlerClosure> = Box::new(move |ctx: &mut Context<'_, Env>| {
        ctx.env().record(label);
        Err(Error::handler(format!("{label} failed")))
    });
    handler_fn(f)
}

fn echo() -> TestHandler {
    let f: Box<HandlerClosure> = Box::new(|ctx: &mut Context<'_, Env>| {
        ctx.env().record("handler");
        let params = ctx
            .params()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>();
        Ok(Some(Response::text(params.join(","))))
    });
    handler_fn(f)
}

fn body(response: &Response) -> &str {
    std::str::from_utf8(&response.body).unwrap_or_default()
}

async fn fetch(
    router: &Router<Env>,
    env: &Env,
    method: Method,
    url: &str,
) -> Result<Response, Error> {
    router
        .fetch(Request::new(method, url), env, &ExecutionContext::new())
        .await
}

fn params(router: &Router<Env>, method: Method, url: &str) -> Option<Vec<(String, String)>> {
    let found = router.find(&method, url)?;
    Some(
        found
            .params
            .iter()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect(),
    )
}

fn pairs(pairs: &[(&str, &str)]) -> Option<Vec<(String, String)>> {
    Some(
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect(),
    )
}

fn with_backend(backend: Backend) -> RouterBuilder<Env> {
    let mut builder = Router::builder();
    builder.configure(RouterConf {
        backend,
        ..Default::default()
    });
    builder
}

#[test]
fn literal_priority() -> Result<(), Error> {
    for backend in [Backend::Interpreted, Backend::Compiled] {
        let mut builder = with_backend(backend);
        builder.get("/a/:x", Response::text("param"))?;
        builder.get("/a/b", Response::text("literal"))?;
        let router = builder.build()?;

        let found = router.find(&Method::GET, "/a/b");
        assert!(matches!(
            found.map(|found| format!("{:?}", found.action)),
            Some(action) if action.contains("literal")
        ));
        assert_eq!(params(&router, Method::GET, "/a/c"), pairs(&[("x", "c")]));
    }
    Ok(())
}

#[test(tokio::test)]
async fn parameter_extraction() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder.get("/users/:id", echo())?;
    let router = builder.build()?;

    let env = Env::default();
    let response = fetch(&router, &env, Method::GET, "/users/42").await?;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(body(&response), "id=42");
    assert_eq!(env.entries(), vec!["handler"]);

    let response = fetch(&router, &env, Method::GET, "/users/42/43").await?;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[test]
fn wildcard_capture() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder.get("/files/*", echo())?;
    let router = builder.build()?;

    assert_eq!(
        params(&router, Method::GET, "/files/a/b/c?x=1"),
        pairs(&[("*", "a/b/c")])
    );
    assert_eq!(
        params(&router, Method::GET, "https://example.com/files/a#top"),
        pairs(&[("*", "a")])
    );
    assert_eq!(params(&router, Method::GET, "/file"), None);
    Ok(())
}

#[test(tokio::test)]
async fn head_fallback() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder.get("/ping", Response::text("pong"))?;
    builder.all("/ping", Response::text("any"))?;
    builder.all("/other", Response::text("any"))?;
    let router = builder.build()?;

    let env = Env::default();
    let response = fetch(&router, &env, Method::HEAD, "/ping").await?;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[CONTENT_LENGTH], "4");
    assert!(response.body.is_empty());

    let response = fetch(&router, &env, Method::GET, "/ping").await?;
    assert_eq!(body(&response), "pong");

    let response = fetch(&router, &env, Method::DELETE, "/ping").await?;
    assert_eq!(body(&response), "any");

    let response = fetch(&router, &env, Method::HEAD, "/other").await?;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    Ok(())
}

#[test]
fn method_specific_routes() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder.get("/items/:id", echo())?;
    builder.post("/items/:name", echo())?;
    let router = builder.build()?;

    assert_eq!(
        params(&router, Method::GET, "/items/1"),
        pairs(&[("id", "1")])
    );
    assert_eq!(
        params(&router, Method::POST, "/items/1"),
        pairs(&[("name", "1")])
    );
    assert_eq!(params(&router, Method::PUT, "/items/1"), None);
    Ok(())
}

#[test]
fn registration_errors() -> Result<(), Error> {
    let mut builder = Router::<Env>::builder();
    builder.get("/x", Response::text("x"))?;
    assert!(matches!(
        builder.get("/x", Response::text("again")),
        Err(Error::DuplicateRoute { method, pattern }) if method == "GET" && pattern == "/x"
    ));
    assert!(matches!(
        builder.on("get", "x", Response::text("again")),
        Err(Error::DuplicateRoute { .. })
    ));
    builder.all("/x", Response::text("x"))?;
    assert!(matches!(
        builder.all("/x", Response::text("x")),
        Err(Error::DuplicateRoute { .. })
    ));
    assert!(matches!(
        builder.on("G E T", "/y", Response::text("y")),
        Err(Error::InvalidMethod(_))
    ));
    assert!(matches!(
        builder.get("/search?q", Response::text("y")),
        Err(Error::IllegalCharacter { offset: 7, .. })
    ));
    Ok(())
}

#[test]
fn mount_prefixing() -> Result<(), Error> {
    let mut users = Router::builder();
    users.get(":id/info", echo())?;
    users.get(":id/posts/:post", echo())?;

    let mut builder = Router::builder();
    builder.get("/", echo())?;
    builder.mount("/users/", users)?;
    let router = builder.build()?;

    assert_eq!(
        params(&router, Method::GET, "/users/42/info"),
        pairs(&[("id", "42")])
    );
    assert_eq!(
        params(&router, Method::GET, "/users/42/posts/7"),
        pairs(&[("id", "42"), ("post", "7")])
    );

    let patterns = router
        .routes()
        .into_iter()
        .map(|route| route.pattern)
        .collect::<Vec<_>>();
    assert_eq!(
        patterns,
        vec!["/", "/users/:id/info", "/users/:id/posts/:post"]
    );
    Ok(())
}

#[test]
fn mount_errors() -> Result<(), Error> {
    let mut builder = Router::<Env>::builder();
    builder.get("/users/list", Response::text("list"))?;

    assert!(matches!(
        builder.mount("/", Router::builder()),
        Err(Error::MountRoot)
    ));
    assert!(matches!(
        builder.mount("/groups/:id", Router::builder()),
        Err(Error::MountParameter(_))
    ));
    assert!(matches!(
        builder.mount("/users", Router::builder()),
        Err(Error::MountOccupied(_))
    ));

    let mut other = Router::builder();
    other.get("/a", Response::text("a"))?;
    builder.mount("/groups", other)?;
    let router = builder.build()?;
    assert!(router.find(&Method::GET, "/groups/a").is_some());
    Ok(())
}

#[test(tokio::test)]
async fn mount_merges_state() -> Result<(), Error> {
    let mut other = Router::builder();
    other.state("name", "other");
    other.state("limit", 10u32);
    other.decorate("version", 2u32);
    other.on_request(tracer("discarded"));
    other.get(
        "/info",
        handler_fn(|ctx: &mut Context<'_, Env>| {
            let name = ctx.store::<&str>("name").copied().unwrap_or_default();
            let limit = ctx.store::<u32>("limit").copied().unwrap_or_default();
            let version = ctx.decoration::<u32>("version").copied().unwrap_or_default();
            Ok(Some(Response::text(format!("{name} {limit} {version}"))))
        }),
    )?;

    let mut builder = Router::builder();
    builder.state("name", "main");
    builder.mount("/sub", other)?;
    let router = builder.build()?;

    let env = Env::default();
    let response = fetch(&router, &env, Method::GET, "/sub/info").await?;
    assert_eq!(body(&response), "main 10 2");
    assert!(env.entries().is_empty());
    Ok(())
}

#[test]
fn cleaning() -> Result<(), Error> {
    let mut builder = Router::<Env>::builder();
    builder.get("/live", Response::text("live"))?;
    builder.mount("/dead/end", Router::builder())?;
    let mut hooks_only = Router::builder();
    hooks_only.on_request(tracer("discarded"));
    builder.mount("/dead/hooks", hooks_only)?;
    let router = builder.build()?;

    let routes = router.routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].pattern, "/live");
    assert!(!format!("{router:?}").contains("dead"));
    assert!(router.find(&Method::GET, "/dead/x").is_none());
    Ok(())
}

#[test(tokio::test)]
async fn not_found_fallback() -> Result<(), Error> {
    let env = Env::default();

    let router = Router::<Env>::builder().build()?;
    let response = fetch(&router, &env, Method::GET, "/missing").await?;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(body(&response).contains("404 Not Found"));

    let mut builder = Router::builder();
    builder.get("/present", Response::text("present"))?;
    builder.not_found(handler_fn(|ctx: &mut Context<'_, Env>| {
        ctx.env().record(format!("{:?} {:?}", ctx.phase(), ctx.set.status));
        Ok(Some(ctx.reply("custom")))
    }));
    let router = builder.build()?;
    let response = fetch(&router, &env, Method::GET, "/missing").await?;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(body(&response), "custom");
    assert_eq!(env.entries(), vec!["NotFound Some(404)"]);

    let mut builder = Router::builder();
    builder.not_found(handler_fn(|ctx: &mut Context<'_, Env>| {
        ctx.set.status = Some(StatusCode::GONE);
        Ok(None)
    }));
    builder.not_found(Response::text("static"));
    let router = builder.build()?;
    let response = fetch(&router, &env, Method::GET, "/missing").await?;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(body(&response), "static");

    let mut builder = Router::builder();
    builder.not_found(handler_fn(|ctx: &mut Context<'_, Env>| {
        ctx.set.status = Some(StatusCode::GONE);
        Ok(None)
    }));
    let router = builder.build()?;
    let response = fetch(&router, &env, Method::GET, "/missing").await?;
    assert_eq!(response.status, StatusCode::GONE);
    assert!(body(&response).contains("410 Gone"));
    Ok(())
}

#[test(tokio::test)]
async fn hook_order() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder
        .on_request(tracer("request a"))
        .on_request(tracer("request b"))
        .derive(derive_fn(|ctx: &Context<'_, Env>| {
            ctx.env().record("derive");
            Ok(Extensions::new())
        }))
        .on_response(tracer("response a"))
        .on_response(tracer("response b"));
    builder.get("/x/:y", echo())?;
    let router = builder.build()?;

    let env = Env::default();
    let response = fetch(&router, &env, Method::GET, "/x/1").await?;
    assert_eq!(body(&response), "y=1");
    assert_eq!(
        env.entries(),
        vec![
            "request a",
            "request b",
            "derive",
            "handler",
            "response a",
            "response b"
        ]
    );
    Ok(())
}

#[test(tokio::test)]
async fn on_request_short_circuit() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder
        .on_request(handler_fn(|ctx: &mut Context<'_, Env>| {
            ctx.env().record("request");
            ctx.set
                .headers
                .insert("x-early", HeaderValue::from_static("1"));
            Ok(Some(Response::text("early")))
        }))
        .on_request(tracer("skipped"))
        .derive(derive_fn(|ctx: &Context<'_, Env>| {
            ctx.env().record("skipped");
            Ok(Extensions::new())
        }))
        .on_response(tracer("response"));
    builder.get("/", echo())?;
    let router = builder.build()?;

    let env = Env::default();
    let response = fetch(&router, &env, Method::GET, "/").await?;
    assert_eq!(body(&response), "early");
    assert_eq!(response.headers["x-early"], "1");
    assert_eq!(env.entries(), vec!["request", "response"]);
    Ok(())
}

#[test(tokio::test)]
async fn pre_hook_failure_aborts() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder
        .on_request(failing("request"))
        .on_response(tracer("response"));
    builder.get("/", echo())?;
    let router = builder.build()?;

    let env = Env::default();
    let result = fetch(&router, &env, Method::GET, "/").await;
    assert!(matches!(result, Err(Error::Handler(_))));
    assert_eq!(env.entries(), vec!["request"]);

    let mut builder = Router::builder();
    builder
        .derive(derive_fn(|_: &Context<'_, Env>| {
            Err(Error::handler("derive failed"))
        }))
        .on_response(tracer("response"));
    builder.get("/", echo())?;
    let router = builder.build()?;

    let env = Env::default();
    let result = fetch(&router, &env, Method::GET, "/").await;
    assert!(matches!(result, Err(Error::Handler(_))));
    assert!(env.entries().is_empty());
    Ok(())
}

#[test(tokio::test)]
async fn handler_failure_runs_response_hooks() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder.on_response(handler_fn(|ctx: &mut Context<'_, Env>| {
        ctx.env()
            .record(format!("response present: {}", ctx.response().is_some()));
        Ok(None)
    }));
    builder.get("/", failing("handler"))?;
    let router = builder.build()?;

    let env = Env::default();
    let result = fetch(&router, &env, Method::GET, "/").await;
    assert!(matches!(result, Err(Error::Handler(err)) if err.to_string() == "handler failed"));
    assert_eq!(env.entries(), vec!["handler", "response present: false"]);
    Ok(())
}

#[test(tokio::test)]
async fn response_hook_failure_discards_response() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder
        .on_response(failing("response a"))
        .on_response(tracer("response b"));
    builder.get("/", echo())?;
    let router = builder.build()?;

    let env = Env::default();
    let result = fetch(&router, &env, Method::GET, "/").await;
    assert!(matches!(result, Err(Error::Handler(_))));
    assert_eq!(env.entries(), vec!["handler", "response a"]);
    Ok(())
}

#[test(tokio::test)]
async fn response_state_reset_between_hooks() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder
        .on_response(handler_fn(|ctx: &mut Context<'_, Env>| {
            ctx.set.status = Some(StatusCode::ACCEPTED);
            ctx.set
                .headers
                .insert("x-first", HeaderValue::from_static("1"));
            Ok(None)
        }))
        .on_response(handler_fn(|ctx: &mut Context<'_, Env>| {
            ctx.env().record(format!(
                "{:?} {} {:?}",
                ctx.phase(),
                ctx.set.headers.is_empty() && ctx.set.status.is_none(),
                ctx.response().map(|response| response.status)
            ));
            let mut response = ctx.response().cloned().unwrap_or_else(|| ctx.reply(""));
            response
                .headers
                .insert("x-second", HeaderValue::from_static("2"));
            Ok(Some(response))
        }));
    builder.get("/", echo())?;
    let router = builder.build()?;

    let env = Env::default();
    let response = fetch(&router, &env, Method::GET, "/").await?;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.headers["x-first"], "1");
    assert_eq!(response.headers["x-second"], "2");
    assert_eq!(
        env.entries(),
        vec!["handler", "PostHooks true Some(202)"]
    );
    Ok(())
}

#[test(tokio::test)]
async fn derived_values() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder.derive(derive_fn(|ctx: &Context<'_, Env>| {
        let mut extensions = Extensions::new();
        extensions.insert(Target(ctx.route().to_owned()));
        Ok(extensions)
    }));
    builder.get(
        "/:protocol//:host/*",
        handler_fn(|ctx: &mut Context<'_, Env>| {
            let target = ctx.derived::<Target>().cloned();
            Ok(Some(Response::text(format!(
                "{:?} {:?} {}",
                target,
                ctx.param("host"),
                ctx.query()
            ))))
        }),
    )?;
    let router = builder.build()?;

    let env = Env::default();
    let response = fetch(
        &router,
        &env,
        Method::GET,
        "https://relay.example/https://example.com/a.png?size=2",
    )
    .await?;
    assert_eq!(
        body(&response),
        "Some(Target(\"https://example.com/a.png\")) Some(\"example.com\") ?size=2"
    );
    Ok(())
}

#[test(tokio::test)]
async fn cancellation() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder
        .on_request(handler_fn(|ctx: &mut Context<'_, Env>| {
            ctx.env().record("request");
            ctx.execution().cancel();
            Ok(None)
        }))
        .on_response(tracer("response"));
    builder.get("/", echo())?;
    let router = builder.build()?;

    let env = Env::default();
    let result = fetch(&router, &env, Method::GET, "/").await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(env.entries(), vec!["request"]);

    let execution = ExecutionContext::new();
    execution.cancel();
    let result = router.fetch(Request::get("/"), &env, &execution).await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(env.entries(), vec!["request"]);
    Ok(())
}

#[test(tokio::test)]
async fn handler_without_response() -> Result<(), Error> {
    let mut builder = Router::builder();
    builder.post(
        "/items",
        handler_fn(|ctx: &mut Context<'_, Env>| {
            ctx.set.status = Some(StatusCode::CREATED);
            ctx.set
                .headers
                .insert("location", HeaderValue::from_static("/items/1"));
            Ok(None)
        }),
    )?;
    let router = builder.build()?;

    let env = Env::default();
    let response = fetch(&router, &env, Method::POST, "/items").await?;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.headers["location"], "/items/1");
    assert!(response.body.is_empty());
    Ok(())
}

#[test]
fn route_round_trip() -> Result<(), Error> {
    let mut builder = Router::<Env>::builder();
    for (method, pattern) in [
        ("GET", "/"),
        ("GET", "/a\\:b"),
        ("GET", "/a\\*"),
        ("GET", "/:name.json"),
        ("POST", "/:name.json"),
        ("ALL", "/:first-:second"),
        ("GET", "/:id\\x"),
        ("GET", "/files/*"),
        ("GET", "/users/:id/posts/:post"),
    ] {
        builder.on(method, pattern, Response::text(format!("{method} {pattern}")))?;
    }
    let router = builder.build()?;

    let mut copy = Router::<Env>::builder();
    for route in router.routes() {
        copy.on(&route.method, &route.pattern, route.action)?;
    }
    let copy = copy.build()?;

    let describe = |router: &Router<Env>, method: &Method, url: &str| {
        router.find(method, url).map(|found| {
            (
                format!("{:?}", found.action),
                found
                    .params
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>(),
            )
        })
    };
    for url in [
        "/",
        "/a:b",
        "/a*",
        "/ab",
        "/data.json",
        "/x-y",
        "/x-y-z",
        "/1x",
        "/files/a/b",
        "/users/1/posts/2",
        "/users/1/posts/",
        "/missing/",
    ] {
        for method in [Method::GET, Method::POST, Method::HEAD] {
            assert_eq!(
                describe(&router, &method, url),
                describe(&copy, &method, url),
                "{method} {url}"
            );
        }
    }
    assert_eq!(
        describe(&router, &Method::GET, "/1x"),
        Some((
            format!("{:?}", crate::handler::Action::<Env>::from(Response::text("GET /:id\\x"))),
            vec!["id=1".to_owned()]
        ))
    );

    let patterns = |router: &Router<Env>| {
        let mut patterns = router
            .routes()
            .into_iter()
            .map(|route| format!("{} {}", route.method, route.pattern))
            .collect::<Vec<_>>();
        patterns.sort();
        patterns
    };
    assert_eq!(patterns(&router), patterns(&copy));
    assert_eq!(patterns(&router).len(), 9);
    Ok(())
}

fn referer_table(backend: Backend) -> Result<Router<Env>, Error> {
    let mut builder = with_backend(backend);
    for (pattern, referer) in [
        ("/:protocol//img.hellogithub.com/*", "https://hellogithub.com/"),
        ("/:protocol//:host.sinaimg.cn/*", "https://weibo.com/"),
        ("/:protocol//img-blog.csdnimg.cn/*", "https://blog.csdn.net/"),
        ("/:protocol//developer.qcloudimg.com/*", "https://cloud.tencent.com/"),
    ] {
        builder.get(
            pattern,
            handler_fn(move |ctx: &mut Context<'_, Env>| {
                Ok(Some(Response::text(format!(
                    "{referer} {}",
                    ctx.param("host").unwrap_or("-")
                ))))
            }),
        )?;
    }
    builder.get(
        "/:protocol//:host/*",
        handler_fn(|ctx: &mut Context<'_, Env>| {
            Ok(Some(Response::text(format!(
                "back {}",
                ctx.param("host").unwrap_or("-")
            ))))
        }),
    )?;
    builder.build()
}

#[test(tokio::test)]
async fn referer_table_backends() -> Result<(), Error> {
    let env = Env::default();
    for backend in [Backend::Interpreted, Backend::Compiled] {
        let router = referer_table(backend)?;
        for (url, expected) in [
            (
                "https://relay.example/https://img.hellogithub.com/a.png",
                "https://hellogithub.com/ -",
            ),
            (
                "https://relay.example/https://wx1.sinaimg.cn/large/x.jpg",
                "https://weibo.com/ wx1",
            ),
            (
                "https://relay.example/http://img-blog.csdnimg.cn/img/1.png?x",
                "https://blog.csdn.net/ -",
            ),
            (
                "/https://developer.qcloudimg.com/a",
                "https://cloud.tencent.com/ -",
            ),
            ("/https://example.com/index.html", "back example.com"),
            ("/https://img.hellogithub.com.evil/x", "back img.hellogithub.com.evil"),
            ("/https://sinaimg.cn/x", "back sinaimg.cn"),
        ] {
            let response = fetch(&router, &env, Method::GET, url).await?;
            assert_eq!(body(&response), expected, "{backend:?} {url}");
        }

        let response = fetch(&router, &env, Method::GET, "/https://example.com").await?;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
    Ok(())
}

#[test]
fn slashes_in_params() -> Result<(), Error> {
    for (slashes, expected) in [(false, None), (true, pairs(&[("path", "a/b")]))] {
        for backend in [Backend::Interpreted, Backend::Compiled] {
            let mut builder = Router::builder();
            builder.configure(RouterConf {
                backend,
                slashes_in_params: slashes,
                verify: true,
            });
            builder.get("/:path.json", echo())?;
            let router = builder.build()?;
            assert_eq!(params(&router, Method::GET, "/a/b.json"), expected);
        }
    }
    Ok(())
}

#[test]
fn configured_routes() -> Result<(), Error> {
    use crate::configuration::{FromYaml, RoutesConf};

    let conf = RoutesConf::from_yaml(
        r#"
            backend: compiled
            routes:
            - pattern: /:protocol//img.hellogithub.com/*
              headers:
                Referer: https://hellogithub.com/
            - method: all
              pattern: /:protocol//:host/*
              status: 302
            not_found:
              status: 404
              body: Nothing here
        "#,
    )?;
    let router = RouterBuilder::<Env>::try_from(conf)?.build()?;
    assert_eq!(router.conf().backend, Backend::Compiled);

    let routes = router
        .routes()
        .into_iter()
        .map(|route| format!("{} {}", route.method, route.pattern))
        .collect::<Vec<_>>();
    assert_eq!(
        routes,
        vec![
            "GET /:protocol//img.hellogithub.com/*",
            "ALL /:protocol//:host/*"
        ]
    );
    assert!(matches!(
        router
            .find(&Method::POST, "/https://img.hellogithub.com/x")
            .map(|found| format!("{:?}", found.action)),
        Some(action) if action.contains("302")
    ));
    Ok(())
}
