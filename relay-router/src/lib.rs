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

//! # Relay Router
//!
//! This crate implements a path pattern router. Routes are registered as method and pattern
//! combinations, the router finds the route matching a request URL and runs it through a
//! lifecycle of hooks.
//!
//! Patterns are relative to the path start, a leading slash is optional:
//!
//! * `users/:id` captures one path segment as the `id` parameter.
//! * `:name.json` captures a parameter followed by a static suffix. Parameters are matched by
//!   an automaton, so that a suffix shared by several routes is only scanned once.
//! * `files/*` captures the remainder of the path up to the query string, the parameter is named
//!   `*`.
//! * `\` escapes the following character, `?` and `#` are not allowed.
//!
//! If several routes match, static continuations take precedence over parameters and parameters
//! over wildcards. A shorter parameter value is tried before a longer one.
//!
//! Two matching backends are available: the interpreted backend walks the routing trie directly,
//! the compiled backend lowers it into a flat program with jump tables and dense transition
//! tables. Both produce identical results, with the compiled backend being checked against the
//! interpreter when the router is built.
//!
//! A route table can also be loaded from a YAML configuration file:
//!
//! ```yaml
//! backend: compiled
//! routes:
//! - pattern: /:protocol//img.hellogithub.com/*
//!   headers:
//!     Referer: https://hellogithub.com/
//! - method: ALL
//!   pattern: /:protocol//:host/*
//!   status: 302
//! not_found:
//!   status: 404
//!   body: Nothing here
//! ```
//!
//! Request processing runs `onRequest` hooks first, any of them can answer the request right
//! away. `derive` hooks then add request-scoped values to the context. The route handler runs
//! if a route matched, `notFound` hooks otherwise. Finally, `onResponse` hooks can inspect and
//! replace the response, these run even if the handler failed.

pub mod configuration;
pub mod context;
pub mod error;
pub mod handler;
pub mod message;
pub mod router;
pub mod standard_response;

mod compiler;
mod interpreter;
mod pattern;
mod scan;
mod trie;

pub use async_trait::async_trait;
pub use configuration::{Backend, FromYaml, RouterConf, RoutesConf};
pub use context::{Context, Params, Phase, ResponseState};
pub use error::Error;
pub use handler::{derive_fn, handler_fn, Action, Derive, Handler};
pub use message::{ExecutionContext, Request, Response};
pub use pattern::WILDCARD_NAME;
pub use router::{Found, RouteInfo, Router, RouterBuilder, ALL};

#[cfg(test)]
mod tests;
