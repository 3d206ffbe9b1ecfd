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

//! Per-request context passed to hooks and handlers

use http::{Extensions, HeaderMap, StatusCode};
use log::trace;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Error;
use crate::message::{ExecutionContext, Request, Response};
use crate::pattern::SLASH;

/// Request processing phases, in the order they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Context created
    Init,
    /// Running `onRequest` hooks
    PreHooks,
    /// Running `derive` hooks
    Derive,
    /// Matching the URL against the routes
    Matching,
    /// Running the route handler
    Handler,
    /// Running `notFound` hooks
    NotFound,
    /// Running `onResponse` hooks
    PostHooks,
    /// Response available
    Done,
}

/// Extracted route parameters in capture order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub(crate) fn from_spans(names: &[String], url: &str, spans: &[(usize, usize)]) -> Self {
        let url = url.as_bytes();
        Self {
            entries: names
                .iter()
                .zip(spans)
                .map(|(name, (start, end))| {
                    (
                        name.clone(),
                        String::from_utf8_lossy(&url[*start..*end]).into_owned(),
                    )
                })
                .collect(),
        }
    }

    /// Looks up a parameter by name. `*` is the name of a wildcard capture.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over name/value pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether no parameters were captured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Status and headers to be applied to responses built from the context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseState {
    /// Response status, `200 OK` if unset
    pub status: Option<StatusCode>,
    /// Additional response headers
    pub headers: HeaderMap,
}

/// Values registered through `state` and `decorate`, shared by all requests
#[derive(Default, Clone)]
pub(crate) struct Shared {
    pub(crate) store: HashMap<String, Arc<dyn Any + Send + Sync>>,
    pub(crate) decorations: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Shared {
    /// Adds the values of another instance, keeping existing keys.
    pub(crate) fn merge(&mut self, other: Shared) {
        for (key, value) in other.store {
            self.store.entry(key).or_insert(value);
        }
        for (key, value) in other.decorations {
            self.decorations.entry(key).or_insert(value);
        }
    }
}

impl Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut store = self.store.keys().collect::<Vec<_>>();
        store.sort();
        let mut decorations = self.decorations.keys().collect::<Vec<_>>();
        decorations.sort();
        f.debug_struct("Shared")
            .field("store", &store)
            .field("decorations", &decorations)
            .finish()
    }
}

/// Offset where the path starts: after the authority of absolute URLs, zero otherwise
fn path_start(url: &str) -> usize {
    if url.starts_with('/') {
        return 0;
    }
    match url.find("://") {
        Some(scheme) => {
            let authority = scheme + 3;
            url[authority..]
                .find(['/', '?', '#'])
                .map_or(url.len(), |offset| authority + offset)
        }
        None => 0,
    }
}

/// Offset where the matched route starts, after the leading slash of the path
pub(crate) fn route_start(url: &str) -> usize {
    let path_start = path_start(url);
    if url.as_bytes().get(path_start) == Some(&SLASH) {
        path_start + 1
    } else {
        path_start
    }
}

/// Offset of the first `?` or `#` at or after `route_start`, length of the URL if there is none
pub(crate) fn query_start(url: &str, route_start: usize) -> usize {
    url[route_start..]
        .find(['?', '#'])
        .map_or(url.len(), |offset| route_start + offset)
}

/// Request data and in-progress response state
pub struct Context<'a, E> {
    request: Request,
    env: &'a E,
    execution: &'a ExecutionContext,
    shared: &'a Shared,
    path_start: usize,
    route_start: usize,
    query_start: OnceCell<usize>,
    params: Params,
    derived: Extensions,
    response: Option<Response>,
    phase: Phase,
    /// Status and headers applied to responses produced by the router
    pub set: ResponseState,
}

impl<'a, E> Context<'a, E> {
    pub(crate) fn new(
        request: Request,
        env: &'a E,
        execution: &'a ExecutionContext,
        shared: &'a Shared,
    ) -> Self {
        let path_start = path_start(&request.url);
        let route_start = route_start(&request.url);
        Self {
            request,
            env,
            execution,
            shared,
            path_start,
            route_start,
            query_start: OnceCell::new(),
            params: Params::default(),
            derived: Extensions::new(),
            response: None,
            phase: Phase::Init,
            set: ResponseState::default(),
        }
    }

    /// The request being processed
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The environment passed to `fetch`
    pub fn env(&self) -> &'a E {
        self.env
    }

    /// The execution context passed to `fetch`
    pub fn execution(&self) -> &ExecutionContext {
        self.execution
    }

    /// Offset where the query or fragment starts, length of the URL if there is none
    pub fn query_start(&self) -> usize {
        *self
            .query_start
            .get_or_init(|| query_start(&self.request.url, self.route_start))
    }

    pub(crate) fn route_start(&self) -> usize {
        self.route_start
    }

    /// The request path including the leading slash
    pub fn path(&self) -> &str {
        &self.request.url[self.path_start..self.query_start()]
    }

    /// The part of the path matched against the routes
    pub fn route(&self) -> &str {
        &self.request.url[self.route_start..self.query_start()]
    }

    /// Query and fragment, including the leading `?` or `#`
    pub fn query(&self) -> &str {
        &self.request.url[self.query_start()..]
    }

    /// Parameters of the matched route
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Looks up a parameter of the matched route.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Looks up a value registered with `state`.
    pub fn store<T: Any>(&self, key: &str) -> Option<&T> {
        self.shared.store.get(key)?.downcast_ref()
    }

    /// Looks up a value registered with `decorate`.
    pub fn decoration<T: Any>(&self, key: &str) -> Option<&T> {
        self.shared.decorations.get(key)?.downcast_ref()
    }

    /// Looks up a value contributed by a `derive` hook.
    pub fn derived<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.derived.get()
    }

    pub(crate) fn extend(&mut self, extensions: Extensions) {
        self.derived.extend(extensions);
    }

    /// Current processing phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The in-flight response, available to `onResponse` hooks
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Mutable access to the in-flight response
    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    pub(crate) fn set_response(&mut self, response: Option<Response>) {
        self.response = response;
    }

    pub(crate) fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    /// Adds the headers from `set` to a response.
    pub(crate) fn shape(&self, mut response: Response) -> Response {
        for (name, value) in &self.set.headers {
            response.headers.append(name, value.clone());
        }
        response
    }

    /// Applies status and headers from `set` to the in-flight response.
    pub(crate) fn apply_set(&mut self) {
        if let Some(response) = self.response.as_mut() {
            if let Some(status) = self.set.status {
                response.status = status;
            }
            for (name, value) in &self.set.headers {
                response.headers.append(name, value.clone());
            }
        }
    }

    /// Builds a response from `set` with the given body.
    pub fn reply(&self, body: impl Into<bytes::Bytes>) -> Response {
        self.shape(Response::new(self.set.status.unwrap_or(StatusCode::OK)).with_body(body))
    }

    /// Moves to the next phase, fails if the request has been cancelled meanwhile.
    pub(crate) fn enter(&mut self, phase: Phase) -> Result<(), Error> {
        if phase != Phase::Done && self.execution.is_cancelled() {
            trace!("Request {} cancelled before {phase:?}", self.request.url);
            return Err(Error::Cancelled);
        }
        trace!("Request {}: {:?} -> {phase:?}", self.request.url, self.phase);
        self.phase = phase;
        Ok(())
    }
}

impl<E> Debug for Context<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("path_start", &self.path_start)
            .field("route_start", &self.route_start)
            .field("query_start", &self.query_start)
            .field("params", &self.params)
            .field("set", &self.set)
            .field("shared", self.shared)
            .field("derived", &self.derived)
            .field("response", &self.response)
            .field("phase", &self.phase)
            .finish()
    }
}
