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

//! Handler and hook traits
//!
//! Route handlers, `onRequest`, `notFound` and `onResponse` hooks all implement [`Handler`].
//! Returning `Ok(None)` means "continue", `Ok(Some(response))` produces a final value.

use async_trait::async_trait;
use http::Extensions;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::message::Response;

/// A request handler or lifecycle hook
#[async_trait]
pub trait Handler<E>: Send + Sync {
    /// Processes the request.
    async fn handle(&self, ctx: &mut Context<'_, E>) -> Result<Option<Response>, Error>;
}

/// A `derive` hook contributing request-scoped values to the context
#[async_trait]
pub trait Derive<E>: Send + Sync {
    /// Produces values to be merged into the context.
    async fn derive(&self, ctx: &Context<'_, E>) -> Result<Extensions, Error>;
}

/// Adapts a synchronous closure as [`Handler`]
pub struct HandlerFn<E, F> {
    f: F,
    _env: PhantomData<fn(&E)>,
}

/// Wraps a closure to be used as a handler or hook.
pub fn handler_fn<E, F>(f: F) -> HandlerFn<E, F>
where
    F: Fn(&mut Context<'_, E>) -> Result<Option<Response>, Error> + Send + Sync,
{
    HandlerFn {
        f,
        _env: PhantomData,
    }
}

#[async_trait]
impl<E: Sync, F> Handler<E> for HandlerFn<E, F>
where
    F: Fn(&mut Context<'_, E>) -> Result<Option<Response>, Error> + Send + Sync,
{
    async fn handle(&self, ctx: &mut Context<'_, E>) -> Result<Option<Response>, Error> {
        (self.f)(ctx)
    }
}

impl<E, F> Debug for HandlerFn<E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HandlerFn")
    }
}

/// Adapts a synchronous closure as [`Derive`]
pub struct DeriveFn<E, F> {
    f: F,
    _env: PhantomData<fn(&E)>,
}

/// Wraps a closure to be used as a `derive` hook.
pub fn derive_fn<E, F>(f: F) -> DeriveFn<E, F>
where
    F: Fn(&Context<'_, E>) -> Result<Extensions, Error> + Send + Sync,
{
    DeriveFn {
        f,
        _env: PhantomData,
    }
}

#[async_trait]
impl<E: Sync, F> Derive<E> for DeriveFn<E, F>
where
    F: Fn(&Context<'_, E>) -> Result<Extensions, Error> + Send + Sync,
{
    async fn derive(&self, ctx: &Context<'_, E>) -> Result<Extensions, Error> {
        (self.f)(ctx)
    }
}

impl<E, F> Debug for DeriveFn<E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeriveFn")
    }
}

/// What a route or `notFound` entry does: call a handler or return a prepared response
pub enum Action<E> {
    /// Handler invoked for each request
    Callable(Arc<dyn Handler<E>>),
    /// Response cloned for each request
    Static(Response),
}

impl<E> Action<E> {
    /// Wraps a handler.
    pub fn handler(handler: impl Handler<E> + 'static) -> Self {
        Self::Callable(Arc::new(handler))
    }

    pub(crate) async fn run(&self, ctx: &mut Context<'_, E>) -> Result<Option<Response>, Error> {
        match self {
            Self::Callable(handler) => handler.handle(ctx).await,
            Self::Static(response) => Ok(Some(response.clone())),
        }
    }
}

impl<E> Clone for Action<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Callable(handler) => Self::Callable(handler.clone()),
            Self::Static(response) => Self::Static(response.clone()),
        }
    }
}

impl<E> Debug for Action<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Callable(_) => f.write_str("Callable"),
            Self::Static(response) => f.debug_tuple("Static").field(response).finish(),
        }
    }
}

impl<E> From<Response> for Action<E> {
    fn from(response: Response) -> Self {
        Self::Static(response)
    }
}

impl<E: Sync + 'static, F> From<HandlerFn<E, F>> for Action<E>
where
    F: Fn(&mut Context<'_, E>) -> Result<Option<Response>, Error> + Send + Sync + 'static,
{
    fn from(handler: HandlerFn<E, F>) -> Self {
        Self::handler(handler)
    }
}
