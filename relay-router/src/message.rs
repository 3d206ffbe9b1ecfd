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

//! Request and response types passed through the router

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Error;

/// An incoming request
///
/// The URL is kept as received, it can be either a path with optional query and fragment or an
/// absolute URL.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method
    pub method: Method,
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
}

impl Request {
    /// Creates a request without headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }
}

/// A response produced by a handler, a hook or the router itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl Response {
    /// Creates an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `200 OK` plain text response.
    pub fn text(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .with_body(body)
    }

    /// Sets a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body along with the `Content-Length` header.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        self
    }

    /// Builds a response from strings as found in configuration files.
    pub fn from_parts<'a>(
        status: u16,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
        body: impl Into<Bytes>,
    ) -> Result<Self, Error> {
        let status = StatusCode::from_u16(status)
            .map_err(|_| Error::InvalidResponse(format!("invalid status code {status}")))?;
        let mut response = Self::new(status).with_body(body);
        for (name, value) in headers {
            let name = HeaderName::try_from(name)
                .map_err(|_| Error::InvalidResponse(format!("invalid header name {name}")))?;
            let value = HeaderValue::try_from(value)
                .map_err(|_| Error::InvalidResponse(format!("invalid value for header {name}")))?;
            response.headers.insert(name, value);
        }
        Ok(response)
    }
}

/// Execution context of a request, shared with whoever dispatched it
///
/// Cancelling it makes the router abandon the request at the next phase boundary.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    cancelled: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Creates a fresh execution context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the processing.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Checks whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
