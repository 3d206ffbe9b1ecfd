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

//! Error type shared by route registration, configuration loading and request processing

use thiserror::Error;

/// Errors produced by this crate
///
/// Registration errors (illegal patterns, duplicate routes, invalid mount locations) are raised
/// while the router is being set up and should prevent it from serving. Request processing never
/// fails because of a missing route, only hook and handler failures as well as cancellation are
/// reported as errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A route pattern contains a character reserved for query or fragment
    #[error("illegal character {character:?} at offset {offset} of pattern {pattern:?}")]
    IllegalCharacter {
        /// The pattern as registered
        pattern: String,
        /// Byte offset of the character within the pattern
        offset: usize,
        /// The offending character
        character: char,
    },

    /// The same method has already been registered for the pattern
    #[error("route {method} {pattern} is already registered")]
    DuplicateRoute {
        /// Method of the route
        method: String,
        /// The pattern as registered
        pattern: String,
    },

    /// Method name could not be parsed
    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    /// Mount location already has routes
    #[error("cannot mount at {0:?}, location already has routes")]
    MountOccupied(String),

    /// Mount location is reached through a parameter
    #[error("cannot mount at {0:?}, path contains a parameter")]
    MountParameter(String),

    /// Mount location is the router root
    #[error("cannot mount at the router root")]
    MountRoot,

    /// A parameter or wildcard node cannot hold the requested continuation
    #[error("{0} is not supported at this position")]
    Unsupported(&'static str),

    /// A hook or handler failed
    #[error("handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Request processing was cancelled through its execution context
    #[error("request cancelled")]
    Cancelled,

    /// Compiled matcher produced a different result than the interpreter
    #[error("compiled matcher disagrees with interpreter on {method} {url}")]
    Mismatch {
        /// Request method checked
        method: String,
        /// Request URL checked
        url: String,
    },

    /// Configured response cannot be represented
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration file could not be opened
    #[error("failed opening configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error("failed reading configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Wraps an error raised by a hook or handler.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }
}
