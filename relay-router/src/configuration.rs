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

//! Structures required to deserialize router configuration from YAML configuration files.

use log::trace;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use crate::error::Error;
use crate::message::Response;
use crate::router::RouterBuilder;

/// Matching strategy used by a router
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Walk the trie for every request
    #[default]
    Interpreted,
    /// Compile the trie into a flat program at build time
    Compiled,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "interpreted" => Ok(Self::Interpreted),
            "compiled" => Ok(Self::Compiled),
            other => Err(format!("unknown backend {other}, expected interpreted or compiled")),
        }
    }
}

/// Router settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConf {
    /// Matching strategy
    pub backend: Backend,
    /// If `true`, parameters may consume slashes
    pub slashes_in_params: bool,
    /// If `true`, a compiled program is checked against the interpreter for every route when
    /// the router is built
    pub verify: bool,
}

impl Default for RouterConf {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            slashes_in_params: false,
            verify: true,
        }
    }
}

fn default_status() -> u16 {
    200
}

/// A static response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResponseConf {
    /// Response status
    #[serde(default = "default_status")]
    pub status: u16,
    /// Response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body
    #[serde(default)]
    pub body: String,
}

impl TryFrom<ResponseConf> for Response {
    type Error = Error;

    fn try_from(conf: ResponseConf) -> Result<Self, Self::Error> {
        Response::from_parts(
            conf.status,
            conf.headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
            conf.body,
        )
    }
}

fn default_method() -> String {
    "GET".to_owned()
}

/// A route producing a static response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConf {
    /// Request method, `ALL` matches any method
    #[serde(default = "default_method")]
    pub method: String,
    /// Route pattern
    pub pattern: String,
    /// Response to produce
    #[serde(flatten)]
    pub response: ResponseConf,
}

/// A route table
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct RoutesConf {
    /// Router settings
    #[serde(flatten)]
    pub router: RouterConf,
    /// Routes in registration order
    #[serde(default)]
    pub routes: Vec<RouteConf>,
    /// Response for requests not matching any route
    #[serde(default)]
    pub not_found: Option<ResponseConf>,
}

impl<E: Sync + 'static> TryFrom<RoutesConf> for RouterBuilder<E> {
    type Error = Error;

    fn try_from(conf: RoutesConf) -> Result<Self, Self::Error> {
        let mut builder = RouterBuilder::new();
        builder.configure(conf.router);
        for route in conf.routes {
            builder.on(&route.method, &route.pattern, Response::try_from(route.response)?)?;
        }
        if let Some(not_found) = conf.not_found {
            builder.not_found(Response::try_from(not_found)?);
        }
        Ok(builder)
    }
}

/// Trait for configuration structures that can be loaded from YAML files. This trait has a blanket
/// implementation for any structure implementing [`serde::Deserialize`].
pub trait FromYaml {
    /// Loads configuration from a YAML file.
    fn load_from_yaml<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
        Self: Sized;

    /// Loads configuration from a YAML string.
    fn from_yaml(text: &str) -> Result<Self, Error>
    where
        Self: Sized;
}

impl<D> FromYaml for D
where
    D: DeserializeOwned + Debug + ?Sized,
{
    fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let conf = serde_yaml::from_reader(reader)?;
        trace!("Loaded configuration file: {conf:#?}");

        Ok(conf)
    }

    fn from_yaml(text: &str) -> Result<Self, Error> {
        let conf = serde_yaml::from_str(text)?;
        trace!("Loaded configuration: {conf:#?}");

        Ok(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use test_log::test;

    #[test]
    fn defaults() -> Result<(), Error> {
        let conf = RoutesConf::from_yaml("{}")?;
        assert_eq!(conf, RoutesConf::default());
        assert_eq!(conf.router.backend, Backend::Interpreted);
        assert!(conf.router.verify);
        assert!(!conf.router.slashes_in_params);
        Ok(())
    }

    #[test]
    fn routes() -> Result<(), Error> {
        let conf = RoutesConf::from_yaml(
            r#"
                backend: compiled
                slashes_in_params: true
                verify: false
                routes:
                - pattern: /users/:id
                  body: user
                - method: post
                  pattern: /users
                  status: 201
                  headers:
                    Location: /users/1
                not_found:
                  status: 404
                  body: gone
            "#,
        )?;
        assert_eq!(
            conf.router,
            RouterConf {
                backend: Backend::Compiled,
                slashes_in_params: true,
                verify: false,
            }
        );
        assert_eq!(conf.routes.len(), 2);
        assert_eq!(conf.routes[0].method, "GET");
        assert_eq!(conf.routes[0].response.status, 200);
        assert_eq!(conf.routes[1].method, "post");

        let created = Response::try_from(conf.routes[1].response.clone())?;
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.headers["location"], "/users/1");

        let not_found = conf.not_found.map(Response::try_from).transpose()?;
        assert_eq!(
            not_found.map(|response| response.body),
            Some(bytes::Bytes::from("gone"))
        );
        Ok(())
    }

    #[test]
    fn unknown_backend() {
        assert!(RoutesConf::from_yaml("backend: jit").is_err());
        assert_eq!("compiled".parse(), Ok(Backend::Compiled));
        assert!("jit".parse::<Backend>().is_err());
    }
}
