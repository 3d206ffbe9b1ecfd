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

#![doc = include_str!("../README.md")]

use clap::{Parser, Subcommand};
use http::Method;
use log::{error, info};
use relay_router::{
    Backend, Error, ExecutionContext, FromYaml, Request, Response, Router, RouterBuilder,
    RoutesConf,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Inspect a route table and run requests through it
#[derive(Debug, Parser)]
#[command(version)]
struct Opt {
    /// Route table configuration file
    #[arg(short, long)]
    conf: PathBuf,

    /// Matching backend to use instead of the configured one (interpreted or compiled)
    #[arg(short, long)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List all registered routes
    Routes,
    /// Match a URL with both backends, without running any hooks
    Match {
        /// Request method
        method: String,
        /// Request URL
        url: String,
    },
    /// Run a request through the router and print the response
    Fetch {
        /// Request method
        method: String,
        /// Request URL
        url: String,
    },
}

fn parse_method(method: &str) -> Result<Method, Error> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::InvalidMethod(method.to_owned()))
}

fn build(mut conf: RoutesConf, backend: Option<Backend>) -> Result<Router<()>, Error> {
    if let Some(backend) = backend {
        conf.router.backend = backend;
    }
    RouterBuilder::try_from(conf)?.build()
}

fn list_routes(router: &Router<()>, out: &mut impl Write) -> Result<(), Error> {
    for route in router.routes() {
        writeln!(out, "{} {}", route.method, route.pattern)?;
    }
    Ok(())
}

fn match_url(
    conf: &RoutesConf,
    method: &Method,
    url: &str,
    out: &mut impl Write,
) -> Result<(), Error> {
    for backend in [Backend::Interpreted, Backend::Compiled] {
        let router = build(conf.clone(), Some(backend))?;
        match router.find(method, url) {
            Some(found) => {
                let params = found
                    .params
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>();
                writeln!(out, "{backend:?}: {:?} [{}]", found.action, params.join(", "))?;
            }
            None => writeln!(out, "{backend:?}: no match")?,
        }
    }
    Ok(())
}

fn print_response(response: &Response, out: &mut impl Write) -> Result<(), Error> {
    writeln!(out, "{}", response.status)?;
    for (name, value) in &response.headers {
        writeln!(out, "{name}: {}", String::from_utf8_lossy(value.as_bytes()))?;
    }
    writeln!(out)?;
    out.write_all(&response.body)?;
    Ok(())
}

fn fetch(router: &Router<()>, method: Method, url: &str) -> Result<Response, Error> {
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    runtime.block_on(router.fetch(Request::new(method, url), &(), &ExecutionContext::new()))
}

fn run(opt: Opt) -> Result<(), Error> {
    let conf = RoutesConf::load_from_yaml(&opt.conf)?;
    let mut out = std::io::stdout().lock();

    match opt.command {
        Command::Routes => {
            let router = build(conf, opt.backend)?;
            list_routes(&router, &mut out)
        }
        Command::Match { method, url } => match_url(&conf, &parse_method(&method)?, &url, &mut out),
        Command::Fetch { method, url } => {
            let router = build(conf, opt.backend)?;
            info!("Fetching {method} {url}");
            let response = fetch(&router, parse_method(&method)?, &url)?;
            print_response(&response, &mut out)
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let opt = Opt::parse();
    match run(opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
