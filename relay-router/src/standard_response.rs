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

//! Standard responses for various conditions

use http::header::{HeaderValue, CONTENT_TYPE};
use http::status::StatusCode;
use maud::{html, DOCTYPE};

use crate::message::Response;

/// Produces the text of a standard response page for the given status code.
///
/// Pages for 404 explain that no route matched.
pub fn response_text(status: StatusCode) -> String {
    let heading = format!(
        "{} {}",
        status.as_str(),
        status.canonical_reason().unwrap_or("")
    );
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { (heading.trim_end()) }
            }
            body {
                main {
                    h1 { (heading.trim_end()) }
                    @if status == StatusCode::NOT_FOUND {
                        p { "No route matches the requested path." }
                    }
                }
            }
        }
    }
    .into()
}

/// Produces a standard error page for the given status code.
pub fn error_response(status: StatusCode) -> Response {
    let mut response = Response::new(status).with_body(response_text(status));
    response.headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_LENGTH;
    use test_log::test;

    #[test]
    fn not_found_page() {
        let response = error_response(StatusCode::NOT_FOUND);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.headers[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(
            response.headers[CONTENT_LENGTH],
            response.body.len().to_string().as_str()
        );
        let text = String::from_utf8_lossy(&response.body);
        assert!(text.starts_with("<!DOCTYPE html>"));
        assert!(text.contains("<title>404 Not Found</title>"));
        assert!(text.contains("No route matches"));
    }

    #[test]
    fn other_status_pages() {
        let text = response_text(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text.contains("<h1>500 Internal Server Error</h1>"));
        assert!(!text.contains("No route matches"));

        // Unknown reason phrases leave no trailing space
        let status = StatusCode::from_u16(599).unwrap_or(StatusCode::IM_A_TEAPOT);
        assert!(response_text(status).contains("<title>599</title>"));
    }
}
