// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Scripted transport and fixtures shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::api::Backoff;
use crate::config::{DelayRange, Endpoints, Settings};
use crate::http::{HttpRequest, HttpResponse, Method, Transport};

pub const AUTH_URL: &str = "https://portal.test/api/auth/session";
pub const USER_URL: &str = "https://portal.test/api/user";
pub const QUESTS_URL: &str = "https://portal.test/api/quests";
pub const USER_QUESTS_URL: &str = "https://portal.test/api/userQuests";

pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        set_cookies: Vec::new(),
        body: body.to_string(),
    }
}

pub fn html(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        set_cookies: Vec::new(),
        body: body.to_string(),
    }
}

impl HttpResponse {
    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.set_cookies.push(cookie.to_string());
        self
    }
}

struct Route {
    method: Method,
    url: String,
    responses: VecDeque<Result<HttpResponse, String>>,
}

/// Replays queued responses per (method, url). The last queued response of a
/// route repeats forever; unknown routes fail like a dropped connection.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, url: &str, response: HttpResponse) {
        self.push(method, url, Ok(response));
    }

    pub fn fail(&self, method: Method, url: &str, message: &str) {
        self.push(method, url, Err(message.to_string()));
    }

    fn push(&self, method: Method, url: &str, entry: Result<HttpResponse, String>) {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.method == method && r.url == url) {
            Some(route) => route.responses.push_back(entry),
            None => routes.push(Route {
                method,
                url: url.to_string(),
                responses: VecDeque::from([entry]),
            }),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }

    pub fn cookies(&self, method: Method, url: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .filter_map(|r| r.header("Cookie").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let entry = {
            let mut routes = self.routes.lock().unwrap();
            routes
                .iter_mut()
                .find(|r| r.method == request.method && r.url == request.url)
                .and_then(|route| {
                    if route.responses.len() > 1 {
                        route.responses.pop_front()
                    } else {
                        route.responses.front().cloned()
                    }
                })
        };
        self.sent.lock().unwrap().push(request);
        match entry {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("connection refused")),
        }
    }
}

/// Settings pointing at the scripted URLs with every pause set to zero.
pub fn instant_settings() -> Settings {
    let zero = DelayRange::fixed(Duration::ZERO);
    Settings {
        endpoints: Endpoints {
            auth_session: AUTH_URL.to_string(),
            user: USER_URL.to_string(),
            quests: QUESTS_URL.to_string(),
            user_quests: USER_QUESTS_URL.to_string(),
        },
        auth_settle: zero,
        pre_roll: zero,
        between_accounts: Duration::ZERO,
        between_social_quests: Duration::ZERO,
        pending_poll: Duration::ZERO,
        dice_retry_delay: zero,
        request_delay: zero,
        backoff: Backoff::immediate(),
        ..Settings::default()
    }
}
