// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Raw HTTP plumbing: the [`Transport`] seam, its reqwest implementation,
//! and the browser-like header set the portal requires.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::SET_COOKIE;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::PORTAL_ORIGIN;
use crate::session::Session;

pub const IP_ECHO_URL: &str = "https://api.ipify.org?format=json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub json: Option<Value>,
    /// Index into the transport's proxy list; `None` goes direct.
    pub proxy: Option<usize>,
}

impl HttpRequest {
    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub set_cookies: Vec<String>,
    pub body: String,
}

/// Sends one HTTP request. An `Err` means no HTTP response was received.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

pub struct ReqwestTransport {
    direct: reqwest::Client,
    proxied: Vec<reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, proxies: &[String]) -> Result<Self> {
        let direct = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let mut proxied = Vec::with_capacity(proxies.len());
        for proxy in proxies {
            let proxy_cfg = reqwest::Proxy::all(proxy.as_str())
                .with_context(|| format!("Invalid proxy URL {}", proxy))?;
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .proxy(proxy_cfg)
                .build()
                .with_context(|| format!("Failed to build HTTP client for proxy {}", proxy))?;
            proxied.push(client);
        }

        Ok(Self { direct, proxied })
    }

    fn client(&self, proxy: Option<usize>) -> &reqwest::Client {
        match proxy {
            Some(index) if !self.proxied.is_empty() => &self.proxied[index % self.proxied.len()],
            _ => &self.direct,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let client = self.client(request.proxy);
        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(json) = &request.json {
            builder = builder.json(json);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            set_cookies,
            body,
        })
    }
}

/// Pool of browser user agents; one is picked at random per request.
#[derive(Debug, Clone)]
pub struct UserAgents(Vec<String>);

impl UserAgents {
    #[cfg(test)]
    pub fn new(agents: Vec<String>) -> Self {
        if agents.is_empty() {
            Self::default()
        } else {
            Self(agents)
        }
    }

    pub fn pick(&self) -> &str {
        self.0
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }
}

impl Default for UserAgents {
    fn default() -> Self {
        Self(DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect())
    }
}

const DEFAULT_USER_AGENTS: [&str; 8] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:138.0) Gecko/20100101 Firefox/138.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36 Edg/136.0.0.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:137.0) Gecko/20100101 Firefox/137.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
];

pub fn browser_headers(user_agent: &str, referer: &str, session: &Session) -> Vec<(String, String)> {
    vec![
        ("Accept".to_string(), "*/*".to_string()),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Dnt".to_string(), "1".to_string()),
        ("User-Agent".to_string(), user_agent.to_string()),
        ("Referer".to_string(), referer.to_string()),
        ("Origin".to_string(), PORTAL_ORIGIN.to_string()),
        ("Cookie".to_string(), session.cookie_header()),
    ]
}

/// Public IP seen by the outside world through `proxy`, or `"Error"`.
pub async fn egress_ip(transport: &dyn Transport, proxy: Option<usize>) -> String {
    #[derive(Deserialize)]
    struct IpEcho {
        ip: Option<String>,
    }

    let request = HttpRequest {
        method: Method::Get,
        url: IP_ECHO_URL.to_string(),
        headers: Vec::new(),
        json: None,
        proxy,
    };

    match transport.send(request).await {
        Ok(response) => match serde_json::from_str::<IpEcho>(&response.body) {
            Ok(echo) => echo.ip.unwrap_or_else(|| "Unknown".to_string()),
            Err(e) => {
                debug!(error = %e, "ip echo returned unexpected body");
                "Error".to_string()
            }
        },
        Err(e) => {
            debug!(error = %e, "ip echo request failed");
            "Error".to_string()
        }
    }
}
