// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! HTTP request executor: classifies raw responses into a success payload or
//! a [`RequestError`], and retries transient failures with jittered backoff.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::RequestError;
use crate::http::{browser_headers, HttpRequest, HttpResponse, Method, Transport, UserAgents};
use crate::session::{Session, TokenRotation};

const CHECKPOINT_MARKER: &str = "vercel security checkpoint";
const LOG_BODY_LIMIT: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    AuthSession,
    User,
    Quests,
    UserQuests,
}

#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: Method,
    pub endpoint: Endpoint,
    pub url: String,
    pub referer: String,
    pub payload: Option<Value>,
}

/// Per-account state every request needs. Calls never mutate it; they hand
/// back an updated copy inside their [`Reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub session: Session,
    pub proxy: Option<usize>,
}

impl RequestContext {
    pub fn new(session: Session, proxy: Option<usize>) -> Self {
        Self { session, proxy }
    }

    fn with_rotation(&self, rotation: &TokenRotation) -> Self {
        Self {
            session: self.session.rotated(rotation),
            proxy: self.proxy,
        }
    }
}

/// Result of one logical call plus the context to use for the next one.
#[derive(Debug, Clone)]
pub struct Reply<T> {
    pub ctx: RequestContext,
    pub result: Result<T, RequestError>,
    pub attempts: u32,
}

impl<T> Reply<T> {
    pub fn map<U, F>(self, f: F) -> Reply<U>
    where
        F: FnOnce(T) -> U,
    {
        Reply {
            ctx: self.ctx,
            result: self.result.map(f),
            attempts: self.attempts,
        }
    }
}

impl Reply<Value> {
    /// Decodes the success payload into `T`; a shape mismatch becomes
    /// [`RequestError::Parse`].
    pub fn decode<T: DeserializeOwned>(self) -> Reply<T> {
        let result = self.result.and_then(|value| {
            serde_json::from_value::<T>(value).map_err(|e| RequestError::Parse {
                status: 200,
                detail: e.to_string(),
            })
        });
        Reply {
            ctx: self.ctx,
            result,
            attempts: self.attempts,
        }
    }
}

/// Decides what a raw HTTP exchange means.
pub fn classify(
    method: Method,
    endpoint: Endpoint,
    response: &HttpResponse,
) -> Result<Value, RequestError> {
    let status = response.status;
    let body = response.body.as_str();

    if status == 429 || body.to_lowercase().contains(CHECKPOINT_MARKER) {
        return Err(RequestError::Blocked {
            status,
            detail: truncate(body),
        });
    }

    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) if status >= 500 => {
            return Err(RequestError::Server {
                status,
                detail: truncate(body),
            })
        }
        Err(e) => {
            return Err(RequestError::Parse {
                status,
                detail: format!("{}; body: {}", e, truncate(body)),
            })
        }
    };

    let message = json
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_lowercase);

    if status == 200 {
        if let Some(data) = json.get("data").filter(|data| is_truthy(data)) {
            return Ok(data.clone());
        }
        if method == Method::Post {
            let says_completed = message.as_deref().is_some_and(|m| m.contains("completed"));
            let is_completed = json.get("status").and_then(Value::as_str) == Some("COMPLETED");
            if says_completed || is_completed {
                return Ok(json);
            }
        }
        if endpoint == Endpoint::AuthSession && json.get("user").is_some_and(is_truthy) {
            return Ok(json);
        }
        if json.as_object().is_some_and(|obj| obj.is_empty()) {
            return Err(RequestError::EmptyPayload);
        }
    }

    if status == 400
        && message
            .as_deref()
            .is_some_and(|m| m.contains("quest already completed"))
    {
        return Err(RequestError::AlreadyCompleted);
    }

    let detail = match json.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => truncate(body),
    };
    if status >= 500 {
        Err(RequestError::Server { status, detail })
    } else {
        Err(RequestError::Rejected { status, detail })
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub(crate) fn truncate(body: &str) -> String {
    match body.char_indices().nth(LOG_BODY_LIMIT) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

/// Delay schedule between attempts of one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub blocked_base: Duration,
    pub generic_base: Duration,
    pub jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            blocked_base: Duration::from_secs(10),
            generic_base: Duration::from_secs(5),
            jitter: Duration::from_secs(2),
        }
    }
}

impl Backoff {
    pub fn immediate() -> Self {
        Self {
            blocked_base: Duration::ZERO,
            generic_base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Pause before attempt `attempt + 1`, or `None` when the call must stop.
    pub fn delay(&self, error: &RequestError, attempt: u32, max_attempts: u32) -> Option<Duration> {
        if attempt >= max_attempts || !error.is_transient() {
            return None;
        }
        let scale: f64 = rand::thread_rng().gen_range(0.0..=1.0);
        let jitter = self.jitter.mul_f64(scale * attempt as f64);
        let delay = match error {
            RequestError::Blocked { .. } => self.blocked_base + jitter,
            RequestError::Server { .. } => self.generic_base + jitter,
            _ => (self.generic_base + jitter) * attempt,
        };
        Some(delay)
    }
}

pub struct ApiClient {
    transport: Arc<dyn Transport>,
    user_agents: UserAgents,
    backoff: Backoff,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, user_agents: UserAgents, backoff: Backoff) -> Self {
        Self {
            transport,
            user_agents,
            backoff,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Runs `call` for at most `max_attempts` attempts. Token rotations from
    /// every attempt are applied before the next one is sent.
    pub async fn request(
        &self,
        call: &ApiCall,
        ctx: &RequestContext,
        max_attempts: u32,
    ) -> Reply<Value> {
        let max_attempts = max_attempts.max(1);
        let mut ctx = ctx.clone();
        let mut attempt = 1;

        loop {
            let (next_ctx, result) = self.attempt(call, &ctx).await;
            ctx = next_ctx;

            let err = match result {
                Ok(value) => {
                    return Reply {
                        ctx,
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(err) => err,
            };

            match &err {
                RequestError::AlreadyCompleted => {
                    debug!(url = %call.url, "quest already completed")
                }
                RequestError::Blocked { status, .. } => error!(
                    url = %call.url,
                    status,
                    attempt,
                    max_attempts,
                    "blocked by security checkpoint"
                ),
                other => warn!(
                    url = %call.url,
                    method = call.method.as_str(),
                    attempt,
                    max_attempts,
                    error = %other,
                    "request failed"
                ),
            }

            match self.backoff.delay(&err, attempt, max_attempts) {
                Some(delay) => {
                    warn!(
                        url = %call.url,
                        next_attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    return Reply {
                        ctx,
                        result: Err(err),
                        attempts: attempt,
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        call: &ApiCall,
        ctx: &RequestContext,
    ) -> (RequestContext, Result<Value, RequestError>) {
        let request = HttpRequest {
            method: call.method,
            url: call.url.clone(),
            headers: browser_headers(self.user_agents.pick(), &call.referer, &ctx.session),
            json: call.payload.clone(),
            proxy: ctx.proxy,
        };

        match self.transport.send(request).await {
            Ok(response) => {
                let rotation = TokenRotation::from_set_cookies(&response.set_cookies);
                if !rotation.is_empty() {
                    debug!(url = %call.url, "response rotated session tokens");
                }
                (
                    ctx.with_rotation(&rotation),
                    classify(call.method, call.endpoint, &response),
                )
            }
            Err(e) => (ctx.clone(), Err(RequestError::Network(format!("{:#}", e)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{html, json_response, ScriptedTransport};
    use serde_json::json;

    fn response(status: u16, body: Value) -> HttpResponse {
        json_response(status, body)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Session::new("sess-0", "csrf-0").unwrap(), None)
    }

    fn call(method: Method, endpoint: Endpoint, url: &str) -> ApiCall {
        ApiCall {
            method,
            endpoint,
            url: url.to_string(),
            referer: "https://portal.test/rewards".to_string(),
            payload: None,
        }
    }

    #[test]
    fn data_field_is_success_payload() {
        let result = classify(Method::Get, Endpoint::Quests, &response(200, json!({"data": []})));
        assert_eq!(result, Ok(json!([])));
    }

    #[test]
    fn session_endpoint_needs_user_field() {
        let body = json!({"user": {"email": "a@b.c"}, "expires": "x"});
        assert!(classify(Method::Get, Endpoint::AuthSession, &response(200, body.clone())).is_ok());
        assert!(matches!(
            classify(Method::Get, Endpoint::User, &response(200, body)),
            Err(RequestError::Rejected { status: 200, .. })
        ));
    }

    #[test]
    fn empty_object_is_a_dead_session() {
        assert_eq!(
            classify(Method::Get, Endpoint::AuthSession, &response(200, json!({}))),
            Err(RequestError::EmptyPayload)
        );
    }

    #[test]
    fn post_completion_shapes_are_success() {
        let by_message = response(200, json!({"message": "Quest Completed"}));
        let by_status = response(200, json!({"id": "uq1", "status": "COMPLETED"}));
        assert!(classify(Method::Post, Endpoint::UserQuests, &by_message).is_ok());
        assert!(classify(Method::Post, Endpoint::UserQuests, &by_status).is_ok());
        assert!(classify(Method::Get, Endpoint::UserQuests, &by_message).is_err());
    }

    #[test]
    fn failures_are_classified() {
        let already = response(400, json!({"message": "Quest already completed"}));
        assert_eq!(
            classify(Method::Post, Endpoint::UserQuests, &already),
            Err(RequestError::AlreadyCompleted)
        );

        let limited = response(429, json!({"message": "slow down"}));
        assert!(matches!(
            classify(Method::Get, Endpoint::User, &limited),
            Err(RequestError::Blocked { status: 429, .. })
        ));

        let checkpoint = html(403, "<html><title>Vercel Security Checkpoint</title></html>");
        assert!(matches!(
            classify(Method::Get, Endpoint::User, &checkpoint),
            Err(RequestError::Blocked { status: 403, .. })
        ));

        let challenge = html(200, "<html>please enable javascript</html>");
        assert!(matches!(
            classify(Method::Get, Endpoint::User, &challenge),
            Err(RequestError::Parse { status: 200, .. })
        ));

        let gateway = html(502, "Bad Gateway");
        assert!(matches!(
            classify(Method::Get, Endpoint::User, &gateway),
            Err(RequestError::Server { status: 502, .. })
        ));

        let unauthorized = response(401, json!({"message": "Unauthorized"}));
        assert_eq!(
            classify(Method::Get, Endpoint::User, &unauthorized),
            Err(RequestError::Rejected {
                status: 401,
                detail: "Unauthorized".into()
            })
        );
    }

    #[test]
    fn backoff_stops_at_bound_and_on_benign_errors() {
        let backoff = Backoff::default();
        let blocked = RequestError::Blocked {
            status: 429,
            detail: String::new(),
        };
        let server = RequestError::Server {
            status: 503,
            detail: String::new(),
        };

        assert!(backoff.delay(&RequestError::AlreadyCompleted, 1, 5).is_none());
        assert!(backoff.delay(&RequestError::EmptyPayload, 1, 5).is_none());
        assert!(backoff.delay(&blocked, 3, 3).is_none());
        assert!(backoff.delay(&blocked, 1, 1).is_none());

        let blocked_delay = backoff.delay(&blocked, 1, 3).unwrap();
        assert!(blocked_delay >= Duration::from_secs(10));
        assert!(blocked_delay <= Duration::from_secs(12));

        let server_delay = backoff.delay(&server, 2, 3).unwrap();
        assert!(server_delay >= Duration::from_secs(5));
        assert!(server_delay <= Duration::from_secs(9));

        let network_delay = backoff
            .delay(&RequestError::Network("reset".into()), 2, 3)
            .unwrap();
        assert!(network_delay >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_up_to_bound() {
        let transport = ScriptedTransport::new();
        let url = "https://portal.test/api/user";
        transport.on(Method::Get, url, html(503, "unavailable"));
        let client = ApiClient::new(transport.clone(), UserAgents::default(), Backoff::default());

        let reply = client.request(&call(Method::Get, Endpoint::User, url), &ctx(), 3).await;

        assert!(matches!(reply.result, Err(RequestError::Server { status: 503, .. })));
        assert_eq!(reply.attempts, 3);
        assert_eq!(transport.count(Method::Get, url), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn never_retries_already_completed() {
        let transport = ScriptedTransport::new();
        let url = "https://portal.test/api/userQuests";
        transport.on(
            Method::Post,
            url,
            response(400, json!({"message": "Quest already completed"})),
        );
        let client = ApiClient::new(transport.clone(), UserAgents::default(), Backoff::default());

        let reply = client
            .request(&call(Method::Post, Endpoint::UserQuests, url), &ctx(), 5)
            .await;

        assert_eq!(reply.result, Err(RequestError::AlreadyCompleted));
        assert_eq!(reply.attempts, 1);
        assert_eq!(transport.count(Method::Post, url), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure_and_threads_rotated_tokens() {
        let transport = ScriptedTransport::new();
        let url = "https://portal.test/api/quests";
        transport.on(
            Method::Get,
            url,
            html(502, "bad gateway")
                .with_cookie("__Secure-next-auth.session-token=sess-1; Path=/"),
        );
        transport.on(
            Method::Get,
            url,
            response(200, json!({"data": [{"id": "q1", "title": "Daily Dice Roll"}]}))
                .with_cookie("__Host-next-auth.csrf-token=csrf-2; Path=/"),
        );
        let client = ApiClient::new(transport.clone(), UserAgents::default(), Backoff::default());

        let reply = client.request(&call(Method::Get, Endpoint::Quests, url), &ctx(), 3).await;

        assert!(reply.result.is_ok());
        assert_eq!(reply.attempts, 2);
        assert_eq!(reply.ctx.session.session_token(), "sess-1");
        assert_eq!(reply.ctx.session.csrf_token(), "csrf-2");

        let cookies = transport.cookies(Method::Get, url);
        assert!(cookies[0].contains("session-token=sess-0"));
        assert!(cookies[1].contains("session-token=sess-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_surface_after_retries() {
        let transport = ScriptedTransport::new();
        let client = ApiClient::new(transport.clone(), UserAgents::default(), Backoff::default());
        let url = "https://portal.test/api/unscripted";

        let reply = client.request(&call(Method::Get, Endpoint::User, url), &ctx(), 2).await;

        assert!(matches!(reply.result, Err(RequestError::Network(_))));
        assert_eq!(reply.attempts, 2);
        assert_eq!(reply.ctx, ctx());
    }

    #[test]
    fn decode_maps_shape_mismatch_to_parse_error() {
        let reply = Reply {
            ctx: ctx(),
            result: Ok(json!({"unexpected": true})),
            attempts: 1,
        };
        let decoded: Reply<Vec<String>> = reply.decode();
        assert!(matches!(decoded.result, Err(RequestError::Parse { .. })));
    }
}
