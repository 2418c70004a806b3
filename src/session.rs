// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Session and CSRF token carrier.
//!
//! A [`Session`] is never mutated in place. Every call that talks to the
//! portal hands back a (possibly) new session built from the cookies the
//! response set, and callers thread that value into the next call.

use std::fmt;

use anyhow::{bail, Result};

pub const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";
pub const CSRF_COOKIE: &str = "__Host-next-auth.csrf-token";

// Tracking cookies the portal expects from a real browser.
const FIXED_COOKIES: [&str; 8] = [
    "_ga=GA1.1.640883127.1738150204",
    r#"wagmi.store={"state":{"connections":{"__type":"Map","value":[]},"chainId":1,"current":null},"version":2}"#,
    "__Secure-next-auth.callback-url=https%3A%2F%2Fportal.magicnewton.com",
    "htjs_anonymous_id=44ad88f9-4d09-4d1e-bc3f-c22bdf901ca6",
    r#"htjs_sesh={"id":1748523144789,"expiresAt":1748524944789,"timeout":1800000,"sessionStart":true,"autoTrack":true}"#,
    "_clck=atmp19|2|fwb|0|1975",
    "_clsk=eupccn|1748523146713|1|1|n.clarity.ms/collect",
    "_ga_2BFPMRZ2M3=GS2.1.s1748525959$o20$g0$t1748525959$j60$l0$h0",
];

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    session_token: String,
    csrf_token: String,
}

impl Session {
    /// Both tokens must be non-empty after trimming.
    pub fn new(session_token: &str, csrf_token: &str) -> Result<Self> {
        let session_token = session_token.trim();
        let csrf_token = csrf_token.trim();
        if session_token.is_empty() || csrf_token.is_empty() {
            bail!("session token and csrf token must both be non-empty");
        }
        Ok(Self {
            session_token: session_token.to_string(),
            csrf_token: csrf_token.to_string(),
        })
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Returns the session that results from applying `rotation`.
    /// Tokens the response did not replace are carried over unchanged.
    pub fn rotated(&self, rotation: &TokenRotation) -> Session {
        Session {
            session_token: rotation
                .session_token
                .clone()
                .unwrap_or_else(|| self.session_token.clone()),
            csrf_token: rotation
                .csrf_token
                .clone()
                .unwrap_or_else(|| self.csrf_token.clone()),
        }
    }

    /// Full `Cookie` header value sent with every portal request.
    pub fn cookie_header(&self) -> String {
        let csrf = format!("{}={}", CSRF_COOKIE, self.csrf_token);
        let session = format!("{}={}", SESSION_COOKIE, self.session_token);

        let mut parts: Vec<&str> = Vec::with_capacity(FIXED_COOKIES.len() + 2);
        parts.extend_from_slice(&FIXED_COOKIES[..2]);
        parts.push(&csrf);
        parts.extend_from_slice(&FIXED_COOKIES[2..]);
        parts.push(&session);
        parts.join("; ")
    }

    /// Short identifier safe to print: the last 10 characters of each token.
    pub fn tail(&self) -> String {
        format!("...{} / ...{}", tail(&self.session_token), tail(&self.csrf_token))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_token", &tail(&self.session_token))
            .field("csrf_token", &tail(&self.csrf_token))
            .finish()
    }
}

fn tail(token: &str) -> &str {
    let start = token
        .char_indices()
        .rev()
        .nth(9)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &token[start..]
}

/// Replacement tokens found in a response's `Set-Cookie` headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRotation {
    pub session_token: Option<String>,
    pub csrf_token: Option<String>,
}

impl TokenRotation {
    pub fn from_set_cookies<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rotation = TokenRotation::default();
        for header in headers {
            let pair = header.as_ref().split(';').next().unwrap_or("");
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match name.trim() {
                SESSION_COOKIE => rotation.session_token = Some(value.to_string()),
                CSRF_COOKIE => rotation.csrf_token = Some(value.to_string()),
                _ => {}
            }
        }
        rotation
    }

    pub fn is_empty(&self) -> bool {
        self.session_token.is_none() && self.csrf_token.is_none()
    }
}
