// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use thiserror::Error;

/// Why a single logical portal call did not yield a usable payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// HTTP 400 whose message says the quest is already completed.
    /// Benign: callers treat it as success and never retry it.
    #[error("quest already completed")]
    AlreadyCompleted,

    /// HTTP 200 with an empty JSON object. The session is dead.
    #[error("empty payload, session is invalid or expired")]
    EmptyPayload,

    #[error("blocked by security checkpoint (status {status})")]
    Blocked { status: u16, detail: String },

    #[error("server error {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("unparseable response (status {status}): {detail}")]
    Parse { status: u16, detail: String },

    #[error("network error: {0}")]
    Network(String),
}

impl RequestError {
    /// Failures worth another attempt of the same request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RequestError::Blocked { .. }
                | RequestError::Server { .. }
                | RequestError::Parse { .. }
                | RequestError::Network(_)
        )
    }

    /// Failures that justify rerunning the whole dice-roll process.
    pub fn is_block_or_network(&self) -> bool {
        matches!(self, RequestError::Blocked { .. } | RequestError::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::AlreadyCompleted => Some(400),
            RequestError::EmptyPayload => Some(200),
            RequestError::Blocked { status, .. }
            | RequestError::Server { status, .. }
            | RequestError::Rejected { status, .. }
            | RequestError::Parse { status, .. } => Some(*status),
            RequestError::Network(_) => None,
        }
    }
}
