// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Flat-file inputs: the account list and the optional proxy list.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::session::Session;

/// Reads `sessionToken|csrfToken` lines. Blank and malformed lines are
/// skipped with a warning.
pub fn load_accounts(path: &Path) -> Result<Vec<Session>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read account file {}", path.display()))?;
    let accounts = parse_accounts(&content);
    info!(path = %path.display(), count = accounts.len(), "loaded accounts");
    Ok(accounts)
}

pub fn parse_accounts(content: &str) -> Vec<Session> {
    let mut accounts = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split('|');
        let session = parts.next().unwrap_or("");
        let csrf = parts.next().unwrap_or("");
        match Session::new(session, csrf) {
            Ok(account) => accounts.push(account),
            Err(_) => warn!(
                line = number + 1,
                "invalid account line, expected sessionToken|csrfToken"
            ),
        }
    }
    accounts
}

/// Reads proxy URLs, one per line. A missing file yields an empty list.
pub fn load_proxies(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => parse_proxies(&content),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no proxy list loaded");
            Vec::new()
        }
    }
}

pub fn parse_proxies(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.starts_with("http://") || line.starts_with("https://") {
                line.to_string()
            } else {
                format!("http://{}", line)
            }
        })
        .collect()
}
