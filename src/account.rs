// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Per-account pipeline: session check, profile, social quests, dice roll.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::api::RequestContext;
use crate::config::Settings;
use crate::dice::{next_roll_time, DiceRoller};
use crate::error::RequestError;
use crate::portal::Portal;
use crate::quests::{resolve_dice_quest_id, run_social_quests, SocialSummary};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct AccountReport {
    /// Every step up to and including the dice step ran.
    pub success: bool,
    pub next_roll_at: DateTime<Local>,
    /// The dice roll is done (or was not due) for the current cooldown.
    pub rolled_today: bool,
    /// Credentials after all rotations seen during this run.
    pub session: Session,
}

pub struct AccountRunner<'a> {
    portal: &'a Portal,
    settings: &'a Settings,
}

impl<'a> AccountRunner<'a> {
    pub fn new(portal: &'a Portal, settings: &'a Settings) -> Self {
        Self { portal, settings }
    }

    /// Never fails: any error ends this account's run with a failed report.
    pub async fn process(&self, session: &Session, proxy: Option<usize>) -> AccountReport {
        let mut ctx = RequestContext::new(session.clone(), proxy);
        match self.run_steps(&mut ctx).await {
            Ok(report) => report,
            Err(e) => {
                error!(account = %ctx.session.tail(), "account failed: {:#}", e);
                AccountReport {
                    success: false,
                    next_roll_at: next_roll_time(Local::now()),
                    rolled_today: false,
                    session: ctx.session,
                }
            }
        }
    }

    async fn run_steps(&self, ctx: &mut RequestContext) -> Result<AccountReport> {
        if self.settings.use_proxy && ctx.proxy.is_some() {
            let ip = self.portal.egress_ip(ctx.proxy).await;
            info!(%ip, account = %ctx.session.tail(), "using proxy");
        } else {
            info!(account = %ctx.session.tail(), "no proxy");
        }

        self.authenticate(ctx).await?;

        let settle = self.settings.auth_settle.sample();
        info!(delay_s = settle.as_secs_f32(), "waiting before next call");
        sleep(settle).await;

        let profile = self.portal.profile(ctx).await;
        *ctx = profile.ctx;
        let profile = profile.result.context("Failed to fetch user profile")?;
        info!(
            email = profile.email.as_deref().unwrap_or("unknown"),
            ref_code = profile.ref_code.as_deref().unwrap_or("unknown"),
            "account"
        );

        let (next_ctx, social) =
            run_social_quests(self.portal, ctx, self.settings.between_social_quests).await;
        *ctx = next_ctx;
        if social != SocialSummary::default() {
            info!(
                completed = social.completed,
                already_done = social.already_done,
                failed = social.failed,
                "social quests processed"
            );
        }

        let dice_id = resolve_dice_quest_id(self.portal, ctx).await;
        *ctx = dice_id.ctx;
        let dice_id = dice_id
            .result
            .context("Failed to fetch quest catalog")?
            .ok_or_else(|| anyhow!("Daily Dice Roll quest id is unavailable"))?;

        let (next_ctx, outcome) = DiceRoller::new(self.portal, self.settings)
            .run(ctx, &dice_id)
            .await;
        *ctx = next_ctx;

        Ok(AccountReport {
            success: true,
            next_roll_at: outcome.next_roll_at(),
            rolled_today: outcome.completed_today(),
            session: ctx.session.clone(),
        })
    }

    /// Bounded session check. An empty session payload means the token is
    /// dead and is not retried.
    async fn authenticate(&self, ctx: &mut RequestContext) -> Result<()> {
        let max_attempts = self.settings.max_auth_retries.max(1);
        let mut attempt = 1;
        loop {
            let reply = self.portal.check_session(ctx).await;
            *ctx = reply.ctx;
            match reply.result {
                Ok(info) => {
                    info!(
                        attempt,
                        user = info.user.email.as_deref().unwrap_or("unknown"),
                        "session valid"
                    );
                    return Ok(());
                }
                Err(RequestError::EmptyPayload) => {
                    bail!("session payload is empty, token is invalid or expired")
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.settings.request_delay.sample();
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        delay_s = delay.as_secs(),
                        "session check failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("session check failed after {} attempt(s)", attempt))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiClient, Backoff};
    use crate::http::{Method, UserAgents};
    use crate::test_support::*;
    use serde_json::json;
    use std::sync::Arc;

    fn setup(transport: Arc<ScriptedTransport>) -> (Portal, Settings) {
        let settings = instant_settings();
        let api = ApiClient::new(transport, UserAgents::default(), Backoff::immediate());
        let portal = Portal::new(api, settings.endpoints.clone(), settings.max_get_retries);
        (portal, settings)
    }

    fn script_happy_path(transport: &ScriptedTransport) {
        transport.on(
            Method::Get,
            AUTH_URL,
            json_response(200, json!({"user": {"email": "a@b.c"}}))
                .with_cookie("__Secure-next-auth.session-token=rotated; Path=/"),
        );
        transport.on(
            Method::Get,
            USER_URL,
            json_response(200, json!({"data": {"email": "a@b.c", "refCode": "REF"}})),
        );
        transport.on(
            Method::Get,
            QUESTS_URL,
            json_response(200, json!({"data": [{"id": "d1", "title": "Daily Dice Roll"}]})),
        );
        transport.on(Method::Get, USER_QUESTS_URL, json_response(200, json!({"data": []})));
        transport.on(
            Method::Post,
            USER_QUESTS_URL,
            json_response(
                200,
                json!({"data": {"status": "COMPLETED", "credits": 5, "_diceRolls": [3], "updatedAt": "2025-05-29T10:00:00Z"}}),
            ),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_pipeline_rolls_and_threads_tokens() {
        let transport = ScriptedTransport::new();
        script_happy_path(&transport);
        let (portal, settings) = setup(transport.clone());
        let session = Session::new("original", "csrf").unwrap();

        let report = AccountRunner::new(&portal, &settings).process(&session, None).await;

        assert!(report.success);
        assert!(report.rolled_today);
        assert_eq!(report.session.session_token(), "rotated");
        assert_eq!(
            report.next_roll_at,
            next_roll_time(crate::portal::parse_timestamp("2025-05-29T10:00:00Z").unwrap())
        );
        let post_cookies = transport.cookies(Method::Post, USER_QUESTS_URL);
        assert!(post_cookies.iter().all(|c| c.contains("session-token=rotated")));
    }

    #[tokio::test(start_paused = true)]
    async fn dead_session_is_not_retried() {
        let transport = ScriptedTransport::new();
        transport.on(Method::Get, AUTH_URL, json_response(200, json!({})));
        let (portal, settings) = setup(transport.clone());
        let session = Session::new("dead", "csrf").unwrap();

        let report = AccountRunner::new(&portal, &settings).process(&session, None).await;

        assert!(!report.success);
        assert!(!report.rolled_today);
        assert_eq!(transport.count(Method::Get, AUTH_URL), 1);
        assert_eq!(transport.count(Method::Get, USER_URL), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_session_check_is_retried_up_to_limit() {
        let transport = ScriptedTransport::new();
        transport.on(Method::Get, AUTH_URL, json_response(429, json!({})));
        let (portal, settings) = setup(transport.clone());
        let session = Session::new("s", "c").unwrap();

        let report = AccountRunner::new(&portal, &settings).process(&session, None).await;

        assert!(!report.success);
        assert_eq!(transport.count(Method::Get, AUTH_URL) as u32, settings.max_auth_retries);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_dice_quest_fails_account_without_rolling() {
        let transport = ScriptedTransport::new();
        transport.on(Method::Get, AUTH_URL, json_response(200, json!({"user": {"email": "x"}})));
        transport.on(Method::Get, USER_URL, json_response(200, json!({"data": {"email": "x"}})));
        transport.on(Method::Get, QUESTS_URL, json_response(200, json!({"data": []})));
        transport.on(Method::Get, USER_QUESTS_URL, json_response(200, json!({"data": []})));
        let (portal, settings) = setup(transport.clone());
        let session = Session::new("s", "c").unwrap();

        let report = AccountRunner::new(&portal, &settings).process(&session, None).await;

        assert!(!report.success);
        assert!(!report.rolled_today);
        assert_eq!(transport.count(Method::Post, USER_QUESTS_URL), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn proxied_account_checks_egress_before_session() {
        let transport = ScriptedTransport::new();
        script_happy_path(&transport);
        transport.on(
            Method::Get,
            crate::http::IP_ECHO_URL,
            json_response(200, json!({"ip": "10.0.0.7"})),
        );
        let (portal, mut settings) = setup(transport.clone());
        settings.use_proxy = true;
        let session = Session::new("s", "c").unwrap();

        let report = AccountRunner::new(&portal, &settings).process(&session, Some(0)).await;

        assert!(report.success);
        let sent = transport.requests();
        assert_eq!(sent[0].url, crate::http::IP_ECHO_URL);
        assert_eq!(sent[0].proxy, Some(0));
        assert_eq!(sent[1].url, AUTH_URL);
        assert!(sent.iter().all(|r| r.proxy == Some(0)));
    }
}
