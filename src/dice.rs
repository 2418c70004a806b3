// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Daily dice roll state machine.
//!
//! One attempt runs `check status -> (not due) done` or
//! `check status -> (due) roll loop -> completed | already completed | abort`.
//! [`DiceRoller::run`] wraps attempts in a small randomized budget and only
//! starts another one after a block or network failure.

use chrono::{DateTime, Local, TimeDelta};
use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::api::RequestContext;
use crate::config::Settings;
use crate::error::RequestError;
use crate::portal::{Portal, QuestStatus, RollReport, UserQuest};

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// When a roll completed at `completed_at` may be rolled again: 24h plus a
/// one minute margin for clock skew.
pub fn next_roll_time(completed_at: DateTime<Local>) -> DateTime<Local> {
    completed_at + TimeDelta::hours(24) + TimeDelta::minutes(1)
}

/// Most recent completion timestamp recorded for `quest_id`.
pub fn latest_completion(history: &[UserQuest], quest_id: &str) -> Option<DateTime<Local>> {
    history
        .iter()
        .filter(|row| row.quest_id == quest_id && row.status == QuestStatus::Completed)
        .filter_map(UserQuest::updated_at)
        .max()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    Now,
    NotUntil(DateTime<Local>),
}

pub fn roll_due(history: &[UserQuest], quest_id: &str, now: DateTime<Local>) -> Due {
    match latest_completion(history, quest_id).map(next_roll_time) {
        Some(next) if now < next => Due::NotUntil(next),
        _ => Due::Now,
    }
}

/// Total check-then-roll attempts allowed for one account cycle:
/// uniformly 1 to `base + 2`.
pub fn attempt_budget(base: u32) -> u32 {
    rand::thread_rng().gen_range(1..=base.saturating_add(2))
}

#[derive(Debug, Clone, PartialEq)]
pub enum RollFailure {
    Request(RequestError),
    UnknownStatus(String),
    StillPending(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RollOutcome {
    NotDue {
        next_roll_at: DateTime<Local>,
    },
    Rolled {
        next_roll_at: DateTime<Local>,
        credits: f64,
        dice: Vec<u32>,
    },
    /// The submission was answered with "quest already completed".
    AlreadyCompleted {
        next_roll_at: DateTime<Local>,
    },
    Failed {
        next_roll_at: DateTime<Local>,
        reason: RollFailure,
    },
}

impl RollOutcome {
    pub fn completed_today(&self) -> bool {
        !matches!(self, RollOutcome::Failed { .. })
    }

    pub fn next_roll_at(&self) -> DateTime<Local> {
        match self {
            RollOutcome::NotDue { next_roll_at }
            | RollOutcome::Rolled { next_roll_at, .. }
            | RollOutcome::AlreadyCompleted { next_roll_at }
            | RollOutcome::Failed { next_roll_at, .. } => *next_roll_at,
        }
    }

    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            RollOutcome::Failed {
                reason: RollFailure::Request(e),
                ..
            } if e.is_block_or_network()
        )
    }
}

pub struct DiceRoller<'a> {
    portal: &'a Portal,
    settings: &'a Settings,
}

impl<'a> DiceRoller<'a> {
    pub fn new(portal: &'a Portal, settings: &'a Settings) -> Self {
        Self { portal, settings }
    }

    pub async fn run(&self, ctx: &RequestContext, quest_id: &str) -> (RequestContext, RollOutcome) {
        self.run_with_budget(ctx, quest_id, attempt_budget(self.settings.dice_retries_base))
            .await
    }

    pub async fn run_with_budget(
        &self,
        ctx: &RequestContext,
        quest_id: &str,
        budget: u32,
    ) -> (RequestContext, RollOutcome) {
        let budget = budget.max(1);
        let mut ctx = ctx.clone();
        let mut attempt = 1;

        loop {
            info!(attempt, budget, quest_id, "starting dice roll process");
            let (next_ctx, outcome) = self.check_and_roll(&ctx, quest_id).await;
            ctx = next_ctx;

            if outcome.completed_today() {
                info!(attempt, "dice roll done for today");
                return (ctx, outcome);
            }
            if !outcome.should_retry() {
                warn!(attempt, ?outcome, "dice roll failed, not retrying");
                return (ctx, outcome);
            }
            if attempt >= budget {
                warn!(budget, "dice roll not completed after all attempts");
                return (ctx, outcome);
            }

            let delay = self.settings.dice_retry_delay.sample();
            warn!(
                attempt,
                budget,
                delay_s = delay.as_secs(),
                "dice roll hit block or network error, retrying whole process"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// One pass: consult the completion history, then roll if due.
    pub async fn check_and_roll(
        &self,
        ctx: &RequestContext,
        quest_id: &str,
    ) -> (RequestContext, RollOutcome) {
        let history = self.portal.user_quests(ctx).await;
        let ctx = history.ctx;

        match history.result {
            Ok(rows) => {
                if let Due::NotUntil(next_roll_at) = roll_due(&rows, quest_id, Local::now()) {
                    warn!(
                        next = %next_roll_at.format(DATE_FORMAT),
                        "dice roll not due yet"
                    );
                    return (ctx, RollOutcome::NotDue { next_roll_at });
                }
            }
            // Rolling blind may double-submit if a lost response had already
            // been processed; the portal rejects the duplicate with a 400.
            Err(e) if e.is_block_or_network() => {
                warn!(error = %e, "cannot check dice status, rolling anyway");
            }
            Err(e) => {
                warn!(error = %e, "dice status unavailable, rolling anyway");
            }
        }

        self.roll(ctx, quest_id).await
    }

    async fn roll(&self, mut ctx: RequestContext, quest_id: &str) -> (RequestContext, RollOutcome) {
        let mut credits = 0.0;
        let mut dice: Vec<u32> = Vec::new();
        let mut pending_polls = 0;

        loop {
            let delay = self.settings.pre_roll.sample();
            info!(quest_id, delay_ms = delay.as_millis() as u64, "submitting dice roll");
            sleep(delay).await;

            let reply = self.portal.complete_quest(&ctx, quest_id).await;
            ctx = reply.ctx;

            let payload = match reply.result {
                Ok(payload) => payload,
                Err(RequestError::AlreadyCompleted) => {
                    warn!(quest_id, "dice roll already completed");
                    let (ctx, next_roll_at) = self.recover_next_roll_time(ctx, quest_id).await;
                    return (ctx, RollOutcome::AlreadyCompleted { next_roll_at });
                }
                Err(e) => {
                    error!(error = %e, status = ?e.status(), "dice roll submission failed");
                    return (ctx, failed(RollFailure::Request(e)));
                }
            };

            let report: RollReport = match serde_json::from_value(payload) {
                Ok(report) => report,
                Err(e) => {
                    let err = RequestError::Parse {
                        status: 200,
                        detail: e.to_string(),
                    };
                    error!(error = %err, "dice roll response has unexpected shape");
                    return (ctx, failed(RollFailure::Request(err)));
                }
            };

            credits += report.credits.unwrap_or(0.0);
            let rolled = report.dice_rolls.clone().unwrap_or_default();
            info!(
                status = ?report.status,
                credits = report.credits.unwrap_or(0.0),
                dice = ?rolled,
                "roll"
            );
            dice.extend(rolled);

            match report.status {
                QuestStatus::Completed => {
                    let next_roll_at = report
                        .updated_at()
                        .map(next_roll_time)
                        .unwrap_or_else(|| next_roll_time(Local::now()));
                    info!(total_credits = credits, dice = ?dice, next = %next_roll_at.format(DATE_FORMAT), "dice roll completed");
                    return (
                        ctx,
                        RollOutcome::Rolled {
                            next_roll_at,
                            credits,
                            dice,
                        },
                    );
                }
                QuestStatus::Pending => {
                    pending_polls += 1;
                    if pending_polls >= self.settings.max_pending_polls {
                        error!(pending_polls, "dice roll still pending, giving up");
                        return (ctx, failed(RollFailure::StillPending(pending_polls)));
                    }
                    sleep(self.settings.pending_poll).await;
                }
                QuestStatus::Other(status) => {
                    error!(%status, "unknown dice status, stopping");
                    return (ctx, failed(RollFailure::UnknownStatus(status)));
                }
            }
        }
    }

    /// After an "already completed" answer, the history is the only place to
    /// learn when the roll happened. Falls back to now + 24h1m.
    async fn recover_next_roll_time(
        &self,
        ctx: RequestContext,
        quest_id: &str,
    ) -> (RequestContext, DateTime<Local>) {
        let history = self.portal.user_quests(&ctx).await;
        let completed = match &history.result {
            Ok(rows) => latest_completion(rows, quest_id),
            Err(e) => {
                warn!(error = %e, "cannot fetch quest history, using default next roll time");
                None
            }
        };
        let next = completed
            .map(next_roll_time)
            .unwrap_or_else(|| next_roll_time(Local::now()));
        (history.ctx, next)
    }
}

fn failed(reason: RollFailure) -> RollOutcome {
    RollOutcome::Failed {
        next_roll_at: next_roll_time(Local::now()),
        reason,
    }
}
