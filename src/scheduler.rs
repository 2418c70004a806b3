// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Cycle scheduler: walks every account in order, then sleeps until the
//! earliest account can roll again.

use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::account::AccountRunner;
use crate::config::Settings;
use crate::dice::next_roll_time;
use crate::portal::Portal;
use crate::session::Session;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const DONE_PAD: Duration = Duration::from_secs(60);
const RETRY_PAD: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    pub accounts: usize,
    pub next_roll_times: Vec<DateTime<Local>>,
    /// Every account's dice roll is done for its current cooldown.
    pub all_rolled: bool,
}

pub fn earliest_next_roll(times: &[DateTime<Local>], now: DateTime<Local>) -> DateTime<Local> {
    times
        .iter()
        .copied()
        .min()
        .unwrap_or_else(|| next_roll_time(now))
}

/// How long to sleep after a cycle. Never negative; never shorter than a
/// day when every roll is done, never shorter than the minimum cycle wait
/// otherwise.
pub fn cycle_wait(summary: &CycleSummary, now: DateTime<Local>, settings: &Settings) -> Duration {
    if summary.accounts == 0 {
        return settings.idle_wait;
    }

    let earliest = earliest_next_roll(&summary.next_roll_times, now);
    let until_earliest = (earliest - now).to_std().unwrap_or(Duration::ZERO);

    if summary.all_rolled {
        until_earliest.max(DAY) + DONE_PAD
    } else {
        until_earliest.max(settings.min_cycle_wait) + RETRY_PAD
    }
}

pub struct Scheduler {
    portal: Portal,
    settings: Settings,
    accounts: Vec<Session>,
    proxy_count: usize,
}

impl Scheduler {
    pub fn new(portal: Portal, settings: Settings, accounts: Vec<Session>, proxy_count: usize) -> Self {
        Self {
            portal,
            settings,
            accounts,
            proxy_count,
        }
    }

    fn proxy_for(&self, index: usize) -> Option<usize> {
        if self.settings.use_proxy && self.proxy_count > 0 {
            Some(index % self.proxy_count)
        } else {
            None
        }
    }

    /// One pass over all accounts, strictly one after another.
    pub async fn run_cycle(&mut self) -> CycleSummary {
        let total = self.accounts.len();
        let mut summary = CycleSummary {
            accounts: total,
            next_roll_times: Vec::with_capacity(total),
            all_rolled: total > 0,
        };
        info!(
            accounts = total,
            delay_s = self.settings.between_accounts.as_secs(),
            "starting cycle"
        );

        for index in 0..total {
            info!("========== Account {} / {} ==========", index + 1, total);
            let proxy = self.proxy_for(index);
            let report = AccountRunner::new(&self.portal, &self.settings)
                .process(&self.accounts[index], proxy)
                .await;

            summary.next_roll_times.push(report.next_roll_at);
            summary.all_rolled &= report.rolled_today;
            info!(
                account = index + 1,
                success = report.success,
                rolled_today = report.rolled_today,
                "account finished"
            );
            self.accounts[index] = report.session;

            if index + 1 < total {
                sleep(self.settings.between_accounts).await;
            }
        }

        summary
    }

    /// Runs a cycle and sleeps until the next one is due. Returns the wait.
    pub async fn tick(&mut self) -> Duration {
        let summary = self.run_cycle().await;
        let now = Local::now();
        let wait = cycle_wait(&summary, now, &self.settings);

        if summary.accounts == 0 {
            warn!("no accounts configured, idling");
        } else if summary.all_rolled {
            info!("all accounts have rolled for today");
        } else {
            warn!("not every account completed its dice roll");
        }

        let resume_at = TimeDelta::from_std(wait)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now);
        info!(
            wait_min = wait.as_secs() / 60,
            next_cycle = %resume_at.format("%d/%m/%Y %H:%M:%S"),
            "cycle complete"
        );
        sleep(wait).await;
        wait
    }

    pub async fn run_forever(&mut self) {
        loop {
            self.tick().await;
        }
    }
}
