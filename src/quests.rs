// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Quest discovery: locating the dice quest and clearing one-time social quests.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::api::{Reply, RequestContext};
use crate::error::RequestError;
use crate::portal::{Portal, Quest, QuestKind, QuestStatus, UserQuest};

pub fn dice_quest_id(catalog: &[Quest]) -> Option<&str> {
    catalog
        .iter()
        .find(|quest| quest.kind() == QuestKind::DiceRoll)
        .map(|quest| quest.id.as_str())
}

/// Social quests in `catalog` the user has not completed yet, in catalog order.
pub fn pending_social_quests<'a>(catalog: &'a [Quest], history: &[UserQuest]) -> Vec<&'a Quest> {
    let completed: HashSet<&str> = history
        .iter()
        .filter(|row| row.status == QuestStatus::Completed)
        .map(|row| row.quest_id.as_str())
        .collect();

    catalog
        .iter()
        .filter(|quest| quest.kind() == QuestKind::Social)
        .filter(|quest| !completed.contains(quest.id.as_str()))
        .collect()
}

pub async fn resolve_dice_quest_id(portal: &Portal, ctx: &RequestContext) -> Reply<Option<String>> {
    let reply = portal
        .quests(ctx)
        .await
        .map(|catalog| dice_quest_id(&catalog).map(str::to_string));

    match &reply.result {
        Ok(Some(_)) => info!("found Daily Dice Roll quest id"),
        Ok(None) => warn!("Daily Dice Roll quest not found in quest catalog"),
        Err(e) => error!(error = %e, attempts = reply.attempts, "failed to fetch quest catalog"),
    }
    reply
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialSummary {
    pub completed: usize,
    pub already_done: usize,
    pub failed: usize,
}

/// Completes every pending social quest, one at a time with `pause` between
/// submissions. Catalog or history failures skip the step without error.
pub async fn run_social_quests(
    portal: &Portal,
    ctx: &RequestContext,
    pause: Duration,
) -> (RequestContext, SocialSummary) {
    let mut summary = SocialSummary::default();

    let catalog = portal.quests(ctx).await;
    let mut ctx = catalog.ctx;
    let catalog = match catalog.result {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(error = %e, "skipping social quests, catalog unavailable");
            return (ctx, summary);
        }
    };

    let history = portal.user_quests(&ctx).await;
    ctx = history.ctx;
    let history = match history.result {
        Ok(history) => history,
        Err(e) => {
            warn!(error = %e, "skipping social quests, quest history unavailable");
            return (ctx, summary);
        }
    };

    for quest in pending_social_quests(&catalog, &history) {
        let reply = portal.complete_quest(&ctx, &quest.id).await;
        ctx = reply.ctx;
        match reply.result {
            Ok(payload) => {
                let credits = payload.get("credits").cloned().unwrap_or_default();
                info!(quest = %quest.title, %credits, "social quest completed");
                summary.completed += 1;
            }
            Err(RequestError::AlreadyCompleted) => {
                warn!(quest = %quest.title, "social quest already done");
                summary.already_done += 1;
            }
            Err(e) => {
                error!(quest = %quest.title, error = %e, "social quest failed");
                summary.failed += 1;
            }
        }
        sleep(pause).await;
    }

    (ctx, summary)
}
