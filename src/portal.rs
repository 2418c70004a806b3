// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Typed access to the four portal endpoints and their wire types.

use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{ApiCall, ApiClient, Endpoint, Reply, RequestContext};
use crate::config::{Endpoints, PORTAL_REFERER};
use crate::http::{self, Method};

pub const DICE_QUEST_TITLE: &str = "Daily Dice Roll";
pub const SOCIAL_QUEST_PREFIX: &str = "Follow ";
pub const EXCLUDED_SOCIAL_QUEST: &str = "Follow Discord Server";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Quest {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestKind {
    DiceRoll,
    Social,
    Other,
}

impl Quest {
    pub fn kind(&self) -> QuestKind {
        if self.title == DICE_QUEST_TITLE {
            QuestKind::DiceRoll
        } else if self.title.starts_with(SOCIAL_QUEST_PREFIX) && self.title != EXCLUDED_SOCIAL_QUEST {
            QuestKind::Social
        } else {
            QuestKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum QuestStatus {
    Pending,
    Completed,
    Other(String),
}

impl From<String> for QuestStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PENDING" => QuestStatus::Pending,
            "COMPLETED" => QuestStatus::Completed,
            _ => QuestStatus::Other(raw),
        }
    }
}

/// One row of the user's quest completion history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuest {
    pub quest_id: String,
    pub status: QuestStatus,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl UserQuest {
    pub fn updated_at(&self) -> Option<DateTime<Local>> {
        self.updated_at.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub ref_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub user: SessionUser,
}

/// Body of a dice-roll submission.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollReport {
    pub status: QuestStatus,
    #[serde(default)]
    pub credits: Option<f64>,
    #[serde(default, rename = "_diceRolls")]
    pub dice_rolls: Option<Vec<u32>>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl RollReport {
    pub fn updated_at(&self) -> Option<DateTime<Local>> {
        self.updated_at.as_deref().and_then(parse_timestamp)
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Local))
}

pub struct Portal {
    api: ApiClient,
    endpoints: Endpoints,
    max_get_attempts: u32,
}

impl Portal {
    pub fn new(api: ApiClient, endpoints: Endpoints, max_get_attempts: u32) -> Self {
        Self {
            api,
            endpoints,
            max_get_attempts,
        }
    }

    fn get(&self, endpoint: Endpoint, url: &str) -> ApiCall {
        ApiCall {
            method: Method::Get,
            endpoint,
            url: url.to_string(),
            referer: PORTAL_REFERER.to_string(),
            payload: None,
        }
    }

    /// Single attempt; the caller owns the session retry policy.
    pub async fn check_session(&self, ctx: &RequestContext) -> Reply<SessionInfo> {
        let call = self.get(Endpoint::AuthSession, &self.endpoints.auth_session);
        self.api.request(&call, ctx, 1).await.decode()
    }

    pub async fn profile(&self, ctx: &RequestContext) -> Reply<Profile> {
        let call = self.get(Endpoint::User, &self.endpoints.user);
        self.api.request(&call, ctx, self.max_get_attempts).await.decode()
    }

    pub async fn quests(&self, ctx: &RequestContext) -> Reply<Vec<Quest>> {
        let call = self.get(Endpoint::Quests, &self.endpoints.quests);
        self.api.request(&call, ctx, self.max_get_attempts).await.decode()
    }

    pub async fn user_quests(&self, ctx: &RequestContext) -> Reply<Vec<UserQuest>> {
        let call = self.get(Endpoint::UserQuests, &self.endpoints.user_quests);
        self.api.request(&call, ctx, self.max_get_attempts).await.decode()
    }

    /// Submits a quest action. Never retried: a resubmission could double-act.
    pub async fn complete_quest(&self, ctx: &RequestContext, quest_id: &str) -> Reply<Value> {
        let call = ApiCall {
            method: Method::Post,
            endpoint: Endpoint::UserQuests,
            url: self.endpoints.user_quests.clone(),
            referer: PORTAL_REFERER.to_string(),
            payload: Some(json!({ "questId": quest_id, "metadata": {} })),
        };
        self.api.request(&call, ctx, 1).await
    }

    pub async fn egress_ip(&self, proxy: Option<usize>) -> String {
        http::egress_ip(self.api.transport(), proxy).await
    }
}
