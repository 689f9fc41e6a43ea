use super::Classification;
use crate::catcher::rarity::{RarityTag, classify_catch};
use crate::config::NotificationConfig;
use crate::util::slugify_name;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

/// JSON body POSTed to a webhook destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    /// Mention text or empty; filled in at delivery time.
    pub content: String,
    pub embeds: Vec<WebhookEmbed>,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEmbed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    pub fields: Vec<WebhookField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<WebhookImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<WebhookFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookFooter {
    pub text: String,
}

fn field(name: &str, value: impl Into<String>) -> WebhookField {
    WebhookField {
        name: name.to_string(),
        value: value.into(),
        inline: true,
    }
}

/// Everything a catch notification shows.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchReport {
    pub account: String,
    pub name: String,
    pub rarity: Option<RarityTag>,
    pub level: u32,
    pub iv_percent: f64,
    pub is_shiny: bool,
    pub confidence: Option<f64>,
    pub latency_ms: Option<u64>,
    pub quota_remaining: Option<u64>,
}

impl CatchReport {
    pub fn classification(&self) -> Classification {
        classify_catch(self.is_shiny, self.rarity, self.iv_percent)
    }
}

/// Shared look of every embed: sender name, avatar, footer, thumbnails.
#[derive(Debug, Clone)]
pub struct EmbedStyle {
    pub username: String,
    pub avatar_url: Option<String>,
    pub footer_text: String,
    pub thumbnail_base_url: Option<String>,
}

impl EmbedStyle {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            username: config.username.clone(),
            avatar_url: config.avatar_url.clone(),
            footer_text: config.footer_text.clone(),
            thumbnail_base_url: config.thumbnail_base_url.clone(),
        }
    }

    pub fn wrap(&self, embed: WebhookEmbed) -> WebhookPayload {
        WebhookPayload {
            content: String::new(),
            embeds: vec![embed],
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }

    fn footer(&self) -> Option<WebhookFooter> {
        Some(WebhookFooter {
            text: self.footer_text.clone(),
        })
    }

    fn thumbnail_for(&self, name: &str) -> Option<WebhookImage> {
        let base = self.thumbnail_base_url.as_deref()?.trim_end_matches('/');
        let slug = slugify_name(name);
        if slug.is_empty() {
            return None;
        }
        Some(WebhookImage {
            url: format!("{base}/{slug}.webp"),
        })
    }
}

pub fn catch_title(classification: Classification, name: &str) -> String {
    let upper = name.to_uppercase();
    match classification {
        Classification::Shiny => format!("✨ SHINY {upper} CAUGHT! ✨"),
        Classification::Rare => format!("⭐ RARE {upper} CAUGHT!"),
        Classification::HighIv => format!("💎 HIGH IV {upper}"),
        Classification::LowIv => format!("❄️ LOW IV {upper}"),
        _ => format!("🎉 {upper} CAUGHT!"),
    }
}

pub fn catch_embed(style: &EmbedStyle, report: &CatchReport) -> WebhookEmbed {
    let classification = report.classification();
    let mut fields = vec![
        field("Account", report.account.clone()),
        field(
            "Rarity",
            report.rarity.map_or("normal", RarityTag::as_str),
        ),
        field("Level", report.level.to_string()),
        field("IV", format!("{:.1}%", report.iv_percent)),
    ];
    if let Some(confidence) = report.confidence {
        fields.push(field("🎯 Confidence", format!("{confidence:.2}%")));
    }
    if let Some(latency) = report.latency_ms {
        fields.push(field("⏱️ Latency", format!("{latency}ms")));
    }
    if let Some(quota) = report.quota_remaining {
        fields.push(field("📊 Quota Remaining", quota.to_string()));
    }

    WebhookEmbed {
        title: catch_title(classification, &report.name),
        description: None,
        color: classification.color(),
        fields,
        thumbnail: style.thumbnail_for(&report.name),
        footer: style.footer(),
        timestamp: Some(Utc::now().to_rfc3339()),
    }
}

pub fn challenge_detected_embed(style: &EmbedStyle, account: &str, channel: &str) -> WebhookEmbed {
    WebhookEmbed {
        title: "🤖 CAPTCHA DETECTED".into(),
        description: None,
        color: Classification::Challenge.color(),
        fields: vec![
            field("Account", account),
            field("Status", "Captcha Detected 🚨"),
            field("Channel", channel),
        ],
        thumbnail: None,
        footer: style.footer(),
        timestamp: Some(Utc::now().to_rfc3339()),
    }
}

pub fn challenge_solved_embed(
    style: &EmbedStyle,
    account: &str,
    solver: &str,
    elapsed: Duration,
) -> WebhookEmbed {
    WebhookEmbed {
        title: "🧩 CAPTCHA SOLVED".into(),
        description: None,
        color: Classification::ChallengeSolved.color(),
        fields: vec![
            field("Account", account),
            field("Status", "Captcha Solved ✅"),
            field("Solver", solver),
            field("Solve Time", format!("{}ms", elapsed.as_millis())),
        ],
        thumbnail: None,
        footer: style.footer(),
        timestamp: Some(Utc::now().to_rfc3339()),
    }
}
