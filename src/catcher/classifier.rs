//! Pure predicates and extractors over inbound game-bot events.
//!
//! Everything here is template matching against the game bot's fixed message
//! formats. A miss is never an error: callers log it and move on.

use crate::accounts::Account;
use crate::channels::traits::ChatEvent;
use regex::Regex;
use std::sync::LazyLock;

const SPAWN_MARKERS: &[&str] = &[
    "a wild pokémon has appeared",
    "a wild pokemon has appeared",
    "guess the pokémon",
    "guess the pokemon",
];

const SUCCESS_MARKERS: &[&str] = &["congratulations", "you caught"];

const SHINY_MARKERS: &[&str] = &["✨", "shiny", "unusual"];

const CHALLENGE_MARKERS: &[&str] = &["verify.poketwo.net/captcha", "captcha", "are you a human"];

const ONBOARDING_MARKERS: &[&str] = &[
    "pick a starter",
    "pick your starter",
    "choose a starter",
    "before using this command",
];

const CONFIRM_LABELS: &[&str] = &["confirm", "accept"];

static LEVEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Level\s+(\d+)").expect("static level pattern"));

// The name runs from after the level number up to the first tag (`<`) or
// parenthesis, whichever comes first.
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Level\s+\d+\s+([^<(\n]+?)\s*[<(]").expect("static name pattern")
});

static IV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+(?:\.\d+)?)%").expect("static iv pattern"));

static FIRST_INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*").expect("static integer pattern"));

/// Fields parsed out of a catch confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub level: u32,
    pub name: String,
    pub iv_percent: f64,
    pub is_shiny: bool,
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| haystack.contains(marker))
}

/// Lower-cased title and description of the first embed.
fn first_embed_text(event: &ChatEvent) -> String {
    let Some(embed) = event.first_embed() else {
        return String::new();
    };
    let mut text = String::new();
    if let Some(title) = &embed.title {
        text.push_str(title);
    }
    if let Some(description) = &embed.description {
        text.push('\n');
        text.push_str(description);
    }
    text.to_lowercase()
}

/// Message content plus every embed title and description, original case.
fn full_text(event: &ChatEvent) -> String {
    let mut text = event.content.clone();
    for embed in &event.embeds {
        for part in [&embed.title, &embed.description].into_iter().flatten() {
            text.push('\n');
            text.push_str(part);
        }
    }
    text
}

pub fn is_spawn(event: &ChatEvent) -> bool {
    contains_any(&first_embed_text(event), SPAWN_MARKERS)
}

/// Image reference of a spawn: the embed image, falling back to its thumbnail.
pub fn spawn_image_url(event: &ChatEvent) -> Option<&str> {
    let embed = event.first_embed()?;
    embed
        .image
        .as_ref()
        .or(embed.thumbnail.as_ref())
        .map(|media| media.url.as_str())
        .filter(|url| !url.trim().is_empty())
}

pub fn is_success_marker(event: &ChatEvent) -> bool {
    contains_any(&full_text(event).to_lowercase(), SUCCESS_MARKERS)
}

pub fn extract_confirmation(event: &ChatEvent) -> Option<Confirmation> {
    parse_confirmation(&full_text(event))
}

/// Parse `... Level <n> <Name> ... (<iv>%) ...`. All three fields are required.
pub fn parse_confirmation(text: &str) -> Option<Confirmation> {
    let level = LEVEL_RE.captures(text)?.get(1)?.as_str().parse().ok()?;
    let name = NAME_RE
        .captures(text)?
        .get(1)?
        .as_str()
        .trim_matches(|c: char| c.is_whitespace() || c == '✨')
        .to_string();
    if name.is_empty() {
        return None;
    }
    let iv_percent = IV_RE.captures(text)?.get(1)?.as_str().parse().ok()?;
    let is_shiny = contains_any(&text.to_lowercase(), SHINY_MARKERS);

    Some(Confirmation {
        level,
        name,
        iv_percent,
        is_shiny,
    })
}

/// Whether an event addresses `account` when several accounts share a channel.
pub fn is_for_account(event: &ChatEvent, account: &Account) -> bool {
    if event.mentions.iter().any(|id| id == &account.user_id) {
        return true;
    }
    let content = &event.content;
    if content.contains(&format!("<@{}>", account.user_id))
        || content.contains(&format!("<@!{}>", account.user_id))
    {
        return true;
    }
    let lowered = content.to_lowercase();
    let names = [account.display_name(), account.username.as_str()];
    if names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .any(|name| lowered.contains(&name.to_lowercase()))
    {
        return true;
    }
    event
        .reference
        .as_ref()
        .and_then(|reference| reference.user_id.as_deref())
        .is_some_and(|id| id == account.user_id)
}

pub fn is_challenge(event: &ChatEvent) -> bool {
    contains_any(&full_text(event).to_lowercase(), CHALLENGE_MARKERS)
}

pub fn is_onboarding_prompt(event: &ChatEvent) -> bool {
    contains_any(&full_text(event).to_lowercase(), ONBOARDING_MARKERS)
}

pub fn is_terms_of_service(event: &ChatEvent) -> bool {
    first_embed_text(event).contains("terms of service")
}

/// Balance embed for `display_name`: the first integer of the first field.
pub fn balance_reply(event: &ChatEvent, display_name: &str) -> Option<u64> {
    let embed = event.first_embed()?;
    let title = embed.title.as_deref()?.to_lowercase();
    if !title.contains("balance") || !title.contains(&display_name.to_lowercase()) {
        return None;
    }
    let field = embed.fields.first()?;
    let digits = FIRST_INT_RE.find(&field.value)?.as_str().replace(',', "");
    digits.parse().ok()
}

/// First button whose label reads like a confirmation, as its custom id.
pub fn confirm_button(event: &ChatEvent) -> Option<&str> {
    event
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .find(|button| {
            button
                .label
                .as_deref()
                .is_some_and(|label| contains_any(&label.to_lowercase(), CONFIRM_LABELS))
        })
        .and_then(|button| button.custom_id.as_deref())
}

/// Buttons are only pressed for prompts aimed squarely at this account.
pub fn is_addressed_for_click(event: &ChatEvent, account: &Account) -> bool {
    event.mentions.iter().any(|id| id == &account.user_id)
        || event
            .reference
            .as_ref()
            .and_then(|reference| reference.user_id.as_deref())
            .is_some_and(|id| id == account.user_id)
        || event
            .interaction_user_id
            .as_deref()
            .is_some_and(|id| id == account.user_id)
}
