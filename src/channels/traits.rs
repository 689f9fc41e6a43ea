use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One inbound chat event as delivered by an account's connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: Option<String>,
    pub author_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    /// Rows of interactive buttons attached to the message.
    #[serde(default)]
    pub components: Vec<ActionRow>,
    /// User ids mentioned by the message.
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub reference: Option<MessageReference>,
    /// User who triggered the interaction this message answers, if any.
    #[serde(default)]
    pub interaction_user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    #[serde(default)]
    pub image: Option<EmbedMedia>,
    #[serde(default)]
    pub thumbnail: Option<EmbedMedia>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRow {
    #[serde(default)]
    pub components: Vec<Button>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Button {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
}

/// Reply metadata: which message, and whose, this event answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReference {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ChatEvent {
    pub fn new(
        channel_id: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            author_id: author_id.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn with_mention(mut self, user_id: impl Into<String>) -> Self {
        self.mentions.push(user_id.into());
        self
    }

    pub fn with_reply_to(mut self, user_id: impl Into<String>) -> Self {
        self.reference = Some(MessageReference {
            message_id: None,
            user_id: Some(user_id.into()),
        });
        self
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.components.push(ActionRow {
            components: buttons,
        });
        self
    }

    pub fn first_embed(&self) -> Option<&Embed> {
        self.embeds.first()
    }

    pub fn has_buttons(&self) -> bool {
        self.components.iter().any(|row| !row.components.is_empty())
    }

    /// `#name` when the channel name is known, otherwise the raw id.
    pub fn channel_label(&self) -> String {
        match &self.channel_name {
            Some(name) => format!("#{name}"),
            None => self.channel_id.clone(),
        }
    }
}

impl Embed {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(EmbedMedia { url: url.into() });
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: false,
        });
        self
    }
}

impl Button {
    pub fn new(label: impl Into<String>, custom_id: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            custom_id: Some(custom_id.into()),
        }
    }
}

/// One account's connection to the chat platform.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Send a text message into a chat channel
    async fn send(&self, channel_id: &str, content: &str) -> anyhow::Result<()>;

    /// Trigger an interactive button on a received message
    async fn click_button(&self, event: &ChatEvent, custom_id: &str) -> anyhow::Result<()>;

    /// Start forwarding inbound events (long-running)
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChatEvent>) -> anyhow::Result<()>;

    /// Check if the connection is healthy
    async fn health_check(&self) -> bool {
        true
    }
}
