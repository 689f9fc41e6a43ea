pub mod bridge;
pub mod traits;

pub use bridge::{BridgeChannel, BridgeHub, OutboundAction};
pub use traits::{ActionRow, Button, Channel, ChatEvent, Embed, EmbedField, EmbedMedia, MessageReference};
