//! JSON-lines bridge: the connection layer lives in another process and
//! exchanges events and actions with the daemon over stdin/stdout.
//!
//! Inbound line:  `{"account": "main", "event": { ...ChatEvent... }}`
//! Outbound line: `{"account": "main", "action": "send", "channel_id": "...", "content": "..."}`

use super::traits::{Channel, ChatEvent};
use crate::accounts::AccountId;
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    account: AccountId,
    event: ChatEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundAction {
    Send {
        account: AccountId,
        channel_id: String,
        content: String,
    },
    Click {
        account: AccountId,
        channel_id: String,
        message_id: String,
        custom_id: String,
    },
}

/// Routes inbound lines to per-account listeners and serializes outbound actions.
pub struct BridgeHub {
    routes: Mutex<HashMap<AccountId, mpsc::Sender<ChatEvent>>>,
    outbound_tx: mpsc::UnboundedSender<OutboundAction>,
    outbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<OutboundAction>>,
}

impl BridgeHub {
    pub fn new() -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
        })
    }

    pub fn channel_for(self: &Arc<Self>, account: AccountId) -> BridgeChannel {
        BridgeChannel {
            account,
            hub: Arc::clone(self),
        }
    }

    fn attach(&self, account: &AccountId, tx: mpsc::Sender<ChatEvent>) {
        self.routes.lock().insert(account.clone(), tx);
    }

    /// Drop the route only while it still points at `tx`; a restarted
    /// listener may already have replaced it.
    fn detach(&self, account: &AccountId, tx: &mpsc::Sender<ChatEvent>) {
        let mut routes = self.routes.lock();
        if routes
            .get(account)
            .is_some_and(|current| current.same_channel(tx))
        {
            routes.remove(account);
        }
    }

    pub fn listening(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.routes.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn emit(&self, action: OutboundAction) -> anyhow::Result<()> {
        self.outbound_tx
            .send(action)
            .map_err(|_| anyhow::anyhow!("bridge outbound queue closed"))
    }

    /// Route one inbound line. Returns whether it reached a listener.
    pub async fn dispatch_line(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        let envelope: InboundEnvelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!("Ignoring malformed bridge line: {e}");
                return false;
            }
        };

        let sender = self.routes.lock().get(&envelope.account).cloned();
        let Some(sender) = sender else {
            tracing::debug!(account = %envelope.account, "No listener for bridge event");
            return false;
        };
        if sender.send(envelope.event).await.is_err() {
            self.detach(&envelope.account, &sender);
            return false;
        }
        true
    }

    /// Read inbound lines until EOF.
    pub async fn pump_inbound<R>(&self, reader: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read bridge input")?
        {
            self.dispatch_line(&line).await;
        }
        tracing::info!("Bridge input closed");
        Ok(())
    }

    /// Write outbound actions as JSON lines until every sender is gone.
    pub async fn drain_outbound<W>(&self, mut writer: W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut rx = self.outbound_rx.lock().await;
        while let Some(action) = rx.recv().await {
            let mut line = serde_json::to_string(&action)?;
            line.push('\n');
            writer
                .write_all(line.as_bytes())
                .await
                .context("Failed to write bridge output")?;
            writer.flush().await?;
        }
        Ok(())
    }
}

/// One account's view of the bridge.
pub struct BridgeChannel {
    account: AccountId,
    hub: Arc<BridgeHub>,
}

#[async_trait]
impl Channel for BridgeChannel {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn send(&self, channel_id: &str, content: &str) -> anyhow::Result<()> {
        self.hub.emit(OutboundAction::Send {
            account: self.account.clone(),
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        })
    }

    async fn click_button(&self, event: &ChatEvent, custom_id: &str) -> anyhow::Result<()> {
        self.hub.emit(OutboundAction::Click {
            account: self.account.clone(),
            channel_id: event.channel_id.clone(),
            message_id: event.id.clone(),
            custom_id: custom_id.to_string(),
        })
    }

    async fn listen(&self, tx: mpsc::Sender<ChatEvent>) -> anyhow::Result<()> {
        self.hub.attach(&self.account, tx.clone());
        tx.closed().await;
        self.hub.detach(&self.account, &tx);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        !self.hub.outbound_tx.is_closed()
    }
}
