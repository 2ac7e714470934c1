// ABOUTME: Routes replies onto a chat's notify topic
// ABOUTME: Translatable replies are resolved to plain text before publishing

use crate::i18n::Localize;
use crate::reply::{Reply, ReplyKind, TranslationRequest};
use crate::repository::ChatRepository;
use crate::topic::{self, templates};
use crate::transport::{publish_json, Transport};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Delivers replies to chats over the transport.
pub struct ChatNotifier {
    transport: Arc<dyn Transport>,
    chats: Arc<dyn ChatRepository>,
    localizer: Arc<dyn Localize>,
}

impl ChatNotifier {
    pub fn new(
        transport: Arc<dyn Transport>,
        chats: Arc<dyn ChatRepository>,
        localizer: Arc<dyn Localize>,
    ) -> Self {
        Self {
            transport,
            chats,
            localizer,
        }
    }

    /// Publish `reply` to its chat's notify topic. Translatable replies are
    /// localized against the chat's language first, so the front-end only
    /// ever sees resolved text.
    pub async fn send(&self, reply: Reply) -> Result<()> {
        let reply = match reply.kind {
            ReplyKind::TranslatableMessage => self.localize(reply).await?,
            _ => reply,
        };

        let topic = topic::build_topic(templates::CHAT_NOTIFY, &[&reply.chat_id])
            .context("building notify topic")?;
        debug!(chat = %reply.chat_id, topic = %topic, "sending reply");
        publish_json(self.transport.as_ref(), &topic, &reply).await
    }

    async fn localize(&self, reply: Reply) -> Result<Reply> {
        let request: TranslationRequest = serde_json::from_value(reply.content)
            .context("decoding translation request")?;
        let language = self.chats.language(&reply.chat_id).await?;
        let text = self.localizer.localize(
            &language,
            &request.message_id,
            &request.data,
            request.plural,
        )?;
        Ok(Reply::plain(reply.chat_id, text))
    }

    /// Shorthand for sending a translatable reply.
    pub async fn send_translatable(
        &self,
        chat_id: &str,
        request: TranslationRequest,
    ) -> Result<()> {
        self.send(Reply::translatable(chat_id, request)).await
    }
}
