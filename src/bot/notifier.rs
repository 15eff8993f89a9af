use async_trait::async_trait;
use serenity::{http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::warn;

use crate::audio::transport::Notifier;

/// Posts scheduler messages to the text channel the request came from.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, text: String) {
        if let Err(e) = self.channel_id.say(&self.http, text).await {
            warn!("⚠️ No se pudo enviar mensaje al canal {}: {:?}", self.channel_id, e);
        }
    }
}
