//! # Bot Module
//!
//! Discord front end for Guild Jukebox.
//!
//! This module contains:
//! - Prefix command parsing and formatting ([`commands`])
//! - Command handlers ([`handlers`])
//! - Voice connection with retry ([`voice`])
//! - The chat [`Notifier`](crate::audio::transport::Notifier) used by schedulers ([`notifier`])
//!
//! ## Architecture
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]. Every command ends up
//! in the shared [`SchedulerRegistry`]; the bot only owns what is Discord
//! specific: one [`SongbirdTransport`] per guild and the songbird manager.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ActivityData, ChannelId, Context, EventHandler, GuildId, Message, Ready},
    async_trait,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod commands;
pub mod handlers;
pub mod notifier;
pub mod voice;

use crate::{
    audio::{registry::SchedulerRegistry, transport::PlaybackSession, voice::SongbirdTransport},
    config::Config,
};
use notifier::ChannelNotifier;
use voice::JoinOutcome;

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (prefix, limits, timeouts)
/// - `registry`: Per-guild queues and schedulers
/// - `voice`: Songbird manager registered with the client
/// - `transports`: One voice transport per guild, reused across requests so
///   skip/pause always reach the track that is actually playing
pub struct JukeboxBot {
    config: Arc<Config>,
    pub registry: Arc<SchedulerRegistry>,
    pub voice: Arc<Songbird>,
    http_client: reqwest::Client,
    transports: DashMap<GuildId, Arc<SongbirdTransport>>,
}

impl JukeboxBot {
    /// Creates the handler.
    ///
    /// `voice` must be the same manager passed to `register_songbird_with`.
    pub fn new(config: Config, registry: Arc<SchedulerRegistry>, voice: Arc<Songbird>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            voice,
            http_client: reqwest::Client::new(),
            transports: DashMap::new(),
        }
    }

    /// The guild's voice transport, created on first use.
    pub fn transport(&self, guild_id: GuildId) -> Arc<SongbirdTransport> {
        self.transports
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(SongbirdTransport::new(
                    self.voice.clone(),
                    guild_id,
                    self.http_client.clone(),
                ))
            })
            .clone()
    }

    /// Session that plays on the guild's voice call and reports to `channel_id`.
    pub fn session(&self, ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> PlaybackSession {
        PlaybackSession::new(
            self.transport(guild_id),
            Arc::new(ChannelNotifier::new(ctx.http.clone(), channel_id)),
        )
    }

    /// Connects to a voice channel using the configured retry policy.
    pub async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<JoinOutcome> {
        voice::connect_with_retry(
            &self.voice,
            guild_id,
            channel_id,
            self.config.connect_attempts,
            self.config.connect_timeout,
        )
        .await
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        ctx.set_activity(Some(ActivityData::listening(format!("{}play", self.config.command_prefix))));
    }

    /// Parses prefix commands; everything else is ignored.
    ///
    /// Handler errors are logged and reported in the channel, never fatal.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Some(command) = commands::parse_command(&self.config.command_prefix, &msg.content) else {
            return;
        };

        let Some(guild_id) = msg.guild_id else {
            debug!("Comando ignorado fuera de un servidor: {:?}", command);
            return;
        };

        if let Err(e) = handlers::handle_command(&ctx, &msg, guild_id, command, self).await {
            error!("Error manejando comando en guild {}: {:?}", guild_id, e);
            if let Err(e) = msg.channel_id.say(&ctx.http, format!("❌ Error: {e}")).await {
                error!("No se pudo notificar el error: {:?}", e);
            }
        }
    }
}
