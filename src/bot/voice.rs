use anyhow::{anyhow, Result};
use serenity::{
    model::id::{ChannelId, GuildId, UserId},
    prelude::Context,
};
use songbird::Songbird;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

/// Result of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    AlreadyThere,
    Connected,
}

/// Voice channel the user is currently in, from the gateway cache.
pub fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow!("Guild no encontrada en caché"))?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow!("Debes estar en un canal de voz"))
}

/// Channel the bot's call is connected to, if any.
pub async fn connected_channel(manager: &Songbird, guild_id: GuildId) -> Option<ChannelId> {
    let call = manager.get(guild_id)?;
    let channel = call.lock().await.current_channel();
    channel.map(|channel| ChannelId::from(channel.0))
}

/// Joins (or moves to) `channel_id`, self-deafened.
///
/// Each attempt is bounded by `timeout`; failed attempts back off 2s × attempt.
pub async fn connect_with_retry(
    manager: &Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    attempts: u32,
    timeout: Duration,
) -> Result<JoinOutcome> {
    if connected_channel(manager, guild_id).await == Some(channel_id) {
        return Ok(JoinOutcome::AlreadyThere);
    }

    let mut last_error = anyhow!("No se intentó la conexión");

    for attempt in 1..=attempts.max(1) {
        match tokio::time::timeout(timeout, manager.join(guild_id, channel_id)).await {
            Ok(Ok(call)) => {
                let mut call = call.lock().await;
                if let Err(e) = call.deafen(true).await {
                    warn!("⚠️ No se pudo ensordecer al bot en guild {}: {:?}", guild_id, e);
                }

                if call.current_channel().is_some() {
                    info!("🔊 Conectado al canal {} en guild {} (intento {})", channel_id, guild_id, attempt);
                    return Ok(JoinOutcome::Connected);
                }
                last_error = anyhow!("La llamada se creó pero no quedó conectada");
            }
            Ok(Err(e)) => last_error = e.into(),
            Err(_) => last_error = anyhow!("Tiempo de espera agotado ({})", humantime::format_duration(timeout)),
        }

        warn!(
            "🔁 Intento {}/{} de conexión a voz fallido en guild {}: {}",
            attempt, attempts, guild_id, last_error
        );

        if attempt < attempts {
            tokio::time::sleep(Duration::from_secs(2 * u64::from(attempt))).await;
        }
    }

    Err(last_error)
}
