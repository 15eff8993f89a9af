use anyhow::{Context as _, Result};
use serenity::{
    model::{channel::Message, id::GuildId},
    prelude::Context,
};
use tracing::info;

use super::{
    commands::{self, Command, QUEUE_PREVIEW},
    voice::{self, JoinOutcome},
    JukeboxBot,
};
use crate::audio::transport::Transport;

/// Dispatches a parsed prefix command.
pub async fn handle_command(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    command: Command,
    bot: &JukeboxBot,
) -> Result<()> {
    info!("📝 Comando {:?} usado por {} en guild {}", command, msg.author.name, guild_id);

    match command {
        Command::Join => handle_join(ctx, msg, guild_id, bot).await,
        Command::Play(query) => handle_play(ctx, msg, guild_id, &query, bot).await,
        Command::Skip => handle_skip(ctx, msg, guild_id, bot).await,
        Command::Stop => {
            let removed = bot.registry.stop(guild_id).await;
            say(ctx, msg, format!("⏹️ Reproducción detenida, {removed} canciones quitadas de la cola")).await
        }
        Command::Pause => {
            let text = if bot.registry.pause(guild_id).await {
                "⏸️ Pausado"
            } else {
                "🤷 No hay nada sonando"
            };
            say(ctx, msg, text).await
        }
        Command::Resume => {
            let text = if bot.registry.resume(guild_id).await {
                "▶️ Reanudado"
            } else {
                "🤷 No hay nada en pausa"
            };
            say(ctx, msg, text).await
        }
        Command::Leave => handle_leave(ctx, msg, guild_id, bot).await,
        Command::NowPlaying => {
            let snapshot = bot.registry.snapshot(guild_id);
            say(ctx, msg, commands::format_now_playing(&snapshot)).await
        }
        Command::Queue => {
            let snapshot = bot.registry.snapshot(guild_id);
            say(ctx, msg, commands::format_queue(&snapshot, QUEUE_PREVIEW)).await
        }
        Command::Volume(None) => {
            let percent = (bot.registry.get(guild_id).volume() * 100.0).round();
            say(ctx, msg, format!("🔊 Volumen actual: {percent}%")).await
        }
        Command::Volume(Some(requested)) => {
            let percent = bot.registry.set_volume(guild_id, requested).await;
            say(ctx, msg, format!("🔊 Volumen ajustado a {percent}%")).await
        }
        Command::Debug(None) => {
            let enabled = bot.registry.get(guild_id).debug_enabled();
            let prefix = &bot.config.command_prefix;
            say(
                ctx,
                msg,
                format!("🐞 debug = **{enabled}** (usa `{prefix}debug on` o `{prefix}debug off`)"),
            )
            .await
        }
        Command::Debug(Some(enabled)) => {
            bot.registry.set_debug(guild_id, enabled);
            say(ctx, msg, format!("🐞 debug = **{enabled}**")).await
        }
        Command::Help => say(ctx, msg, commands::help_text(&bot.config.command_prefix)).await,
        Command::Invalid { usage } => {
            say(ctx, msg, format!("❓ Uso: `{}{}`", bot.config.command_prefix, usage)).await
        }
    }
}

async fn handle_join(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let channel_id = match voice::user_voice_channel(ctx, guild_id, msg.author.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return say(ctx, msg, format!("❌ {e}")).await,
    };

    match bot.connect(guild_id, channel_id).await {
        Ok(JoinOutcome::AlreadyThere) => say(ctx, msg, format!("✅ Ya estoy en <#{channel_id}>")).await?,
        Ok(JoinOutcome::Connected) => say(ctx, msg, format!("🔊 Conectado a <#{channel_id}>")).await?,
        Err(e) => return say(ctx, msg, connect_failure(&e)).await,
    }

    // Canciones que esperaban conexión
    let queue = bot.registry.get(guild_id);
    if !queue.is_empty() {
        queue.bind_session(bot.session(ctx, guild_id, msg.channel_id));
        bot.registry.start(guild_id);
    }

    Ok(())
}

async fn handle_play(ctx: &Context, msg: &Message, guild_id: GuildId, query: &str, bot: &JukeboxBot) -> Result<()> {
    let channel_id = match voice::user_voice_channel(ctx, guild_id, msg.author.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return say(ctx, msg, format!("❌ {e}")).await,
    };

    if voice::connected_channel(&bot.voice, guild_id).await.is_none() {
        if let Err(e) = bot.connect(guild_id, channel_id).await {
            return say(ctx, msg, connect_failure(&e)).await;
        }
    }

    let tracks = match bot.registry.resolver().resolve_lazy(query, &msg.author.name).await {
        Ok(tracks) => tracks,
        Err(e) => return say(ctx, msg, format!("❌ No se pudo obtener la lista de canciones: {e}")).await,
    };

    let Some(first_title) = tracks.first().map(|track| track.title.clone()) else {
        return say(ctx, msg, "😥 No encontré nada para reproducir").await;
    };

    let session = bot.session(ctx, guild_id, msg.channel_id);
    let outcome = bot.registry.enqueue(guild_id, tracks, session);

    let mut text = if outcome.added == 1 {
        format!("➕ Añadida a la cola: **{first_title}**")
    } else {
        format!("📥 Añadidas **{}** canciones a la cola (se cargan al llegar su turno)", outcome.added)
    };
    if outcome.dropped > 0 {
        text.push_str(&format!(
            "\n✂️ {} omitidas por el límite de {} por petición",
            outcome.dropped,
            bot.registry.settings().max_enqueue_per_request
        ));
    }

    say(ctx, msg, text).await
}

async fn handle_skip(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    if voice::connected_channel(&bot.voice, guild_id).await.is_none() {
        return say(ctx, msg, "❌ No estoy en un canal de voz").await;
    }

    let text = if bot.registry.skip(guild_id).await {
        "⏭️ Canción saltada"
    } else {
        "🤷 No hay nada sonando"
    };
    say(ctx, msg, text).await
}

async fn handle_leave(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let was_connected = voice::connected_channel(&bot.voice, guild_id).await.is_some();

    bot.registry.leave(guild_id).await;

    // Conectado con !join pero sin sesión de reproducción
    if voice::connected_channel(&bot.voice, guild_id).await.is_some() {
        bot.transport(guild_id).disconnect().await;
    }

    if was_connected {
        say(ctx, msg, "👋 Salí del canal de voz").await
    } else {
        say(ctx, msg, "🤷 No estaba en un canal de voz").await
    }
}

fn connect_failure(error: &anyhow::Error) -> String {
    format!(
        "😥 No pude conectarme al canal de voz\n\
        • Revisa que tenga permisos de Conectar y Hablar\n\
        • Desactiva VPN/Proxy\n\
        • Prueba otra región de voz\n\
        Detalle: `{error}`"
    )
}

async fn say(ctx: &Context, msg: &Message, text: impl Into<String>) -> Result<()> {
    msg.channel_id
        .say(&ctx.http, text)
        .await
        .context("No se pudo responder en el canal")?;
    Ok(())
}
