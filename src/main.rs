use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use guild_jukebox::{
    audio::{registry::SchedulerRegistry, resolver::Resolver},
    bot::JukeboxBot,
    config::Config,
    sources::YtDlpExtractor,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Extracción y registro de schedulers
    let extractor = Arc::new(YtDlpExtractor::new(config.ytdlp_path.clone()));
    match extractor.verify().await {
        Ok(version) => info!("✅ yt-dlp {} disponible", version),
        Err(e) => error!("❌ yt-dlp no disponible, las búsquedas fallarán: {:?}", e),
    }
    let resolver = Arc::new(Resolver::new(extractor));
    let registry = Arc::new(SchedulerRegistry::new(resolver, config.scheduler_settings()));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Crear handler del bot
    let songbird = Songbird::serenity();
    let handler = JukeboxBot::new(config.clone(), registry, songbird.clone());

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    dotenvy::dotenv().ok();
    let binary = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());

    let version = YtDlpExtractor::new(binary).verify().await?;
    println!("OK (yt-dlp {version})");
    Ok(())
}
