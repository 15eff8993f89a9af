//! Error types for the playback core.
//!
//! The bot surface works with [`anyhow::Result`]; everything below the
//! command handlers reports one of these typed errors so the scheduler can
//! decide between "skip and continue" and "idle out".

/// Extraction of a playable stream failed.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The query was empty after trimming
    #[error("consulta vacía")]
    EmptyQuery,

    /// The extractor ran but produced nothing playable
    #[error("no se encontró ninguna entrada reproducible para: {0}")]
    NoPlayableEntry(String),

    /// The extractor process failed (network, geo-block, removed content...)
    #[error("yt-dlp falló: {0}")]
    Extractor(String),

    /// The extractor output could not be parsed
    #[error("respuesta inválida del extractor: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    /// The extractor could not be launched
    #[error("no se pudo ejecutar el extractor: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the audio transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No voice connection when playback was due
    #[error("no hay conexión de voz")]
    Unavailable,

    /// The playback source could not be built from the track
    #[error("fuente de audio inválida: {0}")]
    InvalidSource(String),

    /// The transport refused to start playback
    #[error("no se pudo iniciar la reproducción: {0}")]
    Play(String),
}

/// Reported by the transport's completion callback after playback started.
#[derive(Debug, Clone, thiserror::Error)]
#[error("error de reproducción: {0}")]
pub struct PlaybackError(pub String);
