use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, error, info};

use super::{Extractor, FlatEntry, FlatListing, StreamInfo};
use crate::error::ResolutionError;

const UNKNOWN_TITLE: &str = "Título desconocido";

/// Extractor que ejecuta el binario `yt-dlp`.
pub struct YtDlpExtractor {
    binary: String,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: tokio::sync::Semaphore,
}

/// Información extraída de yt-dlp (`--dump-single-json`)
#[derive(Debug, Default, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    original_url: Option<String>,
    #[serde(default)]
    http_headers: Option<HashMap<String, String>>,
    #[serde(default)]
    entries: Option<Vec<Option<YtDlpInfo>>>,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: tokio::sync::Semaphore::new(3),
        }
    }

    /// Verifica que yt-dlp esté disponible y funcional
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;

        if !output.status.success() {
            error!("❌ Error ejecutando {}", self.binary);
            anyhow::bail!("{} no puede ejecutarse correctamente", self.binary);
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }

    async fn dump_json(&self, args: &[&str], query: &str) -> Result<String, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::Extractor(e.to_string()))?;

        let output = Command::new(&self.binary)
            .args(args)
            .arg("--")
            .arg(query)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolutionError::Extractor(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract_flat(&self, query: &str) -> Result<FlatListing, ResolutionError> {
        debug!("📋 Listado plano para: {}", query);
        let json = self
            .dump_json(
                &[
                    "--flat-playlist",
                    "--dump-single-json",
                    "--default-search",
                    "ytsearch",
                    "--no-warnings",
                ],
                query,
            )
            .await?;

        parse_flat(&json)
    }

    async fn extract_stream(&self, query: &str) -> Result<StreamInfo, ResolutionError> {
        debug!("🎵 Obteniendo URL de stream para: {}", query);
        let json = self
            .dump_json(
                &[
                    "-f",
                    "bestaudio/best",
                    "--no-playlist",
                    "--dump-single-json",
                    "--default-search",
                    "ytsearch",
                    "--no-warnings",
                ],
                query,
            )
            .await?;

        parse_stream(&json, query)
    }
}

/// Headers enviados cuando yt-dlp no reporta ninguno
fn default_headers() -> HashMap<String, String> {
    HashMap::from([
        ("User-Agent".to_string(), "Mozilla/5.0".to_string()),
        ("Accept".to_string(), "*/*".to_string()),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
    ])
}

fn parse_flat(json: &str) -> Result<FlatListing, ResolutionError> {
    let info: YtDlpInfo = serde_json::from_str(json)?;

    let entries: Vec<FlatEntry> = info
        .entries
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .map(|entry| FlatEntry {
            id: entry.id,
            url: entry.url.or(entry.webpage_url),
            title: entry.title,
        })
        .collect();

    if entries.is_empty() {
        Ok(FlatListing::Single)
    } else {
        Ok(FlatListing::Playlist(entries))
    }
}

fn parse_stream(json: &str, query: &str) -> Result<StreamInfo, ResolutionError> {
    let mut info: YtDlpInfo = serde_json::from_str(json)?;

    // Búsquedas y playlists: tomar la primera entrada
    if let Some(first) = info.entries.take().and_then(|entries| entries.into_iter().flatten().next()) {
        info = first;
    }

    let stream_url = info
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ResolutionError::NoPlayableEntry(query.to_string()))?;

    let headers = info
        .http_headers
        .filter(|headers| !headers.is_empty())
        .unwrap_or_else(default_headers);

    Ok(StreamInfo {
        stream_url,
        title: info.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        page_url: info
            .webpage_url
            .or(info.original_url)
            .unwrap_or_else(|| query.to_string()),
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flat_single_video_has_no_entries() {
        let json = r#"{"id":"abc","title":"Una canción","webpage_url":"https://www.youtube.com/watch?v=abc"}"#;
        assert_eq!(parse_flat(json).unwrap(), FlatListing::Single);
    }

    #[test]
    fn flat_playlist_skips_null_entries() {
        let json = r#"{
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                {"id": "a1", "url": "https://www.youtube.com/watch?v=a1", "title": "Uno"},
                null,
                {"id": "b2", "title": "Dos"}
            ]
        }"#;

        let FlatListing::Playlist(entries) = parse_flat(json).unwrap() else {
            panic!("se esperaba una playlist");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url.as_deref(), Some("https://www.youtube.com/watch?v=a1"));
        assert_eq!(entries[1].canonical_url().as_deref(), Some("https://www.youtube.com/watch?v=b2"));
    }

    #[test]
    fn flat_empty_entries_is_single() {
        let json = r#"{"_type":"playlist","entries":[]}"#;
        assert_eq!(parse_flat(json).unwrap(), FlatListing::Single);
    }

    #[test]
    fn stream_uses_reported_headers_and_page() {
        let json = r#"{
            "title": "Canción",
            "url": "https://rr1.googlevideo.com/audio",
            "webpage_url": "https://www.youtube.com/watch?v=abc",
            "http_headers": {"User-Agent": "yt-dlp-agent"}
        }"#;

        let info = parse_stream(json, "canción").unwrap();
        assert_eq!(info.stream_url, "https://rr1.googlevideo.com/audio");
        assert_eq!(info.page_url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(info.headers.len(), 1);
        assert_eq!(info.headers["User-Agent"], "yt-dlp-agent");
    }

    #[test]
    fn stream_search_takes_first_entry_and_defaults() {
        let json = r#"{
            "_type": "playlist",
            "entries": [{"url": "https://cdn.example/first.webm"}, {"url": "https://cdn.example/second.webm"}]
        }"#;

        let info = parse_stream(json, "ytsearch:algo").unwrap();
        assert_eq!(info.stream_url, "https://cdn.example/first.webm");
        assert_eq!(info.title, UNKNOWN_TITLE);
        assert_eq!(info.page_url, "ytsearch:algo");
        assert_eq!(info.headers, default_headers());
    }

    #[test]
    fn stream_without_url_is_not_playable() {
        let json = r#"{"title": "Sin formato"}"#;
        assert!(matches!(
            parse_stream(json, "x"),
            Err(ResolutionError::NoPlayableEntry(q)) if q == "x"
        ));
    }

    #[test]
    fn garbage_output_is_invalid() {
        assert!(matches!(parse_flat("no es json"), Err(ResolutionError::InvalidOutput(_))));
    }
}
