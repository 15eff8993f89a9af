use crate::audio::queue::QueueSnapshot;

/// Entries shown by `queue` before collapsing into "y N más".
pub const QUEUE_PREVIEW: usize = 10;

/// A parsed prefix command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Play(String),
    Skip,
    Stop,
    Pause,
    Resume,
    Leave,
    NowPlaying,
    Queue,
    /// `None` asks for the current volume
    Volume(Option<i64>),
    /// `None` asks for the current mode
    Debug(Option<bool>),
    Help,
    /// Known command with unusable arguments
    Invalid { usage: &'static str },
}

/// Parses `content` as a prefix command. Returns `None` for anything that
/// is not one of ours so other bots' commands pass through silently.
pub fn parse_command(prefix: &str, content: &str) -> Option<Command> {
    let body = content.trim_start().strip_prefix(prefix)?;
    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "join" => Command::Join,
        "play" | "p" => {
            if args.is_empty() {
                Command::Invalid { usage: "play <nombre | URL | playlist>" }
            } else {
                Command::Play(args.to_string())
            }
        }
        "skip" => Command::Skip,
        "stop" => Command::Stop,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "leave" => Command::Leave,
        "np" | "nowplaying" => Command::NowPlaying,
        "queue" | "q" => Command::Queue,
        "vol" | "volume" => {
            if args.is_empty() {
                Command::Volume(None)
            } else {
                match args.parse::<i64>() {
                    Ok(value) => Command::Volume(Some(value)),
                    Err(_) => Command::Invalid { usage: "vol <0-100>" },
                }
            }
        }
        "debug" => {
            if args.is_empty() {
                Command::Debug(None)
            } else {
                match parse_debug_mode(args) {
                    Some(enabled) => Command::Debug(Some(enabled)),
                    None => Command::Invalid { usage: "debug on | debug off" },
                }
            }
        }
        "help" => Command::Help,
        _ => return None,
    };

    Some(command)
}

pub fn parse_debug_mode(arg: &str) -> Option<bool> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "true" | "1" | "yes" | "si" | "sí" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub fn format_now_playing(snapshot: &QueueSnapshot) -> String {
    match &snapshot.now_playing {
        Some(track) => format!(
            "🎵 Sonando: **{}** | pedido por **{}**\n<{}>",
            track.title, track.requester, track.source_url
        ),
        None => "🔇 No hay nada sonando ahora".to_string(),
    }
}

/// Lists the first `limit` queued tracks; unresolved ones are marked ⏳.
pub fn format_queue(snapshot: &QueueSnapshot, limit: usize) -> String {
    if snapshot.tracks.is_empty() {
        return "📭 La cola está vacía".to_string();
    }

    let lines: Vec<String> = snapshot
        .tracks
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, track)| {
            let flag = if track.is_lazy() { " ⏳" } else { "" };
            format!("**{}.** {}{} · `{}`", i + 1, track.title, flag, track.requester)
        })
        .collect();

    let mut text = format!("📜 **Cola de reproducción:**\n{}", lines.join("\n"));
    if snapshot.tracks.len() > limit {
        text.push_str(&format!("\n...y {} más", snapshot.tracks.len() - limit));
    }
    text
}

pub fn help_text(prefix: &str) -> String {
    [
        format!("**{prefix}join** · entra a tu canal de voz"),
        format!("**{prefix}play <nombre | URL | playlist>** · la primera suena ya, el resto se carga al llegar su turno"),
        format!("**{prefix}skip** · salta la canción actual"),
        format!("**{prefix}stop** · detiene y vacía la cola"),
        format!("**{prefix}pause** / **{prefix}resume** · pausa o reanuda"),
        format!("**{prefix}leave** · sale del canal de voz"),
        format!("**{prefix}np** · qué está sonando"),
        format!("**{prefix}queue** · muestra la cola (⏳ = aún sin cargar)"),
        format!("**{prefix}vol <0-100>** · ajusta el volumen"),
        format!("**{prefix}debug on|off** · mensajes de diagnóstico en el chat"),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{queue::SchedulerPhase, track::Track};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn snapshot(tracks: Vec<Track>, now_playing: Option<Track>) -> QueueSnapshot {
        QueueSnapshot {
            now_playing,
            tracks,
            volume: 0.8,
            debug: false,
            phase: SchedulerPhase::Idle,
        }
    }

    fn track(title: &str, lazy: bool) -> Track {
        let source_url = format!("https://www.youtube.com/watch?v={title}");
        if lazy {
            Track::lazy(title, source_url, "ana")
        } else {
            Track {
                title: title.to_string(),
                source_url,
                requester: "ana".to_string(),
                stream_url: Some(format!("https://cdn.example/{title}")),
                headers: HashMap::new(),
            }
        }
    }

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(parse_command("!", "!join"), Some(Command::Join));
        assert_eq!(
            parse_command("!", "!play  lofi hip hop  "),
            Some(Command::Play("lofi hip hop".into()))
        );
        assert_eq!(parse_command("!", "!PLAY x"), Some(Command::Play("x".into())));
        assert_eq!(parse_command("!", "!vol 35"), Some(Command::Volume(Some(35))));
        assert_eq!(parse_command("!", "!vol"), Some(Command::Volume(None)));
        assert_eq!(parse_command("!", "!debug off"), Some(Command::Debug(Some(false))));
        assert_eq!(parse_command("?", "?queue"), Some(Command::Queue));
    }

    #[test]
    fn ignores_foreign_messages() {
        assert_eq!(parse_command("!", "hola !play x"), None);
        assert_eq!(parse_command("!", "!ban alguien"), None);
        assert_eq!(parse_command("!", "?play x"), None);
    }

    #[test]
    fn bad_arguments_return_usage() {
        assert_eq!(
            parse_command("!", "!play   "),
            Some(Command::Invalid { usage: "play <nombre | URL | playlist>" })
        );
        assert_eq!(parse_command("!", "!vol fuerte"), Some(Command::Invalid { usage: "vol <0-100>" }));
        assert_eq!(
            parse_command("!", "!debug quizas"),
            Some(Command::Invalid { usage: "debug on | debug off" })
        );
    }

    #[test]
    fn queue_listing_marks_lazy_and_truncates() {
        let mut tracks = vec![track("primera", false)];
        tracks.extend((2..=12).map(|i| track(&format!("t{i}"), true)));

        let text = format_queue(&snapshot(tracks, None), QUEUE_PREVIEW);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "📜 **Cola de reproducción:**");
        assert_eq!(lines[1], "**1.** primera · `ana`");
        assert_eq!(lines[2], "**2.** t2 ⏳ · `ana`");
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[11], "...y 2 más");
    }

    #[test]
    fn empty_queue_and_idle_now_playing() {
        let empty = snapshot(vec![], None);
        assert_eq!(format_queue(&empty, QUEUE_PREVIEW), "📭 La cola está vacía");
        assert_eq!(format_now_playing(&empty), "🔇 No hay nada sonando ahora");

        let playing = snapshot(vec![], Some(track("actual", false)));
        assert_eq!(
            format_now_playing(&playing),
            "🎵 Sonando: **actual** | pedido por **ana**\n<https://www.youtube.com/watch?v=actual>"
        );
    }
}
