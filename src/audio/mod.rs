//! # Audio Module
//!
//! Per-guild playback scheduling for Guild Jukebox.
//!
//! Every guild that ever queued something owns a [`GuildQueue`](queue::GuildQueue)
//! kept in the [`SchedulerRegistry`](registry::SchedulerRegistry). While the
//! queue has work, exactly one [`GuildScheduler`](scheduler::GuildScheduler)
//! task drains it:
//!
//! ```text
//!   enqueue ──► queue.push ──► start-or-wake
//!                                   │
//!          ┌────────────────────────▼─────────────────────────┐
//!          │ WAITING_FOR_ITEM ──(timeout)──► TERMINATING       │
//!          │      │ item                                      │
//!          │      ▼                                           │
//!          │ AWAITING_TRANSPORT ─► pop ─► RESOLVING (if lazy)  │
//!          │                               │                  │
//!          │                               ▼                  │
//!          │                            PLAYING ──(finished)──┘
//!          └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! ### [`track`] - Queue entries
//! A track is either resolved (has a stream URL) or *lazy* (only a page URL).
//!
//! ### [`resolver`] - Lazy extraction
//! Playlists resolve their first entry eagerly and defer the rest, so
//! playback starts immediately no matter how long the playlist is.
//!
//! ### [`scheduler`] - The state machine
//! Pops, resolves late, plays and waits on the guild's wake signal. Idles out
//! after a configurable timeout on an empty queue.
//!
//! ### [`transport`] / [`voice`] - Collaborators
//! The scheduler only talks to [`Transport`](transport::Transport) and
//! [`Notifier`](transport::Notifier); [`voice::SongbirdTransport`] is the
//! Discord voice implementation.

pub mod queue;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod track;
pub mod transport;
pub mod voice;
