use crate::enrich::ContributorMetadata;
use crate::models::Track;
use crate::queue::QueueWindow;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// `"<first artist> - <title>"`, plus `" [Added by: <who>]"` when known.
pub fn format_track(track: &Track, attribution: Option<&str>) -> String {
    let artist = track.first_artist().unwrap_or(UNKNOWN_ARTIST);
    let mut line = format!("{} - {}", artist, track.name);
    if let Some(who) = attribution.filter(|w| !w.is_empty()) {
        line.push_str(&format!(" [Added by: {}]", who));
    }
    line
}

/// Numbered list, one `"<n>. <track>\n"` line per entry, starting at 1.
///
/// Callers check for an empty window first; this returns `""` for one.
pub fn format_queue(window: &QueueWindow, metadata: &ContributorMetadata) -> String {
    window
        .entries()
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}\n", i + 1, format_track(&e.track, metadata.attribution(e.tlid))))
        .collect()
}
