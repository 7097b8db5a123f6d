//! Read model over the archive directory.

use std::path::Path;

use chrono::DateTime;
use serde::Serialize;
use tokio::fs;
use tracing::warn;

use crate::history::HistoryItem;
use crate::store::{AUDIO_EXT, CHAT_DIR, RECORD_EXT, VOICE_DIR};

/// All messages stored under one date directory.
#[derive(Debug, Clone, Serialize)]
pub struct DayLog {
    pub date: String,
    pub messages: Vec<MessageView>,
}

/// One stored message, as shown on the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    /// UTC timestamp, `YYYY-MM-DDTHH:MM:SS`.
    pub timestamp: String,
    pub sender: String,
    pub text: String,
    /// Path relative to the archive root, when audio exists.
    pub audio_path: Option<String>,
}

/// Scan `root` for date directories with a `chat` subdirectory.
///
/// Days and messages are sorted by name. Unreadable days and records are
/// skipped with a warning.
pub async fn scan_archive(root: &Path) -> std::io::Result<Vec<DayLog>> {
    if !fs::try_exists(root).await? {
        return Ok(Vec::new());
    }

    let mut dates = Vec::new();
    let mut entries = fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            dates.push(name.to_string());
        }
    }
    dates.sort();

    let mut days = Vec::new();
    for date in dates {
        let chat_dir = root.join(&date).join(CHAT_DIR);
        if !fs::metadata(&chat_dir).await.is_ok_and(|m| m.is_dir()) {
            continue;
        }
        match scan_day(root, &date).await {
            Ok(messages) => days.push(DayLog { date, messages }),
            Err(e) => warn!("Skipping unreadable day {}: {}", chat_dir.display(), e),
        }
    }
    Ok(days)
}

async fn scan_day(root: &Path, date: &str) -> std::io::Result<Vec<MessageView>> {
    let chat_dir = root.join(date).join(CHAT_DIR);
    let voice_dir = root.join(date).join(VOICE_DIR);

    let mut stems = Vec::new();
    let mut entries = fs::read_dir(&chat_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();

    let mut messages = Vec::with_capacity(stems.len());
    for stem in stems {
        let record = chat_dir.join(format!("{stem}.{RECORD_EXT}"));
        let item: HistoryItem = match fs::read(&record).await.map(|raw| serde_json::from_slice(&raw)) {
            Ok(Ok(item)) => item,
            Ok(Err(e)) => {
                warn!("Skipping malformed record {}: {}", record.display(), e);
                continue;
            }
            Err(e) => {
                warn!("Skipping unreadable record {}: {}", record.display(), e);
                continue;
            }
        };

        let audio_name = format!("{stem}.{AUDIO_EXT}");
        let audio_file = voice_dir.join(&audio_name);
        let audio_path = match fs::try_exists(&audio_file).await {
            Ok(true) => Some(format!("{date}/{VOICE_DIR}/{audio_name}")),
            Ok(false) => None,
            Err(e) => {
                warn!("Cannot check audio {}: {}", audio_file.display(), e);
                None
            }
        };

        messages.push(MessageView {
            timestamp: format_timestamp(item.date_unix.unwrap_or(0)),
            sender: item.voice_name.unwrap_or_else(|| "Unknown".to_string()),
            text: item.text.unwrap_or_default(),
            audio_path,
        });
    }
    Ok(messages)
}

fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let days = scan_archive(&dir.path().join("nope")).await.unwrap();
        assert!(days.is_empty());
    }

    #[tokio::test]
    async fn test_scan_sorts_and_links_audio() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            root,
            "2023-11-15/chat/08-00-00.json",
            r#"{"date_unix": 1700035200, "text": "later day"}"#,
        );
        write(
            root,
            "2023-11-14/chat/22-13-20.json",
            r#"{"date_unix": 1700000000, "voice_name": "Rachel", "text": "second"}"#,
        );
        write(
            root,
            "2023-11-14/chat/09-00-00.json",
            r#"{"date_unix": 1699952400, "text": "first"}"#,
        );
        write(root, "2023-11-14/voice/22-13-20.mp3", "ID3");
        write(root, "2023-11-14/chat/notes.txt", "ignored");
        write(root, "sync_state.json", r#"{"cursor": null}"#);

        let days = scan_archive(root).await.unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, "2023-11-14");
        assert_eq!(days[1].date, "2023-11-15");

        let msgs = &days[0].messages;
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].text, "first");
        assert_eq!(msgs[0].sender, "Unknown");
        assert!(msgs[0].audio_path.is_none());
        assert_eq!(msgs[1].sender, "Rachel");
        assert_eq!(msgs[1].timestamp, "2023-11-14T22:13:20");
        assert_eq!(
            msgs[1].audio_path.as_deref(),
            Some("2023-11-14/voice/22-13-20.mp3")
        );
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2023-11-14/chat/00-00-00.json", "{broken");
        write(dir.path(), "2023-11-14/chat/00-00-01.json", r#"{"text": "ok"}"#);

        let days = scan_archive(dir.path()).await.unwrap();
        assert_eq!(days[0].messages.len(), 1);
        assert_eq!(days[0].messages[0].timestamp, "1970-01-01T00:00:00");
    }

    #[tokio::test]
    async fn test_audio_check_error_does_not_fail_scan() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2023-11-14/chat/22-13-20.json", r#"{"text": "hi"}"#);
        // `voice` is a file, so probing `voice/22-13-20.mp3` errors instead of
        // reporting "missing".
        write(dir.path(), "2023-11-14/voice", "not a directory");

        let days = scan_archive(dir.path()).await.unwrap();
        assert_eq!(days[0].messages.len(), 1);
        assert!(days[0].messages[0].audio_path.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_day_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write(dir.path(), "2023-11-14/chat/00-00-00.json", r#"{"text": "hidden"}"#);
        write(dir.path(), "2023-11-15/chat/00-00-00.json", r#"{"text": "visible"}"#);
        let locked = dir.path().join("2023-11-14/chat");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Permissions are not enforced for privileged users.
        let enforced = std::fs::read_dir(&locked).is_err();
        let days = scan_archive(dir.path()).await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        let days = days.unwrap();
        if enforced {
            assert_eq!(days.len(), 1);
            assert_eq!(days[0].date, "2023-11-15");
        } else {
            assert_eq!(days.len(), 2);
        }
    }
}
