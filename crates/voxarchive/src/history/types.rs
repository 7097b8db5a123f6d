//! Wire shapes of the history and synthesis endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default stability sent to the synthesis endpoint when the item has none.
pub const DEFAULT_STABILITY: f64 = 0.5;

/// Default similarity boost sent to the synthesis endpoint when the item has none.
pub const DEFAULT_SIMILARITY_BOOST: f64 = 0.75;

/// One page of `GET /history`.
///
/// Items stay raw so one malformed entry cannot fail the whole page; they are
/// decoded one at a time with [`HistoryItem::from_value`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub history: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// A single remote history record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<VoiceSettings>,
    /// Fields we don't model, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryItem {
    /// Decode one raw entry of a history page.
    pub fn from_value(raw: &Value) -> serde_json::Result<Self> {
        Self::deserialize(raw)
    }

    /// Timestamp of the item, falling back to the current wall-clock time.
    ///
    /// Returns `None` only when `date_unix` is present but outside the range
    /// chrono can represent.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.date_unix {
            Some(secs) => DateTime::from_timestamp(secs, 0),
            None => Some(Utc::now()),
        }
    }

    /// Text and voice id, when both are present and non-empty.
    ///
    /// Only such items get an audio artifact.
    pub fn speakable(&self) -> Option<(&str, &str)> {
        let text = self.text.as_deref().filter(|t| !t.is_empty())?;
        let voice_id = self.voice_id.as_deref().filter(|v| !v.is_empty())?;
        Some((text, voice_id))
    }

    /// Voice settings with the remote defaults filled in.
    pub fn effective_settings(&self) -> VoiceSettings {
        let settings = self.settings.clone().unwrap_or_default();
        VoiceSettings {
            stability: Some(settings.stability.unwrap_or(DEFAULT_STABILITY)),
            similarity_boost: Some(
                settings
                    .similarity_boost
                    .unwrap_or(DEFAULT_SIMILARITY_BOOST),
            ),
            extra: settings.extra,
        }
    }
}

/// Voice settings attached to a history item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /text-to-speech/{voice_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_settings: SynthesisVoiceSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesisVoiceSettings {
    pub stability: f64,
    pub similarity_boost: f64,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, settings: &VoiceSettings) -> Self {
        Self {
            text: text.into(),
            voice_settings: SynthesisVoiceSettings {
                stability: settings.stability.unwrap_or(DEFAULT_STABILITY),
                similarity_boost: settings
                    .similarity_boost
                    .unwrap_or(DEFAULT_SIMILARITY_BOOST),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_parses_with_missing_fields() {
        let page: HistoryPage = serde_json::from_value(json!({})).unwrap();
        assert!(page.history.is_empty());
        assert!(page.next_cursor.is_none());
        assert!(!page.has_more);
    }

    #[test]
    fn test_item_keeps_unknown_fields() {
        let raw = json!({
            "history_item_id": "abc",
            "date_unix": 1_700_000_000,
            "voice_id": "v1",
            "model_id": "eleven_multilingual_v2",
            "state": "created"
        });
        let item: HistoryItem = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(item.extra.get("model_id"), Some(&json!("eleven_multilingual_v2")));
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);
    }

    #[test]
    fn test_page_keeps_malformed_items_raw() {
        let page: HistoryPage = serde_json::from_value(json!({
            "history": [
                {"history_item_id": "a", "text": "fine"},
                {"history_item_id": "b", "text": 42},
                "not an object"
            ],
            "has_more": true
        }))
        .unwrap();

        assert_eq!(page.history.len(), 3);
        assert!(HistoryItem::from_value(&page.history[0]).is_ok());
        assert!(HistoryItem::from_value(&page.history[1]).is_err());
        assert!(HistoryItem::from_value(&page.history[2]).is_err());
    }

    #[test]
    fn test_speakable_requires_text_and_voice() {
        let mut item = HistoryItem {
            text: Some("hello".into()),
            ..Default::default()
        };
        assert!(item.speakable().is_none());

        item.voice_id = Some(String::new());
        assert!(item.speakable().is_none());

        item.voice_id = Some("v1".into());
        assert_eq!(item.speakable(), Some(("hello", "v1")));

        item.text = None;
        assert!(item.speakable().is_none());
    }

    #[test]
    fn test_synthesis_request_defaults() {
        let item = HistoryItem {
            settings: Some(VoiceSettings {
                stability: Some(0.2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let req = SynthesisRequest::new("hi", &item.effective_settings());
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            json!({"text": "hi", "voice_settings": {"stability": 0.2, "similarity_boost": 0.75}})
        );
    }

    #[test]
    fn test_timestamp_out_of_range() {
        let item = HistoryItem {
            date_unix: Some(i64::MAX),
            ..Default::default()
        };
        assert!(item.timestamp().is_none());
    }
}
