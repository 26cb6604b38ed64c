//! REST and live-update wire types for the Sadaqah reading platform.
//!
//! This crate is shared by every dashboard client to prevent schema drift.
//! The backend remains the authority on validation; clients only reuse the
//! shapes it serialises and the envelope it pushes over `/ws/live/`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path of the live-update WebSocket, relative to the server origin.
pub const LIVE_PATH: &str = "/ws/live/";
/// Number of readable units (juz) in one reading cycle (khatma).
pub const TOTAL_JUZ: u32 = 30;
/// Longest participant name the backend accepts.
pub const MAX_NAME_CHARS: usize = 120;
/// Shortest message-wall entry the backend accepts.
pub const MIN_DUA_CHARS: usize = 5;

// ═══════════════════════════════════════════════════════════════════════════════
// Reading cycle
// ═══════════════════════════════════════════════════════════════════════════════

/// One readable unit within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Juz {
    pub id: u64,
    pub juz_number: u32,
    #[serde(default)]
    pub reserved_by: Option<String>,
    #[serde(default)]
    pub reserved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reservation_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_reserved: bool,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub read_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Khatma {
    pub id: u64,
    pub number: u64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ajzaa: Vec<Juz>,
}

/// Body of `GET /current-khatma/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentKhatma {
    pub khatma: Khatma,
    #[serde(default)]
    pub reserved_count: u32,
    #[serde(default)]
    pub completed_count: u32,
    #[serde(default = "default_total_juz")]
    pub total_juz: u32,
    #[serde(default)]
    pub reservation_expiry_hours: Option<f64>,
}

fn default_total_juz() -> u32 {
    TOTAL_JUZ
}

// ═══════════════════════════════════════════════════════════════════════════════
// Aggregate views
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub total_completed_khatmas: u64,
    pub current_khatma_number: u64,
    pub reserved_count: u32,
    pub completed_count: u32,
    pub total_participants: u64,
    pub due_soon_count: u32,
    pub total_referred_participants: u64,
    pub teams_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasbeehCounter {
    pub id: u64,
    pub phrase: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: u64,
    pub event_type: String,
    pub message: String,
    #[serde(default)]
    pub actor_name: Option<String>,
    #[serde(default)]
    pub khatma_number: Option<u64>,
    #[serde(default)]
    pub juz_number: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuaMessage {
    pub id: u64,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Completed-cycle summaries and the daily reading suggestion are rendered
/// as-is by front-ends, so they stay untyped.
pub type KhatmaHistory = Vec<Value>;
pub type DailyWird = Value;

// ═══════════════════════════════════════════════════════════════════════════════
// Participant views
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub name: String,
    #[serde(default)]
    pub reservations_count: u64,
    #[serde(default)]
    pub completions_count: u64,
    #[serde(default)]
    pub tasbeeh_count: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub badges: Vec<Value>,
}

/// Body of `GET /reminders/?name=`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderList {
    #[serde(default)]
    pub items: Vec<ReminderItem>,
    #[serde(default)]
    pub pending_count: u32,
    #[serde(default)]
    pub due_soon_count: u32,
}

/// A reservation held by the participant, as precomputed by the backend.
///
/// `reservation_expires_at` stays the raw string the server sent: it is part
/// of the notification dedup key and must not be re-formatted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderItem {
    pub khatma_number: u64,
    pub juz_number: u32,
    pub reservation_expires_at: String,
    #[serde(default)]
    pub due_soon: bool,
    #[serde(default)]
    pub minutes_left: i64,
}

impl ReminderItem {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.reservation_expires_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Reading
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ayah {
    #[serde(default)]
    pub surah_number: Option<u32>,
    pub surah_name: String,
    #[serde(default)]
    pub number_in_surah: Option<u32>,
    #[serde(default)]
    pub text: String,
}

/// Body of `GET /juz/<n>/`: the text of one readable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuzContent {
    pub juz_number: u32,
    #[serde(default)]
    pub ayah_count: u32,
    #[serde(default)]
    pub first_surah: String,
    #[serde(default)]
    pub last_surah: String,
    #[serde(default)]
    pub ayahs: Vec<Ayah>,
}

/// Ayahs of one surah within a juz, in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct SurahSection<'a> {
    pub surah_number: Option<u32>,
    pub surah_name: &'a str,
    pub ayahs: Vec<&'a Ayah>,
}

impl JuzContent {
    /// Groups ayahs by surah, keeping the order in which surahs first appear.
    pub fn by_surah(&self) -> Vec<SurahSection<'_>> {
        let mut sections: Vec<SurahSection<'_>> = Vec::new();
        for ayah in &self.ayahs {
            let existing = sections.iter_mut().find(|section| {
                section.surah_number == ayah.surah_number && section.surah_name == ayah.surah_name
            });
            match existing {
                Some(section) => section.ayahs.push(ayah),
                None => sections.push(SurahSection {
                    surah_number: ayah.surah_number,
                    surah_name: &ayah.surah_name,
                    ayahs: vec![ayah],
                }),
            }
        }
        sections
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Mutations
// ═══════════════════════════════════════════════════════════════════════════════

/// Body of `POST /reserve/` and `POST /complete-juz/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JuzRequest {
    pub juz_number: u32,
    pub name: String,
}

/// Body of `POST /tasbeeh/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasbeehIncrement {
    pub phrase: String,
    #[serde(default)]
    pub name: String,
}

/// Body of `POST /dua-wall/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDua {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveResponse {
    #[serde(default)]
    pub detail: Option<String>,
    pub reserved_juz: Juz,
    pub khatma_number: u64,
    #[serde(default)]
    pub khatma_completed_now: bool,
    #[serde(default)]
    pub next_khatma_number: Option<u64>,
    #[serde(default)]
    pub participant_stats: Option<ProfileStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteResponse {
    #[serde(default)]
    pub detail: Option<String>,
    pub completed_juz: Juz,
    pub khatma_number: u64,
    #[serde(default)]
    pub khatma_completed_now: bool,
    #[serde(default)]
    pub next_khatma_number: Option<u64>,
    #[serde(default)]
    pub participant_stats: Option<ProfileStats>,
}

/// Extracts the human-readable message from a DRF-style error body.
///
/// Prefers `{"detail": "..."}`, then the first field's first validation
/// message (`{"name": ["..."]}`), then a bare string body.
pub fn error_detail(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => {
            if let Some(Value::String(detail)) = map.get("detail") {
                return Some(detail.clone());
            }
            match map.values().next()? {
                Value::Array(items) => match items.first()? {
                    Value::String(message) => Some(message.clone()),
                    other => Some(other.to_string()),
                },
                Value::String(message) => Some(message.clone()),
                _ => None,
            }
        }
        Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Live updates
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Known `type` discriminators broadcast by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEventKind {
    /// Sent once by the server right after the socket is accepted.
    Connected,
    KhatmaReserved,
    JuzCompleted,
    ReservationExpired,
    TasbeehIncremented,
    DuaAdded,
    TeamCreated,
    TeamJoined,
    Update,
    Other(String),
}

impl LiveEventKind {
    fn from_type(value: &str) -> Self {
        match value {
            "connected" => Self::Connected,
            "khatma_reserved" => Self::KhatmaReserved,
            "juz_completed" => Self::JuzCompleted,
            "reservation_expired" => Self::ReservationExpired,
            "tasbeeh_incremented" => Self::TasbeehIncremented,
            "dua_added" => Self::DuaAdded,
            "team_created" => Self::TeamCreated,
            "team_joined" => Self::TeamJoined,
            "update" => Self::Update,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Inbound push envelope: `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl LiveEvent {
    pub fn kind(&self) -> LiveEventKind {
        LiveEventKind::from_type(&self.event_type)
    }

    /// True for the handshake frame, which announces the connection rather
    /// than a change in server state.
    pub fn is_handshake(&self) -> bool {
        self.kind() == LiveEventKind::Connected
    }

    /// Only the discriminator is checked. The payload is opaque: any
    /// envelope with a type means the server state changed.
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.event_type.trim().is_empty() {
            return Err(ErrorInfo::new("missing_field", "type is required"));
        }
        Ok(())
    }
}

pub fn parse_live_event(raw: &str) -> Result<LiveEvent, ErrorInfo> {
    let event: LiveEvent = serde_json::from_str(raw).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("live event is invalid JSON: {}", err),
        )
    })?;
    event.validate()?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_broadcast_envelope() {
        let event = parse_live_event(
            r#"{"type":"juz_completed","payload":{"khatma_number":4,"juz_number":12}}"#,
        )
        .expect("parse event");
        assert_eq!(event.kind(), LiveEventKind::JuzCompleted);
        assert_eq!(event.payload["juz_number"], 12);
        assert!(!event.is_handshake());
    }

    #[test]
    fn recognises_handshake() {
        let event = parse_live_event(r#"{"type":"connected","detail":"live_updates_connected"}"#)
            .expect("parse handshake");
        assert!(event.is_handshake());
        assert_eq!(event.payload, Value::Null);
    }

    #[test]
    fn unknown_types_are_kept() {
        let event = parse_live_event(r#"{"type":"ramadan_started"}"#).expect("parse");
        assert_eq!(event.kind(), LiveEventKind::Other("ramadan_started".to_string()));
    }

    #[test]
    fn rejects_missing_type() {
        assert!(parse_live_event(r#"{"payload":{}}"#).is_err());
        assert!(parse_live_event(r#"{"type":"  "}"#).is_err());
    }

    #[test]
    fn rejects_non_json_and_non_string_type() {
        assert!(parse_live_event("ping").is_err());
        assert!(parse_live_event("[1,2]").is_err());
        assert!(parse_live_event(r#"{"type":7}"#).is_err());
    }

    #[test]
    fn payload_shape_is_opaque() {
        let list = parse_live_event(r#"{"type":"update","payload":[1,2]}"#).expect("array");
        assert_eq!(list.payload, json!([1, 2]));
        let text = parse_live_event(r#"{"type":"juz_completed","payload":"3"}"#).expect("string");
        assert_eq!(text.kind(), LiveEventKind::JuzCompleted);
        assert!(parse_live_event(r#"{"type":"update","payload":42}"#).is_ok());
    }

    #[test]
    fn long_types_are_kept() {
        let long = "a".repeat(65);
        let raw = json!({ "type": long }).to_string();
        let event = parse_live_event(&raw).expect("long type");
        assert_eq!(event.kind(), LiveEventKind::Other(long));
    }

    #[test]
    fn error_detail_prefers_detail_field() {
        let body = json!({ "detail": "الجزء محجوز بالفعل." });
        assert_eq!(error_detail(&body).as_deref(), Some("الجزء محجوز بالفعل."));
    }

    #[test]
    fn error_detail_falls_back_to_first_field_error() {
        let body = json!({ "juz_number": ["رقم الجزء يجب أن يكون بين 1 و30."] });
        assert_eq!(
            error_detail(&body).as_deref(),
            Some("رقم الجزء يجب أن يكون بين 1 و30.")
        );
        assert_eq!(error_detail(&json!("bad gateway")).as_deref(), Some("bad gateway"));
        assert_eq!(error_detail(&json!({})), None);
    }

    #[test]
    fn reminder_item_keeps_raw_expiry() {
        let item: ReminderItem = serde_json::from_value(json!({
            "khatma_number": 3,
            "juz_number": 7,
            "reservation_expires_at": "2026-03-01T10:00:00.123456+00:00",
            "due_soon": true,
            "minutes_left": 42
        }))
        .expect("parse reminder");
        assert_eq!(item.reservation_expires_at, "2026-03-01T10:00:00.123456+00:00");
        assert!(item.expires_at().is_some());
    }

    #[test]
    fn juz_content_groups_by_surah_in_order() {
        let body: JuzContent = serde_json::from_value(json!({
            "juz_number": 30,
            "ayah_count": 3,
            "first_surah": "سُورَةُ النَّبَإِ",
            "last_surah": "سُورَةُ النَّازِعَاتِ",
            "ayahs": [
                { "surah_number": 78, "surah_name": "سُورَةُ النَّبَإِ", "number_in_surah": 1, "text": "عَمَّ يَتَسَاءَلُونَ" },
                { "surah_number": 78, "surah_name": "سُورَةُ النَّبَإِ", "number_in_surah": 2, "text": "عَنِ النَّبَإِ الْعَظِيمِ" },
                { "surah_number": 79, "surah_name": "سُورَةُ النَّازِعَاتِ", "number_in_surah": 1, "text": "وَالنَّازِعَاتِ غَرْقًا" }
            ]
        }))
        .expect("parse juz content");

        let sections = body.by_surah();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].surah_number, Some(78));
        assert_eq!(sections[0].ayahs.len(), 2);
        assert_eq!(sections[1].ayahs[0].number_in_surah, Some(1));
    }

    #[test]
    fn current_khatma_defaults_total() {
        let body: CurrentKhatma = serde_json::from_value(json!({
            "khatma": { "id": 1, "number": 2, "ajzaa": [] }
        }))
        .expect("parse khatma");
        assert_eq!(body.total_juz, TOTAL_JUZ);
        assert!(body.khatma.ajzaa.is_empty());
    }
}
