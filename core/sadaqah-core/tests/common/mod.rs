//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use sadaqah_core::{
    Backend, Connector, FrameStream, LiveError, NotificationPermission, Notifier,
    ReminderNotification, Result,
};
use sadaqah_protocol::{
    ActivityEvent, Ayah, CompleteResponse, CurrentKhatma, DailyWird, DuaMessage, Juz,
    JuzContent, JuzRequest,
    Khatma, KhatmaHistory, NewDua, ProfileStats, ReminderItem, ReminderList, ReserveResponse,
    Stats, TasbeehCounter, TasbeehIncrement,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use url::Url;

// ═══════════════════════════════════════════════════════════════════════════════
// Backend
// ═══════════════════════════════════════════════════════════════════════════════

pub const CURRENT_KHATMA: &str = "/current-khatma/";
pub const STATS: &str = "/stats/";
pub const REMINDERS: &str = "/reminders/";
pub const PROFILE_STATS: &str = "/profile-stats/";
pub const JUZ_CONTENT: &str = "/juz/";

#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: Mutex<HashSet<&'static str>>,
    /// Per-call (delay, cycle number) for `current_khatma`.
    khatma_script: Mutex<VecDeque<(Duration, u64)>>,
    cycle: AtomicU64,
    reminder_items: Mutex<Vec<ReminderItem>>,
    profile_names: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.cycle.store(1, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn fail(&self, endpoint: &'static str) {
        self.failing.lock().unwrap().insert(endpoint);
    }

    pub fn recover(&self, endpoint: &'static str) {
        self.failing.lock().unwrap().remove(endpoint);
    }

    pub fn set_cycle(&self, number: u64) {
        self.cycle.store(number, Ordering::SeqCst);
    }

    pub fn script_khatma(&self, delay: Duration, number: u64) {
        self.khatma_script.lock().unwrap().push_back((delay, number));
    }

    pub fn set_reminders(&self, items: Vec<ReminderItem>) {
        *self.reminder_items.lock().unwrap() = items;
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profile_names.lock().unwrap().clone()
    }

    fn hit(&self, endpoint: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(endpoint).or_default() += 1;
        if self.failing.lock().unwrap().contains(endpoint) {
            return Err(LiveError::Network {
                endpoint: endpoint.to_string(),
                details: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn cycle_number(&self) -> u64 {
        self.cycle.load(Ordering::SeqCst)
    }
}

pub fn juz(number: u32) -> Juz {
    Juz {
        id: u64::from(number),
        juz_number: number,
        reserved_by: None,
        reserved_at: None,
        reservation_expires_at: None,
        completed_by: None,
        completed_at: None,
        is_reserved: false,
        is_completed: false,
        is_expired: false,
        read_url: None,
    }
}

pub fn khatma(number: u64) -> CurrentKhatma {
    CurrentKhatma {
        khatma: Khatma {
            id: number,
            number,
            is_completed: false,
            created_at: None,
            completed_at: None,
            ajzaa: (1..=30).map(juz).collect(),
        },
        reserved_count: 0,
        completed_count: 0,
        total_juz: 30,
        reservation_expiry_hours: Some(24.0),
    }
}

pub fn reminder(cycle: u64, unit: u32, due_soon: bool) -> ReminderItem {
    ReminderItem {
        khatma_number: cycle,
        juz_number: unit,
        reservation_expires_at: format!("2026-03-01T{:02}:00:00+00:00", unit % 24),
        due_soon,
        minutes_left: if due_soon { 30 } else { 600 },
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn current_khatma(&self) -> Result<CurrentKhatma> {
        self.hit(CURRENT_KHATMA)?;
        let scripted = self.khatma_script.lock().unwrap().pop_front();
        match scripted {
            Some((delay, number)) => {
                sleep(delay).await;
                Ok(khatma(number))
            }
            None => Ok(khatma(self.cycle_number())),
        }
    }

    async fn stats(&self) -> Result<Stats> {
        self.hit(STATS)?;
        Ok(Stats {
            current_khatma_number: self.cycle_number(),
            ..Stats::default()
        })
    }

    async fn tasbeeh(&self) -> Result<Vec<TasbeehCounter>> {
        self.hit("/tasbeeh/")?;
        Ok(vec![TasbeehCounter {
            id: 1,
            phrase: "subhan allah".to_string(),
            count: 33,
        }])
    }

    async fn activity_feed(&self, _limit: u32) -> Result<Vec<ActivityEvent>> {
        self.hit("/activity/")?;
        Ok(Vec::new())
    }

    async fn dua_wall(&self) -> Result<Vec<DuaMessage>> {
        self.hit("/dua-wall/")?;
        Ok(Vec::new())
    }

    async fn khatma_history(&self, _limit: u32) -> Result<KhatmaHistory> {
        self.hit("/khatma-history/")?;
        Ok(Vec::new())
    }

    async fn daily_wird(&self) -> Result<DailyWird> {
        self.hit("/daily-wird/")?;
        Ok(serde_json::json!({ "juz_number": 7 }))
    }

    async fn profile_stats(&self, name: &str) -> Result<ProfileStats> {
        self.hit(PROFILE_STATS)?;
        self.profile_names.lock().unwrap().push(name.to_string());
        Ok(ProfileStats {
            name: name.to_string(),
            reservations_count: 2,
            ..ProfileStats::default()
        })
    }

    async fn reminders(&self, _name: &str) -> Result<ReminderList> {
        self.hit(REMINDERS)?;
        let items = self.reminder_items.lock().unwrap().clone();
        let due_soon_count = items.iter().filter(|item| item.due_soon).count() as u32;
        Ok(ReminderList {
            pending_count: items.len() as u32,
            due_soon_count,
            items,
        })
    }

    async fn reserve_juz(&self, request: &JuzRequest) -> Result<ReserveResponse> {
        self.hit("/reserve/")?;
        let mut unit = juz(request.juz_number);
        unit.reserved_by = Some(request.name.clone());
        unit.is_reserved = true;
        unit.reservation_expires_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        Ok(ReserveResponse {
            detail: None,
            reserved_juz: unit,
            khatma_number: self.cycle_number(),
            khatma_completed_now: false,
            next_khatma_number: None,
            participant_stats: Some(ProfileStats {
                name: request.name.clone(),
                reservations_count: 3,
                ..ProfileStats::default()
            }),
        })
    }

    async fn complete_juz(&self, request: &JuzRequest) -> Result<CompleteResponse> {
        self.hit("/complete-juz/")?;
        let cycle = self.cycle_number();
        let mut unit = juz(request.juz_number);
        unit.completed_by = Some(request.name.clone());
        unit.is_completed = true;
        let finished = request.juz_number == 30;
        if finished {
            self.set_cycle(cycle + 1);
        }
        Ok(CompleteResponse {
            detail: None,
            completed_juz: unit,
            khatma_number: cycle,
            khatma_completed_now: finished,
            next_khatma_number: finished.then_some(cycle + 1),
            participant_stats: None,
        })
    }

    async fn increment_tasbeeh(&self, request: &TasbeehIncrement) -> Result<TasbeehCounter> {
        self.hit("/tasbeeh/increment")?;
        Ok(TasbeehCounter {
            id: 1,
            phrase: request.phrase.clone(),
            count: 34,
        })
    }

    async fn juz_content(&self, juz_number: u32) -> Result<JuzContent> {
        self.hit(JUZ_CONTENT)?;
        let ayah = |number_in_surah| Ayah {
            surah_number: Some(1),
            surah_name: "الفاتحة".to_string(),
            number_in_surah: Some(number_in_surah),
            text: format!("ayah {number_in_surah}"),
        };
        Ok(JuzContent {
            juz_number,
            ayah_count: 2,
            first_surah: "الفاتحة".to_string(),
            last_surah: "الفاتحة".to_string(),
            ayahs: vec![ayah(1), ayah(2)],
        })
    }

    async fn create_dua(&self, request: &NewDua) -> Result<DuaMessage> {
        self.hit("/dua-wall/create")?;
        Ok(DuaMessage {
            id: 9,
            name: request.name.clone(),
            content: request.content.clone(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Connector
// ═══════════════════════════════════════════════════════════════════════════════

enum Dial {
    Refuse,
    Accept(mpsc::UnboundedReceiver<Result<String>>),
    Hang,
}

/// Scripted transport: each connect pops the next dial, refusing once the
/// script runs out.
#[derive(Default)]
pub struct FakeConnector {
    dials: Mutex<VecDeque<Dial>>,
    attempts: Mutex<Vec<Instant>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self) {
        self.dials.lock().unwrap().push_back(Dial::Refuse);
    }

    /// Queues a successful connection and returns the server side of it.
    /// Dropping the sender closes the socket from the remote end.
    pub fn accept(&self) -> mpsc::UnboundedSender<Result<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.dials.lock().unwrap().push_back(Dial::Accept(rx));
        tx
    }

    /// Queues a connection attempt that never resolves.
    pub fn hang(&self) {
        self.dials.lock().unwrap().push_back(Dial::Hang);
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &Url) -> Result<FrameStream> {
        self.attempts.lock().unwrap().push(Instant::now());
        let dial = self.dials.lock().unwrap().pop_front();
        match dial {
            Some(Dial::Accept(rx)) => {
                let frames = futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|frame| (frame, rx))
                });
                Ok(frames.boxed())
            }
            Some(Dial::Hang) => futures::future::pending().await,
            Some(Dial::Refuse) | None => Err(LiveError::Connect("connection refused".to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Notifier
// ═══════════════════════════════════════════════════════════════════════════════

pub struct RecordingNotifier {
    permission: Mutex<Option<NotificationPermission>>,
    answer: NotificationPermission,
    shown: Mutex<Vec<ReminderNotification>>,
}

impl RecordingNotifier {
    pub fn granted() -> Arc<Self> {
        Self::with(
            Some(NotificationPermission::Granted),
            NotificationPermission::Granted,
        )
    }

    /// Host that has never been asked and answers `answer` when prompted.
    pub fn asking(answer: NotificationPermission) -> Arc<Self> {
        Self::with(Some(NotificationPermission::Default), answer)
    }

    pub fn unsupported() -> Arc<Self> {
        Self::with(None, NotificationPermission::Denied)
    }

    fn with(permission: Option<NotificationPermission>, answer: NotificationPermission) -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(permission),
            answer,
            shown: Mutex::new(Vec::new()),
        })
    }

    pub fn shown(&self) -> Vec<ReminderNotification> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn permission(&self) -> Option<NotificationPermission> {
        *self.permission.lock().unwrap()
    }

    async fn request_permission(&self) -> NotificationPermission {
        let mut permission = self.permission.lock().unwrap();
        *permission = Some(self.answer);
        self.answer
    }

    fn notify(&self, notification: &ReminderNotification) -> Result<()> {
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
