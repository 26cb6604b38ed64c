//! Explicit user actions: the only writes the client makes.
//!
//! Each action validates locally, posts, reports the outcome inline on the
//! coordinator's status and then re-reads the canonical state. Snapshots
//! are never patched in place.

use std::sync::Arc;

use sadaqah_protocol::{
    DuaMessage, Juz, JuzContent, JuzRequest, NewDua, ProfileStats, TasbeehCounter, TasbeehIncrement,
    MAX_NAME_CHARS, MIN_DUA_CHARS, TOTAL_JUZ,
};
use tracing::info;

use crate::error::{LiveError, Result};
use crate::reminders::ReminderScheduler;
use crate::sync::{RefreshMode, SyncCoordinator};

#[derive(Debug, Clone, PartialEq)]
pub struct ReservationOutcome {
    pub unit: Juz,
    pub cycle_number: u64,
    pub participant_stats: Option<ProfileStats>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub unit: Juz,
    pub cycle_number: u64,
    /// This completion finished the cycle.
    pub cycle_completed_now: bool,
    /// Number of the cycle opened in its place, when one was.
    pub next_cycle_number: Option<u64>,
    pub participant_stats: Option<ProfileStats>,
}

pub struct Actions {
    coordinator: Arc<SyncCoordinator>,
    reminders: Arc<ReminderScheduler>,
}

impl Actions {
    pub fn new(coordinator: Arc<SyncCoordinator>, reminders: Arc<ReminderScheduler>) -> Self {
        Self {
            coordinator,
            reminders,
        }
    }

    pub async fn reserve(&self, name: &str, juz_number: u32) -> Result<ReservationOutcome> {
        let request = self.surface(juz_request(name, juz_number))?;
        let response = self
            .surface(self.coordinator.backend().reserve_juz(&request).await)?;

        info!(name = %request.name, juz_number, khatma = response.khatma_number, "Juz reserved");
        self.coordinator.report_notice(format!(
            "Juz {} is reserved for {}.",
            response.reserved_juz.juz_number, request.name
        ));
        if let Some(stats) = &response.participant_stats {
            self.coordinator
                .publish_profile_stats(&request.name, stats.clone());
        }

        self.follow_up(&request.name).await;
        self.reminders.check_and_notify(&request.name).await;

        Ok(ReservationOutcome {
            unit: response.reserved_juz,
            cycle_number: response.khatma_number,
            participant_stats: response.participant_stats,
        })
    }

    pub async fn complete(&self, name: &str, juz_number: u32) -> Result<CompletionOutcome> {
        let request = self.surface(juz_request(name, juz_number))?;
        let response = self
            .surface(self.coordinator.backend().complete_juz(&request).await)?;

        info!(
            name = %request.name,
            juz_number,
            khatma = response.khatma_number,
            khatma_completed_now = response.khatma_completed_now,
            "Juz completed"
        );
        let notice = match (response.khatma_completed_now, response.next_khatma_number) {
            (true, Some(next)) => format!(
                "Khatma {} is complete and khatma {} has begun.",
                response.khatma_number, next
            ),
            (true, None) => format!("Khatma {} is complete.", response.khatma_number),
            (false, _) => format!(
                "Juz {} is recorded as completed.",
                response.completed_juz.juz_number
            ),
        };
        self.coordinator.report_notice(notice);
        if let Some(stats) = &response.participant_stats {
            self.coordinator
                .publish_profile_stats(&request.name, stats.clone());
        }

        self.follow_up(&request.name).await;

        Ok(CompletionOutcome {
            unit: response.completed_juz,
            cycle_number: response.khatma_number,
            cycle_completed_now: response.khatma_completed_now,
            next_cycle_number: response.next_khatma_number,
            participant_stats: response.participant_stats,
        })
    }

    /// Name is optional for counters; an anonymous increment still counts.
    pub async fn increment_tasbeeh(&self, phrase: &str, name: &str) -> Result<TasbeehCounter> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(self.rejected(LiveError::InvalidInput(
                "A phrase is required.".to_string(),
            )));
        }
        let request = TasbeehIncrement {
            phrase: phrase.to_string(),
            name: name.trim().to_string(),
        };
        let counter = self
            .surface(self.coordinator.backend().increment_tasbeeh(&request).await)?;

        let _ = self.coordinator.refresh(RefreshMode::Silent).await;
        if !request.name.is_empty() {
            let _ = self
                .coordinator
                .refresh_profile(&request.name, RefreshMode::Silent)
                .await;
        }
        Ok(counter)
    }

    pub async fn create_dua(&self, name: &str, content: &str) -> Result<DuaMessage> {
        let name = name.trim();
        let content = content.trim();
        if name.is_empty() {
            return Err(self.rejected(LiveError::MissingParticipantName));
        }
        if content.chars().count() < MIN_DUA_CHARS {
            return Err(self.rejected(LiveError::InvalidInput(
                "The message is too short.".to_string(),
            )));
        }
        let request = NewDua {
            name: name.to_string(),
            content: content.to_string(),
        };
        let created = self
            .surface(self.coordinator.backend().create_dua(&request).await)?;

        self.coordinator.report_notice("Your dua was added.");
        let _ = self.coordinator.refresh(RefreshMode::Silent).await;
        Ok(created)
    }

    /// Text of one juz for reading. Nothing is written and no refresh follows.
    pub async fn read_juz(&self, juz_number: u32) -> Result<JuzContent> {
        self.surface(check_juz_number(juz_number))?;
        self.surface(self.coordinator.backend().juz_content(juz_number).await)
    }

    async fn follow_up(&self, name: &str) {
        let _ = self.coordinator.refresh(RefreshMode::Silent).await;
        let _ = self
            .coordinator
            .refresh_profile(name, RefreshMode::Silent)
            .await;
    }

    fn surface<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|err| self.rejected(err))
    }

    fn rejected(&self, err: LiveError) -> LiveError {
        self.coordinator.report_error(&err);
        err
    }
}

fn juz_request(name: &str, juz_number: u32) -> Result<JuzRequest> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LiveError::MissingParticipantName);
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(LiveError::InvalidInput("The name is too long.".to_string()));
    }
    check_juz_number(juz_number)?;
    Ok(JuzRequest {
        juz_number,
        name: name.to_string(),
    })
}

fn check_juz_number(juz_number: u32) -> Result<()> {
    if !(1..=TOTAL_JUZ).contains(&juz_number) {
        return Err(LiveError::InvalidInput(format!(
            "Juz number must be between 1 and {TOTAL_JUZ}."
        )));
    }
    Ok(())
}
