use std::sync::Mutex;

use crate::domain::notice::{Notice, NoticeLevel};
use crate::domain::ports::Notifier;

/// Writes notices to the application log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        let message = notice.message.as_deref().unwrap_or("");
        match notice.level {
            NoticeLevel::Info => log::info!("notice: {} {}", notice.title, message),
            NoticeLevel::Warning => log::warn!("notice: {} {}", notice.title, message),
            NoticeLevel::Error => log::error!("notice: {} {}", notice.title, message),
        }
    }
}

/// Keeps every notice so callers can inspect what a user would have seen.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and forgets everything recorded so far.
    pub fn take(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(mut notices) => std::mem::take(&mut *notices),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn titles(&self) -> Vec<String> {
        match self.notices.lock() {
            Ok(notices) => notices.iter().map(|n| n.title.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        log::debug!("recorded notice: {}", notice.title);
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}
