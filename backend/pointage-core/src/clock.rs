// src/clock.rs
use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use std::sync::{Arc, Mutex};

/// Wall clock in the site's fixed UTC offset. A pinned clock is used by tests
/// and by batch runs that must be reproducible.
#[derive(Clone, Debug)]
pub struct Clock {
    offset: FixedOffset,
    pinned: Option<Arc<Mutex<NaiveDateTime>>>,
}

impl Clock {
    pub fn system(offset: FixedOffset) -> Self {
        Self {
            offset,
            pinned: None,
        }
    }

    pub fn pinned(at: NaiveDateTime) -> Self {
        Self {
            offset: Utc.fix(),
            pinned: Some(Arc::new(Mutex::new(at))),
        }
    }

    pub fn now_dt(&self) -> NaiveDateTime {
        match &self.pinned {
            Some(at) => match at.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            },
            None => Utc::now().with_timezone(&self.offset).naive_local(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now_dt().date()
    }

    /// Moves a pinned clock; no effect on a system clock.
    pub fn set(&self, at: NaiveDateTime) {
        if let Some(pinned) = &self.pinned {
            if let Ok(mut guard) = pinned.lock() {
                *guard = at;
            }
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now_dt() + by;
        self.set(next);
    }
}
