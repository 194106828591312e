// src/session_window.rs
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::models::{PointageType, Session};

/// Official bounds of one work session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SessionWindow {
    pub fn duration_minutes(&self) -> i64 {
        minutes_between(self.start, self.end)
    }
}

/// Result of classifying one scan against its session window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "minutes", rename_all = "snake_case")]
pub enum Classification {
    OnTime,
    Late(i64),
    EarlyDeparture(i64),
}

impl Classification {
    pub fn late_minutes(&self) -> i64 {
        match self {
            Classification::Late(m) => *m,
            _ => 0,
        }
    }

    pub fn early_minutes(&self) -> i64 {
        match self {
            Classification::EarlyDeparture(m) => *m,
            _ => 0,
        }
    }
}

/// The two daily windows plus the tolerances applied to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSchedule {
    pub matin: SessionWindow,
    pub apres_midi: SessionWindow,
    /// Minutes after the official start still counted as on time.
    pub grace_minutes: i64,
    /// An exit this close to the arrival needs explicit confirmation.
    pub quick_exit_threshold_minutes: i64,
    /// Scans before this hour are tagged `matin` when the client sends no session.
    pub session_split: NaiveTime,
    /// How far outside its window a scan may fall before it is flagged as implausible.
    pub window_margin_minutes: i64,
}

impl Default for SessionSchedule {
    fn default() -> Self {
        Self {
            matin: SessionWindow {
                start: hm(8, 0),
                end: hm(12, 0),
            },
            apres_midi: SessionWindow {
                start: hm(13, 0),
                end: hm(17, 0),
            },
            grace_minutes: 0,
            quick_exit_threshold_minutes: 5,
            session_split: hm(12, 0),
            window_margin_minutes: 120,
        }
    }
}

impl SessionSchedule {
    pub fn window(&self, session: Session) -> &SessionWindow {
        match session {
            Session::Matin => &self.matin,
            Session::ApresMidi => &self.apres_midi,
        }
    }

    /// The session tag is trusted; only the deltas against its window are computed.
    pub fn classify(&self, session: Session, type_: PointageType, time: NaiveTime) -> Classification {
        let window = self.window(session);
        match type_ {
            PointageType::Arrivee => {
                if minutes_between(window.start, time) <= self.grace_minutes {
                    Classification::OnTime
                } else {
                    Classification::Late(minutes_between(window.start, time).max(0))
                }
            }
            PointageType::Sortie => {
                if time >= window.end {
                    Classification::OnTime
                } else {
                    let early = minutes_between(time, window.end).max(0);
                    if early == 0 {
                        Classification::OnTime
                    } else {
                        Classification::EarlyDeparture(early)
                    }
                }
            }
        }
    }

    /// False for a scan further than the margin from its session window.
    pub fn is_plausible(&self, session: Session, time: NaiveTime) -> bool {
        let window = self.window(session);
        minutes_between(time, window.start) <= self.window_margin_minutes
            && minutes_between(window.end, time) <= self.window_margin_minutes
    }

    pub fn requires_quick_exit_confirmation(&self, arrival: NaiveTime, exit: NaiveTime) -> bool {
        let delta = exit.signed_duration_since(arrival).num_seconds();
        delta >= 0 && delta < self.quick_exit_threshold_minutes * 60
    }

    /// Worked minutes for a session, clamped to the official window.
    pub fn worked_minutes(&self, session: Session, arrival: NaiveTime, departure: NaiveTime) -> i64 {
        let window = self.window(session);
        let from = arrival.max(window.start);
        let to = departure.min(window.end);
        minutes_between(from, to).max(0)
    }

    pub fn session_for_time(&self, time: NaiveTime) -> Session {
        if time < self.session_split {
            Session::Matin
        } else {
            Session::ApresMidi
        }
    }

    /// Full working day length in minutes.
    pub fn daily_minutes(&self) -> i64 {
        self.matin.duration_minutes() + self.apres_midi.duration_minutes()
    }
}

/// Whole minutes from `from` to `to`, truncated; negative when `to` is earlier.
pub fn minutes_between(from: NaiveTime, to: NaiveTime) -> i64 {
    to.signed_duration_since(from).num_minutes()
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
        .map(|t| t.with_nanosecond(0).unwrap_or(t))
}
