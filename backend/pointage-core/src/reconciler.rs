// src/reconciler.rs
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::models::{Pointage, PointageType, Session};

/// Canonical arrival/departure per session for one agent on one date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub matin_arrivee: Option<NaiveTime>,
    pub matin_sortie: Option<NaiveTime>,
    pub apres_midi_arrivee: Option<NaiveTime>,
    pub apres_midi_sortie: Option<NaiveTime>,
}

impl DailyRecord {
    pub fn slot(&self, session: Session, type_: PointageType) -> Option<NaiveTime> {
        match (session, type_) {
            (Session::Matin, PointageType::Arrivee) => self.matin_arrivee,
            (Session::Matin, PointageType::Sortie) => self.matin_sortie,
            (Session::ApresMidi, PointageType::Arrivee) => self.apres_midi_arrivee,
            (Session::ApresMidi, PointageType::Sortie) => self.apres_midi_sortie,
        }
    }

    fn slot_mut(&mut self, session: Session, type_: PointageType) -> &mut Option<NaiveTime> {
        match (session, type_) {
            (Session::Matin, PointageType::Arrivee) => &mut self.matin_arrivee,
            (Session::Matin, PointageType::Sortie) => &mut self.matin_sortie,
            (Session::ApresMidi, PointageType::Arrivee) => &mut self.apres_midi_arrivee,
            (Session::ApresMidi, PointageType::Sortie) => &mut self.apres_midi_sortie,
        }
    }

    /// A session counts as attended when it has at least one scan.
    pub fn has_session(&self, session: Session) -> bool {
        self.slot(session, PointageType::Arrivee).is_some()
            || self.slot(session, PointageType::Sortie).is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_session(Session::Matin) && !self.has_session(Session::ApresMidi)
    }
}

/// Data problems kept on the day for admin review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    DepartureWithoutArrival { session: Session },
    ArrivalWithoutDeparture { session: Session },
    DepartureBeforeArrival { session: Session },
    ScanOnRestDay { scans: usize },
    ScanOnHoliday { scans: usize },
    OutOfWindow {
        session: Session,
        #[serde(rename = "type")]
        type_: PointageType,
        heure: NaiveTime,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledDay {
    pub record: DailyRecord,
    pub anomalies: Vec<Anomaly>,
}

impl ReconciledDay {
    pub fn needs_review(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

/// Reduces raw scans of one agent/date to a `DailyRecord`.
///
/// Cancelled scans are ignored. Within a session the earliest arrival and the
/// latest departure win, so the result does not depend on input order. Missing
/// counterparts are never invented; they show up as anomalies instead.
pub fn reconcile<'a, I>(scans: I) -> ReconciledDay
where
    I: IntoIterator<Item = &'a Pointage>,
{
    let mut record = DailyRecord::default();

    for scan in scans.into_iter().filter(|p| p.is_active()) {
        let slot = record.slot_mut(scan.session, scan.type_);
        *slot = match (scan.type_, *slot) {
            (_, None) => Some(scan.heure),
            (PointageType::Arrivee, Some(current)) => Some(current.min(scan.heure)),
            (PointageType::Sortie, Some(current)) => Some(current.max(scan.heure)),
        };
    }

    let mut anomalies = Vec::new();
    for session in Session::BOTH {
        match (
            record.slot(session, PointageType::Arrivee),
            record.slot(session, PointageType::Sortie),
        ) {
            (None, Some(_)) => anomalies.push(Anomaly::DepartureWithoutArrival { session }),
            (Some(_), None) => anomalies.push(Anomaly::ArrivalWithoutDeparture { session }),
            (Some(arrival), Some(departure)) if departure < arrival => {
                anomalies.push(Anomaly::DepartureBeforeArrival { session })
            }
            _ => {}
        }
    }

    ReconciledDay { record, anomalies }
}
