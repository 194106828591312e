// src/attendance.rs
use chrono::{Datelike, Days, NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::calendar::{CalendarResolver, DayKind};
use crate::models::{JourFerie, Pointage, PointageType, Session};
use crate::reconciler::{reconcile, Anomaly, DailyRecord, ReconciledDay};
use crate::session_window::SessionSchedule;

// --- Policy ---

/// Monetary penalties derived from attendance, in DA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyRates {
    /// Per minute of lateness or early departure.
    pub per_minute: Decimal,
    /// Per full absence day; half of it for a missing session.
    pub per_absence_day: Decimal,
}

impl Default for PenaltyRates {
    fn default() -> Self {
        Self {
            per_minute: Decimal::ZERO,
            per_absence_day: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendancePolicy {
    pub schedule: SessionSchedule,
    pub work_days: Vec<Weekday>,
    pub penalties: PenaltyRates,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            schedule: SessionSchedule::default(),
            work_days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            penalties: PenaltyRates::default(),
        }
    }
}

impl AttendancePolicy {
    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        self.work_days.contains(&date.weekday())
    }
}

// --- Per-day output ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Present,
    Late,
    PartialAbsence,
    Absent,
    Holiday,
    RestDay,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPenalties {
    pub retard: Decimal,
    pub absence: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayInfo {
    pub id: String,
    pub date: NaiveDate,
    pub nom: String,
}

impl From<&JourFerie> for HolidayInfo {
    fn from(h: &JourFerie) -> Self {
        Self {
            id: h.id.clone(),
            date: h.date,
            nom: h.nom.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStatus {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub pointages: DailyRecord,
    pub retard_matin_minutes: i64,
    pub retard_apres_midi_minutes: i64,
    pub retard_total_minutes: i64,
    pub sortie_anticipee_matin_minutes: i64,
    pub sortie_anticipee_apres_midi_minutes: i64,
    pub sortie_anticipee_total_minutes: i64,
    pub worked_minutes: i64,
    pub absent_sessions: Vec<Session>,
    /// 1.0 for a full-day absence, 0.5 for a missing session.
    pub absence_fraction: Decimal,
    pub jour_ferie: Option<HolidayInfo>,
    /// Holiday the agent had to work (exception on record).
    pub holiday_bonus_eligible: bool,
    pub penalites: DayPenalties,
    pub anomalies: Vec<Anomaly>,
    pub needs_review: bool,
}

impl DailyStatus {
    fn blank(date: NaiveDate, status: DayStatus, reconciled: ReconciledDay) -> Self {
        let needs_review = reconciled.needs_review();
        Self {
            date,
            status,
            pointages: reconciled.record,
            retard_matin_minutes: 0,
            retard_apres_midi_minutes: 0,
            retard_total_minutes: 0,
            sortie_anticipee_matin_minutes: 0,
            sortie_anticipee_apres_midi_minutes: 0,
            sortie_anticipee_total_minutes: 0,
            worked_minutes: 0,
            absent_sessions: Vec::new(),
            absence_fraction: Decimal::ZERO,
            jour_ferie: None,
            holiday_bonus_eligible: false,
            penalites: DayPenalties::default(),
            anomalies: reconciled.anomalies,
            needs_review,
        }
    }

    /// Worked at least one session.
    pub fn is_worked(&self) -> bool {
        matches!(self.status, DayStatus::Present | DayStatus::Late | DayStatus::PartialAbsence)
    }

    /// Worked holiday that earns the flat-day bonus.
    pub fn earns_holiday_bonus(&self) -> bool {
        self.holiday_bonus_eligible && self.is_worked()
    }
}

// --- Totals ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceTotals {
    pub jours_travailles: u32,
    pub jours_absence: Decimal,
    pub jours_ouvres_attendus: u32,
    pub jours_feries_payes: u32,
    pub jours_feries_travailles: u32,
    pub jours_a_revoir: u32,
    pub retard_matin_minutes: i64,
    pub retard_apres_midi_minutes: i64,
    pub retard_total_minutes: i64,
    pub sortie_anticipee_matin_minutes: i64,
    pub sortie_anticipee_apres_midi_minutes: i64,
    pub sortie_anticipee_total_minutes: i64,
    pub worked_minutes: i64,
    pub penalites_retard: Decimal,
    pub penalites_absence: Decimal,
    pub penalites_total: Decimal,
}

impl AttendanceTotals {
    fn add(&mut self, day: &DailyStatus) {
        match day.status {
            DayStatus::Holiday => self.jours_feries_payes += 1,
            DayStatus::RestDay => {}
            _ => self.jours_ouvres_attendus += 1,
        }
        if day.is_worked() {
            self.jours_travailles += 1;
        }
        if day.earns_holiday_bonus() {
            self.jours_feries_travailles += 1;
        }
        if day.needs_review {
            self.jours_a_revoir += 1;
        }
        self.jours_absence += day.absence_fraction;
        self.retard_matin_minutes += day.retard_matin_minutes;
        self.retard_apres_midi_minutes += day.retard_apres_midi_minutes;
        self.retard_total_minutes += day.retard_total_minutes;
        self.sortie_anticipee_matin_minutes += day.sortie_anticipee_matin_minutes;
        self.sortie_anticipee_apres_midi_minutes += day.sortie_anticipee_apres_midi_minutes;
        self.sortie_anticipee_total_minutes += day.sortie_anticipee_total_minutes;
        self.worked_minutes += day.worked_minutes;
        self.penalites_retard += day.penalites.retard;
        self.penalites_absence += day.penalites.absence;
        self.penalites_total += day.penalites.total;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub agent_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub per_day: Vec<DailyStatus>,
    pub totals: AttendanceTotals,
}

impl AttendanceReport {
    pub fn holiday_bonus_days(&self) -> impl Iterator<Item = &DailyStatus> {
        self.per_day.iter().filter(|d| d.earns_holiday_bonus())
    }
}

// --- Aggregation ---

/// Walks `[start, end]` for one agent and classifies every date. Scans of
/// other agents, cancelled scans and scans outside the range are ignored.
/// Every date of the range is present in the output, in order.
pub fn aggregate(
    agent_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    scans: &[Pointage],
    calendar: &CalendarResolver,
    policy: &AttendancePolicy,
) -> AttendanceReport {
    let mut by_date: BTreeMap<NaiveDate, Vec<&Pointage>> = BTreeMap::new();
    for scan in scans
        .iter()
        .filter(|p| p.agent_id == agent_id && p.is_active() && p.date >= start && p.date <= end)
    {
        by_date.entry(scan.date).or_default().push(scan);
    }

    let mut per_day = Vec::new();
    let mut totals = AttendanceTotals::default();

    let mut date = start;
    while date <= end {
        let day_scans = by_date.get(&date).map(Vec::as_slice).unwrap_or(&[]);
        let day = classify_day(agent_id, date, day_scans, calendar, policy);
        if day.needs_review {
            warn!(
                "Agent {} on {} flagged for review: {:?}",
                agent_id, day.date, day.anomalies
            );
        }
        totals.add(&day);
        per_day.push(day);

        date = match date.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    debug!(
        "Aggregated {} day(s) for agent {}: worked={} absence={} retard={}min",
        per_day.len(),
        agent_id,
        totals.jours_travailles,
        totals.jours_absence,
        totals.retard_total_minutes
    );

    AttendanceReport {
        agent_id: agent_id.to_string(),
        start,
        end,
        per_day,
        totals,
    }
}

fn classify_day(
    agent_id: &str,
    date: NaiveDate,
    scans: &[&Pointage],
    calendar: &CalendarResolver,
    policy: &AttendancePolicy,
) -> DailyStatus {
    let reconciled = reconcile(scans.iter().copied());

    // An exception turns the holiday into a working day even on a rest weekday.
    match calendar.resolve(date, agent_id) {
        DayKind::HolidayWorked(holiday, _) => {
            let mut day = evaluate_attendance(date, reconciled, policy);
            day.jour_ferie = Some(holiday.into());
            day.holiday_bonus_eligible = true;
            day
        }
        _ if !policy.is_work_day(date) => {
            let mut day = day_off(date, DayStatus::RestDay, reconciled, scans.len());
            day.jour_ferie = calendar.is_holiday(date).map(HolidayInfo::from);
            day
        }
        DayKind::Holiday(holiday) => {
            // Paid day off: excluded from absence, lateness and worked time.
            let mut day = day_off(date, DayStatus::Holiday, reconciled, scans.len());
            day.jour_ferie = Some(holiday.into());
            day
        }
        DayKind::Regular => evaluate_attendance(date, reconciled, policy),
    }
}

/// Scans on a day off are kept for display but only their count is flagged.
fn day_off(date: NaiveDate, status: DayStatus, reconciled: ReconciledDay, scans: usize) -> DailyStatus {
    let mut day = DailyStatus::blank(date, status, reconciled);
    day.anomalies.clear();
    if scans > 0 {
        day.anomalies.push(match status {
            DayStatus::Holiday => Anomaly::ScanOnHoliday { scans },
            _ => Anomaly::ScanOnRestDay { scans },
        });
    }
    day.needs_review = !day.anomalies.is_empty();
    day
}

fn evaluate_attendance(date: NaiveDate, reconciled: ReconciledDay, policy: &AttendancePolicy) -> DailyStatus {
    let schedule = &policy.schedule;
    let record = reconciled.record;
    let mut day = DailyStatus::blank(date, DayStatus::Present, reconciled);

    for session in Session::BOTH {
        if !record.has_session(session) {
            day.absent_sessions.push(session);
            continue;
        }
        let arrival = record.slot(session, PointageType::Arrivee);
        let departure = record.slot(session, PointageType::Sortie);

        for (type_, heure) in [(PointageType::Arrivee, arrival), (PointageType::Sortie, departure)] {
            if let Some(heure) = heure.filter(|t| !schedule.is_plausible(session, *t)) {
                day.anomalies.push(Anomaly::OutOfWindow { session, type_, heure });
            }
        }

        let late = arrival
            .map(|t| schedule.classify(session, PointageType::Arrivee, t).late_minutes())
            .unwrap_or(0);
        let early = departure
            .map(|t| schedule.classify(session, PointageType::Sortie, t).early_minutes())
            .unwrap_or(0);

        // A missing slot is credited from the official boundary; the day is already flagged.
        let window = schedule.window(session);
        day.worked_minutes += schedule.worked_minutes(
            session,
            arrival.unwrap_or(window.start),
            departure.unwrap_or(window.end),
        );

        match session {
            Session::Matin => {
                day.retard_matin_minutes = late;
                day.sortie_anticipee_matin_minutes = early;
            }
            Session::ApresMidi => {
                day.retard_apres_midi_minutes = late;
                day.sortie_anticipee_apres_midi_minutes = early;
            }
        }
    }

    day.needs_review = !day.anomalies.is_empty();
    day.retard_total_minutes = day.retard_matin_minutes + day.retard_apres_midi_minutes;
    day.sortie_anticipee_total_minutes =
        day.sortie_anticipee_matin_minutes + day.sortie_anticipee_apres_midi_minutes;
    day.absence_fraction = dec!(0.5) * Decimal::from(day.absent_sessions.len() as u32);

    day.status = match day.absent_sessions.len() {
        2 => DayStatus::Absent,
        1 => DayStatus::PartialAbsence,
        _ if day.retard_total_minutes + day.sortie_anticipee_total_minutes > 0 => DayStatus::Late,
        _ => DayStatus::Present,
    };

    let penalised_minutes = Decimal::from(day.retard_total_minutes + day.sortie_anticipee_total_minutes);
    let retard = policy.penalties.per_minute * penalised_minutes;
    let absence = policy.penalties.per_absence_day * day.absence_fraction;
    day.penalites = DayPenalties {
        retard,
        absence,
        total: retard + absence,
    };

    day
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HolidayException, HolidayType};
    use crate::session_window::parse_time;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn scan(agent: &str, date: &str, session: Session, type_: PointageType, heure: &str) -> Pointage {
        Pointage {
            id: format!("{}-{}-{}-{}-{}", agent, date, session, type_, heure),
            agent_id: agent.to_string(),
            date: d(date),
            heure: parse_time(heure).unwrap(),
            type_,
            session,
            annule: false,
            justification_annulation: None,
            annule_par: None,
            confirmed_quick_exit: false,
            idempotency_key: None,
            recorded_at: None,
        }
    }

    fn full_day(agent: &str, date: &str, arrival: &str) -> Vec<Pointage> {
        vec![
            scan(agent, date, Session::Matin, PointageType::Arrivee, arrival),
            scan(agent, date, Session::Matin, PointageType::Sortie, "12:00:00"),
            scan(agent, date, Session::ApresMidi, PointageType::Arrivee, "13:00:00"),
            scan(agent, date, Session::ApresMidi, PointageType::Sortie, "17:00:00"),
        ]
    }

    fn penalised_policy() -> AttendancePolicy {
        AttendancePolicy {
            penalties: PenaltyRates {
                per_minute: dec!(10),
                per_absence_day: dec!(2000),
            },
            ..AttendancePolicy::default()
        }
    }

    fn may_day_calendar() -> CalendarResolver {
        CalendarResolver::new(
            vec![JourFerie {
                id: "jf-mai".to_string(),
                date: d("2025-05-01"),
                nom: "Fête du Travail".to_string(),
                description: None,
                type_: HolidayType::Legal,
                recurrent: true,
            }],
            vec![HolidayException {
                id: "ex1".to_string(),
                jour_ferie_id: "jf-mai".to_string(),
                agent_id: "A1".to_string(),
                motif: None,
            }],
        )
    }

    #[test]
    fn full_on_time_day_is_present() {
        let scans = full_day("A1", "2025-03-03", "07:55:00");
        let report = aggregate("A1", d("2025-03-03"), d("2025-03-03"), &scans, &CalendarResolver::default(), &AttendancePolicy::default());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::Present);
        assert_eq!(day.worked_minutes, 480);
        assert_eq!(day.retard_total_minutes, 0);
        assert_eq!(report.totals.jours_travailles, 1);
        assert_eq!(report.totals.jours_absence, Decimal::ZERO);
    }

    #[test]
    fn late_and_early_minutes_are_split_by_session() {
        let mut scans = full_day("A1", "2025-03-03", "08:20:00");
        scans[3].heure = parse_time("16:45:00").unwrap();
        let report = aggregate("A1", d("2025-03-03"), d("2025-03-03"), &scans, &CalendarResolver::default(), &penalised_policy());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::Late);
        assert_eq!(day.retard_matin_minutes, 20);
        assert_eq!(day.retard_apres_midi_minutes, 0);
        assert_eq!(day.sortie_anticipee_apres_midi_minutes, 15);
        assert_eq!(day.worked_minutes, 480 - 35);
        assert_eq!(day.penalites.retard, dec!(350));
        assert_eq!(day.penalites.absence, Decimal::ZERO);
    }

    #[test]
    fn partial_absence_penalises_missing_session_only() {
        let scans = vec![
            scan("A1", "2025-03-04", Session::Matin, PointageType::Arrivee, "08:00:00"),
            scan("A1", "2025-03-04", Session::Matin, PointageType::Sortie, "12:00:00"),
        ];
        let report = aggregate("A1", d("2025-03-04"), d("2025-03-04"), &scans, &CalendarResolver::default(), &penalised_policy());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::PartialAbsence);
        assert_eq!(day.retard_matin_minutes, 0);
        assert_eq!(day.absent_sessions, vec![Session::ApresMidi]);
        assert_eq!(day.absence_fraction, dec!(0.5));
        assert_eq!(day.worked_minutes, 240);
        assert_eq!(day.penalites.absence, dec!(1000));
        assert_eq!(report.totals.jours_absence, dec!(0.5));
        assert_eq!(report.totals.jours_travailles, 1);
    }

    #[test]
    fn no_scans_is_full_absence() {
        let report = aggregate("A1", d("2025-03-05"), d("2025-03-05"), &[], &CalendarResolver::default(), &penalised_policy());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::Absent);
        assert_eq!(day.absence_fraction, dec!(1));
        assert_eq!(day.penalites.total, dec!(2000));
        assert_eq!(report.totals.jours_travailles, 0);
    }

    #[test]
    fn weekends_are_rest_days_and_not_absences() {
        // 2025-03-08 is a Saturday.
        let report = aggregate("A1", d("2025-03-08"), d("2025-03-09"), &[], &CalendarResolver::default(), &penalised_policy());
        assert!(report.per_day.iter().all(|d| d.status == DayStatus::RestDay));
        assert_eq!(report.totals.jours_absence, Decimal::ZERO);
        assert_eq!(report.totals.jours_ouvres_attendus, 0);
    }

    #[test]
    fn rest_day_scans_are_flagged() {
        let scans = full_day("A1", "2025-03-08", "08:00:00");
        let report = aggregate("A1", d("2025-03-08"), d("2025-03-08"), &scans, &CalendarResolver::default(), &AttendancePolicy::default());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::RestDay);
        assert!(day.needs_review);
        assert_eq!(day.worked_minutes, 0);
    }

    #[test]
    fn holiday_without_exception_is_excluded_from_totals() {
        let report = aggregate("A2", d("2025-05-01"), d("2025-05-01"), &[], &may_day_calendar(), &penalised_policy());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::Holiday);
        assert_eq!(day.absence_fraction, Decimal::ZERO);
        assert_eq!(day.penalites.total, Decimal::ZERO);
        assert_eq!(report.totals.jours_feries_payes, 1);
        assert_eq!(report.totals.jours_ouvres_attendus, 0);
        assert_eq!(report.totals.worked_minutes, 0);
    }

    #[test]
    fn holiday_with_exception_follows_normal_rules() {
        let calendar = may_day_calendar();
        let scans = full_day("A1", "2025-05-01", "08:00:00");
        let report = aggregate("A1", d("2025-05-01"), d("2025-05-01"), &scans, &calendar, &AttendancePolicy::default());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::Present);
        assert!(day.holiday_bonus_eligible);
        assert!(day.earns_holiday_bonus());
        assert_eq!(report.totals.jours_feries_travailles, 1);
        assert_eq!(report.holiday_bonus_days().count(), 1);

        // Same agent skipping the holiday it had to work is absent, without bonus.
        let report = aggregate("A1", d("2025-05-01"), d("2025-05-01"), &[], &calendar, &AttendancePolicy::default());
        assert_eq!(report.per_day[0].status, DayStatus::Absent);
        assert_eq!(report.totals.jours_feries_travailles, 0);
    }

    fn toussaint_calendar() -> CalendarResolver {
        CalendarResolver::new(
            vec![JourFerie {
                id: "jf-toussaint".to_string(),
                date: d("2025-11-01"),
                nom: "Toussaint".to_string(),
                description: None,
                type_: HolidayType::Legal,
                recurrent: true,
            }],
            vec![HolidayException {
                id: "ex-toussaint".to_string(),
                jour_ferie_id: "jf-toussaint".to_string(),
                agent_id: "A1".to_string(),
                motif: Some("Permanence".to_string()),
            }],
        )
    }

    #[test]
    fn exception_on_weekend_holiday_is_a_working_day() {
        // 2025-11-01 is a Saturday.
        let scans = full_day("A1", "2025-11-01", "08:00:00");
        let report = aggregate("A1", d("2025-11-01"), d("2025-11-01"), &scans, &toussaint_calendar(), &AttendancePolicy::default());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::Present);
        assert!(day.holiday_bonus_eligible);
        assert!(!day.needs_review);
        assert_eq!(day.worked_minutes, 480);
        assert_eq!(report.totals.jours_travailles, 1);
        assert_eq!(report.totals.jours_ouvres_attendus, 1);
        assert_eq!(report.totals.jours_feries_travailles, 1);
    }

    #[test]
    fn weekend_holiday_without_exception_stays_a_rest_day() {
        let report = aggregate("A2", d("2025-11-01"), d("2025-11-01"), &[], &toussaint_calendar(), &penalised_policy());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::RestDay);
        assert_eq!(day.jour_ferie.as_ref().map(|h| h.nom.as_str()), Some("Toussaint"));
        assert_eq!(report.totals.jours_feries_payes, 0);
        assert_eq!(report.totals.jours_ouvres_attendus, 0);
        assert_eq!(report.totals.jours_absence, Decimal::ZERO);
    }

    #[test]
    fn holiday_scans_without_exception_are_flagged() {
        let scans = full_day("A2", "2025-05-01", "08:00:00");
        let report = aggregate("A2", d("2025-05-01"), d("2025-05-01"), &scans, &may_day_calendar(), &AttendancePolicy::default());
        let day = &report.per_day[0];
        assert_eq!(day.status, DayStatus::Holiday);
        assert_eq!(day.anomalies, vec![Anomaly::ScanOnHoliday { scans: 4 }]);
        assert!(day.needs_review);
        assert_eq!(day.worked_minutes, 0);
        assert_eq!(day.pointages.matin_arrivee, parse_time("08:00"));
        assert_eq!(report.totals.jours_a_revoir, 1);
        assert_eq!(report.totals.jours_feries_payes, 1);
    }

    #[test]
    fn implausible_scan_times_are_flagged_for_review() {
        let scans = vec![
            scan("A1", "2025-03-03", Session::Matin, PointageType::Arrivee, "18:00:00"),
            scan("A1", "2025-03-03", Session::Matin, PointageType::Sortie, "19:00:00"),
            scan("A1", "2025-03-03", Session::ApresMidi, PointageType::Arrivee, "13:00:00"),
            scan("A1", "2025-03-03", Session::ApresMidi, PointageType::Sortie, "17:00:00"),
        ];
        let report = aggregate("A1", d("2025-03-03"), d("2025-03-03"), &scans, &CalendarResolver::default(), &AttendancePolicy::default());
        let day = &report.per_day[0];
        assert!(day.needs_review);
        assert_eq!(
            day.anomalies,
            vec![
                Anomaly::OutOfWindow {
                    session: Session::Matin,
                    type_: PointageType::Arrivee,
                    heure: parse_time("18:00").unwrap(),
                },
                Anomaly::OutOfWindow {
                    session: Session::Matin,
                    type_: PointageType::Sortie,
                    heure: parse_time("19:00").unwrap(),
                },
            ]
        );
        // Kept as recorded: the session tag still drives the deltas.
        assert_eq!(day.retard_matin_minutes, 600);
        assert_eq!(report.totals.jours_a_revoir, 1);
    }

    #[test]
    fn anomalous_day_is_kept_and_flagged() {
        let scans = vec![
            scan("A1", "2025-03-03", Session::Matin, PointageType::Sortie, "12:00:00"),
            scan("A1", "2025-03-03", Session::ApresMidi, PointageType::Arrivee, "13:10:00"),
        ];
        let report = aggregate("A1", d("2025-03-03"), d("2025-03-04"), &scans, &CalendarResolver::default(), &AttendancePolicy::default());
        assert_eq!(report.per_day.len(), 2);
        let day = &report.per_day[0];
        assert!(day.needs_review);
        assert_eq!(day.status, DayStatus::Late);
        assert_eq!(day.retard_apres_midi_minutes, 10);
        assert_eq!(report.totals.jours_a_revoir, 1);
    }

    #[test]
    fn foreign_and_cancelled_scans_are_ignored() {
        let mut scans = full_day("A2", "2025-03-03", "08:00:00");
        let mut cancelled = full_day("A1", "2025-03-03", "08:00:00");
        for s in &mut cancelled {
            s.annule = true;
        }
        scans.extend(cancelled);
        let report = aggregate("A1", d("2025-03-03"), d("2025-03-03"), &scans, &CalendarResolver::default(), &AttendancePolicy::default());
        assert_eq!(report.per_day[0].status, DayStatus::Absent);
    }

    #[test]
    fn lateness_totals_are_sum_of_days() {
        let mut scans = Vec::new();
        for (date, arrival) in [("2025-03-03", "08:05:00"), ("2025-03-04", "08:00:00"), ("2025-03-05", "08:31:00")] {
            scans.extend(full_day("A1", date, arrival));
        }
        scans.push(scan("A1", "2025-03-06", Session::ApresMidi, PointageType::Arrivee, "13:12:00"));
        let report = aggregate("A1", d("2025-03-03"), d("2025-03-09"), &scans, &may_day_calendar(), &penalised_policy());
        let summed: i64 = report.per_day.iter().map(|d| d.retard_total_minutes).sum();
        assert_eq!(summed, report.totals.retard_total_minutes);
        assert_eq!(report.totals.retard_total_minutes, 5 + 31 + 12);
        assert_eq!(
            report.totals.retard_matin_minutes + report.totals.retard_apres_midi_minutes,
            report.totals.retard_total_minutes
        );
        let penalties: Decimal = report.per_day.iter().map(|d| d.penalites.total).sum();
        assert_eq!(penalties, report.totals.penalites_total);
        // No date is both a holiday and an absence.
        assert!(report
            .per_day
            .iter()
            .all(|d| !(d.status == DayStatus::Holiday && d.absence_fraction > Decimal::ZERO)));
        assert_eq!(report.per_day.len(), 7);
    }
}
