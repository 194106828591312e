// src/calendar.rs
use chrono::{Datelike, Days, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::models::{AgentId, HolidayException, HolidayType, JourFerie};

/// How a date looks from one agent's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayKind<'a> {
    Regular,
    /// Paid, non-working day.
    Holiday(&'a JourFerie),
    /// Holiday the agent is expected to work; eligible for the holiday-work bonus.
    HolidayWorked(&'a JourFerie, &'a HolidayException),
}

/// Holiday calendar plus agent exceptions. Lookups never fail: no match means "not a holiday".
#[derive(Debug, Clone, Default)]
pub struct CalendarResolver {
    holidays: Vec<JourFerie>,
    // jour_ferie_id -> exceptions
    exceptions: HashMap<String, Vec<HolidayException>>,
}

impl CalendarResolver {
    pub fn new(holidays: Vec<JourFerie>, exceptions: Vec<HolidayException>) -> Self {
        let mut resolver = Self::default();
        for holiday in holidays {
            resolver.add_holiday(holiday);
        }
        for exception in exceptions {
            resolver.add_exception(exception);
        }
        resolver
    }

    /// Adds a holiday unless one already falls on that exact date. Returns whether it was added.
    pub fn add_holiday(&mut self, holiday: JourFerie) -> bool {
        if self.holidays.iter().any(|h| h.date == holiday.date) {
            debug!("Holiday on {} already configured, skipping '{}'", holiday.date, holiday.nom);
            return false;
        }
        info!("Configuring holiday: {} ({})", holiday.date, holiday.nom);
        self.holidays.push(holiday);
        true
    }

    pub fn add_exception(&mut self, exception: HolidayException) {
        info!(
            "Configuring holiday exception: agent={} jour_ferie={}",
            exception.agent_id, exception.jour_ferie_id
        );
        self.exceptions
            .entry(exception.jour_ferie_id.clone())
            .or_default()
            .push(exception);
    }

    pub fn holidays(&self) -> &[JourFerie] {
        &self.holidays
    }

    pub fn exceptions(&self) -> impl Iterator<Item = &HolidayException> {
        self.exceptions.values().flatten()
    }

    /// Exact-date records win over recurrent ones.
    pub fn is_holiday(&self, date: NaiveDate) -> Option<&JourFerie> {
        self.holidays
            .iter()
            .find(|h| h.date == date)
            .or_else(|| {
                self.holidays.iter().find(|h| {
                    h.recurrent && h.date.month() == date.month() && h.date.day() == date.day()
                })
            })
    }

    pub fn has_exception(&self, date: NaiveDate, agent_id: &str) -> Option<&HolidayException> {
        let holiday = self.is_holiday(date)?;
        self.exceptions
            .get(&holiday.id)?
            .iter()
            .find(|e| e.agent_id == agent_id)
    }

    pub fn resolve(&self, date: NaiveDate, agent_id: &str) -> DayKind<'_> {
        match self.is_holiday(date) {
            None => DayKind::Regular,
            Some(holiday) => match self.has_exception(date, agent_id) {
                Some(exception) => DayKind::HolidayWorked(holiday, exception),
                None => DayKind::Holiday(holiday),
            },
        }
    }

    /// Agents holding an exception for the holiday on `date`.
    pub fn agents_working_on(&self, date: NaiveDate) -> Vec<&AgentId> {
        self.is_holiday(date)
            .and_then(|h| self.exceptions.get(&h.id))
            .map(|list| list.iter().map(|e| &e.agent_id).collect())
            .unwrap_or_default()
    }
}

/// Easter Sunday (anonymous Gregorian algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Legal holiday list for a year. Fixed dates are recurrent, Easter-derived ones are not.
pub fn legal_holidays_for_year(year: i32) -> Vec<JourFerie> {
    let mut holidays = Vec::new();

    let fixed: [(u32, u32, &str, &str); 8] = [
        (1, 1, "Jour de l'An", "Premier jour de l'année"),
        (5, 1, "Fête du Travail", "Journée internationale des travailleurs"),
        (5, 8, "Victoire 1945", "Fin de la Seconde Guerre mondiale en Europe"),
        (7, 14, "Fête Nationale", "Prise de la Bastille"),
        (8, 15, "Assomption", "Assomption de Marie"),
        (11, 1, "Toussaint", "Fête de tous les saints"),
        (11, 11, "Armistice 1918", "Fin de la Première Guerre mondiale"),
        (12, 25, "Noël", "Naissance de Jésus-Christ"),
    ];
    for (month, day, nom, description) in fixed {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            holidays.push(legal_holiday(date, nom, description, true));
        }
    }

    if let Some(easter) = easter_sunday(year) {
        let movable: [(u64, &str, &str); 3] = [
            (1, "Lundi de Pâques", "Lendemain de Pâques"),
            (39, "Ascension", "Jeudi de l'Ascension"),
            (50, "Lundi de Pentecôte", "Lendemain de la Pentecôte"),
        ];
        for (offset, nom, description) in movable {
            if let Some(date) = easter.checked_add_days(Days::new(offset)) {
                holidays.push(legal_holiday(date, nom, description, false));
            }
        }
    }

    holidays.sort_by_key(|h| h.date);
    holidays
}

fn legal_holiday(date: NaiveDate, nom: &str, description: &str, recurrent: bool) -> JourFerie {
    JourFerie {
        id: format!("legal-{}", date),
        date,
        nom: nom.to_string(),
        description: Some(description.to_string()),
        type_: HolidayType::Legal,
        recurrent,
    }
}
