// src/config.rs
use chrono::{FixedOffset, NaiveTime, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;

use crate::attendance::{AttendancePolicy, PenaltyRates};
use crate::clock::Clock;
use crate::payroll::PayrollRules;
use crate::session_window::{parse_time, SessionSchedule, SessionWindow};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid time for {field}: '{value}' (expected HH:MM)")]
    InvalidTime { field: &'static str, value: String },
    #[error("Invalid session window {field}: start must be before end")]
    InvalidWindow { field: &'static str },
    #[error("Invalid weekday in JOURS_OUVRES: '{0}'")]
    InvalidWeekday(String),
    #[error("Invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),
    #[error("Invalid listen address {0}")]
    InvalidAddr(String),
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_offset() -> i32 {
    60
}
fn default_matin_debut() -> String {
    "08:00".to_string()
}
fn default_matin_fin() -> String {
    "12:00".to_string()
}
fn default_apres_midi_debut() -> String {
    "13:00".to_string()
}
fn default_apres_midi_fin() -> String {
    "17:00".to_string()
}
fn default_session_split() -> String {
    "12:00".to_string()
}
fn default_quick_exit() -> i64 {
    5
}
fn default_window_margin() -> i64 {
    120
}
fn default_jours_ouvres() -> Vec<String> {
    ["mon", "tue", "wed", "thu", "fri"].iter().map(|d| d.to_string()).collect()
}
fn default_taux_retenue() -> Decimal {
    dec!(0.09)
}
fn default_retenues_fixes() -> Decimal {
    dec!(4244.80)
}
fn default_heures_par_jour() -> Decimal {
    dec!(8)
}
fn default_frais_panier() -> Decimal {
    dec!(500)
}
fn default_frais_transport() -> Decimal {
    dec!(200)
}

/// Read from the environment (and `.env`). Every field has a default.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Server
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    #[serde(default)]
    pub tls_cert_path: Option<String>,
    #[serde(default)]
    pub tls_key_path: Option<String>,
    #[serde(default)]
    pub dataset_path: Option<String>,
    /// Site offset from UTC; Algeria is UTC+1 all year.
    #[serde(default = "default_offset")]
    pub utc_offset_minutes: i32,

    // Sessions
    #[serde(default = "default_matin_debut")]
    pub matin_debut: String,
    #[serde(default = "default_matin_fin")]
    pub matin_fin: String,
    #[serde(default = "default_apres_midi_debut")]
    pub apres_midi_debut: String,
    #[serde(default = "default_apres_midi_fin")]
    pub apres_midi_fin: String,
    #[serde(default = "default_session_split")]
    pub session_split: String,
    #[serde(default)]
    pub grace_minutes: i64,
    #[serde(default = "default_quick_exit")]
    pub quick_exit_minutes: i64,
    #[serde(default = "default_window_margin")]
    pub window_margin_minutes: i64,
    #[serde(default = "default_jours_ouvres")]
    pub jours_ouvres: Vec<String>,

    // Penalties
    #[serde(default)]
    pub penalite_par_minute: Decimal,
    #[serde(default)]
    pub penalite_par_jour_absence: Decimal,

    // Payroll
    #[serde(default = "default_taux_retenue")]
    pub taux_retenue: Decimal,
    #[serde(default = "default_retenues_fixes")]
    pub retenues_fixes_defaut: Decimal,
    #[serde(default = "default_heures_par_jour")]
    pub heures_par_jour: Decimal,
    #[serde(default = "default_frais_panier")]
    pub frais_panier: Decimal,
    #[serde(default = "default_frais_transport")]
    pub frais_transport: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Ok(envy::from_env::<Config>()?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.server_host, self.server_port);
        raw.parse().map_err(|_| ConfigError::InvalidAddr(raw))
    }

    /// Both paths set means TLS.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some((cert, key)),
            _ => None,
        }
    }

    pub fn clock(&self) -> Result<Clock, ConfigError> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ConfigError::InvalidOffset(self.utc_offset_minutes))?;
        Ok(Clock::system(offset))
    }

    pub fn schedule(&self) -> Result<SessionSchedule, ConfigError> {
        let matin = window("MATIN", time("MATIN_DEBUT", &self.matin_debut)?, time("MATIN_FIN", &self.matin_fin)?)?;
        let apres_midi = window(
            "APRES_MIDI",
            time("APRES_MIDI_DEBUT", &self.apres_midi_debut)?,
            time("APRES_MIDI_FIN", &self.apres_midi_fin)?,
        )?;
        Ok(SessionSchedule {
            matin,
            apres_midi,
            grace_minutes: self.grace_minutes.max(0),
            quick_exit_threshold_minutes: self.quick_exit_minutes.max(0),
            session_split: time("SESSION_SPLIT", &self.session_split)?,
            window_margin_minutes: self.window_margin_minutes.max(0),
        })
    }

    pub fn policy(&self) -> Result<AttendancePolicy, ConfigError> {
        let work_days = self
            .jours_ouvres
            .iter()
            .map(|d| d.trim().parse::<Weekday>().map_err(|_| ConfigError::InvalidWeekday(d.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AttendancePolicy {
            schedule: self.schedule()?,
            work_days,
            penalties: PenaltyRates {
                per_minute: self.penalite_par_minute,
                per_absence_day: self.penalite_par_jour_absence,
            },
        })
    }

    /// Role rate table is the built-in one; the scalar defaults come from the environment.
    pub fn rules(&self) -> PayrollRules {
        PayrollRules {
            retenues_fixes_defaut: self.retenues_fixes_defaut,
            taux_retenue: self.taux_retenue,
            heures_par_jour: self.heures_par_jour,
            frais_panier: self.frais_panier,
            frais_transport: self.frais_transport,
            ..PayrollRules::default()
        }
    }
}

fn time(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    parse_time(value.trim()).ok_or_else(|| ConfigError::InvalidTime {
        field,
        value: value.to_string(),
    })
}

fn window(field: &'static str, start: NaiveTime, end: NaiveTime) -> Result<SessionWindow, ConfigError> {
    if start >= end {
        return Err(ConfigError::InvalidWindow { field });
    }
    Ok(SessionWindow { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        envy::from_iter(vars.iter().map(|(k, v)| (k.to_string(), v.to_string()))).unwrap()
    }

    #[test]
    fn defaults_match_site_policy() {
        let config = config_from(&[]);
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
        assert!(config.tls_paths().is_none());
        assert_eq!(config.schedule().unwrap(), SessionSchedule::default());
        assert_eq!(config.policy().unwrap(), AttendancePolicy::default());
        assert_eq!(config.rules(), PayrollRules::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("GRACE_MINUTES", "10"),
            ("WINDOW_MARGIN_MINUTES", "45"),
            ("MATIN_DEBUT", "07:30"),
            ("PENALITE_PAR_MINUTE", "12.5"),
            ("JOURS_OUVRES", "sun,mon,tue,wed,thu"),
            ("RETENUES_FIXES_DEFAUT", "3000"),
            ("TLS_CERT_PATH", "cert.pem"),
            ("TLS_KEY_PATH", "key.pem"),
        ]);
        let policy = config.policy().unwrap();
        assert_eq!(policy.schedule.grace_minutes, 10);
        assert_eq!(policy.schedule.window_margin_minutes, 45);
        assert_eq!(policy.schedule.matin.start, parse_time("07:30").unwrap());
        assert_eq!(policy.penalties.per_minute, dec!(12.5));
        assert_eq!(policy.work_days[0], Weekday::Sun);
        assert_eq!(config.rules().retenues_fixes_defaut, dec!(3000));
        assert_eq!(config.tls_paths(), Some(("cert.pem", "key.pem")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = config_from(&[("MATIN_FIN", "07:00")]);
        assert!(matches!(config.schedule(), Err(ConfigError::InvalidWindow { field: "MATIN" })));
        let config = config_from(&[("APRES_MIDI_DEBUT", "1pm")]);
        assert!(matches!(config.schedule(), Err(ConfigError::InvalidTime { .. })));
        let config = config_from(&[("JOURS_OUVRES", "mon,funday")]);
        assert!(matches!(config.policy(), Err(ConfigError::InvalidWeekday(_))));
    }
}
