// src/models.rs
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AgentId = String;
pub type PointageId = String;

// --- Agents ---

/// Closed set of roles. Only used for lookups in the pay rule tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Agent,
    Informaticien,
    AnalysteInformaticienne,
    Superviseur,
    AgentAdministratif,
    ChargeAdministration,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Admin,
        Role::Agent,
        Role::Informaticien,
        Role::AnalysteInformaticienne,
        Role::Superviseur,
        Role::AgentAdministratif,
        Role::ChargeAdministration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Agent => "agent",
            Role::Informaticien => "informaticien",
            Role::AnalysteInformaticienne => "analyste_informaticienne",
            Role::Superviseur => "superviseur",
            Role::AgentAdministratif => "agent_administratif",
            Role::ChargeAdministration => "charge_administration",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent pay parameters. Missing values fall back to the role table in `PayrollRules`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayParameters {
    #[serde(default)]
    pub taux_horaire: Option<Decimal>,
    #[serde(default)]
    pub frais_panier: Option<Decimal>,
    #[serde(default)]
    pub frais_transport: Option<Decimal>,
    #[serde(default)]
    pub retenues_fixes: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub nom: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub paie: PayParameters,
}

// --- Pointages ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Session {
    #[serde(rename = "matin")]
    Matin,
    #[serde(rename = "apres-midi")]
    ApresMidi,
}

impl Session {
    pub const BOTH: [Session; 2] = [Session::Matin, Session::ApresMidi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Matin => "matin",
            Session::ApresMidi => "apres-midi",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointageType {
    Arrivee,
    Sortie,
}

impl PointageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointageType::Arrivee => "arrivee",
            PointageType::Sortie => "sortie",
        }
    }
}

impl fmt::Display for PointageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single clock-in or clock-out scan. Cancelled rows are kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointage {
    pub id: PointageId,
    pub agent_id: AgentId,
    pub date: NaiveDate,
    pub heure: NaiveTime,
    #[serde(rename = "type")]
    pub type_: PointageType,
    pub session: Session,
    #[serde(default)]
    pub annule: bool,
    #[serde(default)]
    pub justification_annulation: Option<String>,
    #[serde(default)]
    pub annule_par: Option<String>,
    #[serde(default)]
    pub confirmed_quick_exit: bool,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub recorded_at: Option<NaiveDateTime>,
}

impl Pointage {
    pub fn is_active(&self) -> bool {
        !self.annule
    }
}

// --- Calendar ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolidayType {
    Legal,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourFerie {
    pub id: String,
    pub date: NaiveDate,
    pub nom: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub type_: HolidayType,
    #[serde(default)]
    pub recurrent: bool,
}

/// Makes a holiday a regular working day for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayException {
    pub id: String,
    pub jour_ferie_id: String,
    pub agent_id: AgentId,
    #[serde(default)]
    pub motif: Option<String>,
}

// --- Primes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prime {
    pub id: String,
    pub agent_id: AgentId,
    pub montant: Decimal,
    pub motif: String,
    pub mois: u32,
    pub annee: i32,
}

// --- Audit ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Edit,
    Cancel,
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub pointage_id: PointageId,
    pub action: AuditAction,
    pub before: Pointage,
    pub after: Pointage,
    pub actor: String,
    pub justification: String,
    pub at: NaiveDateTime,
}
