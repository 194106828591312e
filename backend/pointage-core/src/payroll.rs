// src/payroll.rs
use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::attendance::{aggregate, AttendancePolicy, AttendanceReport};
use crate::calendar::CalendarResolver;
use crate::models::{Agent, AgentId, Pointage, Prime, Role};

// --- Money helpers ---

pub mod money {
    use super::*;
    use serde::Serializer;

    /// Two decimals, midpoint away from zero, fixed scale.
    pub fn round(value: Decimal) -> Decimal {
        let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        rounded
    }

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&round(*value), serializer)
    }
}

// --- Rules ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRates {
    pub taux_horaire: Decimal,
    #[serde(default)]
    pub retenues_fixes: Option<Decimal>,
}

/// Pay rule tables. Role entries are lookups only; agent overrides win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRules {
    pub roles: HashMap<Role, RoleRates>,
    pub retenues_fixes_defaut: Decimal,
    pub taux_retenue: Decimal,
    pub heures_par_jour: Decimal,
    pub frais_panier: Decimal,
    pub frais_transport: Decimal,
}

impl Default for PayrollRules {
    fn default() -> Self {
        let rate = |taux: Decimal| RoleRates {
            taux_horaire: taux,
            retenues_fixes: None,
        };
        let roles = HashMap::from([
            (Role::Agent, rate(dec!(182.18))),
            (Role::Admin, rate(dec!(250))),
            (Role::Informaticien, rate(dec!(250))),
            (Role::AnalysteInformaticienne, rate(dec!(230))),
            (Role::Superviseur, rate(dec!(220))),
            (Role::AgentAdministratif, rate(dec!(200))),
            (Role::ChargeAdministration, rate(dec!(210))),
        ]);
        Self {
            roles,
            retenues_fixes_defaut: dec!(4244.80),
            taux_retenue: dec!(0.09),
            heures_par_jour: dec!(8),
            frais_panier: dec!(500),
            frais_transport: dec!(200),
        }
    }
}

/// Parameters resolved for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolvedRates {
    taux_horaire: Decimal,
    frais_panier: Decimal,
    frais_transport: Decimal,
    retenues_fixes: Decimal,
}

impl PayrollRules {
    fn resolve(&self, agent: &Agent) -> Result<ResolvedRates, PayrollIssue> {
        let role = self.roles.get(&agent.role);
        let taux_horaire = agent
            .paie
            .taux_horaire
            .or_else(|| role.map(|r| r.taux_horaire))
            .ok_or(PayrollIssue::MissingHourlyRate(agent.role))?;
        let retenues_fixes = agent
            .paie
            .retenues_fixes
            .or_else(|| role.and_then(|r| r.retenues_fixes))
            .unwrap_or(self.retenues_fixes_defaut);
        let rates = ResolvedRates {
            taux_horaire,
            frais_panier: agent.paie.frais_panier.unwrap_or(self.frais_panier),
            frais_transport: agent.paie.frais_transport.unwrap_or(self.frais_transport),
            retenues_fixes,
        };
        for (name, value) in [
            ("taux_horaire", rates.taux_horaire),
            ("frais_panier", rates.frais_panier),
            ("frais_transport", rates.frais_transport),
            ("retenues_fixes", rates.retenues_fixes),
        ] {
            if value.is_sign_negative() {
                return Err(PayrollIssue::NegativeParameter(name));
            }
        }
        Ok(rates)
    }
}

// --- Errors ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayrollIssue {
    #[error("no hourly rate for role {0}")]
    MissingHourlyRate(Role),
    #[error("negative pay parameter {0}")]
    NegativeParameter(&'static str),
    #[error("invalid period {mois}/{annee}")]
    InvalidPeriod { mois: u32, annee: i32 },
    #[error("period {mois}/{annee} has not started yet")]
    PeriodNotStarted { mois: u32, annee: i32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not compute payroll for agent {agent_id}: {issue}")]
pub struct PayrollError {
    pub agent_id: AgentId,
    #[source]
    pub issue: PayrollIssue,
}

// --- Inputs / context ---

pub struct PayrollInputs<'a> {
    pub scans: &'a [Pointage],
    pub calendar: &'a CalendarResolver,
    pub primes: &'a [Prime],
}

/// Everything a computation depends on besides the data itself.
#[derive(Debug, Clone, Copy)]
pub struct PeriodContext<'a> {
    pub rules: &'a PayrollRules,
    pub policy: &'a AttendancePolicy,
    /// The running month is only counted up to this date.
    pub today: NaiveDate,
}

/// First and last counted day of a month, clamped to `today`.
pub fn month_period(mois: u32, annee: i32, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), PayrollIssue> {
    let start = NaiveDate::from_ymd_opt(annee, mois, 1).ok_or(PayrollIssue::InvalidPeriod { mois, annee })?;
    let next = if mois == 12 {
        NaiveDate::from_ymd_opt(annee + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(annee, mois + 1, 1)
    };
    let last = next
        .and_then(|n| n.pred_opt())
        .ok_or(PayrollIssue::InvalidPeriod { mois, annee })?;
    if today < start {
        return Err(PayrollIssue::PeriodNotStarted { mois, annee });
    }
    Ok((start, last.min(today)))
}

// --- Output ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayBonusLine {
    pub date: NaiveDate,
    pub nom: String,
    #[serde(serialize_with = "money::serialize")]
    pub montant: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimeLine {
    pub id: String,
    pub motif: String,
    #[serde(serialize_with = "money::serialize")]
    pub montant: Decimal,
}

/// One agent, one month. Amounts are kept exact; serialization rounds to cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayBreakdown {
    pub agent_id: AgentId,
    pub nom: String,
    pub email: String,
    pub role: Role,
    pub mois: u32,
    pub annee: i32,
    pub periode_debut: NaiveDate,
    pub periode_fin: NaiveDate,

    #[serde(serialize_with = "money::serialize")]
    pub taux_horaire: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub heures_travaillees: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub heures_theoriques: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub heures_absence: Decimal,
    pub jours_travailles: u32,
    pub jours_absence: Decimal,
    pub jours_ouvres: u32,
    pub jours_feries_payes: u32,
    pub jours_a_revoir: u32,
    pub retard_minutes: i64,
    pub sortie_anticipee_minutes: i64,

    #[serde(serialize_with = "money::serialize")]
    pub salaire_base: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub frais_panier: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub frais_transport: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub frais_panier_total: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub frais_transport_total: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub bonus_jours_feries: Decimal,
    pub jours_feries_travailles: Vec<HolidayBonusLine>,
    #[serde(serialize_with = "money::serialize")]
    pub salaire_net: Decimal,

    #[serde(serialize_with = "money::serialize")]
    pub primes_total: Decimal,
    pub primes: Vec<PrimeLine>,

    pub taux_retenue: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub retenues_9_pourcent: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub retenues_fixes: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub retenues_total: Decimal,

    #[serde(serialize_with = "money::serialize")]
    pub penalites_retard: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub penalites_absence: Decimal,
    #[serde(serialize_with = "money::serialize")]
    pub penalites_total: Decimal,

    #[serde(serialize_with = "money::serialize")]
    pub paie_finale: Decimal,
}

impl PayBreakdown {
    /// "MM/YYYY" label used in exports.
    pub fn periode_label(&self) -> String {
        format!("{:02}/{}", self.mois, self.annee)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchError {
    pub agent_id: AgentId,
    pub nom: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayrollBatch {
    pub mois: u32,
    pub annee: i32,
    pub paies: Vec<PayBreakdown>,
    pub erreurs: Vec<BatchError>,
}

// --- Computation ---

pub fn compute_pay(
    agent: &Agent,
    mois: u32,
    annee: i32,
    inputs: &PayrollInputs<'_>,
    ctx: &PeriodContext<'_>,
) -> Result<PayBreakdown, PayrollError> {
    let fail = |issue: PayrollIssue| PayrollError {
        agent_id: agent.id.clone(),
        issue,
    };
    let rates = ctx.rules.resolve(agent).map_err(fail)?;
    let (start, end) = month_period(mois, annee, ctx.today).map_err(fail)?;

    let report = aggregate(&agent.id, start, end, inputs.scans, inputs.calendar, ctx.policy);
    let breakdown = build_breakdown(agent, mois, annee, &rates, &report, inputs.primes, ctx.rules);

    debug!(
        "Paie Emp={}, Periode={}: base={} net={} finale={}",
        agent.id,
        breakdown.periode_label(),
        breakdown.salaire_base,
        breakdown.salaire_net,
        breakdown.paie_finale
    );
    Ok(breakdown)
}

fn build_breakdown(
    agent: &Agent,
    mois: u32,
    annee: i32,
    rates: &ResolvedRates,
    report: &AttendanceReport,
    primes: &[Prime],
    rules: &PayrollRules,
) -> PayBreakdown {
    let totals = &report.totals;
    let hpd = rules.heures_par_jour;
    let jours = Decimal::from(totals.jours_travailles);

    let heures_travaillees = Decimal::from(totals.worked_minutes) / dec!(60);
    let salaire_base = rates.taux_horaire * heures_travaillees;
    let frais_panier_total = rates.frais_panier * jours;
    let frais_transport_total = rates.frais_transport * jours;

    let bonus_day = rates.taux_horaire * hpd + rates.frais_panier + rates.frais_transport;
    let jours_feries_travailles: Vec<HolidayBonusLine> = report
        .holiday_bonus_days()
        .map(|day| HolidayBonusLine {
            date: day.date,
            nom: day.jour_ferie.as_ref().map(|h| h.nom.clone()).unwrap_or_default(),
            montant: bonus_day,
        })
        .collect();
    let bonus_jours_feries: Decimal = jours_feries_travailles.iter().map(|l| l.montant).sum();

    let salaire_net = salaire_base + frais_panier_total + frais_transport_total + bonus_jours_feries;

    let primes: Vec<PrimeLine> = primes
        .iter()
        .filter(|p| p.agent_id == agent.id && p.mois == mois && p.annee == annee)
        .map(|p| PrimeLine {
            id: p.id.clone(),
            motif: p.motif.clone(),
            montant: p.montant,
        })
        .collect();
    let primes_total: Decimal = primes.iter().map(|p| p.montant).sum();

    let retenues_9_pourcent = rules.taux_retenue * salaire_base;
    let retenues_total = retenues_9_pourcent + rates.retenues_fixes;
    let penalites_total = totals.penalites_total;

    let paie_finale = salaire_net + primes_total - retenues_total - penalites_total;

    PayBreakdown {
        agent_id: agent.id.clone(),
        nom: agent.nom.clone(),
        email: agent.email.clone(),
        role: agent.role,
        mois,
        annee,
        periode_debut: report.start,
        periode_fin: report.end,
        taux_horaire: rates.taux_horaire,
        heures_travaillees,
        heures_theoriques: Decimal::from(totals.jours_ouvres_attendus) * hpd,
        heures_absence: totals.jours_absence * hpd,
        jours_travailles: totals.jours_travailles,
        jours_absence: totals.jours_absence,
        jours_ouvres: totals.jours_ouvres_attendus,
        jours_feries_payes: totals.jours_feries_payes,
        jours_a_revoir: totals.jours_a_revoir,
        retard_minutes: totals.retard_total_minutes,
        sortie_anticipee_minutes: totals.sortie_anticipee_total_minutes,
        salaire_base,
        frais_panier: rates.frais_panier,
        frais_transport: rates.frais_transport,
        frais_panier_total,
        frais_transport_total,
        bonus_jours_feries,
        jours_feries_travailles,
        salaire_net,
        primes_total,
        primes,
        taux_retenue: rules.taux_retenue,
        retenues_9_pourcent,
        retenues_fixes: rates.retenues_fixes,
        retenues_total,
        penalites_retard: totals.penalites_retard,
        penalites_absence: totals.penalites_absence,
        penalites_total,
        paie_finale,
    }
}

/// Runs every agent; a failing agent lands in `erreurs` and the rest go on.
pub fn compute_all(
    agents: &[Agent],
    mois: u32,
    annee: i32,
    inputs: &PayrollInputs<'_>,
    ctx: &PeriodContext<'_>,
) -> PayrollBatch {
    let mut batch = PayrollBatch {
        mois,
        annee,
        ..PayrollBatch::default()
    };

    for agent in agents {
        match compute_pay(agent, mois, annee, inputs, ctx) {
            Ok(pay) => batch.paies.push(pay),
            Err(e) => {
                error!("{}", e);
                batch.erreurs.push(BatchError {
                    agent_id: agent.id.clone(),
                    nom: agent.nom.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        "Payroll {:02}/{}: {} computed, {} failed",
        mois,
        annee,
        batch.paies.len(),
        batch.erreurs.len()
    );
    batch
}

/// Month and year of `today`; default period for the API and CLI.
pub fn current_month(today: NaiveDate) -> (u32, i32) {
    (today.month(), today.year())
}
