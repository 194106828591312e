// src/system.rs
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::attendance::{aggregate, AttendancePolicy, AttendanceReport};
use crate::calendar::{legal_holidays_for_year, CalendarResolver};
use crate::clock::Clock;
use crate::dataset::Dataset;
use crate::export::{to_csv_string, ExportError};
use crate::ledger::{AuditSink, EditRequest, LedgerError, PointageLedger, ScanOutcome, ScanRequest};
use crate::models::{Agent, AgentId, AuditEntry, HolidayException, JourFerie, Pointage, Prime};
use crate::payroll::{
    self, month_period, PayBreakdown, PayrollBatch, PayrollError, PayrollInputs, PayrollIssue, PayrollRules,
    PeriodContext,
};

// --- Error Types ---

#[derive(Error, Debug)]
pub enum SystemError {
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),
    #[error("Holiday not found: {0}")]
    HolidayNotFound(String),
    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("{0}")]
    InvalidPeriod(PayrollIssue),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Payroll(#[from] PayrollError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("Failed to acquire lock")]
    LockError,
}

fn guard<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, SystemError> {
    mutex.lock().map_err(|_| SystemError::LockError)
}

/// Attendance view for one agent: the per-day report plus the raw rows
/// (cancelled ones included) it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct Suivi {
    pub agent: Agent,
    pub pointages: Vec<Pointage>,
    #[serde(flatten)]
    pub report: AttendanceReport,
}

// --- Pointage System ---

#[derive(Clone)]
pub struct PointageSystem {
    clock: Clock,
    policy: AttendancePolicy,
    rules: PayrollRules,
    agents: Arc<Mutex<HashMap<AgentId, Agent>>>,
    calendar: Arc<Mutex<CalendarResolver>>,
    primes: Arc<Mutex<Vec<Prime>>>,
    ledger: PointageLedger,
}

impl PointageSystem {
    pub fn new(clock: Clock, policy: AttendancePolicy, rules: PayrollRules) -> Self {
        let ledger = PointageLedger::new(policy.schedule, clock.clone());
        Self::with_ledger(clock, policy, rules, ledger)
    }

    pub fn with_audit_sink(
        clock: Clock,
        policy: AttendancePolicy,
        rules: PayrollRules,
        audit: Box<dyn AuditSink>,
    ) -> Self {
        let ledger = PointageLedger::with_audit_sink(policy.schedule, clock.clone(), audit);
        Self::with_ledger(clock, policy, rules, ledger)
    }

    fn with_ledger(clock: Clock, policy: AttendancePolicy, rules: PayrollRules, ledger: PointageLedger) -> Self {
        Self {
            clock,
            policy,
            rules,
            agents: Arc::new(Mutex::new(HashMap::new())),
            calendar: Arc::new(Mutex::new(CalendarResolver::default())),
            primes: Arc::new(Mutex::new(Vec::new())),
            ledger,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn rules(&self) -> &PayrollRules {
        &self.rules
    }

    pub fn policy(&self) -> &AttendancePolicy {
        &self.policy
    }

    // --- Configuration Methods ---

    pub fn load_dataset(&self, dataset: Dataset) -> Result<(), SystemError> {
        for agent in dataset.agents {
            self.configure_agent(agent)?;
        }
        for holiday in dataset.jours_feries {
            self.configure_holiday(holiday)?;
        }
        for exception in dataset.exceptions {
            self.configure_exception(exception)?;
        }
        for prime in dataset.primes {
            self.add_prime(prime)?;
        }
        let count = dataset.pointages.len();
        for pointage in dataset.pointages {
            self.ledger.import(pointage)?;
        }
        info!("Imported {} pointages into the ledger", count);
        Ok(())
    }

    pub fn configure_agent(&self, agent: Agent) -> Result<(), SystemError> {
        debug!("Configuring agent: Emp={}, Role={}", agent.id, agent.role);
        guard(&self.agents)?.insert(agent.id.clone(), agent);
        Ok(())
    }

    /// Returns false when a holiday already exists on that date.
    pub fn configure_holiday(&self, holiday: JourFerie) -> Result<bool, SystemError> {
        Ok(guard(&self.calendar)?.add_holiday(holiday))
    }

    pub fn configure_exception(&self, exception: HolidayException) -> Result<(), SystemError> {
        if !guard(&self.agents)?.contains_key(&exception.agent_id) {
            return Err(SystemError::AgentNotFound(exception.agent_id));
        }
        let mut calendar = guard(&self.calendar)?;
        if !calendar.holidays().iter().any(|h| h.id == exception.jour_ferie_id) {
            return Err(SystemError::HolidayNotFound(exception.jour_ferie_id));
        }
        calendar.add_exception(exception);
        Ok(())
    }

    pub fn add_prime(&self, prime: Prime) -> Result<(), SystemError> {
        if !guard(&self.agents)?.contains_key(&prime.agent_id) {
            return Err(SystemError::AgentNotFound(prime.agent_id));
        }
        debug!(
            "Adding prime: Emp={}, Periode={:02}/{}, Montant={}",
            prime.agent_id, prime.mois, prime.annee, prime.montant
        );
        guard(&self.primes)?.push(prime);
        Ok(())
    }

    /// Adds the legal holidays of `year`; dates already present are skipped.
    pub fn generate_legal_holidays(&self, year: i32) -> Result<usize, SystemError> {
        let mut calendar = guard(&self.calendar)?;
        let added = legal_holidays_for_year(year)
            .into_iter()
            .filter(|h| calendar.add_holiday(h.clone()))
            .count();
        info!("Generated {} legal holiday(s) for {}", added, year);
        Ok(added)
    }

    pub fn agents(&self) -> Result<Vec<Agent>, SystemError> {
        let mut agents: Vec<Agent> = guard(&self.agents)?.values().cloned().collect();
        agents.sort_by(|a, b| a.nom.cmp(&b.nom).then_with(|| a.id.cmp(&b.id)));
        Ok(agents)
    }

    pub fn agent(&self, agent_id: &str) -> Result<Agent, SystemError> {
        guard(&self.agents)?
            .get(agent_id)
            .cloned()
            .ok_or_else(|| SystemError::AgentNotFound(agent_id.to_string()))
    }

    pub fn holidays(&self) -> Result<Vec<JourFerie>, SystemError> {
        Ok(guard(&self.calendar)?.holidays().to_vec())
    }

    // --- Pointage Methods ---

    pub fn record_scan(&self, request: ScanRequest) -> Result<ScanOutcome, SystemError> {
        self.agent(&request.agent_id)?;
        Ok(self.ledger.record_scan(request)?)
    }

    pub fn edit_pointage(
        &self,
        id: &str,
        request: EditRequest,
        actor: &str,
        justification: &str,
    ) -> Result<Pointage, SystemError> {
        Ok(self.ledger.edit(id, request, actor, justification)?)
    }

    pub fn cancel_pointage(&self, id: &str, actor: &str, justification: &str) -> Result<Pointage, SystemError> {
        Ok(self.ledger.cancel(id, actor, justification)?)
    }

    pub fn restore_pointage(&self, id: &str, actor: &str, justification: &str) -> Result<Pointage, SystemError> {
        Ok(self.ledger.restore(id, actor, justification)?)
    }

    pub fn audit_log(&self) -> Result<Vec<AuditEntry>, SystemError> {
        Ok(self.ledger.audit_log()?)
    }

    // --- Reporting Methods ---

    pub fn suivi(&self, agent_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Suivi, SystemError> {
        if start > end {
            return Err(SystemError::InvalidRange { start, end });
        }
        let agent = self.agent(agent_id)?;
        let pointages = self.ledger.all_for(agent_id, start, end)?;
        let calendar = guard(&self.calendar)?;
        let report = aggregate(agent_id, start, end, &pointages, &calendar, &self.policy);
        if report.totals.jours_a_revoir > 0 {
            warn!(
                "Suivi Emp={} {}..={}: {} day(s) need review",
                agent_id, start, end, report.totals.jours_a_revoir
            );
        }
        Ok(Suivi {
            agent,
            pointages,
            report,
        })
    }

    /// Active scans of the given agents for the whole month.
    fn month_scans(&self, agents: &[Agent], mois: u32, annee: i32) -> Result<Vec<Pointage>, SystemError> {
        let (start, end) = month_period(mois, annee, NaiveDate::MAX).map_err(SystemError::InvalidPeriod)?;
        let mut scans = Vec::new();
        for agent in agents {
            scans.extend(self.ledger.active_for(&agent.id, start, end)?);
        }
        Ok(scans)
    }

    fn context(&self) -> PeriodContext<'_> {
        PeriodContext {
            rules: &self.rules,
            policy: &self.policy,
            today: self.clock.today(),
        }
    }

    pub fn compute_pay(&self, agent_id: &str, mois: u32, annee: i32) -> Result<PayBreakdown, SystemError> {
        let agent = self.agent(agent_id)?;
        let scans = self.month_scans(std::slice::from_ref(&agent), mois, annee)?;
        let calendar = guard(&self.calendar)?;
        let primes = guard(&self.primes)?;
        let inputs = PayrollInputs {
            scans: &scans,
            calendar: &calendar,
            primes: &primes,
        };
        Ok(payroll::compute_pay(&agent, mois, annee, &inputs, &self.context())?)
    }

    pub fn compute_all(&self, mois: u32, annee: i32) -> Result<PayrollBatch, SystemError> {
        let agents = self.agents()?;
        let scans = self.month_scans(&agents, mois, annee)?;
        let calendar = guard(&self.calendar)?;
        let primes = guard(&self.primes)?;
        let inputs = PayrollInputs {
            scans: &scans,
            calendar: &calendar,
            primes: &primes,
        };
        Ok(payroll::compute_all(&agents, mois, annee, &inputs, &self.context()))
    }

    pub fn export_csv(&self, mois: u32, annee: i32) -> Result<String, SystemError> {
        let batch = self.compute_all(mois, annee)?;
        Ok(to_csv_string(&batch.paies)?)
    }
}
