// src/ledger.rs
use chrono::{NaiveDate, NaiveTime};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::models::{AgentId, AuditAction, AuditEntry, Pointage, PointageId, PointageType, Session};
use crate::session_window::SessionSchedule;

// --- Error Types ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("pointage edit rejected: justification required")]
    JustificationRequired,
    #[error("pointage edit rejected: audit log failed ({0})")]
    AuditLogFailed(String),
    #[error("Pointage not found: {0}")]
    NotFound(PointageId),
    #[error("Pointage {0} is already cancelled")]
    AlreadyCancelled(PointageId),
    #[error("Pointage {0} is not cancelled")]
    NotCancelled(PointageId),
    #[error("Exit recorded {minutes} minute(s) after the arrival at {arrival}; confirmation required")]
    QuickExitNeedsConfirmation { arrival: NaiveTime, minutes: i64 },
    #[error("Failed to acquire ledger lock")]
    LockError,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AuditError(pub String);

// --- Audit sink ---

/// Durable destination of audit entries. A failed append must abort the mutation it describes.
pub trait AuditSink: Send {
    fn append(&mut self, entry: AuditEntry) -> Result<(), AuditError>;
    fn entries(&self) -> Vec<AuditEntry>;
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditSink for MemoryAuditLog {
    fn append(&mut self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.push(entry);
        Ok(())
    }

    fn entries(&self) -> Vec<AuditEntry> {
        self.entries.clone()
    }
}

// --- Requests ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub agent_id: AgentId,
    pub date: NaiveDate,
    pub heure: NaiveTime,
    #[serde(rename = "type")]
    pub type_: PointageType,
    /// Tagged by the scanning client; inferred from the clock when absent.
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub confirmed_quick_exit: bool,
    /// One key per physical scan so offline replays are recognised.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl ScanRequest {
    fn digest(&self, session: Session) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}|{}|{}|{}|{}",
                self.agent_id,
                self.date,
                self.heure.format("%H:%M:%S"),
                self.type_,
                session
            )
            .as_bytes(),
        );
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub pointage: Pointage,
    /// True when the key was already known and nothing was written.
    pub replayed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRequest {
    #[serde(default)]
    pub heure: Option<NaiveTime>,
    #[serde(default, rename = "type")]
    pub type_: Option<PointageType>,
    #[serde(default)]
    pub session: Option<Session>,
}

// --- Ledger ---

type DayKey = (AgentId, NaiveDate);

struct LedgerState {
    rows: HashMap<DayKey, Vec<Pointage>>,
    locations: HashMap<PointageId, DayKey>,
    idempotency: HashMap<String, PointageId>,
    audit: Box<dyn AuditSink>,
}

/// Store of raw scans. Every write goes through one lock, which serializes
/// double-taps and keeps each admin mutation and its audit entry together.
#[derive(Clone)]
pub struct PointageLedger {
    state: Arc<Mutex<LedgerState>>,
    schedule: SessionSchedule,
    clock: Clock,
}

impl PointageLedger {
    pub fn new(schedule: SessionSchedule, clock: Clock) -> Self {
        Self::with_audit_sink(schedule, clock, Box::new(MemoryAuditLog::default()))
    }

    pub fn with_audit_sink(schedule: SessionSchedule, clock: Clock, audit: Box<dyn AuditSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                rows: HashMap::new(),
                locations: HashMap::new(),
                idempotency: HashMap::new(),
                audit,
            })),
            schedule,
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        self.state.lock().map_err(|_| {
            error!("Ledger mutex poisoned");
            LedgerError::LockError
        })
    }

    /// Loads an already-persisted row as is (no validation, no audit).
    pub fn import(&self, pointage: Pointage) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        let key = (pointage.agent_id.clone(), pointage.date);
        if let Some(idem) = &pointage.idempotency_key {
            state.idempotency.insert(idem.clone(), pointage.id.clone());
        }
        state.locations.insert(pointage.id.clone(), key.clone());
        state.rows.entry(key).or_default().push(pointage);
        Ok(())
    }

    pub fn record_scan(&self, request: ScanRequest) -> Result<ScanOutcome, LedgerError> {
        let session = request
            .session
            .unwrap_or_else(|| self.schedule.session_for_time(request.heure));
        let key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(|| request.digest(session));

        let mut state = self.lock()?;

        if let Some(existing_id) = state.idempotency.get(&key).cloned() {
            if let Some(existing) = find(&state, &existing_id) {
                info!(
                    "Replayed scan ignored: agent={} date={} key={}",
                    request.agent_id, request.date, key
                );
                return Ok(ScanOutcome {
                    pointage: existing.clone(),
                    replayed: true,
                });
            }
        }

        let day_key = (request.agent_id.clone(), request.date);

        if request.type_ == PointageType::Sortie && !request.confirmed_quick_exit {
            let arrival = state
                .rows
                .get(&day_key)
                .into_iter()
                .flatten()
                .filter(|p| p.is_active() && p.session == session && p.type_ == PointageType::Arrivee)
                .map(|p| p.heure)
                .filter(|heure| *heure <= request.heure)
                .max();
            if let Some(arrival) = arrival {
                if self.schedule.requires_quick_exit_confirmation(arrival, request.heure) {
                    let minutes = request.heure.signed_duration_since(arrival).num_minutes();
                    warn!(
                        "Quick exit needs confirmation: agent={} date={} session={} arrival={} exit={}",
                        request.agent_id, request.date, session, arrival, request.heure
                    );
                    return Err(LedgerError::QuickExitNeedsConfirmation { arrival, minutes });
                }
            }
        }

        let pointage = Pointage {
            id: new_id(),
            agent_id: request.agent_id.clone(),
            date: request.date,
            heure: request.heure,
            type_: request.type_,
            session,
            annule: false,
            justification_annulation: None,
            annule_par: None,
            confirmed_quick_exit: request.confirmed_quick_exit,
            idempotency_key: Some(key.clone()),
            recorded_at: Some(self.clock.now_dt()),
        };

        info!(
            "Recording scan: agent={} date={} {} {} at {}",
            pointage.agent_id, pointage.date, pointage.session, pointage.type_, pointage.heure
        );
        state.idempotency.insert(key, pointage.id.clone());
        state.locations.insert(pointage.id.clone(), day_key.clone());
        state.rows.entry(day_key).or_default().push(pointage.clone());

        Ok(ScanOutcome {
            pointage,
            replayed: false,
        })
    }

    pub fn edit(
        &self,
        id: &str,
        request: EditRequest,
        actor: &str,
        justification: &str,
    ) -> Result<Pointage, LedgerError> {
        self.mutate(id, actor, justification, AuditAction::Edit, |p| {
            if let Some(heure) = request.heure {
                p.heure = heure;
            }
            if let Some(type_) = request.type_ {
                p.type_ = type_;
            }
            if let Some(session) = request.session {
                p.session = session;
            }
            Ok(())
        })
    }

    pub fn cancel(&self, id: &str, actor: &str, justification: &str) -> Result<Pointage, LedgerError> {
        let reason = justification.trim().to_string();
        let by = actor.to_string();
        self.mutate(id, actor, justification, AuditAction::Cancel, move |p| {
            if p.annule {
                return Err(LedgerError::AlreadyCancelled(p.id.clone()));
            }
            p.annule = true;
            p.justification_annulation = Some(reason);
            p.annule_par = Some(by);
            Ok(())
        })
    }

    pub fn restore(&self, id: &str, actor: &str, justification: &str) -> Result<Pointage, LedgerError> {
        self.mutate(id, actor, justification, AuditAction::Restore, |p| {
            if !p.annule {
                return Err(LedgerError::NotCancelled(p.id.clone()));
            }
            p.annule = false;
            p.justification_annulation = None;
            p.annule_par = None;
            Ok(())
        })
    }

    /// Read-modify-write of one row. The audit append happens under the same
    /// lock and before the row is replaced; if it fails the row is untouched.
    fn mutate<F>(
        &self,
        id: &str,
        actor: &str,
        justification: &str,
        action: AuditAction,
        apply: F,
    ) -> Result<Pointage, LedgerError>
    where
        F: FnOnce(&mut Pointage) -> Result<(), LedgerError>,
    {
        let justification = justification.trim();
        if justification.is_empty() {
            warn!("Rejected {:?} on pointage {}: no justification", action, id);
            return Err(LedgerError::JustificationRequired);
        }

        let mut guard = self.lock()?;
        let state = &mut *guard;

        let day_key = state
            .locations
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        let row = state
            .rows
            .get_mut(&day_key)
            .and_then(|rows| rows.iter_mut().find(|p| p.id == id))
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        let before = row.clone();
        let mut after = before.clone();
        apply(&mut after)?;

        let entry = AuditEntry {
            id: new_id(),
            pointage_id: before.id.clone(),
            action,
            before,
            after: after.clone(),
            actor: actor.to_string(),
            justification: justification.to_string(),
            at: self.clock.now_dt(),
        };
        if let Err(e) = state.audit.append(entry) {
            error!("Audit append failed for {:?} on pointage {}: {}", action, id, e);
            return Err(LedgerError::AuditLogFailed(e.0));
        }

        *row = after.clone();
        info!("Pointage {} updated by {} ({:?})", id, actor, action);
        Ok(after)
    }

    pub fn get(&self, id: &str) -> Result<Pointage, LedgerError> {
        let state = self.lock()?;
        find(&state, id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    /// Every row, cancelled ones included, for one agent in `[start, end]`.
    pub fn all_for(&self, agent_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Pointage>, LedgerError> {
        let state = self.lock()?;
        let mut rows: Vec<Pointage> = state
            .rows
            .iter()
            .filter(|((agent, date), _)| agent == agent_id && *date >= start && *date <= end)
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect();
        rows.sort_by(|a, b| (a.date, a.heure).cmp(&(b.date, b.heure)));
        debug!("Fetched {} pointages for agent {} ({}..={})", rows.len(), agent_id, start, end);
        Ok(rows)
    }

    pub fn active_for(&self, agent_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Pointage>, LedgerError> {
        Ok(self
            .all_for(agent_id, start, end)?
            .into_iter()
            .filter(Pointage::is_active)
            .collect())
    }

    pub fn audit_log(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        Ok(self.lock()?.audit.entries())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.locations.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn find<'a>(state: &'a LedgerState, id: &str) -> Option<&'a Pointage> {
    let key = state.locations.get(id)?;
    state.rows.get(key)?.iter().find(|p| p.id == id)
}

fn new_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}
