// src/export.rs
use rust_decimal::Decimal;
use std::io::Write;
use thiserror::Error;
use tracing::info;

use crate::payroll::{money, PayBreakdown};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub const HEADERS: [&str; 23] = [
    "Nom",
    "Email",
    "Role",
    "Mois",
    "Taux horaire",
    "Heures travaillees",
    "Heures theoriques",
    "Heures absence",
    "Retard (minutes)",
    "Jours travailles",
    "Jours absence",
    "Jours feries payes",
    "Salaire base",
    "Frais panier",
    "Frais transport",
    "Bonus jours feries",
    "Salaire net",
    "Primes",
    "Retenues 9%",
    "Retenues fixes",
    "Retenues total",
    "Penalites",
    "Paie finale",
];

fn amount(value: Decimal) -> String {
    money::round(value).to_string()
}

fn row(p: &PayBreakdown) -> [String; 23] {
    [
        p.nom.clone(),
        p.email.clone(),
        p.role.to_string(),
        p.periode_label(),
        amount(p.taux_horaire),
        amount(p.heures_travaillees),
        amount(p.heures_theoriques),
        amount(p.heures_absence),
        p.retard_minutes.to_string(),
        p.jours_travailles.to_string(),
        amount(p.jours_absence),
        p.jours_feries_payes.to_string(),
        amount(p.salaire_base),
        amount(p.frais_panier_total),
        amount(p.frais_transport_total),
        amount(p.bonus_jours_feries),
        amount(p.salaire_net),
        amount(p.primes_total),
        amount(p.retenues_9_pourcent),
        amount(p.retenues_fixes),
        amount(p.retenues_total),
        amount(p.penalites_total),
        amount(p.paie_finale),
    ]
}

/// One header row, then one row per agent.
pub fn write_csv<W: Write>(writer: W, paies: &[PayBreakdown]) -> Result<(), ExportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(HEADERS)?;
    for p in paies {
        csv.write_record(row(p))?;
    }
    csv.flush()?;
    info!("Exported {} payroll row(s) to CSV", paies.len());
    Ok(())
}

pub fn to_csv_string(paies: &[PayBreakdown]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_csv(&mut buf, paies)?;
    Ok(String::from_utf8(buf)?)
}

/// File name used for downloads and the CLI default.
pub fn export_file_name(mois: u32, annee: i32) -> String {
    format!("paies_{:02}_{}.csv", mois, annee)
}
