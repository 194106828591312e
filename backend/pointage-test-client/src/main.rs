// src/main.rs

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;

// Response types
#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    now: String,
    agents: usize,
    holidays: usize,
}

#[derive(Debug, Deserialize)]
struct Pointage {
    id: String,
    heure: String,
    session: String,
    annule: bool,
}

#[derive(Debug, Deserialize)]
struct ScanOutcome {
    pointage: Pointage,
    replayed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url = std::env::var("POINTAGE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let agent_id = std::env::var("POINTAGE_AGENT").unwrap_or_else(|_| "A1".to_string());
    let client = Client::new();

    // Test 1: Status
    println!("\n🔍 Testing status endpoint...");
    let status = client
        .get(format!("{}/status", base_url))
        .send()
        .await?
        .json::<StatusResponse>()
        .await?;
    println!("Status response: {:?}", status);
    let today = status.now.get(..10).unwrap_or_default().to_string();

    // Test 2: A full day of scans, one of them replayed
    println!("\n🔍 Recording a full day of scans for {} on {}...", agent_id, today);
    let scans = [
        ("08:02:00", "arrivee", "matin"),
        ("12:00:00", "sortie", "matin"),
        ("13:00:00", "arrivee", "apres-midi"),
        ("17:00:00", "sortie", "apres-midi"),
    ];
    let mut first_id = None;
    for (i, (heure, type_, session)) in scans.iter().enumerate() {
        let body = json!({
            "agent_id": agent_id,
            "date": today,
            "heure": heure,
            "type": type_,
            "session": session,
            "idempotency_key": format!("smoke-{}-{}-{}", agent_id, today, i),
        });
        let response = client
            .post(format!("{}/api/pointages", base_url))
            .json(&body)
            .send()
            .await?;
        let code = response.status();
        if code.is_success() {
            let outcome = response.json::<ScanOutcome>().await?;
            println!(
                "  {} {} {} -> {} (replayed: {})",
                outcome.pointage.heure, type_, outcome.pointage.session, outcome.pointage.id, outcome.replayed
            );
            first_id.get_or_insert(outcome.pointage.id);
        } else {
            println!("  {} {} rejected with {}: {}", heure, type_, code, response.text().await?);
        }
    }

    println!("\n🔍 Replaying the first scan...");
    let replay = client
        .post(format!("{}/api/pointages", base_url))
        .json(&json!({
            "agent_id": agent_id,
            "date": today,
            "heure": scans[0].0,
            "type": scans[0].1,
            "session": scans[0].2,
            "idempotency_key": format!("smoke-{}-{}-0", agent_id, today),
        }))
        .send()
        .await?;
    println!("Replay status: {} (expected {})", replay.status(), StatusCode::OK);

    // Test 3: Cancel without and with justification, then restore
    if let Some(id) = &first_id {
        let url = format!("{}/api/admin/pointages/{}", base_url, id);

        println!("\n🔍 Cancelling {} without justification...", id);
        let response = client
            .delete(&url)
            .json(&json!({ "actor": "smoke-admin", "justification": "" }))
            .send()
            .await?;
        println!("Status: {} -> {}", response.status(), response.text().await?);

        println!("\n🔍 Cancelling {} with justification...", id);
        let response = client
            .delete(&url)
            .json(&json!({ "actor": "smoke-admin", "justification": "Test de bout en bout" }))
            .send()
            .await?;
        if response.status().is_success() {
            let cancelled = response.json::<Pointage>().await?;
            println!("Cancelled: {}", cancelled.annule);
        } else {
            println!("Cancel failed: {}", response.text().await?);
        }

        println!("\n🔍 Restoring {}...", id);
        let response = client
            .post(format!("{}/restore", url))
            .json(&json!({ "actor": "smoke-admin", "justification": "Fin du test" }))
            .send()
            .await?;
        println!("Restore status: {}", response.status());

        let audit = client
            .get(format!("{}/api/admin/audit-logs?pointage_id={}", base_url, id))
            .send()
            .await?
            .json::<Vec<Value>>()
            .await?;
        println!("Audit entries for {}: {}", id, audit.len());
    }

    // Test 4: Suivi
    println!("\n🔍 Testing suivi endpoint...");
    let suivi = client
        .get(format!("{}/api/suivi/{}?debut={}&fin={}", base_url, agent_id, today, today))
        .send()
        .await?;
    if suivi.status().is_success() {
        let body = suivi.json::<Value>().await?;
        println!("Day status: {}", body["per_day"][0]["status"]);
        println!("Totals: {}", body["totals"]);
    } else {
        println!("Suivi failed: {}", suivi.text().await?);
    }

    // Test 5: Payroll
    println!("\n🔍 Testing payroll endpoints...");
    let pay = client
        .get(format!("{}/api/paie/{}", base_url, agent_id))
        .send()
        .await?;
    println!("Pay status: {}", pay.status());
    if pay.status().is_success() {
        let body = pay.json::<Value>().await?;
        println!(
            "  base={} net={} retenues={} finale={}",
            body["salaire_base"], body["salaire_net"], body["retenues_total"], body["paie_finale"]
        );
    }

    let batch = client
        .get(format!("{}/api/paie", base_url))
        .send()
        .await?
        .json::<Value>()
        .await?;
    println!(
        "Batch: {} paie(s), {} erreur(s)",
        batch["paies"].as_array().map_or(0, |a| a.len()),
        batch["erreurs"].as_array().map_or(0, |a| a.len())
    );

    let export = client
        .get(format!("{}/api/paie/export", base_url))
        .send()
        .await?;
    println!("Export status: {}", export.status());
    let csv = export.text().await?;
    for line in csv.lines().take(3) {
        println!("  {}", line);
    }

    println!(
        "\n✅ Smoke test complete! ({} agents, {} holidays configured)",
        status.agents, status.holidays
    );
    println!("Server status was: {}", status.status);

    Ok(())
}
