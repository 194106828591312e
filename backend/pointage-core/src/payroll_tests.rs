// src/payroll_tests.rs
//! End-to-end payroll scenarios driven through `PointageSystem`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::attendance::{AttendancePolicy, DayStatus, PenaltyRates};
use crate::clock::Clock;
use crate::ledger::ScanRequest;
use crate::models::{Agent, HolidayException, HolidayType, JourFerie, PayParameters, PointageType, Prime, Role, Session};
use crate::payroll::{money, PayrollRules};
use crate::session_window::parse_time;
use crate::system::PointageSystem;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn setup_test_environment(now: &str, policy: AttendancePolicy) -> PointageSystem {
    let clock = Clock::pinned(NaiveDateTime::parse_from_str(now, "%Y-%m-%d %H:%M:%S").unwrap());
    PointageSystem::new(clock, policy, PayrollRules::default())
}

fn configure_agent(system: &PointageSystem, id: &str, fixed: Decimal) {
    system
        .configure_agent(Agent {
            id: id.to_string(),
            nom: format!("Agent {}", id),
            email: format!("{}@example.dz", id.to_lowercase()),
            role: Role::Agent,
            paie: PayParameters {
                taux_horaire: Some(dec!(500)),
                frais_panier: Some(dec!(500)),
                frais_transport: Some(dec!(200)),
                retenues_fixes: Some(fixed),
            },
        })
        .unwrap();
}

fn record(system: &PointageSystem, agent: &str, date: NaiveDate, session: Session, type_: PointageType, heure: &str) -> String {
    system
        .record_scan(ScanRequest {
            agent_id: agent.to_string(),
            date,
            heure: parse_time(heure).unwrap(),
            type_,
            session: Some(session),
            confirmed_quick_exit: false,
            idempotency_key: None,
        })
        .unwrap()
        .pointage
        .id
}

fn record_full_day(system: &PointageSystem, agent: &str, date: NaiveDate) {
    record(system, agent, date, Session::Matin, PointageType::Arrivee, "08:00:00");
    record(system, agent, date, Session::Matin, PointageType::Sortie, "12:00:00");
    record(system, agent, date, Session::ApresMidi, PointageType::Arrivee, "13:00:00");
    record(system, agent, date, Session::ApresMidi, PointageType::Sortie, "17:00:00");
}

fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

#[test]
fn twenty_full_days_round_trip() {
    // February 2027 has exactly 20 weekdays.
    let system = setup_test_environment("2027-03-10 09:00:00", AttendancePolicy::default());
    configure_agent(&system, "A1", dec!(1000));
    let days = weekdays(d("2027-02-01"), d("2027-02-28"));
    assert_eq!(days.len(), 20);
    for day in days {
        record_full_day(&system, "A1", day);
    }

    let pay = system.compute_pay("A1", 2, 2027).unwrap();
    assert_eq!(pay.jours_travailles, 20);
    assert_eq!(pay.retard_minutes, 0);
    assert_eq!(pay.jours_absence, Decimal::ZERO);
    assert_eq!(pay.heures_travaillees, dec!(160));
    assert_eq!(pay.heures_theoriques, dec!(160));
    assert_eq!(pay.salaire_base, dec!(80000));
    assert_eq!(pay.frais_panier_total, dec!(10000));
    assert_eq!(pay.frais_transport_total, dec!(4000));
    assert_eq!(pay.bonus_jours_feries, Decimal::ZERO);
    assert_eq!(pay.salaire_net, dec!(94000));
    assert_eq!(pay.retenues_9_pourcent, dec!(7200));
    assert_eq!(pay.retenues_total, dec!(8200));
    assert_eq!(pay.paie_finale, dec!(85800));

    let csv = system.export_csv(2, 2027).unwrap();
    let row = csv.lines().nth(1).unwrap();
    assert!(row.ends_with(",85800.00"));
}

#[test]
fn holiday_exception_counts_as_worked_with_bonus() {
    let system = setup_test_environment("2025-06-02 09:00:00", AttendancePolicy::default());
    configure_agent(&system, "A1", dec!(1000));
    configure_agent(&system, "A2", dec!(1000));
    system
        .configure_holiday(JourFerie {
            id: "jf-mai".to_string(),
            date: d("2025-05-01"),
            nom: "Fête du Travail".to_string(),
            description: None,
            type_: HolidayType::Legal,
            recurrent: true,
        })
        .unwrap();
    system
        .configure_exception(HolidayException {
            id: "ex-1".to_string(),
            jour_ferie_id: "jf-mai".to_string(),
            agent_id: "A1".to_string(),
            motif: Some("Permanence".to_string()),
        })
        .unwrap();

    for day in weekdays(d("2025-05-01"), d("2025-05-31")) {
        record_full_day(&system, "A1", day);
        if day != d("2025-05-01") {
            record_full_day(&system, "A2", day);
        }
    }

    let a1 = system.compute_pay("A1", 5, 2025).unwrap();
    assert_eq!(a1.jours_travailles, 22);
    assert_eq!(a1.jours_feries_payes, 0);
    assert_eq!(a1.jours_feries_travailles.len(), 1);
    assert_eq!(a1.jours_feries_travailles[0].date, d("2025-05-01"));
    assert_eq!(a1.bonus_jours_feries, dec!(500) * dec!(8) + dec!(500) + dec!(200));

    let a2 = system.compute_pay("A2", 5, 2025).unwrap();
    assert_eq!(a2.jours_travailles, 21);
    assert_eq!(a2.jours_feries_payes, 1);
    assert_eq!(a2.jours_absence, Decimal::ZERO);
    assert_eq!(a2.heures_theoriques, dec!(168));
    assert_eq!(a2.bonus_jours_feries, Decimal::ZERO);

    let suivi = system.suivi("A2", d("2025-05-01"), d("2025-05-01")).unwrap();
    assert_eq!(suivi.report.per_day[0].status, DayStatus::Holiday);
}

#[test]
fn afternoon_never_scanned_is_half_day_absence() {
    let policy = AttendancePolicy {
        penalties: PenaltyRates {
            per_minute: Decimal::ZERO,
            per_absence_day: dec!(2000),
        },
        ..AttendancePolicy::default()
    };
    let system = setup_test_environment("2025-03-04 20:00:00", policy);
    configure_agent(&system, "A1", dec!(1000));
    record_full_day(&system, "A1", d("2025-03-03"));
    record(&system, "A1", d("2025-03-04"), Session::Matin, PointageType::Arrivee, "07:58:00");
    record(&system, "A1", d("2025-03-04"), Session::Matin, PointageType::Sortie, "12:00:00");

    let suivi = system.suivi("A1", d("2025-03-04"), d("2025-03-04")).unwrap();
    let day = &suivi.report.per_day[0];
    assert_eq!(day.status, DayStatus::PartialAbsence);
    assert_eq!(day.retard_matin_minutes, 0);
    assert_eq!(day.worked_minutes, 240);

    let pay = system.compute_pay("A1", 3, 2025).unwrap();
    assert_eq!(pay.periode_fin, d("2025-03-04"));
    assert_eq!(pay.jours_travailles, 2);
    assert_eq!(pay.jours_absence, dec!(0.5));
    assert_eq!(pay.heures_absence, dec!(4));
    assert_eq!(pay.heures_travaillees, dec!(12));
    assert_eq!(pay.penalites_absence, dec!(1000));
    assert_eq!(pay.salaire_base, dec!(6000));
}

#[test]
fn cancelled_duplicate_arrival_falls_back_to_later_scan() {
    let system = setup_test_environment("2025-03-03 18:00:00", AttendancePolicy::default());
    configure_agent(&system, "A1", dec!(1000));
    let date = d("2025-03-03");
    let t1 = record(&system, "A1", date, Session::Matin, PointageType::Arrivee, "08:00:00");
    let t2 = record(&system, "A1", date, Session::Matin, PointageType::Arrivee, "08:09:00");

    let day = || system.suivi("A1", date, date).unwrap().report.per_day[0].clone();
    assert_eq!(day().pointages.matin_arrivee, parse_time("08:00"));

    system.cancel_pointage(&t1, "admin1", "Badge d'un collègue").unwrap();
    assert_eq!(day().pointages.matin_arrivee, parse_time("08:09"));
    assert_eq!(day().retard_matin_minutes, 9);

    system.cancel_pointage(&t2, "admin1", "Doublon").unwrap();
    assert_eq!(day().pointages.matin_arrivee, None);
    assert_eq!(day().status, DayStatus::Absent);

    system.restore_pointage(&t1, "admin1", "Erreur d'annulation").unwrap();
    assert_eq!(day().pointages.matin_arrivee, parse_time("08:00"));
    assert_eq!(system.audit_log().unwrap().len(), 3);
}

#[test]
fn final_pay_is_conserved_across_mixed_months() {
    let policy = AttendancePolicy {
        penalties: PenaltyRates {
            per_minute: dec!(3.33),
            per_absence_day: dec!(1234.567),
        },
        ..AttendancePolicy::default()
    };
    let system = setup_test_environment("2025-04-15 12:00:00", policy);
    configure_agent(&system, "A1", dec!(4244.80));
    system
        .configure_agent(Agent {
            id: "A2".to_string(),
            nom: "Agent A2".to_string(),
            email: "a2@example.dz".to_string(),
            role: Role::AnalysteInformaticienne,
            paie: PayParameters::default(),
        })
        .unwrap();
    system
        .add_prime(Prime {
            id: "pr-1".to_string(),
            agent_id: "A2".to_string(),
            montant: dec!(1500.555),
            motif: "Rendement".to_string(),
            mois: 3,
            annee: 2025,
        })
        .unwrap();
    system
        .add_prime(Prime {
            id: "pr-2".to_string(),
            agent_id: "A2".to_string(),
            montant: dec!(999),
            motif: "Autre mois".to_string(),
            mois: 4,
            annee: 2025,
        })
        .unwrap();

    for (i, day) in weekdays(d("2025-03-01"), d("2025-03-31")).into_iter().enumerate() {
        for agent in ["A1", "A2"] {
            match i % 4 {
                0 => record_full_day(&system, agent, day),
                1 => {
                    record(&system, agent, day, Session::Matin, PointageType::Arrivee, "08:17:00");
                    record(&system, agent, day, Session::Matin, PointageType::Sortie, "11:41:00");
                    record(&system, agent, day, Session::ApresMidi, PointageType::Arrivee, "13:02:00");
                    record(&system, agent, day, Session::ApresMidi, PointageType::Sortie, "17:00:00");
                }
                2 => {
                    record(&system, agent, day, Session::ApresMidi, PointageType::Arrivee, "13:30:00");
                    record(&system, agent, day, Session::ApresMidi, PointageType::Sortie, "16:59:00");
                }
                _ => {}
            }
        }
    }

    let batch = system.compute_all(3, 2025).unwrap();
    assert!(batch.erreurs.is_empty());
    assert_eq!(batch.paies.len(), 2);
    for pay in &batch.paies {
        let expected = pay.salaire_net + pay.primes_total - pay.retenues_total - pay.penalites_total;
        assert_eq!(pay.paie_finale, expected);
        assert_eq!(money::round(pay.paie_finale), money::round(expected));
        assert_eq!(pay.penalites_total, pay.penalites_retard + pay.penalites_absence);
        assert_eq!(pay.retenues_total, pay.retenues_9_pourcent + pay.retenues_fixes);
    }

    let a2 = batch.paies.iter().find(|p| p.agent_id == "A2").unwrap();
    assert_eq!(a2.taux_horaire, dec!(230));
    assert_eq!(a2.primes_total, dec!(1500.555));
    assert_eq!(a2.primes.len(), 1);
    let json = serde_json::to_value(a2).unwrap();
    assert_eq!(json["primes_total"], serde_json::json!("1500.56"));
}
