//! Integration tests for the BatchFixer and the RPC surface.

mod common;

use common::harness;
use financing_recon_core::batch::{BatchFixer, BatchScope};

#[test]
fn fix_application_reports_before_and_after() {
    let h = harness();
    h.plan("P1", Some("cash"));
    h.app("A1", "P1", Some("producto"));
    let fixer = BatchFixer::new(h.corrector());

    let r = fixer.fix_application("A1");
    assert!(r.success);
    assert!(r.updated);
    assert_eq!(r.old_financing_type.as_deref(), Some("producto"));
    assert_eq!(r.new_financing_type.as_deref(), Some("personal"));
    assert_eq!(r.simulation_type.as_deref(), Some("cash"));

    let again = fixer.fix_application("A1");
    assert!(again.success);
    assert!(!again.updated);
    assert_eq!(again.message, "Financing type already correct");
}

#[test]
fn fix_application_unknown_id() {
    let h = harness();
    let r = BatchFixer::new(h.corrector()).fix_application("missing");
    assert!(!r.success);
    assert_eq!(r.error.as_deref(), Some("Application not found"));
}

#[test]
fn fix_recent_applications_uses_hours_window() {
    let h = harness();
    h.plan("P1", Some("cash"));
    h.plan("P2", Some("product"));
    h.app_minutes_ago("A1", "P1", Some("producto"), 30);
    h.app_minutes_ago("A2", "P2", Some("producto"), 90);
    h.app_minutes_ago("A3", "P1", Some("producto"), 5 * 60);
    let fixer = BatchFixer::new(h.corrector());

    let report = fixer.fix_recent_applications(2);
    assert!(report.success);
    assert_eq!(report.hours_back, Some(2));
    assert_eq!(report.total_processed, 2);
    assert_eq!(report.total_updated, 1);
    assert_eq!(report.results.len(), 2);
    assert!(report.summary.outcomes.is_empty());
    assert_eq!(h.financing_type("A3").as_deref(), Some("producto"));

    let wide = fixer.fix_recent_applications(6);
    assert_eq!(wide.total_processed, 3);
    assert_eq!(wide.total_updated, 1);
    assert_eq!(h.financing_type("A3").as_deref(), Some("personal"));
}

#[test]
fn zero_hours_is_rejected_with_a_structured_result() {
    let h = harness();
    let report = BatchFixer::new(h.corrector()).fix_recent_applications(0);
    assert!(!report.success);
    assert!(report.error.is_some());
    assert_eq!(report.total_processed, 0);
}

#[test]
fn explicit_ids_include_missing_records() {
    let h = harness();
    h.plan("P1", Some("cash"));
    h.app_minutes_ago("A1", "P1", Some("producto"), 24 * 60);
    let fixer = BatchFixer::new(h.corrector());

    let report = fixer.run(BatchScope::Ids(vec!["A1".into(), "ghost".into()]));
    assert!(report.success);
    assert_eq!(report.total_processed, 2);
    assert_eq!(report.total_updated, 1);
    assert_eq!(report.summary.missing, 1);
    let ghost = report.results.iter().find(|r| r.app_id == "ghost").unwrap();
    assert!(!ghost.success);
    assert_eq!(h.financing_type("A1").as_deref(), Some("personal"));
}

#[test]
fn batch_report_serializes_for_rpc() {
    let h = harness();
    h.plan("P1", Some("cash"));
    h.app("A1", "P1", None);
    let report = BatchFixer::new(h.corrector()).fix_recent_applications(1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total_processed"], 1);
    assert_eq!(json["total_updated"], 1);
    assert_eq!(json["results"][0]["app_id"], "A1");
    assert_eq!(json["results"][0]["new_financing_type"], "personal");
}

#[test]
fn fix_recent_applications_out_of_range_hours_is_a_failed_report() {
    let h = harness();
    h.plan("P1", Some("cash"));
    h.app("A1", "P1", Some("producto"));
    let fixer = BatchFixer::new(h.corrector());

    let report = fixer.fix_recent_applications(u32::MAX);
    assert!(!report.success);
    assert_eq!(report.hours_back, Some(u32::MAX));
    assert_eq!(report.total_processed, 0);
    assert!(report.error.is_some());
    assert_eq!(h.financing_type("A1").as_deref(), Some("producto"));
}

#[test]
fn fix_recent_applications_accepts_a_century() {
    let h = harness();
    h.plan("P1", Some("cash"));
    h.app_minutes_ago("OLD", "P1", Some("producto"), 60 * 24 * 365 * 20);
    let report = BatchFixer::new(h.corrector()).fix_recent_applications(24 * 365 * 100);
    assert!(report.success);
    assert_eq!(report.total_updated, 1);
    assert_eq!(h.financing_type("OLD").as_deref(), Some("personal"));
}
