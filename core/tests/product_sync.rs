//! Integration tests for ProductSync, the product-listing rule.

mod common;

use common::harness;
use financing_recon_core::{
    clock::Clock,
    product_sync::{ProductSync, ProductSyncReason},
    store::ApplicationStore,
    types::ProductDetails,
};

fn listing() -> ProductDetails {
    ProductDetails {
        url: Some("https://shop.example/p/3".into()),
        title: Some("Refrigerador duplex".into()),
        image: Some("https://shop.example/p/3.jpg".into()),
        price: Some(1_250.0),
    }
}

fn sync(h: &common::Harness) -> ProductSync {
    ProductSync::from_corrector(&h.corrector())
}

// ─────────────────────────────────────────────────────────────────────────────
// Single record
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn copies_listing_once_then_reads_only() {
    let h = harness();
    h.product_plan("P1", listing());
    h.app("A1", "P1", Some("producto"));

    let first = sync(&h).apply_by_id("A1").unwrap();
    assert!(first.updated);
    assert_eq!(first.reason, ProductSyncReason::Synced);
    assert_eq!(first.before, ProductDetails::default());
    assert_eq!(first.after, listing());
    assert_eq!(h.fetch("A1").product, listing());
    assert_eq!(h.fetch("A1").updated_at, h.clock.now());

    let second = sync(&h).apply_by_id("A1").unwrap();
    assert!(!second.updated);
    assert_eq!(second.reason, ProductSyncReason::AlreadySynced);
}

#[test]
fn skips_records_that_are_not_producto() {
    let h = harness();
    h.product_plan("P1", listing());
    h.app("A1", "P1", Some("personal"));

    let r = sync(&h).apply_by_id("A1").unwrap();
    assert_eq!(r.reason, ProductSyncReason::NotProduct);
    assert_eq!(h.fetch("A1").product, ProductDetails::default());
}

#[test]
fn waits_for_plan_and_listing() {
    let h = harness();
    h.app("A1", "P1", Some("producto"));
    assert_eq!(
        sync(&h).apply_by_id("A1").unwrap().reason,
        ProductSyncReason::SourceNotReady
    );

    h.plan("P1", Some("product"));
    assert_eq!(
        sync(&h).apply_by_id("A1").unwrap().reason,
        ProductSyncReason::NoListing
    );
}

#[test]
fn price_only_plan_is_not_a_listing() {
    let h = harness();
    h.product_plan(
        "P1",
        ProductDetails {
            price: Some(99.0),
            ..ProductDetails::default()
        },
    );
    h.app("A1", "P1", Some("producto"));
    assert_eq!(
        sync(&h).apply_by_id("A1").unwrap().reason,
        ProductSyncReason::NoListing
    );
}

#[test]
fn stale_listing_is_replaced() {
    let h = harness();
    h.product_plan("P1", listing());
    h.app("A1", "P1", Some("producto"));
    let stale = ProductDetails {
        title: Some("old title".into()),
        ..listing()
    };
    h.store.set_product_details("A1", &stale, h.clock.now()).unwrap();

    let r = sync(&h).apply_by_id("A1").unwrap();
    assert!(r.updated);
    assert_eq!(r.before, stale);
    assert_eq!(h.fetch("A1").product, listing());
}

#[test]
fn unknown_application_is_an_error() {
    let h = harness();
    assert!(sync(&h).apply_by_id("ghost").is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Pending pass
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn pending_pass_survives_a_failing_record() {
    let h = harness();
    h.product_plan("P1", listing());
    h.product_plan("P2", listing());
    h.plan("P3", Some("product"));
    h.app_minutes_ago("A1", "P1", Some("producto"), 1);
    h.app_minutes_ago("A2", "P2", Some("producto"), 2);
    h.app_minutes_ago("A3", "P3", Some("producto"), 3);
    h.app_minutes_ago("A4", "P1", Some("personal"), 4);
    let (corrector, flaky) = h.flaky_corrector();
    flaky.fail_source("P2");

    let summary = ProductSync::from_corrector(&corrector).sync_pending();
    assert!(summary.success);
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(h.fetch("A1").product, listing());

    flaky.heal_source("P2");
    let retry = ProductSync::from_corrector(&corrector).sync_pending();
    assert_eq!(retry.synced, 1);
    assert_eq!(retry.failed, 0);
    assert_eq!(h.fetch("A2").product, listing());
}

#[test]
fn financing_fix_then_product_sync_converges() {
    let h = harness();
    h.product_plan("P1", listing());
    h.app("A1", "P1", Some("personal"));

    assert_eq!(sync(&h).sync_pending().candidates, 0);
    assert!(h.corrector().apply_by_id("A1").unwrap().updated);

    let summary = sync(&h).sync_pending();
    assert_eq!(summary.synced, 1);
    assert_eq!(h.fetch("A1").product, listing());
    assert_eq!(sync(&h).sync_pending().candidates, 0);
}
