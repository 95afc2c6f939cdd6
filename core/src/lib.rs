//! Financing-type reconciliation engine.
//!
//! Keeps `Application.financing_type` consistent with the
//! `simulation_type` of the SourcePlan it was created from. One
//! idempotent `Corrector` is driven from several thin adapters:
//!
//!   - `SyncTriggerHandler`  inline with the insert (best effort)
//!   - `EventHandler`        after commit, per change notification
//!   - `SweepScheduler`      periodic trailing-window scan
//!   - `BatchFixer`          operator window / explicit ids, RPC surface
//!   - `DiagnosticProbe`     read-only audit
//!
//! Any interleaving of these converges to the same state.
//!
//! `ProductSync` applies a second derived-field rule the same way: the
//! product listing of a SourcePlan is mirrored onto `producto`
//! applications.

pub mod batch;
pub mod clock;
pub mod config;
pub mod corrector;
pub mod diagnostic;
pub mod error;
pub mod event;
pub mod event_handler;
pub mod lookup;
pub mod mapping;
pub mod product_sync;
pub mod store;
pub mod sweep;
pub mod sync_trigger;
pub mod types;
