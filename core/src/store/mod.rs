//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! Corrector, handlers and sweeps go through `ApplicationStore`;
//! they never execute SQL directly.

use crate::{
    error::{ReconError, ReconResult},
    sync_trigger::SyncTriggerHandler,
    types::{Application, NewApplication, ProductDetails, SourcePlan},
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

mod application;
mod source_plan;

/// The query surface the engine consumes.
///
/// Implementations must be safe to share across the sync hook, event
/// tasks and the sweep loop.
pub trait ApplicationStore: Send + Sync {
    /// Cheap connectivity check, used once at startup.
    fn ping(&self) -> ReconResult<()>;

    fn get_application(&self, id: &str) -> ReconResult<Option<Application>>;

    /// `selected_plans` rows with a source_id created at or after `since`,
    /// newest first.
    fn recent_candidates(&self, since: DateTime<Utc>) -> ReconResult<Vec<Application>>;

    /// Every `selected_plans` row (with or without source_id), newest
    /// first, optionally capped.
    fn selected_plan_applications(&self, limit: Option<usize>) -> ReconResult<Vec<Application>>;

    /// SourcePlan by primary key, including its simulation_type and
    /// product listing. `Ok(None)` means not committed yet.
    fn source_plan(&self, id: &str) -> ReconResult<Option<SourcePlan>>;

    /// Conditional update of financing_type and updated_at scoped by id.
    /// Returns false when no row changed: the row already holds `target`
    /// or no longer exists.
    fn set_financing_type(
        &self,
        id: &str,
        target: &str,
        updated_at: DateTime<Utc>,
    ) -> ReconResult<bool>;

    /// `producto` applications whose product listing is incomplete.
    fn product_sync_candidates(&self) -> ReconResult<Vec<Application>>;

    /// Conditional copy of the product listing onto a `producto`
    /// application. Returns false when the row already matches, is no
    /// longer `producto`, or is gone.
    fn set_product_details(
        &self,
        id: &str,
        product: &ProductDetails,
        updated_at: DateTime<Utc>,
    ) -> ReconResult<bool>;
}

pub struct CrmStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl CrmStore {
    pub fn open(path: &str, timeout: Duration) -> ReconResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.busy_timeout(timeout)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ReconResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// In-memory store with migrations applied.
    pub fn in_memory_migrated() -> ReconResult<Self> {
        let store = Self::in_memory()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ReconResult<()> {
        self.conn()?
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    fn conn(&self) -> ReconResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ReconError::LockPoisoned)
    }

    // ── Writes outside the reconciliation path ─────────────────

    pub fn insert_source_plan(&self, plan: &SourcePlan) -> ReconResult<()> {
        source_plan::insert(&*self.conn()?, plan)
    }

    /// Insert an Application. When `trigger` is given it runs inside the
    /// insert transaction and may rewrite the in-flight record (its
    /// financing_type and product listing) before it becomes visible to
    /// any other reader.
    pub fn insert_application(
        &self,
        new: &NewApplication,
        created_at: DateTime<Utc>,
        trigger: Option<&SyncTriggerHandler>,
    ) -> ReconResult<Application> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut record = new.clone();
        if let Some(trigger) = trigger {
            trigger.before_insert(&mut record, |source_id| source_plan::find(&tx, source_id));
        }
        let app = application::insert(&tx, &record, created_at)?;
        tx.commit()?;
        Ok(app)
    }

    /// Unconditional financing_type write, bypassing the Corrector.
    /// Models writers outside this engine (UI, legacy scripts).
    pub fn overwrite_financing_type(&self, id: &str, value: Option<&str>) -> ReconResult<()> {
        application::overwrite_financing_type(&*self.conn()?, id, value)
    }

    pub fn application_count(&self) -> ReconResult<i64> {
        application::count(&*self.conn()?)
    }
}

impl ApplicationStore for CrmStore {
    fn ping(&self) -> ReconResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        application::count(&conn)?;
        Ok(())
    }

    fn get_application(&self, id: &str) -> ReconResult<Option<Application>> {
        application::find(&*self.conn()?, id)
    }

    fn recent_candidates(&self, since: DateTime<Utc>) -> ReconResult<Vec<Application>> {
        application::recent_candidates(&*self.conn()?, since)
    }

    fn selected_plan_applications(&self, limit: Option<usize>) -> ReconResult<Vec<Application>> {
        application::selected_plans(&*self.conn()?, limit)
    }

    fn source_plan(&self, id: &str) -> ReconResult<Option<SourcePlan>> {
        source_plan::find(&*self.conn()?, id)
    }

    fn set_financing_type(
        &self,
        id: &str,
        target: &str,
        updated_at: DateTime<Utc>,
    ) -> ReconResult<bool> {
        application::set_financing_type(&*self.conn()?, id, target, updated_at)
    }

    fn product_sync_candidates(&self) -> ReconResult<Vec<Application>> {
        application::product_sync_candidates(&*self.conn()?)
    }

    fn set_product_details(
        &self,
        id: &str,
        product: &ProductDetails,
        updated_at: DateTime<Utc>,
    ) -> ReconResult<bool> {
        application::set_product_details(&*self.conn()?, id, product, updated_at)
    }
}
