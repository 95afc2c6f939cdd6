//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use financing_recon_core::{
    clock::{Clock, FixedClock},
    corrector::Corrector,
    error::{ReconError, ReconResult},
    store::{ApplicationStore, CrmStore},
    types::{Application, NewApplication, ProductDetails, SourcePlan},
};
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 13, 10, 0, 0).unwrap()
}

pub struct Harness {
    pub store: Arc<CrmStore>,
    pub clock: Arc<FixedClock>,
}

pub fn harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    Harness {
        store: Arc::new(CrmStore::in_memory_migrated().expect("in-memory store")),
        clock: Arc::new(FixedClock::new(t0())),
    }
}

impl Harness {
    pub fn corrector(&self) -> Corrector {
        let store: Arc<dyn ApplicationStore> = self.store.clone();
        let clock: Arc<dyn Clock> = self.clock.clone();
        Corrector::new(store, clock)
    }

    /// Corrector backed by a fault-injecting wrapper around this store.
    pub fn flaky_corrector(&self) -> (Corrector, Arc<FlakyStore>) {
        let flaky = Arc::new(FlakyStore::new(self.store.clone()));
        let store: Arc<dyn ApplicationStore> = flaky.clone();
        let clock: Arc<dyn Clock> = self.clock.clone();
        (Corrector::new(store, clock), flaky)
    }

    /// Corrector whose financing_type writes block until released.
    pub fn gated_corrector(&self) -> (Corrector, Arc<GatedStore>) {
        let gated = Arc::new(GatedStore::new(self.store.clone()));
        let store: Arc<dyn ApplicationStore> = gated.clone();
        let clock: Arc<dyn Clock> = self.clock.clone();
        (Corrector::new(store, clock), gated)
    }

    pub fn product_plan(&self, id: &str, product: ProductDetails) {
        self.store
            .insert_source_plan(&SourcePlan::new(id, Some("product")).with_product(product))
            .unwrap();
    }

    pub fn plan(&self, id: &str, simulation_type: Option<&str>) {
        self.store
            .insert_source_plan(&SourcePlan::new(id, simulation_type))
            .unwrap();
    }

    /// Insert a selected_plans application created "now".
    pub fn app(&self, id: &str, source_id: &str, financing_type: Option<&str>) -> Application {
        self.app_at(id, source_id, financing_type, self.clock.now())
    }

    pub fn app_at(
        &self,
        id: &str,
        source_id: &str,
        financing_type: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Application {
        self.store
            .insert_application(
                &NewApplication::selected_plan(source_id, financing_type).with_id(id),
                created_at,
                None,
            )
            .unwrap()
    }

    pub fn app_minutes_ago(
        &self,
        id: &str,
        source_id: &str,
        financing_type: Option<&str>,
        minutes: i64,
    ) -> Application {
        self.app_at(
            id,
            source_id,
            financing_type,
            self.clock.now() - Duration::minutes(minutes),
        )
    }

    pub fn other_app(&self, id: &str, application_type: &str, source_id: Option<&str>) -> Application {
        self.store
            .insert_application(
                &NewApplication {
                    id: Some(id.into()),
                    application_type: application_type.into(),
                    source_id: source_id.map(str::to_string),
                    financing_type: Some("producto".into()),
                    product: ProductDetails::default(),
                },
                self.clock.now(),
                None,
            )
            .unwrap()
    }

    pub fn fetch(&self, id: &str) -> Application {
        self.store.get_application(id).unwrap().expect("application exists")
    }

    pub fn financing_type(&self, id: &str) -> Option<String> {
        self.fetch(id).financing_type
    }
}

/// Delegates to a real store but fails chosen calls with a transient error.
pub struct FlakyStore {
    inner: Arc<CrmStore>,
    failing_sources: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    writes: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<CrmStore>) -> Self {
        Self {
            inner,
            failing_sources: Mutex::new(HashSet::new()),
            failing_writes: Mutex::new(HashSet::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_source(&self, source_id: &str) {
        self.failing_sources.lock().unwrap().insert(source_id.into());
    }

    pub fn heal_source(&self, source_id: &str) {
        self.failing_sources.lock().unwrap().remove(source_id);
    }

    pub fn fail_write(&self, application_id: &str) {
        self.failing_writes.lock().unwrap().insert(application_id.into());
    }

    /// Ids of every successful financing_type write, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

fn transient() -> ReconError {
    ReconError::Other(anyhow::anyhow!("connection reset by peer"))
}

impl ApplicationStore for FlakyStore {
    fn ping(&self) -> ReconResult<()> {
        self.inner.ping()
    }

    fn get_application(&self, id: &str) -> ReconResult<Option<Application>> {
        self.inner.get_application(id)
    }

    fn recent_candidates(&self, since: DateTime<Utc>) -> ReconResult<Vec<Application>> {
        self.inner.recent_candidates(since)
    }

    fn selected_plan_applications(&self, limit: Option<usize>) -> ReconResult<Vec<Application>> {
        self.inner.selected_plan_applications(limit)
    }

    fn source_plan(&self, id: &str) -> ReconResult<Option<SourcePlan>> {
        if self.failing_sources.lock().unwrap().contains(id) {
            return Err(transient());
        }
        self.inner.source_plan(id)
    }

    fn set_financing_type(
        &self,
        id: &str,
        target: &str,
        updated_at: DateTime<Utc>,
    ) -> ReconResult<bool> {
        if self.failing_writes.lock().unwrap().contains(id) {
            return Err(transient());
        }
        let written = self.inner.set_financing_type(id, target, updated_at)?;
        if written {
            self.writes.lock().unwrap().push(id.to_string());
        }
        Ok(written)
    }

    fn product_sync_candidates(&self) -> ReconResult<Vec<Application>> {
        self.inner.product_sync_candidates()
    }

    fn set_product_details(
        &self,
        id: &str,
        product: &ProductDetails,
        updated_at: DateTime<Utc>,
    ) -> ReconResult<bool> {
        if self.failing_writes.lock().unwrap().contains(id) {
            return Err(transient());
        }
        self.inner.set_product_details(id, product, updated_at)
    }
}

#[derive(Default)]
struct GateState {
    entered: bool,
    open: bool,
}

/// Delegates to a real store, but `set_financing_type` parks until
/// `release` is called (or five seconds pass).
pub struct GatedStore {
    inner: Arc<CrmStore>,
    state: Mutex<GateState>,
    opened: Condvar,
}

impl GatedStore {
    pub fn new(inner: Arc<CrmStore>) -> Self {
        Self {
            inner,
            state: Mutex::new(GateState::default()),
            opened: Condvar::new(),
        }
    }

    /// True once a write is parked at the gate.
    pub fn entered(&self) -> bool {
        self.state.lock().unwrap().entered
    }

    pub fn release(&self) {
        self.state.lock().unwrap().open = true;
        self.opened.notify_all();
    }
}

impl ApplicationStore for GatedStore {
    fn ping(&self) -> ReconResult<()> {
        self.inner.ping()
    }

    fn get_application(&self, id: &str) -> ReconResult<Option<Application>> {
        self.inner.get_application(id)
    }

    fn recent_candidates(&self, since: DateTime<Utc>) -> ReconResult<Vec<Application>> {
        self.inner.recent_candidates(since)
    }

    fn selected_plan_applications(&self, limit: Option<usize>) -> ReconResult<Vec<Application>> {
        self.inner.selected_plan_applications(limit)
    }

    fn source_plan(&self, id: &str) -> ReconResult<Option<SourcePlan>> {
        self.inner.source_plan(id)
    }

    fn set_financing_type(
        &self,
        id: &str,
        target: &str,
        updated_at: DateTime<Utc>,
    ) -> ReconResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.entered = true;
        let (state, _) = self
            .opened
            .wait_timeout_while(state, std::time::Duration::from_secs(5), |s| !s.open)
            .unwrap();
        drop(state);
        self.inner.set_financing_type(id, target, updated_at)
    }

    fn product_sync_candidates(&self) -> ReconResult<Vec<Application>> {
        self.inner.product_sync_candidates()
    }

    fn set_product_details(
        &self,
        id: &str,
        product: &ProductDetails,
        updated_at: DateTime<Utc>,
    ) -> ReconResult<bool> {
        self.inner.set_product_details(id, product, updated_at)
    }
}
