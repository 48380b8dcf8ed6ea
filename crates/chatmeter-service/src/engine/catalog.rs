//! Plan catalog with a swap-on-write cache.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chatmeter_core::{MeteringError, Plan, PlanId, Result};
use chatmeter_store::Store;

type PlanTable = Arc<BTreeMap<PlanId, Plan>>;

/// Read-mostly plan table.
///
/// Readers clone the `Arc` of the current snapshot. Writers persist first,
/// then replace the snapshot while holding the write lock, so a reader sees
/// either the old table or the new one.
pub struct PlanCatalog {
    store: Arc<dyn Store>,
    table: RwLock<PlanTable>,
}

fn poisoned<T>(_: T) -> MeteringError {
    MeteringError::Unavailable("plan catalog lock poisoned".into())
}

impl PlanCatalog {
    /// Load plans from the store, seeding the default catalog into an empty store.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store cannot be read or written.
    pub fn load(store: Arc<dyn Store>) -> Result<Self> {
        let mut plans = store.list_plans()?;
        if plans.is_empty() {
            plans = Plan::default_catalog();
            for plan in &plans {
                store.put_plan(plan)?;
            }
            tracing::info!(count = plans.len(), "Seeded default subscription plans");
        }

        let table = plans.into_iter().map(|p| (p.id, p)).collect();
        Ok(Self {
            store,
            table: RwLock::new(Arc::new(table)),
        })
    }

    fn snapshot(&self) -> Result<PlanTable> {
        Ok(Arc::clone(&*self.table.read().map_err(poisoned)?))
    }

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown plan.
    pub fn get(&self, plan_id: PlanId) -> Result<Plan> {
        self.snapshot()?
            .get(&plan_id)
            .cloned()
            .ok_or_else(|| MeteringError::not_found("plan", plan_id))
    }

    /// All plans ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the cache lock is poisoned.
    pub fn list(&self) -> Result<Vec<Plan>> {
        Ok(self.snapshot()?.values().cloned().collect())
    }

    /// Insert or replace a plan.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for a negative price or a zero duration, and
    /// `Unavailable` if the store write fails.
    pub fn upsert(&self, plan: Plan) -> Result<Plan> {
        if plan.price_cents < 0 {
            return Err(MeteringError::InvalidAmount(
                "plan price cannot be negative".into(),
            ));
        }
        if plan.duration_days == 0 {
            return Err(MeteringError::InvalidAmount(
                "plan duration must be at least one day".into(),
            ));
        }

        let mut table = self.table.write().map_err(poisoned)?;
        self.store.put_plan(&plan)?;

        let mut next = BTreeMap::clone(&table);
        next.insert(plan.id, plan.clone());
        *table = Arc::new(next);

        tracing::info!(plan_id = %plan.id, name = %plan.name, "Plan upserted");
        Ok(plan)
    }
}
