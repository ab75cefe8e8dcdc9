//! Inventory ledger: the only writer of item quantities and availability.
//!
//! Items live in an arena of rows keyed by item id and partitioned by tenant.
//! Each row has its own mutex; a reserve or release evaluates its condition and
//! applies the mutation while holding that row lock, so two callers racing for
//! the last unit can never both succeed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use stationlend_core::{DomainError, DomainResult, ItemId, TenantId};
use stationlend_inventory::{
    CountedItem, InventoryItem, ItemStatus, NewCountedItem, NewUnitItem, RepairAction, Reservable,
    Reservation, UnitItem, UnitQuery,
};

type Row = Arc<Mutex<InventoryItem>>;

/// What happened to stock coming back from a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Put back on the shelf.
    Released,
    /// Consumable: written off the catalog.
    Consumed,
}

#[derive(Debug, Default)]
pub struct InventoryLedger {
    tenants: RwLock<HashMap<TenantId, HashMap<ItemId, Row>>>,
}

fn poisoned() -> DomainError {
    DomainError::invariant("inventory ledger lock poisoned")
}

fn lock(row: &Row) -> DomainResult<MutexGuard<'_, InventoryItem>> {
    row.lock().map_err(|_| poisoned())
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, tenant_id: TenantId, item_id: ItemId) -> DomainResult<Row> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        tenants
            .get(&tenant_id)
            .and_then(|items| items.get(&item_id))
            .cloned()
            .ok_or(DomainError::NotFound)
    }

    fn rows(&self, tenant_id: TenantId) -> DomainResult<Vec<Row>> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        Ok(tenants
            .get(&tenant_id)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default())
    }

    fn insert(&self, item: InventoryItem) -> DomainResult<InventoryItem> {
        let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
        let items = tenants.entry(item.tenant_id()).or_default();

        if let InventoryItem::Unit(new_unit) = &item {
            for row in items.values() {
                if let InventoryItem::Unit(existing) = &*lock(row)?
                    && existing.unit_number.eq_ignore_ascii_case(&new_unit.unit_number)
                {
                    return Err(DomainError::conflict(format!(
                        "unit number '{}' already exists",
                        new_unit.unit_number
                    )));
                }
            }
        }

        items.insert(item.id_typed(), Arc::new(Mutex::new(item.clone())));
        Ok(item)
    }

    pub fn add_counted_item(
        &self,
        tenant_id: TenantId,
        input: NewCountedItem,
        at: DateTime<Utc>,
    ) -> DomainResult<InventoryItem> {
        let item = CountedItem::create(ItemId::new(), tenant_id, input, at)?;
        let item = self.insert(InventoryItem::Counted(item))?;
        tracing::info!(tenant_id = %tenant_id, item_id = %item.id_typed(), "counted item added");
        Ok(item)
    }

    pub fn add_unit_item(
        &self,
        tenant_id: TenantId,
        input: NewUnitItem,
        at: DateTime<Utc>,
    ) -> DomainResult<InventoryItem> {
        let item = UnitItem::create(ItemId::new(), tenant_id, input, at)?;
        let item = self.insert(InventoryItem::Unit(item))?;
        tracing::info!(tenant_id = %tenant_id, item_id = %item.id_typed(), "unit item added");
        Ok(item)
    }

    pub fn get(&self, tenant_id: TenantId, item_id: ItemId) -> DomainResult<InventoryItem> {
        let row = self.row(tenant_id, item_id)?;
        let item = lock(&row)?;
        Ok(item.clone())
    }

    pub fn get_counted_item(&self, tenant_id: TenantId, item_id: ItemId) -> DomainResult<CountedItem> {
        self.get(tenant_id, item_id)?
            .as_counted()
            .cloned()
            .ok_or(DomainError::NotFound)
    }

    pub fn get_unit_item(&self, tenant_id: TenantId, item_id: ItemId) -> DomainResult<UnitItem> {
        self.get(tenant_id, item_id)?
            .as_unit()
            .cloned()
            .ok_or(DomainError::NotFound)
    }

    /// Current state of every item, oldest first.
    pub fn list(&self, tenant_id: TenantId) -> DomainResult<Vec<InventoryItem>> {
        let mut items = self
            .rows(tenant_id)?
            .iter()
            .map(|row| lock(row).map(|item| item.clone()))
            .collect::<DomainResult<Vec<_>>>()?;
        items.sort_by_key(|item| (item.created_at(), item.id_typed()));
        Ok(items)
    }

    pub fn reserve(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        quantity: u32,
    ) -> DomainResult<Reservation> {
        let row = self.row(tenant_id, item_id)?;
        let mut item = lock(&row)?;
        let reservation = item.reserve(quantity)?;
        tracing::debug!(tenant_id = %tenant_id, item_id = %item_id, quantity, "reserved");
        Ok(reservation)
    }

    pub fn release(&self, tenant_id: TenantId, item_id: ItemId, quantity: u32) -> DomainResult<()> {
        let row = self.row(tenant_id, item_id)?;
        let mut item = lock(&row)?;
        item.release(quantity).inspect_err(|e| {
            if e.is_integrity_failure() {
                tracing::error!(
                    tenant_id = %tenant_id,
                    item_id = %item_id,
                    quantity,
                    error = %e,
                    "release refused: ledger integrity failure"
                );
            }
        })?;
        tracing::debug!(tenant_id = %tenant_id, item_id = %item_id, quantity, "released");
        Ok(())
    }

    /// Close out stock coming back from a loan: consumables are written off,
    /// everything else is released.
    pub fn settle(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        quantity: u32,
    ) -> DomainResult<Settlement> {
        let row = self.row(tenant_id, item_id)?;
        let mut item = lock(&row)?;
        let (result, settlement) = if item.is_consumable() {
            (item.consume(quantity), Settlement::Consumed)
        } else {
            (item.release(quantity), Settlement::Released)
        };
        result.inspect_err(|e| {
            if e.is_integrity_failure() {
                tracing::error!(
                    tenant_id = %tenant_id,
                    item_id = %item_id,
                    quantity,
                    error = %e,
                    "settlement refused: ledger integrity failure"
                );
            }
        })?;
        Ok(settlement)
    }

    /// Returns the previous status.
    pub fn set_status(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        status: ItemStatus,
    ) -> DomainResult<ItemStatus> {
        let row = self.row(tenant_id, item_id)?;
        let mut item = lock(&row)?;
        let previous = item.status();
        item.set_status(status);
        if previous != status {
            tracing::info!(tenant_id = %tenant_id, item_id = %item_id, status = ?status, "item status changed");
        }
        Ok(previous)
    }

    pub fn restock(&self, tenant_id: TenantId, item_id: ItemId, delta: i64) -> DomainResult<InventoryItem> {
        let row = self.row(tenant_id, item_id)?;
        let mut item = lock(&row)?;
        match &mut *item {
            InventoryItem::Counted(c) => c.restock(delta)?,
            InventoryItem::Unit(_) => {
                return Err(DomainError::validation(
                    "unit items are added individually, not restocked",
                ));
            }
        }
        tracing::info!(tenant_id = %tenant_id, item_id = %item_id, delta, "item restocked");
        Ok(item.clone())
    }

    /// Privileged correction after a reconciliation report.
    pub fn repair(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        action: &RepairAction,
    ) -> DomainResult<InventoryItem> {
        let row = self.row(tenant_id, item_id)?;
        let mut item = lock(&row)?;
        item.repair(action)?;
        tracing::warn!(tenant_id = %tenant_id, item_id = %item_id, action = ?action, "item repaired by operator");
        Ok(item.clone())
    }

    /// Oldest working, available unit matching `query`.
    pub fn find_available_unit(
        &self,
        tenant_id: TenantId,
        query: &UnitQuery,
    ) -> DomainResult<Option<ItemId>> {
        let mut candidates = Vec::new();
        for row in self.rows(tenant_id)? {
            let item = lock(&row)?;
            if let InventoryItem::Unit(u) = &*item
                && u.is_available
                && u.status == ItemStatus::Working
                && u.matches(query)
            {
                candidates.push((u.created_at, u.id));
            }
        }
        candidates.sort();
        Ok(candidates.first().map(|(_, id)| *id))
    }

    /// Put back a previously read state of an item. Used to undo ledger
    /// effects of a transition that failed to commit; the caller must hold
    /// the tenant's transition gate.
    pub(crate) fn restore(&self, snapshot: InventoryItem) -> DomainResult<()> {
        let row = self.row(snapshot.tenant_id(), snapshot.id_typed())?;
        let mut item = lock(&row)?;
        *item = snapshot;
        Ok(())
    }
}
