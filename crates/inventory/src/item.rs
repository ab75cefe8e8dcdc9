use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stationlend_core::{DomainError, DomainResult, Entity, ItemId, TenantId};

/// Working/faulty flag. Independent of quantity and availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Working,
    Faulty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Counted,
    Unit,
}

/// Inventory tracked by an integer quantity, not by identity.
///
/// # Invariants
/// - `0 <= quantity <= catalog_total`
/// - `quantity == catalog_total - (units out on open loans)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountedItem {
    pub id: ItemId,
    pub tenant_id: TenantId,
    pub name: String,
    pub category: Option<String>,
    /// Currently on the shelf.
    pub quantity: u32,
    /// Everything the tenant owns, on the shelf or out on loan.
    pub catalog_total: u32,
    pub is_consumable: bool,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a counted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCountedItem {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub is_consumable: bool,
}

/// A single, individually numbered unit (e.g. a spare wheel).
///
/// # Invariants
/// - `is_available == false` iff exactly one open loan references this unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitItem {
    pub id: ItemId,
    pub tenant_id: TenantId,
    pub unit_number: String,
    pub size: Option<String>,
    pub bolt_pattern: Option<String>,
    pub category: Option<String>,
    pub is_available: bool,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a unit item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUnitItem {
    pub unit_number: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub bolt_pattern: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Attribute match used when a request names a kind of unit rather than a
/// specific one. Unset fields match anything; comparison ignores case and
/// surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitQuery {
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub bolt_pattern: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl UnitQuery {
    pub fn is_empty(&self) -> bool {
        self.size.is_none() && self.bolt_pattern.is_none() && self.category.is_none()
    }
}

/// Privileged correction applied after an operator reviewed a reconciliation
/// report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    SetQuantity {
        quantity: u32,
        #[serde(default)]
        catalog_total: Option<u32>,
    },
    SetAvailability { is_available: bool },
}

/// Tagged variant over both item shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InventoryItem {
    Counted(CountedItem),
    Unit(UnitItem),
}

impl CountedItem {
    pub fn create(
        id: ItemId,
        tenant_id: TenantId,
        input: NewCountedItem,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(Self {
            id,
            tenant_id,
            name: input.name,
            category: input.category,
            quantity: input.quantity,
            catalog_total: input.quantity,
            is_consumable: input.is_consumable,
            status: ItemStatus::Working,
            created_at,
        })
    }

    /// Units currently out on loan.
    pub fn out_on_loan(&self) -> u32 {
        self.catalog_total.saturating_sub(self.quantity)
    }

    /// Add (or write off, with a negative delta) stock. The shelf and the
    /// catalog move together so units out on loan are unaffected.
    pub fn restock(&mut self, delta: i64) -> DomainResult<()> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let quantity = i64::from(self.quantity) + delta;
        let total = i64::from(self.catalog_total) + delta;
        if quantity < 0 {
            return Err(DomainError::invariant("quantity cannot go negative"));
        }
        let quantity = u32::try_from(quantity)
            .map_err(|_| DomainError::validation("quantity out of range"))?;
        let total = u32::try_from(total)
            .map_err(|_| DomainError::validation("catalog total out of range"))?;
        self.quantity = quantity;
        self.catalog_total = total;
        Ok(())
    }
}

impl UnitItem {
    pub fn create(
        id: ItemId,
        tenant_id: TenantId,
        input: NewUnitItem,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if input.unit_number.trim().is_empty() {
            return Err(DomainError::validation("unit number cannot be empty"));
        }
        Ok(Self {
            id,
            tenant_id,
            unit_number: input.unit_number,
            size: input.size,
            bolt_pattern: input.bolt_pattern,
            category: input.category,
            is_available: true,
            status: ItemStatus::Working,
            created_at,
        })
    }

    pub fn matches(&self, query: &UnitQuery) -> bool {
        fn field_matches(have: &Option<String>, want: &Option<String>) -> bool {
            match want {
                None => true,
                Some(w) => have
                    .as_deref()
                    .is_some_and(|h| h.trim().eq_ignore_ascii_case(w.trim())),
            }
        }
        field_matches(&self.size, &query.size)
            && field_matches(&self.bolt_pattern, &query.bolt_pattern)
            && field_matches(&self.category, &query.category)
    }
}

impl InventoryItem {
    pub fn id_typed(&self) -> ItemId {
        match self {
            InventoryItem::Counted(c) => c.id,
            InventoryItem::Unit(u) => u.id,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            InventoryItem::Counted(c) => c.tenant_id,
            InventoryItem::Unit(u) => u.tenant_id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            InventoryItem::Counted(_) => ItemKind::Counted,
            InventoryItem::Unit(_) => ItemKind::Unit,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            InventoryItem::Counted(c) => &c.name,
            InventoryItem::Unit(u) => &u.unit_number,
        }
    }

    pub fn status(&self) -> ItemStatus {
        match self {
            InventoryItem::Counted(c) => c.status,
            InventoryItem::Unit(u) => u.status,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            InventoryItem::Counted(c) => c.created_at,
            InventoryItem::Unit(u) => u.created_at,
        }
    }

    pub fn is_consumable(&self) -> bool {
        matches!(self, InventoryItem::Counted(c) if c.is_consumable)
    }

    pub fn as_counted(&self) -> Option<&CountedItem> {
        match self {
            InventoryItem::Counted(c) => Some(c),
            InventoryItem::Unit(_) => None,
        }
    }

    pub fn as_unit(&self) -> Option<&UnitItem> {
        match self {
            InventoryItem::Unit(u) => Some(u),
            InventoryItem::Counted(_) => None,
        }
    }

    /// `setStatus`: flip working/faulty without touching quantity.
    pub fn set_status(&mut self, status: ItemStatus) {
        match self {
            InventoryItem::Counted(c) => c.status = status,
            InventoryItem::Unit(u) => u.status = status,
        }
    }

    pub fn repair(&mut self, action: &RepairAction) -> DomainResult<()> {
        match (self, action) {
            (
                InventoryItem::Counted(c),
                RepairAction::SetQuantity {
                    quantity,
                    catalog_total,
                },
            ) => {
                let total = catalog_total.unwrap_or(c.catalog_total);
                if *quantity > total {
                    return Err(DomainError::validation(format!(
                        "quantity {quantity} exceeds catalog total {total}"
                    )));
                }
                c.quantity = *quantity;
                c.catalog_total = total;
                Ok(())
            }
            (InventoryItem::Unit(u), RepairAction::SetAvailability { is_available }) => {
                u.is_available = *is_available;
                Ok(())
            }
            (InventoryItem::Counted(_), RepairAction::SetAvailability { .. }) => Err(
                DomainError::validation("counted items are repaired with set_quantity"),
            ),
            (InventoryItem::Unit(_), RepairAction::SetQuantity { .. }) => Err(
                DomainError::validation("unit items are repaired with set_availability"),
            ),
        }
    }
}

impl Entity for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        match self {
            InventoryItem::Counted(c) => &c.id,
            InventoryItem::Unit(u) => &u.id,
        }
    }
}
