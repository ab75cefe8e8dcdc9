use serde::{Deserialize, Serialize};

use stationlend_core::{DomainError, DomainResult, ItemId};

use crate::item::{CountedItem, InventoryItem, ItemKind, UnitItem};

/// Proof that stock was taken off the shelf for a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub item_id: ItemId,
    pub kind: ItemKind,
    pub quantity: u32,
}

/// Lending capability shared by both item shapes.
///
/// Each call is a single check-and-mutate step: either the condition holds and
/// the item changes, or an error is returned and nothing changed. Callers that
/// share an item across threads must hold the item's lock for the whole call.
pub trait Reservable {
    /// Can `quantity` be reserved right now?
    fn can_reserve(&self, quantity: u32) -> bool;

    /// Take `quantity` off the shelf.
    fn reserve(&mut self, quantity: u32) -> DomainResult<Reservation>;

    /// Put `quantity` back on the shelf (inverse of `reserve`).
    fn release(&mut self, quantity: u32) -> DomainResult<()>;

    /// Close out a reservation whose units do not come back (consumables):
    /// the catalog shrinks instead of the shelf growing.
    fn consume(&mut self, quantity: u32) -> DomainResult<()>;
}

fn ensure_positive(quantity: u32) -> DomainResult<()> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    Ok(())
}

impl Reservable for CountedItem {
    fn can_reserve(&self, quantity: u32) -> bool {
        quantity > 0 && self.quantity >= quantity
    }

    fn reserve(&mut self, quantity: u32) -> DomainResult<Reservation> {
        ensure_positive(quantity)?;
        if self.quantity < quantity {
            return Err(DomainError::InsufficientQuantity {
                requested: quantity,
                available: self.quantity,
            });
        }
        self.quantity -= quantity;
        Ok(Reservation {
            item_id: self.id,
            kind: ItemKind::Counted,
            quantity,
        })
    }

    fn release(&mut self, quantity: u32) -> DomainResult<()> {
        ensure_positive(quantity)?;
        let attempted = self.quantity.saturating_add(quantity);
        if attempted > self.catalog_total {
            return Err(DomainError::OverRelease {
                attempted,
                max: self.catalog_total,
            });
        }
        self.quantity = attempted;
        Ok(())
    }

    fn consume(&mut self, quantity: u32) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if self.out_on_loan() < quantity {
            return Err(DomainError::invariant(format!(
                "cannot consume {quantity}: only {} out on loan",
                self.out_on_loan()
            )));
        }
        self.catalog_total -= quantity;
        Ok(())
    }
}

impl Reservable for UnitItem {
    fn can_reserve(&self, quantity: u32) -> bool {
        quantity == 1 && self.is_available
    }

    fn reserve(&mut self, quantity: u32) -> DomainResult<Reservation> {
        if quantity != 1 {
            return Err(DomainError::validation("a unit is lent one at a time"));
        }
        if !self.is_available {
            return Err(DomainError::UnitUnavailable);
        }
        self.is_available = false;
        Ok(Reservation {
            item_id: self.id,
            kind: ItemKind::Unit,
            quantity: 1,
        })
    }

    fn release(&mut self, quantity: u32) -> DomainResult<()> {
        if quantity != 1 {
            return Err(DomainError::validation("a unit is lent one at a time"));
        }
        if self.is_available {
            return Err(DomainError::invariant(format!(
                "unit {} released while already available",
                self.unit_number
            )));
        }
        self.is_available = true;
        Ok(())
    }

    fn consume(&mut self, _quantity: u32) -> DomainResult<()> {
        Err(DomainError::invariant("unit items are never consumed"))
    }
}

impl Reservable for InventoryItem {
    fn can_reserve(&self, quantity: u32) -> bool {
        match self {
            InventoryItem::Counted(c) => c.can_reserve(quantity),
            InventoryItem::Unit(u) => u.can_reserve(quantity),
        }
    }

    fn reserve(&mut self, quantity: u32) -> DomainResult<Reservation> {
        match self {
            InventoryItem::Counted(c) => c.reserve(quantity),
            InventoryItem::Unit(u) => u.reserve(quantity),
        }
    }

    fn release(&mut self, quantity: u32) -> DomainResult<()> {
        match self {
            InventoryItem::Counted(c) => c.release(quantity),
            InventoryItem::Unit(u) => u.release(quantity),
        }
    }

    fn consume(&mut self, quantity: u32) -> DomainResult<()> {
        match self {
            InventoryItem::Counted(c) => c.consume(quantity),
            InventoryItem::Unit(u) => u.consume(quantity),
        }
    }
}
