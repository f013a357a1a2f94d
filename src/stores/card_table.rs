use crate::core::error::RfidError;
use crate::models::card::CardRecord;
use tracing::{debug, info, warn};

/// Slot count of the reference device
pub const DEFAULT_CAPACITY: usize = 200;

/// Cards installed on first boot, after corruption, and on format
pub const DEFAULT_CARDS: [(u32, &str); 3] = [
    (0x12345678, "Admin Card"),
    (0x87654321, "User Card 1"),
    (0xABCDEF00, "User Card 2"),
];

/// Fixed-capacity table of authorization records
///
/// Slots are never added or removed after construction. Removal is a soft
/// delete, and an inactive slot is reused by the next `add` that reaches it
/// first. The table does no locking of its own; the manager serializes access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardTable {
    slots: Box<[CardRecord]>,
}

impl CardTable {
    /// Create a table of `capacity` unused slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![CardRecord::EMPTY; capacity].into_boxed_slice(),
        }
    }

    /// Rebuild a table from slots read back from an image
    pub fn from_slots(slots: Vec<CardRecord>) -> Self {
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Table holding only the built-in default cards
    pub fn with_defaults(capacity: usize) -> Self {
        let mut table = Self::new(capacity);
        table.format_defaults();
        table
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Every slot in order, unused and inactive ones included
    pub fn slots(&self) -> &[CardRecord] {
        &self.slots
    }

    /// Active record for `id`
    ///
    /// An inactive slot with a matching id is reported exactly like a missing one.
    pub fn get(&self, id: u32) -> Result<CardRecord, RfidError> {
        match self.slots.iter().position(|slot| slot.id == id) {
            Some(slot) if self.slots[slot].active => Ok(self.slots[slot]),
            Some(slot) => {
                debug!(card_id = %format_id(id), slot, "Card found but inactive");
                Err(RfidError::NotFound(id))
            }
            None => Err(RfidError::NotFound(id)),
        }
    }

    /// Insert a new card at the first reusable slot
    ///
    /// An id already present in any slot, active or not, is rejected. Returns
    /// the slot index used.
    pub fn add(&mut self, id: u32, name: &str, now: u32) -> Result<usize, RfidError> {
        if id == 0 {
            return Err(RfidError::InvalidArgument("card id 0 is reserved"));
        }
        if name.is_empty() {
            return Err(RfidError::InvalidArgument("card name must not be empty"));
        }

        if let Some(slot) = self.slots.iter().position(|slot| slot.id == id) {
            warn!(
                card_id = %format_id(id),
                slot,
                active = self.slots[slot].active,
                "Card already exists, add rejected"
            );
            return Err(RfidError::DuplicateIdentifier(id));
        }

        let Some(slot) = self.slots.iter().position(CardRecord::is_reusable) else {
            warn!(
                card_id = %format_id(id),
                capacity = self.capacity(),
                "Card table is full"
            );
            return Err(RfidError::CapacityExceeded {
                capacity: self.capacity(),
            });
        };

        self.slots[slot] = CardRecord::new(id, name, now);
        info!(card_id = %format_id(id), name, slot, "Card added");
        Ok(slot)
    }

    /// Mark the active card `id` inactive, keeping its name and timestamp
    pub fn remove(&mut self, id: u32) -> Result<usize, RfidError> {
        let slot = self.live_slot(id).ok_or(RfidError::NotFound(id))?;
        self.slots[slot].active = false;
        info!(card_id = %format_id(id), slot, "Card removed");
        Ok(slot)
    }

    /// Authorize `id`, stamping `last_seen` on success
    pub fn check(&mut self, id: u32, now: u32) -> bool {
        match self.live_slot(id) {
            Some(slot) => {
                self.slots[slot].last_seen = now;
                debug!(card_id = %format_id(id), slot, last_seen = now, "Card checked");
                true
            }
            None => false,
        }
    }

    /// Number of live cards, recomputed on every call
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_live()).count()
    }

    /// Live cards in slot order, at most `max` of them
    pub fn list(&self, max: usize) -> Vec<CardRecord> {
        self.live().take(max).copied().collect()
    }

    pub fn live(&self) -> impl Iterator<Item = &CardRecord> {
        self.slots.iter().filter(|slot| slot.is_live())
    }

    /// Wipe every slot and install `DEFAULT_CARDS`
    pub fn format_defaults(&mut self) {
        self.slots.fill(CardRecord::EMPTY);
        for (slot, (id, name)) in self.slots.iter_mut().zip(DEFAULT_CARDS) {
            *slot = CardRecord::new(id, name, 0);
        }
    }

    fn live_slot(&self, id: u32) -> Option<usize> {
        if id == 0 {
            return None;
        }
        self.slots.iter().position(|slot| slot.id == id && slot.active)
    }
}

/// Padded `0x`-prefixed upper-case hex, the form card ids are logged in
pub fn format_id(id: u32) -> String {
    format!("0x{:08X}", id)
}
