use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies a rendering slot. Workers carry this instead of a reference
/// to the slot itself.
pub type SlotId = usize;

/// Records which item each slot currently shows. Results computed for any
/// other item are stale and must not reach the slot.
#[derive(Debug, Clone, Default)]
pub struct BindingGuard {
    bindings: Arc<Mutex<HashMap<SlotId, i64>>>,
}

impl BindingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SlotId, i64>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last bind wins: any earlier identity for `slot` is forgotten.
    pub fn bind(&self, slot: SlotId, item_id: i64) {
        self.lock().insert(slot, item_id);
    }

    pub fn unbind(&self, slot: SlotId) {
        self.lock().remove(&slot);
    }

    #[cfg(test)]
    pub fn bound_item(&self, slot: SlotId) -> Option<i64> {
        self.lock().get(&slot).copied()
    }

    #[cfg(test)]
    pub fn is_current(&self, slot: SlotId, item_id: i64) -> bool {
        bound_to(&self.lock(), slot, item_id)
    }

    /// Runs `apply` only if `slot` is still bound to `item_id`. The binding
    /// cannot change while `apply` runs.
    pub fn apply_if_current<R>(
        &self,
        slot: SlotId,
        item_id: i64,
        apply: impl FnOnce() -> R,
    ) -> Option<R> {
        let bindings = self.lock();
        if !bound_to(&bindings, slot, item_id) {
            return None;
        }
        Some(apply())
    }
}

fn bound_to(bindings: &HashMap<SlotId, i64>, slot: SlotId, item_id: i64) -> bool {
    bindings.get(&slot) == Some(&item_id)
}
