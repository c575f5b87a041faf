use image::DynamicImage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

use super::binding::{BindingGuard, SlotId};
use super::selection::Selection;
use crate::backend::library::{Item, ItemStore};
use crate::backend::progress::ProgressFetcher;
use crate::backend::resolver::FallbackResolver;

/// Results sent by fetch workers to the coordinating loop.
#[derive(Debug)]
pub enum LoadEvent {
    Progress {
        slot: SlotId,
        item_id: i64,
        progress: Option<u32>,
    },
    Cover {
        slot: SlotId,
        item_id: i64,
        cover: Option<DynamicImage>,
    },
    /// A worker persisted new cover paths for this item.
    ItemUpdated(Item),
}

/// Spawns fetch tasks. At most `max_concurrent` run at once; the rest wait
/// for a permit. Tasks are never cancelled.
#[derive(Clone)]
pub struct Loader {
    resolver: Arc<FallbackResolver>,
    progress: ProgressFetcher,
    permits: Arc<Semaphore>,
    tx: mpsc::UnboundedSender<LoadEvent>,
}

impl Loader {
    pub fn new(
        resolver: Arc<FallbackResolver>,
        progress: ProgressFetcher,
        max_concurrent: usize,
        tx: mpsc::UnboundedSender<LoadEvent>,
    ) -> Self {
        Self {
            resolver,
            progress,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tx,
        }
    }

    pub fn spawn_progress(&self, slot: SlotId, item: Item) {
        let progress = self.progress.clone();
        let permits = self.permits.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let value = progress.fetch(&item).await;
            let _ = tx.send(LoadEvent::Progress {
                slot,
                item_id: item.id,
                progress: value,
            });
        });
    }

    pub fn spawn_cover(&self, slot: SlotId, item: Item) {
        let resolver = self.resolver.clone();
        let permits = self.permits.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let resolved = resolver.resolve(&item).await;
            if let Some(updated) = resolved.updated {
                let _ = tx.send(LoadEvent::ItemUpdated(updated));
            }
            let _ = tx.send(LoadEvent::Cover {
                slot,
                item_id: item.id,
                cover: resolved.cover,
            });
        });
    }
}

/// Visible state of one rendering slot.
#[derive(Debug, Clone, Default)]
pub struct Slot {
    pub index: usize,
    pub item_id: i64,
    pub title: String,
    pub cover: Option<DynamicImage>,
    /// Bumped whenever `cover` changes.
    pub cover_revision: u64,
    pub progress: u32,
    pub checked: bool,
    pub drag_handle_visible: bool,
}

/// Owns every slot and its binding, and is the only place fetch results
/// are written into a slot.
pub struct SlotBinder {
    slots: HashMap<SlotId, Slot>,
    guard: BindingGuard,
    loader: Loader,
}

impl SlotBinder {
    pub fn new(loader: Loader) -> Self {
        Self {
            slots: HashMap::new(),
            guard: BindingGuard::new(),
            loader,
        }
    }

    /// Points `slot_id` at the item at `index` and starts its fetches. An
    /// index past the end releases the slot instead.
    pub fn bind(
        &mut self,
        slot_id: SlotId,
        index: usize,
        store: &ItemStore,
        selection: &Selection,
    ) -> bool {
        let Some(item) = store.get(index).cloned() else {
            self.release(slot_id);
            return false;
        };

        self.guard.bind(slot_id, item.id);

        let slot = self.slots.entry(slot_id).or_default();
        slot.index = index;
        slot.item_id = item.id;
        slot.title = item.name.clone();
        slot.cover = None;
        slot.cover_revision += 1;
        slot.progress = 0;
        slot.checked = selection.is_checked(item.id);

        self.loader.spawn_progress(slot_id, item.clone());
        self.loader.spawn_cover(slot_id, item);

        slot.drag_handle_visible = selection.drag_handle_visible(store.count());
        true
    }

    /// Applies a worker result. Returns true if a slot's visible state
    /// changed; stale or empty results are dropped.
    pub fn apply(&mut self, event: LoadEvent, store: &mut ItemStore) -> bool {
        let Self { slots, guard, .. } = self;

        match event {
            LoadEvent::ItemUpdated(item) => {
                let id = item.id;
                if !store.replace(item) {
                    log::debug!("updated item {} is no longer listed", id);
                }
                false
            }
            LoadEvent::Progress {
                slot,
                item_id,
                progress,
            } => {
                let Some(progress) = progress else {
                    return false;
                };
                let applied = guard.apply_if_current(slot, item_id, || {
                    if let Some(s) = slots.get_mut(&slot) {
                        s.progress = progress;
                    }
                });
                if applied.is_none() {
                    log::debug!("dropped stale progress for item {} in slot {}", item_id, slot);
                }
                applied.is_some()
            }
            LoadEvent::Cover {
                slot,
                item_id,
                cover,
            } => {
                let Some(cover) = cover else {
                    return false;
                };
                let applied = guard.apply_if_current(slot, item_id, || {
                    if let Some(s) = slots.get_mut(&slot) {
                        s.cover = Some(cover);
                        s.cover_revision += 1;
                    }
                });
                if applied.is_none() {
                    log::debug!("dropped stale cover for item {} in slot {}", item_id, slot);
                }
                applied.is_some()
            }
        }
    }

    /// Re-applies checked and drag-handle decorations. Bindings and
    /// in-flight fetches are left alone.
    pub fn refresh(&mut self, store: &ItemStore, selection: &Selection) {
        let drag_handle_visible = selection.drag_handle_visible(store.count());
        for slot in self.slots.values_mut() {
            slot.checked = selection.is_checked(slot.item_id);
            slot.drag_handle_visible = drag_handle_visible;
        }
    }

    pub fn release(&mut self, slot_id: SlotId) {
        self.guard.unbind(slot_id);
        self.slots.remove(&slot_id);
    }

    pub fn slot(&self, slot_id: SlotId) -> Option<&Slot> {
        self.slots.get(&slot_id)
    }

    pub fn slot_ids(&self) -> Vec<SlotId> {
        let mut ids: Vec<SlotId> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[cfg(test)]
    pub fn guard(&self) -> &BindingGuard {
        &self.guard
    }
}
