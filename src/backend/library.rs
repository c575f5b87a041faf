use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub cover_path: Option<String>,
    pub thumb_path: Option<String>,
}

impl Item {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Item {
            id,
            name: name.into(),
            cover_path: None,
            thumb_path: None,
        }
    }
}

/// Ordered items backing the list. Owned and mutated by the coordinating
/// thread only; workers send updated items back instead of writing here.
#[derive(Debug, Default, Clone)]
pub struct ItemStore {
    items: Vec<Item>,
}

impl ItemStore {
    /// Later duplicates of an id are dropped so each id appears once.
    pub fn new(items: Vec<Item>) -> Self {
        let mut seen = HashSet::new();
        let items = items.into_iter().filter(|i| seen.insert(i.id)).collect();
        ItemStore { items }
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub fn by_id(&self, id: i64) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn position(&self, id: i64) -> Option<usize> {
        self.items.iter().position(|i| i.id == id)
    }

    /// Overwrites the item with the same id in place. Returns false and
    /// leaves the store untouched when no such item exists.
    pub fn replace(&mut self, item: Item) -> bool {
        match self.position(item.id) {
            Some(index) => {
                self.items[index] = item;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }
}
