use tracing::debug;

use crate::errors::CollectionError;
use crate::tile::PhotoTile;

/// What changed in a [`PhotoCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionChange {
    Appended { index: usize },
    Removed { index: usize },
    Cleared,
    CapacityChanged { capacity: usize },
}

/// Observer invoked synchronously after every successful mutation, with the
/// change and the resulting number of tiles.
pub type ChangeObserver = Box<dyn Fn(CollectionChange, usize) + Send + Sync>;

/// Ordered, capacity-bounded list of photo tiles. Insertion order is strip order.
///
/// Capacity is checked only when appending. Lowering it below the current
/// length leaves the collection over capacity; appends keep failing until
/// enough tiles are removed or the collection is cleared.
pub struct PhotoCollection {
    tiles: Vec<PhotoTile>,
    capacity: usize,
    observer: Option<ChangeObserver>,
}

impl PhotoCollection {
    pub fn new(capacity: usize) -> Self {
        PhotoCollection {
            tiles: Vec::with_capacity(capacity),
            capacity,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: ChangeObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn append(&mut self, tile: PhotoTile) -> Result<usize, CollectionError> {
        if self.is_full() {
            return Err(CollectionError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.tiles.push(tile);
        let index = self.tiles.len() - 1;
        self.notify(CollectionChange::Appended { index });
        Ok(index)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<PhotoTile, CollectionError> {
        if index >= self.tiles.len() {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.tiles.len(),
            });
        }
        let tile = self.tiles.remove(index);
        self.notify(CollectionChange::Removed { index });
        Ok(tile)
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
        self.notify(CollectionChange::Cleared);
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.notify(CollectionChange::CapacityChanged { capacity });
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tiles.len() >= self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&PhotoTile> {
        self.tiles.get(index)
    }

    pub fn tiles(&self) -> &[PhotoTile] {
        &self.tiles
    }

    fn notify(&self, change: CollectionChange) {
        debug!("Photo collection changed: {:?} ({} tiles)", change, self.tiles.len());
        if let Some(observer) = &self.observer {
            observer(change, self.tiles.len());
        }
    }
}

impl std::fmt::Debug for PhotoCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoCollection")
            .field("len", &self.tiles.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
