use std::collections::HashSet;
use std::path::{Path, PathBuf};

use feedwarden_core_types::ItemId;
use tracing::debug;

use crate::errors::StoreError;
use crate::file::{read_json, write_json};

/// Persisted set of item identifiers that already received an idempotent
/// action. Entries are only ever added.
pub trait MarkerStore: Send {
    fn contains(&self, id: &ItemId) -> bool;
    /// Returns `false` when the identifier was already present.
    fn add(&mut self, id: &ItemId) -> Result<bool, StoreError>;
    fn ids(&self) -> Vec<ItemId>;

    fn len(&self) -> usize {
        self.ids().len()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMarkerSet {
    order: Vec<ItemId>,
    index: HashSet<ItemId>,
}

impl InMemoryMarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, id: &ItemId) -> bool {
        if self.index.insert(id.clone()) {
            self.order.push(id.clone());
            true
        } else {
            false
        }
    }
}

impl MarkerStore for InMemoryMarkerSet {
    fn contains(&self, id: &ItemId) -> bool {
        self.index.contains(id)
    }

    fn add(&mut self, id: &ItemId) -> Result<bool, StoreError> {
        Ok(self.insert(id))
    }

    fn ids(&self) -> Vec<ItemId> {
        self.order.clone()
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Marker set stored as a JSON array of identifiers, in insertion order.
#[derive(Debug)]
pub struct FileMarkerSet {
    path: PathBuf,
    inner: InMemoryMarkerSet,
}

impl FileMarkerSet {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut inner = InMemoryMarkerSet::new();
        if let Some(ids) = read_json::<Vec<ItemId>>(&path)? {
            for id in &ids {
                inner.insert(id);
            }
        }
        debug!(target: "feedwarden::markers", path = %path.display(), count = inner.len(), "marker set opened");
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MarkerStore for FileMarkerSet {
    fn contains(&self, id: &ItemId) -> bool {
        self.inner.contains(id)
    }

    fn add(&mut self, id: &ItemId) -> Result<bool, StoreError> {
        if !self.inner.insert(id) {
            return Ok(false);
        }
        write_json(&self.path, &self.inner.order)?;
        Ok(true)
    }

    fn ids(&self) -> Vec<ItemId> {
        self.inner.ids()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// The two marker sets the policy engine gates on.
pub struct MarkerSets {
    pub not_interested: Box<dyn MarkerStore>,
    pub warning: Box<dyn MarkerStore>,
}

impl MarkerSets {
    pub const NOT_INTERESTED_FILE: &'static str = "not_interested.json";
    pub const WARNING_FILE: &'static str = "warnings.json";

    pub fn in_memory() -> Self {
        Self {
            not_interested: Box::new(InMemoryMarkerSet::new()),
            warning: Box::new(InMemoryMarkerSet::new()),
        }
    }

    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            not_interested: Box::new(FileMarkerSet::open(dir.join(Self::NOT_INTERESTED_FILE))?),
            warning: Box::new(FileMarkerSet::open(dir.join(Self::WARNING_FILE))?),
        })
    }
}

impl std::fmt::Debug for MarkerSets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerSets")
            .field("not_interested", &self.not_interested.len())
            .field("warning", &self.warning.len())
            .finish()
    }
}
