use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::domain::cart::CartLine;
use crate::domain::errors::DomainError;
use crate::domain::ports::GuestCartStore;

/// Key under which a device session keeps its cart.
pub const GUEST_CART_KEY: &str = "storefront_cart";

fn io_error(e: io::Error) -> DomainError {
    DomainError::Transport(format!("guest cart slot: {e}"))
}

/// Parses a stored slot, refusing anything that is not a clean line list.
pub fn decode_lines(raw: &str) -> Result<Vec<CartLine>, DomainError> {
    let lines: Vec<CartLine> = serde_json::from_str(raw)
        .map_err(|e| DomainError::MalformedRecord(format!("guest cart: {e}")))?;
    let mut seen = HashSet::new();
    for line in &lines {
        if line.quantity < 1 {
            return Err(DomainError::MalformedRecord(format!(
                "guest cart: quantity {} for product {}",
                line.quantity, line.product_id
            )));
        }
        if !seen.insert(line.product_id) {
            return Err(DomainError::MalformedRecord(format!(
                "guest cart: product {} listed twice",
                line.product_id
            )));
        }
    }
    Ok(lines)
}

/// One JSON file per device session under `root`.
#[derive(Debug, Clone)]
pub struct FileGuestCartStore {
    root: PathBuf,
}

impl FileGuestCartStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, session: Uuid) -> PathBuf {
        self.root
            .join(session.to_string())
            .join(format!("{GUEST_CART_KEY}.json"))
    }
}

impl GuestCartStore for FileGuestCartStore {
    fn load(&self, session: Uuid) -> Result<Vec<CartLine>, DomainError> {
        match fs::read_to_string(self.slot_path(session)) {
            Ok(raw) => decode_lines(&raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_error(e)),
        }
    }

    fn save(&self, session: Uuid, lines: &[CartLine]) -> Result<(), DomainError> {
        let path = self.slot_path(session);
        let dir = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(dir).map_err(io_error)?;
        let raw = serde_json::to_vec(lines)
            .map_err(|e| DomainError::MalformedRecord(format!("guest cart: {e}")))?;
        // Write-then-rename so a crash never leaves half a slot behind.
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_error)?;
        tmp.write_all(&raw).map_err(io_error)?;
        tmp.persist(&path).map_err(|e| io_error(e.error))?;
        Ok(())
    }

    fn clear(&self, session: Uuid) -> Result<(), DomainError> {
        match fs::remove_file(self.slot_path(session)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryGuestCartStore {
    slots: Mutex<HashMap<Uuid, String>>,
}

impl MemoryGuestCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, String>>, DomainError> {
        self.slots
            .lock()
            .map_err(|_| DomainError::Transport("guest cart lock poisoned".to_string()))
    }
}

impl GuestCartStore for MemoryGuestCartStore {
    fn load(&self, session: Uuid) -> Result<Vec<CartLine>, DomainError> {
        match self.slots()?.get(&session) {
            Some(raw) => decode_lines(raw),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, session: Uuid, lines: &[CartLine]) -> Result<(), DomainError> {
        let raw = serde_json::to_string(lines)
            .map_err(|e| DomainError::MalformedRecord(format!("guest cart: {e}")))?;
        self.slots()?.insert(session, raw);
        Ok(())
    }

    fn clear(&self, session: Uuid) -> Result<(), DomainError> {
        self.slots()?.remove(&session);
        Ok(())
    }
}
