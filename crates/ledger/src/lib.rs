use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use common::{Error, Position, Result};

/// Open positions for one trading pair, persisted as a pretty-printed JSON
/// array.
///
/// Every operation reads the whole file, applies its change and writes the
/// whole file back through a temp file plus rename. There is no locking: one
/// writer per file. All I/O is blocking; async callers should run it on the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(path = %path.display(), "Ledger opened");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a filled buy. `timestamp` defaults to now.
    pub fn add_order(
        &self,
        id: impl Into<String>,
        price: f64,
        volume: f64,
        cost: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Position> {
        let position = Position {
            id: id.into(),
            price,
            volume,
            cost,
            time_stamp: timestamp.unwrap_or_else(Utc::now),
        };
        validate(&position)?;

        let mut positions = self.load();
        positions.push(position.clone());
        self.store(&positions)?;

        info!(id = %position.id, price, volume, cost, "Position added to ledger");
        Ok(position)
    }

    /// Positions matching `predicate`, in insertion order.
    pub fn get_orders<F>(&self, predicate: F) -> Vec<Position>
    where
        F: Fn(&Position) -> bool,
    {
        self.load().into_iter().filter(|p| predicate(p)).collect()
    }

    pub fn all(&self) -> Vec<Position> {
        self.load()
    }

    /// Remove positions by id. Ids not present are ignored, so removing the
    /// same id twice is harmless. Returns how many were removed.
    pub fn remove_orders<I, S>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<S> = ids.into_iter().collect();
        let mut positions = self.load();
        let before = positions.len();
        positions.retain(|p| !ids.iter().any(|id| id.as_ref() == p.id));
        let removed = before - positions.len();

        if removed > 0 {
            self.store(&positions)?;
            info!(removed, remaining = positions.len(), "Positions removed from ledger");
        } else {
            debug!("remove_orders matched nothing");
        }
        Ok(removed)
    }

    /// Where a corrupt ledger is preserved before it can be overwritten.
    pub fn backup_path(&self) -> PathBuf {
        let mut bak = self.path.clone().into_os_string();
        bak.push(".bak");
        PathBuf::from(bak)
    }

    /// Read the ledger. A missing file is an empty ledger; an unreadable or
    /// corrupt one is treated as empty too, so trading is never blocked on it.
    /// A corrupt file is copied to [`Ledger::backup_path`] first, so the next
    /// write cannot destroy it.
    fn load(&self) -> Vec<Position> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ledger unreadable, treating as empty");
                return Vec::new();
            }
        };
        if raw.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str(&raw) {
            Ok(positions) => positions,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ledger corrupt, treating as empty");
                self.back_up_corrupt(&raw);
                Vec::new()
            }
        }
    }

    fn back_up_corrupt(&self, raw: &str) {
        let bak = self.backup_path();
        // Keep the first copy until an operator deals with it.
        if bak.exists() {
            return;
        }
        match std::fs::write(&bak, raw) {
            Ok(()) => warn!(backup = %bak.display(), "Corrupt ledger backed up"),
            Err(e) => error!(backup = %bak.display(), error = %e, "Could not back up corrupt ledger"),
        }
    }

    fn store(&self, positions: &[Position]) -> Result<()> {
        self.write_atomic(positions).map_err(|e| {
            error!(
                path = %self.path.display(),
                error = %e,
                positions = positions.len(),
                "LEDGER WRITE FAILED, mutation lost"
            );
            Error::PersistedState(format!("writing {}: {e}", self.path.display()))
        })
    }

    fn write_atomic(&self, positions: &[Position]) -> Result<()> {
        let json = serde_json::to_string_pretty(positions)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn validate(position: &Position) -> Result<()> {
    if !(position.price > 0.0) {
        return Err(Error::InvalidOrder(format!(
            "position price must be positive, got {}",
            position.price
        )));
    }
    if !(position.volume > 0.0) {
        return Err(Error::InvalidOrder(format!(
            "position volume must be positive, got {}",
            position.volume
        )));
    }
    if position.id.is_empty() {
        return Err(Error::InvalidOrder("position id must not be empty".into()));
    }
    Ok(())
}
