//! Assembles versioned snapshots from per-table deliveries.

use tracing::{debug, warn};

use lineage_core::{RowCollections, RowSource, RowTable, Snapshot, TableRows};

/// A change to one row collection, as pushed by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum TableUpdate {
    Rows(TableRows),
    /// The collection is being reloaded.
    Pending(RowTable),
    Error(RowTable, String),
}

impl TableUpdate {
    pub fn table(&self) -> RowTable {
        match self {
            Self::Rows(rows) => rows.table(),
            Self::Pending(table) | Self::Error(table, _) => *table,
        }
    }
}

/// Latest state of a project's five row collections.
///
/// Every applied update produces a snapshot with a strictly higher version, so
/// consumers can drop results computed from anything older.
#[derive(Debug, Clone)]
pub struct SnapshotFeed {
    project_id: String,
    version: u64,
    rows: RowCollections,
}

impl SnapshotFeed {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            version: 0,
            rows: RowCollections::pending(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Current snapshot, without bumping the version.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.project_id.clone(), self.version, self.rows.clone())
    }

    /// Apply an update and return the resulting snapshot.
    pub fn apply(&mut self, update: TableUpdate) -> Snapshot {
        let table = update.table();
        match update {
            TableUpdate::Rows(rows) => {
                debug!("{}: {} rows for {}", self.project_id, rows.len(), table);
                self.rows.set_rows(rows);
            }
            TableUpdate::Pending(_) => self.rows.set_state(table, None),
            TableUpdate::Error(_, message) => {
                warn!("{}: {} failed: {}", self.project_id, table, message);
                self.rows.set_state(table, Some(message));
            }
        }
        self.version += 1;
        self.snapshot()
    }

    /// Fetch every table from `source` and apply the results.
    pub async fn load(&mut self, source: &dyn RowSource) -> Snapshot {
        for table in RowTable::ALL {
            let update = fetch_update(source, &self.project_id, table).await;
            self.apply(update);
        }
        self.snapshot()
    }
}

async fn fetch_update(source: &dyn RowSource, project_id: &str, table: RowTable) -> TableUpdate {
    match source.fetch_table(project_id, table).await {
        Ok(rows) if rows.table() == table => TableUpdate::Rows(rows),
        Ok(rows) => TableUpdate::Error(
            table,
            format!("source returned {} rows for {}", rows.table(), table),
        ),
        Err(e) => TableUpdate::Error(table, e.to_string()),
    }
}

/// Load a complete snapshot in one go.
///
/// Table failures become error sentinels on that collection rather than
/// failing the whole load.
pub async fn load_snapshot(source: &dyn RowSource, project_id: &str, version: u64) -> Snapshot {
    let mut rows = RowCollections::pending();
    for table in RowTable::ALL {
        match fetch_update(source, project_id, table).await {
            TableUpdate::Rows(r) => rows.set_rows(r),
            TableUpdate::Error(_, message) => rows.set_state(table, Some(message)),
            TableUpdate::Pending(_) => rows.set_state(table, None),
        }
    }
    Snapshot::new(project_id, version, rows)
}
