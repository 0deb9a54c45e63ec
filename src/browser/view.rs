//! Record store view: the tabular presentation bound to the adapter.

use tracing::debug;

use crate::config::StoreConfig;
use crate::store::{quote_ident, Database, Row, StoreError};

/// Holds the currently displayed row set and selection.
///
/// `refresh` fully replaces the displayed set on success and leaves it
/// untouched on failure, so the user keeps seeing the last good data when a
/// query breaks. The displayed count is always `rows().len()`.
pub struct RecordView {
    table: String,
    columns: Vec<String>,
    rows: Vec<Row>,
    selected: Option<usize>,
}

impl RecordView {
    #[must_use]
    pub fn new(store: &StoreConfig) -> Self {
        Self {
            table: store.table.clone(),
            columns: store.columns.iter().map(|c| c.name.clone()).collect(),
            rows: Vec::new(),
            selected: None,
        }
    }

    fn select_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|name| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {} FROM {}", columns, quote_ident(&self.table))
    }

    /// Re-query the full row set and replace the displayed rows.
    ///
    /// Not transactional with respect to the display: on failure the
    /// previous rows stay visible and the error is returned to the caller
    /// to surface as a non-fatal notification.
    pub fn refresh(&mut self, db: &Database) -> Result<usize, StoreError> {
        let rows = db.query(&self.select_sql(), &[])?;
        self.rows = rows;

        // Clamp the selection to the new row set
        self.selected = match self.selected {
            _ if self.rows.is_empty() => None,
            Some(index) => Some(index.min(self.rows.len() - 1)),
            None => Some(0),
        };

        debug!("View refreshed: {} records", self.rows.len());
        Ok(self.rows.len())
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Displayed record count
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn select_next(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        self.selected = Some(match self.selected {
            Some(index) => (index + 1).min(self.rows.len() - 1),
            None => 0,
        });
    }

    pub fn select_previous(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        self.selected = Some(match self.selected {
            Some(index) => index.saturating_sub(1),
            None => 0,
        });
    }
}
