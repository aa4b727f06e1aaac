//! Row-store abstraction over the survey workbook.
//!
//! The core never talks to a spreadsheet API directly: it sees a table of
//! string rows keyed by table name. Tests run against [MemStore]; the CLI
//! runs against [XlsxStore], which reads worksheets through calamine and
//! buffers appends in memory for the duration of the run.

use std::collections::HashMap;

use calamine::{open_workbook, Reader, Xlsx};
use log::debug;
use snafu::ResultExt;

use crate::survey::{OpeningWorkbookSnafu, PlanResult};

pub trait Store {
    /// Returns all rows of the named table, or `None` if the table does not
    /// exist. The first row is the header.
    fn read_table(&mut self, name: &str) -> PlanResult<Option<Vec<Vec<String>>>>;

    /// Creates the named table if it does not exist yet.
    fn ensure_table(&mut self, name: &str) -> PlanResult<()>;

    fn append_rows(&mut self, name: &str, rows: &[Vec<String>]) -> PlanResult<()>;
}

/// In-memory store, used by the tests and as the append buffer of [XlsxStore].
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    tables: HashMap<String, Vec<Vec<String>>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }

    pub fn tables(&self) -> &HashMap<String, Vec<Vec<String>>> {
        &self.tables
    }
}

impl Store for MemStore {
    fn read_table(&mut self, name: &str) -> PlanResult<Option<Vec<Vec<String>>>> {
        Ok(self.tables.get(name).cloned())
    }

    fn ensure_table(&mut self, name: &str) -> PlanResult<()> {
        self.tables.entry(name.to_string()).or_default();
        Ok(())
    }

    fn append_rows(&mut self, name: &str, rows: &[Vec<String>]) -> PlanResult<()> {
        let table = self.tables.entry(name.to_string()).or_default();
        table.extend(rows.iter().cloned());
        Ok(())
    }
}

/// Store backed by an Excel workbook, one worksheet per table.
///
/// calamine is a reader: rows appended during a run live in an overlay and
/// are visible to subsequent reads, but persisting them is the caller's
/// concern (the CLI exports generated tables as JSON).
pub struct XlsxStore {
    workbook: Xlsx<std::io::BufReader<std::fs::File>>,
    overlay: MemStore,
}

impl XlsxStore {
    pub fn open(path: &str) -> PlanResult<XlsxStore> {
        let workbook: Xlsx<_> = open_workbook(path).context(OpeningWorkbookSnafu {
            path: path.to_string(),
        })?;
        Ok(XlsxStore {
            workbook,
            overlay: MemStore::new(),
        })
    }

    /// Tables created or appended to during this run.
    pub fn pending(&self) -> &HashMap<String, Vec<Vec<String>>> {
        self.overlay.tables()
    }

    fn read_sheet(&mut self, name: &str) -> PlanResult<Option<Vec<Vec<String>>>> {
        let range = match self.workbook.worksheet_range(name) {
            None => return Ok(None),
            Some(r) => r.context(OpeningWorkbookSnafu {
                path: name.to_string(),
            })?,
        };
        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in range.rows() {
            rows.push(row.iter().map(cell_to_string).collect());
        }
        debug!("read_sheet: {} rows in sheet {}", rows.len(), name);
        Ok(Some(rows))
    }
}

impl Store for XlsxStore {
    fn read_table(&mut self, name: &str) -> PlanResult<Option<Vec<Vec<String>>>> {
        let base = self.read_sheet(name)?;
        let overlay = self.overlay.read_table(name)?;
        match (base, overlay) {
            (None, None) => Ok(None),
            (Some(rows), None) => Ok(Some(rows)),
            (None, Some(rows)) => Ok(Some(rows)),
            (Some(mut rows), Some(appended)) => {
                rows.extend(appended);
                Ok(Some(rows))
            }
        }
    }

    fn ensure_table(&mut self, name: &str) -> PlanResult<()> {
        if self.read_sheet(name)?.is_none() {
            self.overlay.ensure_table(name)?;
        }
        Ok(())
    }

    fn append_rows(&mut self, name: &str, rows: &[Vec<String>]) -> PlanResult<()> {
        self.overlay.append_rows(name, rows)
    }
}

fn cell_to_string(cell: &calamine::DataType) -> String {
    match cell {
        calamine::DataType::String(s) => s.clone(),
        calamine::DataType::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        calamine::DataType::Int(i) => format!("{}", i),
        calamine::DataType::Bool(b) => {
            if *b {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }
        _ => "".to_string(),
    }
}
