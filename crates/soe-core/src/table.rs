//! Lightweight record tables loaded from CSV.
//!
//! A [`Table`] is the in-memory shape every tabular dataset takes between
//! loading and rendering: named columns, rows of loosely-typed cells.
//! The operations mirror what the reporting pipelines actually do —
//! filter by column values, list unique values, sort, group-count, melt —
//! nothing more.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// One value in a table. Numbers are inferred at load time; empty CSV
/// cells become `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl Cell {
    /// Parse a raw CSV field into a cell.
    pub fn parse(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Null;
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            return Cell::Num(n);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Cell::Bool(true),
            "false" => Cell::Bool(false),
            _ => Cell::Str(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Cell::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Str(s) => write!(f, "{s}"),
            // Integral values print without a trailing ".0" so year and
            // count columns read like the source data.
            Cell::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Cell::Num(n) => write!(f, "{n}"),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Null => Ok(()),
        }
    }
}

/// A view over one row, resolving cells by column name.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a Table,
    idx: usize,
}

impl<'a> RowRef<'a> {
    pub fn cell(&self, column: &str) -> Option<&'a Cell> {
        let col = self.table.columns.iter().position(|c| c == column)?;
        Some(&self.table.rows[self.idx][col])
    }

    pub fn str_value(&self, column: &str) -> Option<&'a str> {
        self.cell(column).and_then(Cell::as_str)
    }

    pub fn num(&self, column: &str) -> Option<f64> {
        self.cell(column).and_then(Cell::as_num)
    }

    /// Display rendering of the cell; `None` when the cell is Null.
    pub fn display(&self, column: &str) -> Option<String> {
        let cell = self.cell(column)?;
        if cell.is_null() {
            None
        } else {
            Some(cell.to_string())
        }
    }
}

/// Named columns + rows of cells.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Table {
        Table { columns, rows: Vec::new() }
    }

    /// Load a table from a CSV file with a header row.
    pub fn from_csv_path(path: &Path) -> Result<Table> {
        let file = std::fs::File::open(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(file).map_err(|e| match e {
            Error::Csv { source, .. } => Error::Csv { path: path.to_path_buf(), source },
            other => other,
        })
    }

    /// Load a table from any CSV reader with a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Table> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let wrap = |source: csv::Error| Error::Csv { path: "<reader>".into(), source };

        let columns: Vec<String> =
            csv_reader.headers().map_err(wrap)?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(wrap)?;
            let mut row: Vec<Cell> = record.iter().map(Cell::parse).collect();
            // Ragged rows are padded with nulls rather than rejected.
            row.resize(columns.len(), Cell::Null);
            rows.push(row);
        }
        Ok(Table { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::RowWidth { expected: self.columns.len(), got: row.len() });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn row(&self, idx: usize) -> RowRef<'_> {
        RowRef { table: self, idx }
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        (0..self.rows.len()).map(move |idx| RowRef { table: self, idx })
    }

    /// Keep only rows satisfying the predicate.
    pub fn filter(&self, pred: impl Fn(RowRef<'_>) -> bool) -> Table {
        let rows = (0..self.rows.len())
            .filter(|&idx| pred(RowRef { table: self, idx }))
            .map(|idx| self.rows[idx].clone())
            .collect();
        Table { columns: self.columns.clone(), rows }
    }

    /// Keep rows whose string cell in `column` is one of `values`.
    pub fn filter_isin(&self, column: &str, values: &[&str]) -> Result<Table> {
        let col = self.column_index(column)?;
        Ok(self.filter_by_col(col, |cell| {
            cell.as_str().is_some_and(|s| values.contains(&s))
        }))
    }

    /// Keep rows whose string cell in `column` is NOT one of `values`.
    pub fn filter_not_isin(&self, column: &str, values: &[&str]) -> Result<Table> {
        let col = self.column_index(column)?;
        Ok(self.filter_by_col(col, |cell| {
            !cell.as_str().is_some_and(|s| values.contains(&s))
        }))
    }

    /// Keep rows whose numeric cell in `column` equals `value`.
    pub fn filter_num_eq(&self, column: &str, value: f64) -> Result<Table> {
        let col = self.column_index(column)?;
        Ok(self.filter_by_col(col, |cell| cell.as_num() == Some(value)))
    }

    /// Keep rows whose numeric cell in `column` is one of `values`.
    pub fn filter_num_isin(&self, column: &str, values: &[f64]) -> Result<Table> {
        let col = self.column_index(column)?;
        Ok(self.filter_by_col(col, |cell| {
            cell.as_num().is_some_and(|n| values.contains(&n))
        }))
    }

    fn filter_by_col(&self, col: usize, keep: impl Fn(&Cell) -> bool) -> Table {
        let rows = self.rows.iter().filter(|row| keep(&row[col])).cloned().collect();
        Table { columns: self.columns.clone(), rows }
    }

    /// Ordered, de-duplicated display values of a column (nulls skipped).
    pub fn unique(&self, column: &str) -> Result<Vec<String>> {
        let col = self.column_index(column)?;
        let mut seen = Vec::new();
        for row in &self.rows {
            let cell = &row[col];
            if cell.is_null() {
                continue;
            }
            let value = cell.to_string();
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
        Ok(seen)
    }

    /// Stable ascending sort by the display value of `column`.
    pub fn sort_by_str(&self, column: &str) -> Result<Table> {
        let col = self.column_index(column)?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| a[col].to_string().cmp(&b[col].to_string()));
        Ok(Table { columns: self.columns.clone(), rows })
    }

    /// Stable descending sort over several numeric key columns — the
    /// "worst site first" ordering of the swimmability bars.
    pub fn sort_num_desc(&self, columns: &[&str]) -> Result<Table> {
        let cols: Vec<usize> =
            columns.iter().map(|c| self.column_index(c)).collect::<Result<_>>()?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            for &col in &cols {
                let x = a[col].as_num().unwrap_or(f64::NEG_INFINITY);
                let y = b[col].as_num().unwrap_or(f64::NEG_INFINITY);
                match y.partial_cmp(&x) {
                    Some(std::cmp::Ordering::Equal) | None => continue,
                    Some(order) => return order,
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(Table { columns: self.columns.clone(), rows })
    }

    /// Append a column of cells; must match the current row count.
    pub fn add_column(&mut self, name: &str, cells: Vec<Cell>) -> Result<()> {
        if cells.len() != self.rows.len() {
            return Err(Error::RowWidth { expected: self.rows.len(), got: cells.len() });
        }
        self.columns.push(name.to_string());
        for (row, cell) in self.rows.iter_mut().zip(cells) {
            row.push(cell);
        }
        Ok(())
    }

    /// Add `new_column` by passing the display value of `source` through a
    /// lookup. Values absent from the lookup become Null, the way an
    /// incomplete `.map()` leaves gaps.
    pub fn map_column(
        &mut self,
        source: &str,
        new_column: &str,
        lookup: &HashMap<String, String>,
    ) -> Result<()> {
        let col = self.column_index(source)?;
        let cells: Vec<Cell> = self
            .rows
            .iter()
            .map(|row| match lookup.get(&row[col].to_string()) {
                Some(mapped) => Cell::Str(mapped.clone()),
                None => Cell::Null,
            })
            .collect();
        self.add_column(new_column, cells)
    }

    /// Count rows per display value of `column`, ordered by first
    /// appearance.
    pub fn group_count(&self, column: &str) -> Result<Vec<(String, usize)>> {
        let col = self.column_index(column)?;
        let mut counts: Vec<(String, usize)> = Vec::new();
        for row in &self.rows {
            let cell = &row[col];
            if cell.is_null() {
                continue;
            }
            let value = cell.to_string();
            match counts.iter_mut().find(|(v, _)| *v == value) {
                Some((_, n)) => *n += 1,
                None => counts.push((value, 1)),
            }
        }
        Ok(counts)
    }

    /// Wide → long reshape: one output row per (id row, value column),
    /// with columns `[id, variable, value]`.
    pub fn melt(&self, id_column: &str, value_columns: &[&str]) -> Result<Table> {
        let id_col = self.column_index(id_column)?;
        let value_cols: Vec<usize> =
            value_columns.iter().map(|c| self.column_index(c)).collect::<Result<_>>()?;

        let columns =
            vec![id_column.to_string(), "variable".to_string(), "value".to_string()];
        let mut out = Table::new(columns);
        for row in &self.rows {
            for (&col, &name) in value_cols.iter().zip(value_columns) {
                out.rows.push(vec![
                    row[id_col].clone(),
                    Cell::Str(name.to_string()),
                    row[col].clone(),
                ]);
            }
        }
        Ok(out)
    }

    /// Maximum numeric value in a column, ignoring non-numeric cells.
    pub fn num_max(&self, column: &str) -> Result<Option<f64>> {
        let col = self.column_index(column)?;
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row[col].as_num())
            .fold(None, |acc, n| Some(acc.map_or(n, |m: f64| m.max(n)))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let csv = "\
site,year,value,grade
Foxton,2019,4.5,Green
Foxton,2020,6.1,Amber
Taihape,2019,11.0,Red
Taihape,2020,,Red
";
        Table::from_csv_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn csv_load_infers_cell_types() {
        let t = sample();
        assert_eq!(t.len(), 4);
        assert_eq!(t.row(0).str_value("site"), Some("Foxton"));
        assert_eq!(t.row(0).num("value"), Some(4.5));
        assert!(t.row(3).cell("value").unwrap().is_null());
    }

    #[test]
    fn missing_column_is_a_named_error() {
        let t = sample();
        match t.unique("sid") {
            Err(Error::MissingColumn(name)) => assert_eq!(name, "sid"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn filter_isin_and_not_isin_partition_rows() {
        let t = sample();
        let kept = t.filter_isin("site", &["Taihape"]).unwrap();
        let dropped = t.filter_not_isin("site", &["Taihape"]).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped.len(), 2);
        assert_eq!(kept.len() + dropped.len(), t.len());
    }

    #[test]
    fn empty_filter_result_is_empty_not_an_error() {
        let t = sample();
        let none = t.filter_isin("site", &["Nowhere"]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn unique_preserves_first_appearance_order() {
        let t = sample();
        assert_eq!(t.unique("site").unwrap(), vec!["Foxton", "Taihape"]);
        // Numeric cells render without a trailing ".0".
        assert_eq!(t.unique("year").unwrap(), vec!["2019", "2020"]);
    }

    #[test]
    fn map_column_leaves_unmapped_rows_null() {
        let mut t = sample();
        let lookup =
            HashMap::from([("Foxton".to_string(), "Foxton Beach".to_string())]);
        t.map_column("site", "site name", &lookup).unwrap();
        assert_eq!(t.row(0).str_value("site name"), Some("Foxton Beach"));
        assert!(t.row(2).cell("site name").unwrap().is_null());
    }

    #[test]
    fn group_count_matches_input_multiplicity() {
        let t = sample();
        let counts = t.group_count("grade").unwrap();
        assert_eq!(
            counts,
            vec![("Green".to_string(), 1), ("Amber".to_string(), 1), ("Red".to_string(), 2)]
        );
    }

    #[test]
    fn melt_produces_one_row_per_id_and_variable() {
        let t = sample();
        let long = t.melt("site", &["year", "value"]).unwrap();
        assert_eq!(long.len(), 8);
        assert_eq!(long.columns(), ["site", "variable", "value"]);
        assert_eq!(long.row(0).str_value("variable"), Some("year"));
        assert_eq!(long.row(1).str_value("variable"), Some("value"));
    }

    #[test]
    fn sort_num_desc_orders_worst_first() {
        let t = sample();
        let sorted = t.sort_num_desc(&["value"]).unwrap();
        assert_eq!(sorted.row(0).str_value("site"), Some("Taihape"));
        // The null value sorts last.
        assert!(sorted.row(3).cell("value").unwrap().is_null());
    }

    #[test]
    fn num_max_ignores_nulls() {
        let t = sample();
        assert_eq!(t.num_max("value").unwrap(), Some(11.0));
    }
}
