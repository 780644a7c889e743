//! A labeled two dimensional collection of [`Value`]s.
//!
//! Cells are kept in one contiguous row-major buffer next to a column header
//! per column and a row label per row. Header and label lookups are exact,
//! linear, and return the first occurrence. A grid is not self-locking; share
//! it across threads behind the caller's own lock.

use std::fmt;

use tracing::debug;

use crate::codec::{Codec, FieldReader};
use crate::datatype::Value;
use crate::error::{ArborError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Value>,
    headers: Vec<String>,
    labels: Vec<String>,
}

// One fallible reservation per buffer, so a failure leaves nothing behind.
fn allocate_cells(rows: usize, cols: usize) -> Result<Vec<Value>> {
    let count = rows.checked_mul(cols).ok_or_else(|| {
        ArborError::AllocationFailure(format!("{rows}x{cols} cells overflow the address space"))
    })?;
    let mut cells = Vec::new();
    cells.try_reserve_exact(count)?;
    cells.resize_with(count, Value::default);
    Ok(cells)
}
fn allocate_names(count: usize) -> Result<Vec<String>> {
    let mut names = Vec::new();
    names.try_reserve_exact(count)?;
    names.resize_with(count, String::new);
    Ok(names)
}
fn check_shape(rows: usize, cols: usize) -> Result<()> {
    if rows == 0 || cols == 0 {
        return Err(ArborError::InvalidArgument(format!(
            "grid shape {rows}x{cols} must be positive in both dimensions"
        )));
    }
    Ok(())
}

impl Grid {
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        check_shape(rows, cols)?;
        Ok(Self {
            rows,
            cols,
            cells: allocate_cells(rows, cols)?,
            headers: allocate_names(cols)?,
            labels: allocate_names(rows)?,
        })
    }
    pub fn rows(&self) -> usize {
        self.rows
    }
    pub fn cols(&self) -> usize {
        self.cols
    }
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn offset(&self, row: usize, col: usize) -> Result<usize> {
        if row < self.rows && col < self.cols {
            Ok(row * self.cols + col)
        } else {
            Err(ArborError::OutOfRange(format!(
                "cell ({row}, {col}) lies outside a {}x{} grid",
                self.rows, self.cols
            )))
        }
    }
    fn check_row(&self, row: usize) -> Result<()> {
        if row < self.rows {
            Ok(())
        } else {
            Err(ArborError::OutOfRange(format!(
                "row {row} lies outside {} rows",
                self.rows
            )))
        }
    }
    fn check_col(&self, col: usize) -> Result<()> {
        if col < self.cols {
            Ok(())
        } else {
            Err(ArborError::OutOfRange(format!(
                "column {col} lies outside {} columns",
                self.cols
            )))
        }
    }

    // ------------- cells -------------
    pub fn get(&self, row: usize, col: usize) -> Result<&Value> {
        let at = self.offset(row, col)?;
        Ok(&self.cells[at])
    }
    pub fn get_mut(&mut self, row: usize, col: usize) -> Result<&mut Value> {
        let at = self.offset(row, col)?;
        Ok(&mut self.cells[at])
    }
    pub fn set(&mut self, row: usize, col: usize, value: impl Into<Value>) -> Result<()> {
        *self.get_mut(row, col)? = value.into();
        Ok(())
    }
    pub fn row(&self, row: usize) -> Result<&[Value]> {
        self.check_row(row)?;
        let start = row * self.cols;
        Ok(&self.cells[start..start + self.cols])
    }
    /// Writes `values` into `row` starting at column 0. More values than
    /// columns fail before any cell is written.
    pub fn set_row<I, V>(&mut self, row: usize, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.check_row(row)?;
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.len() > self.cols {
            return Err(ArborError::OutOfRange(format!(
                "{} values do not fit a row of {} columns",
                values.len(),
                self.cols
            )));
        }
        let start = row * self.cols;
        for (cell, value) in self.cells[start..].iter_mut().zip(values) {
            *cell = value;
        }
        Ok(())
    }
    pub fn column(&self, col: usize) -> Result<impl Iterator<Item = &Value>> {
        self.check_col(col)?;
        Ok(self.cells.iter().skip(col).step_by(self.cols))
    }
    /// All cells in row-major order.
    pub fn cells(&self) -> &[Value] {
        &self.cells
    }
    pub fn for_each_cell_mut<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(&mut Value) -> Result<()>,
    {
        self.cells.iter_mut().try_for_each(f)
    }

    // ------------- headers and labels -------------
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
    pub fn header(&self, col: usize) -> Result<&str> {
        self.check_col(col)?;
        Ok(&self.headers[col])
    }
    pub fn set_header(&mut self, col: usize, header: impl Into<String>) -> Result<()> {
        self.check_col(col)?;
        self.headers[col] = header.into();
        Ok(())
    }
    pub fn label(&self, row: usize) -> Result<&str> {
        self.check_row(row)?;
        Ok(&self.labels[row])
    }
    pub fn set_label(&mut self, row: usize, label: impl Into<String>) -> Result<()> {
        self.check_row(row)?;
        self.labels[row] = label.into();
        Ok(())
    }
    /// Replaces every header; exactly one per column is required.
    pub fn set_headers<I, S>(&mut self, headers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        if headers.len() != self.cols {
            return Err(ArborError::InvalidArgument(format!(
                "{} headers given for {} columns",
                headers.len(),
                self.cols
            )));
        }
        self.headers = headers;
        Ok(())
    }
    /// Replaces every label; exactly one per row is required.
    pub fn set_labels<I, S>(&mut self, labels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.len() != self.rows {
            return Err(ArborError::InvalidArgument(format!(
                "{} labels given for {} rows",
                labels.len(),
                self.rows
            )));
        }
        self.labels = labels;
        Ok(())
    }
    pub fn find_header(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
    pub fn find_label(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
    fn locate(&self, label: &str, header: &str) -> Result<(usize, usize)> {
        let row = self
            .find_label(label)
            .ok_or_else(|| ArborError::NotFound(format!("row label {label:?}")))?;
        let col = self
            .find_header(header)
            .ok_or_else(|| ArborError::NotFound(format!("column header {header:?}")))?;
        Ok((row, col))
    }
    pub fn get_by_label(&self, label: &str, header: &str) -> Result<&Value> {
        let (row, col) = self.locate(label, header)?;
        self.get(row, col)
    }
    pub fn set_by_label(&mut self, label: &str, header: &str, value: impl Into<Value>) -> Result<()> {
        let (row, col) = self.locate(label, header)?;
        self.set(row, col, value)
    }

    // ------------- reshaping -------------
    /// Reshapes the grid, keeping the overlapping top-left rectangle and
    /// filling new cells with unknown values. The grid is left untouched when
    /// the new buffers cannot be allocated.
    pub fn resize(&mut self, rows: usize, cols: usize) -> Result<()> {
        check_shape(rows, cols)?;
        let mut cells = allocate_cells(rows, cols)?;
        let mut headers = allocate_names(cols)?;
        let mut labels = allocate_names(rows)?;
        let (keep_rows, keep_cols) = (self.rows.min(rows), self.cols.min(cols));
        for r in 0..keep_rows {
            for c in 0..keep_cols {
                cells[r * cols + c] = std::mem::take(&mut self.cells[r * self.cols + c]);
            }
        }
        for (c, header) in headers.iter_mut().enumerate().take(keep_cols) {
            *header = std::mem::take(&mut self.headers[c]);
        }
        for (r, label) in labels.iter_mut().enumerate().take(keep_rows) {
            *label = std::mem::take(&mut self.labels[r]);
        }
        debug!(from_rows = self.rows, from_cols = self.cols, rows, cols, "grid resized");
        self.rows = rows;
        self.cols = cols;
        self.cells = cells;
        self.headers = headers;
        self.labels = labels;
        Ok(())
    }

    /// Merges `other` into this grid, growing the shape as needed.
    ///
    /// A column of `other` lands on the existing column with the same header;
    /// an empty header lands on the column at the same index when there is
    /// one. A row of `other` lands on the existing row with the same label,
    /// but rows with empty labels are always appended. Anything unmatched is
    /// appended, carrying its header or label along.
    pub fn merge(&mut self, other: &Grid) -> Result<()> {
        let mut headers = self.headers.clone();
        let col_map: Vec<usize> = other
            .headers
            .iter()
            .enumerate()
            .map(|(c, header)| {
                let existing = if header.is_empty() {
                    (c < self.cols).then_some(c)
                } else {
                    self.find_header(header)
                };
                existing.unwrap_or_else(|| {
                    headers.push(header.clone());
                    headers.len() - 1
                })
            })
            .collect();
        let mut labels = self.labels.clone();
        let row_map: Vec<usize> = other
            .labels
            .iter()
            .map(|label| {
                let existing = if label.is_empty() {
                    None
                } else {
                    self.find_label(label)
                };
                existing.unwrap_or_else(|| {
                    labels.push(label.clone());
                    labels.len() - 1
                })
            })
            .collect();
        if (labels.len(), headers.len()) != self.shape() {
            self.resize(labels.len(), headers.len())?;
        }
        self.headers = headers;
        self.labels = labels;
        for (r, &row) in row_map.iter().enumerate() {
            for (c, &col) in col_map.iter().enumerate() {
                self.cells[row * self.cols + col] = other.cells[r * other.cols + c].clone();
            }
        }
        debug!(rows = self.rows, cols = self.cols, "grids merged");
        Ok(())
    }

    // ------------- codec -------------
    pub fn encode(&self) -> Result<String> {
        self.encode_with(&Codec::default())
    }
    /// Row count, column count, headers, labels, then every cell row-major;
    /// each cell is encoded on its own and chooses its own delimiter.
    pub fn encode_with(&self, codec: &Codec) -> Result<String> {
        let mut writer = codec.writer();
        writer.push_count(self.rows).push_count(self.cols);
        for header in &self.headers {
            writer.push(header);
        }
        for label in &self.labels {
            writer.push(label);
        }
        for cell in &self.cells {
            writer.push(&cell.encode_with(codec)?);
        }
        writer.finish()
    }
    pub fn decode(text: &str) -> Result<Self> {
        let mut reader = FieldReader::open(text)?;
        let rows = reader.next_count("row count")?;
        let cols = reader.next_count("column count")?;
        let needed = rows
            .checked_mul(cols)
            .and_then(|cells| cells.checked_add(rows))
            .and_then(|fields| fields.checked_add(cols));
        match needed {
            Some(needed) if needed == reader.remaining() => (),
            _ => {
                return Err(ArborError::Codec(format!(
                    "a {rows}x{cols} grid cannot be read from {} fields",
                    reader.remaining()
                )));
            }
        }
        let mut grid = Grid::new(rows, cols)
            .map_err(|e| ArborError::Codec(format!("bad grid shape: {e}")))?;
        for header in grid.headers.iter_mut() {
            *header = reader.next("header")?.to_string();
        }
        for label in grid.labels.iter_mut() {
            *label = reader.next("label")?.to_string();
        }
        for cell in grid.cells.iter_mut() {
            *cell = Value::decode(reader.next("cell")?)?;
        }
        reader.finish()?;
        Ok(grid)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for header in &self.headers {
            write!(f, "\t{}", header)?;
        }
        writeln!(f)?;
        for r in 0..self.rows {
            write!(f, "{}", self.labels[r])?;
            for cell in &self.cells[r * self.cols..(r + 1) * self.cols] {
                write!(f, "\t{}", cell)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
