//! Columnar event tables: Parquet / Arrow IPC ↔ in-memory [`EventFrame`].
//!
//! # Column mapping
//!
//! | Arrow type                               | Column kind          |
//! |------------------------------------------|----------------------|
//! | numeric or `Boolean`                     | [`Column::Scalar`]   |
//! | `List<numeric>` / `LargeList<numeric>`   | [`Column::Jagged`]   |
//! | anything else (strings, dictionaries, …) | skipped              |
//!
//! All values are widened to `f64`. Null scalars read as NaN, null lists as
//! empty lists. Parquet needs the `parquet` feature; Arrow IPC (`.arrow`,
//! `.feather`, `.ipc`) is always available.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, ListArray};
use arrow::buffer::{OffsetBuffer, ScalarBuffer};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, FieldRef, Float64Type, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use rtb_core::{Error, Result};

// ---------------------------------------------------------------------------
// Jagged columns
// ---------------------------------------------------------------------------

/// Variable-length per-event values: one flat array plus entry boundaries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Jagged {
    /// Flat array of all values across all entries.
    pub flat: Vec<f64>,
    /// Entry boundaries: `offsets.len() == n_entries + 1`.
    pub offsets: Vec<usize>,
}

impl Jagged {
    /// Build from flat values and offsets, checking that the offsets start
    /// at 0, never decrease, and end at `flat.len()`.
    pub fn new(flat: Vec<f64>, offsets: Vec<usize>) -> Result<Self> {
        if offsets.first() != Some(&0) {
            return Err(Error::Validation("jagged offsets must start at 0".into()));
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::Validation("jagged offsets must be non-decreasing".into()));
        }
        if offsets.last() != Some(&flat.len()) {
            return Err(Error::Validation(format!(
                "jagged offsets end at {:?}, expected {}",
                offsets.last(),
                flat.len()
            )));
        }
        Ok(Self { flat, offsets })
    }

    /// Build from one vector per entry.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Self {
        let mut flat = Vec::new();
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        offsets.push(0);
        for row in rows {
            flat.extend_from_slice(row.as_ref());
            offsets.push(flat.len());
        }
        Self { flat, offsets }
    }

    /// Number of entries.
    pub fn n_entries(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Values of entry `row`.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.flat[self.offsets[row]..self.offsets[row + 1]]
    }

    /// Number of values in each entry.
    pub fn lens(&self) -> Vec<f64> {
        self.offsets.windows(2).map(|w| (w[1] - w[0]) as f64).collect()
    }

    /// Keep the entries whose `mask` entry is set.
    pub fn filter(&self, mask: &[bool]) -> Jagged {
        let mut flat = Vec::new();
        let mut offsets = vec![0];
        for (i, _) in mask.iter().enumerate().filter(|(_, m)| **m) {
            flat.extend_from_slice(self.row(i));
            offsets.push(flat.len());
        }
        Jagged { flat, offsets }
    }

    fn append(&mut self, other: &Jagged) {
        let base = self.flat.len();
        self.flat.extend_from_slice(&other.flat);
        self.offsets.extend(other.offsets.iter().skip(1).map(|o| o + base));
    }
}

/// One column of an [`EventFrame`].
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// One value per event.
    Scalar(Vec<f64>),
    /// A variable number of values per event.
    Jagged(Jagged),
}

impl Column {
    /// Number of events covered by the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Scalar(v) => v.len(),
            Column::Jagged(j) => j.n_entries(),
        }
    }

    /// Whether the column covers no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            Column::Scalar(_) => "scalar",
            Column::Jagged(_) => "jagged",
        }
    }

    fn filter(&self, mask: &[bool]) -> Column {
        match self {
            Column::Scalar(v) => Column::Scalar(
                v.iter().zip(mask).filter(|(_, m)| **m).map(|(x, _)| *x).collect(),
            ),
            Column::Jagged(j) => Column::Jagged(j.filter(mask)),
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Scalar(v)
    }
}

impl From<Jagged> for Column {
    fn from(j: Jagged) -> Self {
        Column::Jagged(j)
    }
}

// ---------------------------------------------------------------------------
// EventFrame
// ---------------------------------------------------------------------------

/// An in-memory event table with named scalar and jagged columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventFrame {
    names: Vec<String>,
    columns: Vec<Column>,
    n_events: usize,
}

impl EventFrame {
    /// Empty frame with `n_events` rows and no columns.
    pub fn with_rows(n_events: usize) -> Self {
        Self { names: Vec::new(), columns: Vec::new(), n_events }
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Add a column. The first column of an empty frame fixes the row count.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(Error::Validation(format!("duplicate column '{name}'")));
        }
        if self.columns.is_empty() && self.n_events == 0 {
            self.n_events = column.len();
        } else if column.len() != self.n_events {
            return Err(Error::Validation(format!(
                "column '{name}' has {} entries, frame has {}",
                column.len(),
                self.n_events
            )));
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Builder form of [`push_column`](Self::push_column) for scalar columns.
    pub fn with_scalar(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.push_column(name, Column::Scalar(values))?;
        Ok(self)
    }

    /// Builder form of [`push_column`](Self::push_column) for jagged columns.
    pub fn with_jagged(mut self, name: impl Into<String>, values: Jagged) -> Result<Self> {
        self.push_column(name, Column::Jagged(values))?;
        Ok(self)
    }

    /// Column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names.iter().position(|n| n == name).map(|i| &self.columns[i])
    }

    /// Mutable column by name.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.names.iter().position(|n| n == name).map(|i| &mut self.columns[i])
    }

    /// Iterate `(name, column)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Keep the events whose `mask` entry is set.
    pub fn filter(&self, mask: &[bool]) -> Result<EventFrame> {
        if mask.len() != self.n_events {
            return Err(Error::Validation(format!(
                "mask has {} entries, frame has {}",
                mask.len(),
                self.n_events
            )));
        }
        Ok(EventFrame {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.filter(mask)).collect(),
            n_events: mask.iter().filter(|m| **m).count(),
        })
    }

    /// Append the rows of `other`; both frames must have the same columns
    /// (names, order and kinds).
    pub fn append(&mut self, other: &EventFrame) -> Result<()> {
        if self.names != other.names {
            return Err(Error::Validation(format!(
                "schema mismatch: {:?} vs {:?}",
                self.names, other.names
            )));
        }
        for ((name, dst), src) in self.names.iter().zip(&mut self.columns).zip(&other.columns) {
            match (dst, src) {
                (Column::Scalar(a), Column::Scalar(b)) => a.extend_from_slice(b),
                (Column::Jagged(a), Column::Jagged(b)) => a.append(b),
                (dst, src) => {
                    return Err(Error::Validation(format!(
                        "column '{name}' is {} in one table and {} in another",
                        dst.kind(),
                        src.kind()
                    )));
                }
            }
        }
        self.n_events += other.n_events;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Arrow conversion
    // -----------------------------------------------------------------------

    /// Convert Arrow batches (sharing one schema) into a frame.
    pub fn from_record_batches(batches: &[RecordBatch]) -> Result<Self> {
        let mut out: Option<EventFrame> = None;
        for batch in batches {
            let frame = Self::from_record_batch(batch)?;
            match out.as_mut() {
                Some(acc) => acc.append(&frame)?,
                None => out = Some(frame),
            }
        }
        Ok(out.unwrap_or_default())
    }

    fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let mut frame = EventFrame::with_rows(batch.num_rows());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            match field.data_type() {
                dt if is_numeric(dt) => {
                    frame.push_column(field.name().clone(), Column::Scalar(to_f64(array)?))?;
                }
                DataType::List(inner) if is_numeric(inner.data_type()) => {
                    let list = array.as_list::<i32>();
                    let offsets = list.value_offsets().iter().map(|&o| o as usize);
                    let jagged = list_to_jagged(list.values(), offsets, |i| list.is_null(i))?;
                    frame.push_column(field.name().clone(), Column::Jagged(jagged))?;
                }
                DataType::LargeList(inner) if is_numeric(inner.data_type()) => {
                    let list = array.as_list::<i64>();
                    let offsets = list.value_offsets().iter().map(|&o| o as usize);
                    let jagged = list_to_jagged(list.values(), offsets, |i| list.is_null(i))?;
                    frame.push_column(field.name().clone(), Column::Jagged(jagged))?;
                }
                other => {
                    tracing::debug!(
                        column = %field.name(),
                        data_type = %other,
                        "skipping non-numeric column"
                    );
                }
            }
        }
        Ok(frame)
    }

    /// Convert to a single Arrow batch: scalars as `Float64`, jagged columns
    /// as `List<Float64>`.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let item: FieldRef = Arc::new(Field::new("item", DataType::Float64, true));
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());

        for (name, column) in self.iter() {
            match column {
                Column::Scalar(v) => {
                    fields.push(Field::new(name, DataType::Float64, false));
                    arrays.push(Arc::new(Float64Array::from(v.clone())));
                }
                Column::Jagged(j) => {
                    let offsets = j
                        .offsets
                        .iter()
                        .map(|&o| {
                            i32::try_from(o).map_err(|_| {
                                Error::Columnar(format!("column '{name}' exceeds i32 offsets"))
                            })
                        })
                        .collect::<Result<Vec<i32>>>()?;
                    let list = ListArray::try_new(
                        item.clone(),
                        OffsetBuffer::new(ScalarBuffer::from(offsets)),
                        Arc::new(Float64Array::from(j.flat.clone())),
                        None,
                    )
                    .map_err(|e| Error::Columnar(format!("column '{name}': {e}")))?;
                    fields.push(Field::new(name, DataType::List(item.clone()), false));
                    arrays.push(Arc::new(list));
                }
            }
        }

        let options = RecordBatchOptions::new().with_row_count(Some(self.n_events));
        RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
            .map_err(|e| Error::Columnar(format!("failed to build RecordBatch: {e}")))
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Read and concatenate event tables; the format follows the extension.
    pub fn read<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut out: Option<EventFrame> = None;
        for path in paths {
            let path = path.as_ref();
            let frame = match extension(path).as_str() {
                "parquet" | "pq" => Self::read_parquet(path)?,
                "arrow" | "feather" | "ipc" => Self::read_ipc(path)?,
                other => {
                    return Err(Error::Validation(format!(
                        "{}: unsupported event file extension '{other}'",
                        path.display()
                    )));
                }
            };
            tracing::debug!(path = %path.display(), events = frame.n_events(), "read event table");
            match out.as_mut() {
                Some(acc) => acc
                    .append(&frame)
                    .map_err(|e| e.context(path.display()))?,
                None => out = Some(frame),
            }
        }
        Ok(out.unwrap_or_default())
    }

    /// Read an Arrow IPC file.
    pub fn read_ipc(path: &Path) -> Result<Self> {
        let batches = read_ipc_batches(path)?;
        Self::from_record_batches(&batches)
    }

    /// Write an Arrow IPC file.
    pub fn write_ipc(&self, path: &Path) -> Result<()> {
        let batch = self.to_record_batch()?;
        write_ipc_batches(path, &[batch])
    }

    /// Read a Parquet file.
    #[cfg(feature = "parquet")]
    pub fn read_parquet(path: &Path) -> Result<Self> {
        let batches = crate::parquet_io::read_parquet_batches(path)?;
        Self::from_record_batches(&batches)
    }

    /// Read a Parquet file.
    #[cfg(not(feature = "parquet"))]
    pub fn read_parquet(path: &Path) -> Result<Self> {
        Err(Error::Columnar(format!(
            "{}: Parquet support is not compiled in (enable the `parquet` feature)",
            path.display()
        )))
    }

    /// Write a Parquet file.
    #[cfg(feature = "parquet")]
    pub fn write_parquet(&self, path: &Path) -> Result<()> {
        let batch = self.to_record_batch()?;
        crate::parquet_io::write_parquet(path, &[batch])
    }
}

fn extension(path: &Path) -> String {
    path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()).unwrap_or_default()
}

fn is_numeric(dt: &DataType) -> bool {
    dt.is_numeric() || *dt == DataType::Boolean
}

fn to_f64(array: &ArrayRef) -> Result<Vec<f64>> {
    let arr = cast(array.as_ref(), &DataType::Float64)
        .map_err(|e| Error::Columnar(format!("cast to Float64 failed: {e}")))?;
    let f = arr.as_primitive::<Float64Type>();
    Ok((0..f.len()).map(|i| if f.is_null(i) { f64::NAN } else { f.value(i) }).collect())
}

fn list_to_jagged(
    values: &ArrayRef,
    offsets: impl Iterator<Item = usize>,
    is_null: impl Fn(usize) -> bool,
) -> Result<Jagged> {
    let values = to_f64(values)?;
    let offsets: Vec<usize> = offsets.collect();
    let mut flat = Vec::with_capacity(values.len());
    let mut out_offsets = Vec::with_capacity(offsets.len());
    out_offsets.push(0);
    for (row, w) in offsets.windows(2).enumerate() {
        if !is_null(row) {
            let slice = values.get(w[0]..w[1]).ok_or_else(|| {
                Error::Columnar(format!("list offsets {}..{} out of range", w[0], w[1]))
            })?;
            flat.extend_from_slice(slice);
        }
        out_offsets.push(flat.len());
    }
    Ok(Jagged { flat, offsets: out_offsets })
}

/// Read all batches of an Arrow IPC file.
///
/// A file without batches yields one empty batch carrying the file schema.
pub fn read_ipc_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let reader = arrow::ipc::reader::FileReader::try_new(file, None)
        .map_err(|e| Error::Columnar(format!("{}: {e}", path.display())))?;
    let schema = reader.schema();
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Columnar(format!("{}: {e}", path.display())))?;
    if batches.is_empty() {
        return Ok(vec![RecordBatch::new_empty(schema)]);
    }
    Ok(batches)
}

/// Write batches (sharing one schema) to an Arrow IPC file.
pub fn write_ipc_batches(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    let Some(first) = batches.first() else {
        return Err(Error::Columnar(format!("{}: nothing to write", path.display())));
    };
    let file = File::create(path)?;
    let columnar =
        |e: arrow::error::ArrowError| Error::Columnar(format!("{}: {e}", path.display()));
    let mut writer =
        arrow::ipc::writer::FileWriter::try_new(file, &first.schema()).map_err(columnar)?;
    for batch in batches {
        writer.write(batch).map_err(columnar)?;
    }
    writer.finish().map_err(columnar)?;
    Ok(())
}
