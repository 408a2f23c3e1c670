//! Parquet read/write for event tables and skims.

use std::fs::File;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use rtb_core::{Error, Result};

fn parquet_err(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Columnar(format!("{}: {e}", path.display()))
}

/// Read a Parquet file into Arrow RecordBatches.
///
/// A file without row groups yields one empty batch carrying the file schema.
pub fn read_parquet_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| parquet_err(path, e))?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(|e| parquet_err(path, e))?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| parquet_err(path, e))?;
    if batches.is_empty() {
        return Ok(vec![RecordBatch::new_empty(schema)]);
    }
    Ok(batches)
}

/// Write Arrow RecordBatches (sharing one schema) to a Snappy-compressed
/// Parquet file. Writing no batches is an error.
pub fn write_parquet(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    let Some(first) = batches.first() else {
        return Err(Error::Columnar(format!("{}: nothing to write", path.display())));
    };

    let props = WriterProperties::builder().set_compression(Compression::SNAPPY).build();
    let file = File::create(path)?;
    let mut writer =
        ArrowWriter::try_new(file, first.schema(), Some(props)).map_err(|e| parquet_err(path, e))?;
    for batch in batches {
        writer.write(batch).map_err(|e| parquet_err(path, e))?;
    }
    writer.close().map_err(|e| parquet_err(path, e))?;
    Ok(())
}
