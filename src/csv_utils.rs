//! CSV serialization and deserialization utilities.
//!
//! Two dialects are used:
//! - comma-separated files with a header row for batch requests and replies
//! - headerless, space-delimited, unquoted lines for the journal

use csv::{QuoteStyle, WriterBuilder};
use csv_async::{AsyncDeserializer, AsyncReader, AsyncReaderBuilder, Trim};
use serde::Serialize;
use std::io::Write;
use tokio::io::AsyncRead;

/// Creates an async deserializer over a CSV source with a header row.
/// Fields are trimmed before they are deserialized.
pub fn csv_deserializer<R>(reader: R) -> AsyncDeserializer<R>
where
    R: AsyncRead + Unpin + Send,
{
    AsyncReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .create_deserializer(reader)
}

/// Writes an iterator of records to a CSV writer.
/// Each record must implement Serialize.
pub fn write_csv<T, W>(writer: W, records: impl Iterator<Item = T>) -> csv::Result<()>
where
    T: Serialize,
    W: Write,
{
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Creates a reader for journal lines.
/// Rows may have any number of fields; no quoting is interpreted.
pub fn journal_reader<R>(reader: R) -> AsyncReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    AsyncReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .create_reader(reader)
}

/// Writes rows of fields as journal lines.
pub fn write_journal_lines<'a, W>(
    writer: W,
    rows: impl Iterator<Item = Vec<&'a str>>,
) -> csv::Result<()>
where
    W: Write,
{
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b' ')
        .quote_style(QuoteStyle::Never)
        .from_writer(writer);
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
