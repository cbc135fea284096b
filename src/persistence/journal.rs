//! The journal file and its two flush strategies.
//!
//! Full rewrites go through a sibling temp file that is synced and then
//! renamed over the journal, so the file on disk is always either the old or
//! the new image. Appends write only the changed records and sync the file.
//! An internal lock keeps at most one write in flight.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tracing::{debug, info, instrument, warn};

use super::{FlushStrategy, Record};
use crate::csv_utils::{journal_reader, write_journal_lines};
use crate::Error;

pub struct Journal {
    path: PathBuf,
    tmp_path: PathBuf,
    strategy: FlushStrategy,
    write_lock: Mutex<()>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>, strategy: FlushStrategy) -> Self {
        let path = path.into();
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        Self {
            path,
            tmp_path,
            strategy,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn strategy(&self) -> FlushStrategy {
        self.strategy
    }

    /// Reads every record in file order. A missing journal is an empty one.
    /// Lines that cannot be decoded are skipped; I/O failures are returned.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<Record>, Error> {
        if !fs::try_exists(&self.path).await? {
            info!("No journal found, starting empty");
            return Ok(Vec::new());
        }

        let file = File::open(&self.path).await?;
        let mut reader = journal_reader(file);
        let mut rows = reader.records();
        let mut records = Vec::new();
        let mut skipped = 0usize;

        while let Some(row) = rows.next().await {
            match row {
                Ok(row) => {
                    // Fields are space-delimited; any other whitespace inside
                    // a field separates further fields
                    let fields: Vec<&str> = row.iter().flat_map(str::split_whitespace).collect();
                    if fields.is_empty() {
                        continue;
                    }
                    match Record::from_fields(&fields) {
                        Some(record) => records.push(record),
                        None => {
                            skipped += 1;
                            warn!(
                                line = row.position().map(|p| p.line()),
                                "Skipping malformed journal record"
                            );
                        }
                    }
                }
                Err(err) if matches!(err.kind(), csv_async::ErrorKind::Io(_)) => {
                    return Err(err.into());
                }
                Err(err) => {
                    skipped += 1;
                    warn!(error = %err, "Skipping undecodable journal line");
                }
            }
        }

        info!(records = records.len(), skipped, "Journal loaded");
        Ok(records)
    }

    /// Makes a change durable.
    ///
    /// `changes` are the records produced by the mutation; `full` builds the
    /// complete state image and is only called by the rewrite strategy.
    pub async fn flush<F>(&self, changes: &[Record], full: F) -> Result<(), Error>
    where
        F: FnOnce() -> Vec<Record>,
    {
        let _guard = self.write_lock.lock().await;
        match self.strategy {
            FlushStrategy::Rewrite => self.rewrite(&full()).await,
            FlushStrategy::Append => self.append(changes).await,
        }
    }

    /// Replaces the journal with the given records regardless of strategy.
    pub async fn compact(&self, records: &[Record]) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        self.rewrite(records).await
    }

    #[instrument(skip_all, fields(path = %self.path.display(), records = records.len()))]
    async fn rewrite(&self, records: &[Record]) -> Result<(), Error> {
        let buf = encode(records)?;
        self.ensure_parent_dir().await?;

        if let Err(err) = self.replace_with(&buf).await {
            // The temp file may never have been created
            let _ = fs::remove_file(&self.tmp_path).await;
            return Err(err);
        }
        debug!(bytes = buf.len(), "Journal rewritten");
        Ok(())
    }

    async fn replace_with(&self, buf: &[u8]) -> Result<(), Error> {
        let mut tmp = File::create(&self.tmp_path).await?;
        tmp.write_all(buf).await?;
        tmp.sync_all().await?;
        drop(tmp);

        fs::rename(&self.tmp_path, &self.path).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(path = %self.path.display(), records = records.len()))]
    async fn append(&self, records: &[Record]) -> Result<(), Error> {
        if records.is_empty() {
            return Ok(());
        }
        let buf = encode(records)?;
        self.ensure_parent_dir().await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let original_len = file.metadata().await?.len();

        if let Err(err) = write_synced(&mut file, &buf).await {
            truncate(&mut file, original_len).await;
            return Err(err);
        }
        debug!(bytes = buf.len(), "Journal appended");
        Ok(())
    }

    async fn ensure_parent_dir(&self) -> Result<(), Error> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(fs::create_dir_all(dir).await?),
            _ => Ok(()),
        }
    }
}

async fn write_synced(file: &mut File, buf: &[u8]) -> Result<(), Error> {
    file.write_all(buf).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

/// Cuts a failed append back off the journal so no partial or rolled back
/// records survive into the next load.
async fn truncate(file: &mut File, len: u64) {
    let restored = match file.set_len(len).await {
        Ok(()) => file.sync_data().await,
        Err(err) => Err(err),
    };
    if let Err(err) = restored {
        warn!(error = %err, len, "Failed to truncate journal after a failed append");
    }
}

fn encode(records: &[Record]) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    write_journal_lines(&mut buf, records.iter().map(Record::fields))?;
    Ok(buf)
}
