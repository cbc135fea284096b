use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::{
    csv_utils::{csv_deserializer, write_csv},
    dto::{Reply, Request},
    Engine,
};

use csv_async::Error as CsvError;
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::info;

const BUFFER_SIZE: usize = 1024;

type Result<T, E = Box<dyn Error + Send + Sync>> = std::result::Result<T, E>;

/// Runs every request in the given CSV file through the engine and writes the
/// replies to the provided writer.
/// Spawns two tasks:
/// * CSV reader - streams requests from the input file, deserializes them and sends them to the processor via channel.
/// * Processor - receives requests from the channel and dispatches them in order until the channel is closed.
///
/// # Arguments
/// * `engine` - The vault the requests are applied to
/// * `input_path` - Path to the input CSV file with header `action,username,password,key,value`
/// * `writer` - Where to write the replies (e.g. stdout)
///
/// # Errors
/// Returns an error if:
/// * The input file cannot be read
/// * The CSV is malformed
/// * A change could not be made durable
/// * Writing to the output fails
pub async fn run<P, W>(engine: Arc<Engine>, input_path: P, writer: W) -> Result<()>
where
    P: AsRef<Path>,
    W: Write,
{
    let (tx, rx) = mpsc::channel(BUFFER_SIZE);
    let input_path = input_path.as_ref().to_owned();

    let reader_handle = tokio::spawn(read_requests(input_path, tx));
    let processor_handle = tokio::spawn(process_requests(engine, rx));

    // Wait for reader to finish and propagate any errors
    reader_handle.await??;

    // A journal failure stops the processor, which also closes the channel
    let replies = processor_handle.await??;
    info!(requests = replies.len(), "Batch processed");

    write_csv(writer, replies.into_iter())?;
    Ok(())
}

/// Reads and deserializes requests from a CSV file.
/// Sends them through the provided channel.
async fn read_requests(
    input_path: impl AsRef<Path> + Send,
    tx: mpsc::Sender<Request>,
) -> Result<(), CsvError> {
    let file = File::open(input_path).await?;
    let mut csv_reader = csv_deserializer(file);

    let mut records = csv_reader.deserialize::<Request>();
    while let Some(result) = records.next().await {
        match result {
            Ok(request) => {
                if tx.send(request).await.is_err() {
                    // Receiver dropped, exit gracefully
                    break;
                }
            }
            // CSV parsing errors are critical - propagate them
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Dispatches requests received through the channel.
/// Returns the replies once the channel is closed by the reader.
async fn process_requests(
    engine: Arc<Engine>,
    mut rx: mpsc::Receiver<Request>,
) -> Result<Vec<Reply>, crate::Error> {
    let mut replies = Vec::new();
    while let Some(request) = rx.recv().await {
        replies.push(engine.dispatch(request).await?);
    }
    Ok(replies)
}
