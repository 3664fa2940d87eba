//! Newline-delimited item sources.

use std::{io, path::Path};
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

pub type ItemReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Opens `path` for reading, or stdin when no path is given.
pub async fn open(path: Option<&Path>) -> io::Result<ItemReader> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

/// Normalizes one line into an item. Blank lines carry no item.
fn to_item(line: String) -> Option<String> {
    let item = line.trim_end_matches('\r');
    if item.trim().is_empty() {
        None
    } else if item.len() == line.len() {
        Some(line)
    } else {
        Some(item.to_owned())
    }
}

/// Reads every item from `reader` until end of input.
pub async fn collect<R>(reader: R) -> io::Result<Vec<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut items = Vec::new();
    while let Some(line) = lines.next_line().await? {
        items.extend(to_item(line));
    }
    Ok(items)
}

/// Forwards items from `reader` into `tx` as they arrive.
///
/// Stops at end of input, when the receiving side is dropped, or when `ctx`
/// is cancelled. Returns the number of items sent.
pub async fn forward<R>(
    reader: R,
    tx: mpsc::Sender<String>,
    ctx: CancellationToken,
) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;

    loop {
        let line = tokio::select! {
            biased;
            () = ctx.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let Some(item) = to_item(line) else {
            continue;
        };

        tokio::select! {
            biased;
            () = ctx.cancelled() => break,
            sent_ok = tx.send(item) => {
                if sent_ok.is_err() {
                    tracing::debug!("Item channel closed after {sent} items");
                    break;
                }
            }
        }
        sent += 1;
    }

    tracing::debug!("Input reader finished after {sent} items");
    Ok(sent)
}
