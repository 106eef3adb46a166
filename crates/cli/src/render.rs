use std::io::{self, Write};

use futures::StreamExt;
use gitinsp_client::{IndexSelection, StreamingChatClient};

/// Re-renders growing snapshots on a terminal that cannot erase output.
///
/// A snapshot extending what is on screen prints only its new suffix. Anything
/// else (an error replacing the answer) starts on a fresh line.
pub struct SnapshotPrinter<W: Write> {
    out: W,
    shown: String,
}

impl<W: Write> SnapshotPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            shown: String::new(),
        }
    }

    pub fn render(&mut self, snapshot: &str) -> io::Result<()> {
        match snapshot.strip_prefix(self.shown.as_str()) {
            Some(suffix) => self.out.write_all(suffix.as_bytes())?,
            None => {
                writeln!(self.out)?;
                self.out.write_all(snapshot.as_bytes())?;
            }
        }
        self.out.flush()?;
        self.shown.clear();
        self.shown.push_str(snapshot);
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Streams one chat turn to stdout, rendering every snapshot as it arrives.
pub async fn stream_to_stdout(
    chat: &StreamingChatClient,
    message: &str,
    index_name: Option<&str>,
) -> io::Result<()> {
    let mut snapshots = chat.stream(message, index_name);
    let mut printer = SnapshotPrinter::new(io::stdout());
    while let Some(snapshot) = snapshots.next().await {
        printer.render(&snapshot)?;
    }
    printer.finish()?;
    Ok(())
}

/// One line per known index, the active one marked with `*`.
pub fn selection_lines(selection: &IndexSelection) -> Vec<String> {
    if selection.is_empty() {
        return vec!["(no indexes)".to_string()];
    }

    let active = selection.active();
    selection
        .indexes()
        .iter()
        .map(|descriptor| {
            let marker = if active == Some(descriptor.id.as_str()) {
                '*'
            } else {
                ' '
            };
            format!("{marker} {}", descriptor.label)
        })
        .collect()
}
