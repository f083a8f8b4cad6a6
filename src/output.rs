//! Operator-facing output.
//!
//! Every user-visible message is printed to stdout and, when a log file is
//! configured, appended to it with a timestamp. Writing happens on a blocking
//! task so polling loops never stall on terminal or disk I/O.

use crate::clock;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;

/// Output line routing for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Shown on stdout and logged.
    Say(String),
    /// Logged only.
    Note(String),
}

/// Cheap handle for emitting output lines.
#[derive(Debug, Clone)]
pub struct Output {
    tx: mpsc::UnboundedSender<OutputLine>,
}

impl Output {
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<OutputLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn say(&self, msg: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Say(msg.into()));
    }

    pub fn note(&self, msg: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Note(msg.into()));
    }
}

/// Spawn a blocking writer for stdout and the optional log file.
pub fn spawn_output_writer(log: Option<File>) -> (Output, tokio::task::JoinHandle<()>) {
    let (output, mut rx) = Output::pair();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut log = log.map(std::io::BufWriter::new);

        while let Some(line) = rx.blocking_recv() {
            let msg = match &line {
                OutputLine::Say(msg) => {
                    let _ = writeln!(out, "{msg}");
                    msg
                }
                OutputLine::Note(msg) => msg,
            };
            if let Some(log) = log.as_mut() {
                let _ = writeln!(log, "{}: {msg}", clock::timestamp());
            }
        }

        let _ = out.flush();
        if let Some(mut log) = log {
            let _ = log.flush();
        }
    });
    (output, handle)
}

/// Create the log file and write the invocation header: start time and the
/// command line parameters in name order.
pub fn open_log(path: &Path, parameters: &impl Serialize) -> Result<File> {
    let mut file = File::create(path)
        .with_context(|| format!("Unable to open log file {}", path.display()))?;
    writeln!(file, "{}: Script started\n", clock::timestamp())?;
    writeln!(file, "Command line parameters:\n")?;
    if let serde_json::Value::Object(map) = serde_json::to_value(parameters)? {
        let mut entries: Vec<_> = map.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in entries {
            writeln!(file, "    {name}: {}", render(&value))?;
        }
    }
    writeln!(file)?;
    Ok(file)
}

fn render(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "None".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<OutputLine>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        if let OutputLine::Say(msg) = line {
            lines.push(msg);
        }
    }
    lines
}
