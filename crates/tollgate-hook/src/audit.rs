use std::io::Write;
use std::path::PathBuf;

use tollgate_core::engine::AuditSink;
use tollgate_core::verdict::DecisionLogEntry;

/// Append-only JSONL decision log, one line per decided request.
///
/// Logging must never block a decision; any write failure degrades to a
/// diagnostic on stderr.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, entry: &DecisionLogEntry) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize audit record");
                return;
            }
        };

        let appended = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = appended {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to append audit record"
            );
        }
    }
}
