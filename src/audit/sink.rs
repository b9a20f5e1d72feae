//! Date-partitioned JSONL file sink for the durable audit trail.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use parking_lot::Mutex;

use super::AuditEvent;

pub struct JsonlSink {
    directory: PathBuf,
    current: Mutex<Option<(String, std::fs::File)>>,
}

impl JsonlSink {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            current: Mutex::new(None),
        }
    }

    pub fn append(&self, event: &AuditEvent) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.directory)?;

        let date_key = event.timestamp.format("%Y-%m-%d").to_string();
        let mut current = self.current.lock();

        let needs_new_file = match current.as_ref() {
            Some((key, _)) => key != &date_key,
            None => true,
        };

        if needs_new_file {
            let path = self.directory.join(format!("audit-{date_key}.jsonl"));
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            *current = Some((date_key, file));
        }

        let (_, file) = current.as_mut().expect("just populated above");
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        file.write_all(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::EventType;
    use tempfile::tempdir;

    #[test]
    fn appends_one_line_per_event() {
        let dir = tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().to_path_buf());
        sink.append(&AuditEvent::new(EventType::ExecuteEnd, "first")).unwrap();
        sink.append(&AuditEvent::new(EventType::ExecuteEnd, "second")).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let contents = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
