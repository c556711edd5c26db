//! # Best-effort local log file.
//!
//! One append-only file per run:
//! `<log_dir>/<safe_job>/<safe_job>_<YYYY-MM-DDTHH-MM-SS>.log`.
//!
//! ## Rules
//! - Failing to create or write the file never fails the run: it is logged
//!   once and reported as [`EventKind::LogFileUnavailable`], then local
//!   persistence is off for the rest of the run.
//! - `log_dir = None` disables persistence silently.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, error};

use crate::core::run::Run;
use crate::events::{Bus, Event, EventKind};

pub(crate) struct LocalLog {
    path: Option<PathBuf>,
    file: Option<BufWriter<File>>,
    run_id: String,
    bus: Bus,
}

impl LocalLog {
    /// Opens (creating directories as needed) the log file for `run`.
    pub(crate) fn open(log_dir: Option<&Path>, run: &Run, bus: Bus) -> Self {
        let mut log = Self {
            path: None,
            file: None,
            run_id: run.run_id().to_string(),
            bus,
        };
        let Some(dir) = log_dir else {
            debug!(run = %log.run_id, "local log disabled");
            return log;
        };

        let path = log_file_path(dir, run.job_name(), run.start_time());
        match create(&path) {
            Ok(file) => {
                debug!(run = %log.run_id, path = %path.display(), "local log opened");
                log.path = Some(path);
                log.file = Some(BufWriter::new(file));
            }
            Err(e) => log.fail(&path, &e),
        }
        log
    }

    /// Location of the file, while it is usable.
    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn write(&mut self, text: &str) {
        let res = match self.file.as_mut() {
            Some(file) => file.write_all(text.as_bytes()),
            None => return,
        };
        if let Err(e) = res {
            self.disable(&e);
        }
    }

    pub(crate) fn flush(&mut self) {
        let res = match self.file.as_mut() {
            Some(file) => file.flush(),
            None => return,
        };
        if let Err(e) = res {
            self.disable(&e);
        }
    }

    fn disable(&mut self, e: &io::Error) {
        self.file = None;
        if let Some(path) = self.path.take() {
            self.fail(&path, e);
        }
    }

    fn fail(&self, path: &Path, e: &io::Error) {
        error!(run = %self.run_id, path = %path.display(), error = %e, "local log unavailable, continuing without it");
        self.bus.publish(
            Event::new(EventKind::LogFileUnavailable)
                .with_run(self.run_id.as_str())
                .with_reason(e.to_string()),
        );
    }
}

fn create(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::options().create(true).append(true).open(path)
}

/// Job name with every character outside `[A-Za-z0-9._-]` replaced by `_`.
pub(crate) fn safe_job_name(job: &str) -> String {
    job.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn log_file_path(dir: &Path, job: &str, start: DateTime<Local>) -> PathBuf {
    let safe = safe_job_name(job);
    let stamp = start.format("%Y-%m-%dT%H-%M-%S");
    dir.join(&safe).join(format!("{safe}_{stamp}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn job_names_are_sanitized() {
        assert_eq!(safe_job_name("mnist v2/run#1"), "mnist_v2_run_1");
        assert_eq!(safe_job_name("ok.name-1_x"), "ok.name-1_x");
        assert_eq!(safe_job_name("résumé"), "r_sum_");
    }

    #[test]
    fn path_embeds_job_and_start_time() {
        let start = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let path = log_file_path(Path::new("/logs"), "my job", start);
        assert_eq!(
            path,
            PathBuf::from("/logs/my_job/my_job_2024-03-09T07-05-01.log")
        );
    }

    #[test]
    fn writes_land_in_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new("writer");
        let mut log = LocalLog::open(Some(dir.path()), &run, Bus::new(4));

        log.write("a\n");
        log.write("b\n");
        log.flush();

        let path = log.path().unwrap().to_path_buf();
        assert!(path.starts_with(dir.path().join("writer")));
        assert_eq!(fs::read_to_string(path).unwrap(), "a\nb\n");
    }

    #[tokio::test]
    async fn unusable_directory_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();

        let bus = Bus::new(4);
        let mut rx = bus.subscribe();
        let mut log = LocalLog::open(Some(&blocker), &Run::new("job"), bus);

        assert!(log.path().is_none());
        log.write("ignored");
        log.flush();
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::LogFileUnavailable);
    }

    #[test]
    fn no_dir_means_no_file() {
        let log = LocalLog::open(None, &Run::new("job"), Bus::new(4));
        assert!(log.path().is_none());
    }
}
