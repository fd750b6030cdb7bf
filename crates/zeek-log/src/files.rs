//! Log-file discovery and transparent decompression.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use tracing::warn;

/// Collects `.log` and `.gz` files from the given paths. Directories are
/// scanned one level deep; symlinks are skipped so a capture directory's
/// `current` link at the live spool is never parsed.
pub fn gather_log_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for path in paths {
        if path.is_dir() {
            gather_dir(path, &mut found);
        } else if has_log_extension(path) {
            found.push(path.clone());
        } else {
            warn!(path = %path.display(), "ignoring non .log or .gz file");
        }
    }

    found.sort();
    found
}

fn gather_dir(dir: &Path, found: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(error = %err, path = %dir.display(), "failed reading log directory");
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, path = %dir.display(), "failed reading directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.is_symlink() {
            continue;
        }
        if path.is_file() && has_log_extension(&path) {
            found.push(path);
        }
    }
}

fn has_log_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("log") | Some("gz")
    )
}

/// Opens a buffered line reader over a log file, gunzipping `.gz` inputs.
pub fn open_log_reader(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)
        .with_context(|| format!("failed opening log file {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        Some("log") => Ok(Box::new(BufReader::new(file))),
        _ => bail!("unrecognized log file type: {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "beaconwatch-{tag}-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn gathers_logs_and_skips_other_files() {
        let dir = temp_dir("gather");
        std::fs::write(dir.join("http.log"), b"").expect("write log");
        std::fs::write(dir.join("conn.log.gz"), b"").expect("write gz");
        std::fs::write(dir.join("notes.txt"), b"").expect("write txt");

        let found = gather_log_files(&[dir.clone()]);
        let names: Vec<String> = found
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        assert_eq!(names, vec!["conn.log.gz", "http.log"]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn direct_file_paths_pass_through() {
        let dir = temp_dir("direct");
        let log = dir.join("http.log");
        std::fs::write(&log, b"").expect("write log");

        let found = gather_log_files(&[log.clone(), dir.join("absent.json")]);
        assert_eq!(found, vec![log]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn gz_reader_round_trips() {
        let dir = temp_dir("gz");
        let path = dir.join("http.log.gz");
        let file = File::create(&path).expect("create gz");
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b"line one\nline two\n").expect("write");
        encoder.finish().expect("finish");

        let reader = open_log_reader(&path).expect("open");
        let lines: Vec<String> = reader.lines().map(|l| l.expect("line")).collect();
        assert_eq!(lines, vec!["line one", "line two"]);

        let _ = std::fs::remove_dir_all(dir);
    }
}
