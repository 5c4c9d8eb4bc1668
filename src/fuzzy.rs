//! Fuzzy interval inference from path tokens.
//!
//! No file contents are read here. Files are partitioned into time series by
//! their non-time path tokens, sorted by extracted timestamp, and each file's
//! interval is derived from its neighbors in the series. The method is
//! heuristic: boundaries for the first/last file of a series fall back to the
//! series' widest observed gap, or to a flat two days for singletons.

use crate::error::Result;
use crate::extract::{self, Registry};
use crate::source::Descriptor;
use crate::types::{FileSpan, Window};
use crate::{epoch, walk};
use chrono::{DateTime, Duration, Local};
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::debug;

/// Interval width assumed for a series with a single file.
fn singleton_span() -> Duration {
    Duration::days(2)
}

/// Concatenation of the path's non-time-like tokens. Distinguishes parallel
/// series that share basenames, e.g. `proxy-s1/squid.20140101.gz` vs
/// `proxy-s2/squid.20140101.gz`.
fn path_key(text: &str) -> String {
    extract::tokenize(text)
        .into_iter()
        .filter(|t| !extract::is_time_like(t))
        .collect()
}

/// Widest gap between consecutive timestamps; `None` for singletons.
fn max_gap(files: &[(DateTime<Local>, PathBuf)]) -> Option<Duration> {
    files
        .windows(2)
        .map(|pair| pair[1].0 - pair[0].0)
        .max()
        .filter(|_| files.len() > 1)
}

/// Interval for the file at `i` of a sorted partition.
fn span_at(
    file_time_is_end_time: bool,
    files: &[(DateTime<Local>, PathBuf)],
    i: usize,
    gap: Option<Duration>,
) -> (DateTime<Local>, DateTime<Local>) {
    let t = files[i].0;
    if file_time_is_end_time {
        let begin = if i > 0 {
            files[i - 1].0
        } else if let Some(gap) = gap {
            // Clamped to the epoch, but never past the file's own time.
            (t - gap).max(epoch::origin()).min(t)
        } else {
            t - singleton_span()
        };
        (begin, t)
    } else {
        let end = if i + 1 < files.len() {
            files[i + 1].0
        } else if let Some(gap) = gap {
            // Clamped to now, but never before the file's own time.
            (t + gap).min(Local::now()).max(t)
        } else {
            t + singleton_span()
        };
        (t, end)
    }
}

/// Resolve a descriptor's files against an optional window.
pub fn resolve(descriptor: &Descriptor, window: &Window) -> Result<Vec<FileSpan>> {
    let extractor = Registry::builtin().resolve(descriptor.extractor.as_deref())?;

    let mut partitions: BTreeMap<String, Vec<(DateTime<Local>, PathBuf)>> = BTreeMap::new();
    for path in walk::walk(descriptor)? {
        let text = path.to_string_lossy().into_owned();
        let Some(ts) = extractor(&text) else {
            debug!(path = %path.display(), "no timestamp recognized, skipping");
            continue;
        };
        partitions.entry(path_key(&text)).or_default().push((ts, path));
    }

    let mut seen: HashSet<(OsString, u64)> = HashSet::new();
    let mut spans = Vec::new();
    for mut files in partitions.into_values() {
        files.sort_by_key(|(ts, _)| *ts);
        let gap = max_gap(&files);
        for i in 0..files.len() {
            let (begin, end) = span_at(descriptor.file_time_is_end_time, &files, i, gap);
            // The partition is sorted, so once a file starts past the window
            // nothing later in it can qualify.
            if window.end.is_some_and(|e| begin > e) {
                break;
            }
            if window.begin.is_some_and(|b| end < b) {
                continue;
            }
            let path = &files[i].1;
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            let name = path.file_name().map(OsString::from).unwrap_or_default();
            if !seen.insert((name, size)) {
                debug!(path = %path.display(), "duplicate basename/size, skipping");
                continue;
            }
            spans.push(FileSpan {
                path: path.clone(),
                begin,
                end,
            });
        }
    }
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn local(y: i32, mo: u32, d: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, 0, 0, 0).unwrap()
    }

    fn write_file(dir: &std::path::Path, name: &str, len: usize) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    fn descriptor(root: &std::path::Path, end_time: bool) -> Descriptor {
        Descriptor {
            source: "test".to_string(),
            paths: vec![root.to_string_lossy().into_owned()],
            file_time_is_end_time: end_time,
            ..Descriptor::default()
        }
    }

    fn by_name(spans: &[FileSpan], name: &str) -> FileSpan {
        spans
            .iter()
            .find(|s| s.path.file_name().unwrap().to_str().unwrap() == name)
            .unwrap_or_else(|| panic!("{name} not resolved"))
            .clone()
    }

    #[test]
    fn end_time_semantics_pair() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a.20140101.gz", 10);
        write_file(tmp.path(), "a.20140103.gz", 20);
        let spans = resolve(&descriptor(tmp.path(), true), &Window::default()).unwrap();
        assert_eq!(spans.len(), 2);

        let first = by_name(&spans, "a.20140101.gz");
        assert_eq!(first.end, local(2014, 1, 1));
        assert_eq!(first.begin, local(2014, 1, 1) - Duration::days(2));

        let second = by_name(&spans, "a.20140103.gz");
        assert_eq!(second.end, local(2014, 1, 3));
        assert_eq!(second.begin, local(2014, 1, 1));
    }

    #[test]
    fn begin_time_semantics() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "b.20140101.gz", 10);
        write_file(tmp.path(), "b.20140103.gz", 20);
        let spans = resolve(&descriptor(tmp.path(), false), &Window::default()).unwrap();

        let first = by_name(&spans, "b.20140101.gz");
        assert_eq!(first.begin, local(2014, 1, 1));
        assert_eq!(first.end, local(2014, 1, 3));

        // Last file: gap is defined, so the end is t + gap (well before now).
        let second = by_name(&spans, "b.20140103.gz");
        assert_eq!(second.begin, local(2014, 1, 3));
        assert_eq!(second.end, local(2014, 1, 5));
    }

    #[test]
    fn singleton_partition_spans_two_days() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "only.20140102.gz", 5);

        let spans = resolve(&descriptor(tmp.path(), true), &Window::default()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end - spans[0].begin, Duration::days(2));
        assert_eq!(spans[0].end, local(2014, 1, 2));

        let spans = resolve(&descriptor(tmp.path(), false), &Window::default()).unwrap();
        assert_eq!(spans[0].end - spans[0].begin, Duration::days(2));
        assert_eq!(spans[0].begin, local(2014, 1, 2));
    }

    #[test]
    fn parallel_series_split_by_path_key() {
        let tmp = TempDir::new().unwrap();
        // Same basename, same date, different directories and sizes.
        write_file(tmp.path(), "proxy-s1/squid.20140101.gz", 10);
        write_file(tmp.path(), "proxy-s2/squid.20140101.gz", 20);
        let spans = resolve(&descriptor(tmp.path(), true), &Window::default()).unwrap();
        assert_eq!(spans.len(), 2, "distinct series despite identical basenames");
        // Each is a singleton series, not neighbors of one another.
        for span in &spans {
            assert_eq!(span.end - span.begin, Duration::days(2));
        }
    }

    #[test]
    fn duplicate_basename_and_size_is_skipped() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "east/squid.20140101.gz", 10);
        write_file(tmp.path(), "west/squid.20140101.gz", 10);
        let spans = resolve(&descriptor(tmp.path(), true), &Window::default()).unwrap();
        assert_eq!(spans.len(), 1, "identical (basename, size) emitted once");
    }

    #[test]
    fn window_endpoints_inclusive() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "c.20140101.gz", 10);
        write_file(tmp.path(), "c.20140103.gz", 20);
        write_file(tmp.path(), "c.20140105.gz", 30);

        // Query end equal to the first file's begin boundary.
        let window = Window::new(None, Some(local(2014, 1, 1) - Duration::days(2)));
        let spans = resolve(&descriptor(tmp.path(), true), &window).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(by_name(&spans, "c.20140101.gz").end, local(2014, 1, 1));

        // Query begin equal to the last file's end.
        let window = Window::new(Some(local(2014, 1, 5)), None);
        let spans = resolve(&descriptor(tmp.path(), true), &window).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(by_name(&spans, "c.20140105.gz").end, local(2014, 1, 5));
    }

    #[test]
    fn window_filters_middle() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "d.20140101.gz", 10);
        write_file(tmp.path(), "d.20140103.gz", 20);
        write_file(tmp.path(), "d.20140110.gz", 30);
        let window = Window::new(Some(local(2014, 1, 2)), Some(local(2014, 1, 3)));
        let spans = resolve(&descriptor(tmp.path(), true), &window).unwrap();
        let mut names: Vec<&str> = spans
            .iter()
            .map(|s| s.path.file_name().unwrap().to_str().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["d.20140103.gz", "d.20140110.gz"]);
        for span in &spans {
            assert!(span.begin <= span.end);
            assert!(window.admits(span.begin, span.end));
        }
    }

    #[test]
    fn unparseable_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "e.20140101.gz", 10);
        write_file(tmp.path(), "README", 99);
        let spans = resolve(&descriptor(tmp.path(), true), &Window::default()).unwrap();
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn unknown_extractor_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let desc = Descriptor {
            extractor: Some("nope".to_string()),
            ..descriptor(tmp.path(), true)
        };
        assert!(resolve(&desc, &Window::default()).is_err());
    }
}
