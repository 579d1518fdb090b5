use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::models::{IdentityKey, JobRecord};
use crate::table::JobTable;

/// What happens when a scraped row has the same key as a stored one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// The scraped row replaces the stored row outright, `Applied` included.
    #[default]
    ScrapedWins,
    /// The scraped row replaces the stored row, but a stored `Applied = true`
    /// is carried over.
    KeepApplied,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub new_rows: usize,
    pub stored_rows: usize,
    pub written_rows: usize,
    /// Stored rows with `Applied = true` replaced by a scraped row.
    pub applied_overwritten: usize,
}

/// Reads the durable table. `Ok(None)` means the file does not exist.
pub fn load(path: &Path) -> Result<Option<Vec<JobRecord>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open {}", path.display()));
        }
    };

    let mut reader = csv::Reader::from_reader(file);
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<JobRecord>, _>>()
        .with_context(|| format!("Failed to read job table: {}", path.display()))?;
    Ok(Some(rows))
}

/// Merges the run's rows into the durable table at `path` and rewrites it.
///
/// New rows come first; a stored row survives only if no new row (and no
/// earlier stored row) has its key. Duplicates within the run collapse too,
/// so flushing the same table twice leaves the file unchanged.
pub fn flush(table: &JobTable, path: &Path, policy: MergePolicy) -> Result<FlushStats> {
    let new_rows = table.snapshot();

    let stored = load(path)?.unwrap_or_else(|| {
        debug!("No existing table at {}, creating it", path.display());
        Vec::new()
    });
    let (merged, stats) = merge_rows(new_rows, stored, policy);

    write_atomic(&merged, path)?;
    info!(
        "Wrote {} rows to {} ({} scraped, {} previously stored)",
        stats.written_rows,
        path.display(),
        stats.new_rows,
        stats.stored_rows
    );
    Ok(stats)
}

/// Concatenates `new_rows` then `stored` and keeps the first row per key.
pub fn merge_rows(
    new_rows: Vec<JobRecord>,
    stored: Vec<JobRecord>,
    policy: MergePolicy,
) -> (Vec<JobRecord>, FlushStats) {
    let mut stats = FlushStats {
        new_rows: new_rows.len(),
        stored_rows: stored.len(),
        ..Default::default()
    };

    let mut kept: HashMap<IdentityKey, usize> = HashMap::new();
    let mut merged: Vec<JobRecord> = Vec::with_capacity(new_rows.len() + stored.len());

    for row in new_rows {
        if let Entry::Vacant(slot) = kept.entry(row.key()) {
            slot.insert(merged.len());
            merged.push(row);
        }
    }
    let scraped = merged.len();

    for row in stored {
        let idx = match kept.entry(row.key()) {
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(row);
                continue;
            }
            Entry::Occupied(slot) => *slot.get(),
        };

        // Superseded by a scraped row: only an applied mark is at stake.
        if idx >= scraped || !row.applied || merged[idx].applied {
            continue;
        }
        match policy {
            MergePolicy::ScrapedWins => {
                stats.applied_overwritten += 1;
                warn!("Applied mark dropped for re-scraped posting: {}", row.key());
            }
            MergePolicy::KeepApplied => merged[idx].applied = true,
        }
    }

    stats.written_rows = merged.len();
    (merged, stats)
}

/// Writes `rows` to a temp file beside `path`, then renames it into place.
pub fn write_atomic(rows: &[JobRecord], path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file_mut());
        if rows.is_empty() {
            writer.write_record(COLUMNS)?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;

    // The temp file is created 0600; keep whatever mode the table already had.
    match fs::metadata(path) {
        Ok(meta) => temp.as_file().set_permissions(meta.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to stat {}", path.display()));
        }
    }

    temp.persist(path)
        .map_err(|e| anyhow!("Failed to replace {}: {}", path.display(), e.error))?;
    Ok(())
}

/// Sets or clears `Applied` on the row at `index` (0-based) and rewrites the table.
pub fn mark_applied(path: &Path, index: usize, applied: bool) -> Result<JobRecord> {
    let mut rows = load(path)?.ok_or_else(|| anyhow!("No job table at {}", path.display()))?;
    let row = rows
        .get_mut(index)
        .ok_or_else(|| anyhow!("Row {} not found in {}", index + 1, path.display()))?;
    row.applied = applied;
    let updated = row.clone();

    write_atomic(&rows, path)?;
    Ok(updated)
}

pub const COLUMNS: [&str; 9] = [
    "Title",
    "Company",
    "Place",
    "Date",
    "Link",
    "Experience",
    "Stack",
    "Description",
    "Applied",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Posting;
    use tempfile::TempDir;

    fn record(title: &str, company: &str, place: &str, applied: bool) -> JobRecord {
        let mut record = JobRecord::from_posting(
            Posting {
                title: title.to_string(),
                company: company.to_string(),
                place: place.to_string(),
                date: "2024-03-01".to_string(),
                link: format!("https://www.linkedin.com/jobs/view/{}", title),
                description: "Python, Django, 2 years experience".to_string(),
            },
            vec!["python".to_string(), "django".to_string()],
            Some(2),
        );
        record.applied = applied;
        record
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load(&dir.path().join("absent.csv")).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");
        fs::write(&path, "Title,Company\n\"unterminated,Acme\nx\n").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn test_flush_fails_on_unreadable_path() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be: not NotFound, must propagate
        let path = dir.path().join("jobs.csv");
        fs::create_dir(&path).unwrap();

        let table = JobTable::from(vec![record("A", "B", "C", false)]);
        assert!(flush(&table, &path, MergePolicy::ScrapedWins).is_err());
    }

    #[test]
    fn test_flush_creates_file_with_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");
        let table = JobTable::from(vec![record("A", "B", "C", false)]);

        let stats = flush(&table, &path, MergePolicy::ScrapedWins).unwrap();
        assert_eq!(stats.written_rows, 1);

        let content = fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(header, COLUMNS.join(","));
        assert!(content.contains("\"python, django\""));
        assert!(content.contains(",2,"));
        assert!(content.trim_end().ends_with(",false"));
    }

    #[test]
    fn test_flush_empty_table_writes_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");

        flush(&JobTable::new(), &path, MergePolicy::ScrapedWins).unwrap();
        assert_eq!(load(&path).unwrap(), Some(vec![]));
    }

    #[test]
    fn test_flush_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");
        let table = JobTable::from(vec![
            record("A", "B", "C", false),
            record("D", "E", "F", false),
            record("A", "B", "C", false),
        ]);

        flush(&table, &path, MergePolicy::ScrapedWins).unwrap();
        let first = fs::read(&path).unwrap();
        flush(&table, &path, MergePolicy::ScrapedWins).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(load(&path).unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_flush_merges_with_stored_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");
        write_atomic(&[record("Old", "X", "Y", true)], &path).unwrap();

        let table = JobTable::from(vec![record("New", "X", "Y", false)]);
        let stats = flush(&table, &path, MergePolicy::ScrapedWins).unwrap();

        assert_eq!(stats.stored_rows, 1);
        let rows = load(&path).unwrap().unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Old"]);
        assert!(rows[1].applied);
    }

    #[test]
    fn test_scraped_row_overwrites_applied_mark() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");
        write_atomic(&[record("A", "B", "C", true)], &path).unwrap();

        let table = JobTable::from(vec![record("A", "B", "C", false)]);
        let stats = flush(&table, &path, MergePolicy::ScrapedWins).unwrap();

        assert_eq!(stats.applied_overwritten, 1);
        let rows = load(&path).unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], record("A", "B", "C", false));
    }

    #[test]
    fn test_keep_applied_carries_mark_forward() {
        let mut updated = record("A", "B", "C", false);
        updated.link = "https://new-link".to_string();

        let (merged, stats) = merge_rows(
            vec![updated],
            vec![record("A", "B", "C", true)],
            MergePolicy::KeepApplied,
        );

        assert_eq!(stats.applied_overwritten, 0);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].applied);
        assert_eq!(merged[0].link, "https://new-link");
    }

    #[test]
    fn test_merge_dedups_stored_rows_keeping_first() {
        let (merged, _) = merge_rows(
            vec![],
            vec![record("A", "B", "C", false), record("A", "B", "C", true)],
            MergePolicy::KeepApplied,
        );
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].applied);
    }

    #[test]
    fn test_load_accepts_hand_edited_applied_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");
        fs::write(
            &path,
            "Title,Company,Place,Date,Link,Experience,Stack,Description,Applied\n\
             A,B,C,2024-03-01,https://a,,python,desc,TRUE\n\
             D,E,F,2024-03-01,https://d,3,\"react, django\",desc,\n",
        )
        .unwrap();

        let rows = load(&path).unwrap().unwrap();
        assert!(rows[0].applied);
        assert_eq!(rows[0].experience_years, None);
        assert!(!rows[1].applied);
        assert_eq!(rows[1].experience_years, Some(3));
        assert_eq!(rows[1].stack, vec!["react", "django"]);
    }

    #[test]
    fn test_mark_applied_updates_single_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");
        write_atomic(
            &[record("A", "B", "C", false), record("D", "E", "F", false)],
            &path,
        )
        .unwrap();

        let updated = mark_applied(&path, 1, true).unwrap();
        assert_eq!(updated.title, "D");

        let rows = load(&path).unwrap().unwrap();
        assert!(!rows[0].applied);
        assert!(rows[1].applied);

        assert!(mark_applied(&path, 5, true).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_flush_preserves_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");
        write_atomic(&[record("A", "B", "C", false)], &path).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let table = JobTable::from(vec![record("D", "E", "F", false)]);
        flush(&table, &path, MergePolicy::ScrapedWins).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);

        mark_applied(&path, 0, true).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.csv");
        write_atomic(&[record("A", "B", "C", false)], &path).unwrap();
        write_atomic(&[record("D", "E", "F", false)], &path).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
