//! Removal of media files that no live record references anymore.
//!
//! A run builds two sets of storage-relative paths and deletes their
//! difference:
//!
//! * referenced: values of file columns, plus the *filename* of every
//!   `[legend](path)` found in Markdown columns;
//! * physical: every regular file below `top` (default: the storage root).
//!
//! Nothing is cached between runs. There is no lock either: a file uploaded
//! between the two snapshots and the deletion phase can be removed, so runs
//! are meant to be scheduled when traffic is low.

use crate::error::Result;
use crate::markdown::find_file_references;
use crate::services::log::Reporter;
use media_api::{join_path, Filter, RecordCatalogue, Storage, StorageError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, info_span};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionOutcome {
    pub deleted: usize,
    /// Files already gone when their deletion was attempted.
    pub not_found: usize,
    pub pruned_dirs: usize,
}

/// Summary of one collection run.
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub run_id: Uuid,
    pub top: Option<String>,
    pub dry_run: bool,
    pub referenced: usize,
    pub physical: usize,
    pub deletable: Vec<String>,
    pub outcome: DeletionOutcome,
    pub duration_ms: u64,
}

pub struct MediaCollector<'a> {
    catalogue: &'a dyn RecordCatalogue,
    storage: &'a dyn Storage,
    reporter: &'a dyn Reporter,
}

impl<'a> MediaCollector<'a> {
    pub fn new(
        catalogue: &'a dyn RecordCatalogue,
        storage: &'a dyn Storage,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            catalogue,
            storage,
            reporter,
        }
    }

    /// Paths still in use by at least one record.
    ///
    /// Catalogue errors are returned as is: skipping a column we cannot read
    /// would turn every file it references into a deletion candidate.
    pub fn collect_referenced_files(&self) -> Result<BTreeSet<String>> {
        let mut referenced = BTreeSet::new();

        for record in self.catalogue.record_types() {
            let file_fields: Vec<&str> = record.file_fields().map(|f| f.name.as_str()).collect();
            if !file_fields.is_empty() {
                // only rows with at least one non-empty file column
                let filter = Filter::any(file_fields.iter().map(|f| Filter::present(*f)));
                for field in &file_fields {
                    let values = self.catalogue.column_values(&record, field, &filter)?;
                    referenced.extend(values.into_iter().flatten().filter(|v| !v.is_empty()));
                }
            }

            for field in record.markdown_fields() {
                let texts = self
                    .catalogue
                    .column_values(&record, &field.name, &Filter::All)?;
                for text in texts.into_iter().flatten() {
                    referenced.extend(
                        find_file_references(&text)
                            .map(|r| r.filename().to_string())
                            .filter(|name| !name.is_empty()),
                    );
                }
            }
        }

        debug!("{} referenced paths collected", referenced.len());
        Ok(referenced)
    }

    /// Every regular file below `top`, relative to the storage root.
    /// Directories that cannot be listed are reported and skipped; a `top`
    /// escaping the root is an error.
    pub fn collect_physical_files(&self, top: Option<&str>) -> Result<BTreeSet<String>> {
        let mut physical = BTreeSet::new();
        let mut pending = vec![normalize_top(top)?];

        while let Some(dir) = pending.pop() {
            let listing = match self.storage.list_dir(&dir) {
                Ok(listing) => listing,
                Err(err) => {
                    self.reporter.on_listing_error(&dir, &err);
                    continue;
                }
            };
            for file in &listing.files {
                physical.insert(join_path(&dir, file));
            }
            for sub in &listing.dirs {
                pending.push(join_path(&dir, sub));
            }
        }

        Ok(physical)
    }

    /// Delete `deletable`, then remove directories left empty below `top`.
    ///
    /// Files that are already gone are counted, any other storage error
    /// aborts the batch.
    pub fn delete_files(
        &self,
        deletable: &BTreeSet<String>,
        top: Option<&str>,
    ) -> Result<DeletionOutcome> {
        let top = normalize_top(top)?;
        let mut outcome = DeletionOutcome::default();
        for path in deletable {
            match self.storage.delete(path) {
                Ok(()) => {
                    debug!("deleted {}", path);
                    outcome.deleted += 1;
                }
                Err(err) if err.is_not_found() => {
                    self.reporter.on_not_found(path);
                    outcome.not_found += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        outcome.pruned_dirs = self.prune_empty_dirs(Some(top.as_str()));
        Ok(outcome)
    }

    /// Remove empty directories bottom-up. `top` itself goes too once empty,
    /// the storage root never does. Failures are reported, not returned.
    pub fn prune_empty_dirs(&self, top: Option<&str>) -> usize {
        let top = match normalize_top(top) {
            Ok(top) => top,
            Err(err) => {
                self.reporter.on_prune_error(top.unwrap_or(""), &err);
                return 0;
            }
        };
        let mut dirs = Vec::new();
        if !top.is_empty() {
            dirs.push(top.clone());
        }

        // parents are always pushed before their children
        let mut pending = vec![top];
        while let Some(dir) = pending.pop() {
            match self.storage.list_dir(&dir) {
                Ok(listing) => {
                    for sub in listing.dirs {
                        let path = join_path(&dir, &sub);
                        dirs.push(path.clone());
                        pending.push(path);
                    }
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => self.reporter.on_prune_error(&dir, &err),
            }
        }

        let mut pruned = 0;
        for dir in dirs.iter().rev() {
            match self.storage.list_dir(dir) {
                Ok(listing) if listing.is_empty() => match self.storage.delete(dir) {
                    Ok(()) => {
                        debug!("removed empty directory {}", dir);
                        pruned += 1;
                    }
                    Err(err) => self.reporter.on_prune_error(dir, &err),
                },
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => self.reporter.on_prune_error(dir, &err),
            }
        }
        pruned
    }

    /// Find unused media files below `top` and delete them.
    pub fn run(&self, top: Option<&str>) -> Result<CleanReport> {
        self.execute(top, false)
    }

    /// Same as [`run`](Self::run) without deleting anything.
    pub fn preview(&self, top: Option<&str>) -> Result<CleanReport> {
        self.execute(top, true)
    }

    fn execute(&self, top: Option<&str>, dry_run: bool) -> Result<CleanReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("clean_media", %run_id);
        let _guard = span.enter();
        let started = Instant::now();
        let scope = normalize_top(top)?;
        let top = Some(scope.as_str()).filter(|s| !s.is_empty());
        info!(
            "looking for unused media in {} (top: {})",
            self.storage.location(),
            top.unwrap_or("/")
        );

        let referenced = self.collect_referenced_files()?;
        self.reporter.on_referenced(&referenced);
        let physical = self.collect_physical_files(top)?;
        self.reporter.on_physical(&physical);
        let deletable = compute_deletable(&physical, &referenced);

        let mut outcome = DeletionOutcome::default();
        if deletable.is_empty() {
            self.reporter.on_nothing_to_do();
        } else {
            self.reporter.on_deletable(&deletable);
            if dry_run {
                info!("dry run: {} file(s) left in place", deletable.len());
            } else {
                outcome = self.delete_files(&deletable, top)?;
                self.reporter.on_deleted(&outcome);
            }
        }

        Ok(CleanReport {
            run_id,
            top: top.map(str::to_string),
            dry_run,
            referenced: referenced.len(),
            physical: physical.len(),
            deletable: deletable.into_iter().collect(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Files present in storage that nothing references.
pub fn compute_deletable(
    physical: &BTreeSet<String>,
    referenced: &BTreeSet<String>,
) -> BTreeSet<String> {
    physical.difference(referenced).cloned().collect()
}

/// Canonical storage form of `top`, comparable with file column values:
/// empty and `.` segments dropped, `..` refused.
fn normalize_top(top: Option<&str>) -> std::result::Result<String, StorageError> {
    let Some(raw) = top else {
        return Ok(String::new());
    };
    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(StorageError::InvalidPath(raw.to_string())),
            segment => segments.push(segment),
        }
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::services::log::SilentReporter;
    use crate::services::storage::{LocalStorage, MemoryStorage};
    use std::fs;
    use media_api::{CatalogueError, FieldDescriptor, Listing, RecordType, StorageError};
    use parking_lot::Mutex;

    type Row = Vec<(&'static str, Option<&'static str>)>;

    /// Catalogue over rows kept in memory, filtered with `Filter::matches`.
    struct StaticCatalogue {
        types: Vec<RecordType>,
        rows: Vec<(&'static str, Row)>,
    }

    impl StaticCatalogue {
        fn new() -> Self {
            Self {
                types: vec![
                    RecordType::new(
                        "visits",
                        vec![
                            FieldDescriptor::other("title"),
                            FieldDescriptor::file("image"),
                            FieldDescriptor::file("fact_sheet"),
                        ],
                    ),
                    RecordType::new("documents", vec![FieldDescriptor::markdown("content")]),
                ],
                rows: Vec::new(),
            }
        }

        fn row(mut self, table: &'static str, row: Row) -> Self {
            self.rows.push((table, row));
            self
        }
    }

    impl RecordCatalogue for StaticCatalogue {
        fn record_types(&self) -> Vec<RecordType> {
            self.types.clone()
        }

        fn column_values(
            &self,
            record: &RecordType,
            column: &str,
            filter: &Filter,
        ) -> std::result::Result<Vec<Option<String>>, CatalogueError> {
            let mut values: Vec<Option<String>> = Vec::new();
            for (_, row) in self.rows.iter().filter(|(t, _)| *t == record.name) {
                let lookup = |c: &str| row.iter().find(|(k, _)| *k == c).and_then(|(_, v)| *v);
                if !filter.matches(&lookup) {
                    continue;
                }
                let value = lookup(column).map(str::to_string);
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            Ok(values)
        }
    }

    struct BrokenCatalogue;

    impl RecordCatalogue for BrokenCatalogue {
        fn record_types(&self) -> Vec<RecordType> {
            vec![RecordType::new("badges", vec![FieldDescriptor::file("icon")])]
        }

        fn column_values(
            &self,
            record: &RecordType,
            column: &str,
            _filter: &Filter,
        ) -> std::result::Result<Vec<Option<String>>, CatalogueError> {
            Err(CatalogueError::UnsupportedColumn {
                record: record.name.clone(),
                column: column.to_string(),
                declared: "BLOB".into(),
            })
        }
    }

    /// Memory storage whose listing fails for `broken_dir` and whose
    /// deletion fails for `locked_dir`.
    struct FlakyStorage<S> {
        inner: S,
        broken_dir: Option<&'static str>,
        locked_dir: Option<&'static str>,
    }

    impl<S: Storage> Storage for FlakyStorage<S> {
        fn location(&self) -> String {
            self.inner.location()
        }

        fn list_dir(&self, path: &str) -> std::result::Result<Listing, StorageError> {
            if self.broken_dir == Some(path) {
                return Err(StorageError::PermissionDenied(path.to_string()));
            }
            self.inner.list_dir(path)
        }

        fn exists(&self, path: &str) -> std::result::Result<bool, StorageError> {
            self.inner.exists(path)
        }

        fn delete(&self, path: &str) -> std::result::Result<(), StorageError> {
            if self.locked_dir == Some(path) {
                return Err(StorageError::PermissionDenied(path.to_string()));
            }
            self.inner.delete(path)
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<String>>,
    }

    impl Reporter for RecordingReporter {
        fn on_deletable(&self, files: &BTreeSet<String>) {
            self.events.lock().push(format!("deletable {}", files.len()));
        }

        fn on_nothing_to_do(&self) {
            self.events.lock().push("nothing".into());
        }

        fn on_listing_error(&self, dir: &str, _err: &StorageError) {
            self.events.lock().push(format!("listing {}", dir));
        }

        fn on_not_found(&self, path: &str) {
            self.events.lock().push(format!("not found {}", path));
        }

        fn on_prune_error(&self, dir: &str, _err: &StorageError) {
            self.events.lock().push(format!("prune {}", dir));
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn deletable_is_physical_minus_referenced() {
        let physical = set(&["a.png", "b.png", "dir/c.pdf"]);
        let referenced = set(&["a.png", "https://example.com/x.png", "missing.pdf"]);
        assert_eq!(
            compute_deletable(&physical, &referenced),
            set(&["b.png", "dir/c.pdf"])
        );
    }

    #[test]
    fn referenced_files_mix_columns_and_markdown_filenames() {
        let catalogue = StaticCatalogue::new()
            .row(
                "visits",
                vec![
                    ("title", Some("Airbus")),
                    ("image", Some("")),
                    ("fact_sheet", Some("visits/fact_sheets/a.pdf")),
                ],
            )
            .row("visits", vec![("title", Some("Empty")), ("image", None)])
            .row(
                "documents",
                vec![(
                    "content",
                    Some("![pic](sub/dir/photo.jpg) and [site](http://www.findithere.com)"),
                )],
            )
            .row("documents", vec![("content", None)]);
        let storage = MemoryStorage::new();
        let collector = MediaCollector::new(&catalogue, &storage, &SilentReporter);

        let referenced = collector.collect_referenced_files().unwrap();
        assert_eq!(
            referenced,
            set(&["visits/fact_sheets/a.pdf", "photo.jpg", "www.findithere.com"])
        );
        assert_eq!(referenced, collector.collect_referenced_files().unwrap());
    }

    #[test]
    fn catalogue_errors_abort_before_deleting() {
        let storage = MemoryStorage::with_files(["badges/icon.png"]);
        let collector = MediaCollector::new(&BrokenCatalogue, &storage, &SilentReporter);
        let err = collector.run(None).unwrap_err();
        assert!(matches!(err, Error::Catalogue(_)));
        assert_eq!(storage.files(), vec!["badges/icon.png"]);
    }

    #[test]
    fn unlistable_directory_is_skipped() {
        let storage = FlakyStorage {
            inner: MemoryStorage::with_files(["a/one.png", "b/two.png", "root.png"]),
            broken_dir: Some("b"),
            locked_dir: None,
        };
        let reporter = RecordingReporter::default();
        let catalogue = StaticCatalogue::new();
        let collector = MediaCollector::new(&catalogue, &storage, &reporter);

        let physical = collector.collect_physical_files(None).unwrap();
        assert_eq!(physical, set(&["a/one.png", "root.png"]));
        assert_eq!(*reporter.events.lock(), vec!["listing b".to_string()]);
    }

    #[test]
    fn physical_files_are_scoped_by_top() {
        let storage = MemoryStorage::with_files(["scratch/x.txt", "scratch/deep/y.txt", "keep.txt"]);
        let catalogue = StaticCatalogue::new();
        let collector = MediaCollector::new(&catalogue, &storage, &SilentReporter);
        assert_eq!(
            collector.collect_physical_files(Some("/scratch/")).unwrap(),
            set(&["scratch/deep/y.txt", "scratch/x.txt"])
        );
    }

    #[test]
    fn top_is_made_canonical() {
        assert_eq!(normalize_top(None).unwrap(), "");
        assert_eq!(normalize_top(Some("./visits")).unwrap(), "visits");
        assert_eq!(normalize_top(Some("visits/./x")).unwrap(), "visits/x");
        assert_eq!(normalize_top(Some("/visits//x/")).unwrap(), "visits/x");
        assert_eq!(normalize_top(Some(".")).unwrap(), "");
        assert!(matches!(
            normalize_top(Some("visits/../..")),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn dotted_top_keeps_referenced_files() {
        let catalogue = StaticCatalogue::new().row(
            "visits",
            vec![("fact_sheet", Some("visits/fact_sheets/a.pdf"))],
        );
        let storage =
            MemoryStorage::with_files(["visits/fact_sheets/a.pdf", "visits/orphan.txt"]);
        let collector = MediaCollector::new(&catalogue, &storage, &SilentReporter);

        let report = collector.run(Some("./visits")).unwrap();
        assert_eq!(report.top.as_deref(), Some("visits"));
        assert_eq!(report.deletable, vec!["visits/orphan.txt"]);
        assert_eq!(storage.files(), vec!["visits/fact_sheets/a.pdf"]);
    }

    #[test]
    fn escaping_top_fails_before_listing() {
        let storage = MemoryStorage::with_files(["misc/orphan.txt"]);
        let reporter = RecordingReporter::default();
        let catalogue = StaticCatalogue::new();
        let collector = MediaCollector::new(&catalogue, &storage, &reporter);

        let err = collector.run(Some("misc/../..")).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::InvalidPath(_))));
        assert!(collector.delete_files(&set(&["misc/orphan.txt"]), Some("..")).is_err());
        assert_eq!(storage.files(), vec!["misc/orphan.txt"]);
        assert!(reporter.events.lock().is_empty());
    }

    #[test]
    fn prune_failures_are_not_fatal() {
        // implied directories of MemoryStorage are never empty, use the disk
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("misc/locked")).unwrap();
        fs::create_dir_all(dir.path().join("misc/empty")).unwrap();
        fs::write(dir.path().join("misc/orphan.txt"), b"x").unwrap();
        let storage = FlakyStorage {
            inner: LocalStorage::new(dir.path()),
            broken_dir: None,
            locked_dir: Some("misc/locked"),
        };
        let reporter = RecordingReporter::default();
        let catalogue = StaticCatalogue::new();
        let collector = MediaCollector::new(&catalogue, &storage, &reporter);

        let outcome = collector
            .delete_files(&set(&["misc/orphan.txt"]), None)
            .unwrap();
        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.not_found, 0);
        assert_eq!(outcome.pruned_dirs, 1);
        assert!(!dir.path().join("misc/empty").exists());
        assert!(dir.path().join("misc/locked").exists());
        assert_eq!(*reporter.events.lock(), vec!["prune misc/locked".to_string()]);
    }

    #[test]
    fn vanished_files_are_counted_not_fatal() {
        let storage = MemoryStorage::with_files(["misc/orphan.txt"]);
        let reporter = RecordingReporter::default();
        let catalogue = StaticCatalogue::new();
        let collector = MediaCollector::new(&catalogue, &storage, &reporter);

        let outcome = collector
            .delete_files(&set(&["gone.txt", "misc/orphan.txt"]), None)
            .unwrap();
        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.not_found, 1);
        assert!(storage.files().is_empty());
        assert!(reporter.events.lock().contains(&"not found gone.txt".to_string()));
    }

    #[test]
    fn other_delete_errors_propagate() {
        let storage = MemoryStorage::with_files(["visits/a.png"]);
        let catalogue = StaticCatalogue::new();
        let collector = MediaCollector::new(&catalogue, &storage, &SilentReporter);
        let err = collector.delete_files(&set(&["visits"]), None).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Io { .. })));
    }

    #[test]
    fn preview_leaves_files_in_place() {
        let storage = MemoryStorage::with_files(["misc/orphan.txt"]);
        let catalogue = StaticCatalogue::new();
        let collector = MediaCollector::new(&catalogue, &storage, &SilentReporter);

        let report = collector.preview(None).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.deletable, vec!["misc/orphan.txt"]);
        assert_eq!(report.outcome, DeletionOutcome::default());
        assert_eq!(storage.files(), vec!["misc/orphan.txt"]);
    }

    #[test]
    fn nothing_to_do_is_reported() {
        let catalogue = StaticCatalogue::new().row(
            "visits",
            vec![("image", Some("visits/images/a.png"))],
        );
        let storage = MemoryStorage::with_files(["visits/images/a.png"]);
        let reporter = RecordingReporter::default();
        let collector = MediaCollector::new(&catalogue, &storage, &reporter);

        let report = collector.run(None).unwrap();
        assert!(report.deletable.is_empty());
        assert_eq!(report.outcome.deleted, 0);
        assert_eq!(*reporter.events.lock(), vec!["nothing".to_string()]);
    }
}
