use crate::collector::DeletionOutcome;
use media_api::StorageError;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Receives the progress of a media collection run.
///
/// All methods default to no-ops so implementations only pick what they need.
/// `on_listing_error` is the callback for directories the walk had to skip.
pub trait Reporter: Send + Sync {
    fn on_referenced(&self, _files: &BTreeSet<String>) {}
    fn on_physical(&self, _files: &BTreeSet<String>) {}
    fn on_deletable(&self, _files: &BTreeSet<String>) {}
    fn on_nothing_to_do(&self) {}
    fn on_listing_error(&self, _dir: &str, _err: &StorageError) {}
    fn on_not_found(&self, _path: &str) {}
    fn on_prune_error(&self, _dir: &str, _err: &StorageError) {}
    fn on_deleted(&self, _outcome: &DeletionOutcome) {}
}

/// Reporter for unattended runs.
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// Reporter writing through `tracing`.
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn on_referenced(&self, files: &BTreeSet<String>) {
        info!("{} media file(s) referenced by records", files.len());
        debug!("referenced: {:?}", files);
    }

    fn on_physical(&self, files: &BTreeSet<String>) {
        info!("{} media file(s) found in storage", files.len());
        debug!("physical: {:?}", files);
    }

    fn on_deletable(&self, files: &BTreeSet<String>) {
        warn!("Unused media files were detected:");
        for file in files {
            warn!("  {}", file);
        }
    }

    fn on_nothing_to_do(&self) {
        info!("No unused media files detected.");
    }

    fn on_listing_error(&self, dir: &str, err: &StorageError) {
        error!("skipping directory '{}': {}", dir, err);
    }

    fn on_not_found(&self, path: &str) {
        warn!("'{}' disappeared before it could be deleted", path);
    }

    fn on_prune_error(&self, dir: &str, err: &StorageError) {
        warn!("could not remove empty directory '{}': {}", dir, err);
    }

    fn on_deleted(&self, outcome: &DeletionOutcome) {
        info!("Removed {} unused media file(s).", outcome.deleted);
        if outcome.not_found > 0 {
            error!(
                "{} unused media file(s) failed to be deleted.",
                outcome.not_found
            );
        }
        if outcome.pruned_dirs > 0 {
            info!("Removed {} empty director(ies).", outcome.pruned_dirs);
        }
    }
}
