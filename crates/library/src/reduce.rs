use crate::analyze::ChangeKind;
use crate::import::ImportReport;
use quill_manifest::{Action, HistoryEntry, Manifest};
use time::OffsetDateTime;

/// Folds the outcome of an import into the manifest.
///
/// Successful pages get their new record; failed pages keep whatever record
/// they had. One history entry is appended, trimmed to `history_limit`.
pub fn reduce(
    mut manifest: Manifest,
    report: &ImportReport,
    action: Action,
    now: OffsetDateTime,
    history_limit: usize,
) -> Manifest {
    for outcome in &report.outcomes {
        manifest.pages.insert(outcome.page, outcome.record.clone());
    }
    if let Some(highest) = report.outcomes.iter().map(|o| o.page).max() {
        manifest.total_pages = manifest.total_pages.max(highest);
    }
    manifest.last_import = Some(now);
    manifest.record_history(
        HistoryEntry { timestamp: now, action, pages: report.pages(), summary: summarize(report) },
        history_limit,
    );
    manifest
}

/// `2 new, 1 modified, 0 unchanged, 1 failed`
fn summarize(report: &ImportReport) -> String {
    format!(
        "{} new, {} modified, {} unchanged, {} failed",
        report.count(ChangeKind::New),
        report.count(ChangeKind::Modified),
        report.count(ChangeKind::Unchanged),
        report.errors.len()
    )
}
