//! Terminal formatting helpers

use chrono::{DateTime, Utc};
use console::{style, Emoji, StyledObject};
use legacy_sync::sync::{JobStatus, SyncJob, SyncJobId};

/// Marker for completed actions
pub static SUCCESS: Emoji = Emoji("✓", "√");
/// Marker for headings and hints
pub static INFO: Emoji = Emoji("ℹ", "i");
/// Marker for warnings
pub static WARNING: Emoji = Emoji("⚠", "!");

/// Width of table rules
pub const RULE_WIDTH: usize = 96;

/// Horizontal rule for tables
#[must_use]
pub fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

/// Status colored by outcome
#[must_use]
pub fn status_label(status: JobStatus) -> StyledObject<&'static str> {
    let label = style(status.as_str());
    match status {
        JobStatus::Pending => label.blue(),
        JobStatus::Retry => label.yellow(),
        JobStatus::Succeeded => label.green(),
        JobStatus::Failed => label.red(),
    }
}

/// Timestamp for display; the epoch sentinel of finished jobs shows as `-`
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    if at == DateTime::<Utc>::UNIX_EPOCH {
        "-".to_string()
    } else {
        at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// First block of a job id, enough to tell jobs apart in a listing
#[must_use]
pub fn short_id(id: SyncJobId) -> String {
    id.to_string().chars().take(8).collect()
}

/// Cut `text` to at most `max` characters, marking the cut with `…`
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

/// Table header matching [`job_row`]
#[must_use]
pub fn job_header() -> String {
    format!(
        "{:<10} {:>8} {:<8} {:<10} {:>8} {:<20} {}",
        "ID", "Store", "Change", "Status", "Attempts", "Next attempt", "Last error"
    )
}

/// One job as a table row, without colors
#[must_use]
pub fn job_row(job: &SyncJob) -> String {
    format!(
        "{:<10} {:>8} {:<8} {:<10} {:>8} {:<20} {}",
        short_id(job.id),
        job.store_id,
        job.change_type,
        job.status.as_str(),
        job.attempt_count,
        format_timestamp(job.next_attempt_at),
        truncate(job.last_error.as_deref().unwrap_or("-"), 32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use legacy_sync::sync::{ChangeEvent, ChangeType};

    #[test]
    fn test_epoch_renders_as_dash() {
        assert_eq!(format_timestamp(DateTime::<Utc>::UNIX_EPOCH), "-");

        let at = DateTime::parse_from_rfc3339("2024-03-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(at), "2024-03-01 12:30:00");
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("Amsterdam Zuid", 6), "Amste…");
        assert_eq!(truncate("ééééé", 3), "éé…");
    }

    #[test]
    fn test_job_row() {
        let event = ChangeEvent::new(42, ChangeType::Updated, Some(3));
        let job = SyncJob::from_event(&event, Utc::now());

        let row = job_row(&job);
        assert!(row.starts_with(&short_id(job.id)));
        assert!(row.contains("UPDATED"));
        assert!(row.contains("PENDING"));
        assert!(row.ends_with('-'));
        assert_eq!(short_id(job.id).len(), 8);
    }
}
