// src/notifications.rs
use chrono::NaiveDate;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    DraftSaved,
    TimesheetSubmitted,
    ValidationCompleted,
    TimesheetApproved,
    TimesheetRejected,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub recipient: String,
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn draft_saved(recipient: &str, week_start: NaiveDate) -> Self {
        Self {
            recipient: recipient.to_string(),
            kind: NotificationKind::DraftSaved,
            subject: "Timesheet draft saved".to_string(),
            body: format!("Your draft for the week of {} has been saved.", week_start),
        }
    }

    pub fn submitted(recipient: &str, week_start: NaiveDate) -> Self {
        Self {
            recipient: recipient.to_string(),
            kind: NotificationKind::TimesheetSubmitted,
            subject: "Timesheet submitted".to_string(),
            body: format!(
                "Your timesheet for the week of {} has been submitted for validation.",
                week_start
            ),
        }
    }

    pub fn validation_completed(recipient: &str, week_start: NaiveDate, message: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            kind: NotificationKind::ValidationCompleted,
            subject: "Timesheet validation completed".to_string(),
            body: format!("Week of {}: {}", week_start, message),
        }
    }

    pub fn approved(recipient: &str, week_start: NaiveDate) -> Self {
        Self {
            recipient: recipient.to_string(),
            kind: NotificationKind::TimesheetApproved,
            subject: "Timesheet approved".to_string(),
            body: format!("Your timesheet for the week of {} has been approved.", week_start),
        }
    }

    pub fn rejected(recipient: &str, week_start: NaiveDate, note: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            kind: NotificationKind::TimesheetRejected,
            subject: "Timesheet rejected".to_string(),
            body: format!(
                "Your timesheet for the week of {} was rejected: {}",
                week_start, note
            ),
        }
    }
}

/// Delivery contract for user-facing notices. The transport (SMTP or
/// otherwise) lives behind this trait.
pub trait NotificationService: Send + Sync {
    fn send(&self, notification: Notification);
}

/// Logs each notice instead of delivering it.
pub struct LogNotifier;

impl NotificationService for LogNotifier {
    fn send(&self, notification: Notification) {
        info!(
            "NOTIFICATION to {}: {} - {}",
            notification.recipient, notification.subject, notification.body
        );
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingNotifier;
    use super::*;
    use chrono::NaiveDate;

    fn week_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn test_builders_address_the_recipient() {
        let n = Notification::rejected("a@example.com", week_start(), "hours do not add up");
        assert_eq!(n.recipient, "a@example.com");
        assert_eq!(n.kind, NotificationKind::TimesheetRejected);
        assert!(n.body.contains("hours do not add up"));
        assert!(n.body.contains("2024-03-04"));
    }

    #[test]
    fn test_recording_notifier_counts_by_kind() {
        let notifier = RecordingNotifier::new();
        notifier.send(Notification::draft_saved("a@example.com", week_start()));
        notifier.send(Notification::submitted("a@example.com", week_start()));
        notifier.send(Notification::validation_completed(
            "a@example.com",
            week_start(),
            "Validation completed",
        ));

        assert_eq!(notifier.sent().len(), 3);
        assert_eq!(notifier.count_of(NotificationKind::DraftSaved), 1);
        assert_eq!(notifier.count_of(NotificationKind::TimesheetApproved), 0);
        notifier.expect_sent(NotificationKind::TimesheetSubmitted, "a@example.com");
    }
}
