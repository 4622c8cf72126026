#[cfg(feature = "colored-output")]
use colored::*;
use loantrek::api::{DashboardStats, OverdueLoan, Settings};
use loantrek::config::IntervalPreset;
use loantrek::notification::{NotificationPhase, NotificationSnapshot};
use std::fmt::Write;
use std::time::Duration;
#[cfg(feature = "table-output")]
use tabled::{Table, Tabled, settings::Style};

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    /// Summary line, staleness notice and the panel items.
    pub fn format_snapshot(&self, snapshot: &NotificationSnapshot) -> String {
        let mut output = String::new();

        output.push_str(&self.colorize("Overdue loans:", &Color::Green, true));
        match snapshot.phase {
            NotificationPhase::Loading => output.push_str(" not loaded yet\n"),
            NotificationPhase::Ready | NotificationPhase::Stale => {
                let unread = format!("{} unread", snapshot.unread_count);
                let _ = writeln!(
                    output,
                    " {} ({})",
                    snapshot.total_overdue,
                    self.colorize(&unread, &Color::Yellow, snapshot.unread_count > 0)
                );
            }
        }

        if snapshot.phase == NotificationPhase::Stale {
            output.push_str(&self.colorize(
                "Showing the last known list, the latest refresh failed",
                &Color::Red,
                true,
            ));
            output.push('\n');
        }
        if let Some(error) = &snapshot.last_error {
            let _ = writeln!(
                output,
                "{}: {error}",
                self.colorize("Last error", &Color::Red, false)
            );
        }

        if !snapshot.displayed_items.is_empty() {
            output.push_str(&self.format_loans(snapshot));
        }

        let hidden = snapshot
            .total_overdue
            .saturating_sub(snapshot.displayed_items.len());
        if hidden > 0 {
            let _ = writeln!(output, "... and {hidden} more");
        }

        output
    }

    #[cfg(feature = "table-output")]
    fn format_loans(&self, snapshot: &NotificationSnapshot) -> String {
        #[derive(Tabled)]
        struct LoanRow<'a> {
            #[tabled(rename = "")]
            marker: String,
            #[tabled(rename = "ID")]
            id: &'a str,
            #[tabled(rename = "Equipment")]
            equipment: String,
            #[tabled(rename = "Borrower")]
            borrower: &'a str,
            #[tabled(rename = "Due")]
            due: String,
            #[tabled(rename = "Days overdue")]
            days_overdue: i64,
        }

        let rows = snapshot.displayed_items.iter().map(|loan| LoanRow {
            marker: self.unread_marker(snapshot.is_read(&loan.id)),
            id: &loan.id,
            equipment: equipment_label(loan),
            borrower: &loan.borrower_name,
            due: due_date(loan),
            days_overdue: loan.days_overdue,
        });

        let mut table = Table::new(rows).with(Style::modern()).to_string();
        table.push('\n');
        table
    }

    #[cfg(not(feature = "table-output"))]
    fn format_loans(&self, snapshot: &NotificationSnapshot) -> String {
        let mut output = String::new();
        for loan in &snapshot.displayed_items {
            let marker = self.unread_marker(snapshot.is_read(&loan.id));
            let _ = writeln!(
                output,
                "{marker} [{}] {} - {}, due {}, {} day(s) overdue",
                loan.id,
                equipment_label(loan),
                loan.borrower_name,
                due_date(loan),
                loan.days_overdue
            );
        }
        output
    }

    fn unread_marker(&self, read: bool) -> String {
        if read {
            " ".to_string()
        } else {
            self.colorize("●", &Color::Yellow, true)
        }
    }

    /// One line for the `watch` loop when the badge changes.
    pub fn format_badge(&self, snapshot: &NotificationSnapshot) -> String {
        let unread = format!("{} unread", snapshot.unread_count);
        let unread = self.colorize(&unread, &Color::Yellow, snapshot.unread_count > 0);
        match snapshot.phase {
            NotificationPhase::Loading => "Waiting for the first overdue check".to_string(),
            NotificationPhase::Ready => {
                format!("{unread} of {} overdue loan(s)", snapshot.total_overdue)
            }
            NotificationPhase::Stale => {
                format!("{unread} {}", self.colorize("(stale)", &Color::Red, false))
            }
        }
    }

    pub fn format_settings(&self, settings: &Settings, effective: Duration) -> String {
        let hours = match settings.check_interval_hours {
            Some(hours) => format!("{hours} hour(s)"),
            None => "not set".to_string(),
        };

        let mut output = String::new();
        output.push_str(&self.colorize("Settings:", &Color::Green, true));
        output.push('\n');
        let _ = writeln!(
            output,
            "  {}: {}",
            self.colorize("Check interval", &Color::Yellow, false),
            self.colorize(&hours, &Color::Cyan, false)
        );
        let _ = writeln!(
            output,
            "  {}: {}",
            self.colorize("Effective poll interval", &Color::Yellow, false),
            self.colorize(&format_duration(effective), &Color::Cyan, false)
        );
        if let Some(updated_at) = &settings.updated_at {
            let _ = writeln!(
                output,
                "  {}: {}",
                self.colorize("Last updated", &Color::Yellow, false),
                self.colorize(updated_at, &Color::Cyan, false)
            );
        }
        output
    }

    #[cfg(feature = "table-output")]
    pub fn format_presets(&self, presets: &[IntervalPreset], current: Option<f64>) -> String {
        #[derive(Tabled)]
        struct PresetRow {
            #[tabled(rename = "")]
            current: String,
            #[tabled(rename = "Hours")]
            hours: f64,
            #[tabled(rename = "Interval")]
            label: &'static str,
        }

        let rows = presets.iter().map(|preset| PresetRow {
            current: self.current_marker(current == Some(preset.hours)),
            hours: preset.hours,
            label: preset.label,
        });

        let mut table = Table::new(rows).with(Style::modern()).to_string();
        table.push('\n');
        table
    }

    #[cfg(not(feature = "table-output"))]
    pub fn format_presets(&self, presets: &[IntervalPreset], current: Option<f64>) -> String {
        let mut output = String::new();
        for preset in presets {
            let marker = self.current_marker(current == Some(preset.hours));
            let _ = writeln!(output, "{marker} {} ({}h)", preset.label, preset.hours);
        }
        output
    }

    fn current_marker(&self, current: bool) -> String {
        if current {
            self.colorize("*", &Color::Green, true)
        } else {
            " ".to_string()
        }
    }

    #[cfg(feature = "table-output")]
    pub fn format_stats(&self, stats: &DashboardStats) -> String {
        #[derive(Tabled)]
        struct StatRow {
            #[tabled(rename = "Equipment")]
            property: &'static str,
            #[tabled(rename = "Count")]
            value: u64,
        }

        let rows = stat_rows(stats)
            .into_iter()
            .map(|(property, value)| StatRow { property, value });

        let mut table = Table::new(rows).with(Style::modern()).to_string();
        table.push('\n');
        table
    }

    #[cfg(not(feature = "table-output"))]
    pub fn format_stats(&self, stats: &DashboardStats) -> String {
        let mut output = String::new();
        for (property, value) in stat_rows(stats) {
            let _ = writeln!(
                output,
                "  {}: {}",
                self.colorize(property, &Color::Yellow, false),
                self.colorize(&value.to_string(), &Color::Cyan, false)
            );
        }
        output
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Red => text.red(),
                    Color::Cyan => text.cyan(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Red,
    Cyan,
}

fn equipment_label(loan: &OverdueLoan) -> String {
    if loan.model.is_empty() {
        loan.name.clone()
    } else {
        format!("{} ({})", loan.name, loan.model)
    }
}

/// Calendar date of the expected return, or the raw value when unparseable.
fn due_date(loan: &OverdueLoan) -> String {
    match loan.expected_return() {
        Some(due) => due.format("%Y-%m-%d").to_string(),
        None if loan.expected_return_date.trim().is_empty() => "-".to_string(),
        None => loan.expected_return_date.clone(),
    }
}

fn stat_rows(stats: &DashboardStats) -> [(&'static str, u64); 5] {
    [
        ("Total", stats.total_equipment),
        ("Available", stats.available),
        ("On loan", stats.on_loan),
        ("Maintenance", stats.maintenance),
        ("Overdue", stats.overdue),
    ]
}

pub fn format_duration(interval: Duration) -> String {
    let secs = interval.as_secs();
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (h, 0, 0) if h > 0 => format!("{h}h"),
        (0, m, 0) if m > 0 => format!("{m}m"),
        (0, 0, s) => format!("{s}s"),
        (h, m, _) => format!("{h}h{m:02}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loan(id: &str, days: i64) -> OverdueLoan {
        OverdueLoan {
            id: id.to_string(),
            name: format!("Camera {id}"),
            model: "EOS R5".to_string(),
            borrower_name: "Sam Taylor".to_string(),
            borrower_email: "sam@example.com".to_string(),
            expected_return_date: "2024-03-01T17:30:00".to_string(),
            days_overdue: days,
            status: "overdue".to_string(),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(900)), "15m");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
    }

    #[test]
    fn test_due_date_uses_parsed_timestamp() {
        assert_eq!(due_date(&loan("1", 2)), "2024-03-01");

        let mut raw = loan("2", 2);
        raw.expected_return_date = "next week".to_string();
        assert_eq!(due_date(&raw), "next week");

        raw.expected_return_date = String::new();
        assert_eq!(due_date(&raw), "-");
    }

    #[test]
    fn test_format_snapshot_lists_panel_and_remainder() {
        let items: Vec<_> = (1..=5).map(|i| loan(&i.to_string(), 3)).collect();
        let snapshot = NotificationSnapshot {
            phase: NotificationPhase::Stale,
            unread_count: 6,
            unread_items: items.clone(),
            displayed_items: items,
            total_overdue: 7,
            last_refreshed_at: None,
            last_error: Some("connection refused".to_string()),
        };

        let text = OutputManager::new(false).format_snapshot(&snapshot);
        assert!(text.starts_with("Overdue loans: 7 (6 unread)"));
        assert!(text.contains("last known list"));
        assert!(text.contains("connection refused"));
        assert!(text.contains("Camera 5 (EOS R5)"));
        assert!(text.contains("2024-03-01"));
        assert!(text.contains("... and 2 more"));
    }

    #[test]
    fn test_format_badge() {
        let output = OutputManager::new(false);
        let mut snapshot = NotificationSnapshot {
            phase: NotificationPhase::Loading,
            unread_count: 0,
            unread_items: Vec::new(),
            displayed_items: Vec::new(),
            total_overdue: 0,
            last_refreshed_at: None,
            last_error: None,
        };
        assert_eq!(output.format_badge(&snapshot), "Waiting for the first overdue check");

        snapshot.phase = NotificationPhase::Ready;
        snapshot.unread_count = 2;
        snapshot.total_overdue = 7;
        assert_eq!(output.format_badge(&snapshot), "2 unread of 7 overdue loan(s)");
    }

    #[test]
    fn test_format_presets_marks_current() {
        let presets = [
            IntervalPreset {
                hours: 0.25,
                label: "Every 15 minutes",
            },
            IntervalPreset {
                hours: 1.0,
                label: "Every hour",
            },
        ];

        let text = OutputManager::new(false).format_presets(&presets, Some(1.0));
        let current = text.lines().find(|l| l.contains("Every hour")).unwrap();
        assert!(current.contains('*'));
        let other = text.lines().find(|l| l.contains("Every 15 minutes")).unwrap();
        assert!(!other.contains('*'));
    }

    #[test]
    fn test_format_stats() {
        let stats = DashboardStats {
            total_equipment: 12,
            available: 7,
            on_loan: 4,
            maintenance: 1,
            overdue: 2,
        };

        let text = OutputManager::new(false).format_stats(&stats);
        let on_loan = text.lines().find(|l| l.contains("On loan")).unwrap();
        assert!(on_loan.contains('4'));
        assert!(text.contains("Maintenance"));
    }
}
