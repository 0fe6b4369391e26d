use shiftsql_db::{MigrationState, StatusReport};

use crate::commands::Outcome;

pub fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Up(report) if report.applied.is_empty() => {
            println!("No pending migrations.");
        }
        Outcome::Up(report) => {
            println!("Applied {} migration(s):", report.applied.len());
            for m in &report.applied {
                println!("  {} {}", m.version, m.name);
            }
        }
        Outcome::Down(None) => println!("No migrations to roll back."),
        Outcome::Down(Some(m)) => println!("Rolled back {} {}", m.version, m.name),
        Outcome::Status(report) => print!("{}", status_table(report)),
        Outcome::Reset(report) if report.rolled_back.is_empty() => {
            println!("No migrations to reset.");
        }
        Outcome::Reset(report) => {
            println!("Rolled back {} migration(s):", report.rolled_back.len());
            for m in &report.rolled_back {
                println!("  {} {}", m.version, m.name);
            }
        }
    }
}

/// Render the status report as an aligned text table.
pub fn status_table(report: &StatusReport) -> String {
    let mut out = String::new();

    if report.entries.is_empty() {
        out.push_str("No migrations found.\n");
    } else {
        let version_w = report
            .entries
            .iter()
            .map(|e| e.version.to_string().len())
            .chain(["VERSION".len()])
            .max()
            .unwrap_or_default();
        let name_w = report
            .entries
            .iter()
            .map(|e| e.name.len())
            .chain(["NAME".len()])
            .max()
            .unwrap_or_default();

        out.push_str(&format!(
            "{:<version_w$}  {:<name_w$}  {:<7}  APPLIED AT\n",
            "VERSION", "NAME", "STATE"
        ));
        for e in &report.entries {
            let applied_at = e
                .applied_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:<version_w$}  {:<name_w$}  {:<7}  {applied_at}\n",
                e.version,
                e.name,
                e.state.to_string()
            ));
        }

        out.push_str(&format!(
            "\n{} applied, {} pending\n",
            report.count(MigrationState::Applied),
            report.count(MigrationState::Pending)
        ));
    }

    if !report.orphaned.is_empty() {
        out.push_str(&format!(
            "\nApplied without a migration file ({}):\n",
            report.orphaned.len()
        ));
        for r in &report.orphaned {
            out.push_str(&format!("  {} {}\n", r.version, r.name));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::status_table;
    use shiftsql_db::migrations::{AppliedRecord, MigrationState, StatusEntry, StatusReport};
    use chrono::{TimeZone, Utc};

    #[test]
    fn renders_aligned_rows_and_summary() {
        let applied_at = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        let report = StatusReport {
            entries: vec![
                StatusEntry {
                    version: 1,
                    name: "create_users".to_string(),
                    state: MigrationState::Applied,
                    applied_at: Some(applied_at),
                },
                StatusEntry {
                    version: 12,
                    name: "add_index".to_string(),
                    state: MigrationState::Pending,
                    applied_at: None,
                },
            ],
            orphaned: Vec::new(),
        };

        let table = status_table(&report);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "VERSION  NAME          STATE    APPLIED AT");
        assert_eq!(lines[1], "1        create_users  applied  2026-03-01 12:00:00");
        assert_eq!(lines[2], "12       add_index     pending  -");
        assert!(table.contains("1 applied, 1 pending"));
        assert!(!table.contains("without a migration file"));
    }

    #[test]
    fn lists_orphaned_rows() {
        let report = StatusReport {
            entries: Vec::new(),
            orphaned: vec![AppliedRecord {
                version: 9,
                name: "gone".to_string(),
                applied_at: Utc::now(),
            }],
        };

        let table = status_table(&report);
        assert!(table.starts_with("No migrations found."));
        assert!(table.contains("Applied without a migration file (1):\n  9 gone\n"));
    }
}
