// dbcopytool/src/restore/verification.rs
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::config::RunConfig;

/// Sentinel recorded when a count query fails; textually distinct from every
/// real row count, including zero.
const COUNT_UNAVAILABLE: &str = "ERR";

/// One table's reconciliation record. `None` means the count query failed on
/// that side, not that the table was empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCheck {
    pub table: String,
    pub remote_rows: Option<i64>,
    pub local_rows: Option<i64>,
}

impl TableCheck {
    fn remote_text(&self) -> String {
        count_text(self.remote_rows)
    }

    fn local_text(&self) -> String {
        count_text(self.local_rows)
    }

    /// A mismatch is any textual difference between the recorded values, so a
    /// sentinel against a number counts even though it adds nothing to totals.
    pub fn is_mismatch(&self) -> bool {
        self.remote_text() != self.local_text()
    }
}

fn count_text(count: Option<i64>) -> String {
    match count {
        Some(n) => n.to_string(),
        None => COUNT_UNAVAILABLE.to_string(),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct VerificationSummary {
    pub tables_checked: usize,
    pub mismatches: usize,
    pub total_remote_rows: i64,
    pub total_local_rows: i64,
}

pub fn summarize(checks: &[TableCheck]) -> VerificationSummary {
    let mut summary = VerificationSummary {
        tables_checked: checks.len(),
        ..VerificationSummary::default()
    };
    for check in checks {
        if check.is_mismatch() {
            summary.mismatches += 1;
        }
        if let Some(n) = check.remote_rows {
            summary.total_remote_rows += n;
        }
        if let Some(n) = check.local_rows {
            summary.total_local_rows += n;
        }
    }
    summary
}

/// Compares per-table row counts between the remote source and the local
/// copy, writing a CSV report and a table list into the dump directory.
///
/// Advisory only: mismatches produce a warning, never a failed run. A count
/// query that fails on one table records a sentinel and the loop moves on, so
/// one unreadable table cannot hide the results for the rest.
pub async fn run_verification(
    config: &RunConfig,
    dump_dir: &Path,
) -> Result<VerificationSummary> {
    println!("🔍 Verifying row counts between remote and local databases...");

    let remote_pool = connect(config.remote.database_url()?, "remote source database").await?;
    let local_pool = connect(
        config.local.database_url_for(&config.local.db)?,
        "restored local database",
    )
    .await?;

    let tables = enumerate_user_tables(&local_pool).await?;
    if tables.is_empty() {
        println!("⚠️ No user tables found in the restored database, nothing to verify.");
    }

    let mut checks = Vec::with_capacity(tables.len());
    for (schema, name) in &tables {
        let remote_rows = count_rows(&remote_pool, schema, name).await;
        let local_rows = count_rows(&local_pool, schema, name).await;
        checks.push(TableCheck {
            table: format!("{schema}.{name}"),
            remote_rows,
            local_rows,
        });
    }

    let report_path = write_report(dump_dir, &checks)?;
    let summary = summarize(&checks);

    println!("--- Verification summary ---");
    println!("Tables checked:    {}", summary.tables_checked);
    println!("Mismatches:        {}", summary.mismatches);
    println!("Total remote rows: {}", summary.total_remote_rows);
    println!("Total local rows:  {}", summary.total_local_rows);
    if summary.mismatches > 0 || summary.total_remote_rows != summary.total_local_rows {
        println!(
            "⚠️ Row counts differ between remote and local; review {} before trusting the copy.",
            report_path.display()
        );
    } else {
        println!("✓ Row counts match.");
    }

    Ok(summary)
}

async fn connect(url: String, label: &str) -> Result<Pool<Postgres>> {
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .with_context(|| format!("Failed to connect to the {label}"))
}

/// Base tables only, system and toast/temp schemas excluded, ordered by
/// qualified name so re-runs produce the same report row order.
async fn enumerate_user_tables(pool: &Pool<Postgres>) -> Result<Vec<(String, String)>> {
    sqlx::query_as(
        "SELECT n.nspname, c.relname \
         FROM pg_class c \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relkind = 'r' \
           AND n.nspname NOT IN ('pg_catalog', 'information_schema') \
           AND n.nspname NOT LIKE 'pg_toast%' \
           AND n.nspname NOT LIKE 'pg_temp%' \
         ORDER BY n.nspname, c.relname",
    )
    .fetch_all(pool)
    .await
    .context("Failed to enumerate user tables from the restored database")
}

async fn count_rows(pool: &Pool<Postgres>, schema: &str, table: &str) -> Option<i64> {
    let query = format!(
        r#"SELECT count(*) FROM "{}"."{}""#,
        schema.replace('"', "\"\""),
        table.replace('"', "\"\"")
    );
    match sqlx::query_scalar::<_, i64>(&query).fetch_one(pool).await {
        Ok(count) => Some(count),
        Err(e) => {
            println!("⚠️ Count query failed for {schema}.{table}: {e}");
            None
        }
    }
}

/// Writes the per-table CSV report and the plain list of checked tables next
/// to the dump output. Returns the report path for the summary message.
fn write_report(dump_dir: &Path, checks: &[TableCheck]) -> Result<PathBuf> {
    let report_path = dump_dir.join("verification_report.csv");
    let mut writer = csv::Writer::from_path(&report_path).with_context(|| {
        format!(
            "Failed to create verification report {}",
            report_path.display()
        )
    })?;
    writer
        .write_record(["table", "remote_rows", "local_rows"])
        .context("Failed to write report header")?;
    for check in checks {
        let remote_text = check.remote_text();
        let local_text = check.local_text();
        writer
            .write_record([check.table.as_str(), remote_text.as_str(), local_text.as_str()])
            .with_context(|| format!("Failed to write report row for {}", check.table))?;
    }
    writer.flush().context("Failed to flush verification report")?;

    let list_path = dump_dir.join("verified_tables.txt");
    let mut list = String::new();
    for check in checks {
        list.push_str(&check.table);
        list.push('\n');
    }
    std::fs::write(&list_path, list)
        .with_context(|| format!("Failed to write table list {}", list_path.display()))?;

    println!("Verification report written to {}", report_path.display());
    Ok(report_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(table: &str, remote: Option<i64>, local: Option<i64>) -> TableCheck {
        TableCheck {
            table: table.to_string(),
            remote_rows: remote,
            local_rows: local,
        }
    }

    #[test]
    fn matching_counts_produce_no_mismatches() {
        // Two tables, 10 and 5 rows, identical on both sides.
        let checks = vec![
            check("public.orders", Some(5), Some(5)),
            check("public.users", Some(10), Some(10)),
        ];
        let summary = summarize(&checks);
        assert_eq!(
            summary,
            VerificationSummary {
                tables_checked: 2,
                mismatches: 0,
                total_remote_rows: 15,
                total_local_rows: 15,
            }
        );
    }

    #[test]
    fn sentinel_counts_as_mismatch_but_not_in_totals() {
        // One remote count query failed; the stage still reports the rest.
        let checks = vec![
            check("public.orders", None, Some(5)),
            check("public.users", Some(10), Some(10)),
        ];
        let summary = summarize(&checks);
        assert_eq!(summary.tables_checked, 2);
        assert_eq!(summary.mismatches, 1);
        assert_eq!(summary.total_remote_rows, 10);
        assert_eq!(summary.total_local_rows, 15);
    }

    #[test]
    fn sentinel_versus_number_is_a_mismatch_but_two_sentinels_agree() {
        assert!(!check("t", None, None).is_mismatch());
        assert!(check("t", None, Some(0)).is_mismatch());
        assert!(check("t", Some(0), None).is_mismatch());
    }

    #[test]
    fn differing_numeric_counts_are_mismatches() {
        let checks = vec![
            check("public.orders", Some(5), Some(4)),
            check("public.users", Some(10), Some(10)),
        ];
        let summary = summarize(&checks);
        assert_eq!(summary.mismatches, 1);
        assert_eq!(summary.total_remote_rows, 15);
        assert_eq!(summary.total_local_rows, 14);
    }

    #[test]
    fn report_records_sentinels_textually() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let checks = vec![
            check("public.orders", None, Some(5)),
            check("public.users", Some(10), Some(10)),
        ];

        let report_path = write_report(dir.path(), &checks)?;
        let report = std::fs::read_to_string(&report_path)?;
        assert_eq!(
            report,
            "table,remote_rows,local_rows\npublic.orders,ERR,5\npublic.users,10,10\n"
        );

        let list = std::fs::read_to_string(dir.path().join("verified_tables.txt"))?;
        assert_eq!(list, "public.orders\npublic.users\n");
        Ok(())
    }
}
