use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::process::Command;

/// Operator accounts survive a reset.
pub const PROTECTED_TABLE: &str = "users";

/// Fresh-start numbering: the first student created after a reset.
pub const STUDENT_ID_RESTART: i64 = 20250001;

/// Foreign-key-safe deletion prefix; remaining tables follow in any order.
const WIPE_ORDER_FIRST: &[&str] = &["payments", "expenses", "students"];

pub const DEFAULT_SEED_SCRIPT: &str = "seed_database.sh";

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// External command execution seam. The orchestrator only sees the
/// structured result, so tests can inject a fake runner.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput>;
}

pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
        let out = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to run {}", program))?;
        Ok(CommandOutput {
            status: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Default)]
pub struct CleanSummary {
    pub tables_cleared: Vec<String>,
    pub triggers_restored: usize,
}

/// Empty every base table except the protected one, inside one transaction.
/// User-level triggers are captured, dropped for the wipe, and re-created
/// afterwards. All autoincrement counters restart at 1 and the student
/// counter restarts at the fresh-start watermark.
pub fn clean_database(conn: &Connection) -> anyhow::Result<CleanSummary> {
    let tables = tables_to_clear(conn)?;

    let tx = conn.unchecked_transaction()?;

    let mut stmt = tx.prepare(
        "SELECT name, sql FROM sqlite_master
         WHERE type = 'trigger' AND sql IS NOT NULL",
    )?;
    let triggers: Vec<(String, String)> = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    for (name, _) in &triggers {
        tx.execute_batch(&format!("DROP TRIGGER \"{}\"", name))?;
    }

    let mut summary = CleanSummary::default();
    for table in &tables {
        tx.execute(&format!("DELETE FROM \"{}\"", table), [])?;
        summary.tables_cleared.push(table.clone());
    }

    for (_, sql) in &triggers {
        tx.execute_batch(sql)?;
    }
    summary.triggers_restored = triggers.len();

    // sqlite_sequence only exists once an autoincrement insert has happened.
    let has_sequences = tx
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
            [],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if has_sequences {
        tx.execute("UPDATE sqlite_sequence SET seq = 0", [])?;
        tx.execute(
            "INSERT OR REPLACE INTO sqlite_sequence(name, seq) VALUES('students', ?1)",
            [STUDENT_ID_RESTART - 1],
        )?;
    } else {
        // Seed the counter by writing and removing a placeholder row at the
        // watermark; the autoincrement high-water mark survives the delete.
        tx.execute(
            "INSERT INTO students(id, name, contact_number, membership_date, aadhaar_number)
             VALUES(?1, '', '', datetime('now'), '')",
            [STUDENT_ID_RESTART - 1],
        )?;
        tx.execute("DELETE FROM students WHERE id = ?1", [STUDENT_ID_RESTART - 1])?;
    }

    tx.commit()?;
    Ok(summary)
}

/// The fixed partial order first (foreign keys), then everything else the
/// catalog knows about, except the protected table.
fn tables_to_clear(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name <> ?1
         ORDER BY name",
    )?;
    let found = stmt
        .query_map([PROTECTED_TABLE], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out: Vec<String> = WIPE_ORDER_FIRST
        .iter()
        .filter(|t| found.iter().any(|f| f == *t))
        .map(|t| t.to_string())
        .collect();
    for name in found {
        if !WIPE_ORDER_FIRST.contains(&name.as_str()) {
            out.push(name);
        }
    }
    Ok(out)
}
