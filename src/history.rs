use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

pub fn init_db(conn: &Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
",
    )?;
    conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS user_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            command TEXT NOT NULL,
            result TEXT,
            executed_at TEXT NOT NULL,
            success INTEGER,
            duration_ms INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_user_history
            ON user_history(user_id, executed_at DESC);
        CREATE INDEX IF NOT EXISTS idx_command_time
            ON user_history(executed_at DESC);
",
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub user_id: i64,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub id: i64,
    pub user_id: i64,
    pub command: String,
    pub timestamp: String,
    pub result: Option<String>,
    pub success: Option<bool>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub total: i64,
    pub successful: i64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

/// Append-only command log.
pub trait HistoryLog: Send + Sync {
    fn append(&self, entry: NewHistoryEntry) -> anyhow::Result<i64>;

    fn record_outcome(
        &self,
        id: i64,
        result: &str,
        success: bool,
        duration_ms: i64,
    ) -> anyhow::Result<()>;

    /// Most recent first.
    fn query(&self, user_id: i64, limit: usize) -> anyhow::Result<Vec<HistoryRecord>>;
}

/// Stored results are truncated to this many bytes.
const MAX_RESULT_BYTES: usize = 32 * 1024;

pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(path: &Path, busy_timeout_ms: u64) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        init_db(&conn, busy_timeout_ms)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn, 10000)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("history connection poisoned"))
    }

    /// LIKE match over command and result, most recent first.
    pub fn search(
        &self,
        user_id: i64,
        query: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        let conn = self.conn()?;
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = conn.prepare(
            "SELECT id, user_id, command, executed_at, result, success, duration_ms \
             FROM user_history \
             WHERE user_id = ?1 \
               AND (command LIKE ?2 ESCAPE '\\' OR result LIKE ?2 ESCAPE '\\') \
             ORDER BY executed_at DESC, id DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, pattern, limit as i64], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn stats(&self, user_id: i64) -> anyhow::Result<HistoryStats> {
        let conn = self.conn()?;
        let (total, successful, avg): (i64, i64, Option<f64>) = conn.query_row(
            "SELECT COUNT(*), \
                    COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0), \
                    AVG(duration_ms) \
             FROM user_history WHERE user_id = ?",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Ok(HistoryStats {
            total,
            successful,
            success_rate,
            avg_duration_ms: avg.unwrap_or(0.0),
        })
    }
}

impl HistoryLog for HistoryStore {
    fn append(&self, entry: NewHistoryEntry) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        conn.execute(
            "INSERT INTO user_history (user_id, command, executed_at) VALUES (?, ?, ?)",
            params![entry.user_id, entry.command, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_outcome(
        &self,
        id: i64,
        result: &str,
        success: bool,
        duration_ms: i64,
    ) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE user_history SET result = ?, success = ?, duration_ms = ? WHERE id = ?",
            params![truncate(result, MAX_RESULT_BYTES), success, duration_ms, id],
        )?;
        Ok(())
    }

    fn query(&self, user_id: i64, limit: usize) -> anyhow::Result<Vec<HistoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, command, executed_at, result, success, duration_ms \
             FROM user_history WHERE user_id = ? \
             ORDER BY executed_at DESC, id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        command: row.get(2)?,
        timestamp: row.get(3)?,
        result: row.get(4)?,
        success: row.get(5)?,
        duration_ms: row.get(6)?,
    })
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Id under which the current OS user's history is recorded.
pub fn current_user_id() -> i64 {
    #[cfg(unix)]
    {
        i64::from(unsafe { libc::getuid() })
    }
    #[cfg(not(unix))]
    {
        0
    }
}
