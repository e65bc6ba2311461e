//! History repository for the `history` table.
//!
//! Rows are written once and never updated. They disappear only when the
//! owning user is deleted.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// `kind` value for test-generation runs.
pub const KIND_TEST_GENERATION: &str = "test_generation";
/// `kind` value for code-generation runs.
pub const KIND_CODE_GENERATION: &str = "code_generation";

/// A raw history row from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub id: i64,
    pub user_id: i64,
    pub requirement: String,
    pub script: String,
    pub result: String,
    pub timestamp: String,
    pub kind: String,
}

impl HistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            requirement: row.get("requirement")?,
            script: row.get("script")?,
            result: row.get("result")?,
            timestamp: row.get("timestamp")?,
            kind: row.get("kind")?,
        })
    }
}

/// Values for a row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewHistory<'a> {
    pub user_id: i64,
    pub requirement: &'a str,
    pub script: &'a str,
    pub result: &'a str,
    pub timestamp: &'a str,
    pub kind: &'a str,
}

/// Inserts a history row and returns its id.
pub fn insert(db: &Database, entry: &NewHistory<'_>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| insert_on(conn, entry))
}

/// [`insert`] on a connection the caller already holds, such as an open
/// transaction.
pub fn insert_on(conn: &Connection, entry: &NewHistory<'_>) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO history (user_id, requirement, script, result, timestamp, kind)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.user_id,
            entry.requirement,
            entry.script,
            entry.result,
            entry.timestamp,
            entry.kind,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds a history row by id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<HistoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM history WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], HistoryRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Substring search over requirement, script and result, newest first.
///
/// An empty or blank query returns every row.
pub fn search(db: &Database, query: &str, limit: u64) -> Result<Vec<HistoryRow>, DatabaseError> {
    let query = query.trim();
    db.with_conn(|conn| {
        let rows = if query.is_empty() {
            let mut stmt = conn.prepare(
                "SELECT * FROM history ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], HistoryRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        } else {
            let pattern = format!("%{}%", escape_like(query));
            let mut stmt = conn.prepare(
                "SELECT * FROM history
                 WHERE requirement LIKE ?1 ESCAPE '\\'
                    OR script LIKE ?1 ESCAPE '\\'
                    OR result LIKE ?1 ESCAPE '\\'
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![pattern, limit as i64], HistoryRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        Ok(rows)
    })
}

/// Counts rows owned by a user.
pub fn count_for_user(db: &Database, user_id: i64) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM history WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::user_repo;

    fn test_db() -> (Database, i64) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let user = user_repo::insert(&db, "dev", "developer", "h", "2026-01-01T00:00:00Z").unwrap();
        (db, user)
    }

    fn entry<'a>(user_id: i64, requirement: &'a str, timestamp: &'a str) -> NewHistory<'a> {
        NewHistory {
            user_id,
            requirement,
            script: "page.goto('https://example.com')",
            result: "[PASS] Script executed successfully",
            timestamp,
            kind: KIND_TEST_GENERATION,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let (db, user) = test_db();
        let id = insert(&db, &entry(user, "Login to Amazon account", "2026-01-01T00:00:00Z"))
            .unwrap();

        let row = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.requirement, "Login to Amazon account");
        assert_eq!(row.user_id, user);
        assert_eq!(row.kind, KIND_TEST_GENERATION);
    }

    #[test]
    fn test_find_nonexistent() {
        let (db, _) = test_db();
        assert!(find_by_id(&db, 99).unwrap().is_none());
    }

    #[test]
    fn test_insert_requires_existing_user() {
        let (db, _) = test_db();
        assert!(insert(&db, &entry(404, "orphan row here", "2026-01-01T00:00:00Z")).is_err());
    }

    #[test]
    fn test_search_newest_first() {
        let (db, user) = test_db();
        insert(&db, &entry(user, "Search for laptops", "2026-01-01T00:00:00Z")).unwrap();
        insert(&db, &entry(user, "Add laptop to cart", "2026-01-03T00:00:00Z")).unwrap();
        insert(&db, &entry(user, "Checkout as guest", "2026-01-02T00:00:00Z")).unwrap();

        let all = search(&db, "", 100).unwrap();
        let order: Vec<&str> = all.iter().map(|r| r.requirement.as_str()).collect();
        assert_eq!(
            order,
            vec!["Add laptop to cart", "Checkout as guest", "Search for laptops"]
        );

        let laptops = search(&db, "laptop", 100).unwrap();
        assert_eq!(laptops.len(), 2);
        assert_eq!(laptops[0].requirement, "Add laptop to cart");
    }

    #[test]
    fn test_search_matches_script_and_result() {
        let (db, user) = test_db();
        let mut failing = entry(user, "Checkout flow", "2026-01-01T00:00:00Z");
        failing.result = "[FAIL] Timeout waiting for #pay";
        insert(&db, &failing).unwrap();

        assert_eq!(search(&db, "#pay", 10).unwrap().len(), 1);
        assert_eq!(search(&db, "example.com", 10).unwrap().len(), 1);
        assert!(search(&db, "nothing-like-this", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_escapes_wildcards() {
        let (db, user) = test_db();
        insert(&db, &entry(user, "Discount of 100 percent", "2026-01-01T00:00:00Z")).unwrap();
        insert(&db, &entry(user, "Discount of 100% applied", "2026-01-02T00:00:00Z")).unwrap();

        let rows = search(&db, "100%", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].requirement, "Discount of 100% applied");
    }

    #[test]
    fn test_search_limit() {
        let (db, user) = test_db();
        for day in 1..=5 {
            let ts = format!("2026-01-0{}T00:00:00Z", day);
            insert(&db, &entry(user, "Repeated requirement", &ts)).unwrap();
        }
        assert_eq!(search(&db, "Repeated", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_rows_removed_with_user() {
        let (db, user) = test_db();
        insert(&db, &entry(user, "Login to Amazon account", "2026-01-01T00:00:00Z")).unwrap();
        assert_eq!(count_for_user(&db, user).unwrap(), 1);

        user_repo::delete(&db, user).unwrap();
        assert_eq!(count_for_user(&db, user).unwrap(), 0);
    }
}
