use std::collections::HashMap;
use std::path::Path;

use crate8_fingerprint::Fingerprint;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::instrument;

use crate::error::CatalogError;
use crate::model::{BackupRecord, IndexedFile};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS files (
	name TEXT NOT NULL,
	host TEXT NOT NULL,
	fingerprint INTEGER NOT NULL,
	size INTEGER NOT NULL,
	modified_at INTEGER NOT NULL,
	born_at INTEGER NOT NULL,
	born_source TEXT NOT NULL,
	mime_type TEXT NOT NULL,
	mime_subtype TEXT NOT NULL,
	info TEXT,
	PRIMARY KEY (name, host)
);
CREATE INDEX IF NOT EXISTS files_fingerprint_host ON files (host, fingerprint);
CREATE TABLE IF NOT EXISTS backups (
	fingerprint INTEGER PRIMARY KEY,
	name TEXT NOT NULL,
	host TEXT NOT NULL,
	size INTEGER NOT NULL,
	modified_at INTEGER NOT NULL,
	born_at INTEGER NOT NULL,
	born_source TEXT NOT NULL,
	mime_type TEXT NOT NULL,
	mime_subtype TEXT NOT NULL,
	info TEXT
);
";

/// Schema version written to `PRAGMA user_version` on first creation. Bumped
/// only when a migration adds columns; schema changes here should stay
/// additive, so there is no migration logic yet, just the hook.
const SCHEMA_VERSION: i64 = 1;

/// Rows committed per transaction before the writer flushes.
pub const BATCH_SIZE: usize = 100;

/// The embedded catalog database: two tables, `files` and `backups`, accessed
/// through one open connection. Only the writer types in this module
/// ([`IndexWriter`], [`BackupWriter`]) issue writes; everything else here is
/// read-only.
pub struct Catalog {
	conn: Connection,
}

impl Catalog {
	/// Opens (creating if absent) the catalog at `path`, enabling WAL journaling
	/// for the single-writer/many-readers access pattern this store is built for.
	#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
	pub fn open(path: &Path) -> Result<Self, CatalogError> {
		let conn = Connection::open(path).map_err(CatalogError::Open)?;
		conn.pragma_update(None, "journal_mode", "WAL").map_err(CatalogError::Schema)?;
		conn.pragma_update(None, "synchronous", "NORMAL").map_err(CatalogError::Schema)?;
		conn.execute_batch(SCHEMA_SQL).map_err(CatalogError::Schema)?;

		let version: i64 = conn
			.query_row("PRAGMA user_version", [], |row| row.get(0))
			.map_err(CatalogError::Schema)?;
		if version == 0 {
			conn.pragma_update(None, "user_version", SCHEMA_VERSION).map_err(CatalogError::Schema)?;
		}

		Ok(Self { conn })
	}

	/// Loads every `files` row for `host`, keyed by path, so the index worker
	/// pool can skip unchanged files and the writer can enrich the audit trail
	/// on replacement without a query per incoming file.
	#[instrument(level = "debug", skip(self))]
	pub fn load_index_snapshot(&self, host: &str) -> Result<HashMap<String, IndexedFile>, CatalogError> {
		let mut stmt = self
			.conn
			.prepare("SELECT name, host, fingerprint, size, modified_at, born_at, born_source, mime_type, mime_subtype, info FROM files WHERE host = ?1")
			.map_err(CatalogError::Query)?;

		let rows = stmt
			.query_map(params![host], map_indexed_file)
			.map_err(CatalogError::Query)?;

		let mut snapshot = HashMap::new();
		for row in rows {
			let file = row.map_err(CatalogError::Query)?;
			snapshot.insert(file.path.clone(), file);
		}
		Ok(snapshot)
	}

	/// Every distinct fingerprint recorded for `host`, the unit of work the
	/// Backup Planner fans out over.
	pub fn distinct_fingerprints_for_host(&self, host: &str) -> Result<Vec<Fingerprint>, CatalogError> {
		let mut stmt = self
			.conn
			.prepare("SELECT DISTINCT fingerprint FROM files WHERE host = ?1")
			.map_err(CatalogError::Query)?;
		let rows = stmt
			.query_map(params![host], |row| row.get::<_, Fingerprint>(0))
			.map_err(CatalogError::Query)?;

		rows.collect::<Result<Vec<_>, _>>().map_err(CatalogError::Query)
	}

	/// All `files` rows sharing `fingerprint` for `host` — the replica set a
	/// backup job is assembled from.
	pub fn replicas_for_fingerprint(&self, host: &str, fingerprint: Fingerprint) -> Result<Vec<IndexedFile>, CatalogError> {
		let mut stmt = self
			.conn
			.prepare("SELECT name, host, fingerprint, size, modified_at, born_at, born_source, mime_type, mime_subtype, info FROM files WHERE host = ?1 AND fingerprint = ?2")
			.map_err(CatalogError::Query)?;
		let rows = stmt
			.query_map(params![host, fingerprint], map_indexed_file)
			.map_err(CatalogError::Query)?;

		rows.collect::<Result<Vec<_>, _>>().map_err(CatalogError::Query)
	}

	/// The existing `backups` row for `fingerprint`, if one was ever written.
	pub fn backup_record_for_fingerprint(&self, fingerprint: Fingerprint) -> Result<Option<BackupRecord>, CatalogError> {
		self.conn
			.query_row(
				"SELECT fingerprint, name, host, size, modified_at, born_at, born_source, mime_type, mime_subtype, info FROM backups WHERE fingerprint = ?1",
				params![fingerprint],
				map_backup_record,
			)
			.optional()
			.map_err(CatalogError::Query)
	}

	/// Starts a batching writer over the `files` table.
	pub fn index_writer(&mut self) -> Result<IndexWriter<'_>, CatalogError> {
		IndexWriter::new(&mut self.conn)
	}

	/// Starts a batching writer over the `backups` table.
	pub fn backup_writer(&mut self) -> Result<BackupWriter<'_>, CatalogError> {
		BackupWriter::new(&mut self.conn)
	}
}

fn map_indexed_file(row: &Row<'_>) -> rusqlite::Result<IndexedFile> {
	Ok(IndexedFile {
		path: row.get(0)?,
		host: row.get(1)?,
		fingerprint: row.get(2)?,
		size: row.get::<_, i64>(3)? as u64,
		modified_at: row.get(4)?,
		born_at: row.get(5)?,
		born_source: row.get(6)?,
		mime_type: row.get(7)?,
		mime_subtype: row.get(8)?,
		info: row.get(9)?,
	})
}

fn map_backup_record(row: &Row<'_>) -> rusqlite::Result<BackupRecord> {
	Ok(BackupRecord {
		fingerprint: row.get(0)?,
		path: row.get(1)?,
		host: row.get(2)?,
		size: row.get::<_, i64>(3)? as u64,
		modified_at: row.get(4)?,
		born_at: row.get(5)?,
		born_source: row.get(6)?,
		mime_type: row.get(7)?,
		mime_subtype: row.get(8)?,
		info: row.get(9)?,
	})
}

fn audit_json(prior: &IndexedFile) -> serde_json::Value {
	serde_json::json!({
		"name": prior.path,
		"host": prior.host,
		"fingerprint": prior.fingerprint.to_hex(),
		"size": prior.size,
		"modified_at": prior.modified_at,
		"born_at": prior.born_at,
		"born_source": prior.born_source.to_string(),
		"mime_type": prior.mime_type,
		"mime_subtype": prior.mime_subtype,
	})
}

/// Batching single-writer over `files`. Commits every [`BATCH_SIZE`] rows and
/// on [`finish`](Self::finish); an uncommitted batch left on `Drop` (e.g. the
/// writer thread panics) is rolled back rather than left half-committed.
pub struct IndexWriter<'c> {
	conn: &'c mut Connection,
	pending: usize,
	rows_written: u64,
	in_transaction: bool,
}

impl<'c> IndexWriter<'c> {
	fn new(conn: &'c mut Connection) -> Result<Self, CatalogError> {
		conn.execute_batch("BEGIN").map_err(CatalogError::BeginTransaction)?;
		Ok(Self { conn, pending: 0, rows_written: 0, in_transaction: true })
	}

	/// Writes one file. If `prior` is `Some` (the path was already indexed,
	/// presumably with a different fingerprint), the old row is deleted first
	/// and its contents folded into the new row's `info` for audit.
	pub fn write(&mut self, file: &IndexedFile, prior: Option<&IndexedFile>) -> Result<(), CatalogError> {
		let info = match prior {
			Some(prior) => {
				self.conn
					.execute("DELETE FROM files WHERE name = ?1 AND host = ?2", params![file.path, file.host])
					.map_err(CatalogError::Write)?;

				let audit = serde_json::json!({
					"event": "replaced",
					"previous": audit_json(prior),
				});
				let audit = serde_json::to_string(&audit).map_err(CatalogError::AuditSerialize)?;
				Some(match &file.info {
					Some(existing) => format!("{existing} {audit}"),
					None => audit,
				})
			}
			None => file.info.clone(),
		};

		self.conn
			.execute(
				"INSERT INTO files (name, host, fingerprint, size, modified_at, born_at, born_source, mime_type, mime_subtype, info)
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
				params![
					file.path,
					file.host,
					file.fingerprint,
					file.size as i64,
					file.modified_at,
					file.born_at,
					file.born_source,
					file.mime_type,
					file.mime_subtype,
					info,
				],
			)
			.map_err(CatalogError::Write)?;

		self.pending += 1;
		self.rows_written += 1;
		if self.pending >= BATCH_SIZE {
			self.flush()?;
		}
		Ok(())
	}

	fn flush(&mut self) -> Result<(), CatalogError> {
		self.conn.execute_batch("COMMIT").map_err(CatalogError::Commit)?;
		self.in_transaction = false;
		self.pending = 0;
		self.conn.execute_batch("BEGIN").map_err(CatalogError::BeginTransaction)?;
		self.in_transaction = true;
		Ok(())
	}

	/// Commits whatever remains and returns the total row count written.
	pub fn finish(mut self) -> Result<u64, CatalogError> {
		if self.in_transaction {
			self.conn.execute_batch("COMMIT").map_err(CatalogError::Commit)?;
			self.in_transaction = false;
		}
		Ok(self.rows_written)
	}
}

impl Drop for IndexWriter<'_> {
	fn drop(&mut self) {
		if self.in_transaction {
			let _ = self.conn.execute_batch("ROLLBACK");
		}
	}
}

/// Batching single-writer over `backups`, mirroring [`IndexWriter`].
pub struct BackupWriter<'c> {
	conn: &'c mut Connection,
	pending: usize,
	rows_written: u64,
	in_transaction: bool,
}

impl<'c> BackupWriter<'c> {
	fn new(conn: &'c mut Connection) -> Result<Self, CatalogError> {
		conn.execute_batch("BEGIN").map_err(CatalogError::BeginTransaction)?;
		Ok(Self { conn, pending: 0, rows_written: 0, in_transaction: true })
	}

	/// Upserts one backup record (delete-then-insert when a prior row existed).
	pub fn write(&mut self, record: &BackupRecord, had_prior: bool) -> Result<(), CatalogError> {
		if had_prior {
			self.conn
				.execute("DELETE FROM backups WHERE fingerprint = ?1", params![record.fingerprint])
				.map_err(CatalogError::Write)?;
		}

		self.conn
			.execute(
				"INSERT INTO backups (fingerprint, name, host, size, modified_at, born_at, born_source, mime_type, mime_subtype, info)
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
				params![
					record.fingerprint,
					record.path,
					record.host,
					record.size as i64,
					record.modified_at,
					record.born_at,
					record.born_source,
					record.mime_type,
					record.mime_subtype,
					record.info,
				],
			)
			.map_err(CatalogError::Write)?;

		self.pending += 1;
		self.rows_written += 1;
		if self.pending >= BATCH_SIZE {
			self.flush()?;
		}
		Ok(())
	}

	fn flush(&mut self) -> Result<(), CatalogError> {
		self.conn.execute_batch("COMMIT").map_err(CatalogError::Commit)?;
		self.in_transaction = false;
		self.pending = 0;
		self.conn.execute_batch("BEGIN").map_err(CatalogError::BeginTransaction)?;
		self.in_transaction = true;
		Ok(())
	}

	pub fn finish(mut self) -> Result<u64, CatalogError> {
		if self.in_transaction {
			self.conn.execute_batch("COMMIT").map_err(CatalogError::Commit)?;
			self.in_transaction = false;
		}
		Ok(self.rows_written)
	}
}

impl Drop for BackupWriter<'_> {
	fn drop(&mut self) {
		if self.in_transaction {
			let _ = self.conn.execute_batch("ROLLBACK");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::BornSource;

	fn sample(path: &str, fingerprint: u64) -> IndexedFile {
		IndexedFile {
			path: path.to_string(),
			host: "testhost".to_string(),
			fingerprint: Fingerprint(fingerprint),
			size: 1024,
			modified_at: 1_700_000_000,
			born_at: 1_700_000_000,
			born_source: BornSource::Stat,
			mime_type: "image".to_string(),
			mime_subtype: "jpeg".to_string(),
			info: None,
		}
	}

	#[test]
	fn open_creates_schema_and_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let db_path = dir.path().join("catalog.sqlite3");
		Catalog::open(&db_path).unwrap();
		Catalog::open(&db_path).unwrap();
	}

	#[test]
	fn index_writer_round_trips_a_row() {
		let dir = tempfile::tempdir().unwrap();
		let mut catalog = Catalog::open(&dir.path().join("catalog.sqlite3")).unwrap();

		{
			let mut writer = catalog.index_writer().unwrap();
			writer.write(&sample("/src/a.jpg", 42), None).unwrap();
			assert_eq!(writer.finish().unwrap(), 1);
		}

		let snapshot = catalog.load_index_snapshot("testhost").unwrap();
		assert_eq!(snapshot.len(), 1);
		assert_eq!(snapshot["/src/a.jpg"].fingerprint, Fingerprint(42));

		let replicas = catalog.replicas_for_fingerprint("testhost", Fingerprint(42)).unwrap();
		assert_eq!(replicas.len(), 1);
	}

	#[test]
	fn replacing_a_row_folds_prior_into_audit_info() {
		let dir = tempfile::tempdir().unwrap();
		let mut catalog = Catalog::open(&dir.path().join("catalog.sqlite3")).unwrap();

		let original = sample("/src/a.jpg", 1);
		{
			let mut writer = catalog.index_writer().unwrap();
			writer.write(&original, None).unwrap();
			writer.finish().unwrap();
		}

		let replaced = sample("/src/a.jpg", 2);
		{
			let mut writer = catalog.index_writer().unwrap();
			writer.write(&replaced, Some(&original)).unwrap();
			writer.finish().unwrap();
		}

		let snapshot = catalog.load_index_snapshot("testhost").unwrap();
		assert_eq!(snapshot.len(), 1);
		let row = &snapshot["/src/a.jpg"];
		assert_eq!(row.fingerprint, Fingerprint(2));
		assert!(row.info.as_deref().unwrap_or_default().contains("replaced"));
	}

	#[test]
	fn backup_writer_upserts_on_prior() {
		let dir = tempfile::tempdir().unwrap();
		let mut catalog = Catalog::open(&dir.path().join("catalog.sqlite3")).unwrap();

		let record = BackupRecord {
			fingerprint: Fingerprint(7),
			path: "/backup/image/2024/01/01/a.jpg".to_string(),
			host: "testhost".to_string(),
			size: 10,
			modified_at: 1,
			born_at: 1,
			born_source: BornSource::Stat,
			mime_type: "image".to_string(),
			mime_subtype: "jpeg".to_string(),
			info: None,
		};

		{
			let mut writer = catalog.backup_writer().unwrap();
			writer.write(&record, false).unwrap();
			writer.finish().unwrap();
		}

		assert!(catalog.backup_record_for_fingerprint(Fingerprint(7)).unwrap().is_some());

		let mut moved = record.clone();
		moved.path = "/backup/image/2024/01/02/a.jpg".to_string();
		{
			let mut writer = catalog.backup_writer().unwrap();
			writer.write(&moved, true).unwrap();
			writer.finish().unwrap();
		}

		let row = catalog.backup_record_for_fingerprint(Fingerprint(7)).unwrap().unwrap();
		assert_eq!(row.path, "/backup/image/2024/01/02/a.jpg");
	}
}
