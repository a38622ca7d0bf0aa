//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ArtifactRepo, AuthRepo, UserRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UserRepo + AuthRepo + ArtifactRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and migrate it.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        Self::connect(opts, query_timeout_secs).await
    }

    /// Private in-memory database, used by tests.
    pub async fn in_memory() -> MetadataResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(opts, None).await
    }

    async fn connect(
        opts: SqliteConnectOptions,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        // Prevent transient "database is locked" errors under concurrent access.
        let opts = opts.busy_timeout(Duration::from_secs(5));
        let acquire_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(600).max(1));

        // One connection serializes writers, so read-then-write sequences in a
        // transaction cannot interleave. It is never recycled, which also keeps
        // in-memory databases alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(
            acquire_timeout_secs = acquire_timeout.as_secs(),
            "SQLite metadata store ready"
        );
        Ok(store)
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use depot_core::{ArtifactFilter, ParentRef};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn to_i64(bytes: u64) -> MetadataResult<i64> {
        i64::try_from(bytes)
            .map_err(|_| MetadataError::Constraint(format!("byte count {bytes} out of range")))
    }

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn upsert_user(&self, user: &UserRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO users (username, public_key, fingerprint, quota_limit, quota_used, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(username) DO UPDATE SET
                    public_key = excluded.public_key,
                    fingerprint = excluded.fingerprint
                "#,
            )
            .bind(&user.username)
            .bind(&user.public_key)
            .bind(&user.fingerprint)
            .bind(user.quota_limit)
            .bind(user.quota_used)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_user(&self, username: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn set_quota_limit(&self, username: &str, limit: i64) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE users SET quota_limit = ? WHERE username = ?")
                .bind(limit)
                .bind(username)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("user {username}")));
            }
            Ok(())
        }

        async fn charge_quota(&self, username: &str, bytes: u64) -> MetadataResult<bool> {
            let bytes = to_i64(bytes)?;
            let result = sqlx::query(
                r#"
                UPDATE users SET quota_used = quota_used + ?
                WHERE username = ? AND (quota_limit < 0 OR quota_used + ? <= quota_limit)
                "#,
            )
            .bind(bytes)
            .bind(username)
            .bind(bytes)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn refund_quota(&self, username: &str, bytes: u64) -> MetadataResult<()> {
            sqlx::query("UPDATE users SET quota_used = MAX(quota_used - ?, 0) WHERE username = ?")
                .bind(to_i64(bytes)?)
                .bind(username)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl AuthRepo for SqliteStore {
        async fn save_challenge(&self, challenge: &ChallengeRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO challenges (username, challenge, issued_at, expires_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(username) DO UPDATE SET
                    challenge = excluded.challenge,
                    issued_at = excluded.issued_at,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(&challenge.username)
            .bind(&challenge.challenge)
            .bind(challenge.issued_at)
            .bind(challenge.expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn consume_challenge(
            &self,
            username: &str,
            challenge: &str,
        ) -> MetadataResult<Option<ChallengeRow>> {
            let row = sqlx::query_as::<_, ChallengeRow>(
                r#"
                DELETE FROM challenges WHERE username = ? AND challenge = ?
                RETURNING username, challenge, issued_at, expires_at
                "#,
            )
            .bind(username)
            .bind(challenge)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn delete_expired_challenges(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM challenges WHERE expires_at < ?")
                .bind(now)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }

        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (token_hash, username, created_at, expires_at, last_used_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&token.token_hash)
            .bind(&token.username)
            .bind(token.created_at)
            .bind(token.expires_at)
            .bind(token.last_used_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(
            &self,
            token_hash: &str,
            used_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_hash = ?")
                .bind(used_at)
                .bind(token_hash)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn delete_expired_tokens(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM tokens WHERE expires_at < ?")
                .bind(now)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl ArtifactRepo for SqliteStore {
        async fn create_artifact(
            &self,
            artifact: &ArtifactRow,
            parent: Option<&ParentRef>,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            if let Some(parent) = parent {
                let exists: bool = sqlx::query_scalar(PARENT_EXISTS_SQL)
                    .bind(&parent.name)
                    .bind(&parent.owner)
                    .bind(&parent.version)
                    .fetch_one(&mut *tx)
                    .await?;
                if !exists {
                    return Err(MetadataError::DependencyMissing(parent.clone()));
                }
            }

            let result = sqlx::query(
                r#"
                INSERT INTO artifacts (
                    file_id, owner, name, filename, repo, version, tags, md5, sha256, size,
                    uploaded_at, description, architecture, parent, parent_owner,
                    parent_version, pref_size, storage_key, private
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(artifact.file_id)
            .bind(&artifact.owner)
            .bind(&artifact.name)
            .bind(&artifact.filename)
            .bind(&artifact.repo)
            .bind(&artifact.version)
            .bind(&artifact.tags)
            .bind(&artifact.md5)
            .bind(&artifact.sha256)
            .bind(artifact.size)
            .bind(artifact.uploaded_at)
            .bind(&artifact.description)
            .bind(&artifact.architecture)
            .bind(&artifact.parent)
            .bind(&artifact.parent_owner)
            .bind(&artifact.parent_version)
            .bind(&artifact.pref_size)
            .bind(&artifact.storage_key)
            .bind(artifact.private)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(MetadataError::AlreadyExists(format!(
                        "artifact {}",
                        artifact.file_id
                    )));
                }
                Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                    return Err(MetadataError::Constraint(format!(
                        "owner {} is not a registered user",
                        artifact.owner
                    )));
                }
                Err(e) => return Err(e.into()),
            }

            tx.commit().await?;
            Ok(())
        }

        async fn parent_exists(&self, parent: &ParentRef) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(PARENT_EXISTS_SQL)
                .bind(&parent.name)
                .bind(&parent.owner)
                .bind(&parent.version)
                .fetch_one(&self.pool)
                .await?;
            Ok(exists)
        }

        async fn get_artifact(&self, file_id: Uuid) -> MetadataResult<Option<ArtifactRow>> {
            let row =
                sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE file_id = ?")
                    .bind(file_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn search_artifacts(
            &self,
            filter: &ArtifactFilter,
        ) -> MetadataResult<Vec<ArtifactRow>> {
            // Ids are uuids; anything else cannot match a record.
            let file_id = match filter.file_id.as_deref() {
                Some(id) => match Uuid::parse_str(id) {
                    Ok(id) => Some(id),
                    Err(_) => return Ok(Vec::new()),
                },
                None => None,
            };
            let repo = filter.repo.map(|r| r.as_str());

            let rows = sqlx::query_as::<_, ArtifactRow>(
                r#"
                SELECT * FROM artifacts
                WHERE (?1 IS NULL OR file_id = ?1)
                  AND (?2 IS NULL OR owner = ?2)
                  AND (?3 IS NULL OR name = ?3)
                  AND (?4 IS NULL OR repo = ?4)
                  AND (?5 IS NULL OR version = ?5)
                  AND (?6 IS NULL OR tags = ?6)
                ORDER BY uploaded_at, rowid
                "#,
            )
            .bind(file_id)
            .bind(filter.owner.as_deref())
            .bind(filter.name.as_deref())
            .bind(repo)
            .bind(filter.version.as_deref())
            .bind(filter.tags.as_deref())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_artifacts_by_storage_key(&self, storage_key: &str) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE storage_key = ?")
                    .bind(storage_key)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count.max(0) as u64)
        }
    }
}

const PARENT_EXISTS_SQL: &str = r#"
SELECT EXISTS(
    SELECT 1 FROM artifacts
    WHERE repo = 'template' AND name = ? AND owner = ? COLLATE NOCASE AND version = ?
)
"#;

const SCHEMA_SQL: &str = r#"
-- Registered users and their quota counters
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    public_key TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    quota_limit INTEGER NOT NULL DEFAULT -1,
    quota_used INTEGER NOT NULL DEFAULT 0 CHECK (quota_used >= 0),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_fingerprint ON users(fingerprint);

-- Outstanding challenges, one per user
CREATE TABLE IF NOT EXISTS challenges (
    username TEXT PRIMARY KEY REFERENCES users(username),
    challenge TEXT NOT NULL,
    issued_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_challenges_expires ON challenges(expires_at);

-- Session tokens, by digest
CREATE TABLE IF NOT EXISTS tokens (
    token_hash TEXT PRIMARY KEY,
    username TEXT NOT NULL REFERENCES users(username),
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    last_used_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_tokens_username ON tokens(username);
CREATE INDEX IF NOT EXISTS idx_tokens_expires ON tokens(expires_at);

-- Cataloged artifacts
CREATE TABLE IF NOT EXISTS artifacts (
    file_id BLOB PRIMARY KEY,
    owner TEXT NOT NULL REFERENCES users(username),
    name TEXT NOT NULL,
    filename TEXT NOT NULL,
    repo TEXT NOT NULL CHECK (repo IN ('apt', 'raw', 'template')),
    version TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '',
    md5 TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    size INTEGER NOT NULL,
    uploaded_at TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    architecture TEXT NOT NULL DEFAULT '',
    parent TEXT NOT NULL DEFAULT '',
    parent_owner TEXT NOT NULL DEFAULT '',
    parent_version TEXT NOT NULL DEFAULT '',
    pref_size TEXT NOT NULL DEFAULT '',
    storage_key TEXT NOT NULL,
    private INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_artifacts_repo_name ON artifacts(repo, name);
CREATE INDEX IF NOT EXISTS idx_artifacts_owner ON artifacts(owner);
CREATE INDEX IF NOT EXISTS idx_artifacts_storage_key ON artifacts(storage_key);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactRow, ChallengeRow, TokenRow, UserRow};
    use depot_core::{ArtifactFilter, ParentRef, RepoKind};
    use time::{Duration as TimeDuration, OffsetDateTime};
    use uuid::Uuid;

    async fn store_with_users(users: &[(&str, i64)]) -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        for (name, limit) in users {
            store
                .upsert_user(&UserRow {
                    username: name.to_string(),
                    public_key: format!("{name}:key"),
                    fingerprint: format!("{name}-fp"),
                    quota_limit: *limit,
                    quota_used: 0,
                    created_at: OffsetDateTime::now_utc(),
                })
                .await
                .unwrap();
        }
        store
    }

    fn artifact(owner: &str, repo: RepoKind, name: &str, version: &str) -> ArtifactRow {
        ArtifactRow {
            file_id: Uuid::new_v4(),
            owner: owner.to_string(),
            name: name.to_string(),
            filename: format!("{name}.bin"),
            repo: repo.as_str().to_string(),
            version: version.to_string(),
            tags: String::new(),
            md5: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            sha256: "e3b0c442".to_string(),
            size: 0,
            uploaded_at: OffsetDateTime::now_utc(),
            description: String::new(),
            architecture: String::new(),
            parent: String::new(),
            parent_owner: String::new(),
            parent_version: String::new(),
            pref_size: String::new(),
            storage_key: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            private: false,
        }
    }

    fn parent(name: &str, owner: &str, version: &str) -> ParentRef {
        ParentRef {
            name: name.to_string(),
            owner: owner.to_string(),
            version: version.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_quota_state() {
        let store = store_with_users(&[("alice", 100)]).await;
        assert!(store.charge_quota("alice", 40).await.unwrap());

        store
            .upsert_user(&UserRow {
                username: "alice".to_string(),
                public_key: "alice:rotated".to_string(),
                fingerprint: "alice-fp2".to_string(),
                quota_limit: 5,
                quota_used: 0,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();

        let user = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(user.public_key, "alice:rotated");
        assert_eq!(user.quota_limit, 100);
        assert_eq!(user.quota_used, 40);
    }

    #[tokio::test]
    async fn test_charge_quota_is_conditional() {
        let store = store_with_users(&[("alice", 10), ("root", -1)]).await;

        assert!(store.charge_quota("alice", 10).await.unwrap());
        assert!(!store.charge_quota("alice", 1).await.unwrap());
        assert_eq!(store.get_user("alice").await.unwrap().unwrap().quota_used, 10);

        store.refund_quota("alice", 4).await.unwrap();
        assert!(store.charge_quota("alice", 4).await.unwrap());

        assert!(store.charge_quota("root", u32::MAX as u64).await.unwrap());
        assert!(!store.charge_quota("ghost", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_challenge_is_consumed_once() {
        let store = store_with_users(&[("alice", -1)]).await;
        let now = OffsetDateTime::now_utc();
        let row = |challenge: &str| ChallengeRow {
            username: "alice".to_string(),
            challenge: challenge.to_string(),
            issued_at: now,
            expires_at: now + TimeDuration::minutes(1),
        };

        store.save_challenge(&row("first")).await.unwrap();
        store.save_challenge(&row("second")).await.unwrap();

        assert!(store.consume_challenge("alice", "first").await.unwrap().is_none());
        assert!(store.consume_challenge("alice", "second").await.unwrap().is_some());
        assert!(store.consume_challenge("alice", "second").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_credentials_are_deleted() {
        let store = store_with_users(&[("alice", -1)]).await;
        let now = OffsetDateTime::now_utc();

        store
            .save_challenge(&ChallengeRow {
                username: "alice".to_string(),
                challenge: "stale".to_string(),
                issued_at: now - TimeDuration::minutes(10),
                expires_at: now - TimeDuration::minutes(5),
            })
            .await
            .unwrap();
        for (hash, expires_at) in [
            ("old", now - TimeDuration::seconds(1)),
            ("live", now + TimeDuration::hours(1)),
        ] {
            store
                .create_token(&TokenRow {
                    token_hash: hash.to_string(),
                    username: "alice".to_string(),
                    created_at: now,
                    expires_at,
                    last_used_at: None,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.delete_expired_challenges(now).await.unwrap(), 1);
        assert_eq!(store.delete_expired_tokens(now).await.unwrap(), 1);
        assert!(store.get_token_by_hash("old").await.unwrap().is_none());

        store.touch_token("live", now).await.unwrap();
        let live = store.get_token_by_hash("live").await.unwrap().unwrap();
        assert!(live.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_search_is_exact() {
        let store = store_with_users(&[("alice", -1), ("alicia", -1)]).await;
        let mut tagged = artifact("alice", RepoKind::Raw, "tool", "1.0");
        tagged.tags = "cli,net".to_string();
        store.create_artifact(&tagged, None).await.unwrap();
        store
            .create_artifact(&artifact("alice", RepoKind::Raw, "tool", "1.0.1"), None)
            .await
            .unwrap();
        store
            .create_artifact(&artifact("alicia", RepoKind::Raw, "toolkit", "1.0"), None)
            .await
            .unwrap();
        store
            .create_artifact(&artifact("alice", RepoKind::Apt, "tool", "1.0"), None)
            .await
            .unwrap();

        let count = |filter: ArtifactFilter| {
            let store = &store;
            async move { store.search_artifacts(&filter).await.unwrap().len() }
        };

        assert_eq!(count(ArtifactFilter::default()).await, 4);
        assert_eq!(count(ArtifactFilter::for_repo(RepoKind::Raw)).await, 3);
        assert_eq!(
            count(ArtifactFilter {
                owner: Some("alice".to_string()),
                ..ArtifactFilter::for_repo(RepoKind::Raw)
            })
            .await,
            2
        );
        assert_eq!(
            count(ArtifactFilter {
                name: Some("tool".to_string()),
                version: Some("1.0".to_string()),
                ..Default::default()
            })
            .await,
            2
        );
        assert_eq!(
            count(ArtifactFilter {
                tags: Some("cli".to_string()),
                ..Default::default()
            })
            .await,
            0
        );
        assert_eq!(
            count(ArtifactFilter {
                file_id: Some(tagged.file_id.to_string()),
                ..Default::default()
            })
            .await,
            1
        );
        assert_eq!(
            count(ArtifactFilter {
                file_id: Some("not-a-uuid".to_string()),
                ..Default::default()
            })
            .await,
            0
        );
    }

    #[tokio::test]
    async fn test_create_artifact_checks_parent() {
        let store = store_with_users(&[("Alice", -1)]).await;
        let wanted = parent("base", "alice", "1.0");

        let mut child = artifact("Alice", RepoKind::Template, "child", "1.0");
        child.parent = "base".to_string();
        let err = store.create_artifact(&child, Some(&wanted)).await.unwrap_err();
        assert!(matches!(err, MetadataError::DependencyMissing(p) if p == wanted));
        assert!(store.get_artifact(child.file_id).await.unwrap().is_none());

        // A raw artifact with the right name does not count as a parent.
        store
            .create_artifact(&artifact("Alice", RepoKind::Raw, "base", "1.0"), None)
            .await
            .unwrap();
        assert!(!store.parent_exists(&wanted).await.unwrap());

        store
            .create_artifact(&artifact("Alice", RepoKind::Template, "base", "1.0"), None)
            .await
            .unwrap();
        assert!(store.parent_exists(&wanted).await.unwrap());
        assert!(!store.parent_exists(&parent("base", "alice", "2.0")).await.unwrap());

        store.create_artifact(&child, Some(&wanted)).await.unwrap();
        assert!(store.get_artifact(child.file_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_artifact_owner_must_be_registered() {
        let store = store_with_users(&[]).await;
        let err = store
            .create_artifact(&artifact("ghost", RepoKind::Raw, "x", "1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_count_by_storage_key() {
        let store = store_with_users(&[("alice", -1)]).await;
        for _ in 0..2 {
            store
                .create_artifact(&artifact("alice", RepoKind::Raw, "dup", "1"), None)
                .await
                .unwrap();
        }
        assert_eq!(
            store
                .count_artifacts_by_storage_key("d41d8cd98f00b204e9800998ecf8427e")
                .await
                .unwrap(),
            2
        );
        assert_eq!(store.count_artifacts_by_storage_key("other").await.unwrap(), 0);
    }
}
