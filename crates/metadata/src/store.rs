//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{
    DependencyRow, PackageChildren, PackageRow, PackageTypeRow, TargetFrameworkRow,
    package_type_text, search_text,
};
use crate::repos::{
    PackageAddResult, PackageDatabase, SearchIndexer, SearchRequest, SearchResponse,
    SearchResult, SearchService, SearchVersion,
};
use async_trait::async_trait;
use keg_core::{NuGetVersion, Package, PackageId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: PackageDatabase + SearchIndexer + SearchService + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection serializes writers, so a racing insert sees the
            // unique index instead of "database is locked".
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "opened sqlite metadata store");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn load_children(&self, package_key: i64) -> MetadataResult<PackageChildren> {
        let dependencies = sqlx::query_as::<_, DependencyRow>(
            "SELECT package_key, dependency_id, version_range, target_framework
             FROM package_dependencies WHERE package_key = ? ORDER BY position",
        )
        .bind(package_key)
        .fetch_all(&self.pool)
        .await?;

        let package_types = sqlx::query_as::<_, PackageTypeRow>(
            "SELECT package_key, name, version FROM package_types
             WHERE package_key = ? ORDER BY position",
        )
        .bind(package_key)
        .fetch_all(&self.pool)
        .await?;

        let target_frameworks = sqlx::query_as::<_, TargetFrameworkRow>(
            "SELECT package_key, moniker FROM target_frameworks
             WHERE package_key = ? ORDER BY moniker",
        )
        .bind(package_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(PackageChildren {
            dependencies,
            package_types,
            target_frameworks,
        })
    }

    async fn hydrate(&self, row: PackageRow) -> MetadataResult<Package> {
        let children = self.load_children(row.package_key).await?;
        row.into_package(children)
    }

    async fn package_key(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> MetadataResult<Option<i64>> {
        let key = sqlx::query_scalar::<_, i64>(
            "SELECT package_key FROM packages WHERE id = ? AND normalized_version = ?",
        )
        .bind(id.as_str())
        .bind(version.normalized())
        .fetch_optional(&self.pool)
        .await?;
        Ok(key)
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PackageDatabase for SqliteStore {
    async fn add_package(&self, package: &Package) -> MetadataResult<PackageAddResult> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO packages (
                id, normalized_version, full_version, authors, description, summary, title,
                tags, icon_url, license_url, project_url, repository_url, repository_type,
                language, release_notes, copyright, min_client_version,
                require_license_acceptance, has_readme, has_embedded_icon, is_prerelease,
                listed, downloads, published, semver_level, package_hash
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(package.id.as_str())
        .bind(package.version.normalized())
        .bind(package.version.full())
        .bind(serde_json::to_string(&package.authors)?)
        .bind(&package.description)
        .bind(&package.summary)
        .bind(&package.title)
        .bind(serde_json::to_string(&package.tags)?)
        .bind(&package.icon_url)
        .bind(&package.license_url)
        .bind(&package.project_url)
        .bind(&package.repository_url)
        .bind(&package.repository_type)
        .bind(&package.language)
        .bind(&package.release_notes)
        .bind(&package.copyright)
        .bind(&package.min_client_version)
        .bind(package.require_license_acceptance)
        .bind(package.has_readme)
        .bind(package.has_embedded_icon)
        .bind(package.is_prerelease())
        .bind(package.listed)
        .bind(package.downloads)
        .bind(package.published)
        .bind(package.semver_level.as_i64())
        .bind(package.package_hash.as_ref().map(|h| h.to_base64()))
        .execute(&mut *tx)
        .await;

        let package_key = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await?;
                tracing::debug!(
                    package_id = %package.id,
                    version = %package.version,
                    "package insert lost to an existing row"
                );
                return Ok(PackageAddResult::AlreadyExists);
            }
            Err(e) => return Err(e.into()),
        };

        for (position, dependency) in package.dependencies.iter().enumerate() {
            sqlx::query(
                "INSERT INTO package_dependencies
                 (package_key, position, dependency_id, version_range, target_framework)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(package_key)
            .bind(position as i64)
            .bind(&dependency.id)
            .bind(&dependency.version_range)
            .bind(&dependency.target_framework)
            .execute(&mut *tx)
            .await?;
        }

        for (position, package_type) in package.package_types.iter().enumerate() {
            sqlx::query(
                "INSERT INTO package_types (package_key, position, name, version)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(package_key)
            .bind(position as i64)
            .bind(&package_type.name)
            .bind(&package_type.version)
            .execute(&mut *tx)
            .await?;
        }

        for moniker in &package.target_frameworks {
            sqlx::query(
                "INSERT OR IGNORE INTO target_frameworks (package_key, moniker) VALUES (?, ?)",
            )
            .bind(package_key)
            .bind(moniker)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(PackageAddResult::Success)
    }

    async fn exists(&self, id: &PackageId, version: Option<&NuGetVersion>) -> MetadataResult<bool> {
        let exists: bool = match version {
            Some(version) => {
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM packages WHERE id = ? AND normalized_version = ?)",
                )
                .bind(id.as_str())
                .bind(version.normalized())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM packages WHERE id = ?)")
                    .bind(id.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(exists)
    }

    async fn find_packages(
        &self,
        id: &PackageId,
        include_unlisted: bool,
    ) -> MetadataResult<Vec<Package>> {
        let rows = sqlx::query_as::<_, PackageRow>(
            "SELECT * FROM packages WHERE id = ? AND (listed = 1 OR ?)",
        )
        .bind(id.as_str())
        .bind(include_unlisted)
        .fetch_all(&self.pool)
        .await?;

        let mut packages = Vec::with_capacity(rows.len());
        for row in rows {
            packages.push(self.hydrate(row).await?);
        }
        packages.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(packages)
    }

    async fn find_package(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        include_unlisted: bool,
    ) -> MetadataResult<Option<Package>> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT * FROM packages
             WHERE id = ? AND normalized_version = ? AND (listed = 1 OR ?)",
        )
        .bind(id.as_str())
        .bind(version.normalized())
        .bind(include_unlisted)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn update_listed(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        listed: bool,
    ) -> MetadataResult<bool> {
        let result = sqlx::query(
            "UPDATE packages SET listed = ? WHERE id = ? AND normalized_version = ?",
        )
        .bind(listed)
        .bind(id.as_str())
        .bind(version.normalized())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_downloads(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> MetadataResult<bool> {
        let result = sqlx::query(
            "UPDATE packages SET downloads = downloads + 1 WHERE id = ? AND normalized_version = ?",
        )
        .bind(id.as_str())
        .bind(version.normalized())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn hard_delete(&self, id: &PackageId, version: &NuGetVersion) -> MetadataResult<bool> {
        // Children and the search row go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM packages WHERE id = ? AND normalized_version = ?")
            .bind(id.as_str())
            .bind(version.normalized())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SearchIndexer for SqliteStore {
    async fn index(&self, package: &Package) -> MetadataResult<()> {
        let package_key = self
            .package_key(&package.id, &package.version)
            .await?
            .ok_or_else(|| MetadataError::NotFound(package.identity()))?;

        sqlx::query(
            r#"
            INSERT INTO search_index (package_key, search_text, package_types, indexed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(package_key) DO UPDATE SET
                search_text = excluded.search_text,
                package_types = excluded.package_types,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(package_key)
        .bind(search_text(package))
        .bind(package_type_text(package))
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SearchService for SqliteStore {
    async fn search(&self, request: &SearchRequest) -> MetadataResult<SearchResponse> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT p.* FROM packages p JOIN search_index s ON s.package_key = p.package_key \
             WHERE p.listed = 1",
        );
        if !request.include_prerelease {
            qb.push(" AND p.is_prerelease = 0");
        }
        if !request.include_semver2 {
            qb.push(" AND p.semver_level < 2");
        }
        if let Some(package_type) = request.package_type.as_deref() {
            qb.push(" AND s.package_types LIKE ");
            qb.push_bind(format!("% {} %", escape_like(&package_type.to_lowercase())));
            qb.push(" ESCAPE '\\'");
        }
        for term in request.query.split_whitespace() {
            qb.push(" AND s.search_text LIKE ");
            qb.push_bind(format!("%{}%", escape_like(&term.to_lowercase())));
            qb.push(" ESCAPE '\\'");
        }

        let rows: Vec<PackageRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut groups: BTreeMap<String, Vec<(NuGetVersion, PackageRow)>> = BTreeMap::new();
        for row in rows {
            let version = NuGetVersion::parse(&row.full_version)?;
            groups
                .entry(row.id.to_lowercase())
                .or_default()
                .push((version, row));
        }

        let mut groups: Vec<(String, Vec<(NuGetVersion, PackageRow)>, i64)> = groups
            .into_iter()
            .map(|(key, mut versions)| {
                versions.sort_by(|a, b| a.0.cmp(&b.0));
                let total = versions.iter().map(|(_, row)| row.downloads).sum();
                (key, versions, total)
            })
            .collect();
        groups.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

        let total_hits = groups.len();
        let mut data = Vec::new();
        for (_, mut versions, total_downloads) in
            groups.into_iter().skip(request.skip).take(request.take)
        {
            let summary = versions
                .iter()
                .map(|(version, row)| SearchVersion {
                    version: version.clone(),
                    downloads: row.downloads,
                })
                .collect();
            let Some((_, latest_row)) = versions.pop() else {
                continue;
            };
            let latest = self.hydrate(latest_row).await?;
            data.push(SearchResult {
                id: latest.id.clone(),
                latest,
                versions: summary,
                total_downloads,
            });
        }

        Ok(SearchResponse { total_hits, data })
    }

    async fn autocomplete(
        &self,
        query: &str,
        skip: usize,
        take: usize,
    ) -> MetadataResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.id FROM packages p
            JOIN search_index s ON s.package_key = p.package_key
            WHERE p.listed = 1 AND p.id LIKE ? ESCAPE '\'
            GROUP BY p.id
            ORDER BY p.id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(format!("%{}%", escape_like(query.trim())))
        .bind(i64::try_from(take).unwrap_or(i64::MAX))
        .bind(i64::try_from(skip).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS packages (
    package_key INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL COLLATE NOCASE,
    normalized_version TEXT NOT NULL COLLATE NOCASE,
    full_version TEXT NOT NULL,
    authors TEXT NOT NULL,
    description TEXT NOT NULL,
    summary TEXT,
    title TEXT,
    tags TEXT NOT NULL,
    icon_url TEXT,
    license_url TEXT,
    project_url TEXT,
    repository_url TEXT,
    repository_type TEXT,
    language TEXT,
    release_notes TEXT,
    copyright TEXT,
    min_client_version TEXT,
    require_license_acceptance INTEGER NOT NULL DEFAULT 0,
    has_readme INTEGER NOT NULL DEFAULT 0,
    has_embedded_icon INTEGER NOT NULL DEFAULT 0,
    is_prerelease INTEGER NOT NULL DEFAULT 0,
    listed INTEGER NOT NULL DEFAULT 1,
    downloads INTEGER NOT NULL DEFAULT 0,
    published TEXT NOT NULL,
    semver_level INTEGER NOT NULL DEFAULT 0,
    package_hash TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_packages_identity ON packages(id, normalized_version);

CREATE TABLE IF NOT EXISTS package_dependencies (
    package_key INTEGER NOT NULL REFERENCES packages(package_key) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    dependency_id TEXT,
    version_range TEXT,
    target_framework TEXT,
    PRIMARY KEY (package_key, position)
);

CREATE TABLE IF NOT EXISTS package_types (
    package_key INTEGER NOT NULL REFERENCES packages(package_key) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    version TEXT,
    PRIMARY KEY (package_key, position)
);

CREATE TABLE IF NOT EXISTS target_frameworks (
    package_key INTEGER NOT NULL REFERENCES packages(package_key) ON DELETE CASCADE,
    moniker TEXT NOT NULL COLLATE NOCASE,
    PRIMARY KEY (package_key, moniker)
);

CREATE TABLE IF NOT EXISTS search_index (
    package_key INTEGER PRIMARY KEY REFERENCES packages(package_key) ON DELETE CASCADE,
    search_text TEXT NOT NULL,
    package_types TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);
"#;
