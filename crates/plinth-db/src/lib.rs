//! # plinth-db
//!
//! PostgreSQL storage layer for plinth.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for every core domain
//! - Recursive adjacency-list queries for the hierarchical domains
//! - The job queue with its failed-job table
//! - Object storage for media blobs
//!
//! ## Example
//!
//! ```rust,ignore
//! use plinth_db::{CreateOrganizationRequest, Database, OrganizationRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/plinth").await?;
//!
//!     let org = db.organizations.create(CreateOrganizationRequest {
//!         name: "Engineering".to_string(),
//!         slug: "engineering".to_string(),
//!         description: None,
//!         parent_id: None,
//!     }).await?;
//!
//!     println!("Created organization: {}", org.id);
//!     Ok(())
//! }
//! ```
pub mod addresses;
pub mod auth;
pub mod comments;
pub mod file_storage;
pub mod jobs;
pub mod media;
pub mod menus;
pub mod notifications;
pub mod organizations;
pub mod pool;
pub mod posts;
pub mod tags;
pub mod taxonomies;
pub mod terms;
mod tree;
pub mod users;

#[cfg(test)]
mod tests;

// Test fixtures for integration tests
// Always compiled so integration tests (in tests/) can use them.
pub mod test_fixtures;

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::Row;

// Re-export core types
pub use plinth_core::*;

pub use addresses::PgAddressRepository;
pub use auth::PgAuthRepository;
pub use comments::PgCommentRepository;
pub use file_storage::{
    compute_content_hash, generate_storage_path, FilesystemBackend, StorageBackend,
};
pub use jobs::PgJobRepository;
pub use media::PgMediaRepository;
pub use menus::{PgMenuItemRepository, PgMenuRepository};
pub use notifications::PgNotificationRepository;
pub use organizations::PgOrganizationRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use posts::PgPostRepository;
pub use tags::PgTagRepository;
pub use taxonomies::PgTaxonomyRepository;
pub use terms::PgTermRepository;
pub use users::PgUserRepository;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Read a text column holding a lowercase enum value.
pub(crate) fn get_enum<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    let raw: String = row.get(column);
    raw.parse()
        .map_err(|_| Error::Internal(format!("unexpected value '{}' in column {}", raw, column)))
}

/// Main database interface combining all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// User accounts.
    pub users: PgUserRepository,
    /// Sessions and single-use account tokens.
    pub auth: PgAuthRepository,
    /// Organization forest and memberships.
    pub organizations: PgOrganizationRepository,
    /// Taxonomy vocabularies.
    pub taxonomies: PgTaxonomyRepository,
    /// Taxonomy terms and their post assignments.
    pub terms: PgTermRepository,
    /// Posts and their tag assignments.
    pub posts: PgPostRepository,
    /// Flat tags.
    pub tags: PgTagRepository,
    /// Threaded comments.
    pub comments: PgCommentRepository,
    /// Navigation menus.
    pub menus: PgMenuRepository,
    /// Menu items (per-menu trees).
    pub menu_items: PgMenuItemRepository,
    /// Media metadata.
    pub media: PgMediaRepository,
    /// In-app notifications.
    pub notifications: PgNotificationRepository,
    /// Postal addresses for users and organizations.
    pub addresses: PgAddressRepository,
    /// Background job queue.
    pub jobs: PgJobRepository,
    /// Blob storage for media. Use `with_file_storage` to configure.
    pub storage: Option<Arc<dyn StorageBackend>>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            auth: PgAuthRepository::new(pool.clone()),
            organizations: PgOrganizationRepository::new(pool.clone()),
            taxonomies: PgTaxonomyRepository::new(pool.clone()),
            terms: PgTermRepository::new(pool.clone()),
            posts: PgPostRepository::new(pool.clone()),
            tags: PgTagRepository::new(pool.clone()),
            comments: PgCommentRepository::new(pool.clone()),
            menus: PgMenuRepository::new(pool.clone()),
            menu_items: PgMenuItemRepository::new(pool.clone()),
            media: PgMediaRepository::new(pool.clone()),
            notifications: PgNotificationRepository::new(pool.clone()),
            addresses: PgAddressRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            storage: None,
            pool,
        }
    }

    /// Configure blob storage.
    pub fn with_file_storage(mut self, backend: impl StorageBackend + 'static) -> Self {
        self.storage = Some(Arc::new(backend));
        self
    }

    /// Blob storage, or a configuration error when none was set up.
    pub fn storage(&self) -> Result<&Arc<dyn StorageBackend>> {
        self.storage
            .as_ref()
            .ok_or_else(|| Error::Config("file storage is not configured".to_string()))
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Round-trip a trivial query to check connectivity.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        let mut db = Self::new(self.pool.clone());
        db.storage = self.storage.clone();
        // Share the wakeup signal so queue() in one clone wakes workers
        // polling through another.
        db.jobs = self.jobs.clone();
        db
    }
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
