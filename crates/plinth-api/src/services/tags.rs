//! Flat tags.

use uuid::Uuid;

use plinth_core::defaults::TAG_NAME_MAX_LENGTH;
use plinth_core::slug::resolve_slug;
use plinth_core::validation::{validate_optional, validate_required};
use plinth_core::{
    slugify, validate_slug, Error, Page, Result, Tag, TagRepository, TagWithCount, User,
};
use plinth_db::Database;

use super::{ensure_moderator, forbidden, require};

#[derive(Clone)]
pub struct TagService {
    db: Database,
}

impl TagService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Authors may create tags; renaming and deleting is for moderators.
    pub async fn create(&self, actor: &User, name: &str, slug: Option<&str>) -> Result<Tag> {
        if !actor.role.can_author() {
            return Err(forbidden("subscribers cannot create tags"));
        }
        let name = validate_required("name", name, TAG_NAME_MAX_LENGTH)?;
        let slug = resolve_slug(slug, &name)?;
        self.db.tags.create(&name, &slug).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Tag> {
        require(self.db.tags.get(id).await?, "Tag", id)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Tag> {
        require(self.db.tags.get_by_slug(slug).await?, "Tag", slug)
    }

    pub async fn list(&self, prefix: Option<&str>, limit: i64, offset: i64) -> Result<Page<TagWithCount>> {
        let prefix = prefix.map(str::trim).filter(|p| !p.is_empty());
        self.db.tags.list(prefix, limit, offset).await
    }

    pub async fn update(&self, actor: &User, id: Uuid, name: Option<&str>, slug: Option<&str>) -> Result<Tag> {
        ensure_moderator(actor)?;
        let name = validate_optional("name", name, TAG_NAME_MAX_LENGTH)?;
        if let Some(slug) = slug {
            validate_slug(slug)?;
        }
        self.db.tags.update(id, name.as_deref(), slug).await
    }

    /// Delete a tag and its post assignments.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        ensure_moderator(actor)?;
        self.db.tags.delete(id).await
    }

    pub async fn get_or_create(&self, name: &str) -> Result<Tag> {
        let name = validate_required("name", name, TAG_NAME_MAX_LENGTH)?;
        let slug = slugify(&name);
        if slug.is_empty() {
            return Err(Error::InvalidInput(format!(
                "tag '{}' has no letters or digits",
                name
            )));
        }
        self.db.tags.get_or_create(&name, &slug).await
    }
}
