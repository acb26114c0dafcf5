//! Taxonomies, their term trees, and term assignment to posts.

use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use plinth_core::defaults::NAME_MAX_LENGTH;
use plinth_core::slug::resolve_slug;
use plinth_core::validation::{validate_optional, validate_required};
use plinth_core::{
    ensure_valid_move, validate_slug, CreateTaxonomyRequest, CreateTermRequest, Error, Page,
    PostRepository, Result, Taxonomy, TaxonomyRepository, Term, TermRepository, TreeEntry,
    UpdateTaxonomyRequest, UpdateTermRequest, User,
};
use plinth_db::Database;

use super::organizations::clamp_depth;
use super::{ensure_moderator, ensure_owner_or_moderator, require};

const DESCRIPTION_MAX_LENGTH: usize = 5_000;

fn default_hierarchical() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateTaxonomyInput {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_hierarchical")]
    pub hierarchical: bool,
}

/// Shared by taxonomy and term updates.
#[derive(Debug, Default, Deserialize)]
pub struct RenameInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTermInput {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

impl RenameInput {
    fn validated(self) -> Result<(Option<String>, Option<String>, Option<String>)> {
        let name = validate_optional("name", self.name.as_deref(), NAME_MAX_LENGTH)?;
        if let Some(slug) = &self.slug {
            validate_slug(slug)?;
        }
        let description =
            validate_optional("description", self.description.as_deref(), DESCRIPTION_MAX_LENGTH)?;
        Ok((name, self.slug, description))
    }
}

#[derive(Clone)]
pub struct TaxonomyService {
    db: Database,
}

impl TaxonomyService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // TAXONOMIES
    // =========================================================================

    pub async fn create(&self, actor: &User, input: CreateTaxonomyInput) -> Result<Taxonomy> {
        ensure_moderator(actor)?;
        let name = validate_required("name", &input.name, NAME_MAX_LENGTH)?;
        let slug = resolve_slug(input.slug.as_deref(), &name)?;
        let description =
            validate_optional("description", input.description.as_deref(), DESCRIPTION_MAX_LENGTH)?;

        let taxonomy = self
            .db
            .taxonomies
            .create(CreateTaxonomyRequest {
                name,
                slug,
                description,
                hierarchical: input.hierarchical,
            })
            .await?;
        info!(taxonomy_id = %taxonomy.id, "Taxonomy created");
        Ok(taxonomy)
    }

    pub async fn get(&self, id: Uuid) -> Result<Taxonomy> {
        require(self.db.taxonomies.get(id).await?, "Taxonomy", id)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Taxonomy> {
        require(self.db.taxonomies.get_by_slug(slug).await?, "Taxonomy", slug)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Page<Taxonomy>> {
        self.db.taxonomies.list(limit, offset).await
    }

    pub async fn update(&self, actor: &User, id: Uuid, input: RenameInput) -> Result<Taxonomy> {
        ensure_moderator(actor)?;
        let (name, slug, description) = input.validated()?;
        self.db
            .taxonomies
            .update(id, UpdateTaxonomyRequest { name, slug, description })
            .await
    }

    /// Delete a taxonomy with all its terms and their assignments.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        ensure_moderator(actor)?;
        self.db.taxonomies.delete(id).await?;
        info!(taxonomy_id = %id, "Taxonomy deleted");
        Ok(())
    }

    // =========================================================================
    // TERMS
    // =========================================================================

    #[instrument(skip(self, actor, input), fields(subsystem = "api", component = "taxonomies", op = "create_term"))]
    pub async fn create_term(&self, actor: &User, taxonomy_id: Uuid, input: CreateTermInput) -> Result<Term> {
        ensure_moderator(actor)?;
        let taxonomy = self.get(taxonomy_id).await?;
        let name = validate_required("name", &input.name, NAME_MAX_LENGTH)?;
        let slug = resolve_slug(input.slug.as_deref(), &name)?;
        let description =
            validate_optional("description", input.description.as_deref(), DESCRIPTION_MAX_LENGTH)?;

        if let Some(parent_id) = input.parent_id {
            self.check_parent(&taxonomy, parent_id).await?;
        }

        self.db
            .terms
            .create(CreateTermRequest {
                taxonomy_id,
                name,
                slug,
                description,
                parent_id: input.parent_id,
            })
            .await
    }

    pub async fn get_term(&self, id: Uuid) -> Result<Term> {
        require(self.db.terms.get(id).await?, "Term", id)
    }

    pub async fn update_term(&self, actor: &User, id: Uuid, input: RenameInput) -> Result<Term> {
        ensure_moderator(actor)?;
        let (name, slug, description) = input.validated()?;
        self.db
            .terms
            .update(id, UpdateTermRequest { name, slug, description })
            .await
    }

    /// Root terms, or the direct children of `parent_id`.
    pub async fn list_terms(
        &self,
        taxonomy_id: Uuid,
        parent_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Term>> {
        self.get(taxonomy_id).await?;
        self.db.terms.list(taxonomy_id, parent_id, limit, offset).await
    }

    pub async fn children(&self, id: Uuid) -> Result<Vec<Term>> {
        self.get_term(id).await?;
        self.db.terms.children(id).await
    }

    pub async fn siblings(&self, id: Uuid) -> Result<Vec<Term>> {
        self.get_term(id).await?;
        self.db.terms.siblings(id).await
    }

    pub async fn ancestors(&self, id: Uuid) -> Result<Vec<TreeEntry<Term>>> {
        self.get_term(id).await?;
        self.db.terms.ancestors(id).await
    }

    pub async fn descendants(&self, id: Uuid, max_depth: Option<i32>) -> Result<Vec<TreeEntry<Term>>> {
        self.get_term(id).await?;
        self.db.terms.descendants(id, clamp_depth(max_depth)).await
    }

    #[instrument(skip(self, actor), fields(subsystem = "api", component = "taxonomies", op = "move_term"))]
    pub async fn move_term(&self, actor: &User, id: Uuid, new_parent: Option<Uuid>) -> Result<Term> {
        ensure_moderator(actor)?;
        let term = self.get_term(id).await?;
        ensure_valid_move(&self.db.terms, id, new_parent).await?;
        if let Some(parent_id) = new_parent {
            let taxonomy = self.get(term.taxonomy_id).await?;
            self.check_parent(&taxonomy, parent_id).await?;
        }
        self.db.terms.set_parent(id, new_parent).await
    }

    pub async fn delete_term(&self, actor: &User, id: Uuid) -> Result<()> {
        ensure_moderator(actor)?;
        self.db.terms.delete(id).await
    }

    /// A parent must exist, live in the same taxonomy, and the taxonomy must
    /// allow nesting at all.
    async fn check_parent(&self, taxonomy: &Taxonomy, parent_id: Uuid) -> Result<()> {
        if !taxonomy.hierarchical {
            return Err(Error::InvalidInput(format!(
                "taxonomy '{}' is flat; terms cannot have a parent",
                taxonomy.slug
            )));
        }
        let parent = require(self.db.terms.get(parent_id).await?, "Term", parent_id)?;
        if parent.taxonomy_id != taxonomy.id {
            return Err(Error::InvalidInput(
                "parent term belongs to another taxonomy".to_string(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // ASSIGNMENT
    // =========================================================================

    /// Replace a post's terms within one taxonomy.
    pub async fn set_post_terms(
        &self,
        actor: &User,
        post_id: Uuid,
        taxonomy_id: Uuid,
        term_ids: &[Uuid],
    ) -> Result<Vec<Term>> {
        let post = require(self.db.posts.get(post_id).await?, "Post", post_id)?;
        ensure_owner_or_moderator(actor, post.author_id)?;
        self.get(taxonomy_id).await?;

        for term_id in term_ids {
            let term = require(self.db.terms.get(*term_id).await?, "Term", term_id)?;
            if term.taxonomy_id != taxonomy_id {
                return Err(Error::InvalidInput(format!(
                    "term {} does not belong to taxonomy {}",
                    term_id, taxonomy_id
                )));
            }
        }

        let mut unique = term_ids.to_vec();
        unique.sort();
        unique.dedup();
        self.db.terms.set_post_terms(post_id, taxonomy_id, &unique).await?;
        self.db.terms.post_terms(post_id).await
    }

    pub async fn post_terms(&self, post_id: Uuid) -> Result<Vec<Term>> {
        self.db.terms.post_terms(post_id).await
    }
}
