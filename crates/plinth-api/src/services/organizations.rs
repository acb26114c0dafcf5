//! Organization forest and memberships.

use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use plinth_core::defaults::{NAME_MAX_LENGTH, TREE_MAX_DEPTH};
use plinth_core::slug::resolve_slug;
use plinth_core::validation::{validate_optional, validate_required};
use plinth_core::{
    ensure_valid_move, validate_slug, CreateOrganizationRequest, MemberRole, Organization,
    OrganizationMember, OrganizationRepository, Page, Result, TreeEntry,
    UpdateOrganizationRequest, User, UserRepository,
};
use plinth_db::Database;

use super::{forbidden, require};

const DESCRIPTION_MAX_LENGTH: usize = 5_000;

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationInput {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrganizationInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

/// Clamp a requested subtree depth.
pub fn clamp_depth(max_depth: Option<i32>) -> i32 {
    max_depth.unwrap_or(TREE_MAX_DEPTH).clamp(1, TREE_MAX_DEPTH)
}

#[derive(Clone)]
pub struct OrganizationService {
    db: Database,
}

impl OrganizationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create an organization; the creator becomes its owner.
    #[instrument(skip(self, actor, input), fields(subsystem = "api", component = "organizations", op = "create"))]
    pub async fn create(&self, actor: &User, input: CreateOrganizationInput) -> Result<Organization> {
        let name = validate_required("name", &input.name, NAME_MAX_LENGTH)?;
        let slug = resolve_slug(input.slug.as_deref(), &name)?;
        let description = validate_optional("description", input.description.as_deref(), DESCRIPTION_MAX_LENGTH)?;

        if let Some(parent_id) = input.parent_id {
            require(self.db.organizations.get(parent_id).await?, "Organization", parent_id)?;
            self.ensure_manager(actor, parent_id).await?;
        }

        let org = self
            .db
            .organizations
            .create(CreateOrganizationRequest {
                name,
                slug,
                description,
                parent_id: input.parent_id,
            })
            .await?;
        self.db
            .organizations
            .upsert_member(org.id, actor.id, MemberRole::Owner)
            .await?;

        info!(org_id = %org.id, "Organization created");
        Ok(org)
    }

    pub async fn get(&self, id: Uuid) -> Result<Organization> {
        require(self.db.organizations.get(id).await?, "Organization", id)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Organization> {
        require(self.db.organizations.get_by_slug(slug).await?, "Organization", slug)
    }

    pub async fn list(&self, parent_id: Option<Uuid>, limit: i64, offset: i64) -> Result<Page<Organization>> {
        self.db.organizations.list(parent_id, limit, offset).await
    }

    pub async fn update(&self, actor: &User, id: Uuid, input: UpdateOrganizationInput) -> Result<Organization> {
        self.get(id).await?;
        self.ensure_manager(actor, id).await?;
        let name = validate_optional("name", input.name.as_deref(), NAME_MAX_LENGTH)?;
        if let Some(slug) = &input.slug {
            validate_slug(slug)?;
        }
        let description = validate_optional("description", input.description.as_deref(), DESCRIPTION_MAX_LENGTH)?;

        self.db
            .organizations
            .update(
                id,
                UpdateOrganizationRequest {
                    name,
                    slug: input.slug,
                    description,
                },
            )
            .await
    }

    /// Delete a leaf organization.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        self.get(id).await?;
        self.ensure_manager(actor, id).await?;
        self.db.organizations.delete(id).await?;
        info!(org_id = %id, "Organization deleted");
        Ok(())
    }

    pub async fn children(&self, id: Uuid) -> Result<Vec<Organization>> {
        self.get(id).await?;
        self.db.organizations.children(id).await
    }

    pub async fn siblings(&self, id: Uuid) -> Result<Vec<Organization>> {
        self.get(id).await?;
        self.db.organizations.siblings(id).await
    }

    pub async fn ancestors(&self, id: Uuid) -> Result<Vec<TreeEntry<Organization>>> {
        self.get(id).await?;
        self.db.organizations.ancestors(id).await
    }

    pub async fn descendants(&self, id: Uuid, max_depth: Option<i32>) -> Result<Vec<TreeEntry<Organization>>> {
        self.get(id).await?;
        self.db.organizations.descendants(id, clamp_depth(max_depth)).await
    }

    /// Re-parent an organization together with its subtree.
    #[instrument(skip(self, actor), fields(subsystem = "api", component = "organizations", op = "move"))]
    pub async fn move_to(&self, actor: &User, id: Uuid, new_parent: Option<Uuid>) -> Result<Organization> {
        self.get(id).await?;
        self.ensure_manager(actor, id).await?;
        ensure_valid_move(&self.db.organizations, id, new_parent).await?;
        if let Some(parent) = new_parent {
            self.ensure_manager(actor, parent).await?;
        }
        let org = self.db.organizations.set_parent(id, new_parent).await?;
        info!(org_id = %id, parent_id = ?new_parent, "Organization moved");
        Ok(org)
    }

    pub async fn add_member(&self, actor: &User, org_id: Uuid, user_id: Uuid, role: MemberRole) -> Result<Vec<OrganizationMember>> {
        self.get(org_id).await?;
        self.ensure_manager(actor, org_id).await?;
        if !self.db.users.exists(user_id).await? {
            return Err(plinth_core::Error::NotFound(format!("User {} not found", user_id)));
        }
        self.db.organizations.upsert_member(org_id, user_id, role).await?;
        self.db.organizations.list_members(org_id).await
    }

    pub async fn remove_member(&self, actor: &User, org_id: Uuid, user_id: Uuid) -> Result<()> {
        self.get(org_id).await?;
        if actor.id != user_id {
            self.ensure_manager(actor, org_id).await?;
        }
        if !self.db.organizations.remove_member(org_id, user_id).await? {
            return Err(plinth_core::Error::NotFound(format!(
                "User {} is not a member of organization {}",
                user_id, org_id
            )));
        }
        Ok(())
    }

    /// Members are visible to other members and site admins.
    pub async fn list_members(&self, actor: &User, org_id: Uuid) -> Result<Vec<OrganizationMember>> {
        self.get(org_id).await?;
        if !actor.is_admin()
            && self
                .db
                .organizations
                .member_role(org_id, actor.id)
                .await?
                .is_none()
        {
            return Err(forbidden("members only"));
        }
        self.db.organizations.list_members(org_id).await
    }

    /// Site admins, or owners and admins of the organization.
    pub async fn ensure_manager(&self, actor: &User, org_id: Uuid) -> Result<()> {
        if actor.is_admin() {
            return Ok(());
        }
        match self.db.organizations.member_role(org_id, actor.id).await? {
            Some(role) if role.can_manage() => Ok(()),
            _ => Err(forbidden("organization owner or admin role required")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_bounded() {
        assert_eq!(clamp_depth(None), TREE_MAX_DEPTH);
        assert_eq!(clamp_depth(Some(0)), 1);
        assert_eq!(clamp_depth(Some(3)), 3);
        assert_eq!(clamp_depth(Some(1_000)), TREE_MAX_DEPTH);
    }
}
