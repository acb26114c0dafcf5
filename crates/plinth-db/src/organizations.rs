//! Organization repository implementation.
//!
//! Organizations form a forest through `parent_id`. Hierarchy reads go
//! through the shared recursive queries in [`crate::tree`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use plinth_core::{
    new_v7, CreateOrganizationRequest, Error, MemberRole, Membership, Organization,
    OrganizationMember, OrganizationRepository, Page, Result, TreeEntry, TreeRepository,
    UpdateOrganizationRequest,
};

use crate::get_enum;
use crate::tree::TreeTable;

const TREE: TreeTable = TreeTable {
    table: "organizations",
    scope: None,
    order_by: "name",
};

const ORG_COLUMNS: &str = "id, name, slug, description, parent_id, created_at, updated_at";

/// PostgreSQL implementation of OrganizationRepository.
pub struct PgOrganizationRepository {
    pool: Pool<Postgres>,
}

impl PgOrganizationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_org_row(row: &PgRow) -> Result<Organization> {
        Ok(Organization {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
            description: row.get("description"),
            parent_id: row.get("parent_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn not_found(id: Uuid) -> Error {
        Error::NotFound(format!("Organization {} not found", id))
    }
}

#[async_trait]
impl TreeRepository for PgOrganizationRepository {
    fn node_kind(&self) -> &'static str {
        "organization"
    }

    async fn node_exists(&self, id: Uuid) -> Result<bool> {
        TREE.exists(&self.pool, id).await
    }

    async fn is_descendant(&self, ancestor: Uuid, candidate: Uuid) -> Result<bool> {
        TREE.is_descendant(&self.pool, ancestor, candidate).await
    }
}

#[async_trait]
impl OrganizationRepository for PgOrganizationRepository {
    async fn create(&self, req: CreateOrganizationRequest) -> Result<Organization> {
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO organizations (id, name, slug, description, parent_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {}",
            ORG_COLUMNS
        ))
        .bind(new_v7())
        .bind(&req.name)
        .bind(&req.slug)
        .bind(&req.description)
        .bind(req.parent_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(e).on_unique_violation(format!("slug '{}' is already taken", req.slug))
        })?;

        let org = Self::parse_org_row(&row)?;
        info!(
            subsystem = "db",
            component = "organizations",
            op = "create",
            node_id = %org.id,
            "Organization created"
        );
        Ok(org)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Organization>> {
        let row = sqlx::query(&format!("SELECT {} FROM organizations WHERE id = $1", ORG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_org_row).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM organizations WHERE slug = $1",
            ORG_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_org_row).transpose()
    }

    async fn list(
        &self,
        parent_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Organization>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM organizations
             WHERE parent_id IS NOT DISTINCT FROM $1
             ORDER BY name, id
             LIMIT $2 OFFSET $3",
            ORG_COLUMNS
        ))
        .bind(parent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        let orgs = rows
            .iter()
            .map(Self::parse_org_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(orgs, total))
    }

    async fn update(&self, id: Uuid, req: UpdateOrganizationRequest) -> Result<Organization> {
        let row = sqlx::query(&format!(
            "UPDATE organizations SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                updated_at = $5
             WHERE id = $1
             RETURNING {}",
            ORG_COLUMNS
        ))
        .bind(id)
        .bind(&req.name)
        .bind(&req.slug)
        .bind(&req.description)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e).on_unique_violation("slug is already taken"))?
        .ok_or_else(|| Self::not_found(id))?;

        Self::parse_org_row(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let has_children: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM organizations WHERE parent_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if has_children {
            return Err(Error::Conflict(
                "organization has child organizations; move or delete them first".to_string(),
            ));
        }

        sqlx::query("DELETE FROM addresses WHERE owner_type = 'organization' AND owner_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let deleted = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                let err = Error::Database(e);
                if err.is_foreign_key_violation() {
                    Error::Conflict("organization gained children while deleting".to_string())
                } else {
                    err
                }
            })?;

        if deleted.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "organizations",
            op = "delete",
            node_id = %id,
            "Organization deleted"
        );
        Ok(())
    }

    async fn children(&self, id: Uuid) -> Result<Vec<Organization>> {
        TREE.children(&self.pool, id, Self::parse_org_row).await
    }

    async fn siblings(&self, id: Uuid) -> Result<Vec<Organization>> {
        TREE.siblings(&self.pool, id, Self::parse_org_row).await
    }

    async fn ancestors(&self, id: Uuid) -> Result<Vec<TreeEntry<Organization>>> {
        TREE.ancestors(&self.pool, id, Self::parse_org_row).await
    }

    async fn descendants(
        &self,
        id: Uuid,
        max_depth: i32,
    ) -> Result<Vec<TreeEntry<Organization>>> {
        TREE.descendants(&self.pool, id, max_depth, Self::parse_org_row)
            .await
    }

    async fn set_parent(&self, id: Uuid, parent_id: Option<Uuid>) -> Result<Organization> {
        let row = sqlx::query(&format!(
            "UPDATE organizations SET parent_id = $2, updated_at = $3
             WHERE id = $1
             RETURNING {}",
            ORG_COLUMNS
        ))
        .bind(id)
        .bind(parent_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Self::not_found(id))?;

        info!(
            subsystem = "db",
            component = "organizations",
            op = "move",
            node_id = %id,
            parent_id = ?parent_id,
            "Organization moved"
        );
        Self::parse_org_row(&row)
    }

    async fn upsert_member(&self, org_id: Uuid, user_id: Uuid, role: MemberRole) -> Result<()> {
        sqlx::query(
            "INSERT INTO organization_members (organization_id, user_id, role, joined_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (organization_id, user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(org_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let err = Error::Database(e);
            if err.is_foreign_key_violation() {
                Error::NotFound("organization or user not found".to_string())
            } else {
                err
            }
        })?;
        Ok(())
    }

    async fn remove_member(&self, org_id: Uuid, user_id: Uuid) -> Result<bool> {
        let deleted = sqlx::query(
            "DELETE FROM organization_members WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(org_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();
        Ok(deleted > 0)
    }

    async fn list_members(&self, org_id: Uuid) -> Result<Vec<OrganizationMember>> {
        let rows = sqlx::query(
            "SELECT m.organization_id, m.user_id, m.role, m.joined_at, u.display_name, u.email
             FROM organization_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.organization_id = $1 AND u.deleted_at IS NULL
             ORDER BY m.joined_at, u.display_name",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(OrganizationMember {
                    organization_id: row.get("organization_id"),
                    user_id: row.get("user_id"),
                    role: get_enum(row, "role")?,
                    display_name: row.get("display_name"),
                    email: row.get("email"),
                    joined_at: row.get("joined_at"),
                })
            })
            .collect()
    }

    async fn member_role(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<MemberRole>> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM organization_members WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        role.map(|r| r.parse()).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>> {
        let rows = sqlx::query(
            "SELECT o.id, o.name, o.slug, o.description, o.parent_id, o.created_at, o.updated_at,
                    m.role
             FROM organization_members m
             JOIN organizations o ON o.id = m.organization_id
             WHERE m.user_id = $1
             ORDER BY o.name, o.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(Membership {
                    organization: Self::parse_org_row(row)?,
                    role: get_enum(row, "role")?,
                })
            })
            .collect()
    }
}
