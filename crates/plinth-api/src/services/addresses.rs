//! Postal addresses of users and organizations.

use serde::{Deserialize, Deserializer};
use tracing::info;
use uuid::Uuid;

use plinth_core::validation::{validate_country_code, validate_optional, validate_required};
use plinth_core::{
    Address, AddressRepository, CreateAddressRequest, Error, OrganizationRepository, OwnerType,
    Result, UpdateAddressRequest, User, UserRepository,
};
use plinth_db::Database;

use super::{forbidden, require};

const FIELD_MAX_LENGTH: usize = 200;
const POSTAL_CODE_MAX_LENGTH: usize = 32;

#[derive(Debug, Deserialize)]
pub struct CreateAddressInput {
    pub owner_type: OwnerType,
    pub owner_id: Uuid,
    pub label: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: String,
}

/// Partial update. For the optional fields an absent key keeps the value and
/// an explicit `null` clears it.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAddressInput {
    #[serde(default, deserialize_with = "nullable")]
    pub label: Option<Option<String>>,
    pub line1: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub line2: Option<Option<String>>,
    pub city: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub region: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub postal_code: Option<Option<String>>,
    pub country_code: Option<String>,
}

/// A present key deserializes to `Some`, even when its value is `null`.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn validate_nullable(
    field: &str,
    value: Option<Option<String>>,
    max_len: usize,
) -> Result<Option<Option<String>>> {
    value
        .map(|v| validate_optional(field, v.as_deref(), max_len))
        .transpose()
}

#[derive(Clone)]
pub struct AddressService {
    db: Database,
}

impl AddressService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, actor: &User, input: CreateAddressInput) -> Result<Address> {
        let req = CreateAddressRequest {
            owner_type: input.owner_type,
            owner_id: input.owner_id,
            label: validate_optional("label", input.label.as_deref(), FIELD_MAX_LENGTH)?,
            line1: validate_required("line1", &input.line1, FIELD_MAX_LENGTH)?,
            line2: validate_optional("line2", input.line2.as_deref(), FIELD_MAX_LENGTH)?,
            city: validate_required("city", &input.city, FIELD_MAX_LENGTH)?,
            region: validate_optional("region", input.region.as_deref(), FIELD_MAX_LENGTH)?,
            postal_code: validate_optional(
                "postal_code",
                input.postal_code.as_deref(),
                POSTAL_CODE_MAX_LENGTH,
            )?,
            country_code: validate_country_code(&input.country_code)?,
        };

        self.ensure_owner_exists(req.owner_type, req.owner_id).await?;
        self.ensure_can_manage(actor, req.owner_type, req.owner_id).await?;

        let address = self.db.addresses.create(req).await?;
        info!(address_id = %address.id, owner_type = %address.owner_type, primary = address.is_primary, "Address created");
        Ok(address)
    }

    pub async fn get(&self, actor: &User, id: Uuid) -> Result<Address> {
        let address = require(self.db.addresses.get(id).await?, "Address", id)?;
        self.ensure_can_manage(actor, address.owner_type, address.owner_id)
            .await?;
        Ok(address)
    }

    /// Primary address first.
    pub async fn list_for_owner(&self, actor: &User, owner_type: OwnerType, owner_id: Uuid) -> Result<Vec<Address>> {
        self.ensure_owner_exists(owner_type, owner_id).await?;
        self.ensure_can_manage(actor, owner_type, owner_id).await?;
        self.db.addresses.list_for_owner(owner_type, owner_id).await
    }

    pub async fn update(&self, actor: &User, id: Uuid, input: UpdateAddressInput) -> Result<Address> {
        self.get(actor, id).await?;
        let req = UpdateAddressRequest {
            label: validate_nullable("label", input.label, FIELD_MAX_LENGTH)?,
            line1: validate_optional("line1", input.line1.as_deref(), FIELD_MAX_LENGTH)?,
            line2: validate_nullable("line2", input.line2, FIELD_MAX_LENGTH)?,
            city: validate_optional("city", input.city.as_deref(), FIELD_MAX_LENGTH)?,
            region: validate_nullable("region", input.region, FIELD_MAX_LENGTH)?,
            postal_code: validate_nullable("postal_code", input.postal_code, POSTAL_CODE_MAX_LENGTH)?,
            country_code: input
                .country_code
                .as_deref()
                .map(validate_country_code)
                .transpose()?,
        };
        self.db.addresses.update(id, req).await
    }

    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        self.get(actor, id).await?;
        self.db.addresses.delete(id).await
    }

    pub async fn set_primary(&self, actor: &User, id: Uuid) -> Result<Address> {
        self.get(actor, id).await?;
        self.db.addresses.set_primary(id).await
    }

    async fn ensure_owner_exists(&self, owner_type: OwnerType, owner_id: Uuid) -> Result<()> {
        let exists = match owner_type {
            OwnerType::User => self.db.users.exists(owner_id).await?,
            OwnerType::Organization => self.db.organizations.get(owner_id).await?.is_some(),
        };
        if exists {
            Ok(())
        } else {
            Err(Error::NotFound(format!("{} {} not found", owner_type, owner_id)))
        }
    }

    /// User addresses belong to that user; organization addresses to the
    /// organization's owners and admins. Site admins may manage all.
    async fn ensure_can_manage(&self, actor: &User, owner_type: OwnerType, owner_id: Uuid) -> Result<()> {
        if actor.is_admin() {
            return Ok(());
        }
        let allowed = match owner_type {
            OwnerType::User => actor.id == owner_id,
            OwnerType::Organization => self
                .db
                .organizations
                .member_role(owner_id, actor.id)
                .await?
                .is_some_and(|r| r.can_manage()),
        };
        if allowed {
            Ok(())
        } else {
            Err(forbidden("not allowed to manage these addresses"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_clears_and_absent_keeps() {
        let input: UpdateAddressInput =
            serde_json::from_str(r#"{"label": null, "region": "Bavaria"}"#).unwrap();
        assert_eq!(input.label, Some(None));
        assert_eq!(input.region, Some(Some("Bavaria".to_string())));
        assert_eq!(input.line2, None);
        assert_eq!(input.postal_code, None);
    }

    #[test]
    fn cleared_fields_skip_length_checks() {
        assert_eq!(validate_nullable("label", Some(None), 5).unwrap(), Some(None));
        assert_eq!(validate_nullable("label", None, 5).unwrap(), None);
        assert!(validate_nullable("label", Some(Some("x".repeat(6))), 5).is_err());
    }
}
