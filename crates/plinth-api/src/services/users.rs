//! Accounts, sessions and account tokens.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use plinth_core::defaults::{
    EMAIL_VERIFICATION_TTL_HOURS, NAME_MAX_LENGTH, PASSWORD_RESET_TTL_HOURS,
};
use plinth_core::validation::{validate_email, validate_password, validate_required};
use plinth_core::{
    AccountTokenKind, AuthRepository, CreateUserRequest, Error, ListUsersRequest, Membership,
    OrganizationRepository, Page, Result, Session, UpdateUserRequest, User, UserRepository,
    UserRole,
};
use plinth_db::Database;

use super::{forbidden, require};
use crate::auth::{generate_token, hash_password, hash_token, verify_password};
use crate::email::{password_reset_email, verification_email, EmailService};

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Returned once at login; the raw token is never stored.
#[derive(Debug, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserInput {
    pub display_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct UserService {
    db: Database,
    email: EmailService,
    session_ttl: Duration,
}

impl UserService {
    pub fn new(db: Database, email: EmailService, session_ttl_hours: i64) -> Self {
        Self {
            db,
            email,
            session_ttl: Duration::hours(session_ttl_hours),
        }
    }

    #[instrument(skip(self, input), fields(subsystem = "api", component = "users", op = "register"))]
    pub async fn register(&self, input: RegisterInput) -> Result<User> {
        let email = validate_email(&input.email)?;
        validate_password(&input.password)?;
        let display_name = validate_required("display_name", &input.display_name, NAME_MAX_LENGTH)?;

        if self.db.users.get_by_email(&email).await?.is_some() {
            return Err(Error::Conflict("email is already registered".to_string()));
        }

        let user = self
            .db
            .users
            .create(CreateUserRequest {
                email,
                password_hash: hash_password(&input.password)?,
                display_name,
                role: UserRole::default(),
            })
            .await?;

        let token = generate_token();
        self.db
            .auth
            .create_account_token(
                user.id,
                AccountTokenKind::EmailVerification,
                &hash_token(&token),
                Utc::now() + Duration::hours(EMAIL_VERIFICATION_TTL_HOURS),
            )
            .await?;
        self.email.dispatch(verification_email(
            self.email.base_url(),
            &user.email,
            &user.display_name,
            &token,
        ));

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    #[instrument(skip(self, input), fields(subsystem = "api", component = "users", op = "login"))]
    pub async fn login(&self, input: LoginInput) -> Result<LoginResult> {
        let invalid = || Error::Unauthorized("invalid email or password".to_string());

        let email = validate_email(&input.email).map_err(|_| invalid())?;
        let creds = self
            .db
            .users
            .get_credentials(&email)
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(&input.password, &creds.password_hash) {
            return Err(invalid());
        }
        if !creds.user.can_sign_in() {
            return Err(invalid());
        }

        let token = generate_token();
        let expires_at = Utc::now() + self.session_ttl;
        self.db
            .auth
            .create_session(creds.user.id, &hash_token(&token), expires_at)
            .await?;

        info!(user_id = %creds.user.id, "User signed in");
        Ok(LoginResult {
            token,
            expires_at,
            user: creds.user,
        })
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        let removed = self.db.auth.delete_session(&hash_token(token)).await?;
        debug!(removed, "Session ended");
        Ok(())
    }

    /// Resolve a bearer token to its live session and user.
    pub async fn authenticate(&self, token: &str) -> Result<(Session, User)> {
        self.db
            .auth
            .find_session(&hash_token(token))
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid or expired session".to_string()))
    }

    pub async fn get(&self, actor: &User, id: Uuid) -> Result<User> {
        ensure_self_or_admin(actor, id)?;
        require(self.db.users.get(id).await?, "User", id)
    }

    pub async fn list(&self, actor: &User, req: ListUsersRequest) -> Result<Page<User>> {
        if !actor.is_admin() {
            return Err(forbidden("admin role required"));
        }
        self.db.users.list(req).await
    }

    #[instrument(skip(self, actor, input), fields(subsystem = "api", component = "users", op = "update"))]
    pub async fn update(&self, actor: &User, id: Uuid, input: UpdateUserInput) -> Result<User> {
        ensure_self_or_admin(actor, id)?;
        if (input.role.is_some() || input.is_active.is_some()) && !actor.is_admin() {
            return Err(forbidden("only admins may change role or active state"));
        }
        let display_name = input
            .display_name
            .as_deref()
            .map(|n| validate_required("display_name", n, NAME_MAX_LENGTH))
            .transpose()?;

        let user = self
            .db
            .users
            .update(
                id,
                UpdateUserRequest {
                    display_name,
                    role: input.role,
                    is_active: input.is_active,
                },
            )
            .await?;

        if input.is_active == Some(false) {
            self.db.auth.delete_user_sessions(id, None).await?;
        }
        Ok(user)
    }

    /// Change a password, signing out every other session of the user.
    pub async fn change_password(
        &self,
        actor: &User,
        current_session: Uuid,
        id: Uuid,
        current: &str,
        new: &str,
    ) -> Result<()> {
        if actor.id != id {
            return Err(forbidden("users may only change their own password"));
        }
        let creds = require(self.db.users.get_credentials_by_id(id).await?, "User", id)?;
        if !verify_password(current, &creds.password_hash) {
            return Err(Error::Unauthorized("current password is incorrect".to_string()));
        }
        validate_password(new)?;

        self.db.users.set_password(id, &hash_password(new)?).await?;
        let revoked = self
            .db
            .auth
            .delete_user_sessions(id, Some(current_session))
            .await?;
        info!(user_id = %id, revoked, "Password changed");
        Ok(())
    }

    /// Soft delete. The account can no longer sign in and its sessions end.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        ensure_self_or_admin(actor, id)?;
        self.db.users.soft_delete(id).await?;
        self.db.auth.delete_user_sessions(id, None).await?;
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> Result<User> {
        let user_id = self
            .db
            .auth
            .consume_account_token(AccountTokenKind::EmailVerification, &hash_token(token))
            .await?
            .ok_or_else(|| Error::InvalidInput("verification token is invalid or expired".to_string()))?;
        self.db.users.mark_email_verified(user_id).await?;
        require(self.db.users.get(user_id).await?, "User", user_id)
    }

    /// Email a reset link when the account exists. Unknown addresses are
    /// silently ignored so the endpoint cannot be used to probe accounts.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let Ok(email) = validate_email(email) else {
            return Ok(());
        };
        let Some(user) = self.db.users.get_by_email(&email).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };
        if !user.can_sign_in() {
            return Ok(());
        }

        let token = generate_token();
        self.db
            .auth
            .create_account_token(
                user.id,
                AccountTokenKind::PasswordReset,
                &hash_token(&token),
                Utc::now() + Duration::hours(PASSWORD_RESET_TTL_HOURS),
            )
            .await?;
        self.email.dispatch(password_reset_email(
            self.email.base_url(),
            &user.email,
            &user.display_name,
            &token,
        ));
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;
        let user_id = self
            .db
            .auth
            .consume_account_token(AccountTokenKind::PasswordReset, &hash_token(token))
            .await?
            .ok_or_else(|| Error::InvalidInput("reset token is invalid or expired".to_string()))?;

        self.db
            .users
            .set_password(user_id, &hash_password(new_password)?)
            .await?;
        let revoked = self.db.auth.delete_user_sessions(user_id, None).await?;
        info!(user_id = %user_id, revoked, "Password reset");
        Ok(())
    }

    /// Organizations a user belongs to.
    pub async fn organizations(&self, actor: &User, id: Uuid) -> Result<Vec<Membership>> {
        ensure_self_or_admin(actor, id)?;
        self.db.organizations.list_for_user(id).await
    }
}

fn ensure_self_or_admin(actor: &User, id: Uuid) -> Result<()> {
    if actor.id == id || actor.is_admin() {
        Ok(())
    } else {
        Err(forbidden("not allowed to access this user"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::user;

    #[test]
    fn users_reach_only_themselves() {
        let me = user(UserRole::Editor);
        assert!(ensure_self_or_admin(&me, me.id).is_ok());
        assert!(ensure_self_or_admin(&me, Uuid::new_v4()).is_err());
        assert!(ensure_self_or_admin(&user(UserRole::Admin), me.id).is_ok());
    }
}
