use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Site-wide role. Ordered from most to least privileged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Editor,
    Author,
    #[default]
    Subscriber,
}

string_enum!(UserRole {
    Admin => "admin",
    Editor => "editor",
    Author => "author",
    Subscriber => "subscriber",
});

impl UserRole {
    /// Admins and editors may manage content owned by others.
    pub fn can_moderate(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Editor)
    }

    /// Subscribers cannot author posts or upload media.
    pub fn can_author(&self) -> bool {
        !matches!(self, UserRole::Subscriber)
    }
}

/// A registered account. The password hash lives only in [`UserCredentials`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Deleted or deactivated accounts cannot sign in.
    pub fn can_sign_in(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// A user together with the stored password hash, used only for login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// An authenticated session. Only the token hash is ever stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Purpose of a single-use account token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountTokenKind {
    EmailVerification,
    PasswordReset,
}

string_enum!(AccountTokenKind {
    EmailVerification => "email_verification",
    PasswordReset => "password_reset",
});
