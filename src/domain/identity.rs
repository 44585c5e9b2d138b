use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::cart::CartOwner;
use super::errors::{DomainError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Shopper,
    Supplier,
    Finance,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Shopper => "shopper",
            Role::Supplier => "supplier",
            Role::Finance => "finance",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shopper" => Ok(Role::Shopper),
            "supplier" => Ok(Role::Supplier),
            "finance" => Ok(Role::Finance),
            "admin" => Ok(Role::Admin),
            other => Err(DomainError::Forbidden(format!("unknown role '{other}'"))),
        }
    }
}

/// Who is calling, as vouched for by the identity service in front of us.
/// Roles gate access and never feed business rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub user_id: Option<Uuid>,
    pub guest_session: Option<Uuid>,
    pub roles: Vec<Role>,
}

impl Identity {
    pub fn user(user_id: Uuid, roles: Vec<Role>) -> Self {
        Self {
            user_id: Some(user_id),
            guest_session: None,
            roles,
        }
    }

    pub fn guest(session: Uuid) -> Self {
        Self {
            user_id: None,
            guest_session: Some(session),
            roles: Vec::new(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn require_user(&self) -> Result<Uuid, DomainError> {
        self.user_id
            .ok_or(DomainError::Validation(ValidationError::LoginRequired))
    }

    /// Signed-in users with `role`; anything else is turned away.
    pub fn require_role(&self, role: Role) -> Result<Uuid, DomainError> {
        let user_id = self.require_user()?;
        if self.has_role(role) {
            Ok(user_id)
        } else {
            Err(DomainError::Forbidden(format!("{role} role required")))
        }
    }

    /// The cart this caller operates on: their own when signed in, otherwise
    /// the guest slot of their device session.
    pub fn cart_owner(&self) -> Result<CartOwner, DomainError> {
        match (self.user_id, self.guest_session) {
            (Some(user_id), _) => Ok(CartOwner::User(user_id)),
            (None, Some(session)) => Ok(CartOwner::Guest(session)),
            (None, None) => Err(DomainError::Validation(ValidationError::LoginRequired)),
        }
    }
}
