//! Caller identity.
//!
//! Authentication itself lives upstream; requests arrive with a trusted
//! `X-User-Id` / `X-User-Roles` header pair set by the auth proxy, and this
//! module only answers "who is calling" and "which roles do they hold".

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Volunteer,
    Donor,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "volunteer" => Some(Role::Volunteer),
            "donor" => Some(Role::Donor),
            _ => None,
        }
    }
}

/// Opaque principal: an id plus a role set.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin role required".to_string()))
        }
    }

    pub fn require_role(&self, role: Role) -> Result<()> {
        // Admins may do anything a narrower role can.
        if self.has_role(role) || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("{role:?} role required").to_lowercase()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(AppError::Unauthorized)?
            .to_string();

        let roles = parts
            .headers
            .get("x-user-roles")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("donor")
            .split(',')
            .filter_map(Role::parse)
            .collect::<Vec<_>>();

        Ok(Principal { user_id, roles })
    }
}
