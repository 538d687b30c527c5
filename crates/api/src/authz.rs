//! Request principal and the access policy handlers consult.
//!
//! Authentication happens upstream; the gateway in front of this service
//! forwards the caller in `x-user-id` (signed-in users) and `x-session-id`
//! (anonymous shoppers). Handlers check access before calling a service, so
//! services stay auth-agnostic.

use std::collections::HashSet;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::SellerId;
use domain::{Order, OwnerKey};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// The caller of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl Principal {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            session_id: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none() && self.session_id.is_none()
    }

    /// Cart owner key of a signed-in user.
    pub fn user_key(&self) -> Option<OwnerKey> {
        self.user_id.as_ref().map(|id| OwnerKey::new(format!("user:{id}")))
    }

    pub fn session_key(&self) -> Option<OwnerKey> {
        self.session_id
            .as_ref()
            .map(|id| OwnerKey::new(format!("session:{id}")))
    }

    /// Key new carts are created under: the user if signed in, else the session.
    pub fn owner_key(&self) -> Option<OwnerKey> {
        self.user_key().or_else(|| self.session_key())
    }

    pub fn owns(&self, owner: &OwnerKey) -> bool {
        self.user_key().as_ref() == Some(owner) || self.session_key().as_ref() == Some(owner)
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Principal {
            user_id: header(parts, USER_ID_HEADER),
            session_id: header(parts, SESSION_ID_HEADER),
        })
    }
}

/// Decides what a principal may do.
pub trait AccessPolicy: Send + Sync {
    fn is_admin(&self, principal: &Principal) -> bool;

    /// Whether the principal may read and update this seller's orders.
    fn can_manage_seller(&self, principal: &Principal, seller_id: &SellerId) -> bool;

    fn can_access_cart(&self, principal: &Principal, owner: &OwnerKey) -> bool {
        self.is_admin(principal) || principal.owns(owner)
    }

    fn can_view_order(&self, principal: &Principal, order: &Order) -> bool {
        self.is_admin(principal) || principal.owns(order.owner_key())
    }
}

/// Policy backed by fixed id lists from configuration.
///
/// A seller is identified by a user id equal to its seller id and must be
/// on the approved list. Admins may do everything.
#[derive(Debug, Clone, Default)]
pub struct StaticAccessPolicy {
    admin_user_ids: HashSet<String>,
    approved_seller_ids: HashSet<String>,
}

impl StaticAccessPolicy {
    pub fn new(admin_user_ids: HashSet<String>, approved_seller_ids: HashSet<String>) -> Self {
        Self {
            admin_user_ids,
            approved_seller_ids,
        }
    }
}

impl AccessPolicy for StaticAccessPolicy {
    fn is_admin(&self, principal: &Principal) -> bool {
        principal
            .user_id
            .as_ref()
            .is_some_and(|id| self.admin_user_ids.contains(id))
    }

    fn can_manage_seller(&self, principal: &Principal, seller_id: &SellerId) -> bool {
        if self.is_admin(principal) {
            return true;
        }
        principal.user_id.as_deref() == Some(seller_id.as_str())
            && self.approved_seller_ids.contains(seller_id.as_str())
    }
}

/// Turns a policy decision into 401 for anonymous callers and 403 otherwise.
pub fn ensure(allowed: bool, principal: &Principal) -> Result<(), ApiError> {
    match (allowed, principal.is_anonymous()) {
        (true, _) => Ok(()),
        (false, true) => Err(ApiError::Unauthorized),
        (false, false) => Err(ApiError::Forbidden),
    }
}
