//! Request gate: bearer extraction, token verification, identity resolution
//! and the route's access decision, run in that order.
//!
//! Every stage either advances or rejects; a rejection is final for the request.

use service_core::axum::http::{header::AUTHORIZATION, HeaderMap};
use thiserror::Error;

use super::access::{self, Denial, Requirement};
use super::error::ServiceError;
use super::identity::{IdentityResolver, ResolveError};
use super::jwt::{JwtService, TokenError};
use super::store::StoreError;
use crate::models::Identity;

/// Progress of one request through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    Start,
    TokenExtracted,
    TokenVerified,
    IdentityResolved,
    Authorized,
}

#[derive(Debug, Error)]
pub enum GateRejection {
    #[error("Authentication token is required")]
    MissingToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("User not found")]
    UserNotFound,

    #[error("User not authenticated")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Store failure: {0}")]
    StoreFailure(anyhow::Error),
}

impl GateRejection {
    /// Stage the request had reached when it was turned away.
    pub fn stage(&self) -> GateStage {
        match self {
            GateRejection::MissingToken => GateStage::Start,
            GateRejection::TokenExpired | GateRejection::TokenInvalid => GateStage::TokenExtracted,
            GateRejection::UserNotFound | GateRejection::StoreFailure(_) => GateStage::TokenVerified,
            GateRejection::Unauthenticated | GateRejection::Forbidden(_) => {
                GateStage::IdentityResolved
            }
        }
    }
}

impl From<GateRejection> for ServiceError {
    fn from(rejection: GateRejection) -> Self {
        match rejection {
            GateRejection::Forbidden(reason) => ServiceError::Forbidden(reason.to_string()),
            GateRejection::StoreFailure(e) => ServiceError::Store(e),
            other => ServiceError::Unauthenticated(other.to_string()),
        }
    }
}

impl From<Denial> for GateRejection {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthenticated => GateRejection::Unauthenticated,
            Denial::Forbidden(reason) => GateRejection::Forbidden(reason),
        }
    }
}

#[derive(Clone)]
pub struct RequestGate {
    tokens: JwtService,
    resolver: IdentityResolver,
}

impl RequestGate {
    pub fn new(tokens: JwtService, resolver: IdentityResolver) -> Self {
        Self { tokens, resolver }
    }

    /// Establish who is calling. Runs the gate up to `IdentityResolved`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, GateRejection> {
        let token = extract_bearer(headers).inspect_err(|rejection| reject(rejection))?;
        tracing::debug!(stage = ?GateStage::TokenExtracted, "Bearer token extracted");

        let claims = self.tokens.verify(token).map_err(|e| {
            let rejection = match e {
                TokenError::Expired => GateRejection::TokenExpired,
                TokenError::Invalid | TokenError::Signing(_) => GateRejection::TokenInvalid,
            };
            reject(&rejection);
            rejection
        })?;
        tracing::debug!(stage = ?GateStage::TokenVerified, user_id = %claims.id, "Token verified");

        let identity = self.resolver.resolve(&claims).await.map_err(|e| {
            let rejection = match e {
                ResolveError::UserNotFound(_) => GateRejection::UserNotFound,
                ResolveError::Store(StoreError::Backend(e)) => GateRejection::StoreFailure(e),
                ResolveError::Store(other) => GateRejection::StoreFailure(anyhow::anyhow!(other)),
            };
            reject(&rejection);
            rejection
        })?;
        tracing::debug!(
            stage = ?GateStage::IdentityResolved,
            user_id = %identity.user.id,
            roles = identity.roles.len(),
            permissions = identity.permissions.len(),
            "Identity resolved"
        );

        Ok(identity)
    }

    /// Check an established identity against a route requirement.
    pub fn authorize(
        &self,
        identity: Option<&Identity>,
        requirement: &Requirement,
    ) -> Result<(), GateRejection> {
        access::evaluate(identity, requirement).map_err(|denial| {
            let rejection = GateRejection::from(denial);
            if let Some(identity) = identity {
                tracing::warn!(
                    user_id = %identity.user.id,
                    required = ?requirement.names(),
                    reason = %rejection,
                    "Access denied"
                );
            } else {
                reject(&rejection);
            }
            rejection
        })?;

        tracing::debug!(stage = ?GateStage::Authorized, ?requirement, "Request authorized");
        Ok(())
    }

    /// Run the whole gate for one request.
    pub async fn admit(
        &self,
        headers: &HeaderMap,
        requirement: &Requirement,
    ) -> Result<Identity, GateRejection> {
        let identity = self.authenticate(headers).await?;
        self.authorize(Some(&identity), requirement)?;
        Ok(identity)
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, GateRejection> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(GateRejection::MissingToken)?;

    let (scheme, token) = value.split_once(' ').ok_or(GateRejection::MissingToken)?;
    if scheme != "Bearer" {
        return Err(GateRejection::MissingToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(GateRejection::MissingToken);
    }
    Ok(token)
}

fn reject(rejection: &GateRejection) {
    match rejection {
        GateRejection::StoreFailure(e) => {
            tracing::error!(stage = ?rejection.stage(), error = %e, "Gate could not reach the store")
        }
        _ => tracing::warn!(stage = ?rejection.stage(), reason = %rejection, "Request rejected"),
    }
}
