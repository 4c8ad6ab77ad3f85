//! Tenant identity carried through every job submission.
//!
//! The tenant API-key store and signing-secret registration flow live outside
//! this crate; a `TenantContext` is simply the output of that external
//! credential oracle, already validated by the time it reaches the core.

use std::collections::BTreeMap;
use std::fmt;

/// A tenant identifier. A sentinel value (`TenantId::development()`) is used
/// in development mode when no real tenant has been registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn development() -> Self {
        Self("development".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for TenantId {
    fn from(s: S) -> Self {
        Self(s.into())
    }
}

/// The broad class of tenant, used to select validation rules at submission
/// time (e.g. the Shopify identifier pattern) and to decide whether
/// development-mode auth bypass is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantType {
    Shopify,
    SupabaseApp,
    Custom,
    Development,
}

/// Context carried with every submission and orchestrator step.
///
/// Produced by the external credential oracle; the core never mutates it.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub tenant_type: TenantType,
    pub metadata: BTreeMap<String, String>,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<TenantId>, tenant_type: TenantType) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            tenant_type,
            metadata: BTreeMap::new(),
        }
    }

    /// The sentinel context used when the HTTP adapter is configured to
    /// bypass authentication (local development only).
    pub fn development() -> Self {
        Self::new(TenantId::development(), TenantType::Development)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_development(&self) -> bool {
        matches!(self.tenant_type, TenantType::Development)
    }
}

/// Validates the Shopify store-identifier shape: any identifier not
/// ending in `.myshopify.com` is rejected during tenant
/// registration (an external-collaborator concern; kept here only so
/// drivers/tests sharing this crate can exercise the same rule).
pub fn is_valid_shopify_identifier(identifier: &str) -> bool {
    identifier.ends_with(".myshopify.com") && identifier.len() > ".myshopify.com".len()
}
