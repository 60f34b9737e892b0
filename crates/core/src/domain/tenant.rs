use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

/// A salon: the isolation unit owning orders, staff and journal entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" => Some(Self::Employee),
            "admin" => Some(Self::Admin),
            "super_admin" | "super-admin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    pub fn can_review(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tenant_id", rename_all = "snake_case")]
pub enum TenantScope {
    Tenant(TenantId),
    AllTenants,
}

impl TenantScope {
    pub fn permits(&self, tenant_id: &TenantId) -> bool {
        match self {
            Self::Tenant(own) => own == tenant_id,
            Self::AllTenants => true,
        }
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        match self {
            Self::Tenant(own) => Some(own),
            Self::AllTenants => None,
        }
    }
}

/// Identity, role and tenant scope of the caller, passed explicitly to every
/// ledger operation.
///
/// Only a super admin can hold [`TenantScope::AllTenants`]; the constructors
/// are the only way to build a context, so that pairing cannot be violated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    actor_id: ActorId,
    role: Role,
    scope: TenantScope,
    correlation_id: String,
}

impl ActorContext {
    pub fn employee(actor_id: impl Into<String>, tenant_id: TenantId) -> Self {
        Self::scoped(actor_id, Role::Employee, tenant_id)
    }

    pub fn admin(actor_id: impl Into<String>, tenant_id: TenantId) -> Self {
        Self::scoped(actor_id, Role::Admin, tenant_id)
    }

    pub fn super_admin(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: ActorId(actor_id.into()),
            role: Role::SuperAdmin,
            scope: TenantScope::AllTenants,
            correlation_id: "unassigned".to_owned(),
        }
    }

    /// Builds a context from loosely-typed caller input (CLI flags, session
    /// payloads). Non-super roles must name a tenant.
    pub fn from_parts(
        actor_id: impl Into<String>,
        role: Role,
        tenant_id: Option<TenantId>,
    ) -> Result<Self, LedgerError> {
        let actor_id = actor_id.into();
        if actor_id.trim().is_empty() {
            return Err(LedgerError::InvalidInput("actor id must not be empty".to_owned()));
        }

        match (role, tenant_id) {
            (Role::SuperAdmin, None) => Ok(Self::super_admin(actor_id)),
            (Role::SuperAdmin, Some(tenant_id)) => Ok(Self::super_admin(actor_id).focus(tenant_id)),
            (role, Some(tenant_id)) => Ok(Self::scoped(actor_id, role, tenant_id)),
            (role, None) => Err(LedgerError::InvalidInput(format!(
                "role `{}` requires a tenant id",
                role.as_str()
            ))),
        }
    }

    fn scoped(actor_id: impl Into<String>, role: Role, tenant_id: TenantId) -> Self {
        Self {
            actor_id: ActorId(actor_id.into()),
            role,
            scope: TenantScope::Tenant(tenant_id),
            correlation_id: "unassigned".to_owned(),
        }
    }

    /// Narrows a super admin onto one salon, the way the dashboard's salon
    /// switcher does. Scoped actors are returned unchanged.
    pub fn focus(mut self, tenant_id: TenantId) -> Self {
        if self.role == Role::SuperAdmin {
            self.scope = TenantScope::Tenant(tenant_id);
        }
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn authorize_tenant(&self, tenant_id: &TenantId) -> Result<(), LedgerError> {
        if self.scope.permits(tenant_id) {
            return Ok(());
        }

        Err(self.forbidden(format!("access tenant `{}`", tenant_id.0)))
    }

    pub fn require_reviewer(&self) -> Result<(), LedgerError> {
        if self.role.can_review() {
            return Ok(());
        }

        Err(self.forbidden("review journal entries or adjust pricing"))
    }

    pub fn require_super_admin(&self) -> Result<(), LedgerError> {
        if self.role == Role::SuperAdmin {
            return Ok(());
        }

        Err(self.forbidden("manage tenants"))
    }

    /// Resolves the tenant filter of a listing. Scoped actors always see their
    /// own tenant and may not ask for another one; the super role may ask for
    /// any tenant or none.
    pub fn resolve_tenant_filter(
        &self,
        requested: Option<&TenantId>,
    ) -> Result<Option<TenantId>, LedgerError> {
        match (&self.scope, requested) {
            (TenantScope::Tenant(own), None) => Ok(Some(own.clone())),
            (TenantScope::Tenant(_), Some(requested)) => {
                self.authorize_tenant(requested)?;
                Ok(Some(requested.clone()))
            }
            (TenantScope::AllTenants, requested) => Ok(requested.cloned()),
        }
    }

    /// Resolves the owner filter of an order listing. Employees only list the
    /// orders they took; reviewers see the whole salon unless they narrow it.
    pub fn resolve_owner_filter(
        &self,
        requested: Option<&ActorId>,
    ) -> Result<Option<ActorId>, LedgerError> {
        if self.role.can_review() {
            return Ok(requested.cloned());
        }
        match requested {
            Some(owner) if owner != &self.actor_id => {
                Err(self.forbidden(format!("list the orders of `{}`", owner.0)))
            }
            _ => Ok(Some(self.actor_id.clone())),
        }
    }

    /// Scoped actors get `Forbidden` for an unknown order or entry, the same
    /// answer as for one held by another salon.
    pub fn conceal_missing(&self, error: LedgerError) -> LedgerError {
        match (&self.scope, error) {
            (TenantScope::Tenant(_), LedgerError::NotFound { resource, id })
                if resource != "tenant" =>
            {
                self.forbidden(format!("access {resource} `{id}`"))
            }
            (_, error) => error,
        }
    }

    fn forbidden(&self, action: impl Into<String>) -> LedgerError {
        LedgerError::Forbidden { actor_id: self.actor_id.0.clone(), action: action.into() }
    }
}
