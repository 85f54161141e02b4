//! Tenant context for units of work that are tenant-scoped.

use std::sync::Arc;

use stocker_core::TenantId;

/// Supplies the tenant the current unit of work acts for.
pub trait TenantProvider: Send + Sync {
    fn current_tenant(&self) -> Option<TenantId>;
}

impl<P> TenantProvider for Arc<P>
where
    P: TenantProvider + ?Sized,
{
    fn current_tenant(&self) -> Option<TenantId> {
        (**self).current_tenant()
    }
}

/// Fixed tenant, typically resolved once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticTenant(pub TenantId);

impl TenantProvider for StaticTenant {
    fn current_tenant(&self) -> Option<TenantId> {
        Some(self.0)
    }
}
