use serde::{Deserialize, Serialize};

use stocker_core::{DomainError, DomainResult, Entity, EntityId, TenantId};
use stocker_persistence::PersistentEntity;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub EntityId);

impl CustomerId {
    pub fn new() -> Self {
        Self(EntityId::new())
    }
}

impl Default for CustomerId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Customer as seen by the sales module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesCustomer {
    id: CustomerId,
    tenant_id: TenantId,
    code: String,
    name: String,
    email: Option<String>,
    /// Credit limit in smallest currency unit; zero means no credit.
    credit_limit: u64,
    current_balance: i64,
    active: bool,
}

impl SalesCustomer {
    pub fn new(
        tenant_id: TenantId,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> DomainResult<Self> {
        let code = code.into();
        let name = name.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("customer code must not be empty"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("customer name must not be empty"));
        }
        Ok(Self {
            id: CustomerId::new(),
            tenant_id,
            code,
            name,
            email: None,
            credit_limit: 0,
            current_balance: 0,
            active: true,
        })
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_credit_limit(mut self, limit: u64) -> Self {
        self.credit_limit = limit;
        self
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Remaining credit; negative when the balance exceeds the limit.
    pub fn available_credit(&self) -> i64 {
        self.credit_limit as i64 - self.current_balance
    }

    pub fn charge(&mut self, amount: u64) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::invariant("inactive customers cannot be charged"));
        }
        if amount as i64 > self.available_credit() {
            return Err(DomainError::invariant("credit limit exceeded"));
        }
        self.current_balance += amount as i64;
        Ok(())
    }
}

impl Entity for SalesCustomer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl PersistentEntity for SalesCustomer {
    const ENTITY_TYPE: &'static str = "sales_customer";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_respects_credit_limit() {
        let mut c = SalesCustomer::new(TenantId::new(), "C-001", "Acme")
            .unwrap()
            .with_credit_limit(1_000);

        c.charge(600).unwrap();
        assert_eq!(c.available_credit(), 400);
        assert!(c.charge(401).is_err());

        c.deactivate();
        assert!(matches!(c.charge(1), Err(DomainError::InvariantViolation(_))));
    }
}
