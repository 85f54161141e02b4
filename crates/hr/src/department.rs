use serde::{Deserialize, Serialize};

use stocker_core::{DomainError, DomainResult, Entity, EntityId, TenantId};
use stocker_persistence::PersistentEntity;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentId(pub EntityId);

impl DepartmentId {
    pub fn new() -> Self {
        Self(EntityId::new())
    }
}

impl Default for DepartmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Organizational unit; departments form a tree through `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    id: DepartmentId,
    tenant_id: TenantId,
    code: String,
    name: String,
    parent_id: Option<DepartmentId>,
}

impl Department {
    pub fn new(
        tenant_id: TenantId,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> DomainResult<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("department code must not be empty"));
        }
        Ok(Self {
            id: DepartmentId::new(),
            tenant_id,
            code: code.to_uppercase(),
            name: name.into(),
            parent_id: None,
        })
    }

    pub fn under(mut self, parent: &Department) -> DomainResult<Self> {
        if parent.id == self.id {
            return Err(DomainError::invariant("a department cannot be its own parent"));
        }
        if parent.tenant_id != self.tenant_id {
            return Err(DomainError::invariant("parent department belongs to another tenant"));
        }
        self.parent_id = Some(parent.id);
        Ok(self)
    }

    pub fn id_typed(&self) -> DepartmentId {
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

    pub fn parent_id(&self) -> Option<DepartmentId> {
        self.parent_id
    }
}

impl Entity for Department {
    type Id = DepartmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl PersistentEntity for Department {
    const ENTITY_TYPE: &'static str = "hr_department";
}
