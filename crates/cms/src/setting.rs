use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stocker_core::{DomainError, DomainResult, Entity, EntityId, TenantId};
use stocker_persistence::PersistentEntity;

/// Key/value site configuration entry, grouped for the admin UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSetting {
    id: EntityId,
    tenant_id: TenantId,
    group: String,
    key: String,
    value: JsonValue,
    public: bool,
}

impl SiteSetting {
    pub fn new(
        tenant_id: TenantId,
        group: impl Into<String>,
        key: impl Into<String>,
        value: JsonValue,
    ) -> DomainResult<Self> {
        let key = key.into();
        if key.trim().is_empty() || key.contains(char::is_whitespace) {
            return Err(DomainError::validation("setting key must be a non-empty token"));
        }
        Ok(Self {
            id: EntityId::new(),
            tenant_id,
            group: group.into(),
            key,
            value,
            public: false,
        })
    }

    /// Expose the setting to anonymous site visitors.
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &JsonValue {
        &self.value
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn set_value(&mut self, value: JsonValue) {
        self.value = value;
    }
}

impl Entity for SiteSetting {
    type Id = EntityId;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl PersistentEntity for SiteSetting {
    const ENTITY_TYPE: &'static str = "cms_site_setting";
}
