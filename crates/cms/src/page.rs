use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocker_core::{DomainError, DomainResult, Entity, EntityId, TenantId};
use stocker_persistence::PersistentEntity;

use crate::slugify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Draft,
    Published,
    Archived,
}

/// A standalone CMS page addressed by its slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    id: EntityId,
    tenant_id: TenantId,
    slug: String,
    title: String,
    body: String,
    status: PageStatus,
    published_at: Option<DateTime<Utc>>,
}

impl Page {
    /// New draft page. The slug is derived from `title`.
    pub fn draft(tenant_id: TenantId, title: impl Into<String>) -> DomainResult<Self> {
        let title = title.into();
        let slug = slugify(&title);
        if slug.is_empty() {
            return Err(DomainError::validation("page title must contain letters or digits"));
        }
        Ok(Self {
            id: EntityId::new(),
            tenant_id,
            slug,
            title,
            body: String::new(),
            status: PageStatus::Draft,
            published_at: None,
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn status(&self) -> PageStatus {
        self.status
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    pub fn set_body(&mut self, body: impl Into<String>) -> DomainResult<()> {
        if self.status == PageStatus::Archived {
            return Err(DomainError::invariant("archived pages are read-only"));
        }
        self.body = body.into();
        Ok(())
    }

    pub fn rename_slug(&mut self, slug: &str) -> DomainResult<()> {
        let slug = slugify(slug);
        if slug.is_empty() {
            return Err(DomainError::validation("slug must contain letters or digits"));
        }
        self.slug = slug;
        Ok(())
    }

    pub fn publish(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            PageStatus::Draft => {
                self.status = PageStatus::Published;
                self.published_at = Some(at);
                Ok(())
            }
            PageStatus::Published => Err(DomainError::invariant("page is already published")),
            PageStatus::Archived => Err(DomainError::invariant("archived pages cannot be published")),
        }
    }

    pub fn archive(&mut self) {
        self.status = PageStatus::Archived;
    }
}

impl Entity for Page {
    type Id = EntityId;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl PersistentEntity for Page {
    const ENTITY_TYPE: &'static str = "cms_page";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_only_from_draft() {
        let mut page = Page::draft(TenantId::new(), "About Us").unwrap();
        assert_eq!(page.slug(), "about-us");

        let now = Utc::now();
        page.publish(now).unwrap();
        assert_eq!(page.published_at(), Some(now));
        assert!(page.publish(now).is_err());

        page.archive();
        assert!(matches!(page.set_body("x"), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn empty_slug_is_rejected() {
        assert!(Page::draft(TenantId::new(), "???").is_err());
    }
}
