use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocker_core::{DomainError, DomainResult, Entity, EntityId, TenantId};
use stocker_persistence::PersistentEntity;

use crate::slugify;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogPost {
    id: EntityId,
    tenant_id: TenantId,
    slug: String,
    title: String,
    author: String,
    summary: Option<String>,
    tags: Vec<String>,
    published_at: Option<DateTime<Utc>>,
}

impl BlogPost {
    pub fn new(
        tenant_id: TenantId,
        title: impl Into<String>,
        author: impl Into<String>,
    ) -> DomainResult<Self> {
        let title = title.into();
        let author = author.into();
        let slug = slugify(&title);
        if slug.is_empty() {
            return Err(DomainError::validation("post title must contain letters or digits"));
        }
        if author.trim().is_empty() {
            return Err(DomainError::validation("post author must not be empty"));
        }
        Ok(Self {
            id: EntityId::new(),
            tenant_id,
            slug,
            title,
            author,
            summary: None,
            tags: Vec::new(),
            published_at: None,
        })
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
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

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    /// Tags are stored lowercased and deduplicated.
    pub fn tag(&mut self, tag: &str) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_lowercase();
        self.tags.iter().any(|t| *t == tag)
    }

    pub fn publish(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.published_at.is_some() {
            return Err(DomainError::invariant("post is already published"));
        }
        self.published_at = Some(at);
        Ok(())
    }

    pub fn unpublish(&mut self) {
        self.published_at = None;
    }
}

impl Entity for BlogPost {
    type Id = EntityId;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl PersistentEntity for BlogPost {
    const ENTITY_TYPE: &'static str = "cms_blog_post";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalized() {
        let mut post = BlogPost::new(TenantId::new(), "Launch Day", "editor").unwrap();
        post.tag(" Rust ");
        post.tag("rust");
        post.tag("");
        assert_eq!(post.tags(), ["rust".to_string()]);
        assert!(post.has_tag("RUST"));
    }
}
