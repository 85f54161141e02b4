use async_trait::async_trait;

use stocker_persistence::{
    ReadRepository, Repository, SessionBacked, SessionError, SessionRef, SessionRepository,
};

use crate::blog::BlogPost;
use crate::page::{Page, PageStatus};
use crate::setting::SiteSetting;

#[async_trait]
pub trait PageRepository: Repository<Page> {
    async fn by_slug(&self, slug: &str) -> Result<Option<Page>, SessionError>;

    async fn published(&self) -> Result<Vec<Page>, SessionError>;
}

#[async_trait]
pub trait BlogPostRepository: Repository<BlogPost> {
    async fn by_slug(&self, slug: &str) -> Result<Option<BlogPost>, SessionError>;

    /// Published posts carrying `tag`, newest first.
    async fn published_with_tag(&self, tag: &str) -> Result<Vec<BlogPost>, SessionError>;
}

#[async_trait]
pub trait SiteSettingRepository: Repository<SiteSetting> {
    async fn by_key(&self, key: &str) -> Result<Option<SiteSetting>, SessionError>;

    async fn in_group(&self, group: &str) -> Result<Vec<SiteSetting>, SessionError>;
}

pub struct SessionPageRepository {
    inner: SessionRepository<Page>,
}

impl SessionPageRepository {
    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: SessionRepository::new(session),
        }
    }
}

impl SessionBacked<Page> for SessionPageRepository {
    fn backing(&self) -> &SessionRepository<Page> {
        &self.inner
    }
}

#[async_trait]
impl PageRepository for SessionPageRepository {
    async fn by_slug(&self, slug: &str) -> Result<Option<Page>, SessionError> {
        Ok(self
            .find(&|p: &Page| p.slug() == slug)
            .await?
            .into_iter()
            .next())
    }

    async fn published(&self) -> Result<Vec<Page>, SessionError> {
        self.find(&|p: &Page| p.status() == PageStatus::Published).await
    }
}

pub struct SessionBlogPostRepository {
    inner: SessionRepository<BlogPost>,
}

impl SessionBlogPostRepository {
    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: SessionRepository::new(session),
        }
    }
}

impl SessionBacked<BlogPost> for SessionBlogPostRepository {
    fn backing(&self) -> &SessionRepository<BlogPost> {
        &self.inner
    }
}

#[async_trait]
impl BlogPostRepository for SessionBlogPostRepository {
    async fn by_slug(&self, slug: &str) -> Result<Option<BlogPost>, SessionError> {
        Ok(self
            .find(&|p: &BlogPost| p.slug() == slug)
            .await?
            .into_iter()
            .next())
    }

    async fn published_with_tag(&self, tag: &str) -> Result<Vec<BlogPost>, SessionError> {
        let mut posts = self
            .find(&|p: &BlogPost| p.is_published() && p.has_tag(tag))
            .await?;
        posts.sort_by(|a, b| b.published_at().cmp(&a.published_at()));
        Ok(posts)
    }
}

pub struct SessionSiteSettingRepository {
    inner: SessionRepository<SiteSetting>,
}

impl SessionSiteSettingRepository {
    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: SessionRepository::new(session),
        }
    }
}

impl SessionBacked<SiteSetting> for SessionSiteSettingRepository {
    fn backing(&self) -> &SessionRepository<SiteSetting> {
        &self.inner
    }
}

#[async_trait]
impl SiteSettingRepository for SessionSiteSettingRepository {
    async fn by_key(&self, key: &str) -> Result<Option<SiteSetting>, SessionError> {
        let mut found = self.find(&|s: &SiteSetting| s.key() == key).await?;
        if found.len() > 1 {
            return Err(SessionError::Conflict(format!("setting key {key} is not unique")));
        }
        Ok(found.pop())
    }

    async fn in_group(&self, group: &str) -> Result<Vec<SiteSetting>, SessionError> {
        let mut settings = self.find(&|s: &SiteSetting| s.group() == group).await?;
        settings.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(settings)
    }
}
