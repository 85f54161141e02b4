use std::ops::Deref;

use stocker_persistence::{SessionRef, UnitOfWork, UnitOfWorkBuilder, UowResult, named_repositories};

use crate::repository::{
    BlogPostRepository, PageRepository, SessionBlogPostRepository, SessionPageRepository,
    SessionSiteSettingRepository, SiteSettingRepository,
};

/// Unit of work for the CMS module.
///
/// Each accessor resolves its repository once per unit of work; later calls
/// return the cached instance.
#[derive(Debug)]
pub struct CmsUnitOfWork {
    inner: UnitOfWork,
}

impl CmsUnitOfWork {
    pub const CONTEXT: &'static str = "cms";

    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: UnitOfWork::new(Self::CONTEXT, session),
        }
    }

    pub fn from_builder(builder: UnitOfWorkBuilder) -> UowResult<Self> {
        Ok(Self {
            inner: builder.context(Self::CONTEXT).build()?,
        })
    }
}

impl AsRef<UnitOfWork> for CmsUnitOfWork {
    fn as_ref(&self) -> &UnitOfWork {
        &self.inner
    }
}

impl Deref for CmsUnitOfWork {
    type Target = UnitOfWork;

    fn deref(&self) -> &UnitOfWork {
        &self.inner
    }
}

named_repositories! {
    impl CmsUnitOfWork {
        pages: dyn PageRepository => SessionPageRepository;
        blog: dyn BlogPostRepository => SessionBlogPostRepository;
        settings: dyn SiteSettingRepository => SessionSiteSettingRepository;
    }
}
