//! CMS module: pages, blog posts and site settings.

pub mod blog;
pub mod page;
pub mod repository;
pub mod setting;
pub mod unit_of_work;

pub use blog::BlogPost;
pub use page::{Page, PageStatus};
pub use repository::{
    BlogPostRepository, PageRepository, SessionBlogPostRepository, SessionPageRepository,
    SessionSiteSettingRepository, SiteSettingRepository,
};
pub use setting::SiteSetting;
pub use unit_of_work::CmsUnitOfWork;

/// Normalize a title or user-supplied slug into a URL slug.
///
/// Lowercases ASCII, maps runs of non-alphanumerics to a single `-` and trims
/// leading/trailing dashes.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
