/// Generate named repository accessors on a module unit-of-work type.
///
/// The type must implement `AsRef<UnitOfWork>`. Each entry maps an accessor
/// name to the interface it returns and the implementation constructed from
/// the unit of work's session. Implementations need a
/// `fn new(SessionRef) -> Self` constructor.
///
/// ```ignore
/// named_repositories! {
///     impl CmsUnitOfWork {
///         /// Site pages.
///         pages: dyn PageRepository => SessionPageRepository;
///         blog: dyn BlogRepository => SessionBlogRepository;
///     }
/// }
/// ```
///
/// Every accessor is cached under its interface type, so repeated calls on
/// one unit of work return the same instance.
#[macro_export]
macro_rules! named_repositories {
    (
        impl $owner:ty {
            $(
                $(#[$meta:meta])*
                $name:ident : $iface:ty => $imp:ty;
            )*
        }
    ) => {
        impl $owner {
            $(
                $(#[$meta])*
                pub fn $name(&self) -> $crate::UowResult<::std::sync::Arc<$iface>> {
                    let uow: &$crate::UnitOfWork = ::core::convert::AsRef::as_ref(self);
                    let repo: ::std::sync::Arc<$imp> =
                        uow.domain_repository::<$iface, $imp, _>(<$imp>::new)?;
                    let repo: ::std::sync::Arc<$iface> = repo;
                    Ok(repo)
                }
            )*
        }
    };
}
