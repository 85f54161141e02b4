use std::ops::Deref;

use stocker_persistence::{SessionRef, UnitOfWork, UnitOfWorkBuilder, UowResult, named_repositories};

use crate::repository::{
    SalesCustomerRepository, SalesOrderRepository, SessionSalesCustomerRepository,
    SessionSalesOrderRepository,
};

/// Unit of work for the sales module.
///
/// Derefs to [`UnitOfWork`] for saves, transactions and disposal.
#[derive(Debug)]
pub struct SalesUnitOfWork {
    inner: UnitOfWork,
}

impl SalesUnitOfWork {
    pub const CONTEXT: &'static str = "sales";

    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: UnitOfWork::new(Self::CONTEXT, session),
        }
    }

    /// Finish `builder` with the sales context name.
    pub fn from_builder(builder: UnitOfWorkBuilder) -> UowResult<Self> {
        Ok(Self {
            inner: builder.context(Self::CONTEXT).build()?,
        })
    }
}

impl AsRef<UnitOfWork> for SalesUnitOfWork {
    fn as_ref(&self) -> &UnitOfWork {
        &self.inner
    }
}

impl Deref for SalesUnitOfWork {
    type Target = UnitOfWork;

    fn deref(&self) -> &UnitOfWork {
        &self.inner
    }
}

named_repositories! {
    impl SalesUnitOfWork {
        orders: dyn SalesOrderRepository => SessionSalesOrderRepository;
        customers: dyn SalesCustomerRepository => SessionSalesCustomerRepository;
    }
}
