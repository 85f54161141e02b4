//! Sales repositories.
//!
//! Domain queries are composed over the generic session repository; CRUD
//! comes from `Repository<T>`.

use async_trait::async_trait;

use stocker_persistence::{
    ReadRepository, Repository, SessionBacked, SessionError, SessionRef, SessionRepository,
};

use crate::customer::{CustomerId, SalesCustomer};
use crate::order::{SalesOrder, SalesOrderStatus};

#[async_trait]
pub trait SalesOrderRepository: Repository<SalesOrder> {
    /// Order with the given order number, if any.
    async fn by_number(&self, order_number: &str) -> Result<Option<SalesOrder>, SessionError>;

    async fn for_customer(&self, customer_id: CustomerId) -> Result<Vec<SalesOrder>, SessionError>;

    async fn with_status(&self, status: SalesOrderStatus) -> Result<Vec<SalesOrder>, SessionError>;
}

#[async_trait]
pub trait SalesCustomerRepository: Repository<SalesCustomer> {
    async fn by_code(&self, code: &str) -> Result<Option<SalesCustomer>, SessionError>;

    async fn active(&self) -> Result<Vec<SalesCustomer>, SessionError>;
}

pub struct SessionSalesOrderRepository {
    inner: SessionRepository<SalesOrder>,
}

impl SessionSalesOrderRepository {
    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: SessionRepository::new(session),
        }
    }
}

impl SessionBacked<SalesOrder> for SessionSalesOrderRepository {
    fn backing(&self) -> &SessionRepository<SalesOrder> {
        &self.inner
    }
}

#[async_trait]
impl SalesOrderRepository for SessionSalesOrderRepository {
    async fn by_number(&self, order_number: &str) -> Result<Option<SalesOrder>, SessionError> {
        let mut found = self.find(&|o: &SalesOrder| o.order_number() == order_number).await?;
        if found.len() > 1 {
            return Err(SessionError::Conflict(format!(
                "order number {order_number} is not unique"
            )));
        }
        Ok(found.pop())
    }

    async fn for_customer(&self, customer_id: CustomerId) -> Result<Vec<SalesOrder>, SessionError> {
        self.find(&|o: &SalesOrder| o.customer_id() == Some(customer_id)).await
    }

    async fn with_status(&self, status: SalesOrderStatus) -> Result<Vec<SalesOrder>, SessionError> {
        self.find(&|o: &SalesOrder| o.status() == status).await
    }
}

pub struct SessionSalesCustomerRepository {
    inner: SessionRepository<SalesCustomer>,
}

impl SessionSalesCustomerRepository {
    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: SessionRepository::new(session),
        }
    }
}

impl SessionBacked<SalesCustomer> for SessionSalesCustomerRepository {
    fn backing(&self) -> &SessionRepository<SalesCustomer> {
        &self.inner
    }
}

#[async_trait]
impl SalesCustomerRepository for SessionSalesCustomerRepository {
    async fn by_code(&self, code: &str) -> Result<Option<SalesCustomer>, SessionError> {
        Ok(self
            .find(&|c: &SalesCustomer| c.code().eq_ignore_ascii_case(code))
            .await?
            .into_iter()
            .next())
    }

    async fn active(&self) -> Result<Vec<SalesCustomer>, SessionError> {
        self.find(&|c: &SalesCustomer| c.is_active()).await
    }
}
