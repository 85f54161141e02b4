//! Sales module: orders and customers over the per-module unit of work.
//!
//! Business rules here are deliberately small; the crate exists to expose
//! the sales repositories through [`SalesUnitOfWork`].

pub mod customer;
pub mod order;
pub mod repository;
pub mod unit_of_work;

pub use customer::{CustomerId, SalesCustomer};
pub use order::{OrderLine, SalesOrder, SalesOrderId, SalesOrderStatus};
pub use repository::{
    SalesCustomerRepository, SalesOrderRepository, SessionSalesCustomerRepository,
    SessionSalesOrderRepository,
};
pub use unit_of_work::SalesUnitOfWork;
