//! HR module: employees, departments and leave requests.
//!
//! [`HrUnitOfWork`] is tenant-aware: it is built with a tenant provider and
//! scopes its convenience queries to the current tenant.

pub mod department;
pub mod employee;
pub mod leave;
pub mod repository;
pub mod unit_of_work;

pub use department::{Department, DepartmentId};
pub use employee::{Employee, EmployeeId, EmploymentStatus};
pub use leave::{LeaveKind, LeaveRequest, LeaveStatus};
pub use repository::{
    DepartmentRepository, EmployeeRepository, LeaveRequestRepository, SessionDepartmentRepository,
    SessionEmployeeRepository, SessionLeaveRequestRepository,
};
pub use unit_of_work::HrUnitOfWork;
