use std::ops::Deref;

use tracing::debug;

use stocker_persistence::{
    ReadRepository, Repository, SessionError, SessionRef, TenantProvider, UnitOfWork, UowResult,
    named_repositories,
};

use crate::employee::Employee;
use crate::leave::LeaveRequest;
use crate::repository::{
    DepartmentRepository, EmployeeRepository, LeaveRequestRepository, SessionDepartmentRepository,
    SessionEmployeeRepository, SessionLeaveRequestRepository,
};

/// Tenant-scoped unit of work for the HR module.
#[derive(Debug)]
pub struct HrUnitOfWork {
    inner: UnitOfWork,
}

impl HrUnitOfWork {
    pub const CONTEXT: &'static str = "hr";

    pub fn new<P>(session: SessionRef, tenant: P) -> UowResult<Self>
    where
        P: TenantProvider + 'static,
    {
        let inner = UnitOfWork::builder()
            .context(Self::CONTEXT)
            .session(session)
            .tenant(tenant)
            .build()?;
        Ok(Self { inner })
    }

    /// Wrap a unit of work that was configured elsewhere (custom sink, ...).
    ///
    /// The unit of work must carry a tenant provider for the tenant-scoped
    /// helpers to work.
    pub fn from_unit_of_work(inner: UnitOfWork) -> Self {
        Self { inner }
    }

    /// Employees of the current tenant still on payroll.
    pub async fn current_employees(&self) -> UowResult<Vec<Employee>> {
        let tenant = self.tenant_id()?;
        Ok(self.employees()?.employed_in(tenant).await?)
    }

    /// Stage a leave request for the current tenant.
    ///
    /// Fails with a conflict if the employee is unknown, belongs to another
    /// tenant, or already has pending/approved leave in the same range.
    pub async fn submit_leave(&self, request: LeaveRequest) -> UowResult<()> {
        let tenant = self.tenant_id()?;
        if request.tenant_id() != tenant {
            return Err(SessionError::Conflict("leave request belongs to another tenant".into()).into());
        }

        let employee = self.employees()?.get(&request.employee_id()).await?;
        match employee {
            Some(e) if e.tenant_id() == tenant && e.is_employed() => {}
            _ => {
                return Err(SessionError::Conflict(format!(
                    "employee {} is not employed by this tenant",
                    request.employee_id()
                ))
                .into());
            }
        }

        let leaves = self.leaves()?;
        let clashes = leaves
            .blocking_overlaps(request.employee_id(), request.start(), request.end())
            .await?;
        if !clashes.is_empty() {
            debug!(
                employee_id = %request.employee_id(),
                clashes = clashes.len(),
                "leave request overlaps existing leave"
            );
            return Err(SessionError::Conflict("leave overlaps an existing request".into()).into());
        }

        leaves.add(request).await?;
        Ok(())
    }
}

impl AsRef<UnitOfWork> for HrUnitOfWork {
    fn as_ref(&self) -> &UnitOfWork {
        &self.inner
    }
}

impl Deref for HrUnitOfWork {
    type Target = UnitOfWork;

    fn deref(&self) -> &UnitOfWork {
        &self.inner
    }
}

named_repositories! {
    impl HrUnitOfWork {
        /// Employee records.
        employees: dyn EmployeeRepository => SessionEmployeeRepository;
        departments: dyn DepartmentRepository => SessionDepartmentRepository;
        /// Leave requests; prefer [`HrUnitOfWork::submit_leave`] for new ones.
        leaves: dyn LeaveRequestRepository => SessionLeaveRequestRepository;
    }
}
