//! HR repositories built on the session-backed generic repository.

use async_trait::async_trait;
use chrono::NaiveDate;

use stocker_core::TenantId;
use stocker_persistence::{
    ReadRepository, Repository, SessionBacked, SessionError, SessionRef, SessionRepository,
};

use crate::department::{Department, DepartmentId};
use crate::employee::{Employee, EmployeeId};
use crate::leave::{LeaveRequest, LeaveStatus};

#[async_trait]
pub trait EmployeeRepository: Repository<Employee> {
    async fn by_number(&self, employee_number: &str) -> Result<Option<Employee>, SessionError>;

    async fn in_department(&self, department: DepartmentId) -> Result<Vec<Employee>, SessionError>;

    /// Employees of `tenant` that are not terminated, ordered by employee number.
    async fn employed_in(&self, tenant: TenantId) -> Result<Vec<Employee>, SessionError>;
}

#[async_trait]
pub trait DepartmentRepository: Repository<Department> {
    async fn by_code(&self, code: &str) -> Result<Option<Department>, SessionError>;

    async fn children_of(&self, parent: DepartmentId) -> Result<Vec<Department>, SessionError>;
}

#[async_trait]
pub trait LeaveRequestRepository: Repository<LeaveRequest> {
    async fn for_employee(&self, employee: EmployeeId) -> Result<Vec<LeaveRequest>, SessionError>;

    async fn pending(&self) -> Result<Vec<LeaveRequest>, SessionError>;

    /// Pending or approved requests of `employee` intersecting `[start, end]`.
    async fn blocking_overlaps(
        &self,
        employee: EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LeaveRequest>, SessionError>;
}

pub struct SessionEmployeeRepository {
    inner: SessionRepository<Employee>,
}

impl SessionEmployeeRepository {
    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: SessionRepository::new(session),
        }
    }
}

impl SessionBacked<Employee> for SessionEmployeeRepository {
    fn backing(&self) -> &SessionRepository<Employee> {
        &self.inner
    }
}

#[async_trait]
impl EmployeeRepository for SessionEmployeeRepository {
    async fn by_number(&self, employee_number: &str) -> Result<Option<Employee>, SessionError> {
        let mut found = self
            .find(&|e: &Employee| e.employee_number() == employee_number)
            .await?;
        if found.len() > 1 {
            return Err(SessionError::Conflict(format!(
                "employee number {employee_number} is not unique"
            )));
        }
        Ok(found.pop())
    }

    async fn in_department(&self, department: DepartmentId) -> Result<Vec<Employee>, SessionError> {
        self.find(&|e: &Employee| e.department_id() == Some(department)).await
    }

    async fn employed_in(&self, tenant: TenantId) -> Result<Vec<Employee>, SessionError> {
        let mut employees = self
            .find(&|e: &Employee| e.tenant_id() == tenant && e.is_employed())
            .await?;
        employees.sort_by(|a, b| a.employee_number().cmp(b.employee_number()));
        Ok(employees)
    }
}

pub struct SessionDepartmentRepository {
    inner: SessionRepository<Department>,
}

impl SessionDepartmentRepository {
    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: SessionRepository::new(session),
        }
    }
}

impl SessionBacked<Department> for SessionDepartmentRepository {
    fn backing(&self) -> &SessionRepository<Department> {
        &self.inner
    }
}

#[async_trait]
impl DepartmentRepository for SessionDepartmentRepository {
    async fn by_code(&self, code: &str) -> Result<Option<Department>, SessionError> {
        let code = code.to_uppercase();
        Ok(self
            .find(&|d: &Department| d.code() == code)
            .await?
            .into_iter()
            .next())
    }

    async fn children_of(&self, parent: DepartmentId) -> Result<Vec<Department>, SessionError> {
        self.find(&|d: &Department| d.parent_id() == Some(parent)).await
    }
}

pub struct SessionLeaveRequestRepository {
    inner: SessionRepository<LeaveRequest>,
}

impl SessionLeaveRequestRepository {
    pub fn new(session: SessionRef) -> Self {
        Self {
            inner: SessionRepository::new(session),
        }
    }
}

impl SessionBacked<LeaveRequest> for SessionLeaveRequestRepository {
    fn backing(&self) -> &SessionRepository<LeaveRequest> {
        &self.inner
    }
}

#[async_trait]
impl LeaveRequestRepository for SessionLeaveRequestRepository {
    async fn for_employee(&self, employee: EmployeeId) -> Result<Vec<LeaveRequest>, SessionError> {
        let mut leaves = self
            .find(&|l: &LeaveRequest| l.employee_id() == employee)
            .await?;
        leaves.sort_by_key(LeaveRequest::start);
        Ok(leaves)
    }

    async fn pending(&self) -> Result<Vec<LeaveRequest>, SessionError> {
        self.find(&|l: &LeaveRequest| l.status() == LeaveStatus::Pending).await
    }

    async fn blocking_overlaps(
        &self,
        employee: EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LeaveRequest>, SessionError> {
        self.find(&|l: &LeaveRequest| {
            l.employee_id() == employee && l.is_blocking() && l.overlaps(start, end)
        })
        .await
    }
}
