use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stocker_core::{DomainError, DomainResult, Entity, EntityId, TenantId};
use stocker_persistence::PersistentEntity;

use crate::department::DepartmentId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub EntityId);

impl EmployeeId {
    pub fn new() -> Self {
        Self(EntityId::new())
    }
}

impl Default for EmployeeId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Active,
    OnLeave,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    id: EmployeeId,
    tenant_id: TenantId,
    employee_number: String,
    first_name: String,
    last_name: String,
    department_id: Option<DepartmentId>,
    hire_date: NaiveDate,
    termination_date: Option<NaiveDate>,
    status: EmploymentStatus,
    /// Paid leave days granted per year.
    annual_leave_days: u32,
}

impl Employee {
    pub fn hire(
        tenant_id: TenantId,
        employee_number: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        hire_date: NaiveDate,
    ) -> DomainResult<Self> {
        let employee_number = employee_number.into();
        let first_name = first_name.into();
        let last_name = last_name.into();
        if employee_number.trim().is_empty() {
            return Err(DomainError::validation("employee number must not be empty"));
        }
        if first_name.trim().is_empty() || last_name.trim().is_empty() {
            return Err(DomainError::validation("employee name must not be empty"));
        }
        Ok(Self {
            id: EmployeeId::new(),
            tenant_id,
            employee_number,
            first_name,
            last_name,
            department_id: None,
            hire_date,
            termination_date: None,
            status: EmploymentStatus::Active,
            annual_leave_days: 14,
        })
    }

    pub fn id_typed(&self) -> EmployeeId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn employee_number(&self) -> &str {
        &self.employee_number
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn hire_date(&self) -> NaiveDate {
        self.hire_date
    }

    pub fn termination_date(&self) -> Option<NaiveDate> {
        self.termination_date
    }

    pub fn status(&self) -> EmploymentStatus {
        self.status
    }

    pub fn annual_leave_days(&self) -> u32 {
        self.annual_leave_days
    }

    pub fn is_employed(&self) -> bool {
        self.status != EmploymentStatus::Terminated
    }

    pub fn assign_to(&mut self, department: DepartmentId) -> DomainResult<()> {
        if !self.is_employed() {
            return Err(DomainError::invariant("terminated employees cannot be reassigned"));
        }
        self.department_id = Some(department);
        Ok(())
    }

    pub fn set_status(&mut self, status: EmploymentStatus) -> DomainResult<()> {
        if !self.is_employed() {
            return Err(DomainError::invariant("employee is terminated"));
        }
        if status == EmploymentStatus::Terminated {
            return Err(DomainError::validation("use terminate to end employment"));
        }
        self.status = status;
        Ok(())
    }

    pub fn terminate(&mut self, on: NaiveDate) -> DomainResult<()> {
        if !self.is_employed() {
            return Err(DomainError::invariant("employee is already terminated"));
        }
        if on < self.hire_date {
            return Err(DomainError::validation("termination date precedes hire date"));
        }
        self.status = EmploymentStatus::Terminated;
        self.termination_date = Some(on);
        Ok(())
    }
}

impl Entity for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl PersistentEntity for Employee {
    const ENTITY_TYPE: &'static str = "hr_employee";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn terminate_is_final() {
        let mut e = Employee::hire(TenantId::new(), "E-1", "Ada", "Lovelace", date(2024, 1, 8)).unwrap();
        assert!(e.terminate(date(2023, 12, 31)).is_err());

        e.terminate(date(2025, 6, 30)).unwrap();
        assert_eq!(e.status(), EmploymentStatus::Terminated);
        assert!(e.assign_to(DepartmentId::new()).is_err());
        assert!(e.set_status(EmploymentStatus::Active).is_err());
    }
}
