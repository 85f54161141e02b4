use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stocker_core::{DomainError, DomainResult, Entity, EntityId, TenantId};
use stocker_persistence::PersistentEntity;

use crate::employee::EmployeeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    Annual,
    Sick,
    Unpaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// Leave request over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    id: EntityId,
    tenant_id: TenantId,
    employee_id: EmployeeId,
    kind: LeaveKind,
    start: NaiveDate,
    end: NaiveDate,
    status: LeaveStatus,
    reason: Option<String>,
}

impl LeaveRequest {
    pub fn request(
        tenant_id: TenantId,
        employee_id: EmployeeId,
        kind: LeaveKind,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DomainResult<Self> {
        if end < start {
            return Err(DomainError::validation("leave ends before it starts"));
        }
        Ok(Self {
            id: EntityId::new(),
            tenant_id,
            employee_id,
            kind,
            start,
            end,
            status: LeaveStatus::Pending,
            reason: None,
        })
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn employee_id(&self) -> EmployeeId {
        self.employee_id
    }

    pub fn kind(&self) -> LeaveKind {
        self.kind
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn status(&self) -> LeaveStatus {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start <= end && start <= self.end
    }

    /// Pending or approved requests block overlapping ones.
    pub fn is_blocking(&self) -> bool {
        matches!(self.status, LeaveStatus::Pending | LeaveStatus::Approved)
    }

    pub fn approve(&mut self) -> DomainResult<()> {
        self.decide(LeaveStatus::Approved)
    }

    pub fn reject(&mut self) -> DomainResult<()> {
        self.decide(LeaveStatus::Rejected)
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        match self.status {
            LeaveStatus::Pending | LeaveStatus::Approved => {
                self.status = LeaveStatus::Cancelled;
                Ok(())
            }
            _ => Err(DomainError::invariant("only pending or approved leave can be cancelled")),
        }
    }

    fn decide(&mut self, outcome: LeaveStatus) -> DomainResult<()> {
        if self.status != LeaveStatus::Pending {
            return Err(DomainError::invariant("leave request was already decided"));
        }
        self.status = outcome;
        Ok(())
    }
}

impl Entity for LeaveRequest {
    type Id = EntityId;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl PersistentEntity for LeaveRequest {
    const ENTITY_TYPE: &'static str = "hr_leave_request";
}
