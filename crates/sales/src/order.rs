use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocker_core::{DomainError, DomainResult, Entity, EntityId, TenantId};
use stocker_persistence::PersistentEntity;

use crate::customer::CustomerId;

/// Sales order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesOrderId(pub EntityId);

impl SalesOrderId {
    pub fn new() -> Self {
        Self(EntityId::new())
    }
}

impl Default for SalesOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SalesOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sales order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesOrderStatus {
    Draft,
    Approved,
    Confirmed,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

/// Order line: product, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_code: String,
    pub quantity: u64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
}

impl OrderLine {
    pub fn amount(&self) -> u64 {
        self.quantity.saturating_mul(self.unit_price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    id: SalesOrderId,
    tenant_id: TenantId,
    order_number: String,
    customer_id: Option<CustomerId>,
    order_date: DateTime<Utc>,
    status: SalesOrderStatus,
    currency: String,
    lines: Vec<OrderLine>,
}

impl SalesOrder {
    /// New draft order. The order number is the natural key shown to users.
    pub fn draft(
        tenant_id: TenantId,
        order_number: impl Into<String>,
        customer_id: Option<CustomerId>,
        order_date: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let order_number = order_number.into();
        if order_number.trim().is_empty() {
            return Err(DomainError::validation("order number must not be empty"));
        }
        Ok(Self {
            id: SalesOrderId::new(),
            tenant_id,
            order_number,
            customer_id,
            order_date,
            status: SalesOrderStatus::Draft,
            currency: "TRY".to_string(),
            lines: Vec::new(),
        })
    }

    pub fn id_typed(&self) -> SalesOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn order_date(&self) -> DateTime<Utc> {
        self.order_date
    }

    pub fn status(&self) -> SalesOrderStatus {
        self.status
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, SalesOrderStatus::Draft)
    }

    /// Sum of line amounts in the smallest currency unit.
    pub fn total(&self) -> u64 {
        self.lines
            .iter()
            .fold(0u64, |acc, line| acc.saturating_add(line.amount()))
    }

    pub fn add_line(
        &mut self,
        product_code: impl Into<String>,
        quantity: u64,
        unit_price: u64,
    ) -> DomainResult<()> {
        if !self.is_modifiable() {
            return Err(DomainError::invariant("order is no longer modifiable"));
        }
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let product_code = product_code.into();
        if product_code.trim().is_empty() {
            return Err(DomainError::validation("product code must not be empty"));
        }

        self.lines.push(OrderLine {
            line_no: (self.lines.len() + 1) as u32,
            product_code,
            quantity,
            unit_price,
        });
        Ok(())
    }

    pub fn confirm(&mut self) -> DomainResult<()> {
        match self.status {
            SalesOrderStatus::Draft | SalesOrderStatus::Approved => {}
            _ => return Err(DomainError::invariant("only draft or approved orders can be confirmed")),
        }
        if self.lines.is_empty() {
            return Err(DomainError::invariant("cannot confirm an order without lines"));
        }
        self.status = SalesOrderStatus::Confirmed;
        Ok(())
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        match self.status {
            SalesOrderStatus::Delivered | SalesOrderStatus::Completed => {
                Err(DomainError::invariant("delivered orders cannot be cancelled"))
            }
            SalesOrderStatus::Cancelled => Err(DomainError::invariant("order is already cancelled")),
            _ => {
                self.status = SalesOrderStatus::Cancelled;
                Ok(())
            }
        }
    }
}

impl Entity for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl PersistentEntity for SalesOrder {
    const ENTITY_TYPE: &'static str = "sales_order";
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn draft_order() -> SalesOrder {
        SalesOrder::draft(TenantId::new(), "SO-0001", None, Utc::now()).unwrap()
    }

    #[test]
    fn empty_order_number_is_rejected() {
        let err = SalesOrder::draft(TenantId::new(), "  ", None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn confirmed_order_rejects_new_lines() {
        let mut order = draft_order();
        assert!(order.confirm().is_err());

        order.add_line("SKU-1", 2, 1_500).unwrap();
        order.confirm().unwrap();
        assert_eq!(order.status(), SalesOrderStatus::Confirmed);

        let err = order.add_line("SKU-2", 1, 100).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cancel_is_refused_once_completed() {
        let mut order = draft_order();
        order.cancel().unwrap();
        assert!(order.cancel().is_err());

        let mut done = draft_order();
        done.status = SalesOrderStatus::Completed;
        assert!(done.cancel().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the order total equals the sum of quantity * unit price
        /// over its lines, and line numbers are sequential from 1.
        #[test]
        fn total_is_sum_of_lines(
            lines in prop::collection::vec((1u64..1_000, 0u64..1_000_000), 0..20)
        ) {
            let mut order = draft_order();
            for (qty, price) in &lines {
                order.add_line("SKU", *qty, *price).unwrap();
            }

            let expected: u64 = lines.iter().map(|(q, p)| q * p).sum();
            prop_assert_eq!(order.total(), expected);
            for (idx, line) in order.lines().iter().enumerate() {
                prop_assert_eq!(line.line_no as usize, idx + 1);
            }
        }
    }
}
