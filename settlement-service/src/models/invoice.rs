//! Invoice model for settlement-service.

use crate::models::access::Visibility;
use crate::settlement::ledger::{PaymentStatus, SettlementStep};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Administrative invoice status. Independent of the payment ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Completed => "completed",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

/// `amount * rate / 100`, rounded to cents with midpoints away from zero.
/// `None` when the product does not fit in a `Decimal`.
pub fn commission_amount(amount: Decimal, rate: Decimal) -> Option<Decimal> {
    Some(
        amount
            .checked_mul(rate)?
            .checked_div(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
    )
}

/// Commission rates and amounts frozen onto an invoice when it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSnapshot {
    pub client_rate: Decimal,
    pub distributor_rate: Decimal,
    pub company_rate: Decimal,
    pub client_amount: Decimal,
    pub distributor_amount: Decimal,
    pub company_amount: Decimal,
    pub computed_utc: DateTime<Utc>,
}

impl CommissionSnapshot {
    pub fn from_rates(
        amount: Decimal,
        client_rate: Decimal,
        distributor_rate: Decimal,
        company_rate: Decimal,
    ) -> Option<Self> {
        let snapshot = Self {
            client_rate,
            distributor_rate,
            company_rate,
            client_amount: commission_amount(amount, client_rate)?,
            distributor_amount: commission_amount(amount, distributor_rate)?,
            company_amount: commission_amount(amount, company_rate)?,
            computed_utc: Utc::now(),
        };
        snapshot.net_profit(amount)?;
        Some(snapshot)
    }

    pub fn total_commission(&self) -> Option<Decimal> {
        self.client_amount
            .checked_add(self.distributor_amount)?
            .checked_add(self.company_amount)
    }

    pub fn net_profit(&self, amount: Decimal) -> Option<Decimal> {
        amount.checked_sub(self.total_commission()?)
    }
}

/// Invoice document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub invoice_code: String,
    pub amount: Decimal,
    pub invoice_date: NaiveDate,
    pub status: InvoiceStatus,
    pub client_id: Uuid,
    pub file_id: Uuid,
    pub assigned_distributor_id: Uuid,
    pub created_by: Uuid,
    pub commission: CommissionSnapshot,
    pub payment_status: PaymentStatus,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    /// New invoice with every payment step unpaid.
    pub fn new(input: CreateInvoice, created_by: Uuid, commission: CommissionSnapshot) -> Self {
        let now = Utc::now();
        Self {
            invoice_id: Uuid::new_v4(),
            invoice_code: input.invoice_code,
            amount: input.amount,
            invoice_date: input.invoice_date,
            status: input.status.unwrap_or_default(),
            client_id: input.client_id,
            file_id: input.file_id,
            assigned_distributor_id: input.assigned_distributor_id,
            created_by,
            commission,
            payment_status: PaymentStatus::default(),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn net_profit(&self) -> Option<Decimal> {
        self.commission.net_profit(self.amount)
    }
}

/// Input for creating an invoice.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvoice {
    #[validate(length(min = 1, max = 64, message = "Invoice code must be 1-64 characters"))]
    pub invoice_code: String,
    pub amount: Decimal,
    pub invoice_date: NaiveDate,
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    pub client_id: Uuid,
    pub file_id: Uuid,
    pub assigned_distributor_id: Uuid,
}

/// Input for editing an invoice. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateInvoice {
    #[validate(length(min = 1, max = 64, message = "Invoice code must be 1-64 characters"))]
    pub invoice_code: Option<String>,
    pub amount: Option<Decimal>,
    pub invoice_date: Option<NaiveDate>,
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    pub file_id: Option<Uuid>,
    pub assigned_distributor_id: Option<Uuid>,
}

impl UpdateInvoice {
    /// True when the edit changes an input of the commission snapshot.
    pub fn touches_commission(&self, current: &Invoice) -> bool {
        self.amount.is_some_and(|v| v != current.amount)
            || self.client_id.is_some_and(|v| v != current.client_id)
            || self.file_id.is_some_and(|v| v != current.file_id)
            || self
                .assigned_distributor_id
                .is_some_and(|v| v != current.assigned_distributor_id)
    }

    /// Copy the provided fields onto `invoice`. Ledger and snapshot are untouched.
    pub fn apply_to(&self, invoice: &mut Invoice) {
        if let Some(code) = &self.invoice_code {
            invoice.invoice_code = code.clone();
        }
        if let Some(amount) = self.amount {
            invoice.amount = amount;
        }
        if let Some(date) = self.invoice_date {
            invoice.invoice_date = date;
        }
        if let Some(status) = self.status {
            invoice.status = status;
        }
        if let Some(client_id) = self.client_id {
            invoice.client_id = client_id;
        }
        if let Some(file_id) = self.file_id {
            invoice.file_id = file_id;
        }
        if let Some(distributor_id) = self.assigned_distributor_id {
            invoice.assigned_distributor_id = distributor_id;
        }
        invoice.updated_utc = Utc::now();
    }
}

/// Filter for invoice lookups. Always carries the caller's visibility.
#[derive(Debug, Clone)]
pub struct InvoiceQuery {
    pub visibility: Visibility,
    pub client_id: Option<Uuid>,
    pub distributor_id: Option<Uuid>,
    pub file_ids: Option<Vec<Uuid>>,
    /// Only invoices whose ledger allows marking this step next.
    pub eligible_for: Option<SettlementStep>,
    pub status: Option<InvoiceStatus>,
    pub limit: Option<usize>,
}

impl InvoiceQuery {
    pub fn new(visibility: Visibility) -> Self {
        Self {
            visibility,
            client_id: None,
            distributor_id: None,
            file_ids: None,
            eligible_for: None,
            status: None,
            limit: None,
        }
    }

    pub fn client(mut self, client_id: Uuid) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn distributor(mut self, distributor_id: Uuid) -> Self {
        self.distributor_id = Some(distributor_id);
        self
    }

    pub fn files(mut self, file_ids: Vec<Uuid>) -> Self {
        self.file_ids = Some(file_ids);
        self
    }

    pub fn eligible_for(mut self, step: SettlementStep) -> Self {
        self.eligible_for = Some(step);
        self
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        let visible = match self.visibility {
            Visibility::All => true,
            Visibility::AssignedTo(actor) => invoice.assigned_distributor_id == actor,
            Visibility::Nothing => false,
        };

        visible
            && self.client_id.map_or(true, |id| invoice.client_id == id)
            && self
                .distributor_id
                .map_or(true, |id| invoice.assigned_distributor_id == id)
            && self
                .file_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&invoice.file_id))
            && self
                .eligible_for
                .map_or(true, |step| invoice.payment_status.is_next(step))
            && self.status.map_or(true, |status| invoice.status == status)
    }
}
