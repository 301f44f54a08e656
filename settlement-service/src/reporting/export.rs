//! Tabular export of invoices with a totals row.

use crate::error::SettlementError;
use crate::models::{AccessScope, Invoice, InvoiceQuery};
use crate::reporting::statistics::accumulate;
use crate::store::{bounded, SettlementStore};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

pub const EXPORT_COLUMNS: [&str; 12] = [
    "Invoice code",
    "Client",
    "File",
    "Distributor",
    "Amount",
    "Client commission",
    "Distributor commission",
    "Company commission",
    "Net profit",
    "Payment status",
    "Progress (%)",
    "Invoice date",
];

const UNKNOWN_NAME: &str = "Unknown";

/// Renderers colour non-negative profit green and negative profit red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitSign {
    NonNegative,
    Negative,
}

impl ProfitSign {
    pub fn of(value: Decimal) -> Self {
        if value.is_sign_negative() && !value.is_zero() {
            ProfitSign::Negative
        } else {
            ProfitSign::NonNegative
        }
    }
}

/// Human-readable names for the ids on an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayNames {
    pub client_name: String,
    pub file_name: String,
    pub distributor_name: String,
}

impl Default for DisplayNames {
    fn default() -> Self {
        Self {
            client_name: UNKNOWN_NAME.to_string(),
            file_name: UNKNOWN_NAME.to_string(),
            distributor_name: UNKNOWN_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub invoice_code: String,
    pub client_name: String,
    pub file_name: String,
    pub distributor_name: String,
    pub amount: Decimal,
    pub client_commission: Decimal,
    pub distributor_commission: Decimal,
    pub company_commission: Decimal,
    pub net_profit: Decimal,
    pub payment_status: String,
    pub progress_percent: u8,
    pub invoice_date: NaiveDate,
    pub profit_sign: ProfitSign,
}

impl ExportRow {
    pub fn from_invoice(invoice: &Invoice, names: &DisplayNames) -> Result<Self, SettlementError> {
        let (payment_status, progress_percent) = match invoice.payment_status.state() {
            Some(state) => (state.label().to_string(), state.progress_percent()),
            None => ("Inconsistent".to_string(), 0),
        };
        let net_profit = invoice
            .net_profit()
            .ok_or(SettlementError::TotalsOverflow)?;

        Ok(Self {
            invoice_code: invoice.invoice_code.clone(),
            client_name: names.client_name.clone(),
            file_name: names.file_name.clone(),
            distributor_name: names.distributor_name.clone(),
            amount: invoice.amount,
            client_commission: invoice.commission.client_amount,
            distributor_commission: invoice.commission.distributor_amount,
            company_commission: invoice.commission.company_amount,
            net_profit,
            payment_status,
            progress_percent,
            invoice_date: invoice.invoice_date,
            profit_sign: ProfitSign::of(net_profit),
        })
    }

    /// Cell values in `EXPORT_COLUMNS` order.
    pub fn cells(&self) -> [String; 12] {
        [
            self.invoice_code.clone(),
            self.client_name.clone(),
            self.file_name.clone(),
            self.distributor_name.clone(),
            format!("{:.2}", self.amount),
            format!("{:.2}", self.client_commission),
            format!("{:.2}", self.distributor_commission),
            format!("{:.2}", self.company_commission),
            format!("{:.2}", self.net_profit),
            self.payment_status.clone(),
            self.progress_percent.to_string(),
            self.invoice_date.format("%Y-%m-%d").to_string(),
        ]
    }
}

/// Totals row appended under the exported rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportSummary {
    pub invoice_count: usize,
    pub total_amount: Decimal,
    pub client_commission: Decimal,
    pub distributor_commission: Decimal,
    pub company_commission: Decimal,
    pub net_profit: Decimal,
}

impl ExportSummary {
    pub fn from_rows(rows: &[ExportRow]) -> Result<Self, SettlementError> {
        rows.iter().try_fold(ExportSummary::default(), |mut acc, row| {
            acc.invoice_count += 1;
            accumulate(&mut acc.total_amount, row.amount)?;
            accumulate(&mut acc.client_commission, row.client_commission)?;
            accumulate(&mut acc.distributor_commission, row.distributor_commission)?;
            accumulate(&mut acc.company_commission, row.company_commission)?;
            accumulate(&mut acc.net_profit, row.net_profit)?;
            Ok(acc)
        })
    }

    pub fn profit_sign(&self) -> ProfitSign {
        ProfitSign::of(self.net_profit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceExport {
    pub columns: [&'static str; 12],
    pub rows: Vec<ExportRow>,
    pub summary: ExportSummary,
}

#[derive(Clone)]
pub struct InvoiceExporter {
    store: Arc<dyn SettlementStore>,
    lookup_timeout: Duration,
}

impl InvoiceExporter {
    pub fn new(store: Arc<dyn SettlementStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    /// Every invoice the caller may see, newest first, with a totals row.
    #[instrument(skip(self, scope), fields(actor_id = %scope.actor_id))]
    pub async fn export(&self, scope: &AccessScope) -> Result<InvoiceExport, SettlementError> {
        let invoices = bounded(
            self.lookup_timeout,
            "find_invoices",
            self.store
                .find_invoices(&InvoiceQuery::new(scope.visibility())),
        )
        .await?;

        let mut names = NameCache::default();
        let mut rows = Vec::with_capacity(invoices.len());
        for invoice in &invoices {
            let display = DisplayNames {
                client_name: names.client(self, invoice.client_id).await?,
                file_name: names.file(self, invoice.file_id).await?,
                distributor_name: names
                    .distributor(self, invoice.assigned_distributor_id)
                    .await?,
            };
            rows.push(ExportRow::from_invoice(invoice, &display)?);
        }

        let summary = ExportSummary::from_rows(&rows)?;
        info!(rows = rows.len(), "Invoice export built");

        Ok(InvoiceExport {
            columns: EXPORT_COLUMNS,
            rows,
            summary,
        })
    }
}

/// Resolves each referenced id once per export.
#[derive(Default)]
struct NameCache {
    clients: HashMap<Uuid, String>,
    files: HashMap<Uuid, String>,
    distributors: HashMap<Uuid, String>,
}

impl NameCache {
    async fn client(&mut self, exporter: &InvoiceExporter, id: Uuid) -> Result<String, SettlementError> {
        if let Some(name) = self.clients.get(&id) {
            return Ok(name.clone());
        }
        let name = bounded(exporter.lookup_timeout, "get_client", exporter.store.client(id))
            .await?
            .map_or_else(|| UNKNOWN_NAME.to_string(), |c| c.full_name);
        self.clients.insert(id, name.clone());
        Ok(name)
    }

    async fn file(&mut self, exporter: &InvoiceExporter, id: Uuid) -> Result<String, SettlementError> {
        if let Some(name) = self.files.get(&id) {
            return Ok(name.clone());
        }
        let name = bounded(exporter.lookup_timeout, "get_file", exporter.store.file(id))
            .await?
            .map_or_else(|| UNKNOWN_NAME.to_string(), |f| f.file_name);
        self.files.insert(id, name.clone());
        Ok(name)
    }

    async fn distributor(
        &mut self,
        exporter: &InvoiceExporter,
        id: Uuid,
    ) -> Result<String, SettlementError> {
        if let Some(name) = self.distributors.get(&id) {
            return Ok(name.clone());
        }
        let name = bounded(
            exporter.lookup_timeout,
            "get_distributor",
            exporter.store.distributor(id),
        )
        .await?
        .map_or_else(|| UNKNOWN_NAME.to_string(), |d| d.username);
        self.distributors.insert(id, name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommissionSnapshot, CreateInvoice};
    use crate::settlement::{SettlementStep, StepRecord};
    use chrono::Utc;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn row(invoice: &Invoice) -> ExportRow {
        ExportRow::from_invoice(invoice, &DisplayNames::default()).unwrap()
    }

    fn invoice(amount: &str, rates: [&str; 3]) -> Invoice {
        let amount = dec(amount);
        let input = CreateInvoice {
            invoice_code: "INV-7".to_string(),
            amount,
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            status: None,
            client_id: Uuid::new_v4(),
            file_id: Uuid::new_v4(),
            assigned_distributor_id: Uuid::new_v4(),
        };
        let snapshot =
            CommissionSnapshot::from_rates(amount, dec(rates[0]), dec(rates[1]), dec(rates[2]))
                .unwrap();
        Invoice::new(input, Uuid::new_v4(), snapshot)
    }

    #[test]
    fn test_row_follows_column_order() {
        let mut invoice = invoice("1000", ["5", "3", "2"]);
        *invoice
            .payment_status
            .step_mut(SettlementStep::ClientToDistributor) =
            StepRecord::paid(Uuid::new_v4(), Utc::now());

        let names = DisplayNames {
            client_name: "Acme".to_string(),
            file_name: "batch-01.pdf".to_string(),
            distributor_name: "dist".to_string(),
        };
        let row = ExportRow::from_invoice(&invoice, &names).unwrap();
        let cells = row.cells();

        assert_eq!(cells.len(), EXPORT_COLUMNS.len());
        assert_eq!(cells[0], "INV-7");
        assert_eq!(cells[1], "Acme");
        assert_eq!(cells[4], "1000.00");
        assert_eq!(cells[5], "50.00");
        assert_eq!(cells[8], "900.00");
        assert_eq!(cells[9], "Client paid");
        assert_eq!(cells[10], "33");
        assert_eq!(cells[11], "2024-03-09");
        assert_eq!(row.profit_sign, ProfitSign::NonNegative);
    }

    #[test]
    fn test_negative_profit_is_flagged() {
        let invoice = invoice("100", ["60", "30", "20"]);
        let row = ExportRow::from_invoice(&invoice, &DisplayNames::default()).unwrap();

        assert_eq!(row.net_profit, dec("-10"));
        assert_eq!(row.profit_sign, ProfitSign::Negative);
        assert_eq!(row.client_name, "Unknown");
    }

    #[test]
    fn test_zero_profit_counts_as_non_negative() {
        assert_eq!(ProfitSign::of(Decimal::ZERO), ProfitSign::NonNegative);
        assert_eq!(ProfitSign::of(dec("-0.00")), ProfitSign::NonNegative);
    }

    #[test]
    fn test_summary_sums_rows() {
        let rows = vec![
            row(&invoice("1000", ["5", "3", "2"])),
            row(&invoice("100", ["60", "30", "20"])),
        ];
        let summary = ExportSummary::from_rows(&rows).unwrap();

        assert_eq!(summary.invoice_count, 2);
        assert_eq!(summary.total_amount, dec("1100"));
        assert_eq!(summary.client_commission, dec("110"));
        assert_eq!(summary.net_profit, dec("890"));
        assert_eq!(summary.profit_sign(), ProfitSign::NonNegative);
    }

    #[test]
    fn test_summary_overflow_is_an_error() {
        let huge = invoice("79228162514264337593543950335", ["0", "0", "0"]);
        let rows = vec![row(&huge), row(&huge)];

        assert!(matches!(
            ExportSummary::from_rows(&rows),
            Err(SettlementError::TotalsOverflow)
        ));
    }
}
