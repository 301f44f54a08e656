//! Read-side views over stored invoices.

pub mod export;
pub mod statistics;

pub use export::{
    DisplayNames, ExportRow, ExportSummary, InvoiceExport, InvoiceExporter, ProfitSign,
    EXPORT_COLUMNS,
};
pub use statistics::{
    ClientStatistics, CompanyStatistics, DistributorStatistics, InvoiceStats,
    StatisticsAggregator, StepCounts,
};
