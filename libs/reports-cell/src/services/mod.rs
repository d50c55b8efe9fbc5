pub mod analytics;
pub mod report;
pub mod source;

pub use analytics::Analytics;
pub use report::ReportService;
pub use source::{InMemoryReportSource, ReportDataSource, SupabaseReportSource};
