pub mod aggregator;
pub mod ingestion;

pub use aggregator::{bucket_trades, AggregationReport, TradeAggregator};
pub use ingestion::{IngestionJob, IngestionReport};
