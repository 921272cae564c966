pub mod refresh;
pub mod summary;

pub use refresh::{InstrumentFailure, RefreshOrchestrator, SetupBatch};
pub use summary::{MarketSummary, RankedValue, SetupDigest};
