pub mod accumulate;
pub mod browser;
pub mod config;
pub mod dates;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod logging;
pub mod session;

pub use accumulate::{Accumulator, CombinedTable, HarvestRecord};
pub use config::{BrowserKind, CliArgs, HarvestConfig, PageLayout};
pub use error::HarvestError;
pub use extract::{TableExtractor, TableSnapshot};
pub use harvest::{HarvestSummary, Harvester};
pub use session::PageSession;
