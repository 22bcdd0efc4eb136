pub mod api;
pub mod assemble;
pub mod duplicates;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod site;
pub mod spec_table;
pub mod staleness;
pub mod throttle;
pub mod traits;

#[cfg(test)]
pub mod testutil;

pub use error::{AppError, FieldError};
pub use models::{RawListing, RenderedPage, VehicleCategory, VehicleRecord, VehicleState};
pub use site::{SiteConfig, SiteId, SiteLayout};
pub use traits::{Fetcher, ListingParser, NullStore, Renderer, VehicleStore};
