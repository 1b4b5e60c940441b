pub mod availability;
pub mod occupancy;
pub mod pricing;
pub mod tour;

pub use availability::validate_draft;
pub use occupancy::{OccupancyBlocker, OccupancyLedger};
pub use pricing::{compute_split, DepositPolicy, PricingError, DEFAULT_DEPOSIT_RATIO_BPS};
pub use tour::{StaticCatalog, Tour, TourCatalog};
