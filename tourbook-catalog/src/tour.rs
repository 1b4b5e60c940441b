use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tourbook_core::RepositoryError;

/// A bookable tour as published by the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    pub id: String,
    /// Display name keyed by language code ("pt", "en", ...)
    pub name: HashMap<String, String>,
    pub price_per_person_cents: i64,
    pub currency: String,
    pub min_participants: u32,
    /// Capacity of a single departure
    pub max_participants: u32,
    /// Published departure dates
    pub available_dates: Vec<NaiveDate>,
    /// Dates already taken by a confirmed booking
    #[serde(default)]
    pub occupied_dates: Vec<NaiveDate>,
    /// Overrides the configured deposit ratio for this tour
    #[serde(default)]
    pub deposit_ratio_bps: Option<u32>,
    pub is_active: bool,
}

impl Tour {
    pub fn display_name(&self, language: &str) -> &str {
        self.name
            .get(language)
            .or_else(|| self.name.get("en"))
            .or_else(|| self.name.values().next())
            .map(String::as_str)
            .unwrap_or(self.id.as_str())
    }

    /// Total price for a party. `None` on overflow.
    pub fn total_for(&self, participants: u32) -> Option<i64> {
        self.price_per_person_cents.checked_mul(i64::from(participants))
    }

    pub fn is_published(&self, date: NaiveDate) -> bool {
        self.available_dates.contains(&date)
    }

    pub fn is_occupied(&self, date: NaiveDate) -> bool {
        self.occupied_dates.contains(&date)
    }
}

/// Read access to the tour catalog. The booking core never writes to it; confirmed
/// bookings reach the catalog through `OccupancyBlocker`.
#[async_trait]
pub trait TourCatalog: Send + Sync {
    async fn get_tour(&self, id: &str) -> Result<Option<Tour>, RepositoryError>;
}

/// Catalog held in memory, seeded from fixtures or tests.
#[derive(Default)]
pub struct StaticCatalog {
    tours: RwLock<HashMap<String, Tour>>,
}

impl StaticCatalog {
    pub fn new(tours: impl IntoIterator<Item = Tour>) -> Self {
        Self {
            tours: RwLock::new(tours.into_iter().map(|t| (t.id.clone(), t)).collect()),
        }
    }

    pub async fn upsert(&self, tour: Tour) {
        self.tours.write().await.insert(tour.id.clone(), tour);
    }

    /// `true` when the date was newly marked.
    pub async fn mark_occupied(&self, tour_id: &str, date: NaiveDate) -> bool {
        let mut tours = self.tours.write().await;
        match tours.get_mut(tour_id) {
            Some(tour) if !tour.is_occupied(date) => {
                tour.occupied_dates.push(date);
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl TourCatalog for StaticCatalog {
    async fn get_tour(&self, id: &str) -> Result<Option<Tour>, RepositoryError> {
        Ok(self.tours.read().await.get(id).cloned())
    }
}
