use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use tourbook_catalog::{OccupancyLedger, Tour, TourCatalog};
use tourbook_core::RepositoryError;

pub struct PgTourCatalog {
    pool: PgPool,
}

impl PgTourCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TourRow {
    id: String,
    name: Value,
    price_per_person_cents: i64,
    currency: String,
    min_participants: i32,
    max_participants: i32,
    available_dates: Vec<NaiveDate>,
    occupied_dates: Vec<NaiveDate>,
    deposit_ratio_bps: Option<i32>,
    is_active: bool,
}

impl TryFrom<TourRow> for Tour {
    type Error = RepositoryError;

    fn try_from(row: TourRow) -> Result<Self, Self::Error> {
        let name: HashMap<String, String> = serde_json::from_value(row.name)
            .map_err(|e| RepositoryError::Corrupt(format!("tour {} name: {}", row.id, e)))?;
        let to_u32 = |field: &str, value: i32| {
            u32::try_from(value)
                .map_err(|_| RepositoryError::Corrupt(format!("tour {} {}: {}", row.id, field, value)))
        };

        Ok(Tour {
            min_participants: to_u32("min_participants", row.min_participants)?,
            max_participants: to_u32("max_participants", row.max_participants)?,
            deposit_ratio_bps: row
                .deposit_ratio_bps
                .map(|bps| to_u32("deposit_ratio_bps", bps))
                .transpose()?,
            id: row.id,
            name,
            price_per_person_cents: row.price_per_person_cents,
            currency: row.currency,
            available_dates: row.available_dates,
            occupied_dates: row.occupied_dates,
            is_active: row.is_active,
        })
    }
}

#[async_trait]
impl TourCatalog for PgTourCatalog {
    async fn get_tour(&self, id: &str) -> Result<Option<Tour>, RepositoryError> {
        let row: Option<TourRow> = sqlx::query_as(
            r#"
            SELECT id, name, price_per_person_cents, currency, min_participants, max_participants,
                   available_dates, occupied_dates, deposit_ratio_bps, is_active
            FROM tours
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;

        row.map(Tour::try_from).transpose()
    }
}

#[async_trait]
impl OccupancyLedger for PgTourCatalog {
    async fn block_date(&self, tour_id: &str, date: NaiveDate) -> Result<bool, RepositoryError> {
        let blocked = sqlx::query(
            r#"
            UPDATE tours
            SET occupied_dates = array_append(occupied_dates, $2),
                updated_at = NOW()
            WHERE id = $1 AND NOT ($2 = ANY(occupied_dates))
            "#,
        )
        .bind(tour_id)
        .bind(date)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Unavailable(e.to_string()))?
        .rows_affected();

        Ok(blocked > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> TourRow {
        TourRow {
            id: "tour-fatima".to_string(),
            name: json!({"pt": "Fátima e Óbidos", "en": "Fatima and Obidos"}),
            price_per_person_cents: 5000,
            currency: "EUR".to_string(),
            min_participants: 1,
            max_participants: 8,
            available_dates: vec![NaiveDate::from_ymd_opt(2030, 5, 17).unwrap()],
            occupied_dates: vec![],
            deposit_ratio_bps: Some(5000),
            is_active: true,
        }
    }

    #[test]
    fn test_row_conversion() {
        let tour = Tour::try_from(row()).unwrap();
        assert_eq!(tour.display_name("en"), "Fatima and Obidos");
        assert_eq!(tour.deposit_ratio_bps, Some(5000));
        assert_eq!(tour.max_participants, 8);
    }

    #[test]
    fn test_malformed_rows_are_corrupt() {
        let mut bad = row();
        bad.name = json!(["not", "a", "map"]);
        assert!(matches!(Tour::try_from(bad), Err(RepositoryError::Corrupt(_))));

        let mut bad = row();
        bad.deposit_ratio_bps = Some(-1);
        assert!(matches!(Tour::try_from(bad), Err(RepositoryError::Corrupt(_))));
    }
}
