use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tourbook_core::{
    Booking, BookingStatus, BookingUpdate, CustomerContact, IntentRecord, NewBooking, PaymentMethod,
    RepositoryError, ReservationRepository,
};
use tourbook_shared::Masked;
use tracing::{debug, info};
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, idempotency_key, tour_id, customer_name, customer_email, customer_phone, \
     selected_date, participants, special_request, language, total_cents, deposit_cents, \
     remaining_cents, currency, status, payment_method, payment_intent_id, provider_reference, \
     failure_reason, created_at, updated_at";

/// Postgres-backed reservation store. Status changes are applied under a row lock so the
/// transition table holds across concurrent writers.
pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    idempotency_key: String,
    tour_id: String,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    selected_date: NaiveDate,
    participants: i32,
    special_request: Option<String>,
    language: String,
    total_cents: i64,
    deposit_cents: i64,
    remaining_cents: i64,
    currency: String,
    status: String,
    payment_method: Option<String>,
    payment_intent_id: Option<String>,
    provider_reference: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = RepositoryError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BookingStatus>()
            .map_err(RepositoryError::Corrupt)?;
        let payment_method = match row.payment_method.as_deref() {
            Some(raw) => Some(PaymentMethod::parse(raw).ok_or_else(|| {
                RepositoryError::Corrupt(format!("unknown payment method: {}", raw))
            })?),
            None => None,
        };
        let participants = u32::try_from(row.participants)
            .map_err(|_| RepositoryError::Corrupt(format!("participants: {}", row.participants)))?;

        Ok(Booking {
            id: row.id,
            idempotency_key: row.idempotency_key,
            tour_id: row.tour_id,
            customer: CustomerContact {
                name: row.customer_name,
                email: Masked::new(row.customer_email),
                phone: Masked::new(row.customer_phone),
            },
            selected_date: row.selected_date,
            participants,
            special_request: row.special_request,
            language: row.language,
            total_cents: row.total_cents,
            deposit_cents: row.deposit_cents,
            remaining_cents: row.remaining_cents,
            currency: row.currency,
            status,
            payment_method,
            payment_intent_id: row.payment_intent_id,
            provider_reference: row.provider_reference,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IntentRow {
    intent_id: String,
    booking_id: Uuid,
    payment_method: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<IntentRow> for IntentRecord {
    type Error = RepositoryError;

    fn try_from(row: IntentRow) -> Result<Self, Self::Error> {
        let method = PaymentMethod::parse(&row.payment_method).ok_or_else(|| {
            RepositoryError::Corrupt(format!("unknown payment method: {}", row.payment_method))
        })?;
        Ok(IntentRecord {
            intent_id: row.intent_id,
            booking_id: row.booking_id,
            method,
            recorded_at: row.recorded_at,
        })
    }
}

fn map_sqlx_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RepositoryError::Corrupt(e.to_string())
        }
        other => RepositoryError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn create(&self, new: NewBooking) -> Result<Booking, RepositoryError> {
        let participants = i32::try_from(new.draft.participants)
            .map_err(|_| RepositoryError::Corrupt("participants out of range".to_string()))?;
        let booking = Booking::from_new(Uuid::new_v4(), new);

        // A second create for the same session key keeps the first row.
        let inserted = sqlx::query(
            r#"
            INSERT INTO bookings (
                id, idempotency_key, tour_id, customer_name, customer_email, customer_phone,
                selected_date, participants, special_request, language, total_cents, deposit_cents,
                remaining_cents, currency, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(booking.id)
        .bind(&booking.idempotency_key)
        .bind(&booking.tour_id)
        .bind(&booking.customer.name)
        .bind(booking.customer.email.expose())
        .bind(booking.customer.phone.expose())
        .bind(booking.selected_date)
        .bind(participants)
        .bind(&booking.special_request)
        .bind(&booking.language)
        .bind(booking.total_cents)
        .bind(booking.deposit_cents)
        .bind(booking.remaining_cents)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if inserted == 0 {
            debug!(idempotency_key = %booking.idempotency_key, "Booking already exists for key");
        } else {
            info!(booking_id = %booking.id, tour_id = %booking.tour_id, "Booking created");
        }

        let row: BookingRow = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE idempotency_key = $1",
            BOOKING_COLUMNS
        ))
        .bind(&booking.idempotency_key)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn get(&self, id: Uuid) -> Result<Booking, RepositoryError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        row.ok_or(RepositoryError::NotFound(id))?.try_into()
    }

    async fn update(&self, id: Uuid, update: BookingUpdate) -> Result<Booking, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut booking: Booking = row.ok_or(RepositoryError::NotFound(id))?.try_into()?;
        // Dropping the transaction rolls back and releases the lock.
        booking.apply(&update)?;

        sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2,
                payment_method = $3,
                payment_intent_id = $4,
                provider_reference = $5,
                failure_reason = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(booking.status.as_str())
        .bind(booking.payment_method.map(|m| m.as_str()))
        .bind(&booking.payment_intent_id)
        .bind(&booking.provider_reference)
        .bind(&booking.failure_reason)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        // Superseded intents keep resolving to this booking.
        if let (Some(intent_id), Some(method)) = (&update.payment_intent_id, update.payment_method) {
            sqlx::query(
                r#"
                INSERT INTO booking_intents (intent_id, booking_id, payment_method, recorded_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (intent_id) DO NOTHING
                "#,
            )
            .bind(intent_id)
            .bind(id)
            .bind(method.as_str())
            .bind(booking.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(booking_id = %id, status = %booking.status, "Booking updated");
        Ok(booking)
    }

    async fn find_intent(&self, intent_id: &str) -> Result<Option<IntentRecord>, RepositoryError> {
        let row: Option<IntentRow> = sqlx::query_as(
            "SELECT intent_id, booking_id, payment_method, recorded_at FROM booking_intents WHERE intent_id = $1",
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(IntentRecord::try_from).transpose()
    }
}
