pub mod booking;
pub mod events;
pub mod memory;
pub mod payment;
pub mod repository;
pub mod validation;

pub use booking::{
    Booking, BookingDraft, BookingStatus, BookingUpdate, CustomerContact, NewBooking, PriceSplit,
    TransitionError,
};
pub use events::{BookingEventPublisher, LogEventPublisher, PublishError, RecordingEventPublisher};
pub use memory::InMemoryReservationRepository;
pub use payment::{
    CallbackData, ClientSignals, ConfirmOutcome, GatewayAdapter, GatewayCapability, GatewayError,
    IntentHandle, IntentRequest, NextAction, PaymentMethod, ProviderFamily, SettlementStatus,
};
pub use repository::{IntentRecord, RepositoryError, ReservationRepository};
pub use validation::ValidationError;
