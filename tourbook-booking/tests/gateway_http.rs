use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tourbook_booking::gateways::{
    EmbeddedConfig, EmbeddedGateway, RedirectConfig, RedirectGateway, WalletConfig, WalletGateway,
};
use tourbook_booking::{BookingError, GatewayRegistry, PaymentOrchestrator, PaymentServices};
use tourbook_catalog::{DepositPolicy, StaticCatalog, Tour};
use tourbook_core::{
    BookingDraft, BookingStatus, CallbackData, ClientSignals, CustomerContact, GatewayAdapter,
    GatewayError, InMemoryReservationRepository, IntentRequest, NextAction, PaymentMethod,
    RecordingEventPublisher, ReservationRepository, SettlementStatus,
};
use tourbook_shared::models::events::BookingEvent;
use tourbook_shared::Masked;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(method: PaymentMethod, amount_cents: i64) -> IntentRequest {
    IntentRequest {
        booking_id: Uuid::new_v4(),
        method,
        amount_cents,
        currency: "EUR".to_string(),
        customer: CustomerContact {
            name: "Ana Costa".to_string(),
            email: Masked::from("ana@example.com"),
            phone: Masked::from("+351912345678"),
        },
        description: "Deposit for Fatima and Obidos on 2030-05-17".to_string(),
        session_id: "session-1".to_string(),
        attempt: 1,
    }
}

fn ready() -> ClientSignals {
    ClientSignals {
        wallet_ready: Some(true),
        element_ready: Some(true),
    }
}

fn redirect_gateway(server: &MockServer) -> RedirectGateway {
    redirect_gateway_with_timeout(server, 2_000)
}

fn redirect_gateway_with_timeout(server: &MockServer, timeout_ms: u64) -> RedirectGateway {
    RedirectGateway::new(RedirectConfig {
        api_base: server.uri(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        return_url: "https://tours.example/v1/sessions/{session_id}/payments/return".to_string(),
        cancel_url: "https://tours.example/checkout/{session_id}".to_string(),
        timeout_ms,
    })
    .unwrap()
}

fn embedded_gateway(api_base: String, timeout_ms: u64) -> EmbeddedGateway {
    EmbeddedGateway::new(EmbeddedConfig {
        api_base,
        secret_key: "sk_test".to_string(),
        publishable_key: "pk_test".to_string(),
        instant_transfer_type: "mb_way".to_string(),
        timeout_ms,
    })
    .unwrap()
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A21AA",
            "token_type": "Bearer",
            "expires_in": 32400
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_redirect_create_and_execute() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/payments/payment"))
        .and(header("authorization", "Bearer A21AA"))
        .and(body_string_contains("\"total\":\"30.00\""))
        .and(body_string_contains("/v1/sessions/session-1/payments/return"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "PAY-123",
            "state": "created",
            "links": [
                {"rel": "self", "href": "https://api.example/v1/payments/payment/PAY-123"},
                {"rel": "approval_url", "href": "https://www.example/checkoutnow?token=EC-1"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/payments/payment/PAY-123/execute"))
        .and(body_string_contains("PAYER-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "PAY-123",
            "state": "approved",
            "transactions": [{"related_resources": [{"sale": {"id": "SALE-1"}}]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = redirect_gateway(&server);
    assert!(gateway.check_capability(&ClientSignals::default()).await.is_selectable());

    let handle = gateway
        .create_intent(&request(PaymentMethod::Redirect, 3000))
        .await
        .unwrap();
    assert_eq!(handle.intent_id, "PAY-123");
    assert_eq!(
        handle.next_action,
        Some(NextAction::Redirect {
            approval_url: "https://www.example/checkoutnow?token=EC-1".to_string()
        })
    );

    let outcome = gateway
        .confirm(
            &handle,
            &CallbackData::RedirectReturn {
                payment_reference: Some("PAY-123".to_string()),
                approval_token: Some("PAYER-9".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, SettlementStatus::Succeeded);
    assert_eq!(outcome.provider_reference.as_deref(), Some("SALE-1"));
}

#[tokio::test]
async fn test_redirect_rejects_foreign_reference() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/payment"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "PAY-123",
            "state": "created",
            "links": [{"rel": "approval_url", "href": "https://www.example/approve"}]
        })))
        .mount(&server)
        .await;

    let gateway = redirect_gateway(&server);
    let handle = gateway
        .create_intent(&request(PaymentMethod::Redirect, 3000))
        .await
        .unwrap();

    let result = gateway
        .confirm(
            &handle,
            &CallbackData::RedirectReturn {
                payment_reference: Some("PAY-999".to_string()),
                approval_token: Some("PAYER-9".to_string()),
            },
        )
        .await;
    assert!(matches!(result, Err(GatewayError::InvalidCallback(_))));
}

#[tokio::test]
async fn test_redirect_capability_fails_when_provider_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let gateway = redirect_gateway(&server);
    let capability = gateway.check_capability(&ClientSignals::default()).await;
    assert!(!capability.available);
}

#[tokio::test]
async fn test_wallet_token_exchange_decline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(header("authorization", "Bearer sk_wallet"))
        .and(body_string_contains("amount=3000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_w1",
            "status": "requires_payment_method",
            "client_secret": "pi_w1_secret_x"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_w1/confirm"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {"type": "card_error", "code": "card_declined", "message": "Your card was declined."}
        })))
        .mount(&server)
        .await;

    let gateway = WalletGateway::new(WalletConfig {
        api_base: server.uri(),
        secret_key: "sk_wallet".to_string(),
        merchant_id: "BCR2DN4T".to_string(),
        environment: "TEST".to_string(),
        timeout_ms: 2_000,
    })
    .unwrap();

    let not_capable = ClientSignals {
        wallet_ready: Some(false),
        element_ready: None,
    };
    assert!(!gateway.check_capability(&not_capable).await.is_selectable());
    assert!(gateway.check_capability(&ready()).await.is_selectable());

    let handle = gateway
        .create_intent(&request(PaymentMethod::Wallet, 3000))
        .await
        .unwrap();
    assert!(matches!(
        handle.next_action,
        Some(NextAction::PaymentSheet { ref merchant_id, amount_cents: 3000, .. }) if merchant_id == "BCR2DN4T"
    ));

    let result = gateway
        .confirm(
            &handle,
            &CallbackData::WalletAuthorization {
                token: "tok_visa".to_string(),
            },
        )
        .await;
    assert_eq!(
        result,
        Err(GatewayError::Rejected {
            reason: "Your card was declined.".to_string()
        })
    );
}

#[tokio::test]
async fn test_embedded_instant_transfer_is_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(body_string_contains("mb_way"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_e1",
            "status": "requires_payment_method",
            "client_secret": "pi_e1_secret_y"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_e1",
            "status": "processing"
        })))
        .mount(&server)
        .await;

    let gateway = embedded_gateway(server.uri(), 2_000);
    let handle = gateway
        .create_intent(&request(PaymentMethod::InstantTransfer, 3000))
        .await
        .unwrap();
    assert!(matches!(handle.next_action, Some(NextAction::EmbeddedForm { .. })));

    let outcome = gateway
        .confirm(&handle, &CallbackData::ElementSubmitted)
        .await
        .unwrap();
    assert_eq!(outcome.status, SettlementStatus::Pending);
}

#[tokio::test]
async fn test_embedded_enforces_minimum_charge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = embedded_gateway(server.uri(), 2_000);
    let result = gateway.create_intent(&request(PaymentMethod::Card, 49)).await;
    assert!(matches!(result, Err(GatewayError::Rejected { .. })));
}

#[tokio::test]
async fn test_embedded_capability_needs_element_ready() {
    let gateway = embedded_gateway("http://127.0.0.1:9".to_string(), 500);
    assert!(gateway.check_capability(&ClientSignals::default()).await.available);
    assert!(!gateway.check_capability(&ClientSignals::default()).await.is_selectable());
    assert!(gateway.check_capability(&ready()).await.is_selectable());
}

#[tokio::test]
async fn test_slow_provider_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "pi_slow", "status": "succeeded"}))
                .set_delay(Duration::from_millis(1_500)),
        )
        .mount(&server)
        .await;

    let gateway = embedded_gateway(server.uri(), 200);
    let handle = tourbook_core::IntentHandle::resume(
        "pi_slow",
        Uuid::new_v4(),
        PaymentMethod::Card,
        3000,
        "EUR",
    );
    let result = gateway.confirm(&handle, &CallbackData::StatusPoll).await;
    assert_eq!(result, Err(GatewayError::Timeout));
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let gateway = embedded_gateway(server.uri(), 2_000);
    let result = gateway.create_intent(&request(PaymentMethod::Card, 3000)).await;
    assert!(matches!(result, Err(GatewayError::Transport(_))));
}

fn tour_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 5, 17).unwrap()
}

fn orchestrator_over(
    gateway: Arc<dyn GatewayAdapter>,
    repo: Arc<InMemoryReservationRepository>,
    events: Arc<RecordingEventPublisher>,
) -> PaymentOrchestrator {
    let tour = Tour {
        id: "tour-fatima".to_string(),
        name: HashMap::from([("en".to_string(), "Fatima and Obidos".to_string())]),
        price_per_person_cents: 5000,
        currency: "EUR".to_string(),
        min_participants: 1,
        max_participants: 8,
        available_dates: vec![tour_date()],
        occupied_dates: vec![],
        deposit_ratio_bps: None,
        is_active: true,
    };
    let services = Arc::new(PaymentServices {
        reservations: repo,
        catalog: Arc::new(StaticCatalog::new(vec![tour])),
        gateways: Arc::new(GatewayRegistry::new().with(gateway)),
        events,
        deposit_policy: DepositPolicy::default(),
        default_currency: "EUR".to_string(),
    });
    PaymentOrchestrator::start(services, "session-1")
}

fn booking_draft() -> BookingDraft {
    BookingDraft {
        tour_id: "tour-fatima".to_string(),
        customer: CustomerContact {
            name: "Ana Costa".to_string(),
            email: Masked::from("ana@example.com"),
            phone: Masked::from("+351912345678"),
        },
        selected_date: tour_date(),
        participants: 2,
        special_request: None,
        language: "en".to_string(),
    }
}

#[tokio::test]
async fn test_redirect_return_replayed_after_timeout_reads_provider_status() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/payment"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "PAY-123",
            "state": "created",
            "links": [{"rel": "approval_url", "href": "https://www.example/approve"}]
        })))
        .mount(&server)
        .await;

    let approved = json!({
        "id": "PAY-123",
        "state": "approved",
        "transactions": [{"related_resources": [{"sale": {"id": "SALE-1"}}]}]
    });
    // The first execute goes through at the provider but answers too late.
    Mock::given(method("POST"))
        .and(path("/v1/payments/payment/PAY-123/execute"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(approved.clone())
                .set_delay(Duration::from_millis(1_500)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/payment/PAY-123/execute"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "name": "PAYMENT_ALREADY_DONE",
            "message": "Payment has been done already for this cart."
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/payment/PAY-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(approved))
        .expect(1)
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryReservationRepository::new());
    let events = Arc::new(RecordingEventPublisher::new());
    let gateway = Arc::new(redirect_gateway_with_timeout(&server, 300));
    let mut orchestrator = orchestrator_over(gateway, repo.clone(), events.clone());

    let booking_id = orchestrator.ensure_booking(booking_draft()).await.unwrap();
    let handle = orchestrator
        .initiate_payment(booking_id, PaymentMethod::Redirect, &ClientSignals::default())
        .await
        .unwrap();
    assert_eq!(handle.intent_id, "PAY-123");

    let returned = CallbackData::RedirectReturn {
        payment_reference: Some("PAY-123".to_string()),
        approval_token: Some("PAYER-9".to_string()),
    };
    let first = orchestrator.complete_payment(returned.clone()).await;
    assert!(matches!(
        first,
        Err(BookingError::OutcomeUnknown {
            status: BookingStatus::Processing,
            ..
        })
    ));

    let second = orchestrator.complete_payment(returned).await.unwrap();
    assert_eq!(second.status, BookingStatus::Confirmed);

    let booking = repo.get(booking_id).await.unwrap();
    assert_eq!(booking.provider_reference.as_deref(), Some("SALE-1"));
    assert_eq!(booking.failure_reason, None);

    let events = events.events().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], BookingEvent::Confirmed(_)));
}
