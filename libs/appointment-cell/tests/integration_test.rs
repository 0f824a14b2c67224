use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, AppointmentFilters, AppointmentStatus, CreateAppointmentRequest,
    ListAppointmentsQuery, Patch, RescheduleAppointmentRequest, UpdateAppointmentRequest,
};
use appointment_cell::services::{AppointmentBookingService, AppointmentStore, InMemoryAppointmentStore};
use shared_config::{AppConfig, CancellationPolicy};
use shared_models::tenant::TenantContext;
use shared_utils::test_utils::{TestClock, TestConfig, TestTenant};

fn booking_service(policy: CancellationPolicy) -> (AppointmentBookingService, InMemoryAppointmentStore) {
    let store = InMemoryAppointmentStore::new();
    let config = TestConfig {
        cancellation_policy: policy,
        ..TestConfig::default()
    };
    let service = AppointmentBookingService::with_store(Arc::new(store.clone()), &config.to_app_config());
    (service, store)
}

fn request(provider_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_id: Some(Uuid::new_v4()),
        provider_id: Some(provider_id),
        service_id: Some(Uuid::new_v4()),
        start_time: Some(start),
        end_time: Some(end),
        status: None,
        notes: None,
    }
}

async fn book(
    service: &AppointmentBookingService,
    context: &TenantContext,
    provider_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<appointment_cell::models::Appointment, AppointmentError> {
    service.create_appointment(context, request(provider_id, start, end)).await
}

#[tokio::test]
async fn test_booking_walkthrough() {
    let (service, _store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let other_clinic = TestTenant {
        provider_id: clinic.provider_id,
        ..TestTenant::default()
    };
    let t = clinic.context();
    let p = clinic.provider_id;

    // Overlapping booking for the same provider is rejected
    let a = book(&service, &t, p, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();
    assert_eq!(a.status, AppointmentStatus::Scheduled);
    assert_matches!(
        book(&service, &t, p, TestClock::at(10, 30), TestClock::at(11, 30)).await,
        Err(AppointmentError::Conflict { provider_id, .. }) if provider_id == p
    );

    // Back-to-back is fine
    let c = book(&service, &t, p, TestClock::at(11, 0), TestClock::at(12, 0)).await.unwrap();

    // Same provider id in another tenant never collides
    book(&service, &other_clinic.context(), p, TestClock::at(10, 0), TestClock::at(11, 0))
        .await
        .unwrap();

    // Moving A onto C conflicts; moving it earlier works
    assert_matches!(
        service
            .reschedule_appointment(
                &t,
                a.id,
                RescheduleAppointmentRequest {
                    start_time: TestClock::at(11, 0),
                    end_time: TestClock::at(12, 0),
                },
            )
            .await,
        Err(AppointmentError::Conflict { .. })
    );
    let moved = service
        .reschedule_appointment(
            &t,
            a.id,
            RescheduleAppointmentRequest {
                start_time: TestClock::at(9, 0),
                end_time: TestClock::at(10, 0),
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.start_time, TestClock::at(9, 0));
    assert_eq!(moved.status, AppointmentStatus::Scheduled);

    // Cancelling twice succeeds both times and A drops out of the listing
    let first = service.cancel_appointment(&t, a.id).await.unwrap();
    let second = service.cancel_appointment(&t, a.id).await.unwrap();
    assert_eq!(first.status, AppointmentStatus::Cancelled);
    assert_eq!(second.status, AppointmentStatus::Cancelled);

    let page = service.list_appointments(&t, ListAppointmentsQuery::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items.iter().map(|apt| apt.id).collect::<Vec<_>>(), vec![c.id]);
}

#[tokio::test]
async fn test_retained_cancellation_stays_listed_but_frees_slot() {
    let (service, _store) = booking_service(CancellationPolicy::Retain);
    let clinic = TestTenant::default();
    let t = clinic.context();

    let a = book(&service, &t, clinic.provider_id, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();
    service.cancel_appointment(&t, a.id).await.unwrap();
    let again = service.cancel_appointment(&t, a.id).await.unwrap();
    assert!(again.is_active);
    assert_eq!(again.status, AppointmentStatus::Cancelled);

    let cancelled_only = service
        .list_appointments(
            &t,
            ListAppointmentsQuery {
                filters: AppointmentFilters {
                    status: Some(AppointmentStatus::Cancelled),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled_only.total, 1);

    book(&service, &t, clinic.provider_id, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();
}

#[tokio::test]
async fn test_cancel_rejects_completed_appointments() {
    let (service, _store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let t = clinic.context();

    let a = book(&service, &t, clinic.provider_id, TestClock::at(8, 0), TestClock::at(9, 0)).await.unwrap();
    for status in ["confirmed", "completed"] {
        service
            .update_appointment(
                &t,
                a.id,
                UpdateAppointmentRequest {
                    status: Patch::Value(status.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    assert_matches!(
        service.cancel_appointment(&t, a.id).await,
        Err(AppointmentError::InvalidStatusTransition {
            from: AppointmentStatus::Completed,
            to: AppointmentStatus::Cancelled
        })
    );
}

#[tokio::test]
async fn test_tenants_cannot_see_or_touch_each_other() {
    let (service, _store) = booking_service(CancellationPolicy::Deactivate);
    let owner = TestTenant::default();
    let stranger = TestTenant::default();

    let a = book(&service, &owner.context(), owner.provider_id, TestClock::at(10, 0), TestClock::at(11, 0))
        .await
        .unwrap();
    let s = stranger.context();

    assert_matches!(service.get_appointment(&s, a.id).await, Err(AppointmentError::NotFound));
    assert_matches!(service.cancel_appointment(&s, a.id).await, Err(AppointmentError::NotFound));
    assert_matches!(service.delete_appointment(&s, a.id).await, Err(AppointmentError::NotFound));
    assert_matches!(
        service
            .update_appointment(
                &s,
                a.id,
                UpdateAppointmentRequest {
                    notes: Patch::Value("hijacked".to_string()),
                    ..Default::default()
                },
            )
            .await,
        Err(AppointmentError::NotFound)
    );

    let page = service.list_appointments(&s, ListAppointmentsQuery::default()).await.unwrap();
    assert_eq!(page.total, 0);

    let untouched = service.get_appointment(&owner.context(), a.id).await.unwrap();
    assert_eq!(untouched.status, AppointmentStatus::Scheduled);
    assert_eq!(untouched.notes, None);
}

#[tokio::test]
async fn test_concurrent_bookings_for_one_slot_admit_exactly_one() {
    let (service, store) = booking_service(CancellationPolicy::Deactivate);
    let service = Arc::new(service);
    let clinic = TestTenant::default();

    let attempts = (0..16).map(|i| {
        let service = Arc::clone(&service);
        let context = clinic.context();
        let provider_id = clinic.provider_id;
        // Staggered but all overlapping 10:00-11:00
        let start = TestClock::at(10, 0) + chrono::Duration::minutes(i % 4);
        tokio::spawn(async move {
            service
                .create_appointment(&context, request(provider_id, start, TestClock::at(11, 0)))
                .await
        })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let booked = results.iter().filter(|result| result.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|result| matches!(result, Err(AppointmentError::Conflict { .. })))
        .count();

    assert_eq!(booked, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_concurrent_moves_onto_one_slot_admit_exactly_one() {
    let (service, store) = booking_service(CancellationPolicy::Deactivate);
    let service = Arc::new(service);
    let clinic = TestTenant::default();
    let t = clinic.context();

    let mut ids = Vec::new();
    for hour in 8..14 {
        let apt = book(&service, &t, clinic.provider_id, TestClock::at(hour, 0), TestClock::at(hour, 30))
            .await
            .unwrap();
        ids.push(apt.id);
    }

    let moves = ids.into_iter().map(|id| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .reschedule_appointment(
                    &t,
                    id,
                    RescheduleAppointmentRequest {
                        start_time: TestClock::at(16, 0),
                        end_time: TestClock::at(17, 0),
                    },
                )
                .await
        })
    });

    let moved = join_all(moves)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();
    assert_eq!(moved, 1);

    let at_four = store
        .list(
            clinic.tenant_id,
            0,
            100,
            &AppointmentFilters {
                date_from: Some(TestClock::at(16, 0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(at_four.len(), 1);
}

#[tokio::test]
async fn test_pages_partition_the_filtered_set() {
    let (service, _store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let t = clinic.context();
    let other_provider = Uuid::new_v4();

    for hour in 0..7 {
        book(&service, &t, clinic.provider_id, TestClock::at(hour, 0), TestClock::at(hour, 45)).await.unwrap();
        book(&service, &t, other_provider, TestClock::at(hour, 0), TestClock::at(hour, 45)).await.unwrap();
    }

    let filters = AppointmentFilters {
        provider_id: Some(clinic.provider_id),
        ..Default::default()
    };

    let mut seen = Vec::new();
    let mut skip: u32 = 0;
    loop {
        let page = service
            .list_appointments(
                &t,
                ListAppointmentsQuery {
                    skip: Some(skip),
                    limit: Some(3),
                    filters: filters.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 7);
        assert_eq!(page.pages, 3);
        assert_eq!(page.page, u64::from(skip / 3 + 1));
        if page.items.is_empty() {
            break;
        }
        seen.extend(page.items);
        skip += 3;
    }

    assert_eq!(seen.len(), 7);
    assert!(seen.iter().all(|apt| apt.provider_id == clinic.provider_id));
    assert!(seen.windows(2).all(|pair| pair[0].start_time >= pair[1].start_time));
}

#[tokio::test]
async fn test_date_range_bounds_start_time_inclusively() {
    let (service, _store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let t = clinic.context();

    for hour in [8, 9, 10, 11] {
        book(&service, &t, clinic.provider_id, TestClock::at(hour, 0), TestClock::at(hour, 30)).await.unwrap();
    }

    let page = service
        .list_appointments(
            &t,
            ListAppointmentsQuery {
                filters: AppointmentFilters {
                    date_from: Some(TestClock::at(9, 0)),
                    date_to: Some(TestClock::at(10, 0)),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let inverted = service
        .list_appointments(
            &t,
            ListAppointmentsQuery {
                filters: AppointmentFilters {
                    date_from: Some(TestClock::at(11, 0)),
                    date_to: Some(TestClock::at(9, 0)),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await;
    assert_matches!(inverted, Err(AppointmentError::Validation(_)));
}

#[tokio::test]
async fn test_single_bound_update_is_checked_against_stored_bound() {
    let (service, _store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let t = clinic.context();

    let a = book(&service, &t, clinic.provider_id, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();

    // New end before the stored start
    assert_matches!(
        service
            .update_appointment(
                &t,
                a.id,
                UpdateAppointmentRequest {
                    end_time: Patch::Value(TestClock::at(9, 0)),
                    ..Default::default()
                },
            )
            .await,
        Err(AppointmentError::Validation(_))
    );

    let extended = service
        .update_appointment(
            &t,
            a.id,
            UpdateAppointmentRequest {
                end_time: Patch::Value(TestClock::at(11, 30)),
                notes: Patch::Value("bring referral".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(extended.start_time, TestClock::at(10, 0));
    assert_eq!(extended.end_time, TestClock::at(11, 30));
    assert!(extended.updated_at >= a.updated_at);

    let cleared = service
        .update_appointment(
            &t,
            a.id,
            UpdateAppointmentRequest {
                notes: Patch::Null,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.notes, None);

    assert_matches!(
        service
            .update_appointment(
                &t,
                a.id,
                UpdateAppointmentRequest {
                    provider_id: Patch::Null,
                    ..Default::default()
                },
            )
            .await,
        Err(AppointmentError::Validation(_))
    );
}

#[tokio::test]
async fn test_moving_to_another_provider_rechecks_conflicts() {
    let (service, _store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let t = clinic.context();
    let busy_provider = Uuid::new_v4();

    book(&service, &t, busy_provider, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();
    let a = book(&service, &t, clinic.provider_id, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();

    assert_matches!(
        service
            .update_appointment(
                &t,
                a.id,
                UpdateAppointmentRequest {
                    provider_id: Patch::Value(busy_provider),
                    ..Default::default()
                },
            )
            .await,
        Err(AppointmentError::Conflict { provider_id, .. }) if provider_id == busy_provider
    );
}

#[tokio::test]
async fn test_terminal_appointment_window_is_frozen() {
    let (service, _store) = booking_service(CancellationPolicy::Retain);
    let clinic = TestTenant::default();
    let t = clinic.context();

    let a = book(&service, &t, clinic.provider_id, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();
    service.cancel_appointment(&t, a.id).await.unwrap();

    assert_matches!(
        service
            .reschedule_appointment(
                &t,
                a.id,
                RescheduleAppointmentRequest {
                    start_time: TestClock::at(12, 0),
                    end_time: TestClock::at(13, 0),
                },
            )
            .await,
        Err(AppointmentError::InvalidStatusTransition { from: AppointmentStatus::Cancelled, .. })
    );
}

#[tokio::test]
async fn test_conflict_check_reports_without_booking() {
    let (service, store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let t = clinic.context();

    let a = book(&service, &t, clinic.provider_id, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();

    let candidate = |exclude: Option<Uuid>| appointment_cell::models::ConflictCheckRequest {
        provider_id: clinic.provider_id,
        start_time: TestClock::at(10, 30),
        end_time: TestClock::at(11, 30),
        exclude_appointment_id: exclude,
    };

    assert!(service.check_conflicts(&t, candidate(None)).await.unwrap().has_conflict);
    assert!(!service.check_conflicts(&t, candidate(Some(a.id))).await.unwrap().has_conflict);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_delete_soft_deletes_and_frees_slot() {
    let (service, store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let t = clinic.context();

    let a = book(&service, &t, clinic.provider_id, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();
    service.delete_appointment(&t, a.id).await.unwrap();

    assert_matches!(service.get_appointment(&t, a.id).await, Err(AppointmentError::NotFound));
    assert_matches!(service.delete_appointment(&t, a.id).await, Err(AppointmentError::NotFound));

    let archived = store.get_archived(a.id, clinic.tenant_id).await.unwrap().unwrap();
    assert_eq!(archived.status, AppointmentStatus::Cancelled);

    book(&service, &t, clinic.provider_id, TestClock::at(10, 0), TestClock::at(11, 0)).await.unwrap();
}

#[tokio::test]
async fn test_default_page_size_comes_from_config() {
    let store = InMemoryAppointmentStore::new();
    let config = AppConfig {
        default_page_size: 2,
        max_page_size: 5,
        ..AppConfig::default()
    };
    let service = AppointmentBookingService::with_store(Arc::new(store), &config);
    let clinic = TestTenant::default();
    let t = clinic.context();

    for hour in 0..6 {
        book(&service, &t, clinic.provider_id, TestClock::at(hour, 0), TestClock::at(hour, 30)).await.unwrap();
    }

    let default_page = service.list_appointments(&t, ListAppointmentsQuery::default()).await.unwrap();
    assert_eq!(default_page.items.len(), 2);
    assert_eq!(default_page.pages, 3);

    let capped = service
        .list_appointments(
            &t,
            ListAppointmentsQuery {
                limit: Some(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(capped.size, 5);
    assert_eq!(capped.items.len(), 5);
}

#[tokio::test]
async fn test_offset_past_the_end_returns_empty_page() {
    let (service, _store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let t = clinic.context();

    book(&service, &t, clinic.provider_id, TestClock::at(9, 0), TestClock::at(10, 0)).await.unwrap();

    let page = service
        .list_appointments(
            &t,
            ListAppointmentsQuery {
                skip: Some(u32::MAX),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.total, 1);
    assert_eq!(page.page, u64::from(u32::MAX) + 1);
    assert_eq!(page.pages, 1);
}

#[tokio::test]
async fn test_status_update_to_cancelled_follows_cancellation_policy() {
    let (service, store) = booking_service(CancellationPolicy::Deactivate);
    let clinic = TestTenant::default();
    let t = clinic.context();
    let p = clinic.provider_id;

    let booked = book(&service, &t, p, TestClock::at(9, 0), TestClock::at(10, 0)).await.unwrap();

    let cancelled = service
        .update_appointment(
            &t,
            booked.id,
            UpdateAppointmentRequest {
                status: Patch::Value("cancelled".to_string()),
                notes: Patch::Value("patient called in".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert!(!cancelled.is_active);
    assert_eq!(cancelled.notes.as_deref(), Some("patient called in"));
    assert!(store.get_by_id(booked.id, clinic.tenant_id).await.unwrap().is_none());
    assert_matches!(service.get_appointment(&t, booked.id).await, Err(AppointmentError::NotFound));

    // Slot is free again
    book(&service, &t, p, TestClock::at(9, 0), TestClock::at(10, 0)).await.unwrap();
}
