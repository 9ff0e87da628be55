use assert_matches::assert_matches;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use appointment_cell::error::AppointmentError;
use appointment_cell::models::{
    ActionVariant, Appointment, AppointmentStatus, LifecyclePolicy,
};
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use shared_models::auth::UserRole;

fn appointment(status: AppointmentStatus, is_paid: bool) -> Appointment {
    Appointment {
        id: "apt-1".to_string(),
        doctor_id: "doc-1".to_string(),
        patient_id: "pat-1".to_string(),
        doctor_name: "Dr. Grey".to_string(),
        patient_name: "Pat".to_string(),
        appointment_type: "consultation".to_string(),
        preferred_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        preferred_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        notes: String::new(),
        status,
        is_paid,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        room_id: None,
        dismissed_by_admin: false,
    }
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
}

fn service() -> AppointmentLifecycleService {
    AppointmentLifecycleService::new(LifecyclePolicy::default())
}

#[test]
fn paid_patient_can_join_during_the_appointment() {
    let action = service().compute_action(&appointment(AppointmentStatus::Accepted, true), at(10, 5), UserRole::Patient);

    assert_eq!(action.variant, ActionVariant::Join);
    assert_eq!(action.label, "Join Now");
    assert!(action.enabled);
}

#[test]
fn unpaid_patient_is_asked_to_pay() {
    let action = service().compute_action(&appointment(AppointmentStatus::Accepted, false), at(9, 0), UserRole::Patient);

    assert_eq!(action.variant, ActionVariant::Pay);
    assert_eq!(action.label, "Pay Now");
    assert!(action.enabled);
}

#[test]
fn doctor_can_join_accepted_appointment_regardless_of_payment() {
    let action = service().compute_action(&appointment(AppointmentStatus::Accepted, false), at(10, 0), UserRole::Doctor);

    assert_eq!(action.variant, ActionVariant::Join);
    assert!(action.enabled);
}

#[test]
fn pending_and_rejected_are_disabled_for_everyone() {
    let lifecycle = service();
    for role in [UserRole::Doctor, UserRole::Patient, UserRole::Admin] {
        let pending = lifecycle.compute_action(&appointment(AppointmentStatus::Pending, false), at(9, 0), role);
        assert_eq!(pending.label, "Pending");
        assert!(!pending.enabled);

        let rejected = lifecycle.compute_action(&appointment(AppointmentStatus::Rejected, true), at(9, 0), role);
        assert_eq!(rejected.label, "Declined");
        assert!(!rejected.enabled);
    }
}

#[test]
fn admin_viewer_gets_no_action_on_accepted_appointment() {
    let action = service().compute_action(&appointment(AppointmentStatus::Accepted, true), at(10, 0), UserRole::Admin);

    assert_eq!(action.variant, ActionVariant::None);
    assert_eq!(action.label, "");
    assert!(!action.enabled);
}

#[test]
fn finished_overrides_unpaid_state_after_the_window() {
    let lifecycle = service();
    let unpaid = appointment(AppointmentStatus::Accepted, false);

    for role in [UserRole::Doctor, UserRole::Patient] {
        let action = lifecycle.compute_action(&unpaid, at(10, 45), role);
        assert_eq!(action.variant, ActionVariant::Finished);
        assert_eq!(action.label, "Finished");
        assert!(!action.enabled);
    }
}

#[test]
fn window_end_is_inclusive() {
    let lifecycle = service();
    let accepted = appointment(AppointmentStatus::Accepted, true);

    assert!(!lifecycle.is_past(&accepted, at(10, 30)));
    assert!(lifecycle.is_past(&accepted, at(10, 31)));
    assert_eq!(
        lifecycle.compute_action(&accepted, at(10, 30), UserRole::Patient).variant,
        ActionVariant::Join
    );
}

#[test]
fn deployment_offset_shifts_the_window() {
    let policy = LifecyclePolicy {
        duration_minutes: 30,
        utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
    };
    let lifecycle = AppointmentLifecycleService::new(policy);
    let accepted = appointment(AppointmentStatus::Accepted, true);

    // 10:00 at UTC+2 is 08:00 UTC
    assert_eq!(lifecycle.scheduled_start(&accepted), at(8, 0));
    assert!(lifecycle.is_past(&accepted, at(8, 45)));
}

#[test]
fn custom_duration_extends_the_window() {
    let policy = LifecyclePolicy {
        duration_minutes: 60,
        ..LifecyclePolicy::default()
    };
    let lifecycle = AppointmentLifecycleService::new(policy);

    assert!(!lifecycle.is_past(&appointment(AppointmentStatus::Accepted, true), at(10, 45)));
}

#[test]
fn only_pending_appointments_can_change_status() {
    let lifecycle = service();

    assert!(lifecycle
        .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Accepted)
        .is_ok());
    assert!(lifecycle
        .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Rejected)
        .is_ok());

    assert_matches!(
        lifecycle.validate_status_transition(AppointmentStatus::Rejected, AppointmentStatus::Accepted),
        Err(AppointmentError::InvalidTransition {
            from: AppointmentStatus::Rejected,
            to: AppointmentStatus::Accepted
        })
    );
    assert_matches!(
        lifecycle.validate_status_transition(AppointmentStatus::Accepted, AppointmentStatus::Pending),
        Err(AppointmentError::InvalidTransition { .. })
    );
    assert_matches!(
        lifecycle.validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Pending),
        Err(AppointmentError::InvalidTransition { .. })
    );
}
