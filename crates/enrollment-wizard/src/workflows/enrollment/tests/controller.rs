use super::common::*;
use crate::workflows::enrollment::controller::{
    AdvanceOutcome, ImageOutcome, PendingAdvance, SaveOutcome, SessionStatus, WizardController,
    WizardError, WizardSettings,
};
use crate::workflows::enrollment::domain::{Draft, DraftField, DraftFieldError, Step};
use crate::workflows::enrollment::encoder::{EncodeError, FileSelection, FileSource};
use crate::workflows::enrollment::gate::GateError;
use crate::workflows::enrollment::notification::{
    Severity, EMAIL_TAKEN_MESSAGE, GENERIC_FAILURE_MESSAGE,
};
use std::path::PathBuf;
use std::sync::Arc;

async fn at_identification(harness: &Harness) -> TestController {
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));
    assert_eq!(
        controller.advance().await.expect("personal step passes"),
        AdvanceOutcome::Advanced {
            to: Step::GuardianInfo
        }
    );
    fill(&mut controller, guardian_edits());
    controller.advance().await.expect("guardian step passes");
    fill(&mut controller, credential_edits());
    controller.advance().await.expect("credential step passes");
    assert_eq!(controller.active_step(), Step::Identification);
    controller
}

fn png(name: &str) -> FileSource {
    FileSource::Bytes {
        name: name.to_string(),
        content: b"hello".to_vec(),
    }
}

#[test]
fn fresh_session_starts_empty_on_the_first_step() {
    let harness = Harness::new();
    let controller = harness.started();
    assert_eq!(controller.draft(), &Draft::default());
    assert_eq!(controller.active_step(), Step::PersonalInfo);
    assert!(!controller.is_next_enabled());
    assert!(!controller.gate_check_in_flight());
    assert_eq!(controller.status(), SessionStatus::Open);
}

#[test]
fn personal_step_gating_tracks_each_required_field() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));
    assert!(controller.is_next_enabled());

    for (field, broken, fixed) in [
        (DraftField::StudentName, "   ", "Asha Verma"),
        (DraftField::Email, "asha@hostel", FREE_EMAIL),
        (DraftField::MobileNumber, "98765", "9876543210"),
    ] {
        controller.edit_field(field, broken).expect("edit accepted");
        assert!(!controller.is_next_enabled(), "{field:?} should block");
        controller.edit_field(field, fixed).expect("edit accepted");
        assert!(controller.is_next_enabled(), "{field:?} should unblock");
    }

    controller
        .edit_field(DraftField::RoomNumber, "")
        .expect("room is optional");
    assert!(controller.is_next_enabled());
}

#[tokio::test]
async fn guardian_and_credential_gating_follow_their_fields() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));
    controller.advance().await.expect("advances");
    assert!(!controller.is_next_enabled());

    fill(&mut controller, guardian_edits());
    assert!(controller.is_next_enabled());
    controller
        .edit_field(DraftField::Address, "")
        .expect("edit accepted");
    assert!(!controller.is_next_enabled());
    controller
        .edit_field(DraftField::Address, "Hostel Block C")
        .expect("edit accepted");
    controller.advance().await.expect("advances");

    fill(&mut controller, credential_edits());
    assert!(controller.is_next_enabled());
    controller
        .edit_field(DraftField::ConfirmPassword, "Hostel#2025")
        .expect("edit accepted");
    assert!(!controller.is_next_enabled(), "mismatch blocks");
    controller
        .edit_field(DraftField::Password, "Hostel#2025")
        .expect("edit accepted");
    assert!(controller.is_next_enabled());
    controller
        .edit_field(DraftField::Password, "weak")
        .expect("edit accepted");
    controller
        .edit_field(DraftField::ConfirmPassword, "weak")
        .expect("edit accepted");
    assert!(!controller.is_next_enabled(), "policy blocks matching weak passwords");
}

#[tokio::test]
async fn free_email_moves_to_guardian_step() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));

    let outcome = controller.advance().await.expect("advance runs");

    assert_eq!(
        outcome,
        AdvanceOutcome::Advanced {
            to: Step::GuardianInfo
        }
    );
    assert_eq!(controller.active_step().index(), 1);
    assert_eq!(harness.gate.calls(), 1);
    assert!(controller.notification().is_none());
}

#[tokio::test]
async fn taken_email_stays_and_notifies() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(TAKEN_EMAIL));

    let outcome = controller.advance().await.expect("advance runs");

    assert_eq!(outcome, AdvanceOutcome::EmailTaken);
    assert_eq!(controller.active_step().index(), 0);
    let notification = controller.notification().expect("notification open");
    assert_eq!(notification.severity, Severity::Error);
    assert_eq!(notification.message, EMAIL_TAKEN_MESSAGE);
    assert!(!controller.gate_check_in_flight());
}

#[tokio::test]
async fn gate_failure_stays_and_shows_generic_message() {
    let harness = Harness::new();
    harness.gate.set_offline(true);
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));

    let outcome = controller.advance().await.expect("advance runs");

    assert_eq!(outcome, AdvanceOutcome::GateFailed);
    assert_eq!(controller.active_step(), Step::PersonalInfo);
    let notification = controller.notification().expect("notification open");
    assert_eq!(notification.message, GENERIC_FAILURE_MESSAGE);

    harness.gate.set_offline(false);
    assert_eq!(
        controller.advance().await.expect("retry runs"),
        AdvanceOutcome::Advanced {
            to: Step::GuardianInfo
        }
    );
    assert_eq!(harness.gate.calls(), 2);
}

#[tokio::test]
async fn incomplete_step_rejects_advance_without_calling_the_gate() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    controller
        .edit_field(DraftField::Email, FREE_EMAIL)
        .expect("edit accepted");

    match controller.advance().await {
        Err(WizardError::StepIncomplete {
            step: Step::PersonalInfo,
        }) => {}
        other => panic!("expected incomplete step, got {other:?}"),
    }
    assert_eq!(harness.gate.calls(), 0);
    assert!(controller.notification().is_none(), "validation is silent");
}

#[tokio::test]
async fn retreat_then_advance_returns_to_the_same_step() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));
    controller.advance().await.expect("advances");
    fill(&mut controller, guardian_edits());
    controller.advance().await.expect("advances");
    let before = controller.draft().clone();

    assert_eq!(controller.retreat().expect("retreats"), Step::GuardianInfo);
    controller.advance().await.expect("advances again");
    assert_eq!(controller.active_step(), Step::Credentials);
    assert_eq!(controller.draft(), &before);

    controller.retreat().expect("retreats");
    controller.retreat().expect("retreats");
    assert_eq!(controller.active_step(), Step::PersonalInfo);
    controller.advance().await.expect("gate re-checked");
    assert_eq!(controller.active_step(), Step::GuardianInfo);
    assert_eq!(controller.draft(), &before);
    assert_eq!(harness.gate.calls(), 2);
}

#[test]
fn retreat_on_first_step_stays_put() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    assert_eq!(controller.retreat().expect("allowed"), Step::PersonalInfo);
    assert_eq!(controller.active_step(), Step::PersonalInfo);
}

#[test]
fn second_advance_is_rejected_while_gate_check_is_pending() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));

    let ticket = match controller.begin_advance().expect("advance accepted") {
        PendingAdvance::GateCheck(ticket) => ticket,
        other => panic!("expected gate check, got {other:?}"),
    };
    assert_eq!(ticket.email(), FREE_EMAIL);
    assert!(controller.gate_check_in_flight());
    assert!(matches!(
        controller.begin_advance(),
        Err(WizardError::GateCheckPending)
    ));

    assert_eq!(
        controller.complete_advance(ticket, Ok(false)),
        AdvanceOutcome::Advanced {
            to: Step::GuardianInfo
        }
    );
    assert!(!controller.gate_check_in_flight());
}

#[test]
fn gate_answer_after_retreat_is_discarded() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(TAKEN_EMAIL));

    let PendingAdvance::GateCheck(ticket) = controller.begin_advance().expect("accepted") else {
        panic!("expected gate check");
    };
    controller.retreat().expect("retreat allowed");

    assert_eq!(
        controller.complete_advance(ticket, Ok(true)),
        AdvanceOutcome::Stale
    );
    assert_eq!(controller.active_step(), Step::PersonalInfo);
    assert!(controller.notification().is_none());
    assert!(!controller.gate_check_in_flight());
}

#[test]
fn gate_answer_after_email_edit_is_discarded() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));

    let PendingAdvance::GateCheck(ticket) = controller.begin_advance().expect("accepted") else {
        panic!("expected gate check");
    };
    controller
        .edit_field(DraftField::Email, "other@x.com")
        .expect("edits are not blocked");

    assert_eq!(
        controller.complete_advance(ticket, Ok(false)),
        AdvanceOutcome::Stale
    );
    assert_eq!(controller.active_step(), Step::PersonalInfo);
}

#[test]
fn gate_answer_after_close_is_discarded() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));

    let PendingAdvance::GateCheck(ticket) = controller.begin_advance().expect("accepted") else {
        panic!("expected gate check");
    };
    controller.save_and_close().expect("close allowed");

    assert_eq!(
        controller.complete_advance(
            ticket,
            Err(GateError::Transport("late".to_string()))
        ),
        AdvanceOutcome::Stale
    );
    assert!(controller.notification().is_none());
}

#[tokio::test]
async fn advancing_on_the_last_step_is_a_no_op() {
    let harness = Harness::new();
    let mut controller = at_identification(&harness).await;
    controller.select_category("PAN Card").expect("selected");
    controller
        .edit_image_field(&FileSelection::single(png("pan.png")))
        .await
        .expect("image attached");

    assert_eq!(
        controller.advance().await.expect("no-op"),
        AdvanceOutcome::AtLastStep
    );
    assert_eq!(controller.active_step(), Step::Identification);
}

#[test]
fn save_and_close_then_resume_restores_a_partial_draft() {
    let harness = Harness::new();
    let mut controller = harness.started();
    controller
        .edit_field(DraftField::StudentName, "Asha Verma")
        .expect("edit accepted");
    controller
        .edit_field(DraftField::RoomNumber, "17")
        .expect("edit accepted");
    let saved = controller.draft().clone();

    assert_eq!(
        controller.save_and_close().expect("save runs"),
        SaveOutcome::Closed
    );
    assert_eq!(harness.host.closes(), 1);
    assert_eq!(controller.status(), SessionStatus::Closed);

    let resumed = harness.started();
    assert_eq!(resumed.draft(), &saved);
    assert_eq!(resumed.active_step(), Step::PersonalInfo);
    assert!(!resumed.is_next_enabled());
}

#[test]
fn stored_value_uses_the_camel_case_record() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    controller
        .edit_field(DraftField::GuardianName, "Rakesh")
        .expect("edit accepted");
    controller.save_and_close().expect("save runs");

    let raw = harness
        .store
        .raw(controller.draft_key())
        .expect("slot written");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(value["guardianName"], "Rakesh");
    assert_eq!(value["roomNumber"], serde_json::Value::Null);
}

#[test]
fn corrupt_stored_draft_resumes_as_empty() {
    let harness = Harness::new();
    harness
        .store
        .put_raw(&WizardSettings::default().draft_key, "{not json");

    let mut controller = harness.started();
    assert_eq!(controller.draft(), &Draft::default());
    assert!(!controller.resume().expect("open session"));
}

#[test]
fn closed_session_rejects_further_commands() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    controller.save_and_close().expect("save runs");

    assert!(matches!(
        controller.edit_field(DraftField::Email, FREE_EMAIL),
        Err(WizardError::SessionFinished {
            status: SessionStatus::Closed
        })
    ));
    assert!(matches!(
        controller.retreat(),
        Err(WizardError::SessionFinished { .. })
    ));
    assert!(matches!(
        controller.save_and_close(),
        Err(WizardError::SessionFinished { .. })
    ));
    assert_eq!(harness.host.closes(), 1);
}

#[test]
fn failed_save_keeps_the_session_open() {
    let harness = Harness::new();
    let host = Arc::clone(&harness.host);
    let mut controller = WizardController::new(
        Arc::new(UnavailableDraftStore),
        Arc::clone(&harness.gate),
        Arc::clone(&host),
        WizardSettings::default(),
    );

    assert_eq!(
        controller.save_and_close().expect("save runs"),
        SaveOutcome::Failed
    );
    assert_eq!(controller.status(), SessionStatus::Open);
    assert_eq!(host.closes(), 0);
    let notification = controller.notification().expect("notified");
    assert_eq!(notification.message, GENERIC_FAILURE_MESSAGE);
}

#[tokio::test]
async fn submit_on_last_step_hands_over_the_draft_once() {
    let harness = Harness::new();
    let mut controller = at_identification(&harness).await;
    controller.select_category("PAN Card").expect("selected");
    controller
        .edit_image_field(&FileSelection::single(png("pan.png")))
        .await
        .expect("image attached");
    assert!(controller.is_next_enabled());

    controller.submit().expect("submit accepted");

    let submitted = harness.host.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(&submitted[0], controller.draft());
    assert_eq!(submitted[0], complete_draft());
    assert!(matches!(
        controller.submit(),
        Err(WizardError::SessionFinished {
            status: SessionStatus::Submitted
        })
    ));
    assert_eq!(harness.host.submitted().len(), 1);
    assert!(
        harness.store.raw(controller.draft_key()).is_none(),
        "submit does not touch the draft slot"
    );
}

#[tokio::test]
async fn submit_before_the_last_step_is_rejected() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));
    controller.advance().await.expect("advances");

    match controller.submit() {
        Err(WizardError::NotAtFinalStep {
            step: Step::GuardianInfo,
        }) => {}
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(harness.host.submitted().is_empty());
}

#[tokio::test]
async fn incomplete_identification_cannot_submit() {
    let harness = Harness::new();
    let mut controller = at_identification(&harness).await;
    controller.select_category("Voter ID").expect("selected");
    assert!(!controller.is_next_enabled(), "image still missing");

    assert!(matches!(
        controller.submit(),
        Err(WizardError::StepIncomplete {
            step: Step::Identification
        })
    ));
    assert!(harness.host.submitted().is_empty());
}

#[tokio::test]
async fn only_the_first_selected_file_is_encoded() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    let selection = FileSelection {
        files: vec![
            png("front.png"),
            FileSource::Path(PathBuf::from("/missing/back.png")),
        ],
    };

    let outcome = controller
        .edit_image_field(&selection)
        .await
        .expect("session open");

    assert_eq!(outcome, ImageOutcome::Applied);
    assert_eq!(
        controller.draft().gov_id_image,
        "data:image/png;base64,aGVsbG8="
    );
    assert_eq!(
        controller
            .edit_image_field(&FileSelection::default())
            .await
            .expect("session open"),
        ImageOutcome::NoFile
    );
}

#[tokio::test]
async fn unreadable_file_leaves_the_field_unchanged() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    let missing = FileSelection::single(FileSource::Path(PathBuf::from("/missing/id.png")));

    assert_eq!(
        controller
            .edit_image_field(&missing)
            .await
            .expect("session open"),
        ImageOutcome::Failed
    );
    assert!(controller.draft().gov_id_image.is_empty());
    assert!(controller.notification().is_none());
}

#[test]
fn superseded_image_encode_is_discarded() {
    let harness = Harness::new();
    let mut controller = harness.controller();

    let first = controller
        .begin_image_edit(&FileSelection::single(png("old.png")))
        .expect("open")
        .expect("file present");
    let second = controller
        .begin_image_edit(&FileSelection::single(png("new.jpg")))
        .expect("open")
        .expect("file present");

    assert_eq!(
        controller.complete_image_edit(first, Ok("data:image/png;base64,b2xk".to_string())),
        ImageOutcome::Stale
    );
    assert_eq!(
        controller.complete_image_edit(second, Ok("data:image/jpeg;base64,bmV3".to_string())),
        ImageOutcome::Applied
    );
    assert_eq!(controller.draft().gov_id_image, "data:image/jpeg;base64,bmV3");
}

#[test]
fn image_encode_finishing_after_close_is_discarded() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    let ticket = controller
        .begin_image_edit(&FileSelection::single(png("id.png")))
        .expect("open")
        .expect("file present");
    controller.save_and_close().expect("closes");

    let outcome = controller.complete_image_edit(
        ticket,
        Err(EncodeError::Empty {
            name: "id.png".to_string(),
        }),
    );
    assert_eq!(outcome, ImageOutcome::Stale);
}

#[test]
fn invalid_room_number_is_rejected_without_changing_the_draft() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    match controller.edit_field(DraftField::RoomNumber, "twelve") {
        Err(WizardError::Field(DraftFieldError::InvalidRoomNumber { value })) => {
            assert_eq!(value, "twelve")
        }
        other => panic!("expected field error, got {other:?}"),
    }
    assert_eq!(controller.draft(), &Draft::default());
}

#[test]
fn snapshot_reports_field_issues_and_redacts_secrets() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    controller
        .edit_field(DraftField::Email, "asha@")
        .expect("edit accepted");
    controller
        .edit_field(DraftField::Password, "abc")
        .expect("edit accepted");

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.step_label, "Personal Information");
    assert!(snapshot.field_issues.contains_key("email"));
    assert!(!snapshot.field_issues.contains_key("password"), "not on this step");
    assert!(!snapshot.shows_submit);

    let redacted = snapshot.redacted();
    assert_eq!(redacted.draft.password, "***");
    assert_eq!(redacted.draft.confirm_password, "");
}

#[tokio::test(start_paused = true)]
async fn dropped_advance_releases_the_gate_check() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));
    harness.gate.set_stalled(true);

    let cancelled =
        tokio::time::timeout(std::time::Duration::from_millis(20), controller.advance()).await;
    assert!(cancelled.is_err(), "stalled gate never answers");
    assert!(!controller.gate_check_in_flight());

    harness.gate.set_stalled(false);
    assert_eq!(
        controller.advance().await.expect("advance accepted again"),
        AdvanceOutcome::Advanced {
            to: Step::GuardianInfo
        }
    );
    assert_eq!(harness.gate.calls(), 2);
}

#[test]
fn abandoning_only_clears_the_matching_check() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));

    let PendingAdvance::GateCheck(ticket) = controller.begin_advance().expect("accepted") else {
        panic!("expected gate check");
    };
    assert!(!controller.abandon_advance(ticket.id() + 1));
    assert!(controller.gate_check_in_flight());

    assert!(controller.abandon_advance(ticket.id()));
    assert!(!controller.gate_check_in_flight());
    assert_eq!(
        controller.complete_advance(ticket, Ok(false)),
        AdvanceOutcome::Stale
    );
    assert_eq!(controller.active_step(), Step::PersonalInfo);
}

#[tokio::test]
async fn padded_taken_email_is_still_checked_as_taken() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(&format!("  {TAKEN_EMAIL} ")));
    assert_eq!(controller.draft().email, TAKEN_EMAIL);

    assert_eq!(
        controller.advance().await.expect("advance runs"),
        AdvanceOutcome::EmailTaken
    );
    assert_eq!(controller.active_step(), Step::PersonalInfo);
    assert!(harness.host.submitted().is_empty());
}

#[test]
fn gate_answer_survives_unrelated_edits() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));

    let PendingAdvance::GateCheck(ticket) = controller.begin_advance().expect("accepted") else {
        panic!("expected gate check");
    };
    controller
        .edit_field(DraftField::StudentName, "Asha K. Verma")
        .expect("edits are not blocked");

    assert_eq!(
        controller.complete_advance(ticket, Ok(false)),
        AdvanceOutcome::Advanced {
            to: Step::GuardianInfo
        }
    );
}

#[test]
fn gate_answer_for_a_now_incomplete_step_is_discarded() {
    let harness = Harness::new();
    let mut controller = harness.controller();
    fill(&mut controller, personal_edits(FREE_EMAIL));

    let PendingAdvance::GateCheck(ticket) = controller.begin_advance().expect("accepted") else {
        panic!("expected gate check");
    };
    controller
        .edit_field(DraftField::MobileNumber, "98765")
        .expect("edits are not blocked");

    assert_eq!(
        controller.complete_advance(ticket, Ok(false)),
        AdvanceOutcome::Stale
    );
    assert_eq!(controller.active_step(), Step::PersonalInfo);
    assert!(!controller.gate_check_in_flight());
}
