use crate::infra::{GateBackend, InMemoryDraftStore, StudentRegistry};
use clap::Args;
use enrollment_wizard::config::default_gov_id_options;
use enrollment_wizard::error::AppError;
use enrollment_wizard::workflows::enrollment::{
    Draft, EnrollmentHost, EnrollmentService, FileSelection, FileSource, SessionId,
    WizardSettings, WizardSnapshot,
};
use std::sync::Arc;

type DemoService = EnrollmentService<InMemoryDraftStore, GateBackend, StudentRegistry>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Email already on record; the first attempt uses it and is turned away.
    #[arg(long, default_value = "taken@x.com")]
    pub(crate) taken_email: String,
    /// Email used for the successful enrollment.
    #[arg(long, default_value = "asha.verma@example.com")]
    pub(crate) email: String,
    /// Skip the save-and-resume portion of the demo.
    #[arg(long)]
    pub(crate) skip_resume: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            taken_email: "taken@x.com".to_string(),
            email: "asha.verma@example.com".to_string(),
            skip_resume: false,
        }
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        taken_email,
        email,
        skip_resume,
    } = args;

    let registry = Arc::new(StudentRegistry::default());
    registry.on_submit(&Draft {
        student_name: "Existing Student".to_string(),
        email: taken_email.clone(),
        ..Draft::default()
    });
    let service: DemoService = EnrollmentService::new(
        Arc::new(InMemoryDraftStore::default()),
        Arc::new(GateBackend::Registry(Arc::clone(&registry))),
        Arc::clone(&registry),
        WizardSettings::default(),
        default_gov_id_options(),
    );

    println!("Student enrollment wizard demo");
    let (id, snapshot) = service.start();
    render(&id, &snapshot);

    for (field, value) in [
        ("studentName", "Asha Verma"),
        ("roomNumber", "204"),
        ("mobileNumber", "9876543210"),
        ("email", taken_email.as_str()),
    ] {
        service.edit_field(&id, field, value)?;
    }
    let (outcome, snapshot) = service.advance(&id).await?;
    println!("\nAdvance with {taken_email}: {outcome:?}");
    render(&id, &snapshot);

    service.dismiss_notification(&id)?;
    service.edit_field(&id, "email", &email)?;
    let (outcome, snapshot) = service.advance(&id).await?;
    println!("\nAdvance with {email}: {outcome:?}");
    render(&id, &snapshot);

    service.edit_field(&id, "guardianName", "Rakesh Verma")?;

    let id = if skip_resume {
        id
    } else {
        let (outcome, _) = service.save_and_close(&id)?;
        println!(
            "\nSave and close: {outcome:?} ({} closed sessions)",
            registry.closed_sessions()
        );
        let (resumed, snapshot) = service.start();
        println!("Reopened as {} with the saved draft", resumed.0);
        render(&resumed, &snapshot);
        let (_, snapshot) = service.advance(&resumed).await?;
        render(&resumed, &snapshot);
        resumed
    };

    for (field, value) in [
        ("guardianPhoneNumber", "9123456780"),
        ("address", "12 MG Road, Pune"),
    ] {
        service.edit_field(&id, field, value)?;
    }
    service.advance(&id).await?;

    for (field, value) in [("password", "Hostel#2024"), ("confirmPassword", "Hostel#2024")] {
        service.edit_field(&id, field, value)?;
    }
    service.advance(&id).await?;

    service.select_category(&id, "Aadhar Card")?;
    let (outcome, snapshot) = service
        .attach_image(
            &id,
            FileSelection::single(FileSource::Bytes {
                name: "aadhar.png".to_string(),
                content: b"demo-card-scan".to_vec(),
            }),
        )
        .await?;
    println!("\nGovernment ID image: {outcome:?}");
    render(&id, &snapshot);

    service.submit(&id)?;
    println!("\nEnrolled students:");
    for student in registry.students() {
        println!("  - {} <{}>", display_name(&student), student.email);
    }

    Ok(())
}

fn display_name(student: &Draft) -> &str {
    if student.student_name.is_empty() {
        "(unnamed)"
    } else {
        &student.student_name
    }
}

fn render(id: &SessionId, snapshot: &WizardSnapshot) {
    println!(
        "- [{}] step {}/4 {} | next {} | submit {}",
        id.0,
        snapshot.step_index + 1,
        snapshot.step_label,
        if snapshot.is_next_enabled {
            "enabled"
        } else {
            "disabled"
        },
        if snapshot.shows_submit {
            "shown"
        } else {
            "hidden"
        },
    );
    for (field, issue) in &snapshot.field_issues {
        println!("    {field}: {issue}");
    }
    if snapshot.notification.is_open {
        println!("    notification: {}", snapshot.notification.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_runs_end_to_end() {
        run_demo(DemoArgs::default()).await.expect("demo completes");
    }

    #[tokio::test]
    async fn demo_runs_without_resume() {
        run_demo(DemoArgs {
            skip_resume: true,
            ..DemoArgs::default()
        })
        .await
        .expect("demo completes");
    }
}
