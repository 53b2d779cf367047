//! Setup wizard flows against a stub backend.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};

use ciris_console::error::{FormViolation, WizardError};
use ciris_console::setup::{NoticeLevel, SetupWizard, WizardStep};
use ciris_console::{Console, ConsoleConfig, MemorySessionStore};

use common::{Hits, IdentityMode, ManagerMode, Stub, start_stub};

async fn wizard_with(stub: Stub) -> Option<(SetupWizard, Arc<Stub>, Console)> {
    let stub = Arc::new(stub);
    let addr = start_stub(Arc::clone(&stub)).await?;
    let console = Console::new(
        ConsoleConfig::new(&format!("http://{addr}")).ok()?,
        Arc::new(MemorySessionStore::default()),
    )
    .unwrap();
    let wizard = console.setup_wizard();
    Some((wizard, stub, console))
}

fn first_run_stub() -> Stub {
    Stub::new(ManagerMode::Absent, IdentityMode::Unauthorized)
}

/// Fill the LLM step and pass its validation.
async fn validated_llm(wizard: &SetupWizard) {
    wizard.load_catalogs().await.unwrap();
    wizard.set_api_key(SecretString::from("sk-test-key")).await.unwrap();
    wizard.validate_llm().await.unwrap();
}

async fn fill_users(wizard: &SetupWizard) {
    wizard
        .set_admin_password(SecretString::from("root-secret"))
        .await
        .unwrap();
    wizard
        .set_admin_password_confirm(SecretString::from("root-secret"))
        .await
        .unwrap();
    wizard.set_username("ada").await.unwrap();
    wizard.set_password(SecretString::from("ada-secret")).await.unwrap();
    wizard
        .set_password_confirm(SecretString::from("ada-secret"))
        .await
        .unwrap();
}

/// Walk to the adapters step with a valid draft.
async fn at_adapters(wizard: &SetupWizard) {
    assert_eq!(wizard.advance().await.unwrap(), WizardStep::Llm);
    validated_llm(wizard).await;
    assert_eq!(wizard.advance().await.unwrap(), WizardStep::Users);
    fill_users(wizard).await;
    assert_eq!(wizard.advance().await.unwrap(), WizardStep::Template);
    assert_eq!(wizard.advance().await.unwrap(), WizardStep::Adapters);
}

#[tokio::test]
async fn catalogs_load_once_and_preselect_first_provider() {
    let Some((wizard, stub, console)) = wizard_with(first_run_stub()).await else {
        return;
    };
    assert!(console.setup_required().await.unwrap());

    wizard.load_catalogs().await.unwrap();
    wizard.load_catalogs().await.unwrap();
    assert_eq!(Hits::get(&stub.hits.providers), 1);
    assert_eq!(Hits::get(&stub.hits.templates), 1);

    let draft = wizard.draft().await;
    assert_eq!(draft.llm.provider.as_deref(), Some("openai"));
    assert_eq!(draft.llm.model, "gpt-4o");

    let templates = wizard.templates().await;
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].id, "general");
    assert!(matches!(
        wizard.select_template(Some("rogue")).await,
        Err(WizardError::UnknownTemplate(_))
    ));
}

#[tokio::test]
async fn empty_api_key_never_reaches_the_backend() {
    let Some((wizard, stub, _console)) = wizard_with(first_run_stub()).await else {
        return;
    };
    wizard.load_catalogs().await.unwrap();

    let err = wizard.validate_llm().await.unwrap_err();
    assert_eq!(err.to_string(), "API key is required");
    assert_eq!(Hits::get(&stub.hits.validate), 0);

    let view = wizard.view().await;
    assert!(!view.llm_validated);
    assert_eq!(view.notice.unwrap().message, "API key is required");
}

#[tokio::test]
async fn rejected_key_surfaces_backend_error() {
    let Some((wizard, stub, _console)) = wizard_with(first_run_stub()).await else {
        return;
    };
    wizard.load_catalogs().await.unwrap();
    wizard.set_api_key(SecretString::from("bogus")).await.unwrap();

    let err = wizard.validate_llm().await.unwrap_err();
    assert!(matches!(err, WizardError::Validation(ref m) if m == "Invalid API key"));
    assert_eq!(Hits::get(&stub.hits.validate), 1);
    assert!(!wizard.view().await.llm_validated);
    assert_eq!(
        wizard.draft().await.llm.api_key.expose_secret(),
        "bogus"
    );
}

#[tokio::test]
async fn stale_validation_result_is_discarded() {
    let stub = first_run_stub().with_validate_delay(Duration::from_millis(300));
    let Some((wizard, _stub, _console)) = wizard_with(stub).await else {
        return;
    };
    let wizard = Arc::new(wizard);
    wizard.load_catalogs().await.unwrap();
    wizard.set_api_key(SecretString::from("sk-first")).await.unwrap();

    let pending = {
        let wizard = Arc::clone(&wizard);
        tokio::spawn(async move { wizard.validate_llm().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(wizard.view().await.validating);
    assert!(matches!(
        wizard.validate_llm().await,
        Err(WizardError::InFlight)
    ));
    wizard.set_api_key(SecretString::from("sk-second")).await.unwrap();

    assert!(matches!(
        pending.await.unwrap(),
        Err(WizardError::Validation(_))
    ));
    let view = wizard.view().await;
    assert!(!view.llm_validated);
    assert!(!view.validating);

    wizard.validate_llm().await.unwrap();
    assert!(wizard.view().await.llm_validated);
}

#[tokio::test]
async fn gates_and_backward_navigation_keep_the_draft() {
    let Some((wizard, _stub, _console)) = wizard_with(first_run_stub()).await else {
        return;
    };
    assert_eq!(wizard.advance().await.unwrap(), WizardStep::Llm);
    validated_llm(&wizard).await;
    assert_eq!(wizard.advance().await.unwrap(), WizardStep::Users);

    wizard
        .set_admin_password(SecretString::from("root-secret"))
        .await
        .unwrap();
    wizard
        .set_admin_password_confirm(SecretString::from("root-secreT"))
        .await
        .unwrap();
    let err = wizard.advance().await.unwrap_err();
    assert_eq!(err.to_string(), "Admin passwords do not match");
    assert_eq!(wizard.step().await, WizardStep::Users);

    fill_users(&wizard).await;
    wizard
        .set_password_confirm(SecretString::from("other"))
        .await
        .unwrap();
    let err = wizard.advance().await.unwrap_err();
    assert_eq!(err.to_string(), "User passwords do not match");

    wizard
        .set_password_confirm(SecretString::from("ada-secret"))
        .await
        .unwrap();
    assert_eq!(wizard.advance().await.unwrap(), WizardStep::Template);

    assert_eq!(wizard.go_to(WizardStep::Llm).await.unwrap(), WizardStep::Llm);
    let draft = wizard.draft().await;
    assert_eq!(draft.users.username, "ada");
    assert_eq!(draft.llm.api_key.expose_secret(), "sk-test-key");
    assert!(wizard.view().await.llm_validated);

    assert_eq!(wizard.advance().await.unwrap(), WizardStep::Users);
    assert_eq!(wizard.advance().await.unwrap(), WizardStep::Template);
}

#[tokio::test]
async fn double_submit_sends_exactly_one_completion() {
    let stub = first_run_stub().with_complete_delay(Duration::from_millis(200));
    let Some((wizard, stub, _console)) = wizard_with(stub).await else {
        return;
    };
    at_adapters(&wizard).await;
    wizard.set_backup_api_key(SecretString::from("sk-backup")).await.unwrap();

    let (first, second) = tokio::join!(wizard.submit(), wizard.submit());
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(WizardError::InFlight)))
    );
    assert_eq!(Hits::get(&stub.hits.complete), 1);
    assert_eq!(wizard.step().await, WizardStep::Complete);

    assert!(matches!(
        wizard.submit().await,
        Err(WizardError::AlreadyCompleted)
    ));
    assert_eq!(Hits::get(&stub.hits.complete), 1);

    let body = stub.last_complete_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["template_id"], "general");
    assert_eq!(body["enabled_adapters"], serde_json::json!(["api"]));
    assert_eq!(body["admin_username"], "ada");
    assert_eq!(body["system_admin_password"], "root-secret");
    assert_eq!(body["agent_port"], 8080);
    assert!(body["backup_llm_api_key"].is_null());

    let handoff = wizard.login_handoff().await.unwrap();
    assert_eq!(handoff.username, "ada");
}

#[tokio::test]
async fn failed_submission_stays_on_adapters_and_can_retry() {
    let Some((wizard, stub, _console)) = wizard_with(first_run_stub()).await else {
        return;
    };
    at_adapters(&wizard).await;
    wizard.set_adapter_enabled("discord", true).await.unwrap();

    let err = wizard.submit().await.unwrap_err();
    assert!(matches!(err, WizardError::AdapterFieldMissing { .. }));
    assert_eq!(Hits::get(&stub.hits.complete), 0);

    wizard
        .set_adapter_field("discord", "bot_token", "discord-token")
        .await
        .unwrap();
    wizard
        .set_adapter_field("discord", "channel_id", "12345")
        .await
        .unwrap();

    stub.fail_complete.store(true, Ordering::SeqCst);
    let err = wizard.submit().await.unwrap_err();
    assert_eq!(err.to_string(), "Setup failed: Config write failed");
    assert_eq!(wizard.step().await, WizardStep::Adapters);
    let view = wizard.view().await;
    assert_eq!(view.notice.unwrap().level, NoticeLevel::Error);
    assert_eq!(wizard.draft().await.users.username, "ada");

    stub.fail_complete.store(false, Ordering::SeqCst);
    wizard.submit().await.unwrap();
    assert_eq!(wizard.step().await, WizardStep::Complete);
    assert_eq!(Hits::get(&stub.hits.complete), 2);

    let body = stub.last_complete_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["enabled_adapters"], serde_json::json!(["api", "discord"]));
    assert_eq!(body["adapter_config"]["discord"]["bot_token"], "discord-token");
}

#[tokio::test]
async fn submit_rechecks_llm_validity_after_late_edit() {
    let Some((wizard, stub, _console)) = wizard_with(first_run_stub()).await else {
        return;
    };
    at_adapters(&wizard).await;
    wizard.set_api_key(SecretString::from("sk-changed")).await.unwrap();

    let err = wizard.submit().await.unwrap_err();
    assert!(matches!(
        err,
        WizardError::FormInvariant(FormViolation::LlmNotValidated)
    ));
    assert_eq!(Hits::get(&stub.hits.complete), 0);
    assert_eq!(wizard.step().await, WizardStep::Adapters);
    assert_eq!(wizard.view().await.notice.unwrap().level, NoticeLevel::Error);
}

#[tokio::test]
async fn submit_rechecks_password_confirmation() {
    let Some((wizard, stub, _console)) = wizard_with(first_run_stub()).await else {
        return;
    };
    at_adapters(&wizard).await;
    wizard
        .set_password_confirm(SecretString::from("ada-secreT"))
        .await
        .unwrap();

    let err = wizard.submit().await.unwrap_err();
    assert!(matches!(
        err,
        WizardError::FormInvariant(FormViolation::PasswordMismatch)
    ));
    assert_eq!(Hits::get(&stub.hits.complete), 0);
    assert_eq!(wizard.step().await, WizardStep::Adapters);
    assert_eq!(wizard.draft().await.users.username, "ada");
}
