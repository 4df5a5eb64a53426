//! Render and Send: the two operations that move a fiche through its
//! lifecycle.

use mongodb::Database;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::excel;
use crate::excel::template::TemplateState;
use crate::mailer::{self, MailTransport, SendOutcome};
use crate::models::fiche::{Fiche, FicheStatus};
use crate::models::settings::EmailConfig;
use crate::storage::ArtifactStore;

use super::FicheLocks;

#[derive(Debug, Serialize)]
pub struct RenderReport {
    pub message: String,
    pub excel_filename: String,
    pub statut: FicheStatus,
}

#[derive(Debug, Serialize)]
pub struct SendReport {
    pub message: String,
    pub statut: FicheStatus,
}

/// Renders the fiche into its artifact and persists the Validated status.
/// Any failure propagates without touching stored state.
pub async fn render_fiche(
    db: &Database,
    template: &TemplateState,
    store: &ArtifactStore,
    locks: &FicheLocks,
    id: &str,
) -> AppResult<RenderReport> {
    let _guard = locks.acquire(id).await;

    let fiche = Fiche::find_by_id(db, id)
        .await?
        .ok_or(AppError::NotFound("Fiche non trouvée"))?;

    let registry = template.get()?;
    let rendered = excel::render(registry, &fiche)?;
    store.save(&rendered.filename, &rendered.bytes)?;

    Fiche::mark_validated(db, id, &rendered.filename).await?;
    info!(fiche = %id, artifact = %rendered.filename, "fiche validée");

    Ok(RenderReport {
        message: "Fiche validée et Excel généré".to_string(),
        excel_filename: rendered.filename,
        statut: FicheStatus::after_render(),
    })
}

/// One notification attempt, stored state untouched.
///
/// Missing configuration or an empty recipient set short-circuits to a
/// soft skip before any transport or filesystem work. A missing artifact
/// or undecodable photo only drops that attachment.
pub async fn attempt_send(
    config: Option<EmailConfig>,
    fiche: &Fiche,
    store: &ArtifactStore,
    transport: &dyn MailTransport,
) -> SendOutcome {
    let config = match config {
        Some(config) if config.is_configured() => config,
        _ => {
            return SendOutcome::Skipped(
                "Configuration email non définie. Fiche validée mais email non envoyé."
                    .to_string(),
            )
        }
    };

    let recipients = mailer::resolve_recipients(&config, &fiche.form.service_emetteur);
    if recipients.is_empty() {
        return SendOutcome::Skipped("Aucun destinataire configuré".to_string());
    }

    let artifact = fiche
        .excel_filename
        .as_ref()
        .and_then(|name| match store.read(name) {
            Ok(bytes) => Some((name.clone(), bytes)),
            Err(err) => {
                warn!(fiche = %fiche.id, artifact = %name, "pièce jointe absente: {err}");
                None
            }
        });

    let mail = mailer::compose(fiche, &config.smtp_user, recipients, artifact);
    match transport.deliver(&config, mail).await {
        Ok(()) => SendOutcome::Sent,
        Err(err) => SendOutcome::Failed(err),
    }
}

/// Attempts the notification email and records the resulting status.
///
/// The response always carries the outcome as data: soft skips land back
/// on Validated, transport failures on SendFailed, never an aborting
/// error. Callable from any current status; an unrendered Draft goes out
/// without the artifact attachment.
pub async fn send_fiche(
    db: &Database,
    store: &ArtifactStore,
    transport: &dyn MailTransport,
    locks: &FicheLocks,
    id: &str,
) -> AppResult<SendReport> {
    let _guard = locks.acquire(id).await;

    let fiche = Fiche::find_by_id(db, id)
        .await?
        .ok_or(AppError::NotFound("Fiche non trouvée"))?;

    let config = EmailConfig::find(db).await?;
    let outcome = attempt_send(config, &fiche, store, transport).await;

    let statut = FicheStatus::after_send(&outcome);
    Fiche::set_status(db, id, statut).await?;

    let message = match outcome {
        SendOutcome::Sent => {
            info!(fiche = %id, "email envoyé");
            "Email envoyé avec succès".to_string()
        }
        SendOutcome::Skipped(reason) => {
            info!(fiche = %id, "envoi ignoré: {reason}");
            reason
        }
        SendOutcome::Failed(err) => {
            warn!(fiche = %id, "échec d'envoi: {err}");
            format!("Erreur envoi email: {err}")
        }
    };

    Ok(SendReport { message, statut })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::OutgoingMail;
    use crate::models::fiche::tests::request_json;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records what it is asked to deliver; optionally refuses.
    struct StubTransport {
        delivered: Mutex<Vec<OutgoingMail>>,
        failure: Option<String>,
    }

    impl StubTransport {
        fn ok() -> StubTransport {
            StubTransport {
                delivered: Mutex::new(Vec::new()),
                failure: None,
            }
        }

        fn failing(message: &str) -> StubTransport {
            StubTransport {
                delivered: Mutex::new(Vec::new()),
                failure: Some(message.to_string()),
            }
        }
    }

    #[async_trait]
    impl MailTransport for StubTransport {
        async fn deliver(&self, _config: &EmailConfig, mail: OutgoingMail) -> Result<(), String> {
            self.delivered.lock().unwrap().push(mail);
            match &self.failure {
                Some(message) => Err(message.clone()),
                None => Ok(()),
            }
        }
    }

    fn fiche() -> Fiche {
        let form = serde_json::from_value(request_json()).unwrap();
        Fiche::from_request(form)
    }

    fn configured() -> EmailConfig {
        let mut config = EmailConfig::default();
        config.smtp_user = "qse@example.com".to_string();
        config.default_recipients = vec!["resp@example.com".to_string()];
        config
    }

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn unconfigured_email_is_a_soft_skip_without_transport_call() {
        let (_dir, store) = store();
        let transport = StubTransport::ok();

        for config in [None, Some(EmailConfig::default())] {
            let outcome = attempt_send(config, &fiche(), &store, &transport).await;
            assert!(matches!(
                &outcome,
                SendOutcome::Skipped(reason) if reason.contains("non définie")
            ));
            assert_eq!(FicheStatus::after_send(&outcome), FicheStatus::Validated);
        }
        assert!(transport.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_recipient_set_is_a_soft_skip() {
        let (_dir, store) = store();
        let transport = StubTransport::ok();

        let mut config = configured();
        config.default_recipients.clear();

        let outcome = attempt_send(Some(config), &fiche(), &store, &transport).await;
        assert_eq!(
            outcome,
            SendOutcome::Skipped("Aucun destinataire configuré".to_string())
        );
        assert!(transport.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_becomes_send_failed() {
        let (_dir, store) = store();
        let transport = StubTransport::failing("connexion refusée");

        let outcome = attempt_send(Some(configured()), &fiche(), &store, &transport).await;
        assert_eq!(outcome, SendOutcome::Failed("connexion refusée".to_string()));
        assert_eq!(FicheStatus::after_send(&outcome), FicheStatus::SendFailed);
    }

    #[tokio::test]
    async fn delivery_attaches_the_stored_artifact() {
        let (_dir, store) = store();
        let transport = StubTransport::ok();

        let mut fiche = fiche();
        fiche.excel_filename = Some("NC_Affinage_PPC_20260217_1500.xlsm".to_string());
        store
            .save("NC_Affinage_PPC_20260217_1500.xlsm", b"workbook")
            .unwrap();

        let outcome = attempt_send(Some(configured()), &fiche, &store, &transport).await;
        assert_eq!(outcome, SendOutcome::Sent);

        let delivered = transport.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].attachments.len(), 1);
        assert_eq!(
            delivered[0].attachments[0].filename,
            "NC_Affinage_PPC_20260217_1500.xlsm"
        );
    }

    #[tokio::test]
    async fn missing_artifact_is_tolerated() {
        let (_dir, store) = store();
        let transport = StubTransport::ok();

        let mut fiche = fiche();
        fiche.excel_filename = Some("NC_gone.xlsm".to_string());

        let outcome = attempt_send(Some(configured()), &fiche, &store, &transport).await;
        assert_eq!(outcome, SendOutcome::Sent);

        let delivered = transport.delivered.lock().unwrap();
        assert!(delivered[0].attachments.is_empty());
    }
}
