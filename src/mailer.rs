//! Notification email: recipient routing, message composition and the
//! SMTP transport seam.

use std::collections::HashSet;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::models::fiche::Fiche;
use crate::models::settings::EmailConfig;

pub const EXCEL_MIME: &str = "application/vnd.ms-excel.sheet.macroEnabled.12";

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachment>,
}

/// How a send attempt resolved. Expected negative conditions (nothing
/// configured, nobody to notify, transport refused) are values the caller
/// branches on, never errors that abort the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Skipped(String),
    Failed(String),
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, config: &EmailConfig, mail: OutgoingMail) -> Result<(), String>;
}

/// Union of the default list and the per-service list for the fiche's
/// emitting service, deduplicated. Ordering is not specified.
pub fn resolve_recipients(config: &EmailConfig, service: &str) -> Vec<String> {
    let mut recipients: HashSet<String> = config.default_recipients.iter().cloned().collect();
    if let Some(per_service) = config.auto_recipients_by_service.get(service) {
        recipients.extend(per_service.iter().cloned());
    }
    recipients.into_iter().collect()
}

pub fn subject_for(fiche: &Fiche) -> String {
    format!(
        "Déclaration non-conformité – {} – {} {}",
        fiche.form.service_emetteur,
        fiche.form.date_evenement.format("%d/%m/%Y"),
        fiche.form.heure_evenement
    )
}

pub fn body_for(fiche: &Fiche) -> String {
    format!(
        "Bonjour,\n\n\
         Une nouvelle fiche de non-conformité a été déclarée :\n\n\
         Type : {}\n\
         Date : {}\n\
         Heure : {}\n\
         Service : {}\n\
         Constaté par : {}\n\
         Criticité : {}\n\n\
         Description :\n{}\n\n\
         Le fichier Excel est joint à ce mail.\n\n\
         Cordialement,\n\
         Application QSE Mobile\n",
        fiche.form.kind.label(),
        fiche.form.date_evenement.format("%d/%m/%Y"),
        fiche.form.heure_evenement,
        fiche.form.service_emetteur,
        fiche.form.constate_par,
        fiche.form.criticite.label(),
        fiche.form.description,
    )
}

/// Builds the outgoing message. Attachment problems are tolerated one by
/// one: a missing artifact or an undecodable photo is dropped with a
/// warning and the rest still goes out.
pub fn compose(
    fiche: &Fiche,
    from: &str,
    recipients: Vec<String>,
    artifact: Option<(String, Vec<u8>)>,
) -> OutgoingMail {
    let mut attachments = Vec::new();

    if let Some((filename, bytes)) = artifact {
        attachments.push(MailAttachment {
            filename,
            content_type: EXCEL_MIME.to_string(),
            bytes,
        });
    }

    for (i, photo) in fiche.form.photos.iter().enumerate() {
        match BASE64.decode(photo.data.as_bytes()) {
            Ok(bytes) => attachments.push(MailAttachment {
                filename: format!("photo_{}.jpg", i + 1),
                content_type: "image/jpeg".to_string(),
                bytes,
            }),
            Err(err) => {
                tracing::warn!(fiche = %fiche.id, photo = %photo.filename, "photo ignorée: {err}");
            }
        }
    }

    OutgoingMail {
        from: from.to_string(),
        recipients,
        subject: subject_for(fiche),
        body: body_for(fiche),
        attachments,
    }
}

fn build_message(mail: &OutgoingMail) -> Result<Message, String> {
    let from: Mailbox = mail
        .from
        .parse()
        .map_err(|err| format!("expéditeur invalide '{}': {err}", mail.from))?;

    let mut builder = Message::builder().from(from).subject(mail.subject.clone());
    for recipient in &mail.recipients {
        let to: Mailbox = recipient
            .parse()
            .map_err(|err| format!("destinataire invalide '{recipient}': {err}"))?;
        builder = builder.to(to);
    }

    let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
    for attachment in &mail.attachments {
        let content_type = ContentType::parse(&attachment.content_type)
            .unwrap_or(ContentType::parse("application/octet-stream").unwrap());
        multipart = multipart.singlepart(
            Attachment::new(attachment.filename.clone())
                .body(attachment.bytes.clone(), content_type),
        );
    }

    builder.multipart(multipart).map_err(|err| err.to_string())
}

/// Real SMTP delivery through lettre, configured per send from the stored
/// settings.
pub struct SmtpMailer;

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, config: &EmailConfig, mail: OutgoingMail) -> Result<(), String> {
        let message = build_message(&mail)?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
                .map_err(|err| err.to_string())?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
        };

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fiche::{FicheRequest, Photo};
    use serde_json::json;
    use std::collections::HashSet;

    fn fiche() -> Fiche {
        let form: FicheRequest = serde_json::from_value(json!({
            "type": "Qualité",
            "date_evenement": "2026-02-17T08:30:00Z",
            "heure_evenement": "15:00",
            "constate_par": "J. Martin",
            "service_emetteur": "Affinage PPC",
            "description": "Corps étranger détecté",
            "criticite": "Majeure",
            "created_by": "u-001"
        }))
        .unwrap();
        Fiche::from_request(form)
    }

    #[test]
    fn recipients_are_the_deduplicated_union() {
        let mut config = EmailConfig::default();
        config.default_recipients = vec!["a@ex.fr".to_string(), "b@ex.fr".to_string()];
        config
            .auto_recipients_by_service
            .insert("Affinage PPC".to_string(), vec!["b@ex.fr".to_string(), "c@ex.fr".to_string()]);

        let recipients: HashSet<String> = resolve_recipients(&config, "Affinage PPC")
            .into_iter()
            .collect();
        let expected: HashSet<String> = ["a@ex.fr", "b@ex.fr", "c@ex.fr"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(recipients, expected);

        // Unknown service: defaults only.
        let recipients = resolve_recipients(&config, "Magasin");
        assert_eq!(recipients.len(), 2);
    }

    #[test]
    fn subject_and_body_summarize_the_fiche() {
        let fiche = fiche();
        assert_eq!(
            subject_for(&fiche),
            "Déclaration non-conformité – Affinage PPC – 17/02/2026 15:00"
        );

        let body = body_for(&fiche);
        assert!(body.contains("Type : Qualité"));
        assert!(body.contains("Date : 17/02/2026"));
        assert!(body.contains("Criticité : Majeure"));
        assert!(body.contains("Corps étranger détecté"));
    }

    #[test]
    fn compose_tolerates_bad_attachments() {
        let mut fiche = fiche();
        fiche.form.photos = vec![
            Photo {
                data: BASE64.encode(b"jpeg-bytes"),
                filename: "ok.jpg".to_string(),
            },
            Photo {
                data: "%%%not-base64%%%".to_string(),
                filename: "broken.jpg".to_string(),
            },
        ];

        // No artifact on disk: dispatch still proceeds with the photos.
        let mail = compose(&fiche, "qse@ex.fr", vec!["a@ex.fr".to_string()], None);
        assert_eq!(mail.attachments.len(), 1);
        assert_eq!(mail.attachments[0].filename, "photo_1.jpg");
        assert_eq!(mail.attachments[0].bytes, b"jpeg-bytes");
    }

    #[test]
    fn compose_attaches_the_artifact_first() {
        let fiche = fiche();
        let mail = compose(
            &fiche,
            "qse@ex.fr",
            vec!["a@ex.fr".to_string()],
            Some(("NC_Affinage_PPC_20260217_1500.xlsm".to_string(), vec![1, 2, 3])),
        );
        assert_eq!(mail.attachments.len(), 1);
        assert_eq!(mail.attachments[0].content_type, EXCEL_MIME);
    }

    #[test]
    fn message_builds_with_attachments() {
        let fiche = fiche();
        let mail = compose(
            &fiche,
            "qse@example.com",
            vec!["dest@example.com".to_string()],
            Some(("NC_test.xlsm".to_string(), vec![0u8; 8])),
        );
        assert!(build_message(&mail).is_ok());
    }

    #[test]
    fn message_rejects_invalid_sender() {
        let fiche = fiche();
        let mail = compose(&fiche, "not an address", vec!["dest@example.com".to_string()], None);
        assert!(build_message(&mail).is_err());
    }
}
