use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{delete, get, post, put, web, HttpResponse};
use mongodb::{bson::doc, Database};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::excel::template::TemplateState;
use crate::mailer::{MailTransport, EXCEL_MIME};
use crate::models::fiche::{Fiche, FicheKind, FicheQuery, FicheRequest, FicheStatus};
use crate::services::report::{render_fiche, send_fiche};
use crate::services::sync::reconcile;
use crate::services::FicheLocks;
use crate::storage::ArtifactStore;

#[post("/fiches")]
pub async fn create_fiche(
    db: web::Data<Database>,
    payload: web::Json<FicheRequest>,
) -> AppResult<HttpResponse> {
    let form = payload.into_inner();
    form.validate()?;

    let fiche = Fiche::from_request(form);
    fiche.save(&db).await?;
    Ok(HttpResponse::Ok().json(fiche))
}

#[get("/fiches")]
pub async fn get_fiches(
    db: web::Data<Database>,
    query: web::Query<FicheQuery>,
) -> AppResult<HttpResponse> {
    let fiches = Fiche::find_many(&db, &query).await?;
    Ok(HttpResponse::Ok().json(fiches))
}

#[get("/fiches/{fiche_id}")]
pub async fn get_fiche(
    db: web::Data<Database>,
    fiche_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    match Fiche::find_by_id(&db, &fiche_id).await? {
        Some(fiche) => Ok(HttpResponse::Ok().json(fiche)),
        None => Err(AppError::NotFound("Fiche non trouvée")),
    }
}

#[put("/fiches/{fiche_id}")]
pub async fn update_fiche(
    db: web::Data<Database>,
    fiche_id: web::Path<String>,
    payload: web::Json<FicheRequest>,
) -> AppResult<HttpResponse> {
    let form = payload.into_inner();
    form.validate()?;

    match Fiche::update_form(&db, &fiche_id, form).await? {
        Some(fiche) => Ok(HttpResponse::Ok().json(fiche)),
        None => Err(AppError::NotFound("Fiche non trouvée")),
    }
}

#[delete("/fiches/{fiche_id}")]
pub async fn delete_fiche(
    db: web::Data<Database>,
    fiche_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let deleted = Fiche::delete_by_id(&db, &fiche_id).await?;
    if deleted == 0 {
        return Err(AppError::NotFound("Fiche non trouvée"));
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Fiche supprimée" })))
}

/// Render: fills the template and moves the fiche to Validated.
#[post("/fiches/{fiche_id}/validate")]
pub async fn validate_fiche(
    db: web::Data<Database>,
    template: web::Data<TemplateState>,
    store: web::Data<ArtifactStore>,
    locks: web::Data<FicheLocks>,
    fiche_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let report = render_fiche(&db, &template, &store, &locks, &fiche_id).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[get("/fiches/{fiche_id}/download")]
pub async fn download_excel(
    db: web::Data<Database>,
    store: web::Data<ArtifactStore>,
    fiche_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let fiche = Fiche::find_by_id(&db, &fiche_id)
        .await?
        .ok_or(AppError::NotFound("Fiche non trouvée"))?;

    let filename = fiche
        .excel_filename
        .ok_or_else(|| AppError::Validation("Excel non encore généré".to_string()))?;
    let bytes = store.read(&filename)?;

    Ok(HttpResponse::Ok()
        .content_type(EXCEL_MIME)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(bytes))
}

/// Send: attempts the notification email; the response always carries the
/// resulting status, failures included.
#[post("/fiches/{fiche_id}/send-email")]
pub async fn send_fiche_email(
    db: web::Data<Database>,
    store: web::Data<ArtifactStore>,
    transport: web::Data<dyn MailTransport>,
    locks: web::Data<FicheLocks>,
    fiche_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let report = send_fiche(&db, &store, transport.as_ref(), &locks, &fiche_id).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Batch ingestion of fiches created offline; per-item outcomes, in
/// input order.
#[post("/sync")]
pub async fn sync_fiches(
    db: web::Data<Database>,
    payload: web::Json<Vec<Value>>,
) -> AppResult<HttpResponse> {
    let results = reconcile(payload.into_inner(), |fiche| {
        let db = db.clone();
        async move { fiche.save(&db).await }
    })
    .await;

    Ok(HttpResponse::Ok().json(json!({ "results": results })))
}

#[get("/stats")]
pub async fn get_stats(db: web::Data<Database>) -> AppResult<HttpResponse> {
    let total = Fiche::count(&db, doc! {}).await?;

    let mut by_status = serde_json::Map::new();
    for (key, status) in [
        ("brouillon", FicheStatus::Draft),
        ("valide", FicheStatus::Validated),
        ("envoye", FicheStatus::Sent),
        ("echec", FicheStatus::SendFailed),
    ] {
        let count = Fiche::count(&db, doc! { "statut": status.label() }).await?;
        by_status.insert(key.to_string(), json!(count));
    }

    let mut by_type = serde_json::Map::new();
    for kind in FicheKind::ALL {
        let count = Fiche::count(&db, doc! { "type": kind.label() }).await?;
        by_type.insert(kind.label().to_string(), json!(count));
    }

    Ok(HttpResponse::Ok().json(json!({
        "total": total,
        "by_status": by_status,
        "by_type": by_type
    })))
}
