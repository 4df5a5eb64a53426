use actix_web::{get, put, web, HttpResponse};
use mongodb::Database;
use serde_json::json;

use crate::error::AppResult;
use crate::models::settings::{ConfigData, EmailConfig};

#[get("/config")]
pub async fn get_config(db: web::Data<Database>) -> AppResult<HttpResponse> {
    let config = ConfigData::find(&db)
        .await?
        .unwrap_or_else(ConfigData::defaults);
    Ok(HttpResponse::Ok().json(config))
}

#[put("/config")]
pub async fn update_config(
    db: web::Data<Database>,
    payload: web::Json<ConfigData>,
) -> AppResult<HttpResponse> {
    let config = payload.into_inner();
    config.upsert(&db).await?;
    Ok(HttpResponse::Ok().json(config))
}

#[get("/email-config")]
pub async fn get_email_config(db: web::Data<Database>) -> AppResult<HttpResponse> {
    let config = EmailConfig::find(&db).await?.unwrap_or_default();
    Ok(HttpResponse::Ok().json(config.masked()))
}

#[put("/email-config")]
pub async fn update_email_config(
    db: web::Data<Database>,
    payload: web::Json<EmailConfig>,
) -> AppResult<HttpResponse> {
    payload.into_inner().upsert(&db).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Configuration email mise à jour" })))
}
