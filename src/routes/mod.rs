pub mod fiche;
pub mod settings;
pub mod user;

use actix_web::{get, HttpResponse};
use serde_json::json;

#[get("/")]
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "QSE Industrial App API",
        "version": "1.0.0"
    }))
}
