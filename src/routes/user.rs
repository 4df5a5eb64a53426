use actix_web::{get, post, web, HttpResponse};
use mongodb::Database;

use crate::error::{AppError, AppResult};
use crate::models::user::{User, UserLogin, UserRequest};

#[post("/users")]
pub async fn create_user(
    db: web::Data<Database>,
    payload: web::Json<UserRequest>,
) -> AppResult<HttpResponse> {
    let user = User::from_request(payload.into_inner());
    user.save(&db).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[post("/users/login")]
pub async fn login(
    db: web::Data<Database>,
    payload: web::Json<UserLogin>,
) -> AppResult<HttpResponse> {
    match User::find_by_code(&db, &payload.code).await? {
        Some(user) => Ok(HttpResponse::Ok().json(user)),
        None => Err(AppError::NotFound("Utilisateur non trouvé")),
    }
}

#[get("/users")]
pub async fn get_users(db: web::Data<Database>) -> AppResult<HttpResponse> {
    let users = User::find_many(&db).await?;
    Ok(HttpResponse::Ok().json(users))
}

#[get("/users/{user_id}")]
pub async fn get_user(
    db: web::Data<Database>,
    user_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    match User::find_by_id(&db, &user_id).await? {
        Some(user) => Ok(HttpResponse::Ok().json(user)),
        None => Err(AppError::NotFound("Utilisateur non trouvé")),
    }
}
