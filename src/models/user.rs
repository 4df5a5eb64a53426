use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection, Database,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// Field worker identified by an employee code. Login is a plain code
/// lookup; the service carries no passwords or tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub code: String,
    pub name: String,
    pub first_name: String,
    pub service: String,
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UserRequest {
    pub code: String,
    pub name: String,
    pub first_name: String,
    pub service: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserLogin {
    pub code: String,
}

impl User {
    fn collection(db: &Database) -> Collection<User> {
        db.collection::<User>("users")
    }

    pub fn from_request(payload: UserRequest) -> User {
        User {
            id: ObjectId::new().to_hex(),
            code: payload.code,
            name: payload.name,
            first_name: payload.first_name,
            service: payload.service,
            is_admin: payload.is_admin,
            created_at: Utc::now(),
        }
    }

    pub async fn save(&self, db: &Database) -> AppResult<String> {
        Self::collection(db).insert_one(self, None).await?;
        Ok(self.id.clone())
    }

    pub async fn find_by_id(db: &Database, id: &str) -> AppResult<Option<User>> {
        Ok(Self::collection(db).find_one(doc! { "id": id }, None).await?)
    }

    pub async fn find_by_code(db: &Database, code: &str) -> AppResult<Option<User>> {
        Ok(Self::collection(db)
            .find_one(doc! { "code": code }, None)
            .await?)
    }

    pub async fn find_many(db: &Database) -> AppResult<Vec<User>> {
        let mut cursor = Self::collection(db).find(None, None).await?;
        let mut users: Vec<User> = Vec::new();
        while let Some(Ok(user)) = cursor.next().await {
            users.push(user);
        }
        Ok(users)
    }
}
