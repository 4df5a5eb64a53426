use mongodb::{Client, Database};

/// Opens the MongoDB connection and returns the database handle.
///
/// The handle is built once in `main` and handed to handlers through
/// `web::Data`; nothing in the crate reaches for a global connection.
pub async fn connect(uri: &str, name: &str) -> Result<Database, mongodb::error::Error> {
    let client = Client::with_uri_str(uri).await?;
    Ok(client.database(name))
}
