//! Reconciliation of fiches created offline.

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use crate::error::AppResult;
use crate::models::fiche::{Fiche, FicheRequest};

/// Per-item outcome, in input order. Serializes to the wire shapes
/// `{"id", "status": "synced"}` and `{"status": "failed", "error"}`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SyncItemResult {
    Synced { id: String, status: String },
    Failed { status: String, error: String },
}

impl SyncItemResult {
    fn synced(id: String) -> SyncItemResult {
        SyncItemResult::Synced {
            id,
            status: "synced".to_string(),
        }
    }

    fn failed(error: String) -> SyncItemResult {
        SyncItemResult::Failed {
            status: "failed".to_string(),
            error,
        }
    }
}

/// Validates one raw payload into a ready-to-insert fiche.
fn prepare(item: Value) -> AppResult<Fiche> {
    let form: FicheRequest = serde_json::from_value(item)?;
    form.validate()?;
    Ok(Fiche::from_request(form))
}

/// Applies each incoming payload independently: one item failing to
/// validate or insert never blocks or rolls back the others. No
/// de-duplication is attempted: resubmitting the same record creates a
/// second one.
pub async fn reconcile<F, Fut>(items: Vec<Value>, mut insert: F) -> Vec<SyncItemResult>
where
    F: FnMut(Fiche) -> Fut,
    Fut: Future<Output = AppResult<String>>,
{
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let outcome = match prepare(item) {
            Ok(fiche) => insert(fiche).await,
            Err(err) => Err(err),
        };
        results.push(match outcome {
            Ok(id) => SyncItemResult::synced(id),
            Err(err) => SyncItemResult::failed(err.to_string()),
        });
    }
    results
}
