use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, Document},
    options::FindOptions,
    Collection, Database,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::mailer::SendOutcome;

/// Report family. Selects the worksheet and the mapping table; immutable
/// after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum FicheKind {
    #[serde(rename = "Qualité")]
    Quality,
    #[serde(rename = "Sécurité")]
    Safety,
    #[serde(rename = "Environnement")]
    Environment,
}

impl FicheKind {
    pub const ALL: [FicheKind; 3] = [
        FicheKind::Quality,
        FicheKind::Safety,
        FicheKind::Environment,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FicheKind::Quality => "Qualité",
            FicheKind::Safety => "Sécurité",
            FicheKind::Environment => "Environnement",
        }
    }
}

/// Record lifecycle. Created as Draft; only Render and Send move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FicheStatus {
    #[serde(rename = "Brouillon")]
    Draft,
    #[serde(rename = "Validé")]
    Validated,
    #[serde(rename = "Envoyé")]
    Sent,
    #[serde(rename = "Échec d'envoi")]
    SendFailed,
}

impl FicheStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FicheStatus::Draft => "Brouillon",
            FicheStatus::Validated => "Validé",
            FicheStatus::Sent => "Envoyé",
            FicheStatus::SendFailed => "Échec d'envoi",
        }
    }

    /// Status a successful Render persists.
    pub fn after_render() -> FicheStatus {
        FicheStatus::Validated
    }

    /// Status a Send attempt persists. A skipped send (no configuration,
    /// no recipients) falls back to Validated, never to a failure state.
    pub fn after_send(outcome: &SendOutcome) -> FicheStatus {
        match outcome {
            SendOutcome::Sent => FicheStatus::Sent,
            SendOutcome::Skipped(_) => FicheStatus::Validated,
            SendOutcome::Failed(_) => FicheStatus::SendFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Criticality {
    #[serde(rename = "Mineure")]
    Minor,
    #[serde(rename = "Majeure")]
    Major,
    #[serde(rename = "Critique")]
    Critical,
}

impl Criticality {
    pub fn label(&self) -> &'static str {
        match self {
            Criticality::Minor => "Mineure",
            Criticality::Major => "Majeure",
            Criticality::Critical => "Critique",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ActionStatus {
    #[default]
    #[serde(rename = "A lancer")]
    Todo,
    #[serde(rename = "En cours")]
    InProgress,
    #[serde(rename = "Close")]
    Closed,
}

impl ActionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ActionStatus::Todo => "A lancer",
            ActionStatus::InProgress => "En cours",
            ActionStatus::Closed => "Close",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionCorrective {
    pub action: String,
    pub responsable: String,
    pub delai: Option<String>,
    pub type_action: Option<String>,
    #[serde(default)]
    pub statut: ActionStatus,
}

/// Base64-encoded picture, owned by its fiche.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Photo {
    pub data: String,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
}

/// Event timestamps arrive from the mobile client with or without an
/// offset; naive values are taken as UTC.
mod event_date {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(date) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(date.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Declarative payload of a fiche: everything the reporter fills in.
/// Flattened into [`Fiche`] so creation and update share one shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FicheRequest {
    #[serde(rename = "type")]
    pub kind: FicheKind,

    #[serde(with = "event_date")]
    pub date_evenement: DateTime<Utc>,
    pub heure_evenement: String,
    pub constate_par: String,
    pub service_emetteur: String,
    pub service_concerne: Option<String>,

    // Qualité
    pub non_conformite_constatee: Option<String>,
    pub defaut: Option<String>,
    pub ccp_prpo: Option<String>,
    pub categorie_corps_etranger: Option<String>,
    pub quantite_concernee: Option<String>,

    // Traçabilité produit
    pub produit: Option<String>,
    pub grammage: Option<String>,
    pub marque: Option<String>,
    pub ligne: Option<String>,
    pub ddm: Option<String>,
    pub quantieme: Option<String>,
    pub heure_production: Option<String>,

    // Traçabilité autre
    pub numero_lot: Option<String>,
    pub numero_palette: Option<String>,
    pub code_sca: Option<String>,
    pub reference_interne: Option<String>,
    pub date_production: Option<String>,
    pub numero_bobine: Option<String>,
    pub autres_tracabilite: Option<String>,

    pub description: String,
    pub criticite: Criticality,
    pub impact_securite_aliments: Option<String>,

    // Traitement (Qualité)
    #[serde(default)]
    pub traitement_blocage: bool,
    #[serde(default)]
    pub traitement_methanisation: bool,
    #[serde(default)]
    pub traitement_fonte: bool,
    #[serde(default)]
    pub traitement_analyses: bool,
    #[serde(default)]
    pub traitement_alimentation_animale: bool,
    pub traitement_autres: Option<String>,
    pub date_traitement: Option<String>,
    pub nom_traitement: Option<String>,

    // Sécurité
    pub type_incident: Option<String>,
    pub type_risque: Option<String>,
    pub regle_or: Option<String>,

    // Environnement
    pub type_env: Option<String>,
    pub traitement_env: Option<Vec<String>>,

    // Causes (5M)
    pub cause_main_oeuvre: Option<String>,
    pub cause_materiel: Option<String>,
    pub cause_methode: Option<String>,
    pub cause_milieu: Option<String>,
    pub cause_matiere: Option<String>,

    #[serde(default)]
    pub actions_correctives: Vec<ActionCorrective>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    pub signature: Option<String>,

    pub created_by: String,
}

impl FicheRequest {
    pub fn validate(&self) -> AppResult<()> {
        let heure_regex = Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap();

        if self.service_emetteur.trim().is_empty() {
            return Err(AppError::Validation(
                "service_emetteur est obligatoire".to_string(),
            ));
        }
        if self.constate_par.trim().is_empty() {
            return Err(AppError::Validation(
                "constate_par est obligatoire".to_string(),
            ));
        }
        if !heure_regex.is_match(&self.heure_evenement) {
            return Err(AppError::Validation(format!(
                "heure_evenement invalide: {}",
                self.heure_evenement
            )));
        }
        Ok(())
    }
}

/// One incident record ("fiche"). `id`, `type` and `created_at` never
/// change after creation; `statut` moves only through Render and Send.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Fiche {
    pub id: String,
    #[serde(flatten)]
    pub form: FicheRequest,
    pub statut: FicheStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub excel_filename: Option<String>,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

/// List filter; unset fields do not constrain.
#[derive(Debug, Default, Deserialize)]
pub struct FicheQuery {
    pub statut: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub service: Option<String>,
}

impl Fiche {
    fn collection(db: &Database) -> Collection<Fiche> {
        db.collection::<Fiche>("fiches")
    }

    pub fn from_request(form: FicheRequest) -> Fiche {
        let now = Utc::now();
        Fiche {
            id: ObjectId::new().to_hex(),
            form,
            statut: FicheStatus::Draft,
            created_at: now,
            updated_at: now,
            excel_filename: None,
            sync_status: SyncStatus::default(),
        }
    }

    pub async fn save(&self, db: &Database) -> AppResult<String> {
        Self::collection(db).insert_one(self, None).await?;
        Ok(self.id.clone())
    }

    pub async fn find_by_id(db: &Database, id: &str) -> AppResult<Option<Fiche>> {
        Ok(Self::collection(db).find_one(doc! { "id": id }, None).await?)
    }

    pub async fn find_many(db: &Database, query: &FicheQuery) -> AppResult<Vec<Fiche>> {
        let mut filter = Document::new();
        if let Some(statut) = &query.statut {
            filter.insert("statut", statut);
        }
        if let Some(kind) = &query.kind {
            filter.insert("type", kind);
        }
        if let Some(service) = &query.service {
            filter.insert("service_emetteur", service);
        }

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(1000)
            .build();

        let mut cursor = Self::collection(db).find(filter, options).await?;
        let mut fiches: Vec<Fiche> = Vec::new();
        while let Some(Ok(fiche)) = cursor.next().await {
            fiches.push(fiche);
        }
        Ok(fiches)
    }

    /// Replaces the declarative fields, keeping id, creation metadata,
    /// status and artifact name untouched.
    pub async fn update_form(
        db: &Database,
        id: &str,
        form: FicheRequest,
    ) -> AppResult<Option<Fiche>> {
        if Self::find_by_id(db, id).await?.is_none() {
            return Ok(None);
        }

        let mut fields = to_bson(&form)
            .map_err(|err| AppError::Database(err.to_string()))?
            .as_document()
            .cloned()
            .ok_or_else(|| AppError::Database("fiche serialization failed".to_string()))?;
        fields.insert(
            "updated_at",
            to_bson(&Utc::now()).map_err(|err| AppError::Database(err.to_string()))?,
        );

        Self::collection(db)
            .update_one(doc! { "id": id }, doc! { "$set": fields }, None)
            .await?;

        Self::find_by_id(db, id).await
    }

    pub async fn delete_by_id(db: &Database, id: &str) -> AppResult<u64> {
        let result = Self::collection(db)
            .delete_one(doc! { "id": id }, None)
            .await?;
        Ok(result.deleted_count)
    }

    /// Persists a successful render: artifact name + Validated status.
    pub async fn mark_validated(db: &Database, id: &str, filename: &str) -> AppResult<()> {
        let update = doc! {
            "$set": {
                "statut": FicheStatus::after_render().label(),
                "excel_filename": filename,
                "updated_at": to_bson(&Utc::now()).map_err(|err| AppError::Database(err.to_string()))?,
            }
        };
        Self::collection(db)
            .update_one(doc! { "id": id }, update, None)
            .await?;
        Ok(())
    }

    pub async fn set_status(db: &Database, id: &str, statut: FicheStatus) -> AppResult<()> {
        let update = doc! {
            "$set": {
                "statut": statut.label(),
                "updated_at": to_bson(&Utc::now()).map_err(|err| AppError::Database(err.to_string()))?,
            }
        };
        Self::collection(db)
            .update_one(doc! { "id": id }, update, None)
            .await?;
        Ok(())
    }

    pub async fn count(db: &Database, filter: Document) -> AppResult<u64> {
        Ok(Self::collection(db).count_documents(filter, None).await?)
    }
}
