//! Stored configuration documents: reference lists for the form dropdowns
//! and the SMTP/notification settings.

use std::collections::HashMap;

use mongodb::{
    bson::doc,
    options::ReplaceOptions,
    Collection, Database,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

fn string_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// Reference lists backing the mobile form. A single document in the
/// `config` collection; absent document means the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigData {
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub non_conformites: Vec<String>,
    #[serde(default)]
    pub defauts: Vec<String>,
    #[serde(default)]
    pub ccp_prpo: Vec<String>,
    #[serde(default)]
    pub categories_corps_etranger: Vec<String>,
    #[serde(default)]
    pub types_risque: Vec<String>,
    #[serde(default)]
    pub regles_or: Vec<String>,
    #[serde(default)]
    pub types_env: Vec<String>,
    #[serde(default)]
    pub lieux: Vec<String>,
    #[serde(default)]
    pub postes: Vec<String>,
    #[serde(default)]
    pub types_action: Vec<String>,
    #[serde(default)]
    pub statuts_action: Vec<String>,
}

impl ConfigData {
    fn collection(db: &Database) -> Collection<ConfigData> {
        db.collection::<ConfigData>("config")
    }

    pub fn defaults() -> ConfigData {
        ConfigData {
            services: string_list(&[
                "REPC",
                "Fabrication PPC",
                "Affinage PPC",
                "Conditionnement PPC",
                "Expéditions PPC",
                "Fabrication PPNC",
                "Affinage PPNC",
                "Conditionnement PPNC",
                "Expéditions PPNC",
                "Maintenance générale",
                "Maintenance Fab/Aff PPC",
                "Maintenance Condi PPC",
                "Maintenance Fab PPNC",
                "Maintenance Condi PPNC",
                "Maintenance REPC",
                "Magasin",
                "Laboratoire",
                "Collecte",
                "Administratif",
                "Garage",
                "Rétrocession",
                "Froid ferme",
                "Qualité",
                "Environnement",
                "Sécurité",
                "Autre",
            ]),
            non_conformites: string_list(&[
                "Situation",
                "Matière première / Ingrédient",
                "Coproduit",
                "Produit en cours",
                "Produit Fini",
                "Emballage",
                "Echantillon",
            ]),
            defauts: string_list(&[
                "Qualité - Autre",
                "Moisissures",
                "Goût - texture - odeur",
                "Aspect",
                "Corps étranger",
                "Microbiologie",
                "Physico-chimie",
                "Emballage - marquage",
                "Poids",
                "Nuisibles",
            ]),
            ccp_prpo: string_list(&[
                "CCP - Antibiotiques",
                "CCP - Pasteurisation",
                "PRPo - Préparation milieu ferment",
                "CCP - DPM",
                "PRPo - Etanchéité",
                "PRPo - Composition gazeuse",
            ]),
            categories_corps_etranger: string_list(&[
                "Plastique dur",
                "Plastique divers",
                "Papier/Carton",
                "Verre",
                "Graisse",
                "Métal",
                "Encre/marquage",
                "Nuisible",
                "Fromage",
                "Bois",
                "Cheveu",
                "Autre",
            ]),
            types_risque: string_list(&[
                "Agents chimiques dangereux",
                "Ambiances climatiques / températures extrêmes",
                "ATEX - risque explosion",
                "Bruit",
                "Brûlure thermique",
                "Chute avec dénivellation",
                "Chute de hauteur",
                "Chute de plain-pied",
                "Chute d'objet",
                "Circulation",
                "Coincement / Ecrasement",
                "Coupure",
                "Ecran",
                "Electricité",
                "Espaces confinés",
                "Gestes répétitifs",
                "Incendie",
                "Machines",
                "Manutention manuelle",
                "Manutention mécanique",
                "Outils à main",
                "Postures pénibles",
                "Risque biologique",
                "Risque routier",
                "Risques physiques",
                "Risques psychosociaux",
                "Travail de nuit",
                "Travail en équipes alternantes",
                "Vibrations mécaniques",
                "Autre",
            ]),
            regles_or: string_list(&[
                "EPI",
                "Machines",
                "Consignation",
                "Espace confiné / Travail en hauteur",
                "Produit chimique",
                "Manutention manuelle / Posture",
                "Conduite d'engins",
                "Circulation piétonne",
                "Circulation routière",
                "NON APPLICABLE",
            ]),
            types_env: string_list(&[
                "Eaux (fuite : eaux usées, eaux pluviales, eaux de ville...)",
                "Air : fuite, rejet (chaudière, TAR)",
                "Sol (déversement au sol)",
                "Déchets (tri …)",
                "Autres (réglementaire…)",
            ]),
            lieux: string_list(&[
                "cuve",
                "pressage",
                "GSV",
                "Acidification",
                "Laverie",
                "Saumure",
                "filtre/pasto saumure",
                "salle levains",
                "Sortie saumure",
                "sds",
                "cave",
                "Quai",
                "Local chargeur",
                "Autres",
                "E301",
                "TANK de Mat",
                "Chariot",
                "combles",
                "locaux sociaux",
                "Galerie",
                "Manip meules",
                "Démouleuse",
                "Frigo cdt",
                "Autre",
            ]),
            postes: string_list(&[
                "salle de soins",
                "sortie saumure",
                "conduite moulage",
                "conduite cuves",
                "cariste appro sds",
                "cariste sortie saumure",
                "cariste cave",
                "gradeur",
                "nettoyage fab",
                "expedition camion",
                "prepa camions",
                "autre",
            ]),
            types_action: string_list(&["Humaine", "Organisationnelle", "Technique"]),
            statuts_action: string_list(&["Close", "En cours", "A lancer"]),
        }
    }

    pub async fn find(db: &Database) -> AppResult<Option<ConfigData>> {
        Ok(Self::collection(db).find_one(None, None).await?)
    }

    pub async fn upsert(&self, db: &Database) -> AppResult<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        Self::collection(db)
            .replace_one(doc! {}, self, options)
            .await?;
        Ok(())
    }
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_tls() -> bool {
    true
}

/// SMTP settings plus the recipient routing table, stored as a single
/// document in the `email_config` collection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_server")]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    #[serde(default)]
    pub default_recipients: Vec<String>,
    #[serde(default)]
    pub auto_recipients_by_service: HashMap<String, Vec<String>>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        EmailConfig {
            smtp_server: default_smtp_server(),
            smtp_port: default_smtp_port(),
            smtp_user: String::new(),
            smtp_password: String::new(),
            use_tls: default_use_tls(),
            default_recipients: Vec::new(),
            auto_recipients_by_service: HashMap::new(),
        }
    }
}

pub const MASKED_PASSWORD: &str = "***";

impl EmailConfig {
    fn collection(db: &Database) -> Collection<EmailConfig> {
        db.collection::<EmailConfig>("email_config")
    }

    /// True once an SMTP account has been set up.
    pub fn is_configured(&self) -> bool {
        !self.smtp_user.is_empty()
    }

    /// Copy safe to return over the API: the password is never echoed.
    pub fn masked(&self) -> EmailConfig {
        let mut masked = self.clone();
        masked.smtp_password = if masked.smtp_password.is_empty() {
            String::new()
        } else {
            MASKED_PASSWORD.to_string()
        };
        masked
    }

    pub async fn find(db: &Database) -> AppResult<Option<EmailConfig>> {
        Ok(Self::collection(db).find_one(None, None).await?)
    }

    /// Stores the settings. An incoming masked password means "keep the
    /// one already stored".
    pub async fn upsert(mut self, db: &Database) -> AppResult<()> {
        if self.smtp_password == MASKED_PASSWORD {
            if let Some(existing) = Self::find(db).await? {
                self.smtp_password = existing.smtp_password;
            } else {
                self.smtp_password = String::new();
            }
        }

        let options = ReplaceOptions::builder().upsert(true).build();
        Self::collection(db)
            .replace_one(doc! {}, &self, options)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_dropdown() {
        let config = ConfigData::defaults();
        assert!(config.services.contains(&"Affinage PPC".to_string()));
        assert_eq!(config.types_action.len(), 3);
        assert!(!config.types_risque.is_empty());
        assert!(!config.lieux.is_empty());
        assert!(!config.postes.is_empty());
    }

    #[test]
    fn password_is_masked_only_when_set() {
        let mut config = EmailConfig::default();
        assert_eq!(config.masked().smtp_password, "");

        config.smtp_password = "secret".to_string();
        assert_eq!(config.masked().smtp_password, MASKED_PASSWORD);
    }

    #[test]
    fn unconfigured_until_user_is_set() {
        let mut config = EmailConfig::default();
        assert!(!config.is_configured());
        config.smtp_user = "qse@example.com".to_string();
        assert!(config.is_configured());
    }
}
