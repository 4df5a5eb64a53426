//! Positional mapping of a fiche onto its worksheet.
//!
//! One routine per report family, each an ordered table of writes against
//! the template's fixed coordinates. Absent values produce no write at
//! all (cells are never cleared), markers are an "X" in a fixed cell, and
//! corrective actions fill `base row + index` up to the per-family cap;
//! anything past the cap is dropped on purpose.

use super::cell::CellRef;
use crate::models::fiche::{Criticality, Fiche, FicheKind};

/// Rendered corrective-action rows per family.
pub const QUALITY_ACTION_ROWS: usize = 5;
pub const SAFETY_ACTION_ROWS: usize = 3;

const MARKER: &str = "X";

struct Writes(Vec<(CellRef, String)>);

impl Writes {
    fn set(&mut self, coordinate: &str, value: impl Into<String>) {
        let cell = CellRef::parse(coordinate).expect("invalid mapping coordinate");
        self.0.push((cell, value.into()));
    }

    fn set_opt(&mut self, coordinate: &str, value: &Option<String>) {
        if let Some(value) = value {
            self.set(coordinate, value.clone());
        }
    }

    fn mark_if(&mut self, coordinate: &str, present: bool) {
        if present {
            self.set(coordinate, MARKER);
        }
    }

    fn set_row(&mut self, column: char, row: u32, value: impl Into<String>) {
        self.set(&format!("{column}{row}"), value);
    }
}

/// Ordered write list for a fiche, against its family's worksheet.
pub fn sheet_writes(fiche: &Fiche) -> Vec<(CellRef, String)> {
    let mut writes = Writes(Vec::new());
    let date = fiche.form.date_evenement.format("%d/%m/%Y").to_string();

    match fiche.form.kind {
        FicheKind::Quality => quality_writes(&mut writes, fiche, &date),
        FicheKind::Safety => safety_writes(&mut writes, fiche, &date),
        FicheKind::Environment => environment_writes(&mut writes, fiche, &date),
    }

    writes.0
}

fn quality_writes(w: &mut Writes, fiche: &Fiche, date: &str) {
    let form = &fiche.form;

    w.set("E6", date);
    w.set("G6", form.heure_evenement.clone());
    w.set("L6", form.constate_par.clone());
    w.set("E7", form.service_emetteur.clone());
    w.set_opt("M7", &form.service_concerne);

    // Identification
    w.set_opt("G9", &form.non_conformite_constatee);
    w.set_opt("G10", &form.defaut);
    w.set_opt("G11", &form.ccp_prpo);
    w.set_opt("G12", &form.categorie_corps_etranger);
    w.set_opt("G13", &form.quantite_concernee);

    // Traçabilité
    w.set_opt("G14", &form.produit);
    w.set_opt("L14", &form.numero_lot);
    w.set_opt("G15", &form.grammage);
    w.set_opt("L15", &form.numero_palette);
    w.set_opt("G16", &form.marque);
    w.set_opt("L16", &form.code_sca);
    w.set_opt("G17", &form.ligne);
    w.set_opt("L17", &form.reference_interne);
    w.set_opt("G18", &form.ddm);
    w.set_opt("L18", &form.date_production);
    w.set_opt("G19", &form.quantieme);
    w.set_opt("L19", &form.numero_bobine);
    w.set_opt("G20", &form.heure_production);
    w.set_opt("L20", &form.autres_tracabilite);

    w.set("D22", form.description.clone());

    match form.criticite {
        Criticality::Minor => w.set("H30", MARKER),
        Criticality::Major => w.set("L30", MARKER),
        Criticality::Critical => w.set("N30", MARKER),
    }
    w.set_opt("N31", &form.impact_securite_aliments);

    // Traitement
    w.mark_if("E35", form.traitement_blocage);
    w.mark_if("J35", form.traitement_methanisation);
    w.mark_if("E37", form.traitement_fonte);
    w.mark_if("J37", form.traitement_analyses);
    w.mark_if("E39", form.traitement_alimentation_animale);
    w.set_opt("J39", &form.traitement_autres);
    w.set_opt("E41", &form.date_traitement);
    w.set_opt("L41", &form.nom_traitement);

    // Causes (5M)
    w.set_opt("G43", &form.cause_main_oeuvre);
    w.set_opt("G44", &form.cause_materiel);
    w.set_opt("G45", &form.cause_methode);
    w.set_opt("G46", &form.cause_milieu);
    w.set_opt("G47", &form.cause_matiere);

    for (i, action) in form
        .actions_correctives
        .iter()
        .take(QUALITY_ACTION_ROWS)
        .enumerate()
    {
        let row = 51 + i as u32;
        w.set_row('E', row, action.action.clone());
        w.set_row('J', row, action.responsable.clone());
        if let Some(delai) = &action.delai {
            w.set_row('L', row, delai.clone());
        }
        w.set_row('N', row, action.statut.label());
    }
}

fn safety_writes(w: &mut Writes, fiche: &Fiche, date: &str) {
    let form = &fiche.form;

    w.set("E6", date);
    w.set("L6", form.constate_par.clone());
    w.set("E7", form.service_emetteur.clone());

    if let Some(kind) = &form.type_incident {
        let coordinate = match kind.as_str() {
            "Presqu'accident" => Some("E9"),
            "Risques psychosociaux" => Some("N9"),
            "Situation dangereuse" => Some("E12"),
            "Acte dangereux" => Some("E14"),
            "Impact environnemental" => Some("N15"),
            _ => None,
        };
        if let Some(coordinate) = coordinate {
            w.set(coordinate, MARKER);
        }
    }

    w.set("D17", form.description.clone());
    w.set_opt("G24", &form.regle_or);

    w.set(
        "D26",
        format!(
            "Main d'œuvre: {}\nMatériel: {}\nMéthode: {}\nMilieu: {}",
            form.cause_main_oeuvre.as_deref().unwrap_or(""),
            form.cause_materiel.as_deref().unwrap_or(""),
            form.cause_methode.as_deref().unwrap_or(""),
            form.cause_milieu.as_deref().unwrap_or(""),
        ),
    );

    for (i, action) in form
        .actions_correctives
        .iter()
        .take(SAFETY_ACTION_ROWS)
        .enumerate()
    {
        let row = 31 + i as u32;
        w.set_row('E', row, action.action.clone());
        w.set_row('J', row, action.responsable.clone());
        if let Some(delai) = &action.delai {
            w.set_row('L', row, delai.clone());
        }
    }

    // Rédaction
    w.set("E35", date);
    w.set("L35", form.constate_par.clone());
}

fn environment_writes(w: &mut Writes, fiche: &Fiche, date: &str) {
    let form = &fiche.form;

    w.set("E6", date);
    w.set("L6", form.constate_par.clone());
    w.set("E7", form.service_emetteur.clone());

    if let Some(category) = &form.type_env {
        w.mark_if("E10", category.contains("Eaux"));
        w.mark_if("E13", category.contains("Air"));
        w.mark_if("E15", category.contains("Sol"));
        w.mark_if("N10", category.contains("Déchets"));
    }

    w.set("D18", form.description.clone());

    match form.criticite {
        Criticality::Minor => w.set("H26", MARKER),
        Criticality::Major => w.set("L26", MARKER),
        Criticality::Critical => w.set("N26", MARKER),
    }

    // Causes (5M)
    w.set_opt("G35", &form.cause_main_oeuvre);
    w.set_opt("G36", &form.cause_materiel);
    w.set_opt("G37", &form.cause_methode);
    w.set_opt("G38", &form.cause_milieu);
    w.set_opt("G39", &form.cause_matiere);

    // Rédaction
    w.set("E46", date);
    w.set("L46", form.constate_par.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fiche::FicheRequest;
    use serde_json::json;
    use std::collections::HashMap;

    fn fiche_from(value: serde_json::Value) -> Fiche {
        let form: FicheRequest = serde_json::from_value(value).unwrap();
        Fiche::from_request(form)
    }

    fn writes_map(fiche: &Fiche) -> HashMap<String, String> {
        sheet_writes(fiche)
            .into_iter()
            .map(|(cell, value)| (cell.to_a1(), value))
            .collect()
    }

    fn quality_payload() -> serde_json::Value {
        json!({
            "type": "Qualité",
            "date_evenement": "2026-02-17T08:30:00Z",
            "heure_evenement": "15:00",
            "constate_par": "J. Martin",
            "service_emetteur": "Affinage PPC",
            "description": "Corps étranger détecté",
            "criticite": "Majeure",
            "created_by": "u-001"
        })
    }

    #[test]
    fn quality_header_and_criticality_marker() {
        let fiche = fiche_from(quality_payload());
        let writes = writes_map(&fiche);

        assert_eq!(writes.get("E6").unwrap(), "17/02/2026");
        assert_eq!(writes.get("G6").unwrap(), "15:00");
        assert_eq!(writes.get("E7").unwrap(), "Affinage PPC");
        assert_eq!(writes.get("D22").unwrap(), "Corps étranger détecté");

        // Exactly one criticality cell is marked.
        assert_eq!(writes.get("L30").unwrap(), "X");
        assert!(!writes.contains_key("H30"));
        assert!(!writes.contains_key("N30"));
    }

    #[test]
    fn absent_fields_produce_no_write() {
        let fiche = fiche_from(quality_payload());
        let writes = writes_map(&fiche);

        assert!(!writes.contains_key("M7"));
        assert!(!writes.contains_key("G9"));
        assert!(!writes.contains_key("E35"));
        assert!(!writes.contains_key("N31"));
    }

    #[test]
    fn treatment_markers_only_when_true() {
        let mut payload = quality_payload();
        payload["traitement_blocage"] = json!(true);
        payload["traitement_analyses"] = json!(true);
        let fiche = fiche_from(payload);
        let writes = writes_map(&fiche);

        assert_eq!(writes.get("E35").unwrap(), "X");
        assert_eq!(writes.get("J37").unwrap(), "X");
        assert!(!writes.contains_key("J35"));
        assert!(!writes.contains_key("E39"));
    }

    #[test]
    fn quality_actions_are_capped_at_five_rows() {
        let mut payload = quality_payload();
        let actions: Vec<_> = (1..=7)
            .map(|i| {
                json!({
                    "action": format!("Action {i}"),
                    "responsable": format!("R{i}"),
                    "delai": "2026-03-01",
                    "statut": "En cours"
                })
            })
            .collect();
        payload["actions_correctives"] = json!(actions);
        let fiche = fiche_from(payload);
        let writes = writes_map(&fiche);

        for (i, row) in (51..=55).enumerate() {
            assert_eq!(writes.get(&format!("E{row}")).unwrap(), &format!("Action {}", i + 1));
            assert_eq!(writes.get(&format!("N{row}")).unwrap(), "En cours");
        }
        // Entries 6 and 7 are silently discarded.
        assert!(!writes.contains_key("E56"));
        assert!(!writes.contains_key("E57"));
    }

    #[test]
    fn safety_incident_kind_selects_one_marker() {
        let payload = json!({
            "type": "Sécurité",
            "date_evenement": "2026-02-17T08:30:00Z",
            "heure_evenement": "09:15",
            "constate_par": "L. Petit",
            "service_emetteur": "Magasin",
            "description": "Sol glissant près du quai",
            "criticite": "Mineure",
            "type_incident": "Situation dangereuse",
            "cause_milieu": "Sol mouillé",
            "actions_correctives": [
                {"action": "Baliser la zone", "responsable": "A"},
                {"action": "Nettoyer", "responsable": "B"},
                {"action": "Former", "responsable": "C"},
                {"action": "Auditer", "responsable": "D"}
            ],
            "created_by": "u-002"
        });
        let fiche = fiche_from(payload);
        let writes = writes_map(&fiche);

        assert_eq!(writes.get("E12").unwrap(), "X");
        for other in ["E9", "N9", "E14", "N15"] {
            assert!(!writes.contains_key(other), "{other} should stay blank");
        }

        // Actions land at 31 + index, capped at three rows.
        assert_eq!(writes.get("E31").unwrap(), "Baliser la zone");
        assert_eq!(writes.get("E32").unwrap(), "Nettoyer");
        assert_eq!(writes.get("E33").unwrap(), "Former");
        assert!(!writes.contains_key("E34"));

        // Combined causes block.
        assert!(writes.get("D26").unwrap().contains("Milieu: Sol mouillé"));
    }

    #[test]
    fn environment_category_marker_by_substring() {
        let payload = json!({
            "type": "Environnement",
            "date_evenement": "2026-02-17T08:30:00Z",
            "heure_evenement": "11:45",
            "constate_par": "M. Roux",
            "service_emetteur": "Laboratoire",
            "description": "Fuite d'eaux usées",
            "criticite": "Critique",
            "type_env": "Eaux (fuite : eaux usées, eaux pluviales, eaux de ville...)",
            "actions_correctives": [{"action": "Colmater", "responsable": "E"}],
            "created_by": "u-003"
        });
        let fiche = fiche_from(payload);
        let writes = writes_map(&fiche);

        assert_eq!(writes.get("E10").unwrap(), "X");
        assert!(!writes.contains_key("E13"));
        assert!(!writes.contains_key("N10"));
        assert_eq!(writes.get("N26").unwrap(), "X");

        // Environment renders no action rows.
        assert!(!writes.contains_key("E31"));
        assert!(!writes.contains_key("E51"));
    }

    #[test]
    fn only_date_and_time_of_day_are_written() {
        let fiche = fiche_from(quality_payload());
        for (_, value) in sheet_writes(&fiche) {
            assert!(!value.contains("T08:30"), "timestamp leaked: {value}");
            assert!(!value.contains("2026-02-17"), "ISO date leaked: {value}");
        }
    }
}
