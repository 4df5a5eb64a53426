//! Rendering of a fiche onto the spreadsheet template.

pub mod cell;
pub mod filename;
pub mod mapping;
pub mod patch;
pub mod template;

use std::collections::BTreeMap;

use self::cell::CellRef;
use self::template::TemplateRegistry;

use crate::error::{AppError, AppResult};
use crate::models::fiche::Fiche;

/// A filled workbook, ready for the artifact store.
#[derive(Debug)]
pub struct RenderedFiche {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Maps the fiche onto its worksheet and patches the template archive.
/// Every coordinate is pre-resolved against the sheet's merged ranges so
/// each value lands on the anchor cell that spreadsheet engines actually
/// display.
pub fn render(registry: &TemplateRegistry, fiche: &Fiche) -> AppResult<RenderedFiche> {
    let entry = registry.sheet_for(fiche.form.kind);

    let mut resolved: BTreeMap<CellRef, String> = BTreeMap::new();
    for (coordinate, value) in mapping::sheet_writes(fiche) {
        resolved.insert(entry.merges.resolve(coordinate), value);
    }

    let bytes =
        patch::patch_workbook(registry.bytes(), &entry.path, &resolved).map_err(AppError::Render)?;

    let filename = filename::artifact_name(
        &fiche.form.service_emetteur,
        &fiche.form.date_evenement,
        &fiche.form.heure_evenement,
    );

    Ok(RenderedFiche { filename, bytes })
}
