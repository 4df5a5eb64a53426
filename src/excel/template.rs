//! The spreadsheet template, loaded once per process.
//!
//! The `.xlsm` carries layout, formulas and macros that this engine never
//! reproduces, so the registry keeps the pristine archive bytes and only
//! learns where each report family's worksheet lives and which of its
//! regions are merged.

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use zip::ZipArchive;

use super::cell::{MergeMap, MergedRange};
use super::patch::{attr_value, read_entry};
use crate::error::{AppError, AppResult};
use crate::models::fiche::FicheKind;

/// One target worksheet: its archive path and its merged regions.
#[derive(Debug, Clone)]
pub struct SheetEntry {
    pub path: String,
    pub merges: MergeMap,
}

#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    bytes: Vec<u8>,
    sheets: HashMap<FicheKind, SheetEntry>,
}

impl TemplateRegistry {
    pub fn sheet_name(kind: FicheKind) -> &'static str {
        match kind {
            FicheKind::Quality => "ENS Qualité",
            FicheKind::Safety => "ENS Sécurité",
            FicheKind::Environment => "ENS Environnement Energie",
        }
    }

    pub fn load(path: &Path) -> AppResult<TemplateRegistry> {
        let bytes = fs::read(path)
            .map_err(|_| AppError::TemplateMissing(path.display().to_string()))?;

        let mut zip = ZipArchive::new(Cursor::new(bytes.as_slice()))
            .map_err(|err| AppError::Render(format!("template archive: {err}")))?;

        let workbook_xml =
            read_entry(&mut zip, "xl/workbook.xml").map_err(AppError::Render)?;
        let rels_xml =
            read_entry(&mut zip, "xl/_rels/workbook.xml.rels").map_err(AppError::Render)?;

        let rids = parse_sheet_rids(&workbook_xml).map_err(AppError::Render)?;
        let targets = parse_relationship_targets(&rels_xml).map_err(AppError::Render)?;

        let mut sheets = HashMap::new();
        for kind in FicheKind::ALL {
            let name = Self::sheet_name(kind);
            let rid = rids
                .get(name)
                .ok_or_else(|| AppError::Render(format!("worksheet '{name}' absent")))?;
            let target = targets
                .get(rid)
                .ok_or_else(|| AppError::Render(format!("no target for worksheet '{name}'")))?;
            let sheet_path = resolve_target(target);

            let sheet_xml = read_entry(&mut zip, &sheet_path).map_err(AppError::Render)?;
            let merges = MergeMap::from_ranges(&parse_merge_ranges(&sheet_xml));

            sheets.insert(
                kind,
                SheetEntry {
                    path: sheet_path,
                    merges,
                },
            );
        }
        drop(zip);

        Ok(TemplateRegistry { bytes, sheets })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// All three entries are checked at load, so the lookup is total.
    pub fn sheet_for(&self, kind: FicheKind) -> &SheetEntry {
        &self.sheets[&kind]
    }
}

/// Registry plus its configured location. Loading is attempted once at
/// startup; a missing file keeps the server up and makes every render
/// fail with `TemplateMissing`.
#[derive(Debug)]
pub struct TemplateState {
    path: PathBuf,
    registry: Option<TemplateRegistry>,
}

impl TemplateState {
    pub fn new(path: PathBuf, registry: Option<TemplateRegistry>) -> TemplateState {
        TemplateState { path, registry }
    }

    pub fn get(&self) -> AppResult<&TemplateRegistry> {
        self.registry
            .as_ref()
            .ok_or_else(|| AppError::TemplateMissing(self.path.display().to_string()))
    }
}

/// Relationship targets are workbook-relative; absolute targets keep
/// their own root.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }
}

/// Sheet name → relationship id, from `xl/workbook.xml`.
fn parse_sheet_rids(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();
    let mut rids = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"sheet" {
                    if let (Some(name), Some(rid)) =
                        (attr_value(&e, b"name"), attr_value(&e, b"r:id"))
                    {
                        rids.insert(name, rid);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(format!("workbook.xml parse error: {err}")),
            _ => {}
        }
        buf.clear();
    }
    Ok(rids)
}

/// Relationship id → target path, from the workbook rels part.
fn parse_relationship_targets(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"Relationship" {
                    if let (Some(id), Some(target)) =
                        (attr_value(&e, b"Id"), attr_value(&e, b"Target"))
                    {
                        targets.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(format!("workbook rels parse error: {err}")),
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

fn parse_merge_ranges(xml: &str) -> Vec<MergedRange> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();
    let mut ranges = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"mergeCell" {
                    if let Some(range) = attr_value(&e, b"ref").and_then(|r| MergedRange::parse(&r))
                    {
                        ranges.push(range);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::cell::CellRef;

    #[test]
    fn workbook_sheets_map_to_relationship_ids() {
        let xml = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
            <sheets>
                <sheet name="ENS Qualité" sheetId="1" r:id="rId1"/>
                <sheet name="ENS Sécurité" sheetId="2" r:id="rId2"/>
            </sheets>
        </workbook>"#;
        let rids = parse_sheet_rids(xml).unwrap();
        assert_eq!(rids.get("ENS Qualité").unwrap(), "rId1");
        assert_eq!(rids.get("ENS Sécurité").unwrap(), "rId2");
    }

    #[test]
    fn relationship_targets_resolve_under_xl() {
        let xml = r#"<Relationships>
            <Relationship Id="rId1" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId9" Target="/xl/worksheets/sheet9.xml"/>
        </Relationships>"#;
        let targets = parse_relationship_targets(xml).unwrap();
        assert_eq!(
            resolve_target(targets.get("rId1").unwrap()),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target(targets.get("rId9").unwrap()),
            "xl/worksheets/sheet9.xml"
        );
    }

    #[test]
    fn merge_ranges_become_an_anchor_lookup() {
        let xml = r#"<worksheet><sheetData/>
            <mergeCells count="2">
                <mergeCell ref="E6:F6"/>
                <mergeCell ref="D22:N27"/>
            </mergeCells>
        </worksheet>"#;
        let merges = MergeMap::from_ranges(&parse_merge_ranges(xml));
        assert_eq!(
            merges.resolve(CellRef::parse("F6").unwrap()),
            CellRef::parse("E6").unwrap()
        );
        assert_eq!(
            merges.resolve(CellRef::parse("G25").unwrap()),
            CellRef::parse("D22").unwrap()
        );
    }

    #[test]
    fn missing_file_is_template_missing() {
        let err = TemplateRegistry::load(Path::new("./does-not-exist.xlsm")).unwrap_err();
        assert!(matches!(err, AppError::TemplateMissing(_)));
    }

    #[test]
    fn state_without_registry_reports_template_missing() {
        let state = TemplateState::new(PathBuf::from("./absent.xlsm"), None);
        assert!(matches!(state.get(), Err(AppError::TemplateMissing(_))));
    }
}
