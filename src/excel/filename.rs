//! Deterministic artifact naming.

use chrono::{DateTime, Utc};

pub const ARTIFACT_EXTENSION: &str = ".xlsm";

/// `NC_<service>_<YYYYMMDD>_<HHMM>.xlsm`, with spaces turned into
/// underscores and path separators into hyphens.
///
/// Deterministic on purpose: re-rendering a fiche reuses the name and the
/// new artifact replaces the previous one. Two fiches sharing service,
/// date and time collide the same way; a known limitation, not handled
/// here.
pub fn artifact_name(service: &str, date: &DateTime<Utc>, heure: &str) -> String {
    let service = service.replace(' ', "_").replace(['/', '\\'], "-");
    let date = date.format("%Y%m%d");
    let heure = heure.replace(':', "");
    format!("NC_{service}_{date}_{heure}{ARTIFACT_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 8, 30, 0).unwrap()
    }

    #[test]
    fn derives_the_expected_name() {
        assert_eq!(
            artifact_name("Affinage PPC", &date(), "15:00"),
            "NC_Affinage_PPC_20260217_1500.xlsm"
        );
    }

    #[test]
    fn is_deterministic() {
        let a = artifact_name("Maintenance Fab/Aff PPC", &date(), "07:05");
        let b = artifact_name("Maintenance Fab/Aff PPC", &date(), "07:05");
        assert_eq!(a, b);
    }

    #[test]
    fn sanitizes_spaces_and_path_separators() {
        let name = artifact_name("Maintenance Fab/Aff PPC", &date(), "07:05");
        assert_eq!(name, "NC_Maintenance_Fab-Aff_PPC_20260217_0705.xlsm");

        let name = artifact_name(r"a\b c", &date(), "23:59");
        assert_eq!(name, "NC_a-b_c_20260217_2359.xlsm");
    }
}
