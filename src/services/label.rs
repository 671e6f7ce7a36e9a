use serde::Serialize;

/// Display parts of an Adm3 label ("Department, Municipality, Vereda").
///
/// The label is denormalised upstream and never validated against the
/// Adm1/Adm2/Adm3 tree, so these parts are for display only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelParts {
    pub department: Option<String>,
    pub municipality: Option<String>,
    pub vereda: Option<String>,
}

/// Split on commas, trim, assign positionally. Parts past the third are
/// ignored; empty parts count as missing.
pub fn split_label(label: Option<&str>) -> LabelParts {
    let Some(label) = label.filter(|l| !l.trim().is_empty()) else {
        return LabelParts::default();
    };

    let mut parts = label
        .split(',')
        .map(str::trim)
        .map(|p| Some(p.to_string()).filter(|s| !s.is_empty()));

    LabelParts {
        department: parts.next().flatten(),
        municipality: parts.next().flatten(),
        vereda: parts.next().flatten(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(d: Option<&str>, m: Option<&str>, v: Option<&str>) -> LabelParts {
        LabelParts {
            department: d.map(String::from),
            municipality: m.map(String::from),
            vereda: v.map(String::from),
        }
    }

    #[test]
    fn full_label() {
        assert_eq!(
            split_label(Some("Antioquia, Medellín, La Zona")),
            parts(Some("Antioquia"), Some("Medellín"), Some("La Zona"))
        );
    }

    #[test]
    fn department_only() {
        assert_eq!(split_label(Some("Antioquia")), parts(Some("Antioquia"), None, None));
    }

    #[test]
    fn missing_or_blank() {
        assert_eq!(split_label(None), LabelParts::default());
        assert_eq!(split_label(Some("   ")), LabelParts::default());
    }

    #[test]
    fn extra_parts_ignored() {
        assert_eq!(
            split_label(Some("A,B,C,D")),
            parts(Some("A"), Some("B"), Some("C"))
        );
    }
}
