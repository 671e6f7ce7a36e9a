//! Registered enumerations exposed by `GET /enums/` and used to validate
//! source/label filters.

use crate::database::models::DeforestationType;
use crate::filter::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumDef {
    pub name: &'static str,
    pub values: &'static [&'static str],
}

impl EnumDef {
    /// Split a comma separated parameter and reject values outside the set.
    pub fn validate(&self, field: &str, raw: &str) -> Result<Vec<String>, FilterError> {
        let values: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();

        let invalid: Vec<&str> = values
            .iter()
            .map(String::as_str)
            .filter(|v| !self.values.contains(v))
            .collect();

        if !invalid.is_empty() {
            return Err(FilterError::InvalidOption {
                field: field.to_string(),
                values: invalid.join(", "),
                allowed: self.values.join(", "),
            });
        }
        Ok(values)
    }
}

const DEFORESTATION_TYPE: [&str; 4] = [
    DeforestationType::Annual.as_str(),
    DeforestationType::Cumulative.as_str(),
    DeforestationType::Warning.as_str(),
    DeforestationType::Quarter.as_str(),
];

pub const SOURCE: EnumDef = EnumDef {
    name: "Source",
    values: &["SIT_CODE", "SAGARI", "ICA"],
};

pub const LABEL: EnumDef = EnumDef {
    name: "Label",
    values: &["PRODUCTIONUNIT_ID", "NIT", "SIT_CODE", "ICA"],
};

pub const REGISTRY: &[EnumDef] = &[
    EnumDef {
        name: "DeforestationType",
        values: &DEFORESTATION_TYPE,
    },
    EnumDef {
        name: "DeforestationSource",
        values: &["SMBYC", "GFW", "IDEAM"],
    },
    EnumDef {
        name: "FarmSource",
        values: &["SAGARI", "SIPSA", "ICA"],
    },
    LABEL,
    SOURCE,
    EnumDef {
        name: "Species",
        values: &["BOVINOS", "BUFALOS", "PORCINOS", "OVINOS", "CAPRINOS", "EQUINOS"],
    },
    EnumDef {
        name: "TypeEnterprise",
        values: &["SLAUGHTERHOUSE", "COLLECTION_CENTER", "CATTLE_FAIR", "ENTERPRISE"],
    },
    EnumDef {
        name: "TypeMovement",
        values: &["FARM", "ENTERPRISE"],
    },
    EnumDef {
        name: "Actions",
        values: &["API_FARMS", "API_ENTERPRISES", "API_FARMRISK", "API_VERIFY", "API_ADMIN"],
    },
    EnumDef {
        name: "Options",
        values: &["ADM1", "ADM2", "ADM3", "FARM", "ENTERPRISE"],
    },
];

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Case- and separator-insensitive lookup: `deforestation_type`,
/// `DeforestationType` and `deforestationtype` all resolve.
pub fn lookup(name: &str) -> Option<&'static EnumDef> {
    let wanted = normalize(name);
    if wanted.is_empty() {
        return None;
    }
    REGISTRY.iter().find(|def| normalize(def.name) == wanted)
}
