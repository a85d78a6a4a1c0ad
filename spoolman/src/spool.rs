use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Client;

/// A filament manufacturer.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Vendor {
    /// Vendor id.
    pub id: i64,

    /// Vendor name.
    pub name: String,
}

/// A filament type, shared by every spool of that filament.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Filament {
    /// Filament id.
    pub id: i64,

    /// Filament name.
    pub name: Option<String>,

    /// Material, e.g. `PLA`.
    pub material: Option<String>,

    /// Density in g/cm³.
    pub density: f64,

    /// Diameter in millimeters.
    pub diameter: f64,

    /// Colour as a hex string without the leading `#`.
    pub color_hex: Option<String>,

    /// The manufacturer.
    pub vendor: Option<Vendor>,
}

/// A physical spool of filament.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Spool {
    /// Spool id.
    pub id: i64,

    /// The filament on this spool.
    pub filament: Filament,

    /// Remaining filament weight in grams, if the initial weight is known.
    pub remaining_weight: Option<f64>,

    /// Consumed filament weight in grams.
    pub used_weight: f64,

    /// Remaining filament length in millimeters, if the initial weight is known.
    pub remaining_length: Option<f64>,

    /// Consumed filament length in millimeters.
    pub used_length: f64,

    /// Where the spool is stored.
    pub location: Option<String>,

    /// Whether the spool has been archived.
    #[serde(default)]
    pub archived: bool,

    /// User defined extra fields. Values are JSON encoded strings.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Spool {
    /// Return the decoded value of an extra field.
    pub fn extra_value(&self, field: &str) -> Option<serde_json::Value> {
        self.extra.get(field).and_then(|raw| serde_json::from_str(raw).ok())
    }
}

/// Amount of filament taken from a spool.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum SpoolUse {
    /// Length in millimeters.
    #[serde(rename = "use_length")]
    Length(f64),

    /// Weight in grams.
    #[serde(rename = "use_weight")]
    Weight(f64),
}

impl Client {
    /// List every spool known to the instance.
    pub async fn get_spools(&self) -> Result<Vec<Spool>> {
        Ok(self
            .client
            .get(self.route("spool"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Get a single spool, or `None` if there is no spool with this id.
    pub async fn get_spool(&self, id: i64) -> Result<Option<Spool>> {
        let response = self.client.get(self.route(&format!("spool/{}", id))).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(response.error_for_status()?.json().await?))
    }

    /// Take some filament from a spool, returning the updated spool.
    pub async fn use_spool(&self, id: i64, amount: SpoolUse) -> Result<Spool> {
        tracing::debug!(spool = id, amount = format!("{:?}", amount), "using spool");

        Ok(self
            .client
            .put(self.route(&format!("spool/{}/use", id)))
            .json(&amount)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Find the first spool whose extra `field` holds `value`.
    pub async fn find_by_extra(&self, field: &str, value: &str) -> Result<Option<Spool>> {
        let wanted = serde_json::Value::String(value.to_owned());

        Ok(self
            .get_spools()
            .await?
            .into_iter()
            .find(|spool| spool.extra_value(field).as_ref() == Some(&wanted)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SPOOL: &str = r#"{
        "id": 3,
        "registered": "2024-03-01T10:12:00Z",
        "first_used": "2024-03-02T08:00:00Z",
        "filament": {
            "id": 1,
            "registered": "2024-03-01T10:10:00Z",
            "name": "Basic White",
            "vendor": { "id": 1, "registered": "2024-03-01T10:00:00Z", "name": "Bambu Lab", "extra": {} },
            "material": "PLA",
            "density": 1.24,
            "diameter": 1.75,
            "weight": 1000,
            "color_hex": "FFFFFF",
            "extra": {}
        },
        "remaining_weight": 812.5,
        "used_weight": 187.5,
        "remaining_length": 272340.1,
        "used_length": 62846.3,
        "archived": false,
        "extra": { "tag": "\"6A8F2C1D9E3B4A5F8C7D6E5F4A3B2C1D\"" }
    }"#;

    #[test]
    fn test_deserialize_spool() {
        let spool: Spool = serde_json::from_str(SPOOL).unwrap();

        assert_eq!(spool.id, 3);
        assert_eq!(spool.filament.material.as_deref(), Some("PLA"));
        assert_eq!(spool.filament.vendor.as_ref().map(|v| v.name.as_str()), Some("Bambu Lab"));
        assert_eq!(spool.remaining_length, Some(272340.1));
        assert_eq!(spool.location, None);
    }

    #[test]
    fn test_extra_value_is_decoded() {
        let spool: Spool = serde_json::from_str(SPOOL).unwrap();

        assert_eq!(
            spool.extra_value("tag"),
            Some(serde_json::Value::String("6A8F2C1D9E3B4A5F8C7D6E5F4A3B2C1D".to_string()))
        );
        assert_eq!(spool.extra_value("missing"), None);
    }

    #[test]
    fn test_serialize_spool_use() {
        assert_eq!(
            serde_json::to_string(&SpoolUse::Length(12.5)).unwrap(),
            r#"{"use_length":12.5}"#
        );
        assert_eq!(serde_json::to_string(&SpoolUse::Weight(3.0)).unwrap(), r#"{"use_weight":3.0}"#);
    }
}
