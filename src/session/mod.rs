use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub mod store;

pub const NOT_AVAILABLE: &str = "N/A";
pub const FALLBACK_STATUS: &str = "Fallback";

/// Geometric statistics reported by the analysis step.
///
/// Every field is optional: degraded and historical sessions return partial
/// records, sometimes with placeholder strings where numbers are expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MeshStats {
    #[serde(default, deserialize_with = "lenient::count")]
    pub num_faces: Option<u64>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub num_vertices: Option<u64>,
    #[serde(default, deserialize_with = "lenient::triple")]
    pub bbox_dimensions: Option<[f64; 3]>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_watertight: Option<bool>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub surface_area: Option<f64>,
    #[serde(default, deserialize_with = "lenient::triple")]
    pub center_mass: Option<[f64; 3]>,
}

impl MeshStats {
    pub fn faces_label(&self) -> String {
        match self.num_faces {
            Some(faces) => format!("{} faces", group_thousands(faces)),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    pub fn vertices_label(&self) -> String {
        match self.num_vertices {
            Some(vertices) => format!("{} vertices", group_thousands(vertices)),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    pub fn volume_label(&self) -> String {
        self.volume
            .map(|volume| format!("{volume:.2} mm³"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }

    pub fn surface_area_label(&self) -> String {
        self.surface_area
            .map(|area| format!("{area:.2} mm²"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }

    pub fn bbox_label(&self) -> String {
        match self.bbox_dimensions {
            Some([x, y, z]) => format!("{x:.1} × {y:.1} × {z:.1}"),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    pub fn center_mass_label(&self) -> String {
        match self.center_mass {
            Some([x, y, z]) => format!("{x:.2}, {y:.2}, {z:.2}"),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    pub fn watertight_label(&self) -> &'static str {
        match self.is_watertight {
            Some(true) => "Manifold",
            Some(false) => "Non-Manifold",
            None => NOT_AVAILABLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "lenient::stats")]
    pub stats: MeshStats,
    #[serde(default, deserialize_with = "lenient::tally")]
    pub planar_hints_count: u32,
    #[serde(default, deserialize_with = "lenient::tally")]
    pub cylindrical_hints_count: u32,
}

/// Body of a successful upload: the issued session id next to the analysis fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub analysis: AnalysisResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum GenerationStatus {
    Nominal { label: Option<String> },
    Fallback,
}

impl Default for GenerationStatus {
    fn default() -> Self {
        Self::Nominal { label: None }
    }
}

impl From<Option<String>> for GenerationStatus {
    fn from(raw: Option<String>) -> Self {
        match raw {
            Some(tag) if tag == FALLBACK_STATUS => Self::Fallback,
            label => Self::Nominal { label },
        }
    }
}

impl From<GenerationStatus> for Option<String> {
    fn from(status: GenerationStatus) -> Self {
        match status {
            GenerationStatus::Nominal { label } => label,
            GenerationStatus::Fallback => Some(FALLBACK_STATUS.to_string()),
        }
    }
}

impl GenerationStatus {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenerationResult {
    #[serde(default, deserialize_with = "lenient::text")]
    pub download_url: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub explanation: String,
    #[serde(default, deserialize_with = "lenient::tag")]
    pub status: GenerationStatus,
}

/// Historical session as returned by the detail lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionDetail {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub analysis: AnalysisResult,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub generation: GenerationResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Processing,
    Failed,
    #[serde(other)]
    Unknown,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub file_name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub time: String,
    #[serde(default = "unknown_status", deserialize_with = "lenient::record_status")]
    pub status: RecordStatus,
    #[serde(default, deserialize_with = "lenient::tally")]
    pub planar_surfaces: u32,
    #[serde(default, deserialize_with = "lenient::tally")]
    pub cylindrical_features: u32,
    #[serde(default, deserialize_with = "lenient::tally")]
    pub edge_features: u32,
    #[serde(default, deserialize_with = "lenient::text")]
    pub file_size: String,
}

fn unknown_status() -> RecordStatus {
    RecordStatus::Unknown
}

impl HistoryRecord {
    /// Name the converted artifact is saved under.
    pub fn artifact_file_name(&self) -> String {
        let stem = self
            .file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(self.file_name.as_str());
        if stem.is_empty() {
            format!("{}.step", self.id)
        } else {
            format!("{stem}.step")
        }
    }
}

pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Deserializers that map nulls and mistyped values to "not available"
/// instead of failing the whole record.
mod lenient {
    use super::*;
    use serde::de::DeserializeOwned;

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(text) => text,
            Value::Number(number) => number.to_string(),
            _ => String::new(),
        })
    }

    pub fn tag<'de, D: Deserializer<'de>>(d: D) -> Result<GenerationStatus, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(GenerationStatus::from(value.as_str().map(str::to_string)))
    }

    pub fn record_status<'de, D: Deserializer<'de>>(d: D) -> Result<RecordStatus, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(serde_json::from_value(value).unwrap_or(RecordStatus::Unknown))
    }

    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(d)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(Value::deserialize(d)?.as_f64())
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(as_count(&Value::deserialize(d)?))
    }

    pub fn tally<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(as_count(&value)
            .and_then(|count| u32::try_from(count).ok())
            .unwrap_or(0))
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(Value::deserialize(d)?.as_bool())
    }

    pub fn triple<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[f64; 3]>, D::Error> {
        let value = Value::deserialize(d)?;
        let Some(items) = value.as_array() else {
            return Ok(None);
        };
        match items.as_slice() {
            [x, y, z] => Ok(match (x.as_f64(), y.as_f64(), z.as_f64()) {
                (Some(x), Some(y), Some(z)) => Some([x, y, z]),
                _ => None,
            }),
            _ => Ok(None),
        }
    }

    pub fn stats<'de, D: Deserializer<'de>>(d: D) -> Result<MeshStats, D::Error> {
        let value = Value::deserialize(d)?;
        if value.is_null() {
            return Ok(MeshStats::default());
        }
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    fn as_count(value: &Value) -> Option<u64> {
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|number| *number >= 0.0 && number.fract() == 0.0)
                .map(|number| number as u64)
        })
    }
}
