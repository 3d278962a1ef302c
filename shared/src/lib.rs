use derive_more::{Display, Into};
use serde::{Deserialize, Deserializer, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// Skin condition categories the classifier can emit, in the reference
/// model's output order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum ClassLabel {
    #[serde(rename = "BA-cellulitis")]
    #[strum(serialize = "BA-cellulitis")]
    Cellulitis,
    #[serde(rename = "BA-impetigo")]
    #[strum(serialize = "BA-impetigo")]
    Impetigo,
    #[serde(rename = "FU-athlete-foot")]
    #[strum(serialize = "FU-athlete-foot")]
    AthleteFoot,
    #[serde(rename = "FU-nail-fungus")]
    #[strum(serialize = "FU-nail-fungus")]
    NailFungus,
    #[serde(rename = "FU-ringworm")]
    #[strum(serialize = "FU-ringworm")]
    Ringworm,
    #[serde(rename = "PA-cutaneous-larva-migrans")]
    #[strum(serialize = "PA-cutaneous-larva-migrans")]
    CutaneousLarvaMigrans,
    #[serde(rename = "VI-chickenpox")]
    #[strum(serialize = "VI-chickenpox")]
    Chickenpox,
    #[serde(rename = "VI-shingles")]
    #[strum(serialize = "VI-shingles")]
    Shingles,
}

impl ClassLabel {
    pub fn reference_order() -> Vec<ClassLabel> {
        ClassLabel::iter().collect()
    }

    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

/// Percentage in `[0, 100]` with two decimals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Display, Into)]
#[display(fmt = "{:.2}%", _0)]
pub struct Confidence(f64);

impl Confidence {
    pub fn from_probability(probability: f32) -> Self {
        Self::from_percent(f64::from(probability) * 100.0)
    }

    pub fn from_percent(percent: f64) -> Self {
        if !percent.is_finite() {
            return Self(0.0);
        }
        let clamped = percent.clamp(0.0, 100.0);
        Self((clamped * 100.0).round() / 100.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

// Older history documents stored the confidence as a "87.34%" string.
impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(Confidence::from_percent(value)),
            Raw::Text(text) => text
                .trim()
                .trim_end_matches('%')
                .trim()
                .parse::<f64>()
                .map(Confidence::from_percent)
                .map_err(|_| serde::de::Error::custom(format!("invalid confidence: {text}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "namaFile")]
    pub original_file_name: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub label: ClassLabel,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
