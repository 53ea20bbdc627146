use chrono::{DateTime, Utc};
use anyhow::anyhow;
use serde::{Deserialize, Deserializer, Serialize, de};

/// Body of `GET /v1/transport/kmb/stop`
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KmbStopList {
    pub data: Vec<KmbStop>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KmbStop {
    pub stop: String,
    pub name_en: String,
    /// Sent as a numeric string, e.g. "22.345415"
    pub lat: KmbScalar,
    /// Sent as a numeric string, e.g. "114.192640"
    pub long: KmbScalar,
}

/// Body of `GET /v1/transport/kmb/stop-eta/{stop}`
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KmbStopEta {
    pub data: Vec<KmbEta>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KmbEta {
    pub route: String,
    pub dir: Direction,
    /// The API is inconsistent here, some endpoints send `1` and others `"1"`
    #[serde(deserialize_with = "string_from_kmb_scalar")]
    pub service_type: String,
    pub dest_en: String,
    pub eta_seq: i32,
    /// Null when the bus is not in service or the last one has already left
    pub eta: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Direction {
    #[serde(rename = "O")]
    Outbound,
    #[serde(rename = "I")]
    Inbound,
}

/// A value the API sends either as a string or as a JSON number
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum KmbScalar {
    Text(String),
    Number(serde_json::Number),
    Other(serde_json::Value),
}

impl KmbScalar {
    pub fn to_f64(&self) -> anyhow::Result<f64> {
        match self {
            KmbScalar::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| anyhow!("{s:?} isn't a number: {e}")),
            KmbScalar::Number(n) => n
                .as_f64()
                .ok_or_else(|| anyhow!("{n} isn't representable as f64")),
            KmbScalar::Other(v) => Err(anyhow!("{v} isn't a number")),
        }
    }
}

impl From<f64> for KmbScalar {
    fn from(value: f64) -> Self {
        KmbScalar::Text(value.to_string())
    }
}

fn string_from_kmb_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match KmbScalar::deserialize(deserializer)? {
        KmbScalar::Text(s) => Ok(s),
        KmbScalar::Number(n) => Ok(n.to_string()),
        KmbScalar::Other(v) => Err(de::Error::custom(format!("{v} isn't a string or number"))),
    }
}
