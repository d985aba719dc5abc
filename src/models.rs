use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Placeholder for any field the Work API did not provide.
pub const UNAVAILABLE: &str = "Não disponível";

/// Placeholder used for every field of a failed lookup.
pub const ERROR_PLACEHOLDER: &str = "-";

// ============ Work API Models ============

/// Raw `modulo=cpf` response from the Work API.
///
/// Every field is optional; a missing group or key is mapped to a sentinel
/// later instead of failing the decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawUpstreamRecord {
    #[serde(rename = "DadosBasicos", default, deserialize_with = "lenient_object")]
    pub dados_basicos: Option<DadosBasicos>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub enderecos: Vec<Endereco>,
    #[serde(default, deserialize_with = "lenient_list_positional")]
    pub emails: Vec<EmailEntry>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub telefones: Vec<TelefoneEntry>,
    #[serde(rename = "DadosEconomicos", default, deserialize_with = "lenient_object")]
    pub dados_economicos: Option<DadosEconomicos>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DadosBasicos {
    #[serde(default, deserialize_with = "lenient_string")]
    pub nome: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nome_mae: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub data_nascimento: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endereco {
    #[serde(default, deserialize_with = "lenient_string")]
    pub tipo_logradouro: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub logradouro: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub logradouro_numero: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub complemento: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bairro: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cidade: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uf: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cep: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelefoneEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub telefone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DadosEconomicos {
    /// Declared monthly income, Brazilian decimal comma (e.g. "3500,00").
    #[serde(default, deserialize_with = "lenient_string")]
    pub renda: Option<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub score: Option<Score>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    #[serde(rename = "scoreCSB", default, deserialize_with = "lenient_string")]
    pub score_csb: Option<String>,
}

/// Accepts a string, a number or a bool; anything else (null, objects) becomes `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Decodes a nested group, treating a group of the wrong shape as absent.
fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Accepts a list of objects; `null` or a non-list value becomes an empty list
/// and individual entries that fail to decode are skipped.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Like [`lenient_list`], but an entry that fails to decode keeps its slot
/// as `T::default()`.
fn lenient_list_positional<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    })
}

// ============ Lookup Results ============

/// Credit classification assigned to each lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    /// Declared income at or above the threshold.
    Good,
    /// Declared income below the threshold, or unparseable.
    Bad,
    /// The lookup itself failed.
    Error,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Good => "GOOD",
            Classification::Bad => "BAD",
            Classification::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized outcome of one lookup attempt.
///
/// No field is ever absent: missing data is [`UNAVAILABLE`], failed lookups
/// carry [`ERROR_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupRecord {
    pub cpf: String,
    pub nome: String,
    pub mae: String,
    pub data_nascimento: String,
    pub enderecos: Vec<String>,
    pub email: String,
    pub telefones: Vec<String>,
    pub renda: String,
    pub score: String,
    pub classificacao: Classification,
    /// Failure reason, only for [`Classification::Error`] records.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

// ============ Registered Entries ============

/// Locally registered person; unique by `cpf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredEntry {
    pub cpf: String,
    pub nome: String,
    pub mae: String,
    pub data_nascimento: String,
    pub endereco: String,
    pub email: String,
    pub telefone: String,
    pub renda: f64,
}

/// Registration form payload. `renda` is the currency text as typed.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub cpf: String,
    #[serde(default)]
    pub nome: String,
    #[serde(default)]
    pub mae: String,
    #[serde(default)]
    pub data_nascimento: String,
    #[serde(default)]
    pub endereco: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub telefone: String,
    #[serde(default)]
    pub renda: String,
}

/// Response for a successful registration.
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub success: bool,
    pub message: String,
    pub entry: RegisteredEntry,
}

// ============ Query Parameters / Batch DTOs ============

/// Query parameters for the single lookup endpoint.
#[derive(Debug, Deserialize)]
pub struct LookupQueryParams {
    pub cpf: Option<String>,
}

/// Batch submission: either an explicit list or pasted text, one CPF per line.
#[derive(Debug, Default, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub cpfs: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Lifecycle of a queued batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Cancelled,
}

/// Progress counter published before each lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// Snapshot of a batch job returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BatchJobView {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<LookupRecord>,
}

/// Response for an accepted batch submission.
#[derive(Debug, Serialize)]
pub struct BatchAccepted {
    pub id: Uuid,
    pub total: usize,
    pub status: JobStatus,
}

/// Query parameters for the report endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ReportQueryParams {
    /// `txt` (default) for the full report, `text` for the compact clipboard form.
    pub format: Option<String>,
}
