use crate::cpf::Cpf;
use crate::errors::{AppError, ResultExt};
use crate::models::{RegisteredEntry, RegistrationRequest};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

/// Store of locally registered entries, unique by CPF.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// All entries in insertion order.
    async fn get_all(&self) -> Result<Vec<RegisteredEntry>, AppError>;

    /// Inserts the entry, or replaces the existing one with the same CPF in place.
    async fn save(&self, entry: RegisteredEntry) -> Result<(), AppError>;
}

/// Replaces the entry with the same CPF, keeping its position, or appends.
pub fn upsert(entries: &mut Vec<RegisteredEntry>, entry: RegisteredEntry) {
    match entries.iter_mut().find(|e| e.cpf == entry.cpf) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

/// Largest income a `NUMERIC(14, 2)` column holds.
pub const MAX_RENDA: f64 = 999_999_999_999.99;

/// Parses a currency field as typed in the registration form.
///
/// Every non-digit is dropped and the result is read as cents, so
/// `"R$ 3.500,00"` is 3500.0. Input without digits is 0. Amounts above
/// [`MAX_RENDA`] are rejected with `None`.
pub fn parse_brl_amount(raw: &str) -> Option<f64> {
    let digits = crate::cpf::normalize(raw);
    if digits.is_empty() {
        return Some(0.0);
    }
    let amount = digits.parse::<f64>().ok()? / 100.0;
    (amount.is_finite() && amount <= MAX_RENDA).then_some(amount)
}

/// Rejects entries whose income could not be written and read back by every backend.
pub fn ensure_storable(entry: &RegisteredEntry) -> Result<(), AppError> {
    if entry.renda.is_finite() && entry.renda.abs() <= MAX_RENDA {
        Ok(())
    } else {
        Err(AppError::BadRequest("Renda inválida".to_string()))
    }
}

impl RegisteredEntry {
    /// Builds an entry from the form payload; the CPF must pass the full check-digit validation.
    pub fn from_request(request: RegistrationRequest) -> Result<Self, AppError> {
        let cpf = Cpf::parse(&request.cpf)
            .ok_or_else(|| AppError::BadRequest("CPF inválido".to_string()))?;
        let renda = parse_brl_amount(&request.renda)
            .ok_or_else(|| AppError::BadRequest("Renda inválida".to_string()))?;

        Ok(Self {
            cpf: cpf.into_string(),
            nome: request.nome.trim().to_string(),
            mae: request.mae.trim().to_string(),
            data_nascimento: request.data_nascimento.trim().to_string(),
            endereco: request.endereco.trim().to_string(),
            email: request.email.trim().to_string(),
            telefone: request.telefone.trim().to_string(),
            renda,
        })
    }
}

/// Entries kept as a JSON array in a single file.
///
/// A missing file reads as an empty store. Writes are serialized through a
/// mutex so concurrent saves cannot drop each other's entries.
pub struct FileEntryRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEntryRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_entries(&self) -> Result<Vec<RegisteredEntry>, AppError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", self.path.display()))
    }
}

#[async_trait]
impl EntryRepository for FileEntryRepository {
    async fn get_all(&self) -> Result<Vec<RegisteredEntry>, AppError> {
        self.read_entries().await
    }

    async fn save(&self, entry: RegisteredEntry) -> Result<(), AppError> {
        ensure_storable(&entry)?;
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_entries().await?;
        let cpf = entry.cpf.clone();
        upsert(&mut entries, entry);

        let json = serde_json::to_vec_pretty(&entries)?;

        // Write next to the target and rename so a crash never leaves half a file
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        tracing::info!("Saved registered entry for CPF {} ({} total)", cpf, entries.len());
        Ok(())
    }
}

/// In-process store, used by tests and when nothing else is configured.
#[derive(Default)]
pub struct MemoryEntryRepository {
    entries: RwLock<Vec<RegisteredEntry>>,
}

impl MemoryEntryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryRepository for MemoryEntryRepository {
    async fn get_all(&self) -> Result<Vec<RegisteredEntry>, AppError> {
        Ok(self.entries.read().await.clone())
    }

    async fn save(&self, entry: RegisteredEntry) -> Result<(), AppError> {
        ensure_storable(&entry)?;
        upsert(&mut *self.entries.write().await, entry);
        Ok(())
    }
}
