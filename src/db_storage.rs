use crate::errors::{AppError, ResultExt};
use crate::models::RegisteredEntry;
use crate::storage::{ensure_storable, EntryRepository};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use sqlx::PgPool;
use std::str::FromStr;

type EntryRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    BigDecimal,
);

/// Postgres-backed entry store over the `registered_entries` table.
pub struct PgEntryRepository {
    pool: PgPool,
}

impl PgEntryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Looks up a single entry by its normalized CPF.
    pub async fn find_by_cpf(&self, cpf: &str) -> Result<Option<RegisteredEntry>, AppError> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT cpf, nome, mae, data_nascimento, endereco, email, telefone, renda
             FROM registered_entries WHERE cpf = $1",
        )
        .bind(cpf)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load entry for CPF {}", cpf))?;

        Ok(row.map(entry_from_row))
    }
}

fn entry_from_row(row: EntryRow) -> RegisteredEntry {
    let (cpf, nome, mae, data_nascimento, endereco, email, telefone, renda) = row;
    RegisteredEntry {
        cpf,
        nome,
        mae,
        data_nascimento,
        endereco,
        email,
        telefone,
        renda: renda.to_f64().unwrap_or(0.0),
    }
}

/// Income as a two-decimal NUMERIC value.
fn renda_to_decimal(renda: f64) -> Result<BigDecimal, AppError> {
    if !renda.is_finite() {
        return Err(AppError::BadRequest("Renda inválida".to_string()));
    }
    BigDecimal::from_str(&format!("{:.2}", renda))
        .map_err(|e| AppError::InternalError(format!("Invalid income {}: {}", renda, e)))
}

#[async_trait]
impl EntryRepository for PgEntryRepository {
    async fn get_all(&self) -> Result<Vec<RegisteredEntry>, AppError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT cpf, nome, mae, data_nascimento, endereco, email, telefone, renda
             FROM registered_entries ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list registered entries")?;

        Ok(rows.into_iter().map(entry_from_row).collect())
    }

    async fn save(&self, entry: RegisteredEntry) -> Result<(), AppError> {
        ensure_storable(&entry)?;
        let renda = renda_to_decimal(entry.renda)?;

        sqlx::query(
            r#"
            INSERT INTO registered_entries
                (cpf, nome, mae, data_nascimento, endereco, email, telefone, renda)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (cpf) DO UPDATE SET
                nome = EXCLUDED.nome,
                mae = EXCLUDED.mae,
                data_nascimento = EXCLUDED.data_nascimento,
                endereco = EXCLUDED.endereco,
                email = EXCLUDED.email,
                telefone = EXCLUDED.telefone,
                renda = EXCLUDED.renda,
                updated_at = NOW()
            "#,
        )
        .bind(&entry.cpf)
        .bind(&entry.nome)
        .bind(&entry.mae)
        .bind(&entry.data_nascimento)
        .bind(&entry.endereco)
        .bind(&entry.email)
        .bind(&entry.telefone)
        .bind(renda)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save entry for CPF {}", entry.cpf))?;

        tracing::info!("Upserted registered entry for CPF {}", entry.cpf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renda_to_decimal_rounds_to_cents() {
        assert_eq!(
            renda_to_decimal(3500.0).unwrap(),
            BigDecimal::from_str("3500.00").unwrap()
        );
        assert_eq!(
            renda_to_decimal(1234.567).unwrap(),
            BigDecimal::from_str("1234.57").unwrap()
        );
    }

    #[test]
    fn test_renda_to_decimal_rejects_non_finite() {
        assert!(matches!(
            renda_to_decimal(f64::INFINITY),
            Err(AppError::BadRequest(_))
        ));
        assert!(renda_to_decimal(f64::NAN).is_err());
    }

    #[test]
    fn test_entry_from_row() {
        let entry = entry_from_row((
            "11144477735".to_string(),
            "JOAO".to_string(),
            "MARIA".to_string(),
            "01/01/1980".to_string(),
            "RUA A, 1".to_string(),
            "joao@example.com".to_string(),
            "11987654321".to_string(),
            BigDecimal::from_str("4200.50").unwrap(),
        ));
        assert_eq!(entry.cpf, "11144477735");
        assert_eq!(entry.renda, 4200.5);
    }
}
