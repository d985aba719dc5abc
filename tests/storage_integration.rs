use std::env;
use uuid::Uuid;

use rust_cpf_api::data::db::Database;
use rust_cpf_api::data::db_storage::PgEntryRepository;
use rust_cpf_api::models::RegisteredEntry;
use rust_cpf_api::storage::EntryRepository;

/// Integration smoke test for the Postgres entry repository.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn upsert_registered_entry_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let repo = PgEntryRepository::new(db.pool.clone());

    // Use a unique CPF to avoid conflicts on repeated runs.
    let cpf = format!("999{:08}", Uuid::new_v4().as_u128() % 100_000_000);

    let mut entry = RegisteredEntry {
        cpf: cpf.clone(),
        nome: "Test User".to_string(),
        mae: "Test Mother".to_string(),
        data_nascimento: "01/01/1990".to_string(),
        endereco: "RUA TESTE, 1".to_string(),
        email: "test@example.com".to_string(),
        telefone: "11999999999".to_string(),
        renda: 3500.0,
    };

    repo.save(entry.clone())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let count_before = repo
        .get_all()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .len();

    entry.nome = "Test User Updated".to_string();
    entry.renda = 1234.56;
    repo.save(entry)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let all = repo
        .get_all()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(all.len(), count_before);

    let stored = repo
        .find_by_cpf(&cpf)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("entry missing after upsert"))?;
    assert_eq!(stored.nome, "Test User Updated");
    assert_eq!(stored.renda, 1234.56);
    Ok(())
}
