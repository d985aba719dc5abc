use sqlx::{postgres::PgPoolOptions, PgPool};

/// Schema for registered entries; `id` keeps insertion order across upserts.
const CREATE_REGISTERED_ENTRIES: &str = r#"
CREATE TABLE IF NOT EXISTS registered_entries (
    id BIGSERIAL PRIMARY KEY,
    cpf VARCHAR(11) NOT NULL UNIQUE,
    nome TEXT NOT NULL,
    mae TEXT NOT NULL,
    data_nascimento TEXT NOT NULL,
    endereco TEXT NOT NULL,
    email TEXT NOT NULL,
    telefone TEXT NOT NULL,
    renda NUMERIC(14, 2) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query(CREATE_REGISTERED_ENTRIES).execute(&pool).await?;
        tracing::info!("Database ready (registered_entries)");

        Ok(Self { pool })
    }
}
