use anyhow::{Context, Result};
use std::sync::Arc;

use rust_cpf_api::batch::{BatchLookupWorkflow, BatchOptions};
use rust_cpf_api::config::Config;
use rust_cpf_api::cpf::parse_lookup_list;
use rust_cpf_api::models::Classification;
use rust_cpf_api::report::render_txt_report;
use rust_cpf_api::services::WorkApiService;

/// Batch CPF lookup from a text file, one CPF per line.
///
/// Usage: batch_consulta <input.txt> [output.txt]
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_cpf_api=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .context("Usage: batch_consulta <input.txt> [output.txt]")?;
    let output = args.next().unwrap_or_else(|| {
        format!(
            "consulta-cpf-{}.txt",
            chrono::Utc::now().timestamp_millis()
        )
    });

    println!("=== Batch CPF Lookup ===\n");

    let config = Config::from_env()?;
    let text = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("Failed to read {}", input))?;

    let cpfs = parse_lookup_list(&text);
    if cpfs.is_empty() {
        anyhow::bail!("No 11-digit CPF found in {}", input);
    }
    println!("✓ {} CPF(s) loaded from {}\n", cpfs.len(), input);

    let service = WorkApiService::new(&config)?;
    let workflow = BatchLookupWorkflow::new(Arc::new(service), BatchOptions::from_config(&config));

    let progress = |current: usize, total: usize| {
        println!("[{}/{}] Looking up...", current, total);
    };
    let records = workflow.run(&cpfs, &progress).await;

    let report = render_txt_report(&records);
    tokio::fs::write(&output, report)
        .await
        .with_context(|| format!("Failed to write {}", output))?;

    let count = |c: Classification| records.iter().filter(|r| r.classificacao == c).count();
    println!("\n=== Batch Lookup Complete ===");
    println!("Total processed: {}", records.len());
    println!("✓ GOOD: {}", count(Classification::Good));
    println!("• BAD: {}", count(Classification::Bad));
    println!("✗ ERROR: {}", count(Classification::Error));
    println!("Report written to {}", output);

    Ok(())
}
