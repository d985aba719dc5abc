//! Plain-text renderings of batch results.

use crate::models::LookupRecord;
use std::fmt::Write;

const DOUBLE_RULE: &str = "═══════════════════════════════════════════════════════";
const SINGLE_RULE: &str = "───────────────────────────────────────────────────────";

/// Output flavour of [`render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Full downloadable report with header and rules.
    Txt,
    /// Compact form without decorations, for pasting elsewhere.
    Text,
}

impl ReportFormat {
    /// Parses the `format` query value; unknown values are rejected.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some("txt") => Some(Self::Txt),
            Some("text") => Some(Self::Text),
            _ => None,
        }
    }
}

pub fn render(records: &[LookupRecord], format: ReportFormat) -> String {
    match format {
        ReportFormat::Txt => render_txt_report(records),
        ReportFormat::Text => render_clipboard_text(records),
    }
}

/// Full report: banner, then one ruled block per record in batch order.
pub fn render_txt_report(records: &[LookupRecord]) -> String {
    let mut out = String::new();
    out.push_str(DOUBLE_RULE);
    out.push('\n');
    out.push_str("          RELATÓRIO DE CONSULTA DE CPF\n");
    out.push_str(DOUBLE_RULE);
    out.push_str("\n\n");

    for (idx, record) in records.iter().enumerate() {
        let _ = writeln!(out, "{} CPF", idx + 1);
        out.push_str(SINGLE_RULE);
        out.push('\n');
        write_fields(&mut out, record);
        out.push_str(SINGLE_RULE);
        out.push_str("\n\n");
    }

    out
}

/// Compact report with the same fields and no rules.
pub fn render_clipboard_text(records: &[LookupRecord]) -> String {
    let mut out = String::new();
    for (idx, record) in records.iter().enumerate() {
        let _ = writeln!(out, "{} CPF", idx + 1);
        write_fields(&mut out, record);
        out.push('\n');
    }
    out
}

fn write_fields(out: &mut String, record: &LookupRecord) {
    // Writing into a String cannot fail
    let _ = writeln!(out, "CPF: {}", record.cpf);
    let _ = writeln!(out, "NOME: {}", record.nome);
    let _ = writeln!(out, "MÃE: {}", record.mae);
    let _ = writeln!(out, "DATA NASCIMENTO: {}", record.data_nascimento);
    out.push_str("ENDEREÇO(S):\n");
    for endereco in &record.enderecos {
        let _ = writeln!(out, "  {}", endereco);
    }
    let _ = writeln!(out, "EMAIL: {}", record.email);
    out.push_str("TELEFONE(S):\n");
    for telefone in &record.telefones {
        let _ = writeln!(out, "  {}", telefone);
    }
    let _ = writeln!(out, "RENDA: R$ {}", record.renda);
    let _ = writeln!(out, "SCORE: {}", record.score);
    let _ = writeln!(out, "CLASSIFICAÇÃO: {}", record.classificacao);
}
