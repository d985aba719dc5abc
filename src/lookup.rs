//! Lookup capability and the mapping from raw Work API records to results.
//!
//! The mapping is pure: given the same raw record it always produces the same
//! [`LookupRecord`], and it never fails. Missing data becomes [`UNAVAILABLE`].
use crate::cpf::Cpf;
use crate::errors::AppError;
use crate::models::{
    Classification, Endereco, LookupRecord, RawUpstreamRecord, ERROR_PLACEHOLDER, UNAVAILABLE,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Declared monthly income (BRL) at or above which a person is classified GOOD.
pub const GOOD_INCOME_THRESHOLD: f64 = 3000.0;

/// Anything that can resolve a CPF into a raw upstream record.
#[async_trait]
pub trait CpfLookup: Send + Sync {
    async fn lookup(&self, cpf: &Cpf) -> Result<RawUpstreamRecord, AppError>;
}

#[async_trait]
impl<T: CpfLookup + ?Sized> CpfLookup for Arc<T> {
    async fn lookup(&self, cpf: &Cpf) -> Result<RawUpstreamRecord, AppError> {
        (**self).lookup(cpf).await
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

fn or_unavailable(value: Option<&String>) -> String {
    non_empty(value).unwrap_or(UNAVAILABLE).to_string()
}

/// Formats one address as a single line; entries without a street are skipped.
pub fn format_address(endereco: &Endereco) -> Option<String> {
    let logradouro = non_empty(endereco.logradouro.as_ref())?;
    let field = |v: &Option<String>| v.as_deref().unwrap_or("").to_string();
    let complemento = match non_empty(endereco.complemento.as_ref()) {
        Some(c) => format!("- {}", c),
        None => String::new(),
    };

    let line = format!(
        "{} {}, {} {} - {}, {} - {} CEP: {}",
        field(&endereco.tipo_logradouro),
        logradouro,
        field(&endereco.logradouro_numero),
        complemento,
        field(&endereco.bairro),
        field(&endereco.cidade),
        field(&endereco.uf),
        field(&endereco.cep),
    );

    Some(line.trim().to_string())
}

/// Parses a declared income the way the classification needs it.
///
/// The first comma becomes the decimal point, then the longest numeric prefix
/// is read. Anything without a numeric prefix counts as zero. Values too large
/// for an `f64` saturate at `f64::MAX`, so they still classify as GOOD.
pub fn parse_income(raw: &str) -> f64 {
    let normalized = raw.trim_start().replacen(',', ".", 1);

    numeric_prefix(&normalized)
        .parse::<f64>()
        .map(|v| v.clamp(f64::MIN, f64::MAX))
        .unwrap_or(0.0)
}

/// Longest prefix shaped like `[+-]digits[.digits][(e|E)[+-]digits]` with at
/// least one mantissa digit; empty when there is none.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return "";
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    &s[..end]
}

/// GOOD at or above [`GOOD_INCOME_THRESHOLD`], BAD otherwise.
pub fn classify_income(raw: &str) -> Classification {
    if parse_income(raw) >= GOOD_INCOME_THRESHOLD {
        Classification::Good
    } else {
        Classification::Bad
    }
}

impl LookupRecord {
    /// Maps a successful upstream answer into a result record.
    pub fn from_upstream(cpf: &Cpf, raw: &RawUpstreamRecord) -> Self {
        let basicos = raw.dados_basicos.as_ref();
        let economicos = raw.dados_economicos.as_ref();

        let mut enderecos: Vec<String> = raw.enderecos.iter().filter_map(format_address).collect();
        if enderecos.is_empty() {
            enderecos.push(UNAVAILABLE.to_string());
        }

        let mut telefones: Vec<String> = raw
            .telefones
            .iter()
            .filter_map(|t| non_empty(t.telefone.as_ref()).map(str::to_string))
            .collect();
        if telefones.is_empty() {
            telefones.push(UNAVAILABLE.to_string());
        }

        let renda = non_empty(economicos.and_then(|e| e.renda.as_ref()))
            .unwrap_or("0")
            .to_string();

        let score = or_unavailable(
            economicos
                .and_then(|e| e.score.as_ref())
                .and_then(|s| s.score_csb.as_ref()),
        );

        let classificacao = classify_income(&renda);

        Self {
            cpf: cpf.as_str().to_string(),
            nome: or_unavailable(basicos.and_then(|b| b.nome.as_ref())),
            mae: or_unavailable(basicos.and_then(|b| b.nome_mae.as_ref())),
            data_nascimento: or_unavailable(basicos.and_then(|b| b.data_nascimento.as_ref())),
            enderecos,
            email: or_unavailable(raw.emails.first().and_then(|e| e.email.as_ref())),
            telefones,
            renda,
            score,
            classificacao,
            error: None,
        }
    }

    /// Builds the ERROR record for a lookup that did not produce data.
    pub fn failed(cpf: &Cpf, error: &AppError) -> Self {
        let nome = if error.is_upstream_response() {
            "Erro na consulta"
        } else {
            "Erro na requisição"
        };

        Self {
            cpf: cpf.as_str().to_string(),
            nome: nome.to_string(),
            mae: ERROR_PLACEHOLDER.to_string(),
            data_nascimento: ERROR_PLACEHOLDER.to_string(),
            enderecos: vec![ERROR_PLACEHOLDER.to_string()],
            email: ERROR_PLACEHOLDER.to_string(),
            telefones: vec![ERROR_PLACEHOLDER.to_string()],
            renda: ERROR_PLACEHOLDER.to_string(),
            score: ERROR_PLACEHOLDER.to_string(),
            classificacao: Classification::Error,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cpf() -> Cpf {
        Cpf::from_lookup_input("11144477735").unwrap()
    }

    fn raw(value: serde_json::Value) -> RawUpstreamRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_income_threshold() {
        assert_eq!(classify_income("3000,00"), Classification::Good);
        assert_eq!(classify_income("2999,99"), Classification::Bad);
        assert_eq!(classify_income("3000"), Classification::Good);
        assert_eq!(classify_income("15000,50"), Classification::Good);
        assert_eq!(classify_income("SEM INFORMAÇÃO"), Classification::Bad);
        assert_eq!(classify_income(""), Classification::Bad);
    }

    #[test]
    fn test_parse_income_prefix_semantics() {
        assert_eq!(parse_income("3500,75"), 3500.75);
        assert_eq!(parse_income("  4200"), 4200.0);
        assert_eq!(parse_income("1234,5 reais"), 1234.5);
        // Only the first comma is a decimal point; the rest ends the number
        assert_eq!(parse_income("1,234,56"), 1.234);
        assert_eq!(parse_income("R$ 5000"), 0.0);
        assert_eq!(parse_income("-"), 0.0);
        assert_eq!(parse_income("1e3"), 1000.0);
        assert_eq!(parse_income("2e"), 2.0);
        assert_eq!(parse_income(".5"), 0.5);
    }

    #[test]
    fn test_parse_income_overflow_saturates() {
        assert_eq!(parse_income("1e400"), f64::MAX);
        assert_eq!(classify_income("1e400"), Classification::Good);
        assert_eq!(classify_income(&"9".repeat(400)), Classification::Good);
    }

    #[test]
    fn test_parse_income_long_input_reads_first_number() {
        let raw = format!("1{}", "e1".repeat(50_000));
        assert_eq!(parse_income(&raw), 10.0);
    }

    #[test]
    fn test_full_mapping() {
        let record = LookupRecord::from_upstream(
            &cpf(),
            &raw(json!({
                "DadosBasicos": {
                    "nome": "JOAO DA SILVA",
                    "nomeMae": "MARIA DA SILVA",
                    "dataNascimento": "01/01/1980"
                },
                "enderecos": [
                    {
                        "tipoLogradouro": "RUA",
                        "logradouro": "DAS FLORES",
                        "logradouroNumero": "100",
                        "complemento": "AP 12",
                        "bairro": "CENTRO",
                        "cidade": "SAO PAULO",
                        "uf": "SP",
                        "cep": "01000000"
                    },
                    { "logradouro": "", "cidade": "IGNORADA" }
                ],
                "emails": [{ "email": "joao@example.com" }, { "email": "outro@example.com" }],
                "telefones": [{ "telefone": "11987654321" }, { "telefone": "" }],
                "DadosEconomicos": { "renda": "4500,00", "score": { "scoreCSB": "812" } }
            })),
        );

        assert_eq!(record.cpf, "11144477735");
        assert_eq!(record.nome, "JOAO DA SILVA");
        assert_eq!(record.mae, "MARIA DA SILVA");
        assert_eq!(record.data_nascimento, "01/01/1980");
        assert_eq!(
            record.enderecos,
            vec!["RUA DAS FLORES, 100 - AP 12 - CENTRO, SAO PAULO - SP CEP: 01000000"]
        );
        assert_eq!(record.email, "joao@example.com");
        assert_eq!(record.telefones, vec!["11987654321"]);
        assert_eq!(record.renda, "4500,00");
        assert_eq!(record.score, "812");
        assert_eq!(record.classificacao, Classification::Good);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_address_without_complement_or_type() {
        let endereco = Endereco {
            logradouro: Some("AV PAULISTA".to_string()),
            logradouro_numero: Some("1000".to_string()),
            bairro: Some("BELA VISTA".to_string()),
            cidade: Some("SAO PAULO".to_string()),
            uf: Some("SP".to_string()),
            cep: Some("01310100".to_string()),
            ..Default::default()
        };
        assert_eq!(
            format_address(&endereco).unwrap(),
            "AV PAULISTA, 1000  - BELA VISTA, SAO PAULO - SP CEP: 01310100"
        );
    }

    #[test]
    fn test_empty_upstream_uses_sentinels() {
        let record = LookupRecord::from_upstream(&cpf(), &RawUpstreamRecord::default());

        assert_eq!(record.nome, UNAVAILABLE);
        assert_eq!(record.mae, UNAVAILABLE);
        assert_eq!(record.data_nascimento, UNAVAILABLE);
        assert_eq!(record.enderecos, vec![UNAVAILABLE]);
        assert_eq!(record.email, UNAVAILABLE);
        assert_eq!(record.telefones, vec![UNAVAILABLE]);
        assert_eq!(record.renda, "0");
        assert_eq!(record.score, UNAVAILABLE);
        assert_eq!(record.classificacao, Classification::Bad);
    }

    #[test]
    fn test_malformed_first_email_is_not_replaced_by_second() {
        let record = LookupRecord::from_upstream(
            &cpf(),
            &raw(json!({
                "emails": ["garbage", { "email": "segundo@example.com" }]
            })),
        );

        assert_eq!(record.email, UNAVAILABLE);
    }

    #[test]
    fn test_failed_record() {
        let upstream = LookupRecord::failed(&cpf(), &AppError::ExternalApiError("500".into()));
        assert_eq!(upstream.nome, "Erro na consulta");
        assert_eq!(upstream.classificacao, Classification::Error);
        assert_eq!(upstream.enderecos, vec![ERROR_PLACEHOLDER]);
        assert_eq!(upstream.renda, ERROR_PLACEHOLDER);
        assert!(upstream.error.as_deref().unwrap().contains("500"));

        let transport = LookupRecord::failed(&cpf(), &AppError::Timeout("30s".into()));
        assert_eq!(transport.nome, "Erro na requisição");
        assert_eq!(transport.cpf, "11144477735");
    }
}
