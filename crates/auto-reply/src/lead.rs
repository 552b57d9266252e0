//! Lead qualification: what a message tells us about the customer.

use std::sync::LazyLock;

use regex::Regex;

use barista_sessions::{Customer, LeadStatus, PaymentMethod};

/// Brazilian postal code, with or without the dash.
static CEP: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d{5}-?\d{3}").ok());

/// Keyword → canonical business type. First match wins.
const BUSINESS_TYPES: &[(&str, &str)] = &[
    ("escritório", "ESCRITÓRIO"),
    ("escritorio", "ESCRITÓRIO"),
    ("café", "CAFÉ"),
    ("cafe", "CAFÉ"),
    ("restaurante", "RESTAURANTE"),
    ("indústria", "INDÚSTRIA"),
    ("industria", "INDÚSTRIA"),
    ("hotel", "HOTEL"),
    ("loja", "LOJA"),
    ("consultório", "CONSULTÓRIO"),
    ("consultorio", "CONSULTÓRIO"),
    ("clínica", "CLÍNICA"),
    ("clinica", "CLÍNICA"),
];

/// Machine lines the customer can ask for by name.
pub const MACHINE_NAMES: &[&str] = &["Onix", "Jade", "Rubi"];

const PRICE_WORDS: &[&str] = &["preço", "valor", "orçamento", "orcamento"];
const CLOSING_WORDS: &[&str] = &["contrato", "fechar", "aceito", "acordo"];

pub fn extract_cep(text: &str) -> Option<String> {
    CEP.as_ref()?.find(text).map(|m| m.as_str().to_string())
}

pub fn extract_business_type(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    BUSINESS_TYPES
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, label)| *label)
}

/// Machine names mentioned in `text`, in [`MACHINE_NAMES`] order.
pub fn mentioned_machines(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    MACHINE_NAMES
        .iter()
        .filter(|name| lower.contains(&name.to_lowercase()))
        .copied()
        .collect()
}

pub fn payment_preference(text: &str) -> Option<PaymentMethod> {
    let lower = text.to_lowercase();
    if lower.contains("macpay") || lower.contains("pix") {
        Some(PaymentMethod::Macpay)
    } else if lower.contains("moeda") || lower.contains("ficha") {
        Some(PaymentMethod::Manual)
    } else {
        None
    }
}

/// Record CEP and business type if the customer just gave them.
///
/// The business type is only looked for once a CEP is known. Returns whether
/// anything changed.
pub fn capture_profile(customer: &mut Customer, text: &str) -> bool {
    let mut changed = false;
    if customer.cep.is_none()
        && let Some(cep) = extract_cep(text)
    {
        customer.cep = Some(cep);
        changed = true;
    }
    if customer.cep.is_some()
        && customer.business_type.is_none()
        && let Some(business) = extract_business_type(text)
    {
        customer.business_type = Some(business.to_string());
        changed = true;
    }
    changed
}

/// The status after this message. Moves at most one step forward.
pub fn next_status(customer: &Customer, text: &str) -> LeadStatus {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    match customer.status {
        LeadStatus::Lead if customer.cep.is_some() && customer.business_type.is_some() => {
            LeadStatus::Qualified
        },
        LeadStatus::Qualified if has(PRICE_WORDS) => LeadStatus::Negotiating,
        LeadStatus::Negotiating if has(CLOSING_WORDS) => LeadStatus::ContractSent,
        current => current,
    }
}

/// Apply status and preference updates after a reply. Returns whether
/// anything changed; machine interest is recorded by the caller once the
/// catalog confirms the machine exists.
pub fn advance(customer: &mut Customer, text: &str) -> bool {
    let mut changed = false;
    let status = next_status(customer, text);
    if status != customer.status {
        customer.status = status;
        changed = true;
    }
    if let Some(method) = payment_preference(text)
        && customer.payment_method != Some(method)
    {
        customer.payment_method = Some(method);
        changed = true;
    }
    changed
}
