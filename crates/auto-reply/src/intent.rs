//! Intent classification for coalesced customer messages.

use std::sync::Arc;

use {
    async_trait::async_trait,
    tracing::{debug, warn},
};

use barista_agents::{ChatMessage, LlmProvider};

use crate::lead;

/// What the customer wants from this batch of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Greeting,
    ProvideCep,
    ProvideBusinessType,
    MachineInterest,
    PricingInquiry,
    ContractInquiry,
    DeleteData,
    General,
}

impl Intent {
    pub const ALL: [Self; 8] = [
        Self::Greeting,
        Self::ProvideCep,
        Self::ProvideBusinessType,
        Self::MachineInterest,
        Self::PricingInquiry,
        Self::ContractInquiry,
        Self::DeleteData,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::ProvideCep => "provide_cep",
            Self::ProvideBusinessType => "provide_business_type",
            Self::MachineInterest => "machine_interest",
            Self::PricingInquiry => "pricing_inquiry",
            Self::ContractInquiry => "contract_inquiry",
            Self::DeleteData => "delete_data",
            Self::General => "general",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|i| i.as_str() == label)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer state the classifier needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentContext {
    pub welcome_sent: bool,
    pub business_type_known: bool,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str, ctx: IntentContext) -> Intent;
}

const GREETINGS: &[&str] = &[
    "oi",
    "olá",
    "ola",
    "bom dia",
    "boa tarde",
    "boa noite",
    "hi",
    "hello",
];
const DELETE_VERBS: &[&str] = &[
    "apagar", "apague", "apaguem", "excluir", "exclua", "excluam", "deletar", "delete", "remover",
    "remova", "removam",
];
/// Objects that make a delete verb a request about the customer's own data.
const OWN_DATA: &[&str] = &[
    "meus dados",
    "minhas informações",
    "minhas informacoes",
    "meu cadastro",
    "meu histórico",
    "meu historico",
];
const NEGATIONS: &[&str] = &["não", "nao", "nunca", "jamais", "nem"];
/// How many words before the verb a negation still applies to.
const NEGATION_REACH: usize = 3;
const MACHINE_WORDS: &[&str] = &["rubi", "onix", "jade", "máquina", "maquina"];
const PRICING_WORDS: &[&str] = &["preço", "preco", "valor", "custo", "quanto", "aluguel"];
const CONTRACT_WORDS: &[&str] = &["contrato", "fidelidade", "prazo", "cancelamento", "multa"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn words(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whether `phrase` occurs as whole words in `words`.
fn has_phrase(words: &[&str], phrase: &str) -> bool {
    let padded = format!(" {} ", words.join(" "));
    padded.contains(&format!(" {phrase} "))
}

/// Whole-word (or whole-phrase) greeting match, so "noite" is not "oi".
fn is_greeting(lower: &str) -> bool {
    let words = words(lower);
    GREETINGS.iter().any(|g| has_phrase(&words, g))
}

/// An explicit, non-negated request to erase the customer's own data, such
/// as "quero apagar meus dados". Merely mentioning LGPD or "dados" is not.
fn is_deletion_request(lower: &str) -> bool {
    let words = words(lower);
    words.iter().enumerate().any(|(i, word)| {
        if !DELETE_VERBS.contains(word) {
            return false;
        }
        let negated = words[i.saturating_sub(NEGATION_REACH)..i]
            .iter()
            .any(|w| NEGATIONS.contains(w));
        !negated && OWN_DATA.iter().any(|o| has_phrase(&words[i + 1..], o))
    })
}

/// Rule-based classifier; the first matching rule wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn detect(text: &str, ctx: IntentContext) -> Intent {
        let lower = text.to_lowercase();
        if is_deletion_request(&lower) {
            Intent::DeleteData
        } else if !ctx.welcome_sent || is_greeting(&lower) {
            Intent::Greeting
        } else if lead::extract_cep(text).is_some() {
            Intent::ProvideCep
        } else if !ctx.business_type_known && lead::extract_business_type(text).is_some() {
            Intent::ProvideBusinessType
        } else if contains_any(&lower, MACHINE_WORDS) {
            Intent::MachineInterest
        } else if contains_any(&lower, PRICING_WORDS) {
            Intent::PricingInquiry
        } else if contains_any(&lower, CONTRACT_WORDS) {
            Intent::ContractInquiry
        } else {
            Intent::General
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, text: &str, ctx: IntentContext) -> Intent {
        Self::detect(text, ctx)
    }
}

const CLASSIFIER_PROMPT: &str = "Classifique a mensagem de um cliente de uma empresa de locação \
de máquinas de café. Responda apenas com um dos rótulos: greeting, provide_cep, \
provide_business_type, machine_interest, pricing_inquiry, contract_inquiry, delete_data, general.";

/// Delegates to an LLM and falls back to [`KeywordClassifier`] when the
/// call fails or the answer is not a known label.
///
/// Deleting customer data is never triggered by the model alone: a
/// `delete_data` answer only stands if the keyword rules agree.
pub struct LlmClassifier {
    provider: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(&self, text: &str, ctx: IntentContext) -> Intent {
        let fallback = KeywordClassifier::detect(text, ctx);
        if !ctx.welcome_sent {
            return fallback;
        }

        let messages = [ChatMessage::system(CLASSIFIER_PROMPT), ChatMessage::user(text)];
        let answer = match self.provider.complete(&messages).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(provider = self.provider.id(), error = %e, "intent classification failed");
                return fallback;
            },
        };

        let label = answer.trim().trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
        match Intent::from_label(label) {
            Some(Intent::DeleteData) if fallback != Intent::DeleteData => fallback,
            Some(intent) => {
                debug!(%intent, "llm intent");
                intent
            },
            None => {
                debug!(answer = %answer, "unknown intent label, using keywords");
                fallback
            },
        }
    }
}
