use serde::{Deserialize, Serialize};

use barista_common::types::MediaKind;

/// Sales funnel position. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    #[default]
    Lead,
    Qualified,
    Negotiating,
    ContractSent,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "LEAD",
            Self::Qualified => "QUALIFIED",
            Self::Negotiating => "NEGOTIATING",
            Self::ContractSent => "CONTRACT_SENT",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "QUALIFIED" => Self::Qualified,
            "NEGOTIATING" => Self::Negotiating,
            "CONTRACT_SENT" => Self::ContractSent,
            _ => Self::Lead,
        }
    }
}

/// How the customer prefers drinks to be paid at the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    /// PIX QR code on the machine.
    Macpay,
    /// Coins or tokens.
    Manual,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Macpay => "MACPAY",
            Self::Manual => "MANUAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "MACPAY" => Some(Self::Macpay),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub whatsapp_number: String,
    pub name: String,
    pub status: LeadStatus,
    pub cep: Option<String>,
    pub business_type: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    /// Machine names the customer asked about, in first-mention order.
    pub interested_machines: Vec<String>,
    pub welcome_sent: bool,
    pub created_at: i64,
    pub last_interaction: i64,
}

impl Customer {
    /// Display name used when WhatsApp gives none.
    pub fn default_name(number: &str) -> String {
        let start = number.len().saturating_sub(4);
        format!("Cliente {}", number.get(start..).unwrap_or(number))
    }

    pub fn note_interest(&mut self, machine: &str) -> bool {
        if self
            .interested_machines
            .iter()
            .any(|m| m.eq_ignore_ascii_case(machine))
        {
            return false;
        }
        self.interested_machines.push(machine.to_string());
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub media_kind: MediaKind,
    pub created_at: i64,
}

/// Rows removed by a privacy deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionSummary {
    pub conversations: u64,
    pub customer_records: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_order_and_labels() {
        assert!(LeadStatus::Lead < LeadStatus::Qualified);
        assert!(LeadStatus::Negotiating < LeadStatus::ContractSent);
        assert_eq!(LeadStatus::parse("CONTRACT_SENT"), LeadStatus::ContractSent);
        assert_eq!(LeadStatus::parse("garbage"), LeadStatus::Lead);
        assert_eq!(
            serde_json::to_string(&LeadStatus::ContractSent).unwrap(),
            "\"CONTRACT_SENT\""
        );
    }

    #[test]
    fn default_name_uses_last_digits() {
        assert_eq!(Customer::default_name("5581999991234"), "Cliente 1234");
        assert_eq!(Customer::default_name("12"), "Cliente 12");
    }

    #[test]
    fn interest_is_deduplicated() {
        let mut c = Customer {
            whatsapp_number: "1".into(),
            name: "x".into(),
            status: LeadStatus::Lead,
            cep: None,
            business_type: None,
            payment_method: None,
            interested_machines: vec![],
            welcome_sent: false,
            created_at: 0,
            last_interaction: 0,
        };
        assert!(c.note_interest("Rubi"));
        assert!(!c.note_interest("rubi"));
        assert_eq!(c.interested_machines, vec!["Rubi"]);
    }
}
