//! Reply texts built from catalog and customer data.

use std::fmt::Write;

use {
    barista_catalog::{Machine, Product, ProductCategory},
    barista_common::types::{MediaAttachment, ReplyPayload},
    barista_sessions::Customer,
};

pub const NO_STOCK: &str = "No momento não temos máquinas disponíveis com essas características \
                            específicas. Posso te apresentar outras opções?";

pub const MACHINE_NOT_FOUND: &str = "Desculpe, não encontrei informações sobre esta máquina.";

/// Format a BRL amount the Brazilian way: `R$ 1.234,50`.
pub fn brl(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let (sign, cents) = if cents < 0 {
        ("-", -cents)
    } else {
        ("", cents)
    };
    let units = (cents / 100).to_string();
    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, digit) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    format!("{sign}R$ {grouped},{:02}", cents % 100)
}

pub fn welcome(company: &str) -> String {
    format!(
        "*Oi, tudo bem?* Somos do {company}, e oferecemos máquinas de café ideais para empresas \
         de todos os tamanhos. Para qual CEP você deseja receber uma cotação?"
    )
}

pub fn cep_received(cep: &str) -> String {
    format!(
        "Perfeito, anotei o CEP *{cep}*! Atendemos a sua região.\n\n\
         Qual é o tipo do seu estabelecimento? (escritório, restaurante, loja, clínica, \
         indústria...)"
    )
}

/// Lead-in sent before the recommendation once the business type is known.
pub fn business_type_received(business_type: &str) -> String {
    format!(
        "Ótimo! Para *{}* temos uma opção ideal:",
        business_type.to_lowercase()
    )
}

/// The recommendation card. When the machine has an image the card is sent
/// as its caption.
pub fn machine_card(machine: &Machine) -> ReplyPayload {
    let mut text = format!("*{}* - {}/mês\n\n", machine.name, brl(machine.rental_price));
    if let Some(description) = &machine.description {
        let _ = write!(text, "{description}\n\n");
    }

    let dims = &machine.dimensions;
    let rows = [
        ("Altura", &dims.height),
        ("Largura", &dims.width),
        ("Profundidade", &dims.depth),
        ("Peso", &dims.weight),
    ];
    if rows.iter().any(|(_, v)| v.is_some()) {
        text.push_str("*Dimensões:*\n");
        for (label, value) in rows {
            if let Some(value) = value {
                let _ = writeln!(text, "{label}: {value}");
            }
        }
        text.push('\n');
    }

    if !machine.supported_products.trim().is_empty() {
        let _ = write!(text, "*Produtos suportados:*\n{}\n\n", machine.supported_products);
    }
    if let Some(videos) = &machine.videos {
        let _ = write!(text, "Veja o vídeo da máquina: {videos}\n\n");
    }
    if let Some(method) = &machine.payment_method {
        let _ = writeln!(text, "*Forma de pagamento:* {method}");
    }
    if let Some(duration) = &machine.contract_duration {
        let _ = writeln!(text, "*Contrato:* {duration}");
    }
    text.push_str("\nGostaria de ver mais detalhes ou agendar uma visita?");

    let payload = ReplyPayload::text(text);
    match &machine.image {
        Some(image) => payload.with_media(MediaAttachment::from_url(image.clone())),
        None => payload,
    }
}

/// Compatible products grouped by category, in [`ProductCategory::ALL`] order.
pub fn product_list(machine_name: &str, products: &[Product]) -> String {
    let mut text = format!("*Produtos compatíveis com {machine_name}:*\n\n");
    for category in ProductCategory::ALL {
        let mut in_category = products.iter().filter(|p| p.category == category).peekable();
        if in_category.peek().is_none() {
            continue;
        }
        let _ = writeln!(text, "*{}:*", category.label());
        for product in in_category {
            let _ = writeln!(text, "• {} - {}", product.name, brl(product.price));
            if let Some(doses) = product.dosage.ml80.as_ref().and_then(|d| d.doses) {
                let _ = writeln!(text, "  (Rende aproximadamente {doses} doses)");
            }
        }
        text.push('\n');
    }
    text.trim_end().to_string()
}

pub fn pricing(machines: &[Machine]) -> String {
    let mut text = String::from("*Valores de locação:*\n\n");
    for machine in machines {
        let _ = write!(text, "• *{}* - {}/mês", machine.name, brl(machine.rental_price));
        if machine.rental_discount > 0.0 {
            let _ = write!(text, " (desconto de {})", brl(machine.rental_discount));
        }
        text.push('\n');
    }
    text.push_str("\nQuer que eu te mostre os detalhes de alguma delas?");
    text
}

pub fn contract_terms() -> &'static str {
    "*Contrato de Locação:*\n\n\
     • Duração: 12 meses\n\
     • Pagamento: Mensal por boleto\n\
     • Multa por cancelamento: 3 meses do valor do aluguel\n\
     • Suporte técnico incluso\n\
     • Manutenção preventiva trimestral\n\n\
     *Documentos necessários:*\n\
     • Contrato Social\n\
     • CNPJ\n\
     • Cartão CNPJ\n\
     • RG ou CNH do sócio-proprietário\n\
     • Comprovante de endereço do estabelecimento\n\n\
     Posso te ajudar a iniciar o processo agora mesmo!"
}

pub fn deletion_confirmation() -> &'static str {
    "*Confirmação de Exclusão de Dados*\n\n\
     Seus dados foram completamente apagados do nosso sistema, incluindo:\n\n\
     • Histórico de conversas\n\
     • Informações de contato\n\
     • Preferências salvas\n\n\
     _Se desejar utilizar nossos serviços novamente no futuro, será necessário fornecer suas \
     informações novamente._\n\n\
     *Agradecemos a confiança!*"
}

/// Reply for general messages when no LLM is configured.
pub fn general(customer: &Customer) -> String {
    let first_name = customer.name.split_whitespace().next().unwrap_or("");
    let ask = if customer.cep.is_none() {
        "Para eu te enviar uma cotação, qual é o seu CEP?"
    } else if customer.business_type.is_none() {
        "Qual é o tipo do seu estabelecimento?"
    } else {
        "Posso te mostrar nossas máquinas, os produtos compatíveis ou as condições de contrato."
    };
    format!("Entendi, {first_name}! {ask}")
}

/// Compact catalog listing given to the LLM as context.
pub fn catalog_summary(machines: &[Machine], products: &[Product]) -> String {
    let mut text = String::from("Máquinas disponíveis para locação:\n");
    if machines.is_empty() {
        text.push_str("- nenhuma no momento\n");
    }
    for m in machines {
        let _ = writeln!(
            text,
            "- {}: {}/mês; bebidas: {}",
            m.name,
            brl(m.rental_price),
            m.supported_products
        );
    }
    if !products.is_empty() {
        text.push_str("Produtos:\n");
        for p in products {
            let _ = writeln!(text, "- {} ({}): {}", p.name, p.category.label(), brl(p.price));
        }
    }
    text
}

/// System prompt for free-form replies.
pub fn persona_prompt(persona: &str, company: &str, customer: &Customer, catalog: &str) -> String {
    let mut prompt = format!(
        "Você é a {persona}, assistente digital do {company}, especializada em qualificação de \
         leads e vendas de máquinas de café. Mantenha um tom profissional mas amigável, e use as \
         informações do histórico da conversa para personalizar suas respostas. Responda em \
         português, de forma curta, como uma mensagem de WhatsApp.\n\n"
    );
    let _ = writeln!(prompt, "Cliente: {}", customer.name);
    if let Some(cep) = &customer.cep {
        let _ = writeln!(prompt, "CEP: {cep}");
    }
    if let Some(business) = &customer.business_type {
        let _ = writeln!(prompt, "Tipo de negócio: {business}");
    }
    if !customer.interested_machines.is_empty() {
        let _ = writeln!(prompt, "Interesse: {}", customer.interested_machines.join(", "));
    }
    prompt.push('\n');
    prompt.push_str(catalog);
    prompt
}
