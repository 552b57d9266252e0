//! Spreadsheet row ingestion.
//!
//! Each webhook call carries one row as a flat JSON object whose keys are the
//! sheet's column headers, plus a `Planilha` key naming the sheet.

use {
    serde_json::{Map, Value},
    tracing::{debug, info, warn},
};

use crate::{
    store::CatalogStore,
    types::{Dimensions, DoseInfo, Dosage, Machine, Product, ProductCategory},
};

pub const SHEET_KEY: &str = "Planilha";

pub type Row = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid data format")]
    MissingSheet,

    #[error("Erros de validação:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl IngestError {
    /// Whether the caller sent bad data, as opposed to a storage failure.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

/// Known spreadsheet tabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sheet {
    RentalMachines,
    PurchaseMachines,
    Products,
    Supplies,
    Accessories,
    Faq,
    Other(String),
}

impl Sheet {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "MÁQUINAS ALUGAR" => Self::RentalMachines,
            "MAQUINAS COMPRAR" => Self::PurchaseMachines,
            "PRODUTOS" => Self::Products,
            "COPOS ACUCAR E DESCALCIFICANTE" => Self::Supplies,
            "ACESSÓRIOS" => Self::Accessories,
            "Q&A" => Self::Faq,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Machine {
        name: String,
        created: bool,
        changed: Vec<String>,
    },
    Product {
        name: String,
        created: bool,
        changed: Vec<String>,
    },
    /// The sheet is acknowledged but not stored.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub sheet: String,
    pub outcome: IngestOutcome,
}

/// Validate and store one spreadsheet row.
pub async fn ingest_row(store: &dyn CatalogStore, row: &Row) -> Result<IngestReport, IngestError> {
    let sheet_name = text(row, SHEET_KEY).ok_or(IngestError::MissingSheet)?;
    debug!(sheet = %sheet_name, "ingesting spreadsheet row");

    let sheet = Sheet::from_name(&sheet_name);
    let outcome = match &sheet {
        Sheet::RentalMachines => {
            let machine = machine_from_row(row)?;
            let previous = store.upsert_machine(&machine).await?;
            let changed = log_changes(&sheet_name, &machine.name, previous.as_ref(), &machine);
            IngestOutcome::Machine {
                name: machine.name,
                created: previous.is_none(),
                changed,
            }
        },
        Sheet::Products | Sheet::Supplies => {
            let fixed = (sheet == Sheet::Supplies).then_some(ProductCategory::Supplies);
            let product = product_from_row(row, fixed)?;
            let previous = store.upsert_product(&product).await?;
            let changed = log_changes(&sheet_name, &product.name, previous.as_ref(), &product);
            IngestOutcome::Product {
                name: product.name,
                created: previous.is_none(),
                changed,
            }
        },
        Sheet::PurchaseMachines | Sheet::Accessories | Sheet::Faq => {
            debug!(sheet = %sheet_name, "sheet acknowledged, not stored");
            IngestOutcome::Ignored
        },
        Sheet::Other(name) => {
            warn!(sheet = %name, "unknown spreadsheet type");
            IngestOutcome::Ignored
        },
    };

    Ok(IngestReport {
        sheet: sheet_name,
        outcome,
    })
}

/// Build a machine from a `MÁQUINAS ALUGAR` row.
pub fn machine_from_row(row: &Row) -> Result<Machine, IngestError> {
    let mut errors = Vec::new();

    for field in ["MÁQUINA", "DISPONÍVEL PARA ALUGUEL", "ESTOQUE", "LOCAÇÃO"] {
        if text(row, field).is_none() {
            errors.push(format!("Campo obrigatório ausente: '{field}'"));
        }
    }

    let stock = text(row, "ESTOQUE").map(|v| parse_integer(&v));
    if matches!(stock, Some(None)) {
        errors.push("Estoque deve ser um número".to_string());
    }
    let rental_price = text(row, "LOCAÇÃO").map(|v| parse_number(&v));
    if matches!(rental_price, Some(None)) {
        errors.push("Valor da locação deve ser um número".to_string());
    }

    for field in ["IMAGEM / FOTO", "VIDEOS", "CATALOGO DE FOTOS"] {
        if let Some(value) = text(row, field)
            && url::Url::parse(&value).is_err()
        {
            errors.push(format!("URL inválida no campo '{field}'"));
        }
    }

    if !errors.is_empty() {
        return Err(IngestError::Validation(errors));
    }

    Ok(Machine {
        name: text(row, "MÁQUINA").unwrap_or_default(),
        available_for_rent: yes(row, "DISPONÍVEL PARA ALUGUEL"),
        stock: stock.flatten().unwrap_or_default(),
        accepts_pix: yes(row, "ACEITA PIX COM QR CODE PARA LIBERAR AS BEBIDAS"),
        image: text(row, "IMAGEM / FOTO"),
        supported_products: text(row, "PRODUTOS SUPORTADOS").unwrap_or_default(),
        videos: text(row, "VIDEOS"),
        photo_gallery: text(row, "CATALOGO DE FOTOS"),
        installation_videos: text(row, "VIDEOS DE INSTALAÇÕES"),
        feedback_video: text(row, "VIDEO DE FEEDBACK DO CLIENTE"),
        rental_price: rental_price.flatten().unwrap_or_default(),
        payment_method: text(row, "FORMA DE PAGAMENTO"),
        rental_discount: text(row, "DESCONTO LOCAÇÃO")
            .and_then(|v| parse_number(&v))
            .unwrap_or_default(),
        description: text(row, "DESCRICAO"),
        dimensions: Dimensions {
            height: text(row, "ALTURA"),
            width: text(row, "LARGURA"),
            depth: text(row, "PROFUNDIDADE"),
            weight: text(row, "PESO"),
        },
        unsupported_products: text(row, "INSUMOS NÃO SUPORTADOS"),
        contract_duration: text(row, "CONTRATO FIDELIDADE"),
        cancellation_fee: text(row, "MULTA CANCELAMENTO DE CONTRATO"),
    })
}

/// Build a product from a `PRODUTOS` or supplies row.
pub fn product_from_row(
    row: &Row,
    category: Option<ProductCategory>,
) -> Result<Product, IngestError> {
    let mut errors = Vec::new();

    for field in ["NOME", "PREÇO", "MAQUINAS COMPATIVEIS"] {
        if text(row, field).is_none() {
            errors.push(format!("Campo obrigatório ausente: '{field}'"));
        }
    }

    let price = text(row, "PREÇO").map(|v| parse_number(&v));
    if matches!(price, Some(None)) {
        errors.push("Preço deve ser um número".to_string());
    }
    let stock = text(row, "ESTOQUE").map(|v| parse_integer(&v));
    if matches!(stock, Some(None)) {
        errors.push("Estoque deve ser um número".to_string());
    }
    if let Some(value) = text(row, "IMAGEM")
        && url::Url::parse(&value).is_err()
    {
        errors.push("URL inválida no campo 'IMAGEM'".to_string());
    }

    let explicit_category = text(row, "CATEGORIA");
    let parsed_category = explicit_category.as_deref().map(ProductCategory::parse);
    if matches!(parsed_category, Some(None)) {
        errors.push(format!(
            "Categoria inválida: '{}'",
            explicit_category.as_deref().unwrap_or_default()
        ));
    }

    if !errors.is_empty() {
        return Err(IngestError::Validation(errors));
    }

    let name = text(row, "NOME").unwrap_or_default();
    let category = category
        .or(parsed_category.flatten())
        .unwrap_or_else(|| ProductCategory::infer_from_name(&name));

    Ok(Product {
        category,
        price: price.flatten().unwrap_or_default(),
        compatible_machines: text(row, "MAQUINAS COMPATIVEIS").unwrap_or_default(),
        dosage: dosage_from_row(row),
        description: text(row, "DESCRIÇÃO"),
        image: text(row, "IMAGEM"),
        available_for_sale: text(row, "DISPONÍVEL PARA VENDA").is_none_or(|v| is_yes(&v)),
        stock: stock.flatten().unwrap_or_default(),
        name,
    })
}

/// Columns `GRAMATURA 80ML`, `DOSES 80ML`, `PREÇO DOSE 80ML` for each cup size.
fn dosage_from_row(row: &Row) -> Dosage {
    let mut dosage = Dosage::default();
    for ml in Dosage::CUP_SIZES {
        let info = DoseInfo {
            grams: text(row, &format!("GRAMATURA {ml}ML")).and_then(|v| parse_number(&v)),
            doses: text(row, &format!("DOSES {ml}ML")).and_then(|v| parse_number(&v)),
            price_per_dose: text(row, &format!("PREÇO DOSE {ml}ML")).and_then(|v| parse_number(&v)),
        };
        if !info.is_empty()
            && let Some(slot) = dosage.slot_mut(ml)
        {
            *slot = Some(info);
        }
    }
    dosage
}

/// Field names whose value differs between `previous` and `current`,
/// logged one line per field.
fn log_changes<T: serde::Serialize>(
    sheet: &str,
    name: &str,
    previous: Option<&T>,
    current: &T,
) -> Vec<String> {
    let Some(previous) = previous else {
        info!(sheet, name, "new catalog entry");
        return Vec::new();
    };

    let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
        (serde_json::to_value(previous), serde_json::to_value(current))
    else {
        return Vec::new();
    };

    let mut changed = Vec::new();
    for (field, new_value) in &new {
        let old_value = old.get(field).unwrap_or(&Value::Null);
        if old_value != new_value {
            info!(sheet, name, field = %field, old = %old_value, new = %new_value, "catalog field changed");
            changed.push(field.clone());
        }
    }
    if changed.is_empty() {
        debug!(sheet, name, "catalog entry unchanged");
    }
    changed
}

/// Trimmed non-empty text for a column; numbers are rendered as text.
fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "SIM" } else { "NÃO" }.to_string()),
        _ => None,
    }
}

fn is_yes(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "sim" | "s" | "yes" | "true" | "1")
}

fn yes(row: &Row, key: &str) -> bool {
    text(row, key).is_some_and(|v| is_yes(&v))
}

/// Parse Brazilian or plain numbers: `R$ 1.234,56`, `450,00`, `450.5`.
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_integer(value: &str) -> Option<i64> {
    let v = value.trim();
    v.parse::<i64>()
        .ok()
        .or_else(|| parse_number(v).filter(|n| n.fract() == 0.0).map(|n| n as i64))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use {super::*, crate::store::tests::memory_catalog};

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    fn rubi_row() -> Row {
        row(json!({
            "Planilha": "MÁQUINAS ALUGAR",
            "MÁQUINA": "Rubi",
            "DISPONÍVEL PARA ALUGUEL": "SIM",
            "ESTOQUE": "3",
            "ACEITA PIX COM QR CODE PARA LIBERAR AS BEBIDAS": "sim",
            "IMAGEM / FOTO": "https://cdn.example/rubi.jpg",
            "PRODUTOS SUPORTADOS": "Café, Cappuccino, Chocolate",
            "LOCAÇÃO": "R$ 450,00",
            "FORMA DE PAGAMENTO": "Boleto",
            "DESCRICAO": "Máquina automática de grãos",
            "ALTURA": "70cm",
            "CONTRATO FIDELIDADE": "12 meses"
        }))
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_number("R$ 1.234,56"), Some(1234.56));
        assert_eq!(parse_number("450,00"), Some(450.0));
        assert_eq!(parse_number("450.5"), Some(450.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_integer("3"), Some(3));
        assert_eq!(parse_integer("3,5"), None);
    }

    #[test]
    fn machine_row_maps_fields() {
        let machine = machine_from_row(&rubi_row()).unwrap();
        assert_eq!(machine.name, "Rubi");
        assert!(machine.available_for_rent);
        assert!(machine.accepts_pix);
        assert_eq!(machine.stock, 3);
        assert_eq!(machine.rental_price, 450.0);
        assert_eq!(machine.dimensions.height.as_deref(), Some("70cm"));
        assert_eq!(machine.contract_duration.as_deref(), Some("12 meses"));
    }

    #[test]
    fn machine_row_validation_collects_all_errors() {
        let bad = row(json!({
            "Planilha": "MÁQUINAS ALUGAR",
            "DISPONÍVEL PARA ALUGUEL": "SIM",
            "ESTOQUE": "muitas",
            "LOCAÇÃO": 300,
            "VIDEOS": "not a url"
        }));
        let Err(IngestError::Validation(errors)) = machine_from_row(&bad) else {
            panic!("expected validation errors");
        };
        assert_eq!(errors, vec![
            "Campo obrigatório ausente: 'MÁQUINA'".to_string(),
            "Estoque deve ser um número".to_string(),
            "URL inválida no campo 'VIDEOS'".to_string(),
        ]);
    }

    #[test]
    fn product_row_with_dosage() {
        let product = product_from_row(
            &row(json!({
                "Planilha": "PRODUTOS",
                "NOME": "Chocolate Premium 1kg",
                "PREÇO": "89,90",
                "MAQUINAS COMPATIVEIS": "Rubi, Jade",
                "GRAMATURA 80ML": "20",
                "DOSES 80ML": 50,
                "PREÇO DOSE 80ML": "1,80",
                "ESTOQUE": "12"
            })),
            None,
        )
        .unwrap();
        assert_eq!(product.category, ProductCategory::Chocolate);
        assert_eq!(product.price, 89.9);
        assert!(product.available_for_sale);
        assert_eq!(product.stock, 12);
        let ml80 = product.dosage.ml80.unwrap();
        assert_eq!(ml80.doses, Some(50.0));
        assert_eq!(ml80.price_per_dose, Some(1.8));
        assert!(product.dosage.ml50.is_none());
    }

    #[test]
    fn product_row_rejects_unknown_category() {
        let err = product_from_row(
            &row(json!({
                "NOME": "X", "PREÇO": "1", "MAQUINAS COMPATIVEIS": "Rubi", "CATEGORIA": "Bolo"
            })),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Categoria inválida"));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn ingest_creates_then_reports_changes() {
        let store = memory_catalog().await;

        let first = ingest_row(&store, &rubi_row()).await.unwrap();
        assert_eq!(first.sheet, "MÁQUINAS ALUGAR");
        assert_eq!(first.outcome, IngestOutcome::Machine {
            name: "Rubi".into(),
            created: true,
            changed: vec![],
        });

        let mut updated = rubi_row();
        updated.insert("LOCAÇÃO".into(), json!("399"));
        let second = ingest_row(&store, &updated).await.unwrap();
        assert_eq!(second.outcome, IngestOutcome::Machine {
            name: "Rubi".into(),
            created: false,
            changed: vec!["rental_price".into()],
        });
    }

    #[tokio::test]
    async fn supplies_sheet_forces_category() {
        let store = memory_catalog().await;
        let report = ingest_row(
            &store,
            &row(json!({
                "Planilha": "COPOS ACUCAR E DESCALCIFICANTE",
                "NOME": "Copo 80ml (100 un)",
                "PREÇO": "12,50",
                "MAQUINAS COMPATIVEIS": "Todas"
            })),
        )
        .await
        .unwrap();
        assert!(matches!(report.outcome, IngestOutcome::Product { created: true, .. }));
        let products = store.list_products().await.unwrap();
        assert_eq!(products[0].category, ProductCategory::Supplies);
    }

    #[tokio::test]
    async fn other_sheets_are_acknowledged() {
        let store = memory_catalog().await;
        for sheet in ["MAQUINAS COMPRAR", "ACESSÓRIOS", "Q&A", "RASCUNHO"] {
            let report = ingest_row(&store, &row(json!({"Planilha": sheet}))).await.unwrap();
            assert_eq!(report.outcome, IngestOutcome::Ignored);
            assert_eq!(report.sheet, sheet);
        }
        assert!(store.list_machines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_sheet_is_rejected() {
        let store = memory_catalog().await;
        let err = ingest_row(&store, &row(json!({"MÁQUINA": "Rubi"}))).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingSheet));
    }
}
