use serde::{Deserialize, Serialize};

/// A coffee machine offered for rent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    pub available_for_rent: bool,
    pub stock: i64,
    /// Accepts PIX with a QR code to release drinks (MACPAY).
    pub accepts_pix: bool,
    pub image: Option<String>,
    /// Free-form list of beverages the machine prepares.
    pub supported_products: String,
    pub videos: Option<String>,
    pub photo_gallery: Option<String>,
    pub installation_videos: Option<String>,
    pub feedback_video: Option<String>,
    /// Monthly rent in BRL.
    pub rental_price: f64,
    pub payment_method: Option<String>,
    pub rental_discount: f64,
    pub description: Option<String>,
    pub dimensions: Dimensions,
    pub unsupported_products: Option<String>,
    pub contract_duration: Option<String>,
    pub cancellation_fee: Option<String>,
}

impl Machine {
    pub fn is_rentable(&self) -> bool {
        self.available_for_rent && self.stock > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub height: Option<String>,
    pub width: Option<String>,
    pub depth: Option<String>,
    pub weight: Option<String>,
}

/// Product family, in the order replies list them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductCategory {
    Coffee,
    Chocolate,
    Cappuccino,
    Tea,
    Milk,
    Supplies,
}

impl ProductCategory {
    pub const ALL: [Self; 6] = [
        Self::Coffee,
        Self::Chocolate,
        Self::Cappuccino,
        Self::Tea,
        Self::Milk,
        Self::Supplies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coffee => "COFFEE",
            Self::Chocolate => "CHOCOLATE",
            Self::Cappuccino => "CAPPUCCINO",
            Self::Tea => "TEA",
            Self::Milk => "MILK",
            Self::Supplies => "SUPPLIES",
        }
    }

    /// Portuguese heading used in customer replies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Coffee => "Cafés",
            Self::Chocolate => "Chocolates",
            Self::Cappuccino => "Cappuccinos",
            Self::Tea => "Chás",
            Self::Milk => "Leites",
            Self::Supplies => "Suprimentos",
        }
    }

    /// Parse a stored code (`COFFEE`) or a spreadsheet label (`Café`, `chás`).
    pub fn parse(value: &str) -> Option<Self> {
        let v = value.trim().to_lowercase();
        let category = match v.as_str() {
            "coffee" | "café" | "cafe" | "cafés" | "cafes" => Self::Coffee,
            "chocolate" | "chocolates" => Self::Chocolate,
            "cappuccino" | "cappuccinos" => Self::Cappuccino,
            "tea" | "chá" | "cha" | "chás" | "chas" => Self::Tea,
            "milk" | "leite" | "leites" => Self::Milk,
            "supplies" | "suprimentos" | "suprimento" => Self::Supplies,
            _ => return None,
        };
        Some(category)
    }

    /// Best guess from a product name when the sheet has no category column.
    pub fn infer_from_name(name: &str) -> Self {
        let n = name.to_lowercase();
        if n.contains("cappuccino") {
            Self::Cappuccino
        } else if n.contains("chocolate") {
            Self::Chocolate
        } else if n.contains("chá") || n.contains("cha ") {
            Self::Tea
        } else if n.contains("leite") {
            Self::Milk
        } else if n.contains("copo") || n.contains("açúcar") || n.contains("acucar") {
            Self::Supplies
        } else {
            Self::Coffee
        }
    }
}

/// Yield of one product for one cup size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoseInfo {
    pub grams: Option<f64>,
    pub doses: Option<f64>,
    pub price_per_dose: Option<f64>,
}

impl DoseInfo {
    pub fn is_empty(&self) -> bool {
        self.grams.is_none() && self.doses.is_none() && self.price_per_dose.is_none()
    }
}

/// Dosage table keyed by cup size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dosage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml50: Option<DoseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml80: Option<DoseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml120: Option<DoseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml150: Option<DoseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml180: Option<DoseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml200: Option<DoseInfo>,
}

impl Dosage {
    pub const CUP_SIZES: [u32; 6] = [50, 80, 120, 150, 180, 200];

    pub fn slot_mut(&mut self, ml: u32) -> Option<&mut Option<DoseInfo>> {
        match ml {
            50 => Some(&mut self.ml50),
            80 => Some(&mut self.ml80),
            120 => Some(&mut self.ml120),
            150 => Some(&mut self.ml150),
            180 => Some(&mut self.ml180),
            200 => Some(&mut self.ml200),
            _ => None,
        }
    }
}

/// A consumable sold for use with the machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub price: f64,
    /// Free-form list of machine names this product works with.
    pub compatible_machines: String,
    pub category: ProductCategory,
    pub dosage: Dosage,
    pub description: Option<String>,
    pub image: Option<String>,
    pub available_for_sale: bool,
    pub stock: i64,
}

/// Criteria for recommending machines.
#[derive(Debug, Clone, Default)]
pub struct MachineFilter {
    pub max_price: Option<f64>,
    /// Any of these (case-insensitive) must appear in `supported_products`.
    pub beverages: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn category_parsing() {
        assert_eq!(ProductCategory::parse("COFFEE"), Some(ProductCategory::Coffee));
        assert_eq!(ProductCategory::parse(" Chás "), Some(ProductCategory::Tea));
        assert_eq!(ProductCategory::parse("bolo"), None);
        assert_eq!(
            ProductCategory::infer_from_name("Cappuccino Clássico 1kg"),
            ProductCategory::Cappuccino
        );
        assert_eq!(ProductCategory::infer_from_name("Leite em pó"), ProductCategory::Milk);
        assert_eq!(ProductCategory::infer_from_name("Grão Gourmet"), ProductCategory::Coffee);
    }

    #[test]
    fn dosage_serializes_only_filled_sizes() {
        let mut dosage = Dosage::default();
        *dosage.slot_mut(80).unwrap() = Some(DoseInfo {
            grams: Some(10.0),
            doses: Some(100.0),
            price_per_dose: Some(0.45),
        });
        assert!(dosage.slot_mut(90).is_none());
        let json = serde_json::to_value(&dosage).unwrap();
        assert_eq!(json, serde_json::json!({
            "ml80": {"grams": 10.0, "doses": 100.0, "price_per_dose": 0.45}
        }));
    }

    #[test]
    fn rentable_needs_stock() {
        let m = Machine {
            available_for_rent: true,
            stock: 0,
            ..Default::default()
        };
        assert!(!m.is_rentable());
    }
}
