//! Catalog persistence.

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
    tracing::debug,
};

use crate::types::{Dimensions, Dosage, Machine, MachineFilter, Product, ProductCategory};

/// Read/write access to machines and products.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace a machine by name. Returns the previous record.
    async fn upsert_machine(&self, machine: &Machine) -> Result<Option<Machine>>;

    /// Insert or replace a product by name. Returns the previous record.
    async fn upsert_product(&self, product: &Product) -> Result<Option<Product>>;

    /// Case-insensitive lookup by name.
    async fn find_machine(&self, name: &str) -> Result<Option<Machine>>;

    async fn list_machines(&self) -> Result<Vec<Machine>>;

    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Rentable machines matching `filter`, cheapest first.
    async fn available_machines(&self, filter: &MachineFilter) -> Result<Vec<Machine>>;

    /// Products in stock whose compatibility list mentions `machine_name`.
    async fn products_for_machine(&self, machine_name: &str) -> Result<Vec<Product>>;
}

/// SQLite-backed catalog.
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run catalog migrations.
    ///
    /// Other crates migrate the same database, so versions they applied are
    /// ignored here.
    pub async fn init(pool: SqlitePool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .context("failed to run catalog migrations")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn find_product(&self, name: &str) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }
}

fn machine_from_row(row: &SqliteRow) -> Result<Machine> {
    Ok(Machine {
        name: row.try_get("name")?,
        available_for_rent: row.try_get("available_for_rent")?,
        stock: row.try_get("stock")?,
        accepts_pix: row.try_get("accepts_pix")?,
        image: row.try_get("image")?,
        supported_products: row.try_get("supported_products")?,
        videos: row.try_get("videos")?,
        photo_gallery: row.try_get("photo_gallery")?,
        installation_videos: row.try_get("installation_videos")?,
        feedback_video: row.try_get("feedback_video")?,
        rental_price: row.try_get("rental_price")?,
        payment_method: row.try_get("payment_method")?,
        rental_discount: row.try_get("rental_discount")?,
        description: row.try_get("description")?,
        dimensions: Dimensions {
            height: row.try_get("height")?,
            width: row.try_get("width")?,
            depth: row.try_get("depth")?,
            weight: row.try_get("weight")?,
        },
        unsupported_products: row.try_get("unsupported_products")?,
        contract_duration: row.try_get("contract_duration")?,
        cancellation_fee: row.try_get("cancellation_fee")?,
    })
}

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    let category: String = row.try_get("category")?;
    let dosage: String = row.try_get("dosage")?;
    Ok(Product {
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        compatible_machines: row.try_get("compatible_machines")?,
        category: ProductCategory::parse(&category)
            .with_context(|| format!("unknown product category {category}"))?,
        dosage: serde_json::from_str::<Dosage>(&dosage).context("invalid dosage json")?,
        description: row.try_get("description")?,
        image: row.try_get("image")?,
        available_for_sale: row.try_get("available_for_sale")?,
        stock: row.try_get("stock")?,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn upsert_machine(&self, machine: &Machine) -> Result<Option<Machine>> {
        let previous = self.find_machine(&machine.name).await?;

        sqlx::query(
            r#"
            INSERT INTO machines (
                name, available_for_rent, stock, accepts_pix, image, supported_products,
                videos, photo_gallery, installation_videos, feedback_video, rental_price,
                payment_method, rental_discount, description, height, width, depth, weight,
                unsupported_products, contract_duration, cancellation_fee
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                available_for_rent   = excluded.available_for_rent,
                stock                = excluded.stock,
                accepts_pix          = excluded.accepts_pix,
                image                = excluded.image,
                supported_products   = excluded.supported_products,
                videos               = excluded.videos,
                photo_gallery        = excluded.photo_gallery,
                installation_videos  = excluded.installation_videos,
                feedback_video       = excluded.feedback_video,
                rental_price         = excluded.rental_price,
                payment_method       = excluded.payment_method,
                rental_discount      = excluded.rental_discount,
                description          = excluded.description,
                height               = excluded.height,
                width                = excluded.width,
                depth                = excluded.depth,
                weight               = excluded.weight,
                unsupported_products = excluded.unsupported_products,
                contract_duration    = excluded.contract_duration,
                cancellation_fee     = excluded.cancellation_fee,
                updated_at           = CAST(strftime('%s', 'now') AS INTEGER)
            "#,
        )
        .bind(&machine.name)
        .bind(machine.available_for_rent)
        .bind(machine.stock)
        .bind(machine.accepts_pix)
        .bind(&machine.image)
        .bind(&machine.supported_products)
        .bind(&machine.videos)
        .bind(&machine.photo_gallery)
        .bind(&machine.installation_videos)
        .bind(&machine.feedback_video)
        .bind(machine.rental_price)
        .bind(&machine.payment_method)
        .bind(machine.rental_discount)
        .bind(&machine.description)
        .bind(&machine.dimensions.height)
        .bind(&machine.dimensions.width)
        .bind(&machine.dimensions.depth)
        .bind(&machine.dimensions.weight)
        .bind(&machine.unsupported_products)
        .bind(&machine.contract_duration)
        .bind(&machine.cancellation_fee)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert machine {}", machine.name))?;

        debug!(name = %machine.name, created = previous.is_none(), "machine upserted");
        Ok(previous)
    }

    async fn upsert_product(&self, product: &Product) -> Result<Option<Product>> {
        let previous = self.find_product(&product.name).await?;
        let dosage = serde_json::to_string(&product.dosage)?;

        sqlx::query(
            r#"
            INSERT INTO products (
                name, price, compatible_machines, category, dosage, description, image,
                available_for_sale, stock
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                price               = excluded.price,
                compatible_machines = excluded.compatible_machines,
                category            = excluded.category,
                dosage              = excluded.dosage,
                description         = excluded.description,
                image               = excluded.image,
                available_for_sale  = excluded.available_for_sale,
                stock               = excluded.stock,
                updated_at          = CAST(strftime('%s', 'now') AS INTEGER)
            "#,
        )
        .bind(&product.name)
        .bind(product.price)
        .bind(&product.compatible_machines)
        .bind(product.category.as_str())
        .bind(dosage)
        .bind(&product.description)
        .bind(&product.image)
        .bind(product.available_for_sale)
        .bind(product.stock)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert product {}", product.name))?;

        debug!(name = %product.name, created = previous.is_none(), "product upserted");
        Ok(previous)
    }

    async fn find_machine(&self, name: &str) -> Result<Option<Machine>> {
        let row = sqlx::query("SELECT * FROM machines WHERE name = ?")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(machine_from_row).transpose()
    }

    async fn list_machines(&self) -> Result<Vec<Machine>> {
        let rows = sqlx::query("SELECT * FROM machines ORDER BY rental_price, name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(machine_from_row).collect()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT * FROM products ORDER BY category, name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn available_machines(&self, filter: &MachineFilter) -> Result<Vec<Machine>> {
        let rows = sqlx::query(
            "SELECT * FROM machines
             WHERE available_for_rent = 1 AND stock > 0 AND (? IS NULL OR rental_price <= ?)
             ORDER BY rental_price, name",
        )
        .bind(filter.max_price)
        .bind(filter.max_price)
        .fetch_all(&self.pool)
        .await?;

        let beverages: Vec<String> = filter
            .beverages
            .iter()
            .map(|b| b.trim().to_lowercase())
            .filter(|b| !b.is_empty())
            .collect();

        let mut machines = Vec::with_capacity(rows.len());
        for row in &rows {
            let machine = machine_from_row(row)?;
            let supported = machine.supported_products.to_lowercase();
            if beverages.is_empty() || beverages.iter().any(|b| supported.contains(b.as_str())) {
                machines.push(machine);
            }
        }
        Ok(machines)
    }

    async fn products_for_machine(&self, machine_name: &str) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT * FROM products
             WHERE available_for_sale = 1 AND stock > 0
               AND instr(lower(compatible_machines), lower(?)) > 0
             ORDER BY name",
        )
        .bind(machine_name.trim())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(product_from_row).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use {super::*, crate::types::DoseInfo};

    pub(crate) async fn memory_catalog() -> SqliteCatalog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteCatalog::init(pool).await.unwrap()
    }

    pub(crate) fn machine(name: &str, price: f64, stock: i64, supported: &str) -> Machine {
        Machine {
            name: name.into(),
            available_for_rent: true,
            stock,
            supported_products: supported.into(),
            rental_price: price,
            description: Some(format!("{name} description")),
            ..Default::default()
        }
    }

    pub(crate) fn product(name: &str, category: ProductCategory, machines: &str) -> Product {
        Product {
            name: name.into(),
            price: 49.9,
            compatible_machines: machines.into(),
            category,
            dosage: Dosage::default(),
            description: None,
            image: None,
            available_for_sale: true,
            stock: 10,
        }
    }

    #[tokio::test]
    async fn upsert_returns_previous_and_replaces() {
        let store = memory_catalog().await;
        assert!(store
            .upsert_machine(&machine("Rubi", 450.0, 3, "café"))
            .await
            .unwrap()
            .is_none());

        let previous = store
            .upsert_machine(&machine("Rubi", 399.0, 2, "café, cappuccino"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(previous.rental_price, 450.0);

        let stored = store.list_machines().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rental_price, 399.0);
    }

    #[tokio::test]
    async fn find_machine_ignores_case() {
        let store = memory_catalog().await;
        store
            .upsert_machine(&machine("Onix", 300.0, 1, "café"))
            .await
            .unwrap();
        let found = store.find_machine("ONIX").await.unwrap().unwrap();
        assert_eq!(found.name, "Onix");
        assert!(store.find_machine("Jade").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn available_machines_filters_and_sorts() {
        let store = memory_catalog().await;
        store.upsert_machine(&machine("Rubi", 450.0, 3, "Café, Cappuccino, Chocolate")).await.unwrap();
        store.upsert_machine(&machine("Onix", 300.0, 1, "Café espresso")).await.unwrap();
        store.upsert_machine(&machine("Jade", 200.0, 0, "Café")).await.unwrap();
        let mut hidden = machine("Quartzo", 100.0, 5, "Café");
        hidden.available_for_rent = false;
        store.upsert_machine(&hidden).await.unwrap();

        let all = store.available_machines(&MachineFilter::default()).await.unwrap();
        let names: Vec<_> = all.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Onix", "Rubi"]);

        let cheap = store
            .available_machines(&MachineFilter {
                max_price: Some(350.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cheap.len(), 1);
        assert_eq!(cheap[0].name, "Onix");

        let chocolate = store
            .available_machines(&MachineFilter {
                beverages: vec!["CHOCOLATE".into()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(chocolate.len(), 1);
        assert_eq!(chocolate[0].name, "Rubi");
    }

    #[tokio::test]
    async fn products_for_machine_matches_compatibility_list() {
        let store = memory_catalog().await;
        let mut espresso = product("Espresso Gourmet", ProductCategory::Coffee, "Rubi, Onix");
        espresso.dosage.ml80 = Some(DoseInfo {
            grams: Some(8.0),
            doses: Some(125.0),
            price_per_dose: Some(0.4),
        });
        store.upsert_product(&espresso).await.unwrap();
        store
            .upsert_product(&product("Chocolate 1kg", ProductCategory::Chocolate, "rubi"))
            .await
            .unwrap();
        store
            .upsert_product(&product("Chá Mate", ProductCategory::Tea, "Jade"))
            .await
            .unwrap();
        let mut out_of_stock = product("Leite", ProductCategory::Milk, "Rubi");
        out_of_stock.stock = 0;
        store.upsert_product(&out_of_stock).await.unwrap();

        let products = store.products_for_machine("Rubi").await.unwrap();
        let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Chocolate 1kg", "Espresso Gourmet"]);
        assert_eq!(products[1].dosage, espresso.dosage);
    }

    #[tokio::test]
    async fn catalog_is_usable_through_trait_object() {
        let store: Box<dyn CatalogStore> = Box::new(memory_catalog().await);
        store.upsert_machine(&machine("Jade", 250.0, 1, "Café")).await.unwrap();
        let names: Vec<_> = store
            .list_machines()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Jade".to_string()]);
    }
}
