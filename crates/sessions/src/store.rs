//! Customer and conversation persistence.

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
    tracing::{debug, info},
};

use barista_common::{types::MediaKind, unix_now};

use crate::types::{
    ConversationMessage, Customer, DeletionSummary, LeadStatus, PaymentMethod, Role,
};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the customer, creating a `LEAD` record on first contact.
    async fn find_or_create(&self, number: &str, push_name: Option<&str>) -> Result<Customer>;

    async fn get(&self, number: &str) -> Result<Option<Customer>>;

    /// Persist every mutable customer field.
    async fn save(&self, customer: &Customer) -> Result<()>;

    /// Append to the conversation log and bump `last_interaction`.
    async fn append_message(
        &self,
        number: &str,
        role: Role,
        content: &str,
        media_kind: MediaKind,
    ) -> Result<()>;

    /// Up to `limit` latest messages, oldest first.
    async fn recent_messages(&self, number: &str, limit: u32) -> Result<Vec<ConversationMessage>>;

    async fn message_count(&self, number: &str) -> Result<i64>;

    /// Remove the customer and their conversation log.
    async fn delete_customer_data(&self, number: &str) -> Result<DeletionSummary>;
}

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run session migrations; versions owned by other crates are ignored.
    pub async fn init(pool: SqlitePool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .context("failed to run session migrations")?;
        Ok(Self::new(pool))
    }
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer> {
    let status: String = row.try_get("status")?;
    let payment: Option<String> = row.try_get("payment_method")?;
    let interested: String = row.try_get("interested_machines")?;
    Ok(Customer {
        whatsapp_number: row.try_get("whatsapp_number")?,
        name: row.try_get("name")?,
        status: LeadStatus::parse(&status),
        cep: row.try_get("cep")?,
        business_type: row.try_get("business_type")?,
        payment_method: payment.as_deref().and_then(PaymentMethod::parse),
        interested_machines: serde_json::from_str(&interested).unwrap_or_default(),
        welcome_sent: row.try_get("welcome_sent")?,
        created_at: row.try_get("created_at")?,
        last_interaction: row.try_get("last_interaction")?,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn find_or_create(&self, number: &str, push_name: Option<&str>) -> Result<Customer> {
        if let Some(existing) = self.get(number).await? {
            return Ok(existing);
        }

        let name = push_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| Customer::default_name(number));
        let now = unix_now();

        sqlx::query(
            "INSERT INTO customers (whatsapp_number, name, created_at, last_interaction)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(whatsapp_number) DO NOTHING",
        )
        .bind(number)
        .bind(&name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("create customer {number}"))?;

        info!(customer_id = number, name = %name, "new lead");
        self.get(number)
            .await?
            .with_context(|| format!("customer {number} missing after insert"))
    }

    async fn get(&self, number: &str) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT * FROM customers WHERE whatsapp_number = ?")
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn save(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            "UPDATE customers SET
                name = ?, status = ?, cep = ?, business_type = ?, payment_method = ?,
                interested_machines = ?, welcome_sent = ?, last_interaction = ?
             WHERE whatsapp_number = ?",
        )
        .bind(&customer.name)
        .bind(customer.status.as_str())
        .bind(&customer.cep)
        .bind(&customer.business_type)
        .bind(customer.payment_method.map(|p| p.as_str()))
        .bind(serde_json::to_string(&customer.interested_machines)?)
        .bind(customer.welcome_sent)
        .bind(customer.last_interaction)
        .bind(&customer.whatsapp_number)
        .execute(&self.pool)
        .await
        .with_context(|| format!("save customer {}", customer.whatsapp_number))?;
        Ok(())
    }

    async fn append_message(
        &self,
        number: &str,
        role: Role,
        content: &str,
        media_kind: MediaKind,
    ) -> Result<()> {
        let now = unix_now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO messages (whatsapp_number, role, content, media_kind, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(number)
        .bind(role.as_str())
        .bind(content)
        .bind(media_kind.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE customers SET last_interaction = ? WHERE whatsapp_number = ?")
            .bind(now)
            .bind(number)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(customer_id = number, role = role.as_str(), "message recorded");
        Ok(())
    }

    async fn recent_messages(&self, number: &str, limit: u32) -> Result<Vec<ConversationMessage>> {
        let rows = sqlx::query(
            "SELECT role, content, media_kind, created_at FROM messages
             WHERE whatsapp_number = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(number)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(|row| -> Result<ConversationMessage> {
                let role: String = row.try_get("role")?;
                let kind: String = row.try_get("media_kind")?;
                Ok(ConversationMessage {
                    role: if role == "assistant" {
                        Role::Assistant
                    } else {
                        Role::User
                    },
                    content: row.try_get("content")?,
                    media_kind: MediaKind::from_label(&kind),
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn message_count(&self, number: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE whatsapp_number = ?")
            .bind(number)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn delete_customer_data(&self, number: &str) -> Result<DeletionSummary> {
        let mut tx = self.pool.begin().await?;
        let conversations = sqlx::query("DELETE FROM messages WHERE whatsapp_number = ?")
            .bind(number)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let customer_records = sqlx::query("DELETE FROM customers WHERE whatsapp_number = ?")
            .bind(number)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        info!(customer_id = number, conversations, customer_records, "customer data deleted");
        Ok(DeletionSummary {
            conversations,
            customer_records,
        })
    }
}
