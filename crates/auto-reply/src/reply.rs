//! The sales agent: turns one coalesced batch into replies.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use metrics::counter;

use {
    barista_agents::{ChatMessage, LlmProvider},
    barista_catalog::{CatalogStore, Machine, MachineFilter},
    barista_channels::ChannelOutbound,
    barista_common::{
        types::{MediaKind, ReplyPayload},
        unix_now,
    },
    barista_config::AgentConfig,
    barista_sessions::{Customer, Role, SessionStore},
};

use crate::{
    debounce::BatchHandler,
    error::{Error, Result},
    format,
    intent::{Intent, IntentClassifier, IntentContext},
    lead,
};

/// What a reply pass decided to do.
enum Outcome {
    Reply(Vec<ReplyPayload>),
    /// Customer data is gone; nothing else may be written.
    Deleted,
}

/// Per-customer lock; held for a whole reply pass.
type Turn = Arc<tokio::sync::Mutex<()>>;

pub struct CoffeeAgent {
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn CatalogStore>,
    outbound: Arc<dyn ChannelOutbound>,
    classifier: Arc<dyn IntentClassifier>,
    llm: Option<Arc<dyn LlmProvider>>,
    config: AgentConfig,
    /// Passes for one customer run one at a time: each loads the profile,
    /// edits it and saves it whole.
    turns: Mutex<HashMap<String, Turn>>,
}

impl CoffeeAgent {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn CatalogStore>,
        outbound: Arc<dyn ChannelOutbound>,
        classifier: Arc<dyn IntentClassifier>,
        config: AgentConfig,
    ) -> Self {
        Self {
            sessions,
            catalog,
            outbound,
            classifier,
            llm: None,
            config,
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// Use an LLM for general questions instead of the canned reply.
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Run one reply pass for a coalesced batch.
    ///
    /// A batch that arrives while another pass for the same customer is in
    /// flight waits for it, so it sees the profile that pass saved.
    pub async fn process(&self, customer_id: &str, text: &str) -> Result<Intent> {
        let turn = self.turn(customer_id);
        let result = {
            let _guard = turn.lock().await;
            self.process_exclusive(customer_id, text).await
        };
        self.release_turn(customer_id, turn);
        result
    }

    fn lock_turns(&self) -> std::sync::MutexGuard<'_, HashMap<String, Turn>> {
        self.turns
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn turn(&self, customer_id: &str) -> Turn {
        Arc::clone(self.lock_turns().entry(customer_id.to_string()).or_default())
    }

    /// Drop the table entry once no other pass holds or awaits it.
    fn release_turn(&self, customer_id: &str, turn: Turn) {
        let mut turns = self.lock_turns();
        drop(turn);
        if turns
            .get(customer_id)
            .is_some_and(|t| Arc::strong_count(t) == 1)
        {
            turns.remove(customer_id);
        }
    }

    async fn process_exclusive(&self, customer_id: &str, text: &str) -> Result<Intent> {
        let mut customer = self
            .sessions
            .find_or_create(customer_id, None)
            .await
            .map_err(Error::Sessions)?;

        let ctx = IntentContext {
            welcome_sent: customer.welcome_sent,
            business_type_known: customer.business_type.is_some(),
        };
        let intent = self.classifier.classify(text, ctx).await;
        info!(customer_id, %intent, status = customer.status.as_str(), "handling batch");
        #[cfg(feature = "metrics")]
        counter!("intents_total", "intent" => intent.as_str()).increment(1);

        if intent != Intent::DeleteData {
            lead::capture_profile(&mut customer, text);
        }

        let replies = match self.respond(intent, &mut customer, text).await? {
            Outcome::Reply(replies) => replies,
            Outcome::Deleted => return Ok(intent),
        };

        for reply in &replies {
            self.outbound
                .deliver(customer_id, reply)
                .await
                .map_err(|error| Error::Delivery {
                    customer_id: customer_id.to_string(),
                    error,
                })?;
            let kind = if reply.media.is_some() {
                MediaKind::Image
            } else {
                MediaKind::Text
            };
            self.sessions
                .append_message(customer_id, Role::Assistant, &reply.text, kind)
                .await
                .map_err(Error::Sessions)?;
        }

        lead::advance(&mut customer, text);
        self.note_machine_interest(&mut customer, text).await?;
        customer.last_interaction = unix_now();
        self.sessions.save(&customer).await.map_err(Error::Sessions)?;
        debug!(customer_id, replies = replies.len(), status = customer.status.as_str(), "batch done");
        Ok(intent)
    }

    async fn respond(&self, intent: Intent, customer: &mut Customer, text: &str) -> Result<Outcome> {
        let replies = match intent {
            Intent::Greeting => {
                customer.welcome_sent = true;
                vec![ReplyPayload::text(format::welcome(&self.config.company))]
            },
            Intent::ProvideCep => match (&customer.cep, &customer.business_type) {
                (Some(_), Some(business)) => self.recommend(business).await?,
                (Some(cep), None) => vec![ReplyPayload::text(format::cep_received(cep))],
                (None, _) => vec![ReplyPayload::text(format::general(customer))],
            },
            Intent::ProvideBusinessType => match &customer.business_type {
                Some(business) => self.recommend(business).await?,
                None => vec![ReplyPayload::text(format::general(customer))],
            },
            Intent::MachineInterest => self.machine_details(text).await?,
            Intent::PricingInquiry => {
                let machines = self.available().await?;
                if machines.is_empty() {
                    vec![ReplyPayload::text(format::NO_STOCK)]
                } else {
                    vec![ReplyPayload::text(format::pricing(&machines))]
                }
            },
            Intent::ContractInquiry => vec![ReplyPayload::text(format::contract_terms())],
            Intent::DeleteData => {
                let number = customer.whatsapp_number.clone();
                let summary = self
                    .sessions
                    .delete_customer_data(&number)
                    .await
                    .map_err(Error::Sessions)?;
                info!(
                    customer_id = %number,
                    conversations = summary.conversations,
                    customer_records = summary.customer_records,
                    "privacy deletion"
                );
                self.outbound
                    .send_text(&number, format::deletion_confirmation())
                    .await
                    .map_err(|error| Error::Delivery {
                        customer_id: number,
                        error,
                    })?;
                return Ok(Outcome::Deleted);
            },
            Intent::General => vec![ReplyPayload::text(self.general(customer).await?)],
        };
        Ok(Outcome::Reply(replies))
    }

    async fn available(&self) -> Result<Vec<Machine>> {
        self.catalog
            .available_machines(&MachineFilter::default())
            .await
            .map_err(Error::Catalog)
    }

    /// Cheapest rentable machine, introduced for the customer's business.
    async fn recommend(&self, business_type: &str) -> Result<Vec<ReplyPayload>> {
        let machines = self.available().await?;
        Ok(match machines.first() {
            Some(machine) => vec![
                ReplyPayload::text(format::business_type_received(business_type)),
                format::machine_card(machine),
            ],
            None => vec![ReplyPayload::text(format::NO_STOCK)],
        })
    }

    /// Card and compatible products for each machine named in `text`, or a
    /// recommendation when none is named.
    async fn machine_details(&self, text: &str) -> Result<Vec<ReplyPayload>> {
        let names = lead::mentioned_machines(text);
        if names.is_empty() {
            let machines = self.available().await?;
            return Ok(match machines.first() {
                Some(machine) => vec![format::machine_card(machine)],
                None => vec![ReplyPayload::text(format::NO_STOCK)],
            });
        }

        let mut replies = Vec::new();
        for name in names {
            let Some(machine) = self.catalog.find_machine(name).await.map_err(Error::Catalog)?
            else {
                replies.push(ReplyPayload::text(format::MACHINE_NOT_FOUND));
                continue;
            };
            replies.push(format::machine_card(&machine));
            let products = self
                .catalog
                .products_for_machine(&machine.name)
                .await
                .map_err(Error::Catalog)?;
            if !products.is_empty() {
                replies.push(ReplyPayload::text(format::product_list(&machine.name, &products)));
            }
        }
        Ok(replies)
    }

    async fn general(&self, customer: &Customer) -> Result<String> {
        let Some(llm) = &self.llm else {
            return Ok(format::general(customer));
        };

        let machines = self.available().await?;
        let products = self.catalog.list_products().await.map_err(Error::Catalog)?;
        let history = self
            .sessions
            .recent_messages(&customer.whatsapp_number, self.config.history_limit)
            .await
            .map_err(Error::Sessions)?;

        let mut messages = vec![ChatMessage::system(format::persona_prompt(
            &self.config.persona_name,
            &self.config.company,
            customer,
            &format::catalog_summary(&machines, &products),
        ))];
        messages.extend(history.into_iter().map(|m| match m.role {
            Role::User => ChatMessage::user(m.content),
            Role::Assistant => ChatMessage::assistant(m.content),
        }));

        match llm.complete(&messages).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!(
                    customer_id = %customer.whatsapp_number,
                    provider = llm.id(),
                    error = %e,
                    "llm reply failed, using canned reply"
                );
                Ok(format::general(customer))
            },
        }
    }

    /// Remember machines the customer named, if the catalog knows them.
    async fn note_machine_interest(&self, customer: &mut Customer, text: &str) -> Result<()> {
        for name in lead::mentioned_machines(text) {
            if let Some(machine) = self.catalog.find_machine(name).await.map_err(Error::Catalog)?
                && customer.note_interest(&machine.name)
            {
                debug!(customer_id = %customer.whatsapp_number, machine = %machine.name, "interest noted");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BatchHandler for CoffeeAgent {
    async fn handle(&self, customer_id: &str, text: &str) -> anyhow::Result<()> {
        self.process(customer_id, text).await?;
        Ok(())
    }
}

/// Outbound wrapper that records every sent message as an assistant turn.
///
/// Used for the debouncer's fallback path so apologies show up in history.
pub struct HistoryOutbound {
    inner: Arc<dyn ChannelOutbound>,
    sessions: Arc<dyn SessionStore>,
}

impl HistoryOutbound {
    pub fn new(inner: Arc<dyn ChannelOutbound>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { inner, sessions }
    }

    async fn record(&self, to: &str, text: &str, kind: MediaKind) {
        if let Err(e) = self
            .sessions
            .append_message(to, Role::Assistant, text, kind)
            .await
        {
            warn!(customer_id = to, error = %e, "failed to record sent message");
        }
    }
}

#[async_trait]
impl ChannelOutbound for HistoryOutbound {
    async fn send_text(&self, to: &str, text: &str) -> anyhow::Result<()> {
        self.inner.send_text(to, text).await?;
        self.record(to, text, MediaKind::Text).await;
        Ok(())
    }

    async fn send_media(&self, to: &str, payload: &ReplyPayload) -> anyhow::Result<()> {
        self.inner.send_media(to, payload).await?;
        let kind = if payload.media.is_some() {
            MediaKind::Image
        } else {
            MediaKind::Text
        };
        self.record(to, &payload.text, kind).await;
        Ok(())
    }
}
