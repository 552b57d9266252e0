use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    serde_json::Value,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::{info, warn},
    tracing_subscriber::EnvFilter,
};

use {
    barista_agents::{LlmProvider, MediaUnderstanding, providers::OpenAiProvider},
    barista_auto_reply::{
        CoffeeAgent, DebounceSettings, Debouncer, HistoryOutbound, IntentClassifier,
        KeywordClassifier, LlmClassifier,
    },
    barista_catalog::{CatalogStore, IngestOutcome, SqliteCatalog, ingest},
    barista_channels::ChannelOutbound,
    barista_config::{BaristaConfig, IntentMode},
    barista_gateway::AppState,
    barista_sessions::{SessionStore, SqliteSessionStore},
    barista_whatsapp::EvolutionClient,
};

#[derive(Parser)]
#[command(name = "barista", about = "WhatsApp sales assistant for coffee machine rentals")]
struct Cli {
    /// Path to barista.toml.
    #[arg(long, global = true, env = "BARISTA_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server (default).
    Serve,
    /// Print the machine and product catalog.
    Catalog,
    /// Ingest spreadsheet rows from a JSON file (one object or an array).
    Ingest { file: PathBuf },
    /// Send a WhatsApp text through the Evolution API.
    SendTest { number: String, text: String },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,barista=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_pool(config: &BaristaConfig) -> anyhow::Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = barista_config::load_config(cli.config.as_deref())?;
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Catalog => print_catalog(&config).await,
        Command::Ingest { file } => ingest_file(&config, &file).await,
        Command::SendTest { number, text } => send_test(&config, &number, &text).await,
    }
}

async fn serve(config: BaristaConfig) -> anyhow::Result<()> {
    if !config.evolution.is_configured() {
        anyhow::bail!("evolution.api_url and evolution.instance must be set");
    }

    let pool = open_pool(&config).await?;
    let catalog: Arc<dyn CatalogStore> = Arc::new(SqliteCatalog::init(pool.clone()).await?);
    let sessions: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::init(pool).await?);

    let evolution = Arc::new(EvolutionClient::new(config.evolution.clone()));
    if let Err(e) = evolution.init_instance().await {
        warn!(instance = evolution.instance(), error = %e, "instance init failed, sends will retry");
    }
    let outbound: Arc<dyn ChannelOutbound> = evolution;

    let openai = OpenAiProvider::from_config(&config.openai).map(Arc::new);
    if openai.is_none() {
        warn!("no OpenAI key configured: canned replies only, audio is rejected");
    }

    let classifier: Arc<dyn IntentClassifier> = match (config.agent.intent_mode, &openai) {
        (IntentMode::Llm, Some(provider)) => Arc::new(LlmClassifier::new(
            Arc::clone(provider) as Arc<dyn LlmProvider>
        )),
        (IntentMode::Llm, None) => {
            warn!("intent_mode = llm needs an OpenAI key, using keywords");
            Arc::new(KeywordClassifier)
        },
        (IntentMode::Keywords, _) => Arc::new(KeywordClassifier),
    };

    let mut agent = CoffeeAgent::new(
        Arc::clone(&sessions),
        Arc::clone(&catalog),
        Arc::clone(&outbound),
        classifier,
        config.agent.clone(),
    );
    if let Some(provider) = &openai {
        agent = agent.with_llm(Arc::clone(provider) as Arc<dyn LlmProvider>);
    }

    let fallback = Arc::new(HistoryOutbound::new(outbound, Arc::clone(&sessions)));
    let debouncer = Debouncer::new(
        DebounceSettings::new(&config.debounce, config.agent.fallback_message.clone()),
        Arc::new(agent),
        fallback,
    );

    info!(
        quiet_window_ms = config.debounce.quiet_window_ms,
        intent_mode = ?config.agent.intent_mode,
        "starting barista"
    );
    let state = AppState {
        debouncer,
        sessions,
        catalog,
        media: openai.map(|p| p as Arc<dyn MediaUnderstanding>),
    };
    barista_gateway::serve(state, &config.server.addr()).await
}

async fn print_catalog(config: &BaristaConfig) -> anyhow::Result<()> {
    let catalog = SqliteCatalog::init(open_pool(config).await?).await?;

    let machines = catalog.list_machines().await?;
    println!("Máquinas ({}):", machines.len());
    for m in &machines {
        println!(
            "  {:<20} R$ {:>9.2}/mês  estoque {:>3}  {}",
            m.name,
            m.rental_price,
            m.stock,
            if m.is_rentable() { "disponível" } else { "indisponível" }
        );
    }

    let products = catalog.list_products().await?;
    println!("Produtos ({}):", products.len());
    for p in &products {
        println!(
            "  {:<30} {:<12} R$ {:>8.2}  máquinas: {}",
            p.name,
            p.category.as_str(),
            p.price,
            p.compatible_machines
        );
    }
    Ok(())
}

/// Split a JSON document into spreadsheet rows.
fn rows_from_json(value: Value) -> anyhow::Result<Vec<ingest::Row>> {
    match value {
        Value::Object(row) => Ok(vec![row]),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(row) => Ok(row),
                _ => anyhow::bail!("item {i} is not a JSON object"),
            })
            .collect(),
        _ => anyhow::bail!("expected a JSON object or an array of objects"),
    }
}

async fn ingest_file(config: &BaristaConfig, file: &std::path::Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", file.display()))?;
    let rows = rows_from_json(value)?;

    let catalog = SqliteCatalog::init(open_pool(config).await?).await?;
    let mut failed = 0usize;
    for (i, row) in rows.iter().enumerate() {
        match ingest::ingest_row(&catalog, row).await {
            Ok(report) => {
                let what = match &report.outcome {
                    IngestOutcome::Machine { name, created, .. }
                    | IngestOutcome::Product { name, created, .. } => {
                        format!("{} {name}", if *created { "created" } else { "updated" })
                    },
                    IngestOutcome::Ignored => "ignored".to_string(),
                };
                println!("row {i}: [{}] {what}", report.sheet);
            },
            Err(e) => {
                failed += 1;
                println!("row {i}: error: {e}");
            },
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} rows failed", rows.len());
    }
    Ok(())
}

async fn send_test(config: &BaristaConfig, number: &str, text: &str) -> anyhow::Result<()> {
    if !config.evolution.is_configured() {
        anyhow::bail!("evolution.api_url and evolution.instance must be set");
    }
    let client = EvolutionClient::new(config.evolution.clone());
    client.send_text(number, text).await?;
    println!("sent to {number}");
    Ok(())
}
