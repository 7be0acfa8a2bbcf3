use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod article;
mod catalog;
mod completion;
mod export;
mod models;
mod prompts;
mod server;
mod session;
mod settings;
mod storage;
mod wizard;

use crate::catalog::Catalog;
use crate::completion::CompletionClient;
use crate::export::{BatchProgress, Download};
use crate::models::{LanguageModel, OpenAICompatible};
use crate::session::Session;
use crate::settings::{AppConfig, GenerationMode, GenerationPolicies, RequestOverrides};
use crate::storage::InMemorySessionRepository;
use crate::wizard::{AdvancedOptions, ArticleConfiguration, PointOfView, SectionFlags, Tone, UserInputForm, WizardInput};

#[derive(Debug, Parser)]
#[command(name = "article_generator")]
#[command(about = "Article wizard backed by a chat-completion service", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the wizard over HTTP
    Start {
        #[arg(long)]
        listen: Option<String>,
    },
    /// Generate articles without the wizard UI
    Generate {
        /// Target keyword; repeat for a batch
        #[arg(long = "keyword", short = 'k', required = true)]
        keywords: Vec<String>,
        #[arg(long, default_value = catalog::DEFAULT_COUNTRY)]
        country: String,
        #[arg(long, default_value = catalog::DEFAULT_LANGUAGE)]
        language: String,
        #[arg(long, value_enum, default_value_t = Tone::SeoOptimized)]
        tone: Tone,
        #[arg(long, value_enum, default_value_t = PointOfView::FirstPersonSingular)]
        point_of_view: PointOfView,
        #[arg(long)]
        faq: bool,
        #[arg(long)]
        youtube: bool,
        #[arg(long)]
        meta_description: bool,
        #[arg(long)]
        featured_image: bool,
        #[arg(long)]
        secondary_keywords: Option<String>,
        #[arg(long)]
        min_word_count: Option<u32>,
        /// Ask for the whole article in one request
        #[arg(long)]
        combined: bool,
        #[arg(long)]
        model: Option<String>,
        /// Directory for the .txt or .zip output
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Print the country list the wizard offers
    Countries {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Start { listen } => {
            let listen = listen
                .or_else(|| config.listen.clone())
                .unwrap_or_else(|| "127.0.0.1:7171".to_string());
            let addr: SocketAddr = listen.parse().with_context(|| format!("invalid listen address {}", listen))?;
            let metrics = PrometheusBuilder::new().install_recorder()?;
            let state = server::AppState {
                sessions: Arc::new(InMemorySessionRepository::new()),
                model: completion_model(&config),
                catalog: Arc::new(Catalog::load_or_default(&config.countries_csv())?),
                defaults: Arc::new(config.defaults.clone()),
                archive_dir: config.archive_dir(),
                metrics: Some(metrics),
            };
            server::serve(addr, state).await?;
        }
        Commands::Generate {
            keywords,
            country,
            language,
            tone,
            point_of_view,
            faq,
            youtube,
            meta_description,
            featured_image,
            secondary_keywords,
            min_word_count,
            combined,
            model,
            out,
        } => {
            let mut session = Session::new(None, Default::default());
            let batch = keywords.len() > 1;
            session.wizard.advance(WizardInput::UserInput(UserInputForm {
                target_keyword: keywords.join("\n"),
                country,
                language,
                batch,
            }))?;
            session.wizard.advance(WizardInput::Configure(ArticleConfiguration {
                tone_of_voice: tone,
                point_of_view,
                sections: SectionFlags { faq, youtube, meta_description, featured_image },
                advanced: Some(AdvancedOptions {
                    keywords: secondary_keywords.unwrap_or_default(),
                    min_word_count,
                    ..Default::default()
                }),
            }))?;

            let overrides = RequestOverrides {
                model,
                generation: combined.then(|| GenerationPolicies {
                    mode: Some(GenerationMode::Combined),
                    ..Default::default()
                }),
                ..Default::default()
            };
            let effective = settings::resolve_effective_settings(&config.defaults, &session.settings, &overrides);
            let client = CompletionClient::new(completion_model(&config), &effective);
            let mut on_progress = |p: &BatchProgress| {
                info!(
                    "[{}/{}] {}: {} ({}/{})",
                    p.keyword_index, p.keyword_total, p.keyword, p.section, p.step, p.total_steps
                );
            };
            export::generate_for_session(&mut session, &client, &effective, &mut on_progress).await?;

            match export::prepare_download(&mut session, &out)? {
                Download::Text { filename, body } => {
                    std::fs::create_dir_all(&out)?;
                    let path = out.join(filename);
                    std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
                    println!("{}", path.display());
                }
                Download::Archive { path, .. } => println!("{}", path.display()),
            }
        }
        Commands::Countries { csv } => {
            let path = csv.unwrap_or_else(|| config.countries_csv());
            let catalog = Catalog::load_or_default(&path)?;
            for country in catalog.countries {
                println!("{}", country);
            }
        }
    }
    Ok(())
}

fn completion_model(config: &AppConfig) -> Arc<dyn LanguageModel> {
    let model = OpenAICompatible::from_env(Duration::from_secs(config.request_timeout_secs()));
    if model.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; requests will be sent without credentials");
    }
    Arc::new(model)
}
