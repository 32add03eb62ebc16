//! advisor CLI: tiered configuration recommender over a workflow graph.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use serde::Deserialize;

use intent_advisor::config::AdvisorConfig;
use intent_advisor::query::Dimension;
use intent_advisor::registrar::{Registrar, WorkflowRecord};
use intent_advisor::resolve::{Outcome, Recommendation, Resolver};
use intent_advisor::store::FactStore;

#[derive(Parser)]
#[command(
    name = "advisor",
    version,
    about = "Recommend analytics configurations from workflow history"
)]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/intent-advisor/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log tier walks and store calls to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend a full configuration for a user on one or more datasets.
    Recommend {
        #[arg(long)]
        user: String,

        /// Dataset name; repeat to recommend for several datasets at once.
        #[arg(long, required = true)]
        dataset: Vec<String>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Resolve a single dimension and show which tier answered.
    Resolve {
        dimension: DimensionArg,

        #[arg(long)]
        user: String,

        #[arg(long)]
        dataset: String,

        /// Intent to condition on (required for everything but `intent`).
        #[arg(long)]
        intent: Option<String>,
    },

    /// Manage users.
    Users {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage datasets.
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },

    /// Record completed workflows.
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// List all users and the next id to allocate.
    List,
    /// Register a new user.
    Add {
        #[arg(long)]
        email: String,
    },
    /// Look up a user by email.
    Find {
        #[arg(long)]
        email: String,
    },
    /// List users that have run at least one workflow.
    Active,
}

#[derive(Subcommand)]
enum DatasetAction {
    /// Register a dataset.
    Add { name: String },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Record workflows from a JSON file (one record or an array).
    Add {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DimensionArg {
    Intent,
    Metric,
    Algorithm,
    PreprocessingAlgorithm,
    PreprocessingFlag,
}

impl From<DimensionArg> for Dimension {
    fn from(arg: DimensionArg) -> Self {
        match arg {
            DimensionArg::Intent => Dimension::Intent,
            DimensionArg::Metric => Dimension::Metric,
            DimensionArg::Algorithm => Dimension::Algorithm,
            DimensionArg::PreprocessingAlgorithm => Dimension::PreprocessingAlgorithm,
            DimensionArg::PreprocessingFlag => Dimension::PreprocessingFlag,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkflowFile {
    One(WorkflowRecord),
    Many(Vec<WorkflowRecord>),
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = AdvisorConfig::load_or_default(cli.config.as_deref())?;
    let vocab = config.vocabulary()?;
    let store: Arc<dyn FactStore> = config.open_store()?;

    match cli.command {
        Commands::Recommend {
            user,
            dataset,
            json,
        } => {
            let resolver = Resolver::new(store, vocab);
            let recommendations = if dataset.len() == 1 {
                vec![resolver.recommend(&user, &dataset[0])?]
            } else {
                let requests: Vec<(String, String)> = dataset
                    .into_iter()
                    .map(|d| (user.clone(), d))
                    .collect();
                resolver
                    .recommend_batch(&requests)
                    .into_iter()
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            if json {
                let out = if recommendations.len() == 1 {
                    serde_json::to_string_pretty(&recommendations[0])
                } else {
                    serde_json::to_string_pretty(&recommendations)
                };
                println!("{}", out.into_diagnostic()?);
            } else {
                for rec in &recommendations {
                    print_recommendation(rec);
                }
            }
        }

        Commands::Resolve {
            dimension,
            user,
            dataset,
            intent,
        } => {
            let dimension = Dimension::from(dimension);
            let resolver = Resolver::new(store, vocab);
            match resolver.resolve(dimension, &user, &dataset, intent.as_deref())? {
                Outcome::Found {
                    tier,
                    filter,
                    value,
                } => {
                    println!("{dimension}: {value}");
                    println!("  tier:   {tier}");
                    println!("  filter: {filter}");
                }
                Outcome::Exhausted => {
                    println!("{dimension}: no history at any tier");
                }
            }
        }

        Commands::Users { action } => {
            let registrar = Registrar::new(store, vocab)
                .with_max_attempts(config.registrar.max_allocation_attempts);

            match action {
                UserAction::List => {
                    let listing = registrar.list_users()?;
                    if listing.users.is_empty() {
                        println!("No users registered.");
                    } else {
                        println!("Users ({}):", listing.users.len());
                        for user in &listing.users {
                            println!("  {user}");
                        }
                    }
                    println!("Next id: {}", listing.next_id);
                }
                UserAction::Add { email } => {
                    let id = registrar.register_user(&email)?;
                    println!("Registered {id} <{email}>");
                }
                UserAction::Find { email } => match registrar.find_user_by_email(&email)? {
                    Some(user) => println!("{user}"),
                    None => miette::bail!("no user registered with email {email}"),
                },
                UserAction::Active => {
                    let users = registrar.users_with_workflows()?;
                    if users.is_empty() {
                        println!("No workflows recorded.");
                    } else {
                        println!("Users with workflows ({}):", users.len());
                        for user in &users {
                            println!("  {user}");
                        }
                    }
                }
            }
        }

        Commands::Dataset { action } => {
            let registrar = Registrar::new(store, vocab);
            match action {
                DatasetAction::Add { name } => match registrar.register_dataset(&name)? {
                    Some(dataset) => println!("Registered dataset {dataset}"),
                    None => miette::bail!("the store declined dataset {name}"),
                },
            }
        }

        Commands::Workflow { action } => {
            let registrar = Registrar::new(store, vocab);
            match action {
                WorkflowAction::Add { file } => {
                    let content = std::fs::read_to_string(&file).into_diagnostic()?;
                    let records = match serde_json::from_str(&content).into_diagnostic()? {
                        WorkflowFile::One(record) => vec![record],
                        WorkflowFile::Many(records) => records,
                    };

                    let mut recorded = 0;
                    for record in &records {
                        match registrar.register_workflow(record)? {
                            Some(name) => {
                                println!("  {name} ({} on {})", record.user, record.dataset);
                                recorded += 1;
                            }
                            None => println!(
                                "  declined ({} on {})",
                                record.user, record.dataset
                            ),
                        }
                    }
                    println!(
                        "Recorded {recorded} of {} workflow(s) from {}",
                        records.len(),
                        file.display()
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_recommendation(rec: &Recommendation) {
    println!("Recommendation for {} on {}:", rec.user, rec.dataset);
    println!("  intent:        {}", rec.intent);
    println!("  metric:        {}", rec.metric);
    println!(
        "  algorithm:     {}",
        rec.algorithm.as_deref().unwrap_or("(none)")
    );
    println!("  preprocessing: {}", rec.preprocessing);
    if let Some(algorithm) = &rec.preprocessing_algorithm {
        println!("    algorithm:   {algorithm}");
    }
}
