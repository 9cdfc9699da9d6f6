//! Cactus CLI - drive the session lifecycle from a terminal.

mod commands;
mod output;

use cactus_auth::ExternalIdentity;
use cactus_components::{ComponentDraft, Publicity};
use clap::{Parser, Subcommand, ValueEnum};
use commands::GlobalOptions;

/// Cactus CLI - sign in, sync component collections and manage subscriptions.
#[derive(Parser)]
#[command(name = "cactus")]
#[command(about = "Cactus CLI for authentication and synced components")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CACTUS_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    /// Treat the backend as unreachable and open the local store
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password (registers on first use)
    Login {
        /// Email address; prompted for when omitted
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Login with a Sign in with Apple identity token
    LoginApple {
        /// Identity token issued by the provider
        #[arg(long, env = "CACTUS_IDENTITY_TOKEN")]
        token: String,
        /// Email shared by the provider
        #[arg(long)]
        email: Option<String>,
        /// Given name shared by the provider
        #[arg(long)]
        given_name: Option<String>,
        /// Family name shared by the provider
        #[arg(long)]
        family_name: Option<String>,
    },

    /// Logout and clear session
    Logout,

    /// Check authentication status
    Status,

    /// Follow authentication state and network reachability
    Watch,

    /// Manage subscriptions on a synced collection
    Subscriptions {
        #[command(subcommand)]
        command: SubscriptionCommands,
    },

    /// Browse and publish components
    Components {
        #[command(subcommand)]
        command: ComponentCommands,
    },
}

#[derive(Subcommand)]
enum SubscriptionCommands {
    /// List subscriptions
    List {
        /// Collection name (defaults to components)
        #[arg(short, long)]
        collection: Option<String>,
    },
    /// Add subscriptions
    Add {
        #[arg(short, long)]
        collection: Option<String>,
        /// Subscription name; generated when omitted
        #[arg(short, long)]
        name: Option<String>,
        /// Filter as JSON; repeat to add several in one update
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Equality term `field=value`; repeated terms are joined with AND
        #[arg(long = "eq")]
        equals: Vec<String>,
    },
    /// Remove a subscription by name
    Remove {
        #[arg(short, long)]
        collection: Option<String>,
        /// Subscription name
        name: String,
    },
    /// Remove subscriptions whose name contains a pattern
    RemoveMatching {
        #[arg(short, long)]
        collection: Option<String>,
        /// Substring to match
        pattern: String,
    },
    /// Remove every subscription except the base one
    Clear {
        #[arg(short, long)]
        collection: Option<String>,
    },
}

#[derive(Subcommand)]
enum ComponentCommands {
    /// List components
    List {
        /// Filter as JSON
        #[arg(long)]
        filter: Option<String>,
        /// Equality term `field=value`
        #[arg(long = "eq")]
        equals: Vec<String>,
        /// Show detailed previews
        #[arg(short = 'x', long)]
        expanded: bool,
    },
    /// Publish a component
    Publish {
        #[arg(long)]
        name: String,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        author: String,
        /// Registry key of the implementation
        #[arg(long)]
        class_name: String,
        #[arg(long, value_enum, default_value = "public")]
        publicity: PublicityArg,
    },
    /// Preview registered components
    Preview {
        /// Registry key; all when omitted
        key: Option<String>,
        #[arg(short = 'x', long)]
        expanded: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PublicityArg {
    Public,
    Private,
}

impl From<PublicityArg> for Publicity {
    fn from(arg: PublicityArg) -> Self {
        match arg {
            PublicityArg::Public => Publicity::PublicComponent,
            PublicityArg::Private => Publicity::PrivateComponent,
        }
    }
}

async fn run_subscriptions(
    command: SubscriptionCommands,
    options: GlobalOptions,
    format: &output::OutputFormat,
) -> anyhow::Result<()> {
    match command {
        SubscriptionCommands::List { collection } => {
            commands::subscriptions_list(collection.as_deref(), options, format).await
        }
        SubscriptionCommands::Add {
            collection,
            name,
            filters,
            equals,
        } => {
            let filters = if filters.is_empty() {
                vec![commands::parse_filter(None, &equals)?]
            } else {
                if !equals.is_empty() {
                    anyhow::bail!("--filter and --eq cannot be combined");
                }
                filters
                    .iter()
                    .map(|json| commands::parse_filter(Some(json), &[]))
                    .collect::<anyhow::Result<Vec<_>>>()?
            };
            commands::subscriptions_add(
                collection.as_deref(),
                name.as_deref(),
                filters,
                options,
                format,
            )
            .await
        }
        SubscriptionCommands::Remove { collection, name } => {
            commands::subscriptions_remove(collection.as_deref(), &name, options, format).await
        }
        SubscriptionCommands::RemoveMatching {
            collection,
            pattern,
        } => {
            commands::subscriptions_remove_matching(collection.as_deref(), &pattern, options, format)
                .await
        }
        SubscriptionCommands::Clear { collection } => {
            commands::subscriptions_clear(collection.as_deref(), options, format).await
        }
    }
}

async fn run_components(
    command: ComponentCommands,
    options: GlobalOptions,
    format: &output::OutputFormat,
) -> anyhow::Result<()> {
    match command {
        ComponentCommands::List {
            filter,
            equals,
            expanded,
        } => {
            let filter = commands::parse_filter(filter.as_deref(), &equals)?;
            commands::components_list(filter, expanded, options, format).await
        }
        ComponentCommands::Publish {
            name,
            summary,
            author,
            class_name,
            publicity,
        } => {
            let draft = ComponentDraft {
                name,
                summary,
                author,
                class_name,
                publicity: publicity.into(),
            };
            commands::components_publish(draft, options, format).await
        }
        ComponentCommands::Preview { key, expanded } => {
            commands::components_preview(key.as_deref(), expanded, format)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    cactus_config::init_logging_for_service("cli", &cli.log_level);

    let options = GlobalOptions {
        offline: cli.offline,
    };
    let format = cli.format;

    let result = match cli.command {
        Commands::Login { email } => commands::login(email, options, &format).await,
        Commands::LoginApple {
            token,
            email,
            given_name,
            family_name,
        } => {
            let identity = ExternalIdentity {
                email,
                given_name,
                family_name,
                identity_token: Some(token),
            };
            commands::login_apple(identity, options, &format).await
        }
        Commands::Logout => commands::logout(options, &format).await,
        Commands::Status => commands::status(options, &format).await,
        Commands::Watch => commands::watch(options, &format).await,
        Commands::Subscriptions { command } => run_subscriptions(command, options, &format).await,
        Commands::Components { command } => run_components(command, options, &format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}
