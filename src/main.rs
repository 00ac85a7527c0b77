use clap::{Parser, Subcommand};

use gatehouse_agent::run::{run_bridge, RunOptions};

#[derive(Parser)]
#[command(name = "gatehouse", about = "Human-in-the-loop control plane for delegated agent tool use")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hub server
    Hub,

    /// Run the agent bridge: executor stream on stdin, items on stdout
    Run {
        /// Conversation the stream belongs to
        #[arg(long)]
        conversation: String,

        /// Project scope for permission rules
        #[arg(long)]
        project: String,

        /// Executor session id, if already known
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is the bridge's data channel, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Hub => gatehouse_hub::run_hub().await,
        Commands::Run {
            conversation,
            project,
            session,
        } => {
            run_bridge(RunOptions {
                conversation_id: conversation,
                project_id: project,
                session_id: session,
            })
            .await
        }
    }
}
