use api_key_governor::cli::{self, Cli, Command};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate(args) => cli::migrate::run(args).await,
        Command::Create(args) => cli::keys::create(args).await,
        Command::Rotate(args) => cli::keys::rotate(args).await,
        Command::Revoke(args) => cli::keys::revoke(args).await,
        Command::List(args) => cli::keys::list(args).await,
        Command::Chain(args) => cli::keys::chain(args).await,
        Command::Inspect(args) => cli::policy::inspect(args).await,
        Command::Check(args) => cli::policy::check(args).await,
    }
}
