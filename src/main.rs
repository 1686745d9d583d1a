use clap::Parser;
use signlink_lib::CliArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    signlink_lib::run(CliArgs::parse()).await
}
