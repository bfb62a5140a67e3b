mod cli;

fn main() -> eyre::Result<()> {
    use clap::Parser;

    env_logger::builder().init();

    let args = cli::Args::parse();
    cli::exec(args)
}
