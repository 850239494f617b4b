use anyhow::Result;
use clap::Parser;
use clicktrack_device::cli::{Args, Command};
use clicktrack_device::operator::{self, SeekTarget};
use clicktrack_device::runtime;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,clicktrack=info,clicktrack_device=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    match args.cmd.clone().unwrap_or(Command::Listen) {
        Command::Listen => runtime::run_listen(args.listen_config()),
        Command::Tracks => operator::tracks(&args.operator_config()),
        Command::Play { track_id } => operator::play(&args.operator_config(), &track_id),
        Command::Stop => operator::stop(&args.operator_config()),
        Command::Seek { seconds, fraction } => {
            let target = match (seconds, fraction) {
                (Some(seconds), _) => SeekTarget::Seconds(seconds),
                (None, Some(fraction)) => SeekTarget::Fraction(fraction),
                (None, None) => anyhow::bail!("seek needs --seconds or --fraction"),
            };
            operator::seek(&args.operator_config(), target)
        }
        Command::Status => operator::status(&args.operator_config()),
    }
}
