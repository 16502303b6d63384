//! Binary entry point for the `k2ctl` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use k2_array::naming::{NO_DEDUP, THIN_PROV_TYPE_KEY};
use k2_array::{
    ConfigError, DriverError, ExistingRef, HttpTransport, K2Config, K2Driver, SnapshotSpec,
    VolumeSpec, VolumeType,
};

mod cli;

use cli::{Cli, CreateVolumeCommand, ManageCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("could not render output: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = K2Config::load_without_cli_args()?;
    let driver = K2Driver::connect(config)?;

    match cli {
        Cli::Check => {
            driver.check_for_setup_error().await?;
            print_line("array is reachable and compatible")
        }
        Cli::Stats(args) => {
            let stats = driver.get_volume_stats(!args.no_refresh).await?;
            let rendered = serde_json::to_string_pretty(&stats)
                .map_err(|err| CliError::Output(err.to_string()))?;
            print_line(&rendered)
        }
        Cli::CreateVolume(args) => create_volume(&driver, args).await,
        Cli::DeleteVolume(args) => {
            driver.delete_volume(&args.id).await?;
            print_line(&format!("deleted volume {}", args.id))
        }
        Cli::ExtendVolume(args) => {
            driver.extend_volume(&args.id, args.size_gb).await?;
            print_line(&format!("extended volume {} to {} GiB", args.id, args.size_gb))
        }
        Cli::CreateSnapshot(args) => {
            // The size only matters for restores, which the CLI does not offer.
            let snapshot = SnapshotSpec::new(&args.id, &args.volume_id, 0);
            driver.create_snapshot(&snapshot).await?;
            print_line(&format!("created snapshot {}", args.id))
        }
        Cli::DeleteSnapshot(args) => {
            driver.delete_snapshot(&args.id).await?;
            print_line(&format!("deleted snapshot {}", args.id))
        }
        Cli::ManageSize(args) => {
            let size = driver
                .manage_existing_get_size(&ExistingRef::new(&args.source_name))
                .await?;
            print_line(&size.to_string())
        }
        Cli::Manage(args) => manage(&driver, &args).await,
    }
}

async fn create_volume(
    driver: &K2Driver<HttpTransport>,
    args: CreateVolumeCommand,
) -> Result<(), CliError> {
    let id = args
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let spec = VolumeSpec::new(&id, args.size_gb).volume_type(provisioning(args.nodedup));
    let created = driver.create_volume(&spec).await?;
    print_line(&format!("created volume {id} as {}", created.name))
}

async fn manage(driver: &K2Driver<HttpTransport>, args: &ManageCommand) -> Result<(), CliError> {
    let spec = VolumeSpec::new(&args.id, 0).volume_type(provisioning(args.nodedup));
    driver
        .manage_existing(&spec, &ExistingRef::new(&args.source_name))
        .await?;
    print_line(&format!("managing {} as volume {}", args.source_name, args.id))
}

fn provisioning(nodedup: bool) -> Option<VolumeType> {
    nodedup.then(|| VolumeType::default().with_extra_spec(THIN_PROV_TYPE_KEY, NO_DEDUP))
}

fn print_line(message: &str) -> Result<(), CliError> {
    writeln!(io::stdout(), "{message}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodedup_flag_selects_nodedup_type() {
        let kind = provisioning(true).expect("type is set");
        assert_eq!(kind.extra_spec(THIN_PROV_TYPE_KEY), Some(NO_DEDUP));
        assert!(provisioning(false).is_none());
    }

    #[test]
    fn errors_render_on_one_line() {
        let mut buffer = Vec::new();
        write_error(
            &mut buffer,
            &CliError::Config(ConfigError::MissingField(String::from("san_ip"))),
        );
        let rendered = String::from_utf8(buffer).expect("utf8");
        assert_eq!(rendered.lines().count(), 1);
        assert!(rendered.contains("san_ip"));
    }

    #[test]
    fn cli_parses_create_volume_arguments() {
        let cli = Cli::try_parse_from(["k2ctl", "create-volume", "--size-gb", "4", "--nodedup"])
            .expect("arguments parse");
        let Cli::CreateVolume(args) = cli else {
            panic!("expected create-volume");
        };
        assert_eq!(args.size_gb, 4);
        assert!(args.nodedup);
        assert!(args.id.is_none());
    }
}
