//! Command-line interface definitions for the `k2ctl` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `k2ctl` binary.
#[derive(Debug, Parser)]
#[command(
    name = "k2ctl",
    about = "Manage volumes on a Kaminario K2 all-flash array",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Verify the array is reachable and runs a supported REST API.
    #[command(name = "check")]
    Check,
    /// Print capacity statistics as JSON.
    #[command(name = "stats")]
    Stats(StatsCommand),
    /// Create a volume and its volume group.
    #[command(name = "create-volume")]
    CreateVolume(CreateVolumeCommand),
    /// Delete a volume and its volume group.
    #[command(name = "delete-volume")]
    DeleteVolume(VolumeIdArgs),
    /// Grow a volume.
    #[command(name = "extend-volume")]
    ExtendVolume(ExtendVolumeCommand),
    /// Snapshot the volume group of a volume.
    #[command(name = "create-snapshot")]
    CreateSnapshot(CreateSnapshotCommand),
    /// Delete a snapshot.
    #[command(name = "delete-snapshot")]
    DeleteSnapshot(SnapshotIdArgs),
    /// Print the size in GiB of an unmanaged array volume.
    #[command(name = "manage-size")]
    ManageSize(SourceNameArgs),
    /// Bring an existing array volume under management.
    #[command(name = "manage")]
    Manage(ManageCommand),
}

/// Arguments for `k2ctl stats`.
#[derive(Debug, Args)]
pub(crate) struct StatsCommand {
    /// Report the identity fields only, without querying capacity.
    #[arg(long)]
    pub(crate) no_refresh: bool,
}

/// Orchestrator identifier of a volume.
#[derive(Debug, Args)]
pub(crate) struct VolumeIdArgs {
    /// Volume identifier; array names are derived from it.
    #[arg(long, value_name = "ID")]
    pub(crate) id: String,
}

/// Orchestrator identifier of a snapshot.
#[derive(Debug, Args)]
pub(crate) struct SnapshotIdArgs {
    /// Snapshot identifier; the array name is derived from it.
    #[arg(long, value_name = "ID")]
    pub(crate) id: String,
}

/// Name of a volume created outside the driver.
#[derive(Debug, Args)]
pub(crate) struct SourceNameArgs {
    /// Array name of the existing volume.
    #[arg(long, value_name = "NAME")]
    pub(crate) source_name: String,
}

/// Arguments for `k2ctl create-volume`.
#[derive(Debug, Args)]
pub(crate) struct CreateVolumeCommand {
    /// Volume identifier; a random UUID is used when omitted.
    #[arg(long, value_name = "ID")]
    pub(crate) id: Option<String>,
    /// Size in GiB.
    #[arg(long, value_name = "GIB")]
    pub(crate) size_gb: u64,
    /// Create the volume without deduplication.
    #[arg(long)]
    pub(crate) nodedup: bool,
}

/// Arguments for `k2ctl extend-volume`.
#[derive(Debug, Args)]
pub(crate) struct ExtendVolumeCommand {
    /// Volume identifier.
    #[arg(long, value_name = "ID")]
    pub(crate) id: String,
    /// New size in GiB.
    #[arg(long, value_name = "GIB")]
    pub(crate) size_gb: u64,
}

/// Arguments for `k2ctl create-snapshot`.
#[derive(Debug, Args)]
pub(crate) struct CreateSnapshotCommand {
    /// Snapshot identifier.
    #[arg(long, value_name = "ID")]
    pub(crate) id: String,
    /// Identifier of the volume to snapshot.
    #[arg(long, value_name = "ID")]
    pub(crate) volume_id: String,
}

/// Arguments for `k2ctl manage`.
#[derive(Debug, Args)]
pub(crate) struct ManageCommand {
    /// Identifier the adopted volume will be known by.
    #[arg(long, value_name = "ID")]
    pub(crate) id: String,
    /// Array name of the existing volume.
    #[arg(long, value_name = "NAME")]
    pub(crate) source_name: String,
    /// The existing volume is not deduplicated.
    #[arg(long)]
    pub(crate) nodedup: bool,
}
