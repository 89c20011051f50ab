//! Artiroute CLI: place, move and locate model weights and datasets.
//!
//! Configuration comes from the environment (and `.env`); see `artiroute_core::Config`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use artiroute_cli::{init_tracing, server_summary, Services};
use artiroute_core::{AppError, ArtifactCategory, ArtifactKind, Config, ErrorMetadata, LogLevel};
use artiroute_storage::locations::{self, LocationSummary, LocationUpdate};
use artiroute_storage::paths::{generate_stored_file_name, normalize_category};
use artiroute_storage::{
    ArtifactRecordStore, MemoryRecordStore, RecordSync, StorageError,
    UploadRequest, UploadSource,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "artiroute", about = "Artifact storage routing and transfer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Target server for SFTP commands.
#[derive(Args)]
struct ServerArgs {
    /// Registered server name; unknown names use the default identity
    #[arg(long, default_value = "default")]
    server: String,
    /// Port override (0 keeps the configured port)
    #[arg(long, default_value = "0")]
    port: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the canonical path of a file name on every backend
    Paths {
        /// weights or datasets
        category: String,
        file_name: String,
    },
    /// Compute the stored file name for an upload
    Name {
        /// Original upload file name (supplies the extension)
        original: String,
        /// Desired base name
        #[arg(long, default_value = "")]
        desired: String,
    },
    /// Store a local file in the backend root, pushing to the cloud when requested
    Upload {
        file: PathBuf,
        /// weights or datasets
        #[arg(long)]
        category: String,
        /// Desired base name
        #[arg(long, default_value = "")]
        name: String,
        /// backend, cloud, other_remote or a synonym
        #[arg(long, default_value = "")]
        backend: String,
        /// Storage server label; cloud synonyms select the cloud backend
        #[arg(long, default_value = "")]
        storage_server: String,
        #[arg(long)]
        force_cloud: bool,
        /// Core server key to push the saved copy to; a remote storage server label implies one
        #[arg(long, default_value = "")]
        core_server: String,
        /// SSH user for the core push (default root)
        #[arg(long)]
        ssh_user: Option<String>,
        /// SSH private key for the core push
        #[arg(long)]
        ssh_key: Option<String>,
    },
    /// Upload a backend artifact by file name to the matching remote root
    Push {
        file_name: String,
        #[command(flatten)]
        target: ServerArgs,
    },
    /// Download a remote artifact by file name into the matching backend root
    Pull {
        file_name: String,
        #[command(flatten)]
        target: ServerArgs,
    },
    /// Upload a local file to an explicit remote path
    Put {
        local: PathBuf,
        remote: String,
        #[command(flatten)]
        target: ServerArgs,
    },
    /// Download an explicit remote path to a local file
    Get {
        remote: String,
        local: PathBuf,
        #[command(flatten)]
        target: ServerArgs,
    },
    /// Check both remote roots for a file name
    Search {
        file_name: String,
        #[command(flatten)]
        target: ServerArgs,
    },
    /// Upload a local file to a core server from the directory
    CorePush {
        /// Core server key
        server_key: String,
        local: PathBuf,
        /// weights or datasets
        #[arg(long)]
        category: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        key: Option<String>,
    },
    /// Pull a cloud netdisk file into the backend root
    CloudPull {
        remote: String,
        /// weights or datasets
        #[arg(long)]
        category: String,
        /// Local file name (defaults to the remote basename)
        #[arg(long)]
        name: Option<String>,
        /// Record to sync after the pull: model or dataset
        #[arg(long, requires = "id")]
        kind: Option<ArtifactKind>,
        /// Record id to sync after the pull
        #[arg(long, requires = "kind")]
        id: Option<i64>,
        /// Label added to the record's storage locations
        #[arg(long, default_value = "backend")]
        local_label: String,
    },
    /// Local path of a record's artifact, pulling the cloud copy if needed
    Fetch {
        /// model or dataset
        kind: ArtifactKind,
        id: i64,
    },
    /// Show or change a record's storage locations
    Locations {
        /// model or dataset
        kind: ArtifactKind,
        id: i64,
        /// set, add or remove; omit to only show
        #[arg(long, conflicts_with = "patch")]
        action: Option<String>,
        /// Storage server entries
        #[arg(long = "server")]
        servers: Vec<String>,
        /// JSON body: {"action", "storage_server", "storage_servers"}
        #[arg(long)]
        patch: Option<String>,
    },
    /// Create a model or dataset record
    Register {
        /// model or dataset
        kind: ArtifactKind,
        name: String,
        file_name: String,
        /// Storage server entries
        #[arg(long = "server")]
        servers: Vec<String>,
        #[arg(long, default_value = "0")]
        size_mb: f64,
    },
    /// List records, newest first
    List {
        /// model or dataset
        kind: ArtifactKind,
        #[arg(long, default_value = "50")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Rewrite stored location columns into the JSON array form
    NormalizeLocations {
        /// model or dataset
        kind: ArtifactKind,
    },
    /// List core servers and the default SSH identity
    Servers,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn category(input: &str) -> anyhow::Result<ArtifactCategory> {
    Ok(normalize_category(input)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let err = match run(cli).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    let app_err = match err.downcast::<StorageError>() {
        Ok(storage_err) => AppError::from(storage_err),
        Err(err) => err.downcast::<AppError>()?,
    };
    match app_err.log_level() {
        LogLevel::Error => tracing::error!(error_code = app_err.error_code(), "{}", app_err),
        _ => tracing::warn!(error_code = app_err.error_code(), "{}", app_err),
    }
    print_json(&serde_json::json!({
        "error": app_err.error_code(),
        "status": app_err.http_status_code(),
        "message": app_err.detailed_message(),
        "suggested_action": app_err.suggested_action(),
    }))?;
    std::process::exit(1);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let services = Services::from_config(config);

    match cli.command {
        Commands::Paths {
            category: c,
            file_name,
        } => {
            let paths = services.paths.build_all_paths(category(&c)?, &file_name)?;
            print_json(&paths)?;
        }
        Commands::Name { original, desired } => {
            let stored_name = generate_stored_file_name(&desired, &original)?;
            print_json(&serde_json::json!({ "stored_name": stored_name }))?;
        }
        Commands::Upload {
            file,
            category: c,
            name,
            backend,
            storage_server,
            force_cloud,
            core_server,
            ssh_user,
            ssh_key,
        } => {
            let source = UploadSource::from_path(&file).await?;
            let request = UploadRequest {
                category: Some(category(&c)?),
                desired_name: name,
                requested_backend: backend,
                storage_server,
                force_cloud,
                core_server_key: core_server,
                ssh_user,
                ssh_private_key_path: ssh_key,
            };
            let result = services
                .uploader()
                .save(source, &request)
                .await
                .with_context(|| format!("Failed to store {}", file.display()))?;
            print_json(&result)?;
        }
        Commands::Push { file_name, target } => {
            let result = services
                .engine
                .upload_artifact_by_name(&file_name, &target.server, target.port)
                .await?;
            print_json(&result)?;
        }
        Commands::Pull { file_name, target } => {
            let result = services
                .engine
                .download_artifact_by_name(&file_name, &target.server, target.port)
                .await?;
            print_json(&result)?;
        }
        Commands::Put {
            local,
            remote,
            target,
        } => {
            let result = services
                .engine
                .upload_file_by_path(&local, &remote, &target.server, target.port)
                .await?;
            print_json(&result)?;
        }
        Commands::Get {
            remote,
            local,
            target,
        } => {
            let result = services
                .engine
                .download_file_by_path(&remote, &local, &target.server, target.port)
                .await?;
            print_json(&result)?;
        }
        Commands::Search { file_name, target } => {
            let result = services
                .engine
                .search_in_other_roots(&file_name, &target.server, target.port)
                .await?;
            print_json(&result)?;
        }
        Commands::CorePush {
            server_key,
            local,
            category: c,
            user,
            key,
        } => {
            let result = services
                .engine
                .push_to_core_server(
                    services.directory.as_ref(),
                    &server_key,
                    &local,
                    category(&c)?,
                    user.as_deref(),
                    key.as_deref(),
                )
                .await?;
            print_json(&result)?;
        }
        Commands::CloudPull {
            remote,
            category: c,
            name,
            kind,
            id,
            local_label,
        } => {
            let (records, sync): (Arc<dyn ArtifactRecordStore>, Option<RecordSync>) =
                match kind.zip(id) {
                    Some((kind, id)) => {
                        let records: Arc<dyn ArtifactRecordStore> = services.records().await?;
                        (records, Some(RecordSync::new(kind, id).with_label(&local_label)))
                    }
                    None => {
                        let records: Arc<dyn ArtifactRecordStore> =
                            Arc::new(MemoryRecordStore::new());
                        (records, None)
                    }
                };
            let result = services
                .downloader(records)
                .pull_from_cloud(&remote, category(&c)?, name.as_deref(), sync.as_ref())
                .await?;
            print_json(&result)?;
        }
        Commands::Fetch { kind, id } => {
            let records = services.records().await?;
            let path = services.downloader(records).fetch_local(kind, id).await?;
            print_json(&serde_json::json!({ "kind": kind, "id": id, "local_path": path }))?;
        }
        Commands::Locations {
            kind,
            id,
            action,
            servers,
            patch,
        } => {
            let records = services.records().await?;
            let current = match (action, patch) {
                (_, Some(patch)) => {
                    let update: LocationUpdate =
                        serde_json::from_str(&patch).context("Invalid location patch")?;
                    let (action, servers) = update.normalize()?;
                    records.update_locations(kind, id, action, &servers).await?
                }
                (Some(action), None) => {
                    let action = locations::parse_action(&action)?;
                    records.update_locations(kind, id, action, &servers).await?
                }
                (None, None) => records.locations(kind, id).await?,
            };
            print_json(&LocationSummary::new(id, current))?;
        }
        Commands::Register {
            kind,
            name,
            file_name,
            servers,
            size_mb,
        } => {
            let records = services.records().await?;
            let record = records
                .create(kind, &name, &file_name, &servers, size_mb)
                .await?;
            print_json(&record)?;
        }
        Commands::List {
            kind,
            limit,
            offset,
        } => {
            let records = services.records().await?;
            print_json(&records.list(kind, limit, offset).await?)?;
        }
        Commands::NormalizeLocations { kind } => {
            let records = services.records().await?;
            let changed = records.normalize_locations(kind).await?;
            print_json(&serde_json::json!({ "kind": kind, "changed": changed }))?;
        }
        Commands::Servers => {
            let summary = server_summary(&services.engine, services.directory.as_ref()).await?;
            print_json(&summary)?;
        }
    }

    Ok(())
}
