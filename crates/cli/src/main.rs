use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand, ValueEnum};
use hpc_catalog_core::{
    build_report, load_config, load_report, render_markdown_summary, write_report,
    FailurePolicy,
};
use hpc_catalog_service::{BucketProfile, FsObjectStore, ObjectStore, S3ObjectStore, Uploader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "hpc-catalog",
    version,
    about = "Catalog HPC dataset families and stage them into object-store buckets."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan the configured dataset families and emit a JSON catalog report.
    Catalog(CatalogArgs),
    /// Upload individual files, keyed by their relative paths.
    Upload(UploadArgs),
    /// Upload every categorized file of an existing catalog report.
    UploadCatalog(UploadCatalogArgs),
    /// Delete one object or every object under a key prefix.
    Delete(DeleteArgs),
    /// Rename an object by copying it to a new key and deleting the original.
    Rename(RenameArgs),
    /// Write the bucket's keys to `<bucket>_objects.csv`.
    List(ListArgs),
}

#[derive(Debug, Args)]
struct CatalogArgs {
    /// JSON file listing the dataset families to catalog.
    #[arg(long, value_name = "FILE")]
    config: PathBuf,

    /// Output report path.
    #[arg(long, default_value = "hpc-catalog-report.json", value_name = "FILE")]
    output: PathBuf,

    /// Optional markdown summary output file.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,

    /// Record a failing family in the report and continue with the next one.
    #[arg(long)]
    keep_going: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum StoreBackend {
    /// Amazon S3, authenticated with the bucket's AWS profile.
    S3,
    /// Local directory tree under `--store-root`, for dry runs.
    Fs,
}

#[derive(Debug, Args)]
struct BucketArgs {
    /// Target bucket label (`rt`, `srw` or `land-da`).
    #[arg(long, value_name = "LABEL")]
    bucket: BucketProfile,

    /// Object store backend.
    #[arg(long, value_enum, default_value = "s3")]
    backend: StoreBackend,

    /// AWS region override; defaults to the profile's region.
    #[arg(long, value_name = "REGION")]
    region: Option<String>,

    /// Directory holding one subdirectory per bucket (`fs` backend).
    #[arg(long, default_value = "object-store", value_name = "DIR")]
    store_root: PathBuf,

    /// Create the bucket directory if it does not exist yet (`fs` backend).
    #[arg(long)]
    create_bucket: bool,
}

impl BucketArgs {
    fn open_store(&self) -> Result<Box<dyn ObjectStore>> {
        match self.backend {
            StoreBackend::S3 => {
                let store = S3ObjectStore::connect(&self.bucket, self.region.as_deref())
                    .with_context(|| format!("failed to connect to {}", self.bucket))?;
                Ok(Box::new(store))
            }
            StoreBackend::Fs => {
                let store = FsObjectStore::new(&self.store_root);
                if self.create_bucket {
                    store.create_bucket(&self.bucket.bucket).with_context(|| {
                        format!(
                            "failed to create bucket {} under {}",
                            self.bucket.bucket,
                            self.store_root.display()
                        )
                    })?;
                }
                Ok(Box::new(store))
            }
        }
    }
}

#[derive(Debug, Args)]
struct UploadArgs {
    #[command(flatten)]
    target: BucketArgs,

    /// Relative file path to upload (repeatable); also used as the object key.
    #[arg(long = "key", value_name = "PATH", num_args = 1.., action = ArgAction::Append, required = true)]
    keys: Vec<String>,

    /// Directory the relative paths are resolved against.
    #[arg(long, default_value = ".", value_name = "DIR")]
    work_dir: PathBuf,
}

#[derive(Debug, Args)]
struct UploadCatalogArgs {
    #[command(flatten)]
    target: BucketArgs,

    /// Catalog report produced by `catalog`.
    #[arg(long, value_name = "FILE")]
    report: PathBuf,

    /// Only upload the catalog of this family tag (repeatable).
    #[arg(long = "family", value_name = "TAG", action = ArgAction::Append)]
    families: Vec<String>,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("selector").required(true).args(["key", "prefix"])))]
struct DeleteArgs {
    #[command(flatten)]
    target: BucketArgs,

    /// Key of the object to delete.
    #[arg(long, value_name = "KEY")]
    key: Option<String>,

    /// Delete every object whose key starts with this prefix.
    #[arg(long, value_name = "PREFIX")]
    prefix: Option<String>,
}

#[derive(Debug, Args)]
struct RenameArgs {
    #[command(flatten)]
    target: BucketArgs,

    /// Key of the existing object.
    #[arg(long, value_name = "KEY")]
    current_key: String,

    /// New key for the object.
    #[arg(long, value_name = "KEY")]
    new_key: String,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[command(flatten)]
    target: BucketArgs,

    /// Directory the key listing is written to.
    #[arg(long, default_value = "results", value_name = "DIR")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog(args) => run_catalog_command(args),
        Commands::Upload(args) => run_upload_command(args),
        Commands::UploadCatalog(args) => run_upload_catalog_command(args),
        Commands::Delete(args) => run_delete_command(args),
        Commands::Rename(args) => run_rename_command(args),
        Commands::List(args) => run_list_command(args),
    }
}

fn run_catalog_command(args: CatalogArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let policy = if args.keep_going {
        FailurePolicy::Continue
    } else {
        FailurePolicy::Abort
    };

    let report = build_report(&config, policy)
        .with_context(|| format!("failed to build catalog from {}", args.config.display()))?;
    write_report(&report, &args.output)?;

    println!("Report written to {}", args.output.display());
    for catalog in &report.catalogs {
        println!(
            "- {}: {} file(s), {} categor(ies), {} uncategorized, {} ms",
            catalog.family,
            catalog.files.len(),
            catalog.categories.len(),
            catalog.uncategorized,
            catalog.elapsed_ms
        );
    }
    for failure in &report.failures {
        println!("! {} failed ({}): {}", failure.tag, failure.kind, failure.message);
    }

    if let Some(md_path) = args.md {
        let markdown = render_markdown_summary(&report);
        fs::write(&md_path, markdown).with_context(|| {
            format!("failed to write markdown summary to {}", md_path.display())
        })?;
        println!("Markdown summary written to {}", md_path.display());
    }

    Ok(())
}

fn run_upload_command(args: UploadArgs) -> Result<()> {
    let store = args.target.open_store()?;
    let uploader = Uploader::new(store, args.target.bucket.clone(), &args.work_dir);
    for key in &args.keys {
        uploader.upload_file(key)?;
    }
    println!(
        "Uploaded {} file(s) to {}",
        args.keys.len(),
        uploader.bucket()
    );
    Ok(())
}

fn run_upload_catalog_command(args: UploadCatalogArgs) -> Result<()> {
    let report = load_report(&args.report)?;
    let store = args.target.open_store()?;

    let mut total = 0;
    for catalog in &report.catalogs {
        if !args.families.is_empty() && !args.families.iter().any(|tag| tag == catalog.family.tag())
        {
            continue;
        }
        let work_dir = catalog.source.path_base();
        info!("uploading {} catalog from {}", catalog.family, work_dir.display());
        let uploader = Uploader::new(&store, args.target.bucket.clone(), work_dir);
        let uploaded = uploader
            .upload_catalog(&catalog.categories)
            .with_context(|| format!("failed to upload {} catalog", catalog.family))?;
        println!("- {}: {} file(s) uploaded", catalog.family, uploaded);
        total += uploaded;
    }

    println!("Uploaded {} file(s) to {}", total, args.target.bucket);
    Ok(())
}

fn run_delete_command(args: DeleteArgs) -> Result<()> {
    let store = args.target.open_store()?;
    let uploader = Uploader::new(store, args.target.bucket.clone(), ".");
    if let Some(key) = &args.key {
        uploader.purge(key)?;
        println!("Deleted {} from {}", key, uploader.bucket());
    }
    if let Some(prefix) = &args.prefix {
        let deleted = uploader.purge_by_prefix(prefix)?;
        for key in &deleted {
            println!("- {}", key);
        }
        println!(
            "Deleted {} object(s) prefixed '{}' from {}",
            deleted.len(),
            prefix,
            uploader.bucket()
        );
    }
    Ok(())
}

fn run_rename_command(args: RenameArgs) -> Result<()> {
    let store = args.target.open_store()?;
    let uploader = Uploader::new(store, args.target.bucket.clone(), ".");
    uploader.rename(&args.current_key, &args.new_key)?;
    println!(
        "Renamed {} to {} in {}",
        args.current_key,
        args.new_key,
        uploader.bucket()
    );
    Ok(())
}

fn run_list_command(args: ListArgs) -> Result<()> {
    let store = args.target.open_store()?;
    let uploader = Uploader::new(store, args.target.bucket.clone(), ".");
    let path = uploader.write_key_listing(&args.output_dir)?;
    println!("Key listing written to {}", path.display());
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
