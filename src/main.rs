use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rudis_blocks::{
    ExtendedBlock,
    config::{ClassDefinition, Settings},
    db::sqlite::SqliteDatabase,
    field::FieldKindRegistry,
    listener::ClassDefinitionListener,
};
use tracing::{error, info};

#[derive(Parser)]
struct Opts {
    #[clap(short, long, env = "RUDIS_BLOCKS_SETTINGS")]
    settings: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check extended-block placement in a class definition
    Validate {
        #[clap(short, long)]
        class: PathBuf,
    },
    /// Create or extend the block tables of every extended-block field
    Sync {
        #[clap(short, long)]
        class: PathBuf,
        #[clap(short, long, env = "RUDIS_BLOCKS_DATABASE")]
        database: PathBuf,
    },
    /// Print the statements creating the block tables
    Ddl {
        #[clap(short, long)]
        class: PathBuf,
    },
}

fn read_class(path: &Path) -> anyhow::Result<ClassDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read class definition {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("parse class definition from {}", path.display()))
}

fn adapters<D: rudis_blocks::db::Database + 'static>(
    class: &ClassDefinition,
    db: Rc<D>,
    settings: &Settings,
) -> anyhow::Result<Vec<ExtendedBlock<D>>> {
    let registry = Rc::new(FieldKindRegistry::builtin());
    class
        .extended_blocks()
        .map(|(name, definition)| {
            ExtendedBlock::new(
                name,
                definition.clone(),
                registry.clone(),
                db.clone(),
                settings.clone(),
            )
            .with_context(|| format!("prepare field {}.{name}", class.id))
        })
        .collect()
}

fn run(opts: Opts) -> anyhow::Result<()> {
    let settings = match &opts.settings {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let listener = ClassDefinitionListener::new(&settings);
    match opts.command {
        Command::Validate { class } => {
            let class = read_class(&class)?;
            listener.on_pre_save(&class)?;
            info!(class_id = class.id, "class definition is valid");
        }
        Command::Sync { class, database } => {
            let class = read_class(&class)?;
            listener.on_pre_save(&class)?;
            let db = SqliteDatabase::open(&database)
                .with_context(|| format!("open database {}", database.display()))?
                .with_query_debug(settings.query_debug);
            for adapter in adapters(&class, Rc::new(db), &settings)? {
                let report = adapter.sync_schema(&class.id)?;
                info!(
                    class_id = class.id,
                    field = adapter.name(),
                    created = ?report.created_tables,
                    added = ?report.added_columns,
                    "synchronized"
                );
            }
        }
        Command::Ddl { class } => {
            let class = read_class(&class)?;
            listener.on_pre_save(&class)?;
            let db = SqliteDatabase::open_in_memory().context("open scratch database")?;
            for adapter in adapters(&class, Rc::new(db), &settings)? {
                for statement in adapter.ddl(&class.id)? {
                    println!("{statement};");
                }
            }
        }
    }
    Ok(())
}

fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    if let Err(e) = run(opts) {
        error!(?e, "critical error");
        std::process::exit(1);
    }
}
