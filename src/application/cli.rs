// src/application/cli.rs
//
// Command-line argument definitions (clap derive)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::application::commands::MaterialKey;
use crate::error::AppResult;
use crate::services::{ColumnMapping, StockFilter};

#[derive(Parser, Debug)]
#[command(name = "almacen")]
#[command(author, version, about = "Offline-first inventory browser and order staging")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Extra config file layered over the user and project files
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Data directory (overrides config and ALMACEN_DATA_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the header, first rows and suggested column mapping of a file
    Preview {
        file: PathBuf,
        /// Rows to show (default: import.preview_rows)
        #[arg(long)]
        rows: Option<usize>,
    },

    /// Import a tabular file into the local store (Ctrl-C cancels)
    Import(ImportArgs),

    /// Search materials by code or description
    Search {
        /// Query text; empty lists materials
        #[arg(default_value = "")]
        query: String,
        /// Stock filter: all, >0 or =0
        #[arg(long, default_value = "all")]
        stock: StockFilter,
        /// Typeahead suggestions instead of full results
        #[arg(long)]
        suggest: bool,
    },

    /// Order staging
    #[command(subcommand)]
    Cart(CartCommands),

    /// Recorded order snapshots
    #[command(subcommand)]
    History(HistoryCommands),

    /// Offline asset cache
    #[command(subcommand)]
    Assets(AssetsCommands),

    /// Local database maintenance
    #[command(subcommand)]
    Db(DbCommands),
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub file: PathBuf,

    /// Column holding the material code
    #[arg(long, value_name = "COLUMN")]
    pub matricula: Option<String>,

    /// Column holding the description
    #[arg(long, value_name = "COLUMN")]
    pub nombre: Option<String>,

    /// Column holding the stock quantity
    #[arg(long, value_name = "COLUMN")]
    pub stock: Option<String>,

    /// Column holding the price
    #[arg(long, value_name = "COLUMN")]
    pub precio: Option<String>,
}

impl ImportArgs {
    pub fn mapping_overrides(&self) -> ColumnMapping {
        ColumnMapping {
            matricula: self.matricula.clone(),
            nombre: self.nombre.clone(),
            stock: self.stock.clone(),
            precio: self.precio.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CartCommands {
    /// Add one unit of a material
    Add(MaterialArg),
    /// Remove a material's line
    Remove(MaterialArg),
    /// Set a line's quantity (values below 1 become 1)
    Qty {
        #[command(flatten)]
        material: MaterialArg,
        qty: u32,
    },
    Show,
    Clear,
    /// Record a snapshot and print the export text
    Checkout,
}

#[derive(Args, Debug)]
pub struct MaterialArg {
    /// Material code, or its id with --id
    pub key: String,

    /// Address the material by id (rows stored without a code)
    #[arg(long)]
    pub id: bool,
}

impl MaterialArg {
    pub fn key(&self) -> AppResult<MaterialKey> {
        MaterialKey::parse(&self.key, self.id)
    }
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// Newest snapshots first
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print a snapshot's export text
    Export { id: String },
}

#[derive(Subcommand, Debug)]
pub enum AssetsCommands {
    /// Install the configured manifest as a new generation if it changed
    Install,
    Status,
    /// Route one request through the cache
    Fetch {
        /// Absolute URL or path relative to assets.base_url
        url: String,
        /// Treat as a page navigation (network-first)
        #[arg(long)]
        document: bool,
    },
    /// Activate the waiting generation now
    SkipWaiting,
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Integrity check and table counts
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_with_stock_filter() {
        let cli = Cli::try_parse_from(["almacen", "search", "tornillo", "--stock", "=0"]).unwrap();
        match cli.command {
            Commands::Search { query, stock, suggest } => {
                assert_eq!(query, "tornillo");
                assert_eq!(stock, StockFilter::OutOfStock);
                assert!(!suggest);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_import_overrides() {
        let cli = Cli::try_parse_from([
            "almacen", "import", "stock.csv", "--matricula", "SKU", "--json",
        ])
        .unwrap();
        assert!(cli.global.json);
        let Commands::Import(args) = cli.command else {
            panic!("expected import");
        };
        let mapping = args.mapping_overrides();
        assert_eq!(mapping.matricula.as_deref(), Some("SKU"));
        assert!(mapping.nombre.is_none());
    }

    #[test]
    fn test_parse_cart_qty() {
        let cli = Cli::try_parse_from(["almacen", "cart", "qty", "A1", "3"]).unwrap();
        let Commands::Cart(CartCommands::Qty { material, qty }) = cli.command else {
            panic!("expected cart qty");
        };
        assert_eq!(qty, 3);
        assert_eq!(material.key().unwrap(), MaterialKey::Matricula("A1".to_string()));
    }

    #[test]
    fn test_parse_cart_by_id() {
        let id = "0b6f1f2e-8d4c-4a57-9a51-3f0c2d7e9b10";
        let cli = Cli::try_parse_from(["almacen", "cart", "qty", "--id", id, "2"]).unwrap();
        let Commands::Cart(CartCommands::Qty { material, qty }) = cli.command else {
            panic!("expected cart qty");
        };
        assert_eq!(qty, 2);
        assert_eq!(material.key().unwrap(), MaterialKey::Id(id.parse().unwrap()));

        let cli = Cli::try_parse_from(["almacen", "cart", "add", "--id", "not-a-uuid"]).unwrap();
        let Commands::Cart(CartCommands::Add(material)) = cli.command else {
            panic!("expected cart add");
        };
        assert!(matches!(material.key(), Err(crate::error::AppError::Validation(_))));
    }
}
