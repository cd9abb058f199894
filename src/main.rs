mod logging;

use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

use repocache::config::Config;
use repocache::{Item, Params, Record, Repository};

#[derive(Parser, Debug)]
#[command(name = "repocache")]
#[command(about = "Run cached repository operations against a REST API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/repocache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the full collection for a scope
  List {
    repo: String,
    #[command(flatten)]
    params: ParamArgs,
  },
  /// Fetch a single item by key
  Get {
    repo: String,
    key: String,
    #[command(flatten)]
    params: ParamArgs,
  },
  /// Query the search resource
  Search { repo: String, query: String },
  /// Create an item from the given fields
  Add {
    repo: String,
    #[command(flatten)]
    params: ParamArgs,
  },
  /// Load an item, apply the given fields and save it. Without a key a new
  /// item is saved (repositories that create items through save).
  Save {
    repo: String,
    key: Option<String>,
    #[command(flatten)]
    params: ParamArgs,
  },
  /// Delete an item by key
  Delete {
    repo: String,
    key: String,
    #[command(flatten)]
    params: ParamArgs,
  },
}

#[derive(ClapArgs, Debug, Default)]
struct ParamArgs {
  /// Parameter as key=value; values are parsed as JSON when possible
  #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
  params: Vec<(String, Value)>,
}

impl ParamArgs {
  fn record(&self) -> Record {
    self.params.iter().cloned().collect()
  }
}

/// Parse `key=value`, reading the value as JSON and falling back to a
/// plain string.
fn parse_param(input: &str) -> std::result::Result<(String, Value), String> {
  let (key, value) = input
    .split_once('=')
    .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", input))?;
  if key.is_empty() {
    return Err(format!("empty key in '{}'", input));
  }
  let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
  Ok((key.to_string(), value))
}

/// Parse a positional key, keeping numeric keys numeric.
fn parse_key(key: &str) -> Value {
  match serde_json::from_str::<Value>(key) {
    Ok(value @ (Value::Number(_) | Value::String(_))) => value,
    _ => Value::String(key.to_string()),
  }
}

/// Params carrying `key` under the repository's item key.
fn keyed(repo: &Repository, key: &str, params: &ParamArgs) -> Result<Params> {
  let key_name = repo
    .item_key()
    .ok_or_else(|| eyre!("Repository '{}' has no item_key", repo.name()))?;
  let mut fields = params.record();
  fields.insert(key_name.to_string(), parse_key(key));
  Ok(Params::Fields(fields))
}

fn items_json(items: &[Item]) -> Value {
  Value::Array(items.iter().map(Item::to_value).collect())
}

async fn run(config: &Config, client: &reqwest::Client, command: Command) -> Result<Value> {
  let token = Config::get_api_token();
  let open = |name: &str| config.repository(name, client, token.clone());

  match command {
    Command::List { repo, params } => {
      let repo = open(&repo)?;
      let collection = repo
        .get_all(params.record())?
        .await
        .map_err(|e| eyre!("Failed to list {}: {}", repo.name(), e))?;
      Ok(items_json(&collection.items()))
    }
    Command::Get { repo, key, params } => {
      let repo = open(&repo)?;
      let item = repo
        .get(keyed(&repo, &key, &params)?)?
        .await
        .map_err(|e| eyre!("Failed to get {} {}: {}", repo.name(), key, e))?;
      Ok(item.to_value())
    }
    Command::Search { repo, query } => {
      let repo = open(&repo)?;
      let items = repo
        .search(&query)?
        .await
        .map_err(|e| eyre!("Failed to search {}: {}", repo.name(), e))?;
      Ok(items_json(&items))
    }
    Command::Add { repo, params } => {
      let repo = open(&repo)?;
      let item = repo
        .add(params.record())?
        .await
        .map_err(|e| eyre!("Failed to add to {}: {}", repo.name(), e))?;
      Ok(item.to_value())
    }
    Command::Save { repo, key, params } => {
      let repo = open(&repo)?;
      let item = match &key {
        Some(key) => repo
          .get(keyed(&repo, key, &params)?)?
          .await
          .map_err(|e| eyre!("Failed to load {} {}: {}", repo.name(), key, e))?,
        None => Item::default(),
      };
      item.assign(&params.record());
      debug!(repo = %repo.name(), "saving item");
      repo
        .save(&item)?
        .await
        .map_err(|e| eyre!("Failed to save {}: {}", repo.name(), e))?;
      Ok(item.to_value())
    }
    Command::Delete { repo, key, params } => {
      let repo = open(&repo)?;
      repo
        .delete(keyed(&repo, &key, &params)?)?
        .await
        .map_err(|e| eyre!("Failed to delete {} {}: {}", repo.name(), key, e))?;
      Ok(Value::Null)
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.log_file.as_deref())?;

  let config = Config::load(args.config.as_deref())?;
  let client = reqwest::Client::builder()
    .user_agent(concat!("repocache/", env!("CARGO_PKG_VERSION")))
    .build()
    .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

  let output = run(&config, &client, args.command).await?;
  if !output.is_null() {
    let rendered = serde_json::to_string_pretty(&output)
      .map_err(|e| eyre!("Failed to render output: {}", e))?;
    println!("{}", rendered);
  }

  Ok(())
}
