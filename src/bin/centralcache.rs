use centralcache::{CacheConfig, CacheRegistry, RegistryConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEMO_CACHE: &str = "jimcache";

#[derive(Parser, Debug)]
#[command(name = "centralcache", version, about = "Two-tier cache demo and inspection tool", long_about = None)]
struct Cli {
    /// Path to a registry config file (TOML)
    #[arg(long, help = "Path to a registry config file (TOML). If omitted, the usual locations are searched.")]
    config: Option<PathBuf>,
    /// Override the disk root (takes precedence over env and config)
    #[arg(long, help = "Directory holding every cache's disk tier.")]
    disk_root: Option<PathBuf>,
    #[arg(long, default_value = DEMO_CACHE, help = "Cache to operate on")]
    cache: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Create the sample cache, store Oranges=12, read it back and shut down")]
    Demo,
    #[command(about = "Store a value")]
    Put { key: String, value: String },
    #[command(about = "Read a value")]
    Get { key: String },
    #[command(about = "Remove a value")]
    Remove { key: String },
    #[command(about = "Print cache statistics")]
    Stats {
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },
}

/// Settings for the sample cache: memory 10, not eternal, TTL 120s, TTI 60s,
/// reaper every 120s, disk bound 100.
fn demo_config() -> CacheConfig {
    CacheConfig::new(10)
        .eternal(false)
        .time_to_live_secs(120)
        .time_to_idle_secs(60)
        .disk_expiry_thread_interval_secs(120)
        .max_elements_on_disk(100)
}

fn config_candidates(cli_cfg: Option<&PathBuf>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = cli_cfg {
        paths.push(p.clone());
    }
    if let Ok(p) = std::env::var("CENTRALCACHE_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join("centralcache.toml"));
    }
    if let Some(home) = dirs_next::home_dir() {
        paths.push(home.join(".config").join("centralcache.toml"));
    }
    paths
}

/// Precedence: CLI > env > config file > defaults.
fn load_config(cli: &Cli) -> Result<RegistryConfig, Box<dyn std::error::Error>> {
    let mut cfg = match config_candidates(cli.config.as_ref()).into_iter().find(|p| p.exists()) {
        Some(path) => RegistryConfig::from_path(&path)?,
        None => RegistryConfig::default(),
    };
    if let Some(root) = &cli.disk_root {
        cfg.disk_root = Some(root.clone());
    } else if let Ok(root) = std::env::var("CENTRALCACHE_DISK_ROOT") {
        cfg.disk_root = Some(PathBuf::from(root));
    } else if cfg.disk_root.is_none() {
        cfg.disk_root = dirs_next::cache_dir().map(|d| d.join("centralcache"));
    }
    if cfg.default_cache.is_none() && !cfg.caches.contains_key(DEMO_CACHE) {
        cfg.caches.insert(DEMO_CACHE.to_string(), demo_config());
    }
    Ok(cfg)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let registry = CacheRegistry::with_config(load_config(&cli)?);
    let cache = registry.add_configured_cache::<String, String>(&cli.cache)?;

    match cli.command {
        Commands::Demo => {
            cache.put("Oranges".to_string(), "12".to_string())?;
            let value = cache.get(&"Oranges".to_string())?;
            println!("Oranges = {}", value.as_deref().unwrap_or("<missing>"));
        }
        Commands::Put { key, value } => {
            cache.put(key.clone(), value)?;
            println!("stored {key}");
        }
        Commands::Get { key } => match cache.get(&key)? {
            Some(v) => println!("{v}"),
            None => {
                registry.shutdown()?;
                return Err(format!("{key}: not found").into());
            }
        },
        Commands::Remove { key } => {
            let removed = cache.remove(&key)?;
            println!("{}", if removed { "removed" } else { "not found" });
        }
        Commands::Stats { json } => {
            let stats = registry.statistics(&cli.cache)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("cache:        {}", stats.name);
                println!("memory size:  {}", stats.memory_size);
                println!("disk size:    {}", stats.disk_size);
                println!("hits:         {} (memory {}, disk {})", stats.hits, stats.memory_hits, stats.disk_hits);
                println!("misses:       {} ({} expired)", stats.misses, stats.expired_misses);
                println!("hit ratio:    {:.3}", stats.hit_ratio());
                println!("puts:         {} ({} updates)", stats.puts, stats.updates);
                println!("evictions:    {} (disk {})", stats.evictions, stats.disk_evictions);
                println!("expirations:  {}", stats.expirations);
            }
        }
    }
    registry.shutdown()?;
    Ok(())
}

fn main() {
    if std::env::var_os("CENTRALCACHE_LOG_DIR").is_some() {
        if let Err(e) = centralcache::init() {
            eprintln!("warning: logging not configured: {e}");
        }
    }
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
