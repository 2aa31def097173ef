use clap::{Parser, Subcommand};
use nucmap::config::{MapSettings, NucmapConfig};
use nucmap::hires::{DefaultResourcePack, TileModelPool};
use nucmap::render::{ForceStrategy, MapPurgeTask, MapSaveTask, MapUpdateTask, RenderManager};
use nucmap::storage::{FileStorage, Storage};
use nucmap::world::{DirectoryRegionSource, World};
use nucmap::{MapError, RenderMap, Vec2i};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nucmap", about = "Render Minecraft worlds into incremental hires tiles")]
struct Cli {
    /// JSON configuration file
    #[arg(long, short, default_value = "nucmap.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render every configured map, or only the given one
    Render {
        /// Map id (default: all maps)
        #[arg(long)]
        map: Option<String>,
        /// Re-render every tile, even unchanged ones
        #[arg(long)]
        force: bool,
        /// Re-render tiles on the render boundary
        #[arg(long, conflicts_with = "force")]
        force_edges: bool,
        /// Only this region, as X,Z (repeatable)
        #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
        region: Vec<Vec2i>,
        /// Block position X,Z to render around
        #[arg(long, value_parser = parse_pair, allow_hyphen_values = true, requires = "radius")]
        center: Option<Vec2i>,
        /// Radius in blocks around --center
        #[arg(long, requires = "center")]
        radius: Option<i32>,
        /// Worker threads (default: from the config)
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Delete everything stored for a map
    Purge {
        #[arg(long)]
        map: String,
    },
}

fn parse_pair(value: &str) -> Result<Vec2i, String> {
    let (x, z) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Z but got '{}'", value))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid coordinate '{}': {}", s, e))
    };
    Ok(Vec2i::new(parse(x)?, parse(z)?))
}

fn open_map(settings: &MapSettings, storage: &Arc<dyn Storage>, pool: &Arc<TileModelPool>) -> nucmap::Result<Arc<RenderMap>> {
    let world = Arc::new(World::new(
        Arc::new(DirectoryRegionSource::for_world(&settings.world)),
        settings.dimension.clone(),
    ));
    Ok(Arc::new(RenderMap::new(
        settings.clone(),
        world,
        Arc::clone(storage),
        Arc::new(DefaultResourcePack::new()),
        Arc::clone(pool),
    )?))
}

fn wait_for(manager: &RenderManager) {
    let interval = Duration::from_millis(manager.settings().progress_interval_ms.max(100)) * 10;
    while !manager.wait_until_idle(interval) {
        if let Some(task) = manager.current_task() {
            let eta = manager
                .estimate_remaining_time()
                .map(|d| format!(", about {}s left", d.as_secs()))
                .unwrap_or_default();
            log::info!(
                "{}: {:.1}%{}",
                task.description(),
                task.estimate_progress() * 100.0,
                eta
            );
        }
    }
}

fn run(cli: Cli) -> nucmap::Result<()> {
    let config = NucmapConfig::from_file(&cli.config)?;
    let storage: Arc<dyn Storage> =
        Arc::new(FileStorage::new(&config.storage_root, config.compression));
    let pool = Arc::new(TileModelPool::new(
        TileModelPool::DEFAULT_INITIAL_CAPACITY,
        config.render.max_faces,
        Duration::from_secs(config.render.pool_shrink_secs),
    ));
    let manager = RenderManager::new(config.render.clone());

    match cli.command {
        Command::Render {
            map,
            force,
            force_edges,
            region,
            center,
            radius,
            threads,
        } => {
            let force = if force {
                ForceStrategy::All
            } else if force_edges {
                ForceStrategy::Edge
            } else {
                ForceStrategy::None
            };
            let selected: Vec<&MapSettings> = match &map {
                Some(id) => vec![config
                    .map(id)
                    .ok_or_else(|| MapError::Config(format!("no map with id '{}'", id)))?],
                None => config.maps.iter().collect(),
            };
            for settings in selected {
                let render_map = open_map(settings, &storage, &pool)?;
                let task = if region.is_empty() {
                    let filter = center.zip(radius);
                    MapUpdateTask::for_world(Arc::clone(&render_map), force, filter)?
                } else {
                    MapUpdateTask::new(Arc::clone(&render_map), region.clone(), force)
                };
                log::info!("Scheduling {}", nucmap::render::RenderTask::description(&task));
                manager.schedule(Arc::new(task));
                manager.schedule(Arc::new(MapSaveTask::new(render_map)));
            }
            manager.start(threads.unwrap_or(config.render.thread_count))?;
        }
        Command::Purge { map } => {
            let settings = config
                .map(&map)
                .ok_or_else(|| MapError::Config(format!("no map with id '{}'", map)))?;
            let render_map = open_map(settings, &storage, &pool)?;
            manager.schedule(Arc::new(MapPurgeTask::new(render_map)));
            manager.start(1)?;
        }
    }

    wait_for(&manager);
    manager.stop();
    log::info!("Done");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
