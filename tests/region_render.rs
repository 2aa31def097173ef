mod common;

use common::{box_mask, flat_region, run_to_end, settings, Status, TestMap};
use nucmap::render::{ForceStrategy, RegionTaskStats, RenderTask, WorldRegionRenderTask};
use nucmap::state::TileState;
use nucmap::storage::Storage;
use nucmap::{RenderMap, Vec2i};
use std::sync::Arc;

fn region_task(map: &Arc<RenderMap>, force: ForceStrategy) -> WorldRegionRenderTask {
    WorldRegionRenderTask::new(Arc::clone(map), Vec2i::new(0, 0), force)
}

#[test]
fn test_full_region_renders_then_stays_unchanged() {
    let env = TestMap::new();
    env.source.insert(Vec2i::new(0, 0), flat_region(|_| Status::Full, 1000));
    let map = env.open(settings("world"));

    let first = region_task(&map, ForceStrategy::None);
    run_to_end(&first);
    assert!(first.is_completed());
    assert_eq!(
        first.stats(),
        RegionTaskStats {
            rendered: 256,
            deleted: 0,
            unchanged: 0,
            failed: 0
        }
    );
    for tz in 0..16 {
        for tx in 0..16 {
            let tile = Vec2i::new(tx, tz);
            assert_eq!(map.tile_state().get(tile).state, TileState::Rendered, "tile {}", tile);
            assert!(map.hires().tile_exists(tile).unwrap());
        }
    }

    let model = map.hires().read_model(Vec2i::new(3, 3)).unwrap().unwrap();
    // one grass top per column, two triangles each
    assert_eq!(model.size(), 32 * 32 * 2);

    // the finished region hands its column metadata to storage
    assert_eq!(map.pending_meta_count(), 0);
    let stored = env
        .storage
        .list_grid("world", RenderMap::TILE_META_GRID, 0, 1000)
        .unwrap();
    assert_eq!(stored.len(), 256);
    let tile = map.tile_meta(Vec2i::new(0, 0)).unwrap().unwrap();
    assert_eq!(tile.height(10, 10), 5);
    assert!(tile.color(10, 10).is_opaque());

    let second = region_task(&map, ForceStrategy::None);
    run_to_end(&second);
    assert_eq!(second.stats().unchanged, 256);
    assert_eq!(second.stats().rendered, 0);
}

#[test]
fn test_changed_chunk_rerenders_only_its_tile() {
    let env = TestMap::new();
    env.source.insert(Vec2i::new(0, 0), flat_region(|_| Status::Full, 1000));
    let map = env.open(settings("world"));
    run_to_end(&region_task(&map, ForceStrategy::None));

    let touched = common::region_bytes(|local| {
        let dim = nucmap::config::DimensionSettings::overworld();
        let chunk = common::ChunkSpec::flat().modern(dim.min_y, dim.height);
        let timestamp = if local == Vec2i::new(5, 7) { 2000 } else { 1000 };
        Some((chunk, timestamp))
    });
    env.source.insert(Vec2i::new(0, 0), touched);

    let task = region_task(&map, ForceStrategy::None);
    run_to_end(&task);
    assert_eq!(task.stats().rendered, 1);
    assert_eq!(task.stats().unchanged, 255);
    assert_eq!(map.chunk_state().get(Vec2i::new(5, 7)), 2000);

    let forced = region_task(&map, ForceStrategy::All);
    run_to_end(&forced);
    assert_eq!(forced.stats().rendered, 256);
}

#[test]
fn test_ungenerated_chunk_marks_its_tile() {
    let env = TestMap::new();
    env.source.insert(
        Vec2i::new(0, 0),
        flat_region(
            |local| {
                if local == Vec2i::new(0, 0) {
                    Status::NotGenerated
                } else {
                    Status::Full
                }
            },
            1000,
        ),
    );
    let mut s = settings("world");
    s.mask = box_mask(127, 63);
    let map = env.open(s);

    let task = region_task(&map, ForceStrategy::None);
    run_to_end(&task);

    assert_eq!(map.tile_state().get(Vec2i::new(0, 0)).state, TileState::NotGenerated);
    assert!(!map.hires().tile_exists(Vec2i::new(0, 0)).unwrap());
    for tile in [(1, 0), (2, 0), (3, 0), (0, 1), (1, 1), (2, 1), (3, 1)] {
        let tile = Vec2i::new(tile.0, tile.1);
        assert_eq!(map.tile_state().get(tile).state, TileState::Rendered, "tile {}", tile);
    }
    // tiles outside the mask were never touched
    assert_eq!(map.tile_state().get(Vec2i::new(4, 0)).state, TileState::Unknown);
    assert_eq!(
        task.stats(),
        RegionTaskStats {
            rendered: 7,
            deleted: 0,
            unchanged: 248,
            failed: 1
        }
    );
}

#[test]
fn test_shrinking_the_mask_deletes_tiles() {
    let env = TestMap::new();
    env.source.insert(Vec2i::new(0, 0), flat_region(|_| Status::Full, 1000));

    let mut wide = settings("world");
    wide.mask = box_mask(127, 63);
    let map = env.open(wide.clone());
    run_to_end(&region_task(&map, ForceStrategy::None));
    assert!(map.hires().tile_exists(Vec2i::new(3, 1)).unwrap());
    drop(map);

    let mut narrow = wide;
    narrow.mask = box_mask(63, 63);
    let map = env.open(narrow);
    let task = region_task(&map, ForceStrategy::None);
    run_to_end(&task);

    assert_eq!(task.stats().deleted, 4);
    assert_eq!(task.stats().rendered, 0);
    for tile in [(2, 0), (3, 0), (2, 1), (3, 1)] {
        let tile = Vec2i::new(tile.0, tile.1);
        assert_eq!(map.tile_state().get(tile).state, TileState::NotGenerated);
        assert!(!map.hires().tile_exists(tile).unwrap());
    }
    for tile in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let tile = Vec2i::new(tile.0, tile.1);
        assert_eq!(map.tile_state().get(tile).state, TileState::Rendered);
        assert!(map.hires().tile_exists(tile).unwrap());
    }
    let removed = map.tile_meta(Vec2i::new(2, 0)).unwrap().unwrap();
    assert!(!removed.has_content());
}

#[test]
fn test_missing_light_and_inhabited_time() {
    let env = TestMap::new();
    env.source.insert(
        Vec2i::new(0, 0),
        flat_region(
            |local| {
                if local.x < 2 && local.y < 2 {
                    Status::NoLight
                } else {
                    Status::Full
                }
            },
            1000,
        ),
    );

    let mut s = settings("light");
    s.mask = box_mask(63, 31);
    let map = env.open(s.clone());
    run_to_end(&region_task(&map, ForceStrategy::None));
    assert_eq!(map.tile_state().get(Vec2i::new(0, 0)).state, TileState::MissingLight);
    assert_eq!(map.tile_state().get(Vec2i::new(1, 0)).state, TileState::Rendered);

    let mut ignoring = s.clone();
    ignoring.id = "ignoring".into();
    ignoring.ignore_missing_light = true;
    let map = env.open(ignoring);
    run_to_end(&region_task(&map, ForceStrategy::None));
    assert_eq!(map.tile_state().get(Vec2i::new(0, 0)).state, TileState::Rendered);

    let mut inhabited = s;
    inhabited.id = "inhabited".into();
    inhabited.ignore_missing_light = true;
    inhabited.min_inhabited_time = 100;
    let map = env.open(inhabited);
    run_to_end(&region_task(&map, ForceStrategy::None));
    assert_eq!(
        map.tile_state().get(Vec2i::new(0, 0)).state,
        TileState::LowInhabitedTime
    );
}

#[test]
fn test_edge_tiles() {
    let env = TestMap::new();
    env.source.insert(Vec2i::new(0, 0), flat_region(|_| Status::Full, 1000));
    let mut s = settings("edges");
    s.mask = box_mask(47, 31);
    let map = env.open(s.clone());
    let task = region_task(&map, ForceStrategy::None);
    run_to_end(&task);
    assert_eq!(map.tile_state().get(Vec2i::new(0, 0)).state, TileState::Rendered);
    assert_eq!(map.tile_state().get(Vec2i::new(1, 0)).state, TileState::RenderedEdge);

    // the edge tile only holds the columns inside the mask
    let model = map.hires().read_model(Vec2i::new(1, 0)).unwrap().unwrap();
    assert!(model.size() < 32 * 32 * 2);
    assert!(model.size() >= 16 * 32 * 2);

    let edges = region_task(&map, ForceStrategy::Edge);
    run_to_end(&edges);
    assert_eq!(edges.stats().rendered, 1);

    let mut no_edges = s;
    no_edges.id = "no-edges".into();
    no_edges.render_edges = false;
    let map = env.open(no_edges);
    run_to_end(&region_task(&map, ForceStrategy::None));
    assert_eq!(map.tile_state().get(Vec2i::new(1, 0)).state, TileState::Unknown);
}

#[test]
fn test_too_complex_tile_is_stored_partially() {
    let env = TestMap::with_max_faces(10);
    env.source.insert(Vec2i::new(0, 0), flat_region(|_| Status::Full, 1000));
    let mut s = settings("complex");
    s.mask = box_mask(31, 31);
    let map = env.open(s);
    let task = region_task(&map, ForceStrategy::None);
    run_to_end(&task);

    assert_eq!(map.tile_state().get(Vec2i::new(0, 0)).state, TileState::Rendered);
    let model = map.hires().read_model(Vec2i::new(0, 0)).unwrap().unwrap();
    assert!(model.size() > 0);
    assert!(model.size() <= 10);
}

#[test]
fn test_task_equality_and_progress() {
    let env = TestMap::new();
    env.source.insert(Vec2i::new(0, 0), flat_region(|_| Status::Full, 1000));
    let mut s = settings("world");
    s.mask = box_mask(31, 31);
    let map = env.open(s);

    let a = region_task(&map, ForceStrategy::None);
    let b = region_task(&map, ForceStrategy::None);
    let forced = region_task(&map, ForceStrategy::All);
    assert!(a.same_task(&b));
    assert!(a.contains(&b));
    assert!(!a.same_task(&forced));

    assert_eq!(a.estimate_progress(), 0.0);
    a.do_work().unwrap();
    let partial = a.estimate_progress();
    assert!(partial > 0.0 && partial < 1.0);
    run_to_end(&a);
    assert_eq!(a.estimate_progress(), 1.0);
    assert!(!a.has_more_work());

    b.cancel();
    assert!(!b.has_more_work());
    b.do_work().unwrap();
    assert!(!b.is_completed());
}
