//! Per-tile render state, the action resolver and the persisted state grids.

mod paged;

pub use paged::{MapChunkState, MapTileState, PagedGrid};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TileState {
    #[default]
    Unknown,
    NotGenerated,
    Rendered,
    RenderedEdge,
    ChunkError,
    MissingLight,
    LowInhabitedTime,
    RenderError,
}

impl TileState {
    pub const ALL: [TileState; 8] = [
        TileState::Unknown,
        TileState::NotGenerated,
        TileState::Rendered,
        TileState::RenderedEdge,
        TileState::ChunkError,
        TileState::MissingLight,
        TileState::LowInhabitedTime,
        TileState::RenderError,
    ];

    pub fn id(self) -> &'static str {
        match self {
            TileState::Unknown => "unknown",
            TileState::NotGenerated => "not-generated",
            TileState::Rendered => "rendered",
            TileState::RenderedEdge => "rendered-edge",
            TileState::ChunkError => "chunk-error",
            TileState::MissingLight => "missing-light",
            TileState::LowInhabitedTime => "low-inhabited-time",
            TileState::RenderError => "render-error",
        }
    }

    /// Whether the tile currently has stored geometry.
    pub fn is_rendered(self) -> bool {
        matches!(self, TileState::Rendered | TileState::RenderedEdge)
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            TileState::ChunkError
                | TileState::MissingLight
                | TileState::LowInhabitedTime
                | TileState::RenderError
        )
    }

    pub fn resolve(self, changed: bool, bounds: BoundsSituation) -> ActionAndNextState {
        resolve_action(self, changed, bounds)
    }
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A tile's state and when it was last set (unix millis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TileInfo {
    pub state: TileState,
    pub timestamp: i64,
}

impl TileInfo {
    pub fn new(state: TileState, timestamp: i64) -> Self {
        TileInfo { state, timestamp }
    }
}

/// Where a tile lies relative to the render boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundsSituation {
    Inside,
    Edge,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileAction {
    None,
    Render,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionAndNextState {
    pub action: TileAction,
    pub state: TileState,
}

impl ActionAndNextState {
    pub const fn new(action: TileAction, state: TileState) -> Self {
        ActionAndNextState { action, state }
    }
}

/// Decides what to do with a tile. Total over every input combination.
pub fn resolve_action(
    state: TileState,
    changed: bool,
    bounds: BoundsSituation,
) -> ActionAndNextState {
    let target = match bounds {
        BoundsSituation::Outside => {
            return if state.is_rendered() {
                ActionAndNextState::new(TileAction::Delete, TileState::NotGenerated)
            } else {
                // nothing stored for unknown, ungenerated or failed tiles
                ActionAndNextState::new(TileAction::None, state)
            };
        }
        BoundsSituation::Inside => TileState::Rendered,
        BoundsSituation::Edge => TileState::RenderedEdge,
    };
    if !changed && state == target {
        ActionAndNextState::new(TileAction::None, state)
    } else {
        ActionAndNextState::new(TileAction::Render, target)
    }
}
