//! Numeric id tables for chunk formats that predate namespaced ids.

use crate::block_state::BlockState;

pub const DEFAULT_BIOME: &str = "minecraft:ocean";

/// Legacy numeric biome ids 0..170. Empty entries are unassigned ids.
#[rustfmt::skip]
static LEGACY_BIOMES: [&str; 170] = [
    // 0
    "minecraft:ocean", "minecraft:plains", "minecraft:desert", "minecraft:mountains",
    "minecraft:forest", "minecraft:taiga", "minecraft:swamp", "minecraft:river",
    "minecraft:nether_wastes", "minecraft:the_end",
    // 10
    "minecraft:frozen_ocean", "minecraft:frozen_river", "minecraft:snowy_tundra", "minecraft:snowy_mountains",
    "minecraft:mushroom_fields", "minecraft:mushroom_field_shore", "minecraft:beach", "minecraft:desert_hills",
    "minecraft:wooded_hills", "minecraft:taiga_hills",
    // 20
    "minecraft:mountain_edge", "minecraft:jungle", "minecraft:jungle_hills", "minecraft:jungle_edge",
    "minecraft:deep_ocean", "minecraft:stone_shore", "minecraft:snowy_beach", "minecraft:birch_forest",
    "minecraft:birch_forest_hills", "minecraft:dark_forest",
    // 30
    "minecraft:snowy_taiga", "minecraft:snowy_taiga_hills", "minecraft:giant_tree_taiga", "minecraft:giant_tree_taiga_hills",
    "minecraft:wooded_mountains", "minecraft:savanna", "minecraft:savanna_plateau", "minecraft:badlands",
    "minecraft:wooded_badlands_plateau", "minecraft:badlands_plateau",
    // 40
    "minecraft:small_end_islands", "minecraft:end_midlands", "minecraft:end_highlands", "minecraft:end_barrens",
    "minecraft:warm_ocean", "minecraft:lukewarm_ocean", "minecraft:cold_ocean", "minecraft:deep_warm_ocean",
    "minecraft:deep_lukewarm_ocean", "minecraft:deep_cold_ocean",
    // 50
    "minecraft:deep_frozen_ocean", "", "", "", "", "", "", "", "", "",
    // 60
    "", "", "", "", "", "", "", "", "", "",
    // 70
    "", "", "", "", "", "", "", "", "", "",
    // 80
    "", "", "", "", "", "", "", "", "", "",
    // 90
    "", "", "", "", "", "", "", "", "", "",
    // 100
    "", "", "", "", "", "", "", "", "", "",
    // 110
    "", "", "", "", "", "", "", "", "", "",
    // 120
    "", "", "", "", "", "", "", "minecraft:the_void", "", "minecraft:sunflower_plains",
    // 130
    "minecraft:desert_lakes", "minecraft:gravelly_mountains", "minecraft:flower_forest", "minecraft:taiga_mountains",
    "minecraft:swamp_hills", "", "", "", "", "",
    // 140
    "minecraft:ice_spikes", "", "", "", "", "", "", "", "", "minecraft:modified_jungle",
    // 150
    "", "minecraft:modified_jungle_edge", "", "", "", "minecraft:tall_birch_forest",
    "minecraft:tall_birch_hills", "minecraft:dark_forest_hills", "minecraft:snowy_taiga_mountains", "",
    // 160
    "minecraft:giant_spruce_taiga", "minecraft:giant_spruce_taiga_hills", "minecraft:modified_gravelly_mountains",
    "minecraft:shattered_savanna", "minecraft:shattered_savanna_plateau", "minecraft:eroded_badlands",
    "minecraft:modified_wooded_badlands_plateau", "minecraft:modified_badlands_plateau",
    "minecraft:bamboo_jungle", "minecraft:bamboo_jungle_hills",
];

/// Maps a legacy numeric biome id; unassigned or out-of-table ids give [`DEFAULT_BIOME`].
pub fn legacy_biome(id: i32) -> &'static str {
    usize::try_from(id)
        .ok()
        .and_then(|i| LEGACY_BIOMES.get(i))
        .copied()
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_BIOME)
}

/// Maps a pre-flattening block id and data value to a block state.
/// Returns `None` for ids this table does not know.
pub fn legacy_block(id: u16, data: u8) -> Option<BlockState> {
    let name = match id {
        0 => "air",
        1 => match data {
            1 => "granite",
            2 => "polished_granite",
            3 => "diorite",
            4 => "polished_diorite",
            5 => "andesite",
            6 => "polished_andesite",
            _ => "stone",
        },
        2 => "grass_block",
        3 => match data {
            1 => "coarse_dirt",
            2 => "podzol",
            _ => "dirt",
        },
        4 => "cobblestone",
        5 => match data {
            1 => "spruce_planks",
            2 => "birch_planks",
            3 => "jungle_planks",
            4 => "acacia_planks",
            5 => "dark_oak_planks",
            _ => "oak_planks",
        },
        7 => "bedrock",
        8 | 9 => "water",
        10 | 11 => "lava",
        12 => match data {
            1 => "red_sand",
            _ => "sand",
        },
        13 => "gravel",
        14 => "gold_ore",
        15 => "iron_ore",
        16 => "coal_ore",
        17 => match data & 3 {
            1 => "spruce_log",
            2 => "birch_log",
            3 => "jungle_log",
            _ => "oak_log",
        },
        18 => match data & 3 {
            1 => "spruce_leaves",
            2 => "birch_leaves",
            3 => "jungle_leaves",
            _ => "oak_leaves",
        },
        20 => "glass",
        21 => "lapis_ore",
        24 => "sandstone",
        31 => "grass",
        35 => "white_wool",
        37 => "dandelion",
        38 => "poppy",
        41 => "gold_block",
        42 => "iron_block",
        45 => "bricks",
        48 => "mossy_cobblestone",
        49 => "obsidian",
        50 => "torch",
        56 => "diamond_ore",
        57 => "diamond_block",
        73 | 74 => "redstone_ore",
        78 => "snow",
        79 => "ice",
        80 => "snow_block",
        81 => "cactus",
        82 => "clay",
        86 => "carved_pumpkin",
        87 => "netherrack",
        88 => "soul_sand",
        89 => "glowstone",
        98 => "stone_bricks",
        110 => "mycelium",
        112 => "nether_bricks",
        121 => "end_stone",
        129 => "emerald_ore",
        155 => "quartz_block",
        159 => "white_terracotta",
        161 => "acacia_leaves",
        162 => "acacia_log",
        172 => "terracotta",
        174 => "packed_ice",
        _ => return None,
    };
    let state = BlockState::new(name);
    Some(match id {
        8 | 9 | 10 | 11 => state.with_property("level", (data & 15).to_string()),
        _ => state,
    })
}
