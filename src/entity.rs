use quartz_nbt::{NbtCompound, NbtList, NbtTag};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// An entity stored inside a chunk, reduced to what the map needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: SmolStr,
    pub position: (f64, f64, f64),
}

impl Entity {
    pub fn new(id: impl AsRef<str>, position: (f64, f64, f64)) -> Self {
        let id = id.as_ref();
        let id = if id.contains(':') {
            SmolStr::new(id)
        } else {
            SmolStr::new(format!("minecraft:{}", id))
        };
        Entity { id, position }
    }

    pub fn block_position(&self) -> (i32, i32, i32) {
        (
            self.position.0.floor() as i32,
            self.position.1.floor() as i32,
            self.position.2.floor() as i32,
        )
    }

    pub fn from_nbt(nbt: &NbtCompound) -> Result<Self, String> {
        let id = match nbt.get::<_, &str>("id") {
            Ok(id) => id,
            Err(_) => nbt
                .get::<_, &str>("Id")
                .map_err(|e| format!("Failed to get Entity id: {}", e))?,
        };

        let position = nbt
            .get::<_, &NbtList>("Pos")
            .map_err(|e| format!("Failed to get Entity position: {}", e))?;
        if position.len() != 3 {
            return Err("Invalid position data".to_string());
        }
        let coord = |i: usize| {
            position
                .get::<f64>(i)
                .map_err(|e| format!("Failed to get position component {}: {}", i, e))
        };

        Ok(Entity::new(id, (coord(0)?, coord(1)?, coord(2)?)))
    }

    pub fn to_nbt(&self) -> NbtTag {
        let mut compound = NbtCompound::new();
        compound.insert("id", NbtTag::String(self.id.to_string()));
        compound.insert(
            "Pos",
            NbtTag::List(NbtList::from(vec![
                NbtTag::Double(self.position.0),
                NbtTag::Double(self.position.1),
                NbtTag::Double(self.position.2),
            ])),
        );
        NbtTag::Compound(compound)
    }

    /// Parses every well-formed entry of an `Entities` list, skipping the rest.
    pub fn list_from_nbt(list: &NbtList) -> Vec<Entity> {
        list.iter()
            .filter_map(|tag| match tag {
                NbtTag::Compound(compound) => Entity::from_nbt(compound).ok(),
                _ => None,
            })
            .collect()
    }
}
