use quartz_nbt::{NbtCompound, NbtTag};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Plain air, returned for empty sections and missing palettes.
pub static AIR: BlockState = BlockState {
    name: SmolStr::new_inline("minecraft:air"),
    properties: Vec::new(),
};

/// Sentinel for palette indices that point outside the palette.
pub static MISSING: BlockState = BlockState {
    name: SmolStr::new_inline("nucmap:missing"),
    properties: Vec::new(),
};

/// A namespaced block id plus its properties.
///
/// Properties are kept sorted by key, so equality and hashing do not
/// depend on the order they were read in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    pub name: SmolStr,
    properties: Vec<(SmolStr, SmolStr)>,
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.properties.is_empty() {
            write!(f, "[")?;
            for (i, (key, value)) in self.properties.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}={}", key, value)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl BlockState {
    /// Creates a state; ids without a namespace get `minecraft:`.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        let name = if name.contains(':') {
            SmolStr::new(name)
        } else {
            SmolStr::new(format!("minecraft:{}", name))
        };
        BlockState {
            name,
            properties: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        self.name.split_once(':').map(|(ns, _)| ns).unwrap_or("minecraft")
    }

    pub fn id(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, id)| id)
            .unwrap_or(self.name.as_str())
    }

    pub fn properties(&self) -> &[(SmolStr, SmolStr)] {
        &self.properties
    }

    /// Returns a new state with `key` set to `value`.
    pub fn with(&self, key: impl Into<SmolStr>, value: impl Into<SmolStr>) -> Self {
        let mut state = self.clone();
        state.set_property(key, value);
        state
    }

    pub fn with_property(mut self, key: impl Into<SmolStr>, value: impl Into<SmolStr>) -> Self {
        self.set_property(key, value);
        self
    }

    fn set_property(&mut self, key: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        let key = key.into();
        let value = value.into();
        match self.properties.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(i) => self.properties[i].1 = value,
            Err(i) => self.properties.insert(i, (key, value)),
        }
    }

    pub fn get_property(&self, key: &str) -> Option<&SmolStr> {
        self.properties
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| &self.properties[i].1)
    }

    pub fn is_air(&self) -> bool {
        matches!(
            self.name.as_str(),
            "minecraft:air" | "minecraft:cave_air" | "minecraft:void_air"
        )
    }

    pub fn is_missing(&self) -> bool {
        *self == MISSING
    }

    pub fn to_nbt(&self) -> NbtTag {
        let mut compound = NbtCompound::new();
        compound.insert("Name", self.name.to_string());

        if !self.properties.is_empty() {
            let mut properties = NbtCompound::new();
            for (key, value) in &self.properties {
                properties.insert(key.to_string(), value.to_string());
            }
            compound.insert("Properties", properties);
        }

        NbtTag::Compound(compound)
    }

    pub fn from_nbt(compound: &NbtCompound) -> Result<Self, String> {
        let name = compound
            .get::<_, &str>("Name")
            .map_err(|e| format!("Failed to get Name: {}", e))?;

        let mut state = BlockState::new(name);
        if let Ok(props) = compound.get::<_, &NbtCompound>("Properties") {
            for (key, value) in props.inner() {
                if let NbtTag::String(value_str) = value {
                    state.set_property(key.as_str(), value_str.as_str());
                }
            }
        }

        Ok(state)
    }
}
