//! Output side of the rasterizers: the per-tile builder and the draw functions
//! that translate a rasterizer weight into builder writes

use crate::element::TILE_SIZE;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Custom-bag key holding a [`TreeCover`] grid
pub const TREE_COVER_KEY: &str = "tree_cover";

/// Index of local block `(x, z)` in a row-major tile grid
#[inline]
pub fn block_index(x: usize, z: usize) -> usize {
    z * TILE_SIZE + x
}

/// Opaque block identifier such as `"minecraft:sand"`
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockState(Arc<str>);

impl BlockState {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockState({})", self.0)
    }
}

/// Per-block tree density, `NaN` where nothing was written
#[derive(Debug, Clone)]
pub struct TreeCover(pub [f64; TILE_SIZE * TILE_SIZE]);

impl Default for TreeCover {
    fn default() -> Self {
        Self([f64::NAN; TILE_SIZE * TILE_SIZE])
    }
}

/// Mutable per-tile sink for terrain instructions.
///
/// Local coordinates are in `0..TILE_SIZE` on both axes.
pub trait TileBuilder {
    fn surface_height(&mut self, x: usize, z: usize, value: f64);

    /// Record a water depth; implementations keep the deepest value written
    fn update_water_depth(&mut self, x: usize, z: usize, weight: i32);

    /// Row-major surface block overrides, `TILE_SIZE²` entries
    fn surface_blocks(&mut self) -> &mut [Option<BlockState>];

    fn get_custom(&self, key: &str) -> Option<&(dyn Any + Send + Sync)>;

    fn custom_mut(&mut self, key: &str) -> Option<&mut (dyn Any + Send + Sync)>;

    fn put_custom(&mut self, key: &str, value: Box<dyn Any + Send + Sync>);
}

/// In-memory [`TileBuilder`] backed by flat grids
pub struct GridBuilder {
    heights: Vec<f64>,
    water_depth: Vec<Option<i32>>,
    blocks: Vec<Option<BlockState>>,
    custom: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl GridBuilder {
    pub fn new() -> Self {
        let n = TILE_SIZE * TILE_SIZE;
        Self {
            heights: vec![f64::NAN; n],
            water_depth: vec![None; n],
            blocks: vec![None; n],
            custom: HashMap::new(),
        }
    }

    pub fn height(&self, x: usize, z: usize) -> f64 {
        self.heights[block_index(x, z)]
    }

    /// Deepest water weight written at `(x, z)`, if any
    pub fn water_depth(&self, x: usize, z: usize) -> Option<i32> {
        self.water_depth[block_index(x, z)]
    }

    pub fn block(&self, x: usize, z: usize) -> Option<&BlockState> {
        self.blocks[block_index(x, z)].as_ref()
    }

    pub fn tree_cover(&self) -> Option<&TreeCover> {
        self.get_custom(TREE_COVER_KEY)?.downcast_ref()
    }
}

impl Default for GridBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GridBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridBuilder")
            .field("blocks", &self.blocks.iter().filter(|b| b.is_some()).count())
            .field(
                "water",
                &self.water_depth.iter().filter(|w| w.is_some()).count(),
            )
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TileBuilder for GridBuilder {
    fn surface_height(&mut self, x: usize, z: usize, value: f64) {
        self.heights[block_index(x, z)] = value;
    }

    fn update_water_depth(&mut self, x: usize, z: usize, weight: i32) {
        let slot = &mut self.water_depth[block_index(x, z)];
        *slot = Some(slot.map_or(weight, |w| w.max(weight)));
    }

    fn surface_blocks(&mut self) -> &mut [Option<BlockState>] {
        &mut self.blocks
    }

    fn get_custom(&self, key: &str) -> Option<&(dyn Any + Send + Sync)> {
        self.custom.get(key).map(|b| b.as_ref())
    }

    fn custom_mut(&mut self, key: &str) -> Option<&mut (dyn Any + Send + Sync)> {
        self.custom.get_mut(key).map(|b| b.as_mut())
    }

    fn put_custom(&mut self, key: &str, value: Box<dyn Any + Send + Sync>) {
        self.custom.insert(key.to_string(), value);
    }
}

/// Predicate over a rasterizer weight
#[derive(Debug, Clone, PartialEq)]
pub enum DoubleCondition {
    Equal(f64),
    GreaterThan(f64),
    LessThan(f64),
    /// `min <= value <= max`
    InRange { min: f64, max: f64 },
    Not(Box<DoubleCondition>),
    And(Vec<DoubleCondition>),
    Or(Vec<DoubleCondition>),
}

impl DoubleCondition {
    pub fn test(&self, value: f64) -> bool {
        match self {
            Self::Equal(v) => value == *v,
            Self::GreaterThan(v) => value > *v,
            Self::LessThan(v) => value < *v,
            Self::InRange { min, max } => *min <= value && value <= *max,
            Self::Not(inner) => !inner.test(value),
            Self::And(all) => all.iter().all(|c| c.test(value)),
            Self::Or(any) => any.iter().any(|c| c.test(value)),
        }
    }
}

/// What a rasterized element does to each block it touches
#[derive(Debug, Clone, PartialEq)]
pub enum DrawFunction {
    /// Apply every delegate in order
    All(Vec<DrawFunction>),
    /// Replace the surface block where the weight is positive
    Block(BlockState),
    /// Raise the water depth to the weight
    Water,
    /// Clear tree cover where the weight is positive
    NoTrees,
    AddConstant {
        value: i32,
        delegate: Box<DrawFunction>,
    },
    Clamp {
        min: i32,
        max: i32,
        delegate: Box<DrawFunction>,
    },
    /// Forward only weights satisfying the condition
    Conditional {
        condition: DoubleCondition,
        delegate: Box<DrawFunction>,
    },
}

impl DrawFunction {
    pub fn draw(&self, builder: &mut dyn TileBuilder, x: usize, z: usize, weight: i32) {
        match self {
            Self::All(all) => {
                for f in all {
                    f.draw(builder, x, z, weight);
                }
            }
            Self::Block(state) => {
                if weight > 0 {
                    if let Some(slot) = builder.surface_blocks().get_mut(block_index(x, z)) {
                        *slot = Some(state.clone());
                    }
                }
            }
            Self::Water => builder.update_water_depth(x, z, weight),
            Self::NoTrees => {
                if weight > 0 {
                    clear_tree_cover(builder, x, z);
                }
            }
            Self::AddConstant { value, delegate } => {
                delegate.draw(builder, x, z, weight.saturating_add(*value))
            }
            Self::Clamp { min, max, delegate } => {
                delegate.draw(builder, x, z, weight.clamp(*min, (*max).max(*min)))
            }
            Self::Conditional {
                condition,
                delegate,
            } => {
                if condition.test(weight as f64) {
                    delegate.draw(builder, x, z, weight);
                }
            }
        }
    }
}

fn clear_tree_cover(builder: &mut dyn TileBuilder, x: usize, z: usize) {
    let index = block_index(x, z);
    if let Some(cover) = builder
        .custom_mut(TREE_COVER_KEY)
        .and_then(|c| c.downcast_mut::<TreeCover>())
    {
        cover.0[index] = 0.0;
        return;
    }
    let mut cover = TreeCover::default();
    cover.0[index] = 0.0;
    builder.put_custom(TREE_COVER_KEY, Box::new(cover));
}
