//! Observation and action spaces.
//!
//! A [`Space`] describes the set of values an observation or an action can
//! take. Policies use it to derive the input and output widths of their
//! networks and to draw random actions for exploration.
use crate::error::PolicyError;
use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Element type of a [`BoxSpace`].
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum SpaceDtype {
    /// 32-bit floating point values.
    F32,

    /// 8-bit unsigned values, typically pixels.
    U8,
}

impl Default for SpaceDtype {
    fn default() -> Self {
        Self::F32
    }
}

/// A finite set of integers `{0, 1, ..., n - 1}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Discrete {
    /// The number of elements.
    pub n: usize,
}

impl Discrete {
    /// Constructs a discrete space with `n` elements.
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    /// Draws an element uniformly at random.
    ///
    /// Panics if `n == 0`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        rng.gen_range(0..self.n) as i64
    }

    /// Returns `true` if `v` is an element of the space.
    pub fn contains(&self, v: i64) -> bool {
        v >= 0 && (v as usize) < self.n
    }
}

/// A box in `R^n` with the same bounds on every element.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BoxSpace {
    /// Shape of a single value in the space.
    pub shape: Vec<usize>,

    /// Lower bound.
    #[serde(default = "default_low")]
    pub low: f32,

    /// Upper bound.
    #[serde(default = "default_high")]
    pub high: f32,

    /// Element type.
    #[serde(default)]
    pub dtype: SpaceDtype,
}

fn default_low() -> f32 {
    -1.0
}

fn default_high() -> f32 {
    1.0
}

impl BoxSpace {
    /// Constructs a box space of `f32` values.
    pub fn new(shape: Vec<usize>, low: f32, high: f32) -> Self {
        Self {
            shape,
            low,
            high,
            dtype: SpaceDtype::F32,
        }
    }

    /// Constructs a box space of pixels in `[0, 255]`.
    pub fn image(shape: Vec<usize>) -> Self {
        Self {
            shape,
            low: 0.0,
            high: 255.0,
            dtype: SpaceDtype::U8,
        }
    }

    /// Returns `true` if values in the space look like images, i.e., `u8` arrays of rank 3.
    pub fn is_image(&self) -> bool {
        self.dtype == SpaceDtype::U8 && self.shape.len() == 3
    }

    /// The number of elements in a single value.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Draws a value uniformly at random, flattened in row-major order.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f32> {
        let width = self.high - self.low;
        (0..self.numel())
            .map(|_| {
                let v = self.low + width * rng.gen::<f32>();
                match self.dtype {
                    SpaceDtype::F32 => v,
                    SpaceDtype::U8 => v.floor(),
                }
            })
            .collect()
    }
}

/// Observation or action space.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum Space {
    /// Finite, enumerable set of integers.
    Discrete(Discrete),

    /// Box of real values.
    Box(BoxSpace),
}

impl Space {
    /// Shorthand of `Space::Discrete(Discrete::new(n))`.
    pub fn discrete(n: usize) -> Self {
        Self::Discrete(Discrete::new(n))
    }

    /// Shorthand of `Space::Box(BoxSpace::new(shape, low, high))`.
    pub fn boxed(shape: Vec<usize>, low: f32, high: f32) -> Self {
        Self::Box(BoxSpace::new(shape, low, high))
    }

    /// The number of elements, available only for discrete spaces.
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            Self::Discrete(d) => Some(d.n),
            Self::Box(_) => None,
        }
    }

    /// Width of a flattened value in the space.
    ///
    /// Discrete values are one-hot encoded, so the width is the cardinality.
    pub fn dimensionality(&self) -> usize {
        match self {
            Self::Discrete(d) => d.n,
            Self::Box(b) => b.numel(),
        }
    }

    /// Shape of a single value, `[]` for discrete spaces.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Discrete(_) => vec![],
            Self::Box(b) => b.shape.clone(),
        }
    }

    /// Returns the discrete space, fails for other spaces.
    pub fn as_discrete(&self) -> Result<&Discrete> {
        match self {
            Self::Discrete(d) => Ok(d),
            Self::Box(b) => Err(PolicyError::UnsupportedSpace(format!(
                "expected a discrete space, got a box of shape {:?}",
                b.shape
            ))
            .into()),
        }
    }

    /// Returns `true` if values in the space are images.
    pub fn is_image(&self) -> bool {
        match self {
            Self::Discrete(_) => false,
            Self::Box(b) => b.is_image(),
        }
    }
}
