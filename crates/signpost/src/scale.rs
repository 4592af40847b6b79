//! Colour scales for choropleth layers.
//!
//! A scale is built from a numeric column: class breaks (quantile, k-means
//! or equal interval) over the data, and a value → colour lookup across a
//! sequential palette. A continuous scale is an equal-interval scale with
//! 100 breaks whose lookup is not snapped to classes.

use std::fmt;
use std::str::FromStr;

use colorgrad::{preset, BasisGradient, BlendMode, Color, Gradient, GradientBuilder, LinearGradient};
use serde::{Deserialize, Serialize, Serializer};

use crate::types::{SignpostError, SignpostResult};

/// Break count used to emulate a continuous colour range.
pub const CONTINUOUS_BREAKS: usize = 100;

/// Default number of classes.
pub const DEFAULT_CLASSES: usize = 5;

const KMEANS_MAX_ITERATIONS: usize = 200;

/// Colour returned for values that cannot be placed on the scale.
pub const NO_DATA: Rgb = Rgb::new(0xcc, 0xcc, 0xcc);

/// An sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<Color> for Rgb {
    fn from(color: Color) -> Self {
        let [r, g, b, _] = color.to_rgba8();
        Self::new(r, g, b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Palette the scale interpolates across.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Palette {
    /// A ColorBrewer sequential palette name, e.g. `Blues`.
    Named(String),
    /// Explicit colour stops in CSS notation.
    Colors(Vec<String>),
}

impl Default for Palette {
    fn default() -> Self {
        Palette::Named("Purples".to_string())
    }
}

impl Palette {
    pub fn named(name: &str) -> Self {
        Palette::Named(name.to_string())
    }

    /// Gradient for this palette. Brewer presets keep their own curve;
    /// `mode` applies to explicit stops.
    fn gradient(&self, mode: ColorMode) -> Result<Ramp, String> {
        match self {
            Palette::Named(name) => {
                let ramp = match name.to_ascii_lowercase().as_str() {
                    "blues" => preset::blues(),
                    "purples" => preset::purples(),
                    "greens" => preset::greens(),
                    "oranges" => preset::oranges(),
                    "reds" => preset::reds(),
                    "greys" => preset::greys(),
                    "ylorrd" => preset::yl_or_rd(),
                    _ => return Err(format!("unknown palette '{name}'")),
                };
                Ok(Ramp::Preset(ramp))
            }
            Palette::Colors(colors) => {
                if colors.is_empty() {
                    return Err("palette has no colours".to_string());
                }
                GradientBuilder::new()
                    .html_colors(colors.as_slice())
                    .mode(mode.into())
                    .build::<LinearGradient>()
                    .map(Ramp::Stops)
                    .map_err(|e| format!("invalid palette: {e}"))
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Ramp {
    Preset(BasisGradient),
    Stops(LinearGradient),
}

impl Ramp {
    fn at(&self, t: f64) -> Rgb {
        let t = t as f32;
        match self {
            Ramp::Preset(g) => g.at(t).into(),
            Ramp::Stops(g) => g.at(t).into(),
        }
    }
}

/// Colour space used for interpolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Rgb,
    #[default]
    Lab,
}

impl From<ColorMode> for BlendMode {
    fn from(mode: ColorMode) -> Self {
        match mode {
            ColorMode::Rgb => BlendMode::Rgb,
            ColorMode::Lab => BlendMode::Lab,
        }
    }
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(ColorMode::Rgb),
            "lab" => Ok(ColorMode::Lab),
            other => Err(format!("unsupported colour mode '{other}'")),
        }
    }
}

/// How class breaks are placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakMode {
    #[default]
    Quantile,
    KMeans,
    EqualInterval,
}

impl FromStr for BreakMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "q" | "quantile" => Ok(BreakMode::Quantile),
            "k" | "kmeans" | "k-means" => Ok(BreakMode::KMeans),
            "e" | "equal" | "equal_interval" => Ok(BreakMode::EqualInterval),
            other => Err(format!("unknown break mode '{other}'")),
        }
    }
}

/// Classed or continuous colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Breaks {
    Classes { mode: BreakMode, count: usize },
    Continuous,
}

impl Default for Breaks {
    fn default() -> Self {
        Breaks::Classes {
            mode: BreakMode::Quantile,
            count: DEFAULT_CLASSES,
        }
    }
}

/// Inputs for [`ColorScale::build`].
#[derive(Debug, Clone, Default)]
pub struct ScaleOptions {
    pub data: Vec<f64>,
    pub palette: Palette,
    pub mode: ColorMode,
    pub breaks: Breaks,
}

impl ScaleOptions {
    pub fn new(data: Vec<f64>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn mode(mut self, mode: ColorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn breaks(mut self, breaks: Breaks) -> Self {
        self.breaks = breaks;
        self
    }
}

/// Computed class breaks plus a value → colour lookup.
#[derive(Debug, Clone)]
pub struct ColorScale {
    limits: Vec<f64>,
    classed: bool,
    ramp: Ramp,
}

impl ColorScale {
    /// Build a scale. Any failure is reported as a single [`SignpostError::Scale`].
    pub fn build(options: ScaleOptions) -> SignpostResult<Self> {
        Self::try_build(options).map_err(SignpostError::Scale)
    }

    fn try_build(options: ScaleOptions) -> Result<Self, String> {
        let ramp = options.palette.gradient(options.mode)?;

        let (mode, count, classed) = match options.breaks {
            Breaks::Classes { mode, count } => (mode, count, true),
            Breaks::Continuous => (BreakMode::EqualInterval, CONTINUOUS_BREAKS, false),
        };

        let limits = limits(&options.data, mode, count)?;
        tracing::debug!(
            "Built {} colour scale with {} limits over [{}, {}]",
            if classed { "classed" } else { "continuous" },
            limits.len(),
            limits[0],
            limits[limits.len() - 1]
        );

        Ok(Self {
            limits,
            classed,
            ramp,
        })
    }

    /// Class breaks from the minimum through to the maximum of the data.
    pub fn limits(&self) -> &[f64] {
        &self.limits
    }

    pub fn is_classed(&self) -> bool {
        self.classed
    }

    /// Colour for a value within the data's range.
    pub fn color(&self, value: f64) -> Rgb {
        if !value.is_finite() {
            return NO_DATA;
        }

        let min = self.limits[0];
        let max = self.limits[self.limits.len() - 1];

        let classes = self.limits.len() - 1;
        // A single class has nothing to snap to, so it shades continuously.
        let t = if self.classed && classes > 1 {
            self.class_of(value) as f64 / (classes - 1) as f64
        } else if max > min {
            (value - min) / (max - min)
        } else {
            0.0
        };

        self.ramp.at(t.clamp(0.0, 1.0))
    }

    /// Colour as `#rrggbb`, or the no-data colour for missing values.
    pub fn color_hex(&self, value: Option<f64>) -> String {
        value.map(|v| self.color(v)).unwrap_or(NO_DATA).to_string()
    }

    /// Index of the class containing `value`; below-range values fall in
    /// the first class and the maximum belongs to the last.
    fn class_of(&self, value: f64) -> usize {
        let classes = self.limits.len() - 1;
        let mut i = 0;
        while i < classes && value >= self.limits[i] {
            i += 1;
        }
        i.saturating_sub(1)
    }
}

/// Compute class breaks: `count + 1` values from min to max for quantile and
/// equal interval; k-means may return fewer when clusters coincide.
pub fn limits(data: &[f64], mode: BreakMode, count: usize) -> Result<Vec<f64>, String> {
    if count == 0 {
        return Err("class count must be at least 1".to_string());
    }

    let mut values: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return Err("no numeric values to classify".to_string());
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let min = values[0];
    let max = values[values.len() - 1];

    let limits = match mode {
        BreakMode::EqualInterval => equal_interval(min, max, count),
        BreakMode::Quantile => quantiles(&values, count),
        BreakMode::KMeans => kmeans(&values, count),
    };

    Ok(limits)
}

fn equal_interval(min: f64, max: f64, count: usize) -> Vec<f64> {
    let mut limits: Vec<f64> = (0..=count)
        .map(|i| min + (max - min) * i as f64 / count as f64)
        .collect();
    limits[count] = max;
    limits
}

fn quantiles(sorted: &[f64], count: usize) -> Vec<f64> {
    let last = sorted.len() - 1;
    (0..=count)
        .map(|i| {
            if i == 0 {
                return sorted[0];
            }
            if i == count {
                return sorted[last];
            }
            let p = last as f64 * i as f64 / count as f64;
            let lower = p.floor() as usize;
            let fraction = p - lower as f64;
            if fraction == 0.0 || lower >= last {
                sorted[lower]
            } else {
                sorted[lower] * (1.0 - fraction) + sorted[lower + 1] * fraction
            }
        })
        .collect()
}

/// One-dimensional Lloyd's k-means over sorted values. Breaks are the
/// minimum followed by the upper bound of each non-empty cluster.
fn kmeans(sorted: &[f64], count: usize) -> Vec<f64> {
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];

    let mut centroids: Vec<f64> = (0..count)
        .map(|i| min + (max - min) * (i as f64 + 0.5) / count as f64)
        .collect();
    let mut assignments = vec![0usize; sorted.len()];

    for _ in 0..KMEANS_MAX_ITERATIONS {
        for (value, slot) in sorted.iter().zip(assignments.iter_mut()) {
            *slot = nearest(&centroids, *value);
        }

        let mut sums = vec![0.0; count];
        let mut sizes = vec![0usize; count];
        for (value, cluster) in sorted.iter().zip(&assignments) {
            sums[*cluster] += value;
            sizes[*cluster] += 1;
        }

        let updated: Vec<f64> = centroids
            .iter()
            .enumerate()
            .map(|(j, c)| if sizes[j] > 0 { sums[j] / sizes[j] as f64 } else { *c })
            .collect();

        if updated == centroids {
            break;
        }
        centroids = updated;
    }

    let mut upper_bounds: Vec<f64> = (0..count)
        .filter_map(|j| {
            sorted
                .iter()
                .zip(&assignments)
                .filter(|(_, a)| **a == j)
                .map(|(v, _)| *v)
                .last()
        })
        .collect();
    upper_bounds.sort_by(|a, b| a.total_cmp(b));
    upper_bounds.dedup();

    let mut limits = vec![min];
    limits.extend(upper_bounds.into_iter().filter(|v| *v > min));
    if limits.len() == 1 {
        limits.push(max);
    }
    limits
}

fn nearest(centroids: &[f64], value: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (j, c) in centroids.iter().enumerate() {
        let d = (value - c).abs();
        if d < best_distance {
            best = j;
            best_distance = d;
        }
    }
    best
}
