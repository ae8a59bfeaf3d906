pub mod color;
pub mod distance;
pub mod kdtree;
pub mod kmeans;
pub mod quality;
pub mod rng;
pub mod sample;
pub mod types;
pub mod worker;

pub use distance::{Cie76, Cie94, Ciede2000, Distance, Euclidean, Metric, SquaredEuclidean};
pub use kdtree::{KdTree, KdTreeError, Neighbor};
pub use kmeans::adaptive::{XMeans, XMeansConfig};
pub use kmeans::lloyds::KMeans;
pub use kmeans::{
    Assignment, Cluster, ClusteringError, ClusteringResult, Clusterer, ErrorKind, Init,
    KMeansConfig,
};
pub use rgb::RGB8;
pub use types::Lab;

use snafu::prelude::*;
#[cfg(feature = "image")]
use std::ops::Deref;
use tracing::debug;

const U16_MAX: u16 = u16::MAX;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum InputImageError {
    #[snafu(display("image size must be positive"))]
    ZeroImageSize,

    #[snafu(display("buffer length {len} is not a multiple of 3"))]
    InvalidBufferLength { len: usize },

    #[snafu(display("buffer is empty"))]
    EmptyBuffer,

    #[snafu(display("image size ({width}x{height}) doesn't match the buffer size ({buf_size})"))]
    ImageSizeMismatch {
        width: u16,
        height: u16,
        buf_size: usize,
    },

    #[snafu(display(
        "image dimensions are too large, max image size is {U16_MAX}x{U16_MAX}, \
        got {width}x{height}"
    ))]
    ImageDimensionsTooLarge { width: u32, height: u32 },
}

/// A validated view of an RGBRGB… byte buffer.
#[derive(Debug, Copy, Clone)]
pub struct InputImage<'a> {
    width: u16,
    height: u16,
    buf: &'a [u8],
}

impl InputImage<'_> {
    pub fn from_bytes(
        width: u16,
        height: u16,
        buf: &[u8],
    ) -> Result<InputImage<'_>, InputImageError> {
        ensure!(!buf.is_empty(), EmptyBufferSnafu);
        ensure!(width > 0 && height > 0, ZeroImageSizeSnafu);
        ensure!(
            buf.len().is_multiple_of(3),
            InvalidBufferLengthSnafu { len: buf.len() }
        );
        ensure!(
            buf.len() == (width as usize) * (height as usize) * 3,
            ImageSizeMismatchSnafu {
                width,
                height,
                buf_size: buf.len()
            }
        );

        Ok(InputImage { width, height, buf })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }
}

#[cfg(feature = "image")]
impl<'a, Container> TryFrom<&'a image::ImageBuffer<image::Rgb<u8>, Container>> for InputImage<'a>
where
    Container: Deref<Target = [<image::Rgb<u8> as image::Pixel>::Subpixel]> + 'a,
{
    type Error = InputImageError;

    fn try_from(
        img: &'a image::ImageBuffer<image::Rgb<u8>, Container>,
    ) -> Result<Self, Self::Error> {
        let too_large = || {
            ImageDimensionsTooLargeSnafu {
                width: img.width(),
                height: img.height(),
            }
            .build()
        };
        let width = u16::try_from(img.width()).map_err(|_| too_large())?;
        let height = u16::try_from(img.height()).map_err(|_| too_large())?;
        Self::from_bytes(width, height, img.as_raw().deref())
    }
}

pub const DEFAULT_MIN_COLORS: usize = 2;
pub const DEFAULT_MAX_COLORS: usize = 8;
pub const DEFAULT_PALETTE_ITERATIONS: usize = 50;

/// Settings for [`palette`].
#[derive(Debug, Copy, Clone)]
pub struct PaletteConfig {
    /// Default: 2.
    pub min_colors: usize,
    /// Default: 8.
    pub max_colors: usize,
    /// Default: 50.
    pub max_iterations: usize,
    /// Default: [`rng::DEFAULT_SEED`].
    pub seed: u64,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            min_colors: DEFAULT_MIN_COLORS,
            max_colors: DEFAULT_MAX_COLORS,
            max_iterations: DEFAULT_PALETTE_ITERATIONS,
            seed: rng::DEFAULT_SEED,
        }
    }
}

impl PaletteConfig {
    #[must_use]
    pub fn with_colors(mut self, min_colors: usize, max_colors: usize) -> Self {
        self.min_colors = min_colors;
        self.max_colors = max_colors;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn xmeans(&self, min_k: usize, max_k: usize) -> XMeansConfig {
        XMeansConfig::new(min_k, max_k)
            .with_max_iterations(self.max_iterations)
            .with_seed(self.seed)
    }

    pub fn validate(&self) -> Result<(), ClusteringError> {
        self.xmeans(self.min_colors, self.max_colors).validate()
    }
}

/// One palette entry.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Swatch {
    pub rgb: RGB8,
    pub lab: Lab,
    /// Fraction of the (downsampled) image assigned to this colour.
    pub share: f64,
}

/// Extracts a palette of dominant colours from an image.
///
/// The image is downsampled, converted to CIELAB and clustered with X-means
/// under CIEDE2000, so the number of colours is picked between
/// `min_colors` and `max_colors`. Images with fewer sample points than
/// that get fewer colours.
///
/// ```
/// let input = xmeans::InputImage::from_bytes(2, 2,
///   &[255, 0, 0, 0, 255, 0,
///     255, 0, 0, 255, 0, 0]
/// ).unwrap();
///
/// let swatches = xmeans::palette(input, &xmeans::PaletteConfig::default()).unwrap();
/// let colors: Vec<_> = swatches.iter().map(|s| s.rgb).collect();
///
/// let green = rgb::Rgb { r: 0, g: 255, b: 0 };
/// let red = rgb::Rgb { r: 255, g: 0, b: 0 };
/// assert_eq!(vec![red, green], colors);
/// assert_eq!(swatches[0].share, 0.75);
/// ```
///
/// With the `image` feature, an [`image::ImageBuffer`] can be used directly:
///
#[cfg_attr(
    not(feature = "image"),
    doc = r##"
```compile_fail
let img = image::ImageBuffer::from_raw(2, 1, vec![255, 0, 0, 255, 0, 0]).unwrap();
let input = xmeans::InputImage::try_from(&img).unwrap();
```
"##
)]
#[cfg_attr(
    feature = "image",
    doc = r##"
```
let img = image::ImageBuffer::from_raw(2, 1, vec![255, 0, 0, 255, 0, 0]).unwrap();
let input = xmeans::InputImage::try_from(&img).unwrap();

let swatches = xmeans::palette(input, &xmeans::PaletteConfig::default()).unwrap();

let red = rgb::Rgb { r: 255, g: 0, b: 0 };
assert_eq!(vec![red], swatches.iter().map(|s| s.rgb).collect::<Vec<_>>());
```
"##
)]
///
/// Swatches come sorted by share, largest first.
pub fn palette(input: InputImage, config: &PaletteConfig) -> Result<Vec<Swatch>, ClusteringError> {
    config.validate()?;

    let sample = sample::sample(input.width, input.height, input.buf);
    let points = sample.points;
    let n = points.len();
    debug!(
        width = sample.width,
        height = sample.height,
        "sampled image"
    );

    if n == 1 {
        let lab = Lab::from_point(&points[0]);
        return Ok(vec![Swatch {
            rgb: color::lab_to_srgb8(lab),
            lab,
            share: 1.0,
        }]);
    }

    // X-means needs more points than clusters
    let max_k = config.max_colors.min(n - 1);
    let min_k = config.min_colors.min(max_k);
    let xmeans = XMeans::new(config.xmeans(min_k, max_k), Ciede2000::default())?;
    let result = xmeans.transform(&points)?;

    let mut swatches: Vec<Swatch> = result
        .clusters
        .iter()
        .map(|cluster| {
            let lab = Lab::from_point(&cluster.centroid);
            Swatch {
                rgb: color::lab_to_srgb8(lab),
                lab,
                share: cluster.members.len() as f64 / n as f64,
            }
        })
        .collect();

    swatches.sort_by(|a, b| b.share.total_cmp(&a.share));
    debug!(colors = swatches.len(), converged = result.converged, "palette extracted");

    Ok(swatches)
}
