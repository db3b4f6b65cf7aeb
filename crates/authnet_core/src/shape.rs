//! Image shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Declared input contract of an image classifier.
///
/// Follows the convention `(H, W, C)`:
/// - `H`: Image height in pixels
/// - `W`: Image width in pixels
/// - `C`: Channels (3 for RGB)
///
/// Tensors fed to a classifier use the burn layout `(N, C, H, W)`; see
/// [`ImageShape::as_nchw`].
///
/// # Example
///
/// ```rust
/// use authnet_core::ImageShape;
///
/// let shape = ImageShape::new(224, 224, 3);
/// assert_eq!(shape.height(), 224);
/// assert_eq!(shape.as_nchw(1), [1, 3, 224, 224]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    height: usize,
    width: usize,
    channels: usize,
}

impl Default for ImageShape {
    fn default() -> Self {
        Self::square(224)
    }
}

impl ImageShape {
    /// Create a new ImageShape with the specified dimensions.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// A square RGB shape, e.g. `square(224)` for 224×224×3.
    #[must_use]
    pub const fn square(size: usize) -> Self {
        Self::new(size, size, 3)
    }

    /// Create an ImageShape from an NCHW dimension array, ignoring the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 4 elements.
    pub fn from_nchw(dims: &[usize]) -> Result<Self> {
        if dims.len() != 4 {
            return Err(CoreError::DimensionError {
                expected: 4,
                got: dims.len(),
            });
        }
        Ok(Self::new(dims[2], dims[3], dims[1]))
    }

    /// Get the height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Get the width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Get the number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Check if this is an empty shape (any dimension is zero).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0 || self.channels == 0
    }

    /// Number of values in one image of this shape.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Burn tensor dimensions for a batch of images of this shape.
    #[must_use]
    pub const fn as_nchw(&self, batch: usize) -> [usize; 4] {
        [batch, self.channels, self.height, self.width]
    }

    /// Check that an NCHW tensor shape satisfies this contract (any batch size).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShape`] when channels, height or width differ.
    pub fn check_nchw(&self, dims: [usize; 4]) -> Result<()> {
        let got = Self::from_nchw(&dims)?;
        if got != *self {
            return Err(CoreError::InvalidShape {
                expected: self.to_string(),
                got: got.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(H={}, W={}, C={})", self.height, self.width, self.channels)
    }
}

impl From<(usize, usize, usize)> for ImageShape {
    fn from((height, width, channels): (usize, usize, usize)) -> Self {
        Self::new(height, width, channels)
    }
}
