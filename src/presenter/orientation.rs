//! Physical device orientation to mirrored display orientation.

use serde::{Deserialize, Serialize};

/// Physical orientation reported by the host rotation notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum DeviceOrientation {
    Unknown,
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
}

/// How the renderer should orient the image. The preview is always mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrientation {
    /// Upright, flipped horizontally.
    #[default]
    UpMirrored,
    /// Rotated 180 degrees, flipped horizontally.
    DownMirrored,
    /// Rotated 270 degrees clockwise, flipped horizontally.
    LeftMirrored,
    /// Rotated 90 degrees clockwise, flipped horizontally.
    RightMirrored,
}

impl ImageOrientation {
    /// Clockwise rotation in degrees applied before the horizontal flip.
    pub fn rotation_degrees(&self) -> u16 {
        match self {
            Self::UpMirrored => 0,
            Self::RightMirrored => 90,
            Self::DownMirrored => 180,
            Self::LeftMirrored => 270,
        }
    }
}

impl From<DeviceOrientation> for ImageOrientation {
    fn from(orientation: DeviceOrientation) -> Self {
        match orientation {
            DeviceOrientation::Portrait => Self::UpMirrored,
            DeviceOrientation::LandscapeRight => Self::RightMirrored,
            DeviceOrientation::LandscapeLeft => Self::LeftMirrored,
            DeviceOrientation::PortraitUpsideDown => Self::DownMirrored,
            DeviceOrientation::Unknown => Self::UpMirrored,
            DeviceOrientation::FaceUp => Self::UpMirrored,
            DeviceOrientation::FaceDown => Self::DownMirrored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_table() {
        let table = [
            (DeviceOrientation::Portrait, ImageOrientation::UpMirrored),
            (DeviceOrientation::LandscapeRight, ImageOrientation::RightMirrored),
            (DeviceOrientation::LandscapeLeft, ImageOrientation::LeftMirrored),
            (DeviceOrientation::PortraitUpsideDown, ImageOrientation::DownMirrored),
            (DeviceOrientation::Unknown, ImageOrientation::UpMirrored),
            (DeviceOrientation::FaceUp, ImageOrientation::UpMirrored),
            (DeviceOrientation::FaceDown, ImageOrientation::DownMirrored),
        ];
        for (device, expected) in table {
            assert_eq!(ImageOrientation::from(device), expected, "{device:?}");
        }
    }

    #[test]
    fn test_default_is_up_mirrored() {
        assert_eq!(ImageOrientation::default(), ImageOrientation::UpMirrored);
        assert_eq!(ImageOrientation::default().rotation_degrees(), 0);
    }
}
