//! Channel positions and channel maps.

use std::fmt;

use crate::error::ConfigurationError;
use crate::sample::CHANNELS_MAX;

/// Speaker layer a position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Front speakers.
    Front,
    /// Rear speakers.
    Rear,
    /// Side speakers.
    Side,
    /// Mono, LFE, aux and top positions.
    Other,
}

/// Semantic position of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPosition {
    /// Single channel, matches any position when remixing.
    Mono,
    /// Front left.
    FrontLeft,
    /// Front right.
    FrontRight,
    /// Front center.
    FrontCenter,
    /// Rear center.
    RearCenter,
    /// Rear left.
    RearLeft,
    /// Rear right.
    RearRight,
    /// Low frequency effects (subwoofer).
    Lfe,
    /// Front left of center.
    FrontLeftOfCenter,
    /// Front right of center.
    FrontRightOfCenter,
    /// Side left.
    SideLeft,
    /// Side right.
    SideRight,
    /// Auxiliary channel without a speaker position, 0..=31.
    Aux(u8),
    /// Top center.
    TopCenter,
    /// Top front left.
    TopFrontLeft,
    /// Top front right.
    TopFrontRight,
    /// Top front center.
    TopFrontCenter,
    /// Top rear left.
    TopRearLeft,
    /// Top rear right.
    TopRearRight,
    /// Top rear center.
    TopRearCenter,
}

impl ChannelPosition {
    /// Returns true for positions on the left half of the room.
    #[must_use]
    pub const fn on_left(self) -> bool {
        matches!(
            self,
            Self::FrontLeft
                | Self::RearLeft
                | Self::FrontLeftOfCenter
                | Self::SideLeft
                | Self::TopFrontLeft
                | Self::TopRearLeft
        )
    }

    /// Returns true for positions on the right half of the room.
    #[must_use]
    pub const fn on_right(self) -> bool {
        matches!(
            self,
            Self::FrontRight
                | Self::RearRight
                | Self::FrontRightOfCenter
                | Self::SideRight
                | Self::TopFrontRight
                | Self::TopRearRight
        )
    }

    /// Returns true for positions on the center axis.
    #[must_use]
    pub const fn on_center(self) -> bool {
        matches!(
            self,
            Self::FrontCenter
                | Self::RearCenter
                | Self::TopCenter
                | Self::TopFrontCenter
                | Self::TopRearCenter
        )
    }

    /// Returns true for the subwoofer channel.
    #[must_use]
    pub const fn on_lfe(self) -> bool {
        matches!(self, Self::Lfe)
    }

    /// Returns the front/rear/side layer of the position.
    #[must_use]
    pub const fn layer(self) -> Layer {
        match self {
            Self::FrontLeft
            | Self::FrontRight
            | Self::FrontCenter
            | Self::FrontLeftOfCenter
            | Self::FrontRightOfCenter
            | Self::TopFrontLeft
            | Self::TopFrontRight
            | Self::TopFrontCenter => Layer::Front,
            Self::RearLeft
            | Self::RearRight
            | Self::RearCenter
            | Self::TopRearLeft
            | Self::TopRearRight
            | Self::TopRearCenter => Layer::Rear,
            Self::SideLeft | Self::SideRight => Layer::Side,
            _ => Layer::Other,
        }
    }

    /// Stable numeric code used on the wire.
    #[must_use]
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Mono => 0,
            Self::FrontLeft => 1,
            Self::FrontRight => 2,
            Self::FrontCenter => 3,
            Self::RearCenter => 4,
            Self::RearLeft => 5,
            Self::RearRight => 6,
            Self::Lfe => 7,
            Self::FrontLeftOfCenter => 8,
            Self::FrontRightOfCenter => 9,
            Self::SideLeft => 10,
            Self::SideRight => 11,
            Self::Aux(n) => 12 + (n & 31),
            Self::TopCenter => 44,
            Self::TopFrontLeft => 45,
            Self::TopFrontRight => 46,
            Self::TopFrontCenter => 47,
            Self::TopRearLeft => 48,
            Self::TopRearRight => 49,
            Self::TopRearCenter => 50,
        }
    }

    /// Inverse of [`wire_code`](Self::wire_code).
    #[must_use]
    pub const fn from_wire_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Mono,
            1 => Self::FrontLeft,
            2 => Self::FrontRight,
            3 => Self::FrontCenter,
            4 => Self::RearCenter,
            5 => Self::RearLeft,
            6 => Self::RearRight,
            7 => Self::Lfe,
            8 => Self::FrontLeftOfCenter,
            9 => Self::FrontRightOfCenter,
            10 => Self::SideLeft,
            11 => Self::SideRight,
            12..=43 => Self::Aux(code - 12),
            44 => Self::TopCenter,
            45 => Self::TopFrontLeft,
            46 => Self::TopFrontRight,
            47 => Self::TopFrontCenter,
            48 => Self::TopRearLeft,
            49 => Self::TopRearRight,
            50 => Self::TopRearCenter,
            _ => return None,
        })
    }

    /// Parses a position name such as `front-left`, `lfe` or `aux3`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(n) = name.strip_prefix("aux") {
            return n.parse::<u8>().ok().filter(|n| *n < 32).map(Self::Aux);
        }
        Some(match name {
            "mono" => Self::Mono,
            "front-left" | "left" => Self::FrontLeft,
            "front-right" | "right" => Self::FrontRight,
            "front-center" | "center" => Self::FrontCenter,
            "rear-center" => Self::RearCenter,
            "rear-left" => Self::RearLeft,
            "rear-right" => Self::RearRight,
            "lfe" | "subwoofer" => Self::Lfe,
            "front-left-of-center" => Self::FrontLeftOfCenter,
            "front-right-of-center" => Self::FrontRightOfCenter,
            "side-left" => Self::SideLeft,
            "side-right" => Self::SideRight,
            "top-center" => Self::TopCenter,
            "top-front-left" => Self::TopFrontLeft,
            "top-front-right" => Self::TopFrontRight,
            "top-front-center" => Self::TopFrontCenter,
            "top-rear-left" => Self::TopRearLeft,
            "top-rear-right" => Self::TopRearRight,
            "top-rear-center" => Self::TopRearCenter,
            _ => return None,
        })
    }
}

impl fmt::Display for ChannelPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mono => "mono",
            Self::FrontLeft => "front-left",
            Self::FrontRight => "front-right",
            Self::FrontCenter => "front-center",
            Self::RearCenter => "rear-center",
            Self::RearLeft => "rear-left",
            Self::RearRight => "rear-right",
            Self::Lfe => "lfe",
            Self::FrontLeftOfCenter => "front-left-of-center",
            Self::FrontRightOfCenter => "front-right-of-center",
            Self::SideLeft => "side-left",
            Self::SideRight => "side-right",
            Self::Aux(n) => return write!(f, "aux{n}"),
            Self::TopCenter => "top-center",
            Self::TopFrontLeft => "top-front-left",
            Self::TopFrontRight => "top-front-right",
            Self::TopFrontCenter => "top-front-center",
            Self::TopRearLeft => "top-rear-left",
            Self::TopRearRight => "top-rear-right",
            Self::TopRearCenter => "top-rear-center",
        };
        f.write_str(name)
    }
}

/// Ordered list of channel positions, one per channel of a stream.
///
/// # Example
///
/// ```
/// use stream_mixer::{ChannelMap, ChannelPosition};
///
/// let map: ChannelMap = "front-left,front-right,lfe".parse().unwrap();
/// assert_eq!(map.channels(), 3);
/// assert_eq!(map.positions()[2], ChannelPosition::Lfe);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelMap {
    positions: Vec<ChannelPosition>,
}

impl ChannelMap {
    /// Creates a map from explicit positions.
    pub fn new(positions: Vec<ChannelPosition>) -> Result<Self, ConfigurationError> {
        if positions.is_empty() {
            return Err(ConfigurationError::invalid_map("no positions"));
        }
        if positions.len() > CHANNELS_MAX {
            return Err(ConfigurationError::TooManyChannels {
                channels: positions.len(),
                max: CHANNELS_MAX,
            });
        }
        Ok(Self { positions })
    }

    /// Single mono channel.
    #[must_use]
    pub fn mono() -> Self {
        Self {
            positions: vec![ChannelPosition::Mono],
        }
    }

    /// Front left and front right.
    #[must_use]
    pub fn stereo() -> Self {
        Self {
            positions: vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
        }
    }

    /// 5.1 surround in the common interleaving order.
    #[must_use]
    pub fn surround_51() -> Self {
        use ChannelPosition::{FrontCenter, FrontLeft, FrontRight, Lfe, RearLeft, RearRight};
        Self {
            positions: vec![FrontLeft, FrontRight, RearLeft, RearRight, FrontCenter, Lfe],
        }
    }

    /// Default map for a channel count.
    ///
    /// Counts without a well-known layout get aux positions.
    pub fn default_for(channels: u8) -> Result<Self, ConfigurationError> {
        use ChannelPosition::{
            FrontCenter, FrontLeft, FrontRight, Lfe, RearCenter, RearLeft, RearRight, SideLeft,
            SideRight,
        };
        let positions = match channels {
            0 => return Err(ConfigurationError::invalid_map("zero channels")),
            1 => vec![ChannelPosition::Mono],
            2 => vec![FrontLeft, FrontRight],
            3 => vec![FrontLeft, FrontRight, FrontCenter],
            4 => vec![FrontLeft, FrontRight, RearLeft, RearRight],
            5 => vec![FrontLeft, FrontRight, RearLeft, RearRight, FrontCenter],
            6 => vec![FrontLeft, FrontRight, RearLeft, RearRight, FrontCenter, Lfe],
            7 => vec![FrontLeft, FrontRight, RearLeft, RearRight, FrontCenter, Lfe, RearCenter],
            8 => vec![
                FrontLeft,
                FrontRight,
                RearLeft,
                RearRight,
                FrontCenter,
                Lfe,
                SideLeft,
                SideRight,
            ],
            n => (0..n).map(ChannelPosition::Aux).collect(),
        };
        Self::new(positions)
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.positions.len()
    }

    /// Positions in channel order.
    #[must_use]
    pub fn positions(&self) -> &[ChannelPosition] {
        &self.positions
    }

    /// Returns true if the map has one position per channel of `channels`.
    #[must_use]
    pub fn is_compatible(&self, channels: u8) -> bool {
        self.positions.len() == channels as usize
    }

    /// Returns an error unless the map fits a spec with `channels` channels.
    pub fn check_compatible(&self, channels: u8) -> Result<(), ConfigurationError> {
        if self.is_compatible(channels) {
            Ok(())
        } else {
            Err(ConfigurationError::ChannelMapMismatch {
                channels,
                map_len: self.positions.len(),
            })
        }
    }

    /// Returns true if any position is a subwoofer.
    #[must_use]
    pub fn has_lfe(&self) -> bool {
        self.positions.iter().any(|p| p.on_lfe())
    }
}

impl std::str::FromStr for ChannelMap {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mono" => return Ok(Self::mono()),
            "stereo" => return Ok(Self::stereo()),
            "surround-51" => return Ok(Self::surround_51()),
            _ => {}
        }
        let positions = s
            .split(',')
            .map(|name| {
                ChannelPosition::from_name(name.trim()).ok_or_else(|| {
                    ConfigurationError::invalid_map(format!("unknown position '{name}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(positions)
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.positions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}
