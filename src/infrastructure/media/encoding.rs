//! Resolution-tiered encoding parameters.

/// One rung of the bitrate ladder. A source qualifies when its height is at
/// least `min_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderTier {
    pub min_height: u32,
    pub bitrate_kbps: u32,
    pub crf: u8,
}

/// Ordered from the tallest tier down; the last tier accepts every height.
pub const BITRATE_LADDER: [LadderTier; 4] = [
    LadderTier { min_height: 1080, bitrate_kbps: 1000, crf: 28 },
    LadderTier { min_height: 720, bitrate_kbps: 600, crf: 27 },
    LadderTier { min_height: 480, bitrate_kbps: 400, crf: 26 },
    LadderTier { min_height: 0, bitrate_kbps: 250, crf: 25 },
];

const MAXRATE_FACTOR: f64 = 1.1;
const BUFSIZE_FACTOR: f64 = 1.2;

pub const THUMBNAIL_MAX_OFFSET_SECS: f64 = 5.0;
const THUMBNAIL_DURATION_FRACTION: f64 = 0.1;

pub fn select_tier(source_height: u32) -> LadderTier {
    BITRATE_LADDER
        .iter()
        .copied()
        .find(|tier| source_height >= tier.min_height)
        .unwrap_or(BITRATE_LADDER[BITRATE_LADDER.len() - 1])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingPlan {
    pub bitrate_kbps: u32,
    pub crf: u8,
    pub maxrate_kbps: u32,
    pub bufsize_kbps: u32,
}

impl EncodingPlan {
    /// Picks the tier for `source_height` and caps its bitrate at `max_bitrate_kbps`.
    pub fn for_source(source_height: u32, max_bitrate_kbps: u32) -> Self {
        let tier = select_tier(source_height);
        let bitrate_kbps = tier.bitrate_kbps.min(max_bitrate_kbps);

        Self {
            bitrate_kbps,
            crf: tier.crf,
            maxrate_kbps: (bitrate_kbps as f64 * MAXRATE_FACTOR).round() as u32,
            bufsize_kbps: (bitrate_kbps as f64 * BUFSIZE_FACTOR).round() as u32,
        }
    }
}

/// Seek position for the thumbnail: `min(5s, 10% of duration)`.
pub fn thumbnail_offset(duration_secs: f64) -> f64 {
    (duration_secs * THUMBNAIL_DURATION_FRACTION)
        .min(THUMBNAIL_MAX_OFFSET_SECS)
        .max(0.0)
}
