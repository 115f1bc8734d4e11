// src/detect.rs
use log::debug;

/// Inclusive per-channel bounds; both ends count as inside.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRange {
    pub min: u8,
    pub max: u8,
}

impl ChannelRange {
    const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    fn contains(&self, value: u8) -> bool {
        self.min <= value && value <= self.max
    }
}

/// One named rainbow band: a reference color plus independent bounds on
/// each RGB channel.
#[derive(Debug, Clone, Copy)]
pub struct ColorBand {
    pub name: &'static str,
    pub reference: [u8; 3],
    pub red: ChannelRange,
    pub green: ChannelRange,
    pub blue: ChannelRange,
}

impl ColorBand {
    fn contains(&self, [r, g, b]: [u8; 3]) -> bool {
        self.red.contains(r) && self.green.contains(g) && self.blue.contains(b)
    }
}

/// Rainbow color ranges (approximate RGB values). Order matters: the first
/// band containing the average wins, so earlier entries shadow any overlap
/// in later ones.
pub const RAINBOW_BANDS: [ColorBand; 7] = [
    ColorBand {
        name: "Red",
        reference: [255, 0, 0],
        red: ChannelRange::new(200, 255),
        green: ChannelRange::new(0, 50),
        blue: ChannelRange::new(0, 50),
    },
    ColorBand {
        name: "Orange",
        reference: [255, 165, 0],
        red: ChannelRange::new(200, 255),
        green: ChannelRange::new(100, 180),
        blue: ChannelRange::new(0, 50),
    },
    ColorBand {
        name: "Yellow",
        reference: [255, 255, 0],
        red: ChannelRange::new(200, 255),
        green: ChannelRange::new(200, 255),
        blue: ChannelRange::new(0, 50),
    },
    ColorBand {
        name: "Green",
        reference: [0, 128, 0],
        red: ChannelRange::new(0, 50),
        green: ChannelRange::new(100, 180),
        blue: ChannelRange::new(0, 50),
    },
    ColorBand {
        name: "Blue",
        reference: [0, 0, 255],
        red: ChannelRange::new(0, 50),
        green: ChannelRange::new(0, 50),
        blue: ChannelRange::new(200, 255),
    },
    ColorBand {
        name: "Indigo",
        reference: [75, 0, 130],
        red: ChannelRange::new(50, 100),
        green: ChannelRange::new(0, 50),
        blue: ChannelRange::new(100, 180),
    },
    ColorBand {
        name: "Violet",
        reference: [148, 0, 211],
        red: ChannelRange::new(100, 180),
        green: ChannelRange::new(0, 50),
        blue: ChannelRange::new(150, 255),
    },
];

/// Outcome of one classification pass.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub average: [u8; 3],
    pub band: Option<&'static ColorBand>,
}

impl Detection {
    pub fn name(&self) -> &'static str {
        self.band.map_or("Unknown", |band| band.name)
    }
}

/// Per-channel mean of a flat RGBA buffer, rounded to nearest. The buffer
/// must hold at least one pixel; the capture layer guarantees that for
/// every validly loaded source.
pub fn average_rgba(samples: &[u8]) -> [u8; 3] {
    debug_assert!(samples.len() >= 4, "averaging an empty sample buffer");
    let mut sums = [0u64; 3];
    for pixel in samples.chunks_exact(4) {
        sums[0] += u64::from(pixel[0]);
        sums[1] += u64::from(pixel[1]);
        sums[2] += u64::from(pixel[2]);
    }
    let count = (samples.len() / 4) as u64;
    [
        round_div(sums[0], count),
        round_div(sums[1], count),
        round_div(sums[2], count),
    ]
}

// Round-half-up division, equal to round(sum / count) for non-negative sums.
fn round_div(sum: u64, count: u64) -> u8 {
    ((sum + count / 2) / count) as u8
}

/// Average the buffer and scan the band table front to back for the first
/// band whose three ranges all contain the result.
pub fn classify(samples: &[u8]) -> Detection {
    let average = average_rgba(samples);
    let band = RAINBOW_BANDS.iter().find(|band| band.contains(average));
    let detection = Detection { average, band };
    debug!("Average {:?} classified as {}", average, detection.name());
    detection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(pixel: [u8; 4], pixels: usize) -> Vec<u8> {
        pixel.iter().copied().cycle().take(pixels * 4).collect()
    }

    #[test]
    fn uniform_buffer_averages_exactly() {
        let samples = buffer([13, 77, 201, 255], 9);
        assert_eq!(average_rgba(&samples), [13, 77, 201]);
    }

    #[test]
    fn average_rounds_to_nearest() {
        // Red channel 1 and 2 over two pixels: 1.5 rounds up to 2.
        let samples = [1, 0, 0, 255, 2, 0, 0, 255];
        assert_eq!(average_rgba(&samples), [2, 0, 0]);

        // 1, 1, 2 over three pixels: 4/3 rounds down to 1.
        let samples = [1, 0, 0, 255, 1, 0, 0, 255, 2, 0, 0, 255];
        assert_eq!(average_rgba(&samples), [1, 0, 0]);
    }

    #[test]
    fn alpha_is_skipped() {
        let samples = buffer([10, 20, 30, 0], 4);
        assert_eq!(average_rgba(&samples), [10, 20, 30]);
    }

    #[test]
    fn solid_red_matches_red() {
        let detection = classify(&buffer([255, 0, 0, 255], 10));
        assert_eq!(detection.average, [255, 0, 0]);
        assert_eq!(detection.name(), "Red");
    }

    #[test]
    fn mid_green_matches_green() {
        let detection = classify(&buffer([0, 128, 0, 255], 5));
        assert_eq!(detection.average, [0, 128, 0]);
        assert_eq!(detection.name(), "Green");
    }

    #[test]
    fn near_black_is_unknown() {
        let detection = classify(&buffer([10, 10, 10, 255], 1));
        assert_eq!(detection.average, [10, 10, 10]);
        assert!(detection.band.is_none());
        assert_eq!(detection.name(), "Unknown");
    }

    #[test]
    fn white_is_unknown() {
        assert_eq!(classify(&buffer([255, 255, 255, 255], 3)).name(), "Unknown");
    }

    #[test]
    fn overlap_resolves_to_earlier_band() {
        // (100, 30, 160) sits inside both the Indigo and Violet boxes.
        let average = [100, 30, 160];
        let indigo = &RAINBOW_BANDS[5];
        let violet = &RAINBOW_BANDS[6];
        assert!(indigo.contains(average));
        assert!(violet.contains(average));

        let detection = classify(&buffer([100, 30, 160, 255], 2));
        assert_eq!(detection.name(), "Indigo");
    }

    #[test]
    fn range_bounds_are_inclusive() {
        // Lower red bound.
        assert_eq!(classify(&buffer([200, 0, 0, 255], 1)).name(), "Red");
        // Upper green and blue bounds.
        assert_eq!(classify(&buffer([255, 50, 50, 255], 1)).name(), "Red");
        // One below the red bound matches nothing.
        assert_eq!(classify(&buffer([199, 0, 0, 255], 1)).name(), "Unknown");
    }

    #[test]
    fn table_order_is_fixed() {
        let names: Vec<&str> = RAINBOW_BANDS.iter().map(|band| band.name).collect();
        assert_eq!(
            names,
            ["Red", "Orange", "Yellow", "Green", "Blue", "Indigo", "Violet"]
        );
    }
}
