use crate::models::{Color, LabelColors};
use sha1::{Digest, Sha1};

const HUE_BUCKETS: u16 = 24;
const SATURATION: f64 = 0.65;
const LIGHTNESS_BANDS: [f64; 3] = [0.38, 0.5, 0.62];

const BLACK: Color = Color::rgb(0, 0, 0);
const WHITE: Color = Color::rgb(255, 255, 255);

pub const STATIC_COLORS: LabelColors = LabelColors {
    font: BLACK,
    background: Color::rgb(0xe9, 0xec, 0xef),
};

/// Derives a stable color from `name|value`.
pub fn generate_colors(name: &str, value: &str) -> LabelColors {
    let digest = Sha1::new()
        .chain_update(name.as_bytes())
        .chain_update(b"|")
        .chain_update(value.as_bytes())
        .finalize();

    let bucket = u16::from_be_bytes([digest[0], digest[1]]) % HUE_BUCKETS;
    let hue = bucket as f64 * (360.0 / HUE_BUCKETS as f64);
    let lightness = LIGHTNESS_BANDS[digest[2] as usize % LIGHTNESS_BANDS.len()];

    let background = hsl_to_rgb(hue, SATURATION, lightness);
    let font = if background.brightness() >= 128 {
        BLACK
    } else {
        WHITE
    };

    LabelColors { font, background }
}

fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> Color {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());

    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };

    let m = lightness - chroma / 2.0;
    let channel = |value: f64| ((value + m) * 255.0).round().clamp(0.0, 255.0) as u8;

    Color::rgb(channel(r), channel(g), channel(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsl_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), Color::rgb(255, 0, 0));
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), Color::rgb(0, 255, 0));
        assert_eq!(hsl_to_rgb(240.0, 1.0, 0.5), Color::rgb(0, 0, 255));
        assert_eq!(hsl_to_rgb(0.0, 0.0, 1.0), WHITE);
    }

    #[test]
    fn test_font_contrasts_with_background() {
        for value in ["prod", "staging", "dev", "eu-west-1", "us-east-2"] {
            let colors = generate_colors("cluster", value);
            let expected = if colors.background.brightness() >= 128 {
                BLACK
            } else {
                WHITE
            };
            assert_eq!(colors.font, expected, "font color for {value}");
            assert_eq!(colors.background.alpha, 255);
        }
    }
}
