//! Filter Matrix Builder
//!
//! Colors are transformed as column vectors `[r, g, b, a, 1]` (channels
//! normalized to `0..=1`) multiplied by a 5x5 affine matrix. Only the first
//! four rows carry information; the fifth keeps the homogeneous coordinate.

use crate::color::Rgba;
use crate::filter::{FilterConfig, FilterMode};

/// Square 5x5 matrix used while composing filters
pub type Matrix5 = [[f64; 5]; 5];

pub fn identity() -> Matrix5 {
    let mut m = [[0.0; 5]; 5];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

pub fn multiply(a: &Matrix5, b: &Matrix5) -> Matrix5 {
    let mut out = [[0.0; 5]; 5];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..5).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Inverts lightness while keeping hue
pub fn invert_n_hue() -> Matrix5 {
    [
        [0.333, -0.667, -0.667, 0.0, 1.0],
        [-0.667, 0.333, -0.667, 0.0, 1.0],
        [-0.667, -0.667, 0.333, 0.0, 1.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

pub fn brightness(v: f64) -> Matrix5 {
    [
        [v, 0.0, 0.0, 0.0, 0.0],
        [0.0, v, 0.0, 0.0, 0.0],
        [0.0, 0.0, v, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

pub fn contrast(v: f64) -> Matrix5 {
    let t = (1.0 - v) / 2.0;
    [
        [v, 0.0, 0.0, 0.0, t],
        [0.0, v, 0.0, 0.0, t],
        [0.0, 0.0, v, 0.0, t],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

pub fn sepia(v: f64) -> Matrix5 {
    let k = 1.0 - v;
    [
        [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k, 0.0, 0.0],
        [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k, 0.0, 0.0],
        [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

pub fn grayscale(v: f64) -> Matrix5 {
    let k = 1.0 - v;
    [
        [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k, 0.0, 0.0],
        [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k, 0.0, 0.0],
        [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

/// Affine RGBA transform derived from a [`FilterConfig`]
#[derive(Clone, Debug, PartialEq)]
pub struct ColorMatrix {
    rows: [[f64; 5]; 4],
}

impl ColorMatrix {
    /// Compose sepia, grayscale, brightness, contrast and (dark mode only)
    /// hue-preserving inversion, in that order.
    pub fn from_filter(config: &FilterConfig) -> Self {
        let mut m = identity();
        if config.sepia != 0 {
            m = multiply(&m, &sepia(f64::from(config.sepia) / 100.0));
        }
        if config.grayscale != 0 {
            m = multiply(&m, &grayscale(f64::from(config.grayscale) / 100.0));
        }
        if config.brightness != 100 {
            m = multiply(&m, &brightness(f64::from(config.brightness) / 100.0));
        }
        if config.contrast != 100 {
            m = multiply(&m, &contrast(f64::from(config.contrast) / 100.0));
        }
        if config.mode == FilterMode::Dark {
            m = multiply(&m, &invert_n_hue());
        }
        Self::from_matrix5(&m)
    }

    /// Fixed matrix that undoes the dark-mode inversion for embedded media
    pub fn reverse() -> Self {
        Self::from_matrix5(&invert_n_hue())
    }

    pub fn identity() -> Self {
        Self::from_matrix5(&identity())
    }

    fn from_matrix5(m: &Matrix5) -> Self {
        Self {
            rows: [m[0], m[1], m[2], m[3]],
        }
    }

    pub fn rows(&self) -> &[[f64; 5]; 4] {
        &self.rows
    }

    /// Transform a color; RGB results are rounded and clamped to `0..=255`
    pub fn apply(&self, color: Rgba) -> Rgba {
        let v = [color.r / 255.0, color.g / 255.0, color.b / 255.0, color.a, 1.0];
        let row = |i: usize| -> f64 { (0..5).map(|k| self.rows[i][k] * v[k]).sum() };
        let channel = |x: f64| (x * 255.0).round().clamp(0.0, 255.0);
        Rgba::new(
            channel(row(0)),
            channel(row(1)),
            channel(row(2)),
            row(3).clamp(0.0, 1.0),
        )
    }

    /// Space separated coefficients for an SVG `feColorMatrix`
    pub fn to_svg_values(&self) -> String {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .map(|v| {
                let s = format!("{:.3}", v);
                if s == "-0.000" {
                    "0.000".to_string()
                } else {
                    s
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &ColorMatrix, b: &ColorMatrix) -> bool {
        a.rows()
            .iter()
            .flatten()
            .zip(b.rows().iter().flatten())
            .all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn test_neutral_light_is_identity() {
        let m = ColorMatrix::from_filter(&FilterConfig::light());
        assert!(approx(&m, &ColorMatrix::identity()));
    }

    #[test]
    fn test_light_mode_has_no_inversion() {
        let config = FilterConfig::light()
            .with_brightness(90)
            .with_contrast(110)
            .with_sepia(20)
            .with_grayscale(30);
        let mut expected = identity();
        expected = multiply(&expected, &sepia(0.2));
        expected = multiply(&expected, &grayscale(0.3));
        expected = multiply(&expected, &brightness(0.9));
        expected = multiply(&expected, &contrast(1.1));
        assert!(approx(
            &ColorMatrix::from_filter(&config),
            &ColorMatrix::from_matrix5(&expected)
        ));
    }

    #[test]
    fn test_dark_mode_inverts_black_and_white() {
        let m = ColorMatrix::from_filter(&FilterConfig::dark());
        assert_eq!(m.apply(Rgba::BLACK).to_rgb8(), [255, 255, 255]);
        assert_eq!(m.apply(Rgba::WHITE).to_rgb8(), [0, 0, 0]);
    }

    #[test]
    fn test_alpha_passes_through() {
        let m = ColorMatrix::from_filter(&FilterConfig::dark().with_brightness(80));
        let out = m.apply(Rgba::new(10.0, 20.0, 30.0, 0.4));
        assert!((out.a - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_reverse_is_static_inversion() {
        assert_eq!(ColorMatrix::reverse(), ColorMatrix::from_filter(&FilterConfig::dark()));
    }

    #[test]
    fn test_svg_values_format() {
        let values = ColorMatrix::identity().to_svg_values();
        assert_eq!(
            values,
            "1.000 0.000 0.000 0.000 0.000 \
             0.000 1.000 0.000 0.000 0.000 \
             0.000 0.000 1.000 0.000 0.000 \
             0.000 0.000 0.000 1.000 0.000"
        );
        assert!(ColorMatrix::reverse().to_svg_values().starts_with("0.333 -0.667 -0.667 0.000 1.000"));
    }
}
