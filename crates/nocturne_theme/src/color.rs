//! Color values and CSS color parsing
//!
//! Supports the textual forms that show up in real stylesheets:
//!
//! - Hex: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`
//! - `rgb()` / `rgba()` with comma or space separated channels, numbers or
//!   percentages, and an optional `/ alpha`
//! - `hsl()` / `hsla()` with `deg`, `rad`, `grad` or `turn` hues
//! - All CSS named colors plus `transparent`

use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, opt, value},
    number::complete::double,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::error::{ColorParseError, Result};

/// RGBA color with 0-255 channels and 0-1 alpha
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: 1.0,
        }
    }

    /// Create from hex value (0xRRGGBB)
    pub fn from_hex(hex: u32) -> Self {
        Self::rgb(
            ((hex >> 16) & 0xFF) as u8,
            ((hex >> 8) & 0xFF) as u8,
            (hex & 0xFF) as u8,
        )
    }

    /// Create from hue in degrees, saturation and lightness in 0-1
    pub fn from_hsl(hue: f64, saturation: f64, lightness: f64, alpha: f64) -> Self {
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);
        if s == 0.0 {
            let v = l * 255.0;
            return Self::new(v, v, v, alpha);
        }

        let h = hue.rem_euclid(360.0);
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = l - c / 2.0;
        let (r, g, b) = match (h / 60.0) as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Self::new(
            (r + m) * 255.0,
            (g + m) * 255.0,
            (b + m) * 255.0,
            alpha,
        )
    }

    pub fn with_alpha(self, alpha: f64) -> Self {
        Self { a: alpha, ..self }
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }

    /// Parse any supported CSS color syntax
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ColorParseError::Empty);
        }

        if let Ok((_, color)) = all_consuming(color_literal)(input) {
            return Ok(color);
        }

        named_color(input).ok_or_else(|| ColorParseError::Unrecognized(input.to_string()))
    }

    /// Channels rounded and clamped to bytes
    pub fn to_rgb8(&self) -> [u8; 3] {
        [channel_u8(self.r), channel_u8(self.g), channel_u8(self.b)]
    }
}

impl FromStr for Rgba {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self> {
        Rgba::parse(s)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.to_rgb8();
        if self.a < 1.0 {
            write!(f, "rgba({}, {}, {}, {})", r, g, b, format_alpha(self.a))
        } else {
            write!(f, "rgb({}, {}, {})", r, g, b)
        }
    }
}

fn channel_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn format_alpha(alpha: f64) -> String {
    let s = format!("{:.3}", alpha.clamp(0.0, 1.0));
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

// ============================================================================
// Parsers
// ============================================================================

fn color_literal(input: &str) -> IResult<&str, Rgba> {
    alt((hex_color, rgb_function, hsl_function))(input)
}

/// Parse hex color: #RGB, #RGBA, #RRGGBB or #RRGGBBAA
fn hex_color(input: &str) -> IResult<&str, Rgba> {
    let (rest, _) = char('#')(input)?;
    let (rest, hex) = take_while1(|c: char| c.is_ascii_hexdigit())(rest)?;

    let digit = |s: &str| u8::from_str_radix(s, 16).unwrap_or(0);
    let short = |i: usize| digit(&hex[i..i + 1]) * 17;
    let long = |i: usize| digit(&hex[i..i + 2]);

    let color = match hex.len() {
        3 => Rgba::rgb(short(0), short(1), short(2)),
        4 => Rgba::rgb(short(0), short(1), short(2)).with_alpha(short(3) as f64 / 255.0),
        6 => Rgba::rgb(long(0), long(2), long(4)),
        8 => Rgba::rgb(long(0), long(2), long(4)).with_alpha(long(6) as f64 / 255.0),
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
    };

    Ok((rest, color))
}

/// A number optionally followed by `%`
fn number_or_percent(input: &str) -> IResult<&str, (f64, bool)> {
    let (input, n) = double(input)?;
    let (input, pct) = opt(char('%'))(input)?;
    Ok((input, (n, pct.is_some())))
}

/// Separator between channels: comma (with optional whitespace) or whitespace
fn channel_sep(input: &str) -> IResult<&str, ()> {
    alt((
        value((), tuple((multispace0, char(','), multispace0))),
        value((), multispace1),
    ))(input)
}

/// Optional trailing alpha: `, a` or `/ a`
fn alpha_part(input: &str) -> IResult<&str, Option<f64>> {
    opt(map(
        preceded(
            tuple((multispace0, alt((char(','), char('/'))), multispace0)),
            number_or_percent,
        ),
        |(n, pct)| if pct { n / 100.0 } else { n },
    ))(input)
}

fn rgb_function(input: &str) -> IResult<&str, Rgba> {
    let (input, _) = alt((tag_no_case("rgba"), tag_no_case("rgb")))(input)?;
    let (input, (r, g, b, a)) = delimited(
        tuple((char('('), multispace0)),
        tuple((
            number_or_percent,
            preceded(channel_sep, number_or_percent),
            preceded(channel_sep, number_or_percent),
            alpha_part,
        )),
        tuple((multispace0, char(')'))),
    )(input)?;

    let channel = |(n, pct): (f64, bool)| if pct { n * 2.55 } else { n };
    Ok((
        input,
        Rgba::new(
            channel(r).clamp(0.0, 255.0),
            channel(g).clamp(0.0, 255.0),
            channel(b).clamp(0.0, 255.0),
            a.unwrap_or(1.0).clamp(0.0, 1.0),
        ),
    ))
}

/// Hue with optional unit, normalized to degrees
fn hue(input: &str) -> IResult<&str, f64> {
    let (input, n) = double(input)?;
    let (input, unit) = opt(alt((
        tag_no_case("deg"),
        tag_no_case("grad"),
        tag_no_case("rad"),
        tag_no_case("turn"),
    )))(input)?;
    let degrees = match unit.map(|u| u.to_ascii_lowercase()) {
        Some(u) if u == "grad" => n * 0.9,
        Some(u) if u == "rad" => n.to_degrees(),
        Some(u) if u == "turn" => n * 360.0,
        _ => n,
    };
    Ok((input, degrees))
}

fn hsl_function(input: &str) -> IResult<&str, Rgba> {
    let (input, _) = alt((tag_no_case("hsla"), tag_no_case("hsl")))(input)?;
    let (input, (h, (s, _), (l, _), a)) = delimited(
        tuple((char('('), multispace0)),
        tuple((
            hue,
            preceded(channel_sep, number_or_percent),
            preceded(channel_sep, number_or_percent),
            alpha_part,
        )),
        tuple((multispace0, tag(")"))),
    )(input)?;

    Ok((
        input,
        Rgba::from_hsl(h, s / 100.0, l / 100.0, a.unwrap_or(1.0).clamp(0.0, 1.0)),
    ))
}

/// Whether `name` is a CSS color keyword (excluding `transparent`)
pub fn is_named_color(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    NAMED_COLORS.iter().any(|(n, _)| *n == lower)
}

fn named_color(name: &str) -> Option<Rgba> {
    let lower = name.to_ascii_lowercase();
    if lower == "transparent" {
        return Some(Rgba::TRANSPARENT);
    }
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == lower)
        .map(|(_, hex)| Rgba::from_hex(*hex))
}

const NAMED_COLORS: &[(&str, u32)] = &[
    ("aliceblue", 0xf0f8ff),
    ("antiquewhite", 0xfaebd7),
    ("aqua", 0x00ffff),
    ("aquamarine", 0x7fffd4),
    ("azure", 0xf0ffff),
    ("beige", 0xf5f5dc),
    ("bisque", 0xffe4c4),
    ("black", 0x000000),
    ("blanchedalmond", 0xffebcd),
    ("blue", 0x0000ff),
    ("blueviolet", 0x8a2be2),
    ("brown", 0xa52a2a),
    ("burlywood", 0xdeb887),
    ("cadetblue", 0x5f9ea0),
    ("chartreuse", 0x7fff00),
    ("chocolate", 0xd2691e),
    ("coral", 0xff7f50),
    ("cornflowerblue", 0x6495ed),
    ("cornsilk", 0xfff8dc),
    ("crimson", 0xdc143c),
    ("cyan", 0x00ffff),
    ("darkblue", 0x00008b),
    ("darkcyan", 0x008b8b),
    ("darkgoldenrod", 0xb8860b),
    ("darkgray", 0xa9a9a9),
    ("darkgreen", 0x006400),
    ("darkgrey", 0xa9a9a9),
    ("darkkhaki", 0xbdb76b),
    ("darkmagenta", 0x8b008b),
    ("darkolivegreen", 0x556b2f),
    ("darkorange", 0xff8c00),
    ("darkorchid", 0x9932cc),
    ("darkred", 0x8b0000),
    ("darksalmon", 0xe9967a),
    ("darkseagreen", 0x8fbc8f),
    ("darkslateblue", 0x483d8b),
    ("darkslategray", 0x2f4f4f),
    ("darkslategrey", 0x2f4f4f),
    ("darkturquoise", 0x00ced1),
    ("darkviolet", 0x9400d3),
    ("deeppink", 0xff1493),
    ("deepskyblue", 0x00bfff),
    ("dimgray", 0x696969),
    ("dimgrey", 0x696969),
    ("dodgerblue", 0x1e90ff),
    ("firebrick", 0xb22222),
    ("floralwhite", 0xfffaf0),
    ("forestgreen", 0x228b22),
    ("fuchsia", 0xff00ff),
    ("gainsboro", 0xdcdcdc),
    ("ghostwhite", 0xf8f8ff),
    ("gold", 0xffd700),
    ("goldenrod", 0xdaa520),
    ("gray", 0x808080),
    ("green", 0x008000),
    ("greenyellow", 0xadff2f),
    ("grey", 0x808080),
    ("honeydew", 0xf0fff0),
    ("hotpink", 0xff69b4),
    ("indianred", 0xcd5c5c),
    ("indigo", 0x4b0082),
    ("ivory", 0xfffff0),
    ("khaki", 0xf0e68c),
    ("lavender", 0xe6e6fa),
    ("lavenderblush", 0xfff0f5),
    ("lawngreen", 0x7cfc00),
    ("lemonchiffon", 0xfffacd),
    ("lightblue", 0xadd8e6),
    ("lightcoral", 0xf08080),
    ("lightcyan", 0xe0ffff),
    ("lightgoldenrodyellow", 0xfafad2),
    ("lightgray", 0xd3d3d3),
    ("lightgreen", 0x90ee90),
    ("lightgrey", 0xd3d3d3),
    ("lightpink", 0xffb6c1),
    ("lightsalmon", 0xffa07a),
    ("lightseagreen", 0x20b2aa),
    ("lightskyblue", 0x87cefa),
    ("lightslategray", 0x778899),
    ("lightslategrey", 0x778899),
    ("lightsteelblue", 0xb0c4de),
    ("lightyellow", 0xffffe0),
    ("lime", 0x00ff00),
    ("limegreen", 0x32cd32),
    ("linen", 0xfaf0e6),
    ("magenta", 0xff00ff),
    ("maroon", 0x800000),
    ("mediumaquamarine", 0x66cdaa),
    ("mediumblue", 0x0000cd),
    ("mediumorchid", 0xba55d3),
    ("mediumpurple", 0x9370db),
    ("mediumseagreen", 0x3cb371),
    ("mediumslateblue", 0x7b68ee),
    ("mediumspringgreen", 0x00fa9a),
    ("mediumturquoise", 0x48d1cc),
    ("mediumvioletred", 0xc71585),
    ("midnightblue", 0x191970),
    ("mintcream", 0xf5fffa),
    ("mistyrose", 0xffe4e1),
    ("moccasin", 0xffe4b5),
    ("navajowhite", 0xffdead),
    ("navy", 0x000080),
    ("oldlace", 0xfdf5e6),
    ("olive", 0x808000),
    ("olivedrab", 0x6b8e23),
    ("orange", 0xffa500),
    ("orangered", 0xff4500),
    ("orchid", 0xda70d6),
    ("palegoldenrod", 0xeee8aa),
    ("palegreen", 0x98fb98),
    ("paleturquoise", 0xafeeee),
    ("palevioletred", 0xdb7093),
    ("papayawhip", 0xffefd5),
    ("peachpuff", 0xffdab9),
    ("peru", 0xcd853f),
    ("pink", 0xffc0cb),
    ("plum", 0xdda0dd),
    ("powderblue", 0xb0e0e6),
    ("purple", 0x800080),
    ("rebeccapurple", 0x663399),
    ("red", 0xff0000),
    ("rosybrown", 0xbc8f8f),
    ("royalblue", 0x4169e1),
    ("saddlebrown", 0x8b4513),
    ("salmon", 0xfa8072),
    ("sandybrown", 0xf4a460),
    ("seagreen", 0x2e8b57),
    ("seashell", 0xfff5ee),
    ("sienna", 0xa0522d),
    ("silver", 0xc0c0c0),
    ("skyblue", 0x87ceeb),
    ("slateblue", 0x6a5acd),
    ("slategray", 0x708090),
    ("slategrey", 0x708090),
    ("snow", 0xfffafa),
    ("springgreen", 0x00ff7f),
    ("steelblue", 0x4682b4),
    ("tan", 0xd2b48c),
    ("teal", 0x008080),
    ("thistle", 0xd8bfd8),
    ("tomato", 0xff6347),
    ("turquoise", 0x40e0d0),
    ("violet", 0xee82ee),
    ("wheat", 0xf5deb3),
    ("white", 0xffffff),
    ("whitesmoke", 0xf5f5f5),
    ("yellow", 0xffff00),
    ("yellowgreen", 0x9acd32),
];
