//! Hue/saturation <-> RGB conversion.
//!
//! Both directions truncate instead of rounding. Hub firmware and existing
//! registry records carry values produced this way, so the two functions
//! are exact inverses only at the six sector boundaries.

/// Convert an RGB triple to `(hue 0..360, saturation 0..=100)`.
///
/// Achromatic input (all channels equal) yields `(0, 0)`.
pub fn rgb_to_hs(r: u8, g: u8, b: u8) -> (u16, u8) {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let cmax = r.max(g).max(b);
    let cmin = r.min(g).min(b);
    let delta = cmax - cmin;

    if delta == 0 {
        return (0, 0);
    }

    let delta_f = f64::from(delta);
    let mut hue = if r == cmax {
        (f64::from(g - b) * 60.0 / delta_f) as i32
    } else if g == cmax {
        (120.0 + f64::from(b - r) * 60.0 / delta_f) as i32
    } else {
        (240.0 + f64::from(r - g) * 60.0 / delta_f) as i32
    };

    if hue < 0 {
        hue += 360;
    } else if hue >= 360 {
        hue -= 360;
    }

    let sat = (delta_f / f64::from(cmax) * 100.0) as u8;

    (hue as u16, sat)
}

/// Convert `(hue, saturation)` to an RGB triple.
///
/// Hue is taken modulo 360 and saturation is clamped to 100. Zero
/// saturation is pure white.
pub fn hs_to_rgb(hue: u16, sat: u8) -> (u8, u8, u8) {
    if sat == 0 {
        return (255, 255, 255);
    }

    let h = f64::from(hue % 360) * 6.0 / 360.0;
    let s = f64::from(sat.min(100)) / 100.0;

    let sector = h.floor();
    let f = h - sector;

    let p = (255.0 * (1.0 - s)) as u8;
    let q = (255.0 * (1.0 - s * f)) as u8;
    let t = (255.0 * (1.0 - s * (1.0 - f))) as u8;

    match (sector as u8) % 6 {
        0 => (255, t, p),
        1 => (q, 255, p),
        2 => (p, 255, t),
        3 => (p, q, 255),
        4 => (t, p, 255),
        _ => (255, p, q),
    }
}
