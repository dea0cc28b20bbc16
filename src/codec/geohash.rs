//! Geohash: interleaved-bit encoding of (lat, lon) into a base-32 string.

use crate::error::CodecError;

const ALPHABET: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";
pub const MIN_PRECISION: usize = 2;
pub const MAX_PRECISION: usize = 8;

/// Approximate maximum cell radius in km for precision lengths 2..8.
pub const PRECISION_RADII_KM: [f64; 7] = [1250.0, 156.0, 39.0, 5.0, 1.2, 0.15, 0.038];

pub fn radius_km_for_precision(precision: usize) -> Option<f64> {
    if (MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        Some(PRECISION_RADII_KM[precision - MIN_PRECISION])
    } else {
        None
    }
}

fn char_index(c: char) -> Result<usize, CodecError> {
    ALPHABET
        .iter()
        .position(|&a| a as char == c)
        .ok_or(CodecError::Geohash)
}

/// Encodes `(lat, lon)` to a geohash string of the given `precision` (2..=8).
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String, CodecError> {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return Err(CodecError::Geohash);
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(CodecError::Geohash);
    }

    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lon_range = (-180.0f64, 180.0f64);
    let mut out = String::with_capacity(precision);
    let mut bit = 0u8;
    let mut ch = 0u8;
    let mut even = true;

    while out.len() < precision {
        if even {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if lon >= mid {
                ch |= 1 << (4 - bit);
                lon_range.0 = mid;
            } else {
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                ch |= 1 << (4 - bit);
                lat_range.0 = mid;
            } else {
                lat_range.1 = mid;
            }
        }
        even = !even;

        if bit < 4 {
            bit += 1;
        } else {
            out.push(ALPHABET[ch as usize] as char);
            bit = 0;
            ch = 0;
        }
    }

    Ok(out)
}

/// Decodes a geohash string to the center `(lat, lon)` of the cell.
pub fn decode(geohash: &str) -> Result<(f64, f64), CodecError> {
    if geohash.is_empty() || geohash.len() > MAX_PRECISION {
        return Err(CodecError::Geohash);
    }
    let (lat_range, lon_range) = decode_ranges(geohash)?;
    Ok((
        (lat_range.0 + lat_range.1) / 2.0,
        (lon_range.0 + lon_range.1) / 2.0,
    ))
}

fn decode_ranges(geohash: &str) -> Result<((f64, f64), (f64, f64)), CodecError> {
    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lon_range = (-180.0f64, 180.0f64);
    let mut even = true;

    for c in geohash.chars() {
        let idx = char_index(c)?;
        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1;
            if even {
                let mid = (lon_range.0 + lon_range.1) / 2.0;
                if bit == 1 {
                    lon_range.0 = mid;
                } else {
                    lon_range.1 = mid;
                }
            } else {
                let mid = (lat_range.0 + lat_range.1) / 2.0;
                if bit == 1 {
                    lat_range.0 = mid;
                } else {
                    lat_range.1 = mid;
                }
            }
            even = !even;
        }
    }

    Ok((lat_range, lon_range))
}

/// Returns the 8 cells adjacent to `geohash` at the same precision, derived
/// by offsetting the decoded center by the cell's spans.
pub fn neighbors(geohash: &str) -> Result<[String; 8], CodecError> {
    let precision = geohash.len();
    let (lat_range, lon_range) = decode_ranges(geohash)?;
    let (center_lat, center_lon) = (
        (lat_range.0 + lat_range.1) / 2.0,
        (lon_range.0 + lon_range.1) / 2.0,
    );
    let lat_span = lat_range.1 - lat_range.0;
    let lon_span = lon_range.1 - lon_range.0;

    let offsets: [(f64, f64); 8] = [
        (1.0, -1.0), (1.0, 0.0), (1.0, 1.0),
        (0.0, -1.0),             (0.0, 1.0),
        (-1.0, -1.0), (-1.0, 0.0), (-1.0, 1.0),
    ];

    let mut out: Vec<String> = Vec::with_capacity(8);
    for (dlat, dlon) in offsets {
        let mut lat = center_lat + dlat * lat_span;
        let mut lon = center_lon + dlon * lon_span;
        lat = lat.clamp(-90.0, 90.0);
        // wrap longitude rather than clamp, so cells crossing the antimeridian still resolve
        if lon > 180.0 {
            lon -= 360.0;
        } else if lon < -180.0 {
            lon += 360.0;
        }
        out.push(encode(lat, lon, precision)?);
    }

    out.try_into().map_err(|_| CodecError::Geohash)
}
