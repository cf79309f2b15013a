//! Coordinate primitives: geodetic lat/lon, UTM, and the tagged `Coord`
//! union the rest of the crate works in. Conversions use WGS-84 constants
//! and round-trip within numerical precision.

use std::fmt;

/// WGS-84 equatorial radius, metres.
const EQUATORIAL_RADIUS: f64 = 6_378_137.0;
/// WGS-84 first eccentricity squared.
const ECC_SQUARED: f64 = 0.006_694_38;
/// UTM central scale factor.
const K0: f64 = 0.9996;
/// UTM false easting, metres.
pub const UTM_EASTING_OFFSET: f64 = 500_000.0;

const BAND_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWX";

/// The coordinate mode a TRW layer (and everything in it) operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordMode {
    #[default]
    LatLon,
    Utm,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Great-circle (haversine) distance in metres over the WGS-84
    /// equatorial sphere.
    pub fn distance(a: &LatLon, b: &LatLon) -> f64 {
        let lat1 = a.lat.to_radians();
        let lat2 = b.lat.to_radians();
        let dlat = (b.lat - a.lat).to_radians();
        let dlon = (b.lon - a.lon).to_radians();

        let h = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EQUATORIAL_RADIUS * h.sqrt().min(1.0).asin()
    }

    pub fn average(a: &LatLon, b: &LatLon) -> LatLon {
        LatLon::new((a.lat + b.lat) / 2.0, (a.lon + b.lon) / 2.0)
    }

    pub fn to_utm(&self) -> Utm {
        latlon_to_utm(self)
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    pub easting: f64,
    pub northing: f64,
    pub zone: u8,
    pub band: char,
}

impl Utm {
    pub fn new(easting: f64, northing: f64, zone: u8, band: char) -> Self {
        Self {
            easting,
            northing,
            zone,
            band,
        }
    }

    pub fn is_same_zone(a: &Utm, b: &Utm) -> bool {
        a.zone == b.zone
    }

    /// Planar distance in metres. Callers must ensure both points are in
    /// the same zone; cross-zone distances go through lat/lon instead.
    pub fn distance(a: &Utm, b: &Utm) -> f64 {
        ((a.easting - b.easting).powi(2) + (a.northing - b.northing).powi(2)).sqrt()
    }

    pub fn to_latlon(&self) -> LatLon {
        utm_to_latlon(self)
    }

    pub fn is_northern_hemisphere(&self) -> bool {
        self.band >= 'N'
    }
}

impl fmt::Display for Utm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {:.0}E {:.0}N",
            self.zone, self.band, self.easting, self.northing
        )
    }
}

/// A position in either coordinate mode. Conversions between the variants
/// are loss-free round trips within numerical precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coord {
    LatLon(LatLon),
    Utm(Utm),
}

impl Coord {
    pub fn mode(&self) -> CoordMode {
        match self {
            Coord::LatLon(_) => CoordMode::LatLon,
            Coord::Utm(_) => CoordMode::Utm,
        }
    }

    pub fn to_latlon(&self) -> LatLon {
        match self {
            Coord::LatLon(ll) => *ll,
            Coord::Utm(utm) => utm.to_latlon(),
        }
    }

    pub fn to_utm(&self) -> Utm {
        match self {
            Coord::LatLon(ll) => ll.to_utm(),
            Coord::Utm(utm) => *utm,
        }
    }

    pub fn convert(&mut self, mode: CoordMode) {
        match (mode, &*self) {
            (CoordMode::LatLon, Coord::Utm(utm)) => *self = Coord::LatLon(utm.to_latlon()),
            (CoordMode::Utm, Coord::LatLon(ll)) => *self = Coord::Utm(ll.to_utm()),
            _ => (),
        }
    }

    /// Distance in metres. Same-zone UTM pairs use planar distance, all
    /// other combinations go through lat/lon and the haversine formula.
    pub fn distance(a: &Coord, b: &Coord) -> f64 {
        match (a, b) {
            (Coord::Utm(u1), Coord::Utm(u2)) if Utm::is_same_zone(u1, u2) => {
                Utm::distance(u1, u2)
            }
            _ => LatLon::distance(&a.to_latlon(), &b.to_latlon()),
        }
    }
}

impl From<LatLon> for Coord {
    fn from(value: LatLon) -> Self {
        Coord::LatLon(value)
    }
}

impl From<Utm> for Coord {
    fn from(value: Utm) -> Self {
        Coord::Utm(value)
    }
}

/// The MGRS band letter for a latitude, clamped at the polar caps the way
/// UTM itself is.
pub fn band_letter(lat: f64) -> char {
    let index = ((lat + 80.0) / 8.0).floor();
    let index = index.clamp(0.0, (BAND_LETTERS.len() - 1) as f64) as usize;
    BAND_LETTERS[index] as char
}

fn utm_zone(lat: f64, lon: f64) -> u8 {
    let mut zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8;

    // Norway exception.
    if (56.0..64.0).contains(&lat) && (3.0..12.0).contains(&lon) {
        zone = 32;
    }
    // Svalbard exceptions.
    if (72.0..84.0).contains(&lat) {
        zone = match lon {
            l if (0.0..9.0).contains(&l) => 31,
            l if (9.0..21.0).contains(&l) => 33,
            l if (21.0..33.0).contains(&l) => 35,
            l if (33.0..42.0).contains(&l) => 37,
            _ => zone,
        };
    }

    zone
}

/// Forward transverse-Mercator projection onto the WGS-84 ellipsoid.
pub fn latlon_to_utm(ll: &LatLon) -> Utm {
    // Normalize the longitude to [-180, 180).
    let lon = (ll.lon + 180.0).rem_euclid(360.0) - 180.0;
    let lat = ll.lat;

    let zone = utm_zone(lat, lon);
    let band = band_letter(lat);

    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    let lon_origin_rad = ((f64::from(zone) - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let ecc_prime2 = ECC_SQUARED / (1.0 - ECC_SQUARED);
    let n = EQUATORIAL_RADIUS / (1.0 - ECC_SQUARED * lat_rad.sin().powi(2)).sqrt();
    let t = lat_rad.tan().powi(2);
    let c = ecc_prime2 * lat_rad.cos().powi(2);
    let a = lat_rad.cos() * (lon_rad - lon_origin_rad);

    let e2 = ECC_SQUARED;
    let m = EQUATORIAL_RADIUS
        * ((1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0) * lat_rad
            - (3.0 * e2 / 8.0 + 3.0 * e2 * e2 / 32.0 + 45.0 * e2 * e2 * e2 / 1024.0)
                * (2.0 * lat_rad).sin()
            + (15.0 * e2 * e2 / 256.0 + 45.0 * e2 * e2 * e2 / 1024.0) * (4.0 * lat_rad).sin()
            - (35.0 * e2 * e2 * e2 / 3072.0) * (6.0 * lat_rad).sin());

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ecc_prime2) * a.powi(5) / 120.0)
        + UTM_EASTING_OFFSET;

    let mut northing = K0
        * (m + n
            * lat_rad.tan()
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ecc_prime2) * a.powi(6)
                    / 720.0));
    if lat < 0.0 {
        northing += 10_000_000.0;
    }

    Utm::new(easting, northing, zone, band)
}

/// Inverse transverse-Mercator projection from the WGS-84 ellipsoid.
pub fn utm_to_latlon(utm: &Utm) -> LatLon {
    let x = utm.easting - UTM_EASTING_OFFSET;
    let mut y = utm.northing;
    if !utm.is_northern_hemisphere() {
        y -= 10_000_000.0;
    }

    let e2 = ECC_SQUARED;
    let ecc_prime2 = e2 / (1.0 - e2);
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let m = y / K0;
    let mu = m / (EQUATORIAL_RADIUS
        * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin();

    let n1 = EQUATORIAL_RADIUS / (1.0 - e2 * phi1.sin().powi(2)).sqrt();
    let t1 = phi1.tan().powi(2);
    let c1 = ecc_prime2 * phi1.cos().powi(2);
    let r1 = EQUATORIAL_RADIUS * (1.0 - e2) / (1.0 - e2 * phi1.sin().powi(2)).powf(1.5);
    let d = x / (n1 * K0);

    let lat_rad = phi1
        - (n1 * phi1.tan() / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ecc_prime2) * d.powi(4)
                    / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * ecc_prime2
                    - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);

    let lon_origin = (f64::from(utm.zone) - 1.0) * 6.0 - 180.0 + 3.0;
    let lon_rad_offset = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ecc_prime2 + 24.0 * t1 * t1)
            * d.powi(5)
            / 120.0)
        / phi1.cos();

    LatLon::new(
        lat_rad.to_degrees(),
        lon_origin + lon_rad_offset.to_degrees(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn equatorial_degree_distance() {
        let a = LatLon::new(0.0, 0.0);
        let b = LatLon::new(0.0, 1.0);
        let d = LatLon::distance(&a, &b);
        assert!((d - 111_319.5).abs() < 1.0, "got {d}");
    }

    #[test]
    fn utm_round_trip_within_a_millimetre() {
        let cases = [
            LatLon::new(51.477928, -0.001545), // Greenwich
            LatLon::new(-33.856784, 151.215297),
            LatLon::new(0.5, 72.5),
            LatLon::new(63.5, 10.4),
        ];
        for ll in cases {
            let utm = ll.to_utm();
            let back = utm.to_latlon();
            let err = LatLon::distance(&ll, &back);
            assert!(err < 0.001, "{ll} -> {utm} -> {back}: {err} m");
        }
    }

    #[test]
    fn known_utm_fix() {
        // Sydney Opera House, independently computed reference.
        let utm = LatLon::new(-33.856784, 151.215297).to_utm();
        assert_eq!(utm.zone, 56);
        assert_eq!(utm.band, 'H');
        assert_relative_eq!(utm.easting, 334_786.0, max_relative = 1e-4);
        assert_relative_eq!(utm.northing, 6_252_080.0, max_relative = 1e-4);
    }

    #[test]
    fn norway_and_svalbard_zone_exceptions() {
        assert_eq!(LatLon::new(60.0, 5.0).to_utm().zone, 32);
        assert_eq!(LatLon::new(78.0, 16.0).to_utm().zone, 33);
    }

    #[test]
    fn cross_zone_utm_distance_goes_through_latlon() {
        let a = Coord::Utm(LatLon::new(0.0, 2.9).to_utm());
        let b = Coord::Utm(LatLon::new(0.0, 3.1).to_utm());
        let d = Coord::distance(&a, &b);
        let expected = LatLon::distance(&LatLon::new(0.0, 2.9), &LatLon::new(0.0, 3.1));
        assert_relative_eq!(d, expected, max_relative = 1e-9);
    }

    #[test]
    fn same_zone_utm_distance_is_planar() {
        let a = Utm::new(500_000.0, 0.0, 31, 'N');
        let b = Utm::new(500_300.0, 400.0, 31, 'N');
        assert_relative_eq!(
            Coord::distance(&Coord::Utm(a), &Coord::Utm(b)),
            500.0,
            max_relative = 1e-12
        );
    }
}
