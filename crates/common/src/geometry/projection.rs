//! Lambert Azimuthal Equal-Area projection on the GRS80 ellipsoid
//!
//! Ellipsoidal forward and inverse formulas (Snyder, "Map Projections: A Working
//! Manual", pp. 187-190). Areas measured in projected meters equal areas on the
//! ellipsoid, which is what footprint area and centroid derivation rely on.

use geo::Coord;

/// GRS80 semi-major axis in meters
const GRS80_A: f64 = 6_378_137.0;

/// GRS80 inverse flattening
const GRS80_INV_F: f64 = 298.257_222_101;

/// Latitude bound for the projection centre; the oblique formulas degenerate at the poles
const MAX_CENTER_LAT: f64 = 89.999;

#[derive(Debug, Clone, Copy)]
pub struct LambertAzimuthalEqualArea {
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
    e: f64,
    e2: f64,
    qp: f64,
    rq: f64,
    d: f64,
    sin_b0: f64,
    cos_b0: f64,
}

impl LambertAzimuthalEqualArea {
    /// Projection centred on the given geographic point (degrees), no false origin
    pub fn centered_on(lon0_deg: f64, lat0_deg: f64) -> Self {
        Self::with_origin(lon0_deg, lat0_deg, 0.0, 0.0)
    }

    /// ETRS89-LAEA Europe (EPSG:3035)
    pub fn etrs89() -> Self {
        Self::with_origin(10.0, 52.0, 4_321_000.0, 3_210_000.0)
    }

    fn with_origin(lon0_deg: f64, lat0_deg: f64, false_easting: f64, false_northing: f64) -> Self {
        let f = 1.0 / GRS80_INV_F;
        let e2 = 2.0 * f - f * f;
        let e = e2.sqrt();

        let lat0 = lat0_deg.clamp(-MAX_CENTER_LAT, MAX_CENTER_LAT).to_radians();
        let qp = authalic_q(std::f64::consts::FRAC_PI_2.sin(), e, e2);
        let rq = GRS80_A * (qp / 2.0).sqrt();

        let b0 = (authalic_q(lat0.sin(), e, e2) / qp).clamp(-1.0, 1.0).asin();
        let m0 = lat0.cos() / (1.0 - e2 * lat0.sin().powi(2)).sqrt();
        let d = GRS80_A * m0 / (rq * b0.cos());

        Self {
            lon0: lon0_deg.to_radians(),
            false_easting,
            false_northing,
            e,
            e2,
            qp,
            rq,
            d,
            sin_b0: b0.sin(),
            cos_b0: b0.cos(),
        }
    }

    /// Radius of the sphere with the same surface area as the ellipsoid
    pub fn authalic_radius(&self) -> f64 {
        self.rq
    }

    /// Authalic latitude (radians) for a geodetic latitude in degrees
    pub fn authalic_latitude(&self, lat_deg: f64) -> f64 {
        let q = authalic_q(lat_deg.to_radians().sin(), self.e, self.e2);
        (q / self.qp).clamp(-1.0, 1.0).asin()
    }

    /// Geographic (lon, lat degrees) to projected meters.
    ///
    /// Returns `None` at the antipode of the centre, where the projection is undefined.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> Option<Coord<f64>> {
        let beta = self.authalic_latitude(lat_deg);
        let dlon = lon_deg.to_radians() - self.lon0;

        let denom = 1.0 + self.sin_b0 * beta.sin() + self.cos_b0 * beta.cos() * dlon.cos();
        if denom <= f64::EPSILON {
            return None;
        }
        let b = self.rq * (2.0 / denom).sqrt();

        let x = self.false_easting + b * self.d * beta.cos() * dlon.sin();
        let y = self.false_northing
            + (b / self.d) * (self.cos_b0 * beta.sin() - self.sin_b0 * beta.cos() * dlon.cos());

        Some(Coord { x, y })
    }

    /// Projected meters back to geographic (lon, lat degrees)
    pub fn inverse(&self, x: f64, y: f64) -> Coord<f64> {
        let dx = x - self.false_easting;
        let dy = y - self.false_northing;

        let rho = ((dx / self.d).powi(2) + (self.d * dy).powi(2)).sqrt();
        if rho < 1e-9 {
            let lat0 = self.latitude_from_authalic(self.sin_b0.asin());
            return Coord {
                x: self.lon0.to_degrees(),
                y: lat0.to_degrees(),
            };
        }

        let c = 2.0 * (rho / (2.0 * self.rq)).clamp(-1.0, 1.0).asin();
        let (sin_c, cos_c) = c.sin_cos();

        let beta = (cos_c * self.sin_b0 + self.d * dy * sin_c * self.cos_b0 / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lon = self.lon0
            + (dx * sin_c).atan2(
                self.d * rho * self.cos_b0 * cos_c - self.d * self.d * dy * self.sin_b0 * sin_c,
            );

        Coord {
            x: normalize_lon(lon.to_degrees()),
            y: self.latitude_from_authalic(beta).to_degrees(),
        }
    }

    /// Series inversion of the authalic latitude
    fn latitude_from_authalic(&self, beta: f64) -> f64 {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        beta + (e2 / 3.0 + 31.0 * e4 / 180.0 + 517.0 * e6 / 5040.0) * (2.0 * beta).sin()
            + (23.0 * e4 / 360.0 + 251.0 * e6 / 3780.0) * (4.0 * beta).sin()
            + (761.0 * e6 / 45360.0) * (6.0 * beta).sin()
    }
}

fn authalic_q(sin_phi: f64, e: f64, e2: f64) -> f64 {
    let es = e * sin_phi;
    (1.0 - e2) * (sin_phi / (1.0 - es * es) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
}

fn normalize_lon(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etrs89_origin() {
        let proj = LambertAzimuthalEqualArea::etrs89();
        let c = proj.forward(10.0, 52.0).unwrap();
        assert!((c.x - 4_321_000.0).abs() < 1e-6);
        assert!((c.y - 3_210_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_etrs89_known_point() {
        // Berlin
        let proj = LambertAzimuthalEqualArea::etrs89();
        let c = proj.forward(13.4, 52.5).unwrap();
        assert!((c.x - 4_551_801.97).abs() < 0.5, "x = {}", c.x);
        assert!((c.y - 3_271_028.98).abs() < 0.5, "y = {}", c.y);
    }

    #[test]
    fn test_inverse_recovers_input() {
        let proj = LambertAzimuthalEqualArea::centered_on(-70.0, -33.0);
        for &(lon, lat) in &[(-70.6, -33.4), (-69.0, -30.0), (-75.5, -40.2)] {
            let c = proj.forward(lon, lat).unwrap();
            let back = proj.inverse(c.x, c.y);
            assert!((back.x - lon).abs() < 1e-6, "lon {} vs {}", back.x, lon);
            assert!((back.y - lat).abs() < 1e-6, "lat {} vs {}", back.y, lat);
        }
    }

    #[test]
    fn test_center_maps_to_origin() {
        let proj = LambertAzimuthalEqualArea::centered_on(25.0, 61.0);
        let c = proj.forward(25.0, 61.0).unwrap();
        assert!(c.x.abs() < 1e-6 && c.y.abs() < 1e-6);
        let back = proj.inverse(0.0, 0.0);
        assert!((back.x - 25.0).abs() < 1e-9);
        assert!((back.y - 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_authalic_radius() {
        let proj = LambertAzimuthalEqualArea::etrs89();
        assert!((proj.authalic_radius() - 6_371_007.18).abs() < 0.01);
    }
}
