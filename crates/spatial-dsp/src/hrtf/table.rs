//! Storage for an HRTF measurement set and its offline preprocessing into a
//! dense, regular spherical grid, plus the online barycentric-triangle
//! interpolation used to answer a query that falls between grid points.
//!
//! A raw HRTF measurement set is irregular: rings are captured one
//! elevation at a time, the azimuth count per ring varies, and the poles
//! are often a single measurement or missing outright. [`HrtfTableBuilder`]
//! turns that into a regular grid (same azimuth step at every elevation,
//! including the poles) through four offline passes — pole synthesis,
//! azimuth-360 closure, spherical-cap gap fill, and grid resampling — so
//! the online query path is a direct index lookup rather than a search
//! over an unstructured point cloud.
//!
//! Elevation is stored in the two-sided domain `[0, 90] ∪ [270, 360)`: `0`
//! is the front horizon, `90` the north pole (straight up), and
//! `270..360` sweeps the south pole (straight down) back up to the horizon
//! on the far side. A plain signed elevation in `[-pi/2, pi/2]` radians
//! maps to this domain by adding 360 degrees to the negative half.

use crate::error::{Result, SpatialError};
use crate::hrtf::hrir::Hrir;

const NORTH_POLE_DEG: f64 = 90.0;
const SOUTH_POLE_DEG: f64 = 270.0;
const MIN_AZIMUTH_DEG: f64 = 0.0;
const MAX_AZIMUTH_DEG: f64 = 360.0;

/// Azimuth/elevation step of the resampled grid, matching the original
/// system's default.
const DEFAULT_RESAMPLING_STEP_DEG: f64 = 5.0;
/// Maximum tolerated gap, in degrees, between a pole and its nearest
/// measured ring before the gap is treated as a hole that needs filling.
const DEFAULT_GAP_THRESHOLD_DEG: f64 = 20.0;
/// Azimuth sectors a hemisphere's nearest ring is split into when
/// synthesising a pole value from it.
const NUMBER_OF_PARTS: usize = 4;
/// Tolerance for treating two angles as the same point across the 0/360
/// seam.
const EPSILON_SEWING: f64 = 1e-3;

fn elevation_rad_to_domain_deg(elevation_rad: f64) -> f64 {
    let deg = elevation_rad.to_degrees();
    if deg < 0.0 {
        deg + 360.0
    } else {
        deg
    }
}

fn real_elevation_deg(domain_deg: f64) -> f64 {
    if domain_deg > 180.0 {
        domain_deg - 360.0
    } else {
        domain_deg
    }
}

fn azimuth_rad_to_deg(azimuth_rad: f64) -> f64 {
    azimuth_rad.to_degrees().rem_euclid(360.0)
}

fn same_angle(a: f64, b: f64, epsilon: f64) -> bool {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d) < epsilon
}

/// Great-circle distance between two `(azimuth, elevation)` points, both in
/// degrees in the two-sided domain, via the haversine formula (elevation
/// standing in for latitude, azimuth for longitude).
fn haversine_deg(az1: f64, el1: f64, az2: f64, el2: f64) -> f64 {
    let lat1 = real_elevation_deg(el1).to_radians();
    let lat2 = real_elevation_deg(el2).to_radians();
    let dlat = lat2 - lat1;
    let dlon = (az2 - az1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().clamp(0.0, 1.0).asin()
}

/// Shifts every azimuth so the direction of interest sits at 180 degrees,
/// the standard trick for running planar barycentric math on points that
/// actually live on a sphere near the 0/360 seam.
fn transform_azimuth(query_azimuth: f64, azimuth: f64) -> f64 {
    let mut a = azimuth + 180.0 - query_azimuth;
    if a > MAX_AZIMUTH_DEG {
        a %= 360.0;
    }
    if a < MIN_AZIMUTH_DEG {
        a += 360.0;
    }
    a
}

/// Folds the southern hemisphere's `[270, 360)` domain back to `[-90, 0)`
/// so elevation differences near the south pole don't have to cross the
/// 360/0 seam to be compared.
fn transform_elevation(elevation: f64) -> f64 {
    if elevation >= SOUTH_POLE_DEG {
        elevation - 360.0
    } else {
        elevation
    }
}

/// Standard planar barycentric coordinates of `(px, py)` against triangle
/// `(ax,ay), (bx,by), (cx,cy)`.
fn barycentric(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64, cx: f64, cy: f64) -> (f64, f64, f64) {
    let d = (by - cy) * (ax - cx) + (cx - bx) * (ay - cy);
    if d.abs() < 1e-9 {
        return (1.0, 0.0, 0.0);
    }
    let alpha = ((by - cy) * (px - cx) + (cx - bx) * (py - cy)) / d;
    let beta = ((cy - ay) * (px - cx) + (ax - cx) * (py - cy)) / d;
    let gamma = 1.0 - alpha - beta;
    (alpha, beta, gamma)
}

/// Clamps negative barycentric weights to zero and renormalises so they
/// still sum to one. The original system instead grows the candidate point
/// group and retries until it finds a strictly valid triangle; this table
/// only ever has the one natural candidate triangle per query (the grid is
/// already dense after preprocessing), so a query that still lands outside
/// it is treated as "closest corners win" rather than searched for further.
fn clamp_renormalize(alpha: f64, beta: f64, gamma: f64) -> (f64, f64, f64) {
    let a = alpha.max(0.0);
    let b = beta.max(0.0);
    let c = gamma.max(0.0);
    let sum = (a + b + c).max(1e-12);
    (a / sum, b / sum, c / sum)
}

fn blend3(a: &Hrir, wa: f64, b: &Hrir, wb: f64, c: &Hrir, wc: f64) -> Hrir {
    let taps = a
        .taps
        .iter()
        .zip(&b.taps)
        .zip(&c.taps)
        .map(|((&ta, &tb), &tc)| wa * ta + wb * tb + wc * tc)
        .collect();
    let itd_samples = wa * a.itd_samples + wb * b.itd_samples + wc * c.itd_samples;
    Hrir { taps, itd_samples }
}

fn average_hrir(hrirs: &[&Hrir]) -> Hrir {
    let len = hrirs[0].len();
    let n = hrirs.len() as f64;
    let mut taps = vec![0.0; len];
    let mut itd = 0.0;
    for h in hrirs {
        for (t, &s) in taps.iter_mut().zip(&h.taps) {
            *t += s;
        }
        itd += h.itd_samples;
    }
    for t in taps.iter_mut() {
        *t /= n;
    }
    Hrir { taps, itd_samples: itd / n }
}

type Point = (f64, f64, Hrir, Hrir);

/// Accumulates raw measurements before `finish` preprocesses them into a
/// regular grid.
pub struct HrtfTableBuilder {
    points: Vec<Point>,
    resampling_step_deg: f64,
    gap_threshold_deg: f64,
}

impl Default for HrtfTableBuilder {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            resampling_step_deg: DEFAULT_RESAMPLING_STEP_DEG,
            gap_threshold_deg: DEFAULT_GAP_THRESHOLD_DEG,
        }
    }
}

impl HrtfTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one measurement. `azimuth`/`elevation` are radians, elevation
    /// signed in `[-pi/2, pi/2]`; both are normalised internally into the
    /// grid's degree domain.
    pub fn add_measurement(mut self, azimuth: f64, elevation: f64, left: Hrir, right: Hrir) -> Self {
        let az = azimuth_rad_to_deg(azimuth);
        let el = elevation_rad_to_domain_deg(elevation);
        self.points.push((az, el, left, right));
        self
    }

    pub fn with_resampling_step_degrees(mut self, step: f64) -> Self {
        self.resampling_step_deg = step;
        self
    }

    pub fn with_gap_threshold_degrees(mut self, degrees: f64) -> Self {
        self.gap_threshold_deg = degrees;
        self
    }

    pub fn finish(self) -> Result<HrtfTable> {
        if self.points.is_empty() {
            return Err(SpatialError::NotSet);
        }
        let taps_len = self.points[0].2.len();
        for (_, _, left, right) in &self.points {
            if left.len() != taps_len || right.len() != taps_len {
                return Err(SpatialError::BadSize { expected: taps_len, actual: left.len() });
            }
        }

        let step = self.resampling_step_deg;
        let mut measurements = self.points;

        synthesize_pole(&mut measurements, NORTH_POLE_DEG, Hemisphere::North, step);
        synthesize_pole(&mut measurements, SOUTH_POLE_DEG, Hemisphere::South, step);
        fill_azimuth_360(&mut measurements);
        fill_spherical_caps(&mut measurements, NORTH_POLE_DEG, Hemisphere::North, step, self.gap_threshold_deg);
        fill_spherical_caps(&mut measurements, SOUTH_POLE_DEG, Hemisphere::South, step, self.gap_threshold_deg);

        let rows = resample_grid(&measurements, step, taps_len);
        Ok(HrtfTable { rows, azimuth_step_deg: step, taps_len })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Hemisphere {
    North,
    South,
}

fn nearest_ring_elevation(measurements: &[Point], hemisphere: Hemisphere) -> Option<f64> {
    match hemisphere {
        Hemisphere::North => measurements
            .iter()
            .filter(|(_, el, ..)| *el < NORTH_POLE_DEG && *el >= 0.0)
            .map(|(_, el, ..)| *el)
            .fold(None, |acc: Option<f64>, el| Some(acc.map_or(el, |a: f64| a.max(el)))),
        Hemisphere::South => measurements
            .iter()
            .filter(|(_, el, ..)| *el > SOUTH_POLE_DEG)
            .map(|(_, el, ..)| *el)
            .fold(None, |acc: Option<f64>, el| Some(acc.map_or(el, |a: f64| a.min(el)))),
    }
}

/// Finds the ring nearest a pole (excluding the pole itself) and, if the
/// pole has no exact measurement yet, synthesises one by splitting that
/// ring into `NUMBER_OF_PARTS` azimuth sectors and averaging sector by
/// sector, then across sectors, then replicating the result at every
/// azimuth grid step. Mirrors `CalculateTF_InOneHemispherePole`.
fn synthesize_pole(measurements: &mut Vec<Point>, pole_deg: f64, hemisphere: Hemisphere, step: f64) {
    let has_pole = measurements.iter().any(|(az, el, ..)| same_angle(*az, 0.0, EPSILON_SEWING) && same_angle(*el, pole_deg, EPSILON_SEWING));
    if has_pole {
        return;
    }

    let Some(ring_elevation) = nearest_ring_elevation(measurements, hemisphere) else { return };

    let border = 360.0 / NUMBER_OF_PARTS as f64;
    let mut sectors: Vec<Vec<&Point>> = vec![Vec::new(); NUMBER_OF_PARTS];
    for point in measurements.iter() {
        if !same_angle(point.1, ring_elevation, EPSILON_SEWING) {
            continue;
        }
        let sector = ((point.0 / border).floor() as usize).min(NUMBER_OF_PARTS - 1);
        sectors[sector].push(point);
    }

    let mut sector_left = Vec::new();
    let mut sector_right = Vec::new();
    for sector in &sectors {
        if sector.is_empty() {
            continue;
        }
        let lefts: Vec<&Hrir> = sector.iter().map(|p| &p.2).collect();
        let rights: Vec<&Hrir> = sector.iter().map(|p| &p.3).collect();
        sector_left.push(average_hrir(&lefts));
        sector_right.push(average_hrir(&rights));
    }
    if sector_left.is_empty() {
        return;
    }
    let refs_left: Vec<&Hrir> = sector_left.iter().collect();
    let refs_right: Vec<&Hrir> = sector_right.iter().collect();
    let pole_left = average_hrir(&refs_left);
    let pole_right = average_hrir(&refs_right);

    let mut az = MIN_AZIMUTH_DEG;
    while az < MAX_AZIMUTH_DEG {
        measurements.push((az, pole_deg, pole_left.clone(), pole_right.clone()));
        az += step;
    }
}

/// Duplicates every elevation ring's azimuth-0 measurement at azimuth 360,
/// so the offline quadrant interpolator (which searches a literal point
/// list) sees a closed ring instead of a gap at the seam.
fn fill_azimuth_360(measurements: &mut Vec<Point>) {
    let mut elevations: Vec<f64> = measurements.iter().map(|p| p.1).collect();
    elevations.sort_by(f64::total_cmp);
    elevations.dedup_by(|a, b| same_angle(*a, *b, EPSILON_SEWING));

    let mut new_points = Vec::new();
    for elevation in elevations {
        let has_360 = measurements.iter().any(|(az, el, ..)| same_angle(*az, MAX_AZIMUTH_DEG, EPSILON_SEWING) && same_angle(*el, elevation, EPSILON_SEWING));
        if has_360 {
            continue;
        }
        if let Some((_, _, left, right)) =
            measurements.iter().find(|(az, el, ..)| same_angle(*az, 0.0, EPSILON_SEWING) && same_angle(*el, elevation, EPSILON_SEWING))
        {
            new_points.push((MAX_AZIMUTH_DEG, elevation, left.clone(), right.clone()));
        }
    }
    measurements.extend(new_points);
}

/// Fills the gap between a pole and its nearest measured ring, when that
/// gap exceeds the configured threshold, by interpolating every
/// intermediate grid elevation from the pole value and the two nearest
/// points (by great-circle distance) of the nearest ring. Mirrors
/// `CalculateTF_SphericalCaps` / `Calculate_and_EmplaceTF`; the original
/// searches a growing combination of ring points for a valid barycentric
/// triangle, this always takes the nearest two plus the known pole value
/// and clamps if that triangle is degenerate.
fn fill_spherical_caps(measurements: &mut Vec<Point>, pole_deg: f64, hemisphere: Hemisphere, step: f64, gap_threshold_deg: f64) {
    let Some((_, _, pole_left, pole_right)) =
        measurements.iter().find(|(az, el, ..)| same_angle(*az, 0.0, EPSILON_SEWING) && same_angle(*el, pole_deg, EPSILON_SEWING))
    else {
        return;
    };
    let (pole_left, pole_right) = (pole_left.clone(), pole_right.clone());

    let Some(ring_elevation) = nearest_ring_elevation(measurements, hemisphere) else { return };

    let gap = match hemisphere {
        Hemisphere::North => NORTH_POLE_DEG - ring_elevation,
        Hemisphere::South => ring_elevation - SOUTH_POLE_DEG,
    };
    if gap <= gap_threshold_deg {
        return;
    }

    let ring: Vec<Point> = measurements
        .iter()
        .filter(|(_, el, ..)| same_angle(*el, ring_elevation, EPSILON_SEWING))
        .cloned()
        .collect();
    if ring.len() < 2 {
        return;
    }

    let mut new_points = Vec::new();
    let mut elevation = match hemisphere {
        Hemisphere::North => ring_elevation + step,
        Hemisphere::South => ring_elevation - step,
    };
    loop {
        let reached_pole = match hemisphere {
            Hemisphere::North => elevation >= pole_deg,
            Hemisphere::South => elevation <= pole_deg,
        };
        if reached_pole {
            break;
        }

        let mut az = MIN_AZIMUTH_DEG;
        while az < MAX_AZIMUTH_DEG {
            let mut by_distance: Vec<&Point> = ring.iter().collect();
            by_distance.sort_by(|a, b| haversine_deg(az, elevation, a.0, a.1).total_cmp(&haversine_deg(az, elevation, b.0, b.1)));
            let r1 = by_distance[0];
            let r2 = by_distance[1];

            let p_az = transform_azimuth(az, az);
            let p_el = transform_elevation(elevation);
            let r1_az = transform_azimuth(az, r1.0);
            let r1_el = transform_elevation(r1.1);
            let r2_az = transform_azimuth(az, r2.0);
            let r2_el = transform_elevation(r2.1);

            let (mut alpha, mut beta, mut gamma) = barycentric(p_az, p_el, p_az, p_el, r1_az, r1_el, r2_az, r2_el);
            if alpha < 0.0 || beta < 0.0 || gamma < 0.0 {
                (alpha, beta, gamma) = clamp_renormalize(alpha, beta, gamma);
            }

            let left = blend3(&pole_left, alpha, &r1.2, beta, &r2.2, gamma);
            let right = blend3(&pole_right, alpha, &r1.3, beta, &r2.3, gamma);
            new_points.push((az, elevation, left, right));
            az += step;
        }

        elevation = match hemisphere {
            Hemisphere::North => elevation + step,
            Hemisphere::South => elevation - step,
        };
    }
    measurements.extend(new_points);
}

fn nearest_in<'a>(candidates: &[&'a Point], query_az: f64, query_el: f64) -> Option<&'a Point> {
    candidates
        .iter()
        .min_by(|a, b| haversine_deg(query_az, query_el, a.0, a.1).total_cmp(&haversine_deg(query_az, query_el, b.0, b.1)))
        .copied()
}

/// Splits `azimuth - query_azimuth` into front/back exactly as the
/// original quadrant splitter does.
fn is_front(query_azimuth: f64, azimuth: f64) -> bool {
    let diff = azimuth - query_azimuth;
    if diff > 0.0 && diff <= 180.0 {
        true
    } else if diff < 0.0 && diff > -180.0 {
        false
    } else {
        diff <= 180.0
    }
}

fn is_ceil(query_elevation: f64, elevation: f64) -> bool {
    let e = if elevation >= SOUTH_POLE_DEG { elevation - 360.0 } else { elevation };
    let q = if query_elevation >= SOUTH_POLE_DEG { query_elevation - 360.0 } else { query_elevation };
    e >= q
}

/// Quadrant-based offline interpolation of one grid point against the full
/// (pole- and cap-filled) measurement set. Mirrors `CQuadrantBasedInterpolator`.
fn quadrant_interpolate(measurements: &[Point], query_az: f64, query_el: f64) -> (Hrir, Hrir) {
    let (mut front, mut back): (Vec<&Point>, Vec<&Point>) = (Vec::new(), Vec::new());
    for p in measurements {
        if is_front(query_az, p.0) {
            front.push(p);
        } else {
            back.push(p);
        }
    }
    let split = |list: &[&Point]| -> (Vec<&Point>, Vec<&Point>) {
        let mut ceil = Vec::new();
        let mut floor = Vec::new();
        for &p in list {
            if is_ceil(query_el, p.1) {
                ceil.push(p);
            } else {
                floor.push(p);
            }
        }
        (ceil, floor)
    };
    let (back_ceil, back_floor) = split(&back);
    let (front_ceil, front_floor) = split(&front);

    let all: Vec<&Point> = measurements.iter().collect();
    let fallback = || nearest_in(&all, query_az, query_el).expect("nonempty table");
    let back_ceil = nearest_in(&back_ceil, query_az, query_el).unwrap_or_else(fallback);
    let back_floor = nearest_in(&back_floor, query_az, query_el).unwrap_or_else(fallback);
    let front_ceil = nearest_in(&front_ceil, query_az, query_el).unwrap_or_else(fallback);
    let front_floor = nearest_in(&front_floor, query_az, query_el).unwrap_or_else(fallback);

    let t_az = |az: f64| transform_azimuth(query_az, az);
    let t_el = transform_elevation;

    let q_az = t_az(query_az);
    let q_el = t_el(query_el);
    let bc_az = t_az(back_ceil.0);
    let bc_el = t_el(back_ceil.1);
    let bf_az = t_az(back_floor.0);
    let bf_el = t_el(back_floor.1);
    let fc_az = t_az(front_ceil.0);
    let fc_el = t_el(front_ceil.1);
    let ff_az = t_az(front_floor.0);
    let ff_el = t_el(front_floor.1);

    let diagonal_denom = ff_az - bc_az;
    let interest_denom = q_az - bc_az;
    let slope_diagonal = if diagonal_denom.abs() < 1e-9 { f64::INFINITY } else { ((ff_el - bc_el) / diagonal_denom).abs() };
    let slope_interest = if interest_denom.abs() < 1e-9 { f64::INFINITY } else { ((q_el - bc_el) / interest_denom).abs() };

    let (mut alpha, mut beta, mut gamma, p1, p2, p3) = if slope_interest >= slope_diagonal {
        let (a, b, g) = barycentric(q_az, q_el, bc_az, bc_el, bf_az, bf_el, ff_az, ff_el);
        (a, b, g, back_ceil, back_floor, front_floor)
    } else {
        let (a, b, g) = barycentric(q_az, q_el, bc_az, bc_el, fc_az, fc_el, ff_az, ff_el);
        (a, b, g, back_ceil, front_ceil, front_floor)
    };
    if alpha < 0.0 || beta < 0.0 || gamma < 0.0 {
        (alpha, beta, gamma) = clamp_renormalize(alpha, beta, gamma);
    }

    let left = blend3(&p1.2, alpha, &p2.2, beta, &p3.2, gamma);
    let right = blend3(&p1.3, alpha, &p2.3, beta, &p3.3, gamma);
    (left, right)
}

/// Builds the final regular grid: every `(azimuth, elevation)` cell at
/// `step` spacing, taken directly from `measurements` when an exact point
/// exists there, else filled in by [`quadrant_interpolate`]. Mirrors
/// `FillResampledTable`.
fn resample_grid(measurements: &[Point], step: f64, taps_len: usize) -> Vec<GridRow> {
    let mut grid_elevations = Vec::new();
    let mut e = 0.0;
    while e <= NORTH_POLE_DEG + 1e-9 {
        grid_elevations.push(e);
        e += step;
    }
    let mut e = SOUTH_POLE_DEG;
    while e < MAX_AZIMUTH_DEG - 1e-9 {
        grid_elevations.push(e);
        e += step;
    }

    let mut grid_azimuths = Vec::new();
    let mut a = MIN_AZIMUTH_DEG;
    while a < MAX_AZIMUTH_DEG - 1e-9 {
        grid_azimuths.push(a);
        a += step;
    }

    let mut rows = Vec::with_capacity(grid_elevations.len());
    for elevation in grid_elevations {
        let mut cells = Vec::with_capacity(grid_azimuths.len());
        for &azimuth in &grid_azimuths {
            let exact = measurements.iter().find(|(az, el, ..)| same_angle(*az, azimuth, EPSILON_SEWING) && same_angle(*el, elevation, EPSILON_SEWING));
            let (left, right) = if let Some((_, _, left, right)) = exact {
                (left.clone(), right.clone())
            } else {
                quadrant_interpolate(measurements, azimuth, elevation)
            };
            debug_assert_eq!(left.len(), taps_len);
            cells.push((left, right));
        }
        rows.push(GridRow { elevation_deg: elevation, cells });
    }
    rows
}

struct GridRow {
    elevation_deg: f64,
    /// `cells[j]` is the measurement at `azimuth = j * azimuth_step_deg`.
    cells: Vec<(Hrir, Hrir)>,
}

/// Indices of the three grid cells a query's online-interpolation triangle
/// is made of, plus their barycentric weights.
pub(crate) struct Triangle {
    pub cells: [(usize, usize); 3],
    pub weights: [f64; 3],
}

/// An immutable, queryable regular HRTF grid.
pub struct HrtfTable {
    rows: Vec<GridRow>,
    azimuth_step_deg: f64,
    taps_len: usize,
}

impl HrtfTable {
    pub fn builder() -> HrtfTableBuilder {
        HrtfTableBuilder::new()
    }

    pub fn taps_len(&self) -> usize {
        self.taps_len
    }

    pub(crate) fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn col_count(&self) -> usize {
        self.rows[0].cells.len()
    }

    pub(crate) fn cell(&self, row: usize, col: usize) -> &(Hrir, Hrir) {
        &self.rows[row].cells[col]
    }

    /// Locates the online-interpolation triangle for a listener-relative
    /// direction in radians, using a quadrilateral-midpoint discriminator
    /// (`CMidPointOnlineInterpolator`): the two elevation rows bracketing
    /// the query and, within each, the two azimuth columns bracketing it,
    /// form a quadrilateral of four corners (A=ceil/back, B=ceil/front,
    /// C=floor/back, D=floor/front); whichever quadrant of that
    /// quadrilateral's midpoint the query falls in picks the three corners
    /// used as the interpolation triangle.
    ///
    /// Because the grid is regular, including at the poles (every column
    /// of a pole row holds the identical synthesised value), no special
    /// pole handling is needed here: a bracket that includes a pole row
    /// degenerates to a triangle where two corners already agree.
    pub(crate) fn locate_triangle(&self, azimuth: f64, elevation: f64) -> Triangle {
        let az_deg = azimuth_rad_to_deg(azimuth);
        let el_deg = elevation_rad_to_domain_deg(elevation);

        let upper = self.rows.partition_point(|r| r.elevation_deg <= el_deg);
        let row_floor = upper.saturating_sub(1).min(self.rows.len() - 1);
        let row_ceil = upper.min(self.rows.len() - 1);

        let n = self.col_count();
        let step = self.azimuth_step_deg;
        let col_back = ((az_deg / step).floor() as isize).rem_euclid(n as isize) as usize;
        let col_front = (col_back + 1) % n;

        let a = (row_ceil, col_back);
        let b = (row_ceil, col_front);
        let c = (row_floor, col_back);
        let d = (row_floor, col_front);

        let corner_az = |col: usize| col as f64 * step;
        let corner_el = |row: usize| self.rows[row].elevation_deg;

        let mid_az = (corner_az(a.1) + corner_az(b.1) + corner_az(c.1) + corner_az(d.1)) / 4.0;
        let mid_el = (corner_el(row_ceil) + corner_el(row_floor)) / 2.0;

        let az_side = az_deg >= mid_az;
        let el_side = el_deg >= mid_el;

        let primary: [(usize, usize); 3] = match (az_side, el_side) {
            (true, true) => [a, b, d],
            (true, false) => [b, c, d],
            (false, true) => [a, b, c],
            (false, false) => [a, c, d],
        };

        let weights_for = |tri: &[(usize, usize); 3]| {
            let corner_deg = |p: (usize, usize)| (corner_az(p.1), corner_el(p.0));
            let (az0, el0) = corner_deg(tri[0]);
            let (az1, el1) = corner_deg(tri[1]);
            let (az2, el2) = corner_deg(tri[2]);
            let t_az0 = transform_azimuth(az_deg, az0);
            let t_el0 = transform_elevation(el0);
            let t_az1 = transform_azimuth(az_deg, az1);
            let t_el1 = transform_elevation(el1);
            let t_az2 = transform_azimuth(az_deg, az2);
            let t_el2 = transform_elevation(el2);
            let q_az = transform_azimuth(az_deg, az_deg);
            let q_el = transform_elevation(el_deg);
            barycentric(q_az, q_el, t_az0, t_el0, t_az1, t_el1, t_az2, t_el2)
        };

        let (alpha, beta, gamma) = weights_for(&primary);
        if alpha >= 0.0 && beta >= 0.0 && gamma >= 0.0 {
            return Triangle { cells: primary, weights: [alpha, beta, gamma] };
        }

        // Try the other three combinations of the quadrilateral's four
        // corners before giving up and clamping.
        let candidates = [[a, b, c], [a, b, d], [a, c, d], [b, c, d]];
        for tri in candidates {
            if tri == primary {
                continue;
            }
            let (alpha, beta, gamma) = weights_for(&tri);
            if alpha >= 0.0 && beta >= 0.0 && gamma >= 0.0 {
                return Triangle { cells: tri, weights: [alpha, beta, gamma] };
            }
        }

        let (alpha, beta, gamma) = clamp_renormalize(alpha, beta, gamma);
        Triangle { cells: primary, weights: [alpha, beta, gamma] }
    }

    /// Online-interpolates both ears' HRIRs for a listener-relative
    /// direction in radians.
    pub fn interpolate(&self, azimuth: f64, elevation: f64) -> (Hrir, Hrir) {
        let triangle = self.locate_triangle(azimuth, elevation);
        let [p0, p1, p2] = triangle.cells;
        let [w0, w1, w2] = triangle.weights;
        let (l0, r0) = self.cell(p0.0, p0.1);
        let (l1, r1) = self.cell(p1.0, p1.1);
        let (l2, r2) = self.cell(p2.0, p2.1);
        (blend3(l0, w0, l1, w1, l2, w2), blend3(r0, w0, r1, w1, r2, w2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn unit(tag: f64) -> Hrir {
        Hrir::new(vec![tag, 0.0], 0.0)
    }

    fn ring_table() -> HrtfTable {
        let mut builder = HrtfTable::builder().with_resampling_step_degrees(30.0).with_gap_threshold_degrees(1000.0);
        let azimuths = [0.0, 60.0, 120.0, 180.0, 240.0, 300.0];
        for &az in &azimuths {
            builder = builder.add_measurement(az.to_radians(), 0.0, unit(az / 60.0), unit(az / 60.0));
        }
        builder.finish().unwrap()
    }

    #[test]
    fn exact_grid_point_returns_measured_value() {
        let table = ring_table();
        let (left, _) = table.interpolate(60f64.to_radians(), 0.0);
        assert!((left.taps[0] - 1.0).abs() < 1e-6, "got {}", left.taps[0]);
    }

    #[test]
    fn empty_table_is_rejected() {
        assert_eq!(HrtfTable::builder().finish().err(), Some(SpatialError::NotSet));
    }

    #[test]
    fn poles_are_synthesized_and_direction_independent() {
        let table = ring_table();
        let (north_a, _) = table.interpolate(0.0, FRAC_PI_2 - 1e-6);
        let (north_b, _) = table.interpolate(2.0, FRAC_PI_2 - 1e-6);
        assert!((north_a.taps[0] - north_b.taps[0]).abs() < 1e-3);
    }

    #[test]
    fn query_between_measurements_blends_smoothly() {
        let table = ring_table();
        let (left, _) = table.interpolate(30f64.to_radians(), 0.0);
        assert!(left.taps[0] > 0.0 && left.taps[0] < 1.0);
    }
}
