//! 曲线展平：把样条、圆弧与凸度段近似为折线，偏差不超过给定容差。

use std::f64::consts::TAU;

use glam::{DVec2, DVec3};

use crate::document::{Polyline, PolylineVertex, Spline};
use crate::geometry::Point2;

/// 默认最大弦高偏差（图纸单位）。
pub const DEFAULT_TOLERANCE: f64 = 0.5;

const INITIAL_SEGMENTS_PER_SPAN: usize = 4;
const MAX_SUBDIVISION_DEPTH: u32 = 16;
const MAX_ARC_SEGMENTS: usize = 1 << 16;
const KNOT_EPSILON: f64 = 1e-12;

/// 将样条展平为多段线。闭合标记沿用样条本身，结果只含直线段。
///
/// 有控制点时按（有理）B 样条求值；只有拟合点时直接连接拟合点。
/// 无可用点时返回空多段线。
pub fn flatten_spline(spline: &Spline, tolerance: f64) -> Polyline {
    let points = match BSpline::from_spline(spline) {
        Some(curve) => curve.flatten(tolerance),
        None if spline.fit_points.len() >= 2 => spline.fit_points.clone(),
        None => Vec::new(),
    };
    Polyline {
        vertices: points.into_iter().map(PolylineVertex::new).collect(),
        is_closed: spline.is_closed,
        layer: spline.layer.clone(),
    }
}

/// 沿圆弧采样，`sweep` 为带符号弧度（正值逆时针），结果包含首尾端点。
pub fn arc_points(
    center: Point2,
    radius: f64,
    start_angle: f64,
    sweep: f64,
    tolerance: f64,
) -> Vec<Point2> {
    let segments = arc_segment_count(radius, sweep, tolerance);
    (0..=segments)
        .map(|i| {
            let angle = start_angle + sweep * (i as f64 / segments as f64);
            Point2::new(
                center.x() + radius * angle.cos(),
                center.y() + radius * angle.sin(),
            )
        })
        .collect()
}

/// 把带凸度的多段线段展平为点序列（含起点与终点）。
pub fn bulge_points(start: Point2, end: Point2, bulge: f64, tolerance: f64) -> Vec<Point2> {
    let start_vec = start.as_vec2();
    let end_vec = end.as_vec2();
    let chord = end_vec - start_vec;
    let chord_len = chord.length();
    if bulge == 0.0 || !bulge.is_finite() || chord_len <= f64::EPSILON {
        return vec![start, end];
    }

    let theta = 4.0 * bulge.atan();
    // 圆心位于弦中点沿左法向偏移 (c/2)·(1-b²)/(2b) 处
    let left = DVec2::new(-chord.y, chord.x) / chord_len;
    let offset = chord_len / 2.0 * (1.0 - bulge * bulge) / (2.0 * bulge);
    let center = (start_vec + end_vec) * 0.5 + left * offset;
    let radius = (start_vec - center).length();
    let start_dir = start_vec - center;
    let start_angle = start_dir.y.atan2(start_dir.x);

    let mut points = arc_points(Point2::from_vec(center), radius, start_angle, theta, tolerance);
    // 端点直接取原值，避免三角函数误差
    if let Some(first) = points.first_mut() {
        *first = start;
    }
    if let Some(last) = points.last_mut() {
        *last = end;
    }
    points
}

fn arc_segment_count(radius: f64, sweep: f64, tolerance: f64) -> usize {
    let sweep = sweep.abs();
    if radius <= f64::EPSILON || sweep <= f64::EPSILON {
        return 1;
    }
    let step = if tolerance >= radius {
        TAU / 4.0
    } else {
        2.0 * (1.0 - tolerance / radius).acos()
    };
    if !step.is_finite() || step <= 0.0 {
        return MAX_ARC_SEGMENTS;
    }
    ((sweep / step).ceil() as usize).clamp(1, MAX_ARC_SEGMENTS)
}

/// 齐次坐标形式的 B 样条，权重为 1 时退化为非有理样条。
struct BSpline {
    degree: usize,
    control: Vec<DVec3>,
    knots: Vec<f64>,
}

impl BSpline {
    fn from_spline(spline: &Spline) -> Option<Self> {
        let count = spline.control_points.len();
        if count < 2 || spline.control_points.iter().any(|p| !p.is_finite()) {
            return None;
        }
        let degree = usize::try_from(spline.degree)
            .ok()
            .filter(|degree| *degree >= 1)?
            .min(count - 1);

        let weights_valid = spline.weights.len() == count
            && spline.weights.iter().all(|w| w.is_finite() && *w > 0.0);
        let control = spline
            .control_points
            .iter()
            .enumerate()
            .map(|(i, point)| {
                let weight = if weights_valid { spline.weights[i] } else { 1.0 };
                DVec3::new(point.x() * weight, point.y() * weight, weight)
            })
            .collect();

        let knots = if knots_are_valid(&spline.knot_values, count, degree) {
            spline.knot_values.clone()
        } else {
            clamped_uniform_knots(count, degree)
        };

        Some(Self {
            degree,
            control,
            knots,
        })
    }

    fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.control.len()])
    }

    /// 返回满足 `knots[k] <= u` 的最后一个非空节点区间。
    fn span(&self, u: f64) -> usize {
        let mut span = self.degree;
        for i in self.degree..self.control.len() {
            if self.knots[i] <= u && self.knots[i + 1] - self.knots[i] > KNOT_EPSILON {
                span = i;
            }
        }
        span
    }

    /// de Boor 算法求值。
    fn evaluate(&self, u: f64) -> Point2 {
        let p = self.degree;
        let k = self.span(u);
        let mut d: Vec<DVec3> = (0..=p).map(|j| self.control[j + k - p]).collect();
        for r in 1..=p {
            for j in (r..=p).rev() {
                let left = self.knots[j + k - p];
                let right = self.knots[j + 1 + k - r];
                let denom = right - left;
                let alpha = if denom.abs() <= KNOT_EPSILON {
                    0.0
                } else {
                    (u - left) / denom
                };
                d[j] = d[j - 1] * (1.0 - alpha) + d[j] * alpha;
            }
        }
        let h = d[p];
        Point2::new(h.x / h.z, h.y / h.z)
    }

    fn flatten(&self, tolerance: f64) -> Vec<Point2> {
        let (start, end) = self.domain();
        let mut breaks: Vec<f64> = self
            .knots
            .iter()
            .copied()
            .filter(|knot| *knot > start && *knot < end)
            .collect();
        breaks.insert(0, start);
        breaks.push(end);
        breaks.dedup_by(|a, b| (*a - *b).abs() <= KNOT_EPSILON);

        let mut points = vec![self.evaluate(start)];
        for pair in breaks.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            for i in 0..INITIAL_SEGMENTS_PER_SPAN {
                let t0 = a + (b - a) * (i as f64 / INITIAL_SEGMENTS_PER_SPAN as f64);
                let t1 = a + (b - a) * ((i + 1) as f64 / INITIAL_SEGMENTS_PER_SPAN as f64);
                let p0 = self.evaluate(t0);
                let p1 = self.evaluate(t1);
                self.subdivide(t0, p0, t1, p1, tolerance, 0, &mut points);
            }
        }
        points
    }

    #[allow(clippy::too_many_arguments)]
    fn subdivide(
        &self,
        t0: f64,
        p0: Point2,
        t1: f64,
        p1: Point2,
        tolerance: f64,
        depth: u32,
        out: &mut Vec<Point2>,
    ) {
        let tm = (t0 + t1) * 0.5;
        let pm = self.evaluate(tm);
        if depth < MAX_SUBDIVISION_DEPTH && distance_to_segment(pm, p0, p1) > tolerance {
            self.subdivide(t0, p0, tm, pm, tolerance, depth + 1, out);
            self.subdivide(tm, pm, t1, p1, tolerance, depth + 1, out);
        } else {
            out.push(p1);
        }
    }
}

fn knots_are_valid(knots: &[f64], count: usize, degree: usize) -> bool {
    knots.len() == count + degree + 1
        && knots.iter().all(|k| k.is_finite())
        && knots.windows(2).all(|pair| pair[0] <= pair[1])
        && knots[count] - knots[degree] > KNOT_EPSILON
}

fn clamped_uniform_knots(count: usize, degree: usize) -> Vec<f64> {
    let interior = count - degree;
    let mut knots = Vec::with_capacity(count + degree + 1);
    knots.extend(std::iter::repeat_n(0.0, degree + 1));
    knots.extend((1..interior).map(|i| i as f64));
    knots.extend(std::iter::repeat_n(interior as f64, degree + 1));
    knots
}

fn distance_to_segment(point: Point2, start: Point2, end: Point2) -> f64 {
    let p = point.as_vec2();
    let a = start.as_vec2();
    let ab = end.as_vec2() - a;
    let len_sq = ab.length_squared();
    if len_sq <= f64::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::path_length;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, PI};

    fn spline(degree: i32, control_points: Vec<Point2>) -> Spline {
        Spline {
            degree,
            is_closed: false,
            control_points,
            fit_points: Vec::new(),
            knot_values: Vec::new(),
            weights: Vec::new(),
            layer: "0".to_string(),
        }
    }

    fn positions(polyline: &Polyline) -> Vec<Point2> {
        polyline.positions().collect()
    }

    #[test]
    fn linear_spline_follows_control_polygon() {
        let control = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 5.0),
        ];
        let flattened = flatten_spline(&spline(1, control.clone()), DEFAULT_TOLERANCE);
        let points = positions(&flattened);
        assert!(!flattened.is_closed);
        assert!((path_length(&points, false) - 15.0).abs() < 1e-9);
        assert_eq!(points.first(), control.first());
        assert!(points.last().unwrap().as_vec2().distance(control[2].as_vec2()) < 1e-9);
    }

    #[test]
    fn quadratic_spline_converges_to_parabola_length() {
        let curve = spline(
            2,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 2.0),
                Point2::new(2.0, 0.0),
            ],
        );
        let fine = positions(&flatten_spline(&curve, 1e-4));
        assert!((path_length(&fine, false) - 2.957864).abs() < 1e-3);

        let coarse = positions(&flatten_spline(&curve, 0.5));
        assert!(coarse.len() < fine.len());
        assert!(path_length(&coarse, false) <= path_length(&fine, false) + 1e-9);
    }

    #[test]
    fn rational_quadratic_reproduces_quarter_circle() {
        let mut curve = spline(
            2,
            vec![
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(0.0, 1.0),
            ],
        );
        curve.weights = vec![1.0, FRAC_1_SQRT_2, 1.0];
        curve.knot_values = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let points = positions(&flatten_spline(&curve, 1e-5));
        for point in &points {
            assert!((point.as_vec2().length() - 1.0).abs() < 1e-9);
        }
        assert!((path_length(&points, false) - FRAC_PI_2).abs() < 1e-3);
    }

    #[test]
    fn inconsistent_knots_fall_back_to_clamped_uniform() {
        let mut curve = spline(
            3,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(2.0, -1.0),
                Point2::new(3.0, 0.0),
            ],
        );
        curve.knot_values = vec![0.0, 1.0];
        let points = positions(&flatten_spline(&curve, 0.01));
        assert!(points[0].as_vec2().distance(DVec2::ZERO) < 1e-9);
        assert!(points.last().unwrap().as_vec2().distance(DVec2::new(3.0, 0.0)) < 1e-9);
        assert_eq!(clamped_uniform_knots(5, 2), vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn fit_points_and_closed_flag_are_preserved() {
        let mut curve = spline(3, Vec::new());
        curve.is_closed = true;
        curve.fit_points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 3.0),
        ];
        let flattened = flatten_spline(&curve, DEFAULT_TOLERANCE);
        assert!(flattened.is_closed);
        assert_eq!(positions(&flattened), curve.fit_points);

        curve.fit_points.clear();
        assert!(flatten_spline(&curve, DEFAULT_TOLERANCE).vertices.is_empty());
    }

    #[test]
    fn arc_points_stay_on_circle() {
        let center = Point2::new(3.0, -2.0);
        let points = arc_points(center, 10.0, 0.0, TAU, 0.01);
        assert!(points.len() > 8);
        for point in &points {
            assert!((point.as_vec2().distance(center.as_vec2()) - 10.0).abs() < 1e-9);
        }
        assert!((path_length(&points, false) - 20.0 * PI).abs() < 0.05);
    }

    #[test]
    fn positive_bulge_turns_counter_clockwise() {
        let start = Point2::new(0.0, 0.0);
        let end = Point2::new(10.0, 0.0);
        let points = bulge_points(start, end, 1.0, 0.001);
        assert_eq!(points.first(), Some(&start));
        assert_eq!(points.last(), Some(&end));
        for point in &points {
            assert!((point.as_vec2().distance(DVec2::new(5.0, 0.0)) - 5.0).abs() < 1e-9);
        }
        assert!(points.iter().any(|p| (p.y() + 5.0).abs() < 1e-2));
        assert!((path_length(&points, false) - 5.0 * PI).abs() < 0.01);

        let shallow = bulge_points(start, end, 0.25, 0.001);
        let chord = 10.0;
        let expected = crate::geometry::bulge_arc(chord, 0.25);
        assert!((path_length(&shallow, false) - expected).abs() < 0.01);
    }
}
