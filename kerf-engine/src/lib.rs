pub mod transform;

pub mod errors {
    use thiserror::Error;

    /// 单个图元的测量失败。只影响该图元，不会中断整个文档的测量。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum EntityError {
        #[error("radius must be positive, got {0}")]
        NonPositiveRadius(f64),
        #[error("non-finite {0}")]
        NonFiniteValue(&'static str),
        #[error("block `{0}` is not defined")]
        MissingBlock(String),
        #[error("block `{0}` references itself")]
        BlockCycle(String),
        #[error("block nesting exceeds {0} levels")]
        NestingTooDeep(usize),
        #[error("spline has no usable points")]
        DegenerateSpline,
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum MeasureError {
        #[error("spline tolerance must be positive and finite, got {0}")]
        InvalidTolerance(f64),
    }
}

pub mod measure {
    use std::f64::consts::TAU;

    use kerf_core::curve::{self, DEFAULT_TOLERANCE};
    use kerf_core::document::{Arc, BlockReference, Circle, Document, Entity, EntityId, Polyline};
    use kerf_core::geometry::{
        Point2, Transform2, arc_length, bulge_arc, distance, normalize_degrees, path_length,
        polygon_area,
    };
    use tracing::{debug, warn};

    use crate::errors::{EntityError, MeasureError};
    use crate::transform;

    const DEFAULT_MAX_INSERT_DEPTH: usize = 16;

    /// 测量参数。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct MeasureOptions {
        /// 样条（及非等比缩放下的圆弧）展平的最大弦高偏差，按图纸坐标计。
        pub spline_tolerance: f64,
        /// 块参照允许的最大嵌套层数。
        pub max_insert_depth: usize,
    }

    impl MeasureOptions {
        pub fn validate(&self) -> Result<(), MeasureError> {
            if self.spline_tolerance.is_finite() && self.spline_tolerance > 0.0 {
                Ok(())
            } else {
                Err(MeasureError::InvalidTolerance(self.spline_tolerance))
            }
        }
    }

    impl Default for MeasureOptions {
        fn default() -> Self {
            Self {
                spline_tolerance: DEFAULT_TOLERANCE,
                max_insert_depth: DEFAULT_MAX_INSERT_DEPTH,
            }
        }
    }

    /// 切割路径总长与外轮廓面积，未做取整。
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct MeasurementResult {
        pub total_length: f64,
        /// 最大闭合轮廓的面积。多个互不相交的外形时只取最大者。
        pub outer_area: f64,
    }

    /// 被跳过的图元。块内图元以所属顶层块参照的 ID 记录，`block` 给出所在块名。
    #[derive(Debug, Clone, PartialEq)]
    pub struct SkippedEntity {
        pub id: EntityId,
        pub kind: String,
        pub block: Option<String>,
        pub error: EntityError,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct MeasurementReport {
        pub result: MeasurementResult,
        pub skipped: Vec<SkippedEntity>,
        pub measured_entities: usize,
        pub closed_contours: usize,
    }

    /// 使用默认参数测量文档。
    pub fn measure(document: &Document) -> MeasurementResult {
        Measurer::new(document, MeasureOptions::default())
            .run()
            .result
    }

    /// 使用给定参数测量文档，并返回逐图元诊断信息。
    pub fn measure_with(
        document: &Document,
        options: &MeasureOptions,
    ) -> Result<MeasurementReport, MeasureError> {
        options.validate()?;
        Ok(Measurer::new(document, *options).run())
    }

    /// 一次测量中由各图元返回、再由调用方合并的累加值。
    #[derive(Debug, Default)]
    struct Accumulator {
        length: f64,
        closed_areas: Vec<f64>,
        measured: usize,
        skipped: Vec<SkippedEntity>,
    }

    impl Accumulator {
        fn leaf(length: f64, area: Option<f64>) -> Self {
            Self {
                length,
                closed_areas: area.into_iter().collect(),
                measured: 1,
                skipped: Vec::new(),
            }
        }

        fn merge(&mut self, other: Accumulator) {
            self.length += other.length;
            self.closed_areas.extend(other.closed_areas);
            self.measured += other.measured;
            self.skipped.extend(other.skipped);
        }
    }

    struct Measurer<'a> {
        document: &'a Document,
        options: MeasureOptions,
    }

    impl<'a> Measurer<'a> {
        fn new(document: &'a Document, options: MeasureOptions) -> Self {
            Self { document, options }
        }

        fn run(&self) -> MeasurementReport {
            let mut total = Accumulator::default();
            for (id, entity) in self.document.entities() {
                let mut stack = Vec::new();
                match self.measure_entity(entity, &Transform2::IDENTITY, &mut stack, *id) {
                    Ok(contribution) => total.merge(contribution),
                    Err(error) => total.skipped.push(self.skip(*id, entity, None, error)),
                }
            }

            let outer_area = total.closed_areas.iter().copied().fold(0.0, f64::max);
            let report = MeasurementReport {
                result: MeasurementResult {
                    total_length: total.length,
                    outer_area,
                },
                closed_contours: total.closed_areas.len(),
                measured_entities: total.measured,
                skipped: total.skipped,
            };
            debug!(
                total_length = report.result.total_length,
                outer_area = report.result.outer_area,
                measured = report.measured_entities,
                skipped = report.skipped.len(),
                contours = report.closed_contours,
                "文档测量完成"
            );
            report
        }

        fn skip(
            &self,
            id: EntityId,
            entity: &Entity,
            block: Option<&str>,
            error: EntityError,
        ) -> SkippedEntity {
            warn!(
                id = id.get(),
                kind = entity.kind(),
                block = block.unwrap_or(""),
                error = %error,
                "跳过无法测量的图元"
            );
            SkippedEntity {
                id,
                kind: entity.kind().to_string(),
                block: block.map(str::to_string),
                error,
            }
        }

        fn measure_entity(
            &self,
            entity: &'a Entity,
            transform: &Transform2,
            stack: &mut Vec<&'a str>,
            origin: EntityId,
        ) -> Result<Accumulator, EntityError> {
            match entity {
                Entity::Line(line) => {
                    ensure_finite(line.start, "line endpoint")?;
                    ensure_finite(line.end, "line endpoint")?;
                    let length = distance(transform.apply(line.start), transform.apply(line.end));
                    Ok(Accumulator::leaf(length, None))
                }
                Entity::Circle(circle) => {
                    let length = self.measure_circle(circle, transform)?;
                    Ok(Accumulator::leaf(length, None))
                }
                Entity::Arc(arc) => {
                    let length = self.measure_arc(arc, transform)?;
                    Ok(Accumulator::leaf(length, None))
                }
                Entity::Polyline(polyline) => self.measure_polyline(polyline, transform),
                Entity::Spline(spline) => {
                    let flattened = curve::flatten_spline(spline, self.local_tolerance(transform));
                    if flattened.vertices.is_empty() {
                        return Err(EntityError::DegenerateSpline);
                    }
                    self.measure_polyline(&flattened, transform)
                }
                Entity::BlockReference(reference) => {
                    self.measure_reference(reference, transform, stack, origin)
                }
                Entity::Text(_) | Entity::Unsupported(_) => Ok(Accumulator::default()),
            }
        }

        fn measure_reference(
            &self,
            reference: &'a BlockReference,
            parent: &Transform2,
            stack: &mut Vec<&'a str>,
            origin: EntityId,
        ) -> Result<Accumulator, EntityError> {
            if stack.contains(&reference.name.as_str()) {
                return Err(EntityError::BlockCycle(reference.name.clone()));
            }
            if stack.len() >= self.options.max_insert_depth {
                return Err(EntityError::NestingTooDeep(self.options.max_insert_depth));
            }
            let (block, transform) = transform::resolve(self.document, reference, parent)?;

            stack.push(block.name.as_str());
            let mut accumulator = Accumulator::default();
            for child in &block.entities {
                match self.measure_entity(child, &transform, stack, origin) {
                    Ok(contribution) => accumulator.merge(contribution),
                    Err(error) => accumulator.skipped.push(self.skip(
                        origin,
                        child,
                        Some(block.name.as_str()),
                        error,
                    )),
                }
            }
            stack.pop();
            Ok(accumulator)
        }

        fn measure_circle(&self, circle: &Circle, transform: &Transform2) -> Result<f64, EntityError> {
            ensure_radius(circle.radius)?;
            ensure_finite(circle.center, "circle center")?;
            Ok(match transform.uniform_scale() {
                Some(scale) => TAU * circle.radius * scale,
                None => {
                    let points = curve::arc_points(
                        circle.center,
                        circle.radius,
                        0.0,
                        TAU,
                        self.local_tolerance(transform),
                    );
                    mapped_length(&points, transform)
                }
            })
        }

        fn measure_arc(&self, arc: &Arc, transform: &Transform2) -> Result<f64, EntityError> {
            ensure_radius(arc.radius)?;
            ensure_finite(arc.center, "arc center")?;
            if !arc.start_angle.is_finite() || !arc.end_angle.is_finite() {
                return Err(EntityError::NonFiniteValue("arc angle"));
            }
            Ok(match transform.uniform_scale() {
                Some(scale) => arc_length(arc.radius * scale, arc.start_angle, arc.end_angle),
                None => {
                    let start = normalize_degrees(arc.start_angle);
                    let sweep = normalize_degrees(arc.end_angle) - start;
                    let points = curve::arc_points(
                        arc.center,
                        arc.radius,
                        start.to_radians(),
                        sweep.to_radians(),
                        self.local_tolerance(transform),
                    );
                    mapped_length(&points, transform)
                }
            })
        }

        fn measure_polyline(
            &self,
            polyline: &Polyline,
            transform: &Transform2,
        ) -> Result<Accumulator, EntityError> {
            let vertices = &polyline.vertices;
            if vertices.iter().any(|vertex| !vertex.position.is_finite()) {
                return Err(EntityError::NonFiniteValue("polyline vertex"));
            }
            if vertices.len() < 2 {
                return Ok(Accumulator::leaf(0.0, None));
            }

            let world: Vec<Point2> = polyline.positions().map(|p| transform.apply(p)).collect();
            let count = vertices.len();
            let segments = if polyline.is_closed { count } else { count - 1 };
            let uniform = transform.uniform_scale().is_some();

            let length: f64 = (0..segments)
                .map(|i| {
                    let next = (i + 1) % count;
                    let bulge = vertices[i].bulge;
                    let chord = distance(world[i], world[next]);
                    if bulge == 0.0 {
                        chord
                    } else if uniform {
                        bulge_arc(chord, bulge)
                    } else if bulge.is_finite() {
                        let points = curve::bulge_points(
                            vertices[i].position,
                            vertices[next].position,
                            bulge,
                            self.local_tolerance(transform),
                        );
                        mapped_length(&points, transform)
                    } else {
                        0.0
                    }
                })
                .sum();

            let area = (polyline.is_closed && count >= 3).then(|| polygon_area(&world));
            Ok(Accumulator::leaf(length, area))
        }

        /// 把模型空间容差换算为块局部坐标下的容差。
        fn local_tolerance(&self, transform: &Transform2) -> f64 {
            let scale = transform.max_stretch();
            if scale.is_finite() && scale > f64::EPSILON {
                self.options.spline_tolerance / scale
            } else {
                self.options.spline_tolerance
            }
        }
    }

    fn ensure_radius(radius: f64) -> Result<(), EntityError> {
        if radius.is_finite() && radius > 0.0 {
            Ok(())
        } else {
            Err(EntityError::NonPositiveRadius(radius))
        }
    }

    fn ensure_finite(point: Point2, what: &'static str) -> Result<(), EntityError> {
        if point.is_finite() {
            Ok(())
        } else {
            Err(EntityError::NonFiniteValue(what))
        }
    }

    fn mapped_length(points: &[Point2], transform: &Transform2) -> f64 {
        let mapped: Vec<Point2> = points.iter().map(|p| transform.apply(*p)).collect();
        path_length(&mapped, false)
    }

}
