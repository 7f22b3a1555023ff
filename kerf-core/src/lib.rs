pub mod curve;

pub mod geometry {
    use glam::{DAffine2, DVec2};
    use serde::{Deserialize, Serialize};

    const SIN_EPSILON: f64 = 1e-12;
    const UNIFORM_SCALE_EPSILON: f64 = 1e-9;

    /// 二维点，内部以 `glam::DVec2` 表示，序列化为 `[x, y]`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，块参照的缩放系数也以此表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 二维仿射变换，包装 `glam::DAffine2`。
    ///
    /// 组合顺序与矩阵乘法一致：`outer.compose(inner)` 先应用 `inner` 再应用 `outer`。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Transform2(DAffine2);

    impl Transform2 {
        pub const IDENTITY: Self = Self(DAffine2::IDENTITY);

        /// 先缩放、再绕原点旋转（角度制）、最后平移。
        pub fn from_scale_rotation_translation(
            scale: Vector2,
            rotation_degrees: f64,
            translation: Point2,
        ) -> Self {
            Self(DAffine2::from_scale_angle_translation(
                scale.as_vec2(),
                rotation_degrees.to_radians(),
                translation.as_vec2(),
            ))
        }

        #[inline]
        pub fn from_translation(offset: Vector2) -> Self {
            Self(DAffine2::from_translation(offset.as_vec2()))
        }

        #[inline]
        pub fn compose(self, inner: Transform2) -> Self {
            Self(self.0 * inner.0)
        }

        #[inline]
        pub fn apply(&self, point: Point2) -> Point2 {
            Point2(self.0.transform_point2(point.as_vec2()))
        }

        #[inline]
        pub fn determinant(&self) -> f64 {
            self.0.matrix2.determinant()
        }

        /// 行列式为负时图形被镜像，圆弧走向随之反转。
        #[inline]
        pub fn is_mirrored(&self) -> bool {
            self.determinant() < 0.0
        }

        /// 若线性部分为相似变换（等比缩放 + 旋转/镜像），返回缩放系数。
        pub fn uniform_scale(&self) -> Option<f64> {
            let x_axis = self.0.matrix2.x_axis;
            let y_axis = self.0.matrix2.y_axis;
            let sx = x_axis.length();
            let sy = y_axis.length();
            let reference = sx.max(sy).max(1.0);
            let equal = (sx - sy).abs() <= UNIFORM_SCALE_EPSILON * reference;
            let orthogonal = x_axis.dot(y_axis).abs() <= UNIFORM_SCALE_EPSILON * reference * reference;
            if equal && orthogonal { Some(sx) } else { None }
        }

        /// 线性部分在任意方向上的最大拉伸倍数（最大奇异值），
        /// 用于把展平容差换算到局部坐标。带剪切的复合变换中它大于各轴长度。
        pub fn max_stretch(&self) -> f64 {
            let matrix = self.0.matrix2;
            let frobenius = matrix.x_axis.length_squared() + matrix.y_axis.length_squared();
            let determinant = matrix.determinant();
            let spread = (frobenius * frobenius - 4.0 * determinant * determinant)
                .max(0.0)
                .sqrt();
            ((frobenius + spread) / 2.0).sqrt()
        }

        #[inline]
        pub fn is_finite(&self) -> bool {
            self.0.is_finite()
        }
    }

    impl Default for Transform2 {
        fn default() -> Self {
            Self::IDENTITY
        }
    }

    #[inline]
    pub fn distance(a: Point2, b: Point2) -> f64 {
        a.as_vec2().distance(b.as_vec2())
    }

    /// 把角度（角度制）归一化到 `[0, 360)`。
    pub fn normalize_degrees(angle: f64) -> f64 {
        let result = angle.rem_euclid(360.0);
        // rem_euclid 对极小负数可能返回 360.0
        if result >= 360.0 { 0.0 } else { result }
    }

    /// 两个角度归一化后的差的绝对值，取值范围 `[0, 360)`。
    #[inline]
    pub fn normalized_span(start_angle: f64, end_angle: f64) -> f64 {
        (normalize_degrees(end_angle) - normalize_degrees(start_angle)).abs()
    }

    #[inline]
    pub fn arc_length(radius: f64, start_angle: f64, end_angle: f64) -> f64 {
        normalized_span(start_angle, end_angle).to_radians() * radius
    }

    /// 由弦长与凸度计算圆弧长度。`bulge == 0` 的直线段应直接取弦长。
    pub fn bulge_arc(chord: f64, bulge: f64) -> f64 {
        let theta = 4.0 * bulge.abs().atan();
        let sin_half = (theta / 2.0).sin();
        if !theta.is_finite() || sin_half.abs() <= SIN_EPSILON {
            return 0.0;
        }
        let radius = chord / (2.0 * sin_half);
        radius * theta
    }

    /// 鞋带公式求闭合多边形面积，顶点少于 3 个时为 0。
    pub fn polygon_area(points: &[Point2]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let twice: f64 = points
            .iter()
            .zip(points.iter().cycle().skip(1))
            .map(|(a, b)| a.x() * b.y() - b.x() * a.y())
            .sum();
        twice.abs() / 2.0
    }

    /// 折线总长度，`closed` 为真时追加首尾闭合段。
    pub fn path_length(points: &[Point2], closed: bool) -> f64 {
        if points.len() < 2 {
            return 0.0;
        }
        let open: f64 = points.windows(2).map(|pair| distance(pair[0], pair[1])).sum();
        if closed {
            open + distance(points[points.len() - 1], points[0])
        } else {
            open
        }
    }

}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point2, Vector2};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 缺少图层信息的图元归入 DXF 默认图层 "0"。
    pub const DEFAULT_LAYER: &str = "0";

    fn default_layer() -> String {
        DEFAULT_LAYER.to_string()
    }

    /// 图元的封闭变体集合。未参与测量的类型（文字、标注、填充等）
    /// 以 `Text` 或 `Unsupported` 保留，长度贡献恒为 0。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        #[serde(alias = "lwpolyline")]
        Polyline(Polyline),
        Spline(Spline),
        #[serde(alias = "insert")]
        BlockReference(BlockReference),
        Text(Text),
        Unsupported(Unsupported),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Spline(spline) => &spline.layer,
                Entity::BlockReference(reference) => &reference.layer,
                Entity::Text(text) => &text.layer,
                Entity::Unsupported(other) => &other.layer,
            }
        }

        /// DXF 风格的类型名，用于日志与诊断。
        pub fn kind(&self) -> &str {
            match self {
                Entity::Line(_) => "LINE",
                Entity::Circle(_) => "CIRCLE",
                Entity::Arc(_) => "ARC",
                Entity::Polyline(_) => "POLYLINE",
                Entity::Spline(_) => "SPLINE",
                Entity::BlockReference(_) => "INSERT",
                Entity::Text(_) => "TEXT",
                Entity::Unsupported(other) => &other.type_name,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        #[serde(default = "default_layer")]
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        #[serde(default = "default_layer")]
        pub layer: String,
    }

    /// 圆弧，起止角为角度制，从起始角逆时针扫到终止角。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        #[serde(default = "default_layer")]
        pub layer: String,
    }

    /// 统一表示 POLYLINE 与 LWPOLYLINE。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        #[serde(default = "default_layer")]
        pub layer: String,
    }

    impl Polyline {
        pub fn positions(&self) -> impl Iterator<Item = Point2> + '_ {
            self.vertices.iter().map(|vertex| vertex.position)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        /// 到下一顶点的圆弧包角四分之一的正切值，0 表示直线段。
        #[serde(default)]
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Spline {
        pub degree: i32,
        #[serde(default)]
        pub is_closed: bool,
        #[serde(default)]
        pub control_points: Vec<Point2>,
        #[serde(default)]
        pub fit_points: Vec<Point2>,
        #[serde(default)]
        pub knot_values: Vec<f64>,
        #[serde(default)]
        pub weights: Vec<f64>,
        #[serde(default = "default_layer")]
        pub layer: String,
    }

    /// 块参照（INSERT）。只按名称引用块定义，不持有块内图元。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        #[serde(default = "BlockReference::unit_scale")]
        pub scale: Vector2,
        /// 角度制。
        #[serde(default)]
        pub rotation: f64,
        #[serde(default = "default_layer")]
        pub layer: String,
    }

    impl BlockReference {
        fn unit_scale() -> Vector2 {
            Vector2::new(1.0, 1.0)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        #[serde(default)]
        pub rotation: f64,
        #[serde(default = "default_layer")]
        pub layer: String,
    }

    /// 解码器识别但不参与测量的图元（DIMENSION、HATCH 等）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Unsupported {
        pub type_name: String,
        #[serde(default = "default_layer")]
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        /// 块局部坐标的基点，插入时对齐到参照的插入点。
        #[serde(default = "BlockDefinition::origin")]
        pub base_point: Point2,
        #[serde(default)]
        pub entities: Vec<Entity>,
    }

    impl BlockDefinition {
        pub fn new(name: impl Into<String>, entities: Vec<Entity>) -> Self {
            Self {
                name: name.into(),
                base_point: Self::origin(),
                entities,
            }
        }

        fn origin() -> Point2 {
            Point2::new(0.0, 0.0)
        }
    }

    /// 文档是全部图元与块定义的唯一所有者；块参照只保存块名。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        #[serde(default)]
        entities: Vec<(EntityId, Entity)>,
        #[serde(default)]
        next_entity_id: u64,
        #[serde(default)]
        blocks: HashMap<String, BlockDefinition>,
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_line(
            &mut self,
            start: Point2,
            end: Point2,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.push(Entity::Line(Line { start, end, layer }))
        }

        pub fn add_circle(
            &mut self,
            center: Point2,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.push(Entity::Circle(Circle {
                center,
                radius,
                layer,
            }))
        }

        /// `start_angle` / `end_angle` 为角度制。
        pub fn add_arc(
            &mut self,
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.push(Entity::Arc(Arc {
                center,
                radius,
                start_angle,
                end_angle,
                layer,
            }))
        }

        pub fn add_polyline<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            let collected = vertices
                .into_iter()
                .map(PolylineVertex::new)
                .collect::<Vec<_>>();
            self.add_polyline_with_vertices(collected, is_closed, layer)
        }

        pub fn add_polyline_with_vertices<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = PolylineVertex>,
        {
            let layer = layer.into();
            let vertices: Vec<PolylineVertex> = vertices.into_iter().collect();
            self.push(Entity::Polyline(Polyline {
                vertices,
                is_closed,
                layer,
            }))
        }

        pub fn add_spline(&mut self, spline: Spline) -> EntityId {
            self.push(Entity::Spline(spline))
        }

        pub fn add_text(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.push(Entity::Text(Text {
                insert,
                content: content.into(),
                height,
                rotation,
                layer,
            }))
        }

        /// 添加块参照。块定义可以稍后再注册，测量时才按名称解析。
        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            scale: Vector2,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.push(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale,
                rotation,
                layer,
            }))
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.push(entity)
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        /// 注册块定义，同名定义会被覆盖。
        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            self.blocks.insert(definition.name.clone(), definition);
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        #[inline]
        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        fn push(&mut self, entity: Entity) -> EntityId {
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

}
