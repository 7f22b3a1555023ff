use kerf_core::document::{BlockDefinition, BlockReference, Document};
use kerf_core::geometry::{Point2, Transform2, Vector2};

use crate::errors::EntityError;

/// 块参照的局部变换：先减去块基点，再按 `(sx, sy)` 缩放、
/// 绕原点旋转 `rotation` 度，最后平移到插入点。
pub fn insert_transform(reference: &BlockReference, base_point: Point2) -> Transform2 {
    let placement = Transform2::from_scale_rotation_translation(
        reference.scale,
        reference.rotation,
        reference.insert,
    );
    let to_origin = Transform2::from_translation(Vector2::new(-base_point.x(), -base_point.y()));
    placement.compose(to_origin)
}

/// 按名称解析块参照，返回块定义及其在父坐标系下的组合变换。
pub fn resolve<'a>(
    document: &'a Document,
    reference: &BlockReference,
    parent: &Transform2,
) -> Result<(&'a BlockDefinition, Transform2), EntityError> {
    if !reference.insert.is_finite()
        || !reference.scale.as_vec2().is_finite()
        || !reference.rotation.is_finite()
    {
        return Err(EntityError::NonFiniteValue("insert placement"));
    }
    let block = document
        .block(&reference.name)
        .ok_or_else(|| EntityError::MissingBlock(reference.name.clone()))?;
    let transform = parent.compose(insert_transform(reference, block.base_point));
    Ok((block, transform))
}
